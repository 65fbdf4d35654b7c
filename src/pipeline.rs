//! From identified narratives to a pruned document-term matrix whose rows
//! can be joined back to their records.

use serde::Serialize;
use tracing::info;

use crate::dtm::{build_dtm, Dtm, DtmOptions, SparseMatrix, Vocabulary};
use crate::error::Result;
use crate::normalize::Normalizer;
use crate::tfidf::{tfidf, TfIdfParams};

/// Identifier of the accident record that owns a narrative.
pub type RecordId = String;

/// One narrative as handed over by the record loader.
#[derive(Debug, Clone, PartialEq)]
pub struct Narrative {
    pub id: RecordId,
    pub text: Option<String>,
}

impl Narrative {
    pub fn new(id: impl Into<RecordId>, text: impl Into<String>) -> Self {
        Narrative {
            id: id.into(),
            text: Some(text.into()),
        }
    }

    pub fn missing(id: impl Into<RecordId>) -> Self {
        Narrative { id: id.into(), text: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DropReason {
    /// Missing, empty, or nothing left after normalization.
    EmptyAfterNormalization,
    /// Every token was pruned from the vocabulary.
    NoSurvivingTerms,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRecord {
    pub id: RecordId,
    /// Position in the input.
    pub position: usize,
    pub reason: DropReason,
}

/// Pruned matrix with the record behind every row.
#[derive(Debug, Clone, Serialize)]
pub struct Corpus {
    dtm: Dtm,
    row_ids: Vec<RecordId>,
    dropped: Vec<DroppedRecord>,
}

impl Corpus {
    pub fn dtm(&self) -> &Dtm {
        &self.dtm
    }

    pub fn counts(&self) -> &SparseMatrix<u32> {
        self.dtm.counts()
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        self.dtm.vocabulary()
    }

    /// Record id of each matrix row, in row order.
    pub fn row_ids(&self) -> &[RecordId] {
        &self.row_ids
    }

    pub fn dropped(&self) -> &[DroppedRecord] {
        &self.dropped
    }

    /// Row holding `id`, or `None` if it was dropped or never supplied.
    pub fn row_of(&self, id: &str) -> Option<usize> {
        self.row_ids.iter().position(|r| r == id)
    }

    pub fn drop_reason(&self, id: &str) -> Option<DropReason> {
        self.dropped.iter().find(|d| d.id == id).map(|d| d.reason)
    }

    pub fn tfidf(&self, params: TfIdfParams) -> Result<SparseMatrix<f64>> {
        tfidf(self.counts(), params)
    }
}

/// Normalize every narrative. Empty token lists are kept so positions line
/// up with the input.
pub fn normalize_all(normalizer: &Normalizer, narratives: &[Narrative]) -> Vec<Vec<String>> {
    narratives
        .iter()
        .map(|n| n.text.as_deref().map(|t| normalizer.normalize(t)).unwrap_or_default())
        .collect()
}

/// Normalize, count and prune a batch of narratives.
pub fn prepare_corpus(narratives: &[Narrative], normalizer: &Normalizer, options: &DtmOptions) -> Result<Corpus> {
    let docs = normalize_all(normalizer, narratives);
    let dtm = build_dtm(&docs, options)?;

    let row_ids = dtm.rows().iter().map(|&p| narratives[p].id.clone()).collect();
    let dropped: Vec<DroppedRecord> = dtm
        .empty_rows()
        .iter()
        .map(|&position| DroppedRecord {
            id: narratives[position].id.clone(),
            position,
            reason: if docs[position].is_empty() {
                DropReason::EmptyAfterNormalization
            } else {
                DropReason::NoSurvivingTerms
            },
        })
        .collect();

    info!(
        records = narratives.len(),
        rows = dtm.counts().n_rows(),
        dropped = dropped.len(),
        "prepared corpus"
    );

    Ok(Corpus { dtm, row_ids, dropped })
}
