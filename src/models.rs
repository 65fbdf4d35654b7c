//! Serde shapes for the command-line driver: narrative records read from
//! JSON and the report written after a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dtm::DtmOptions;
use crate::perplexity::PerplexityPoint;
use crate::pipeline::{Corpus, DroppedRecord, Narrative};
use crate::topic_modeling::{LDAConfig, ModeledTopic, TopicModel};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeRecord {
    pub id: String,
    #[serde(default)]
    pub narrative: Option<String>,
}

impl From<NarrativeRecord> for Narrative {
    fn from(record: NarrativeRecord) -> Self {
        Narrative {
            id: record.id,
            text: record.narrative,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CorpusSummary {
    pub records: usize,
    pub rows: usize,
    pub vocabulary_size: usize,
    pub tokens: u64,
    pub min_doc_freq: f64,
    pub max_doc_freq: f64,
    /// Inclusive document-count window the fractions resolved to.
    pub doc_count_bounds: (usize, usize),
}

impl CorpusSummary {
    pub fn new(corpus: &Corpus, options: &DtmOptions) -> Self {
        CorpusSummary {
            records: corpus.dtm().total_documents(),
            rows: corpus.counts().n_rows(),
            vocabulary_size: corpus.vocabulary().len(),
            tokens: corpus.counts().total(),
            min_doc_freq: options.min_doc_freq,
            max_doc_freq: options.max_doc_freq,
            doc_count_bounds: corpus.dtm().bounds(),
        }
    }
}

/// Topic mixture of one surviving record.
#[derive(Debug, Clone, Serialize)]
pub struct RecordTopics {
    pub id: String,
    pub dominant_topic: usize,
    pub theta: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub corpus: CorpusSummary,
    pub dropped: Vec<DroppedRecord>,
    pub lda: LDAConfig,
    pub alpha: f64,
    pub perplexity: f64,
    pub topics: Vec<ModeledTopic>,
    pub records: Vec<RecordTopics>,
    pub sweep: Vec<PerplexityPoint>,
}

impl RunReport {
    pub fn new(
        corpus: &Corpus,
        options: &DtmOptions,
        config: &LDAConfig,
        model: &TopicModel,
        perplexity: f64,
        top_terms: usize,
        sweep: Vec<PerplexityPoint>,
    ) -> Self {
        let records = corpus
            .row_ids()
            .iter()
            .enumerate()
            .map(|(row, id)| RecordTopics {
                id: id.clone(),
                dominant_topic: model.dominant_topic(row),
                theta: model.theta[row].clone(),
            })
            .collect();
        RunReport {
            generated_at: Utc::now(),
            corpus: CorpusSummary::new(corpus, options),
            dropped: corpus.dropped().to_vec(),
            lda: config.clone(),
            alpha: model.alpha,
            perplexity,
            topics: model.topics(corpus.vocabulary(), top_terms),
            records,
            sweep,
        }
    }
}
