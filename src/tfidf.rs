//! TF-IDF reweighting of a count document-term matrix.
//!
//! The output has the same shape and sparsity pattern as the input: every
//! stored count gets a weight (possibly 0 for a term present in every row),
//! and absent counts stay absent. Document frequency is taken over the rows
//! of the matrix handed in, i.e. the surviving documents.
//!
//! Every variant is non-decreasing in the raw count and non-increasing in the
//! document frequency.

use serde::Serialize;

use crate::dtm::SparseMatrix;
use crate::error::{Error, Result};

/// TF-IDF parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TfIdfParams {
    /// Term-frequency transform.
    pub tf_variant: TfVariant,
    /// IDF transform.
    pub idf_variant: IdfVariant,
}

impl Default for TfIdfParams {
    fn default() -> Self {
        Self {
            tf_variant: TfVariant::Linear,
            idf_variant: IdfVariant::Standard,
        }
    }
}

impl TfIdfParams {
    /// Log-scaled TF with smoothed IDF.
    pub fn smoothed() -> Self {
        Self {
            tf_variant: TfVariant::LogScaled,
            idf_variant: IdfVariant::Smoothed,
        }
    }
}

/// Term-frequency transform variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TfVariant {
    /// `tf = f_{t,d}`.
    Linear,
    /// `tf = 1 + ln(f_{t,d})` for `f_{t,d} > 0`.
    LogScaled,
    /// `tf = f_{t,d} / |d|`, with `|d|` the row total.
    DocumentNormalized,
}

/// IDF transform variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdfVariant {
    /// `ln(N / df)`; zero for a term in every document.
    Standard,
    /// `ln(1 + N / df)`; never zero.
    Smoothed,
}

fn compute_tf(count: u32, row_total: u64, variant: TfVariant) -> f64 {
    if count == 0 {
        return 0.0;
    }
    match variant {
        TfVariant::Linear => f64::from(count),
        TfVariant::LogScaled => 1.0 + f64::from(count).ln(),
        TfVariant::DocumentNormalized => f64::from(count) / row_total as f64,
    }
}

/// IDF for a term seen in `doc_frequency` of `num_docs` rows.
pub fn idf(num_docs: usize, doc_frequency: usize, variant: IdfVariant) -> f64 {
    if doc_frequency == 0 {
        return 0.0;
    }
    let ratio = num_docs as f64 / doc_frequency as f64;
    match variant {
        IdfVariant::Standard => ratio.ln().max(0.0),
        IdfVariant::Smoothed => ratio.ln_1p(),
    }
}

/// Reweight a count matrix.
pub fn tfidf(counts: &SparseMatrix<u32>, params: TfIdfParams) -> Result<SparseMatrix<f64>> {
    if counts.is_empty() {
        return Err(Error::EmptyCorpus);
    }
    let num_docs = counts.n_rows();
    let idfs: Vec<f64> = counts
        .document_frequencies()
        .into_iter()
        .map(|df| idf(num_docs, df, params.idf_variant))
        .collect();
    let row_totals: Vec<u64> = (0..num_docs).map(|i| counts.row_sum(i)).collect();

    Ok(counts.map(|i, j, c| compute_tf(c, row_totals[i], params.tf_variant) * idfs[j]))
}
