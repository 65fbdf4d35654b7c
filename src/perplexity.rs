//! Perplexity of a fitted topic model, and sweeps over candidate topic
//! counts.
//!
//! Perplexity is `exp(-log p(w) / N)` with `p(w_dn) = Σ_k θ_dk β_kw` and `N`
//! the number of tokens. Lower is better. Scores are only comparable between
//! models evaluated on the same matrix; choosing a topic count from a sweep
//! is left to the caller.

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::dtm::SparseMatrix;
use crate::error::{Error, Result};
use crate::topic_modeling::{GibbsLDA, LDAConfig};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerplexityPoint {
    pub k: usize,
    pub perplexity: f64,
}

/// `Σ_d Σ_w n_dw ln(Σ_k θ_dk β_kw)`.
pub fn log_likelihood(theta: &[Vec<f64>], beta: &[Vec<f64>], dtm: &SparseMatrix<u32>) -> Result<f64> {
    check_shapes(theta, beta, dtm)?;
    let mut total = 0.0;
    for (d, row) in dtm.rows().enumerate() {
        for &(w, count) in row {
            let p: f64 = theta[d].iter().zip(beta).map(|(t, topic)| t * topic[w]).sum();
            if !(p > 0.0 && p.is_finite()) {
                return Err(Error::NumericalFailure(format!(
                    "document {d} gives term {w} probability {p}"
                )));
            }
            total += f64::from(count) * p.ln();
        }
    }
    Ok(total)
}

pub fn perplexity(theta: &[Vec<f64>], beta: &[Vec<f64>], dtm: &SparseMatrix<u32>) -> Result<f64> {
    let ll = log_likelihood(theta, beta, dtm)?;
    let tokens = dtm.total();
    if tokens == 0 {
        return Err(Error::EmptyCorpus);
    }
    Ok((-ll / tokens as f64).exp())
}

fn check_shapes(theta: &[Vec<f64>], beta: &[Vec<f64>], dtm: &SparseMatrix<u32>) -> Result<()> {
    if dtm.is_empty() {
        return Err(Error::EmptyCorpus);
    }
    if theta.len() != dtm.n_rows() {
        return Err(Error::ShapeMismatch(format!(
            "theta has {} rows, matrix has {}",
            theta.len(),
            dtm.n_rows()
        )));
    }
    if let Some(row) = theta.iter().position(|row| row.len() != beta.len()) {
        return Err(Error::ShapeMismatch(format!(
            "theta row {row} has {} topics, beta has {}",
            theta[row].len(),
            beta.len()
        )));
    }
    if let Some(topic) = beta.iter().position(|row| row.len() != dtm.n_cols()) {
        return Err(Error::ShapeMismatch(format!(
            "beta topic {topic} covers {} terms, matrix has {}",
            beta[topic].len(),
            dtm.n_cols()
        )));
    }
    Ok(())
}

/// Fit one model per candidate `k` and score it in-sample. Fits run in
/// parallel; each uses `base`'s seed, so the result equals a sequential sweep.
pub fn perplexity_sweep(dtm: &SparseMatrix<u32>, ks: &[usize], base: &LDAConfig) -> Result<Vec<PerplexityPoint>> {
    sweep(ks, |k| {
        let model = GibbsLDA::new(LDAConfig { num_topics: k, ..base.clone() }).fit(dtm)?;
        model.perplexity(dtm)
    })
}

/// Fit on `train`, fold `heldout` in with β fixed, and score the held-out
/// documents.
pub fn heldout_perplexity_sweep(
    train: &SparseMatrix<u32>,
    heldout: &SparseMatrix<u32>,
    ks: &[usize],
    base: &LDAConfig,
    infer_iterations: usize,
) -> Result<Vec<PerplexityPoint>> {
    sweep(ks, |k| {
        let model = GibbsLDA::new(LDAConfig { num_topics: k, ..base.clone() }).fit(train)?;
        let theta = model.infer(heldout, infer_iterations, base.seed)?;
        perplexity(&theta, &model.beta, heldout)
    })
}

fn sweep(ks: &[usize], score: impl Fn(usize) -> Result<f64> + Sync) -> Result<Vec<PerplexityPoint>> {
    if ks.is_empty() {
        return Err(Error::InvalidConfig("no candidate topic counts".into()));
    }
    let mut ks = ks.to_vec();
    ks.sort_unstable();
    ks.dedup();
    let points = ks
        .par_iter()
        .map(|&k| {
            let perplexity = score(k)?;
            info!(k, perplexity, "scored topic count");
            Ok(PerplexityPoint { k, perplexity })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(points)
}
