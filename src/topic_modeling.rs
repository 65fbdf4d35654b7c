//! Latent Dirichlet Allocation fitted by collapsed Gibbs sampling.
//!
//! Topic numbers carry no identity across fits: two runs with different seeds
//! may produce the same topics in a different order (label switching). Match
//! topics across fits by their top terms, never by index.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dtm::{SparseMatrix, Vocabulary};
use crate::error::{Error, Result};
use crate::perplexity;

/// Allowed drift of a posterior row sum from 1 before renormalization is
/// reported.
const ROW_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Serialize)]
pub struct ModeledTopic {
    pub id: usize,
    pub name: String,
    pub words: Vec<(String, f64)>, // term and its probability in this topic
    pub documents: Vec<usize>,     // rows whose dominant topic this is
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LDAConfig {
    pub num_topics: usize,
    pub iterations: usize,
    /// Sweeps discarded before posterior samples are averaged. Requires
    /// `thin > 0`.
    pub burn_in: usize,
    /// Average a sample every `thin` sweeps after burn-in; 0 keeps only the
    /// final state.
    pub thin: usize,
    /// Document-topic concentration; `None` means `50 / num_topics`.
    pub alpha: Option<f64>,
    /// Topic-term concentration.
    pub eta: f64,
    pub seed: u64,
    /// Record the corpus log-likelihood every `keep` sweeps; 0 disables.
    pub keep: usize,
}

impl Default for LDAConfig {
    fn default() -> Self {
        LDAConfig {
            num_topics: 10,
            iterations: 500,
            burn_in: 0,
            thin: 0,
            alpha: None,
            eta: 0.1,
            seed: 42,
            keep: 0,
        }
    }
}

impl LDAConfig {
    pub fn with_topics(num_topics: usize) -> Self {
        LDAConfig {
            num_topics,
            ..Default::default()
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha.unwrap_or(50.0 / self.num_topics as f64)
    }

    fn validate(&self) -> Result<()> {
        if self.num_topics < 1 {
            return Err(Error::InvalidConfig("number of topics must be at least 1".into()));
        }
        if self.iterations == 0 {
            return Err(Error::InvalidConfig("iterations must be at least 1".into()));
        }
        let alpha = self.alpha();
        if !alpha.is_finite() || alpha <= 0.0 {
            return Err(Error::InvalidConfig(format!("alpha must be positive and finite, got {alpha}")));
        }
        if !self.eta.is_finite() || self.eta <= 0.0 {
            return Err(Error::InvalidConfig(format!("eta must be positive and finite, got {}", self.eta)));
        }
        if self.burn_in > 0 && self.thin == 0 {
            return Err(Error::InvalidConfig("burn-in needs thin > 0 to average any samples".into()));
        }
        if self.thin > 0 && self.burn_in >= self.iterations {
            return Err(Error::InvalidConfig(format!(
                "burn-in of {} leaves no samples out of {} iterations",
                self.burn_in, self.iterations
            )));
        }
        Ok(())
    }
}

/// Posterior summary of one fit.
#[derive(Debug, Clone, Serialize)]
pub struct TopicModel {
    pub num_topics: usize,
    pub alpha: f64,
    pub eta: f64,
    /// Documents x topics, rows aligned with the fitted matrix.
    pub theta: Vec<Vec<f64>>,
    /// Topics x terms.
    pub beta: Vec<Vec<f64>>,
    /// Final topic of every token, terms expanded in column order.
    #[serde(skip)]
    pub assignments: Vec<Vec<usize>>,
    /// `(iteration, log-likelihood)` pairs recorded every `keep` sweeps.
    pub log_likelihood: Vec<(usize, f64)>,
}

pub struct GibbsLDA {
    config: LDAConfig,
}

impl GibbsLDA {
    pub fn new(config: LDAConfig) -> Self {
        GibbsLDA { config }
    }

    pub fn config(&self) -> &LDAConfig {
        &self.config
    }

    /// Fit on a count matrix whose every row holds at least one term.
    pub fn fit(&self, dtm: &SparseMatrix<u32>) -> Result<TopicModel> {
        self.config.validate()?;
        let word_docs = expand_documents(dtm)?;
        let num_topics = self.config.num_topics;
        let alpha = self.config.alpha();
        let eta = self.config.eta;
        let vocab_size = dtm.n_cols();
        info!(
            documents = word_docs.len(),
            vocabulary = vocab_size,
            topics = num_topics,
            iterations = self.config.iterations,
            alpha,
            eta,
            seed = self.config.seed,
            "fitting LDA"
        );

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut state = SamplerState::initialize(&word_docs, vocab_size, num_topics, &mut rng);
        let mut probs = vec![0.0; num_topics];
        let vocab_eta = vocab_size as f64 * eta;

        let mut theta_sum = vec![vec![0.0; num_topics]; word_docs.len()];
        let mut beta_sum = vec![vec![0.0; vocab_size]; num_topics];
        let mut samples = 0usize;
        let mut log_likelihood = Vec::new();

        for iteration in 1..=self.config.iterations {
            for (doc_id, doc) in word_docs.iter().enumerate() {
                for (word_pos, &word_id) in doc.iter().enumerate() {
                    let old_topic = state.doc_word_topics[doc_id][word_pos];
                    state.remove(doc_id, word_id, old_topic);

                    // p(k) ∝ (n_dk + α)(n_kw + η) / (n_k + Vη)
                    for (topic, p) in probs.iter_mut().enumerate() {
                        *p = (state.doc_topic_counts[doc_id][topic] as f64 + alpha)
                            * (state.word_topic_counts[word_id][topic] as f64 + eta)
                            / (state.topic_counts[topic] as f64 + vocab_eta);
                    }
                    let new_topic = sample_index(&probs, &mut rng)?;

                    state.add(doc_id, word_id, new_topic);
                    state.doc_word_topics[doc_id][word_pos] = new_topic;
                }
            }

            if self.retains_sample(iteration) {
                accumulate(&mut theta_sum, &state.theta(alpha));
                accumulate(&mut beta_sum, &state.beta(eta));
                samples += 1;
            }
            if self.config.keep > 0 && iteration % self.config.keep == 0 {
                let ll = perplexity::log_likelihood(&state.theta(alpha), &state.beta(eta), dtm)?;
                log_likelihood.push((iteration, ll));
            }
            if iteration % 50 == 0 {
                debug!("Gibbs sweep {}/{}", iteration, self.config.iterations);
            }
        }

        let (mut theta, mut beta) = if samples == 0 {
            (state.theta(alpha), state.beta(eta))
        } else {
            let n = samples as f64;
            (scale(theta_sum, n), scale(beta_sum, n))
        };
        renormalize_rows(&mut theta, "theta");
        renormalize_rows(&mut beta, "beta");

        Ok(TopicModel {
            num_topics,
            alpha,
            eta,
            theta,
            beta,
            assignments: state.doc_word_topics,
            log_likelihood,
        })
    }

    fn retains_sample(&self, iteration: usize) -> bool {
        let thin = self.config.thin;
        thin > 0 && iteration > self.config.burn_in && (iteration - self.config.burn_in) % thin == 0
    }
}

impl TopicModel {
    /// Term indices of `topic` sorted by descending probability; ties keep
    /// column order.
    pub fn top_term_indices(&self, topic: usize, n: usize) -> Vec<(usize, f64)> {
        let mut ranked: Vec<(usize, f64)> = self.beta[topic].iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    /// The `n` most probable terms of `topic`.
    pub fn top_terms(&self, topic: usize, n: usize, vocabulary: &Vocabulary) -> Vec<(String, f64)> {
        self.top_term_indices(topic, n)
            .into_iter()
            .filter_map(|(j, p)| vocabulary.term(j).map(|t| (t.to_string(), p)))
            .collect()
    }

    /// Most probable topic of a row; ties go to the lower topic number.
    pub fn dominant_topic(&self, row: usize) -> usize {
        self.theta[row]
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (k, &p)| if p > best.1 { (k, p) } else { best })
            .0
    }

    pub fn topics(&self, vocabulary: &Vocabulary, n: usize) -> Vec<ModeledTopic> {
        let dominant: Vec<usize> = (0..self.theta.len()).map(|d| self.dominant_topic(d)).collect();
        (0..self.num_topics)
            .map(|topic_id| {
                let words = self.top_terms(topic_id, n, vocabulary);
                ModeledTopic {
                    id: topic_id,
                    name: generate_topic_name(topic_id, &words),
                    documents: dominant
                        .iter()
                        .enumerate()
                        .filter(|&(_, &k)| k == topic_id)
                        .map(|(d, _)| d)
                        .collect(),
                    words,
                }
            })
            .collect()
    }

    /// Estimate θ for documents the model has not seen, holding β fixed.
    pub fn infer(&self, dtm: &SparseMatrix<u32>, iterations: usize, seed: u64) -> Result<Vec<Vec<f64>>> {
        if iterations == 0 {
            return Err(Error::InvalidConfig("iterations must be at least 1".into()));
        }
        let vocab_size = self.beta.first().map_or(0, Vec::len);
        if dtm.n_cols() != vocab_size {
            return Err(Error::ShapeMismatch(format!(
                "matrix has {} terms, model has {}",
                dtm.n_cols(),
                vocab_size
            )));
        }
        let word_docs = expand_documents(dtm)?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut probs = vec![0.0; self.num_topics];

        let mut theta = Vec::with_capacity(word_docs.len());
        for doc in &word_docs {
            let mut counts = vec![0u32; self.num_topics];
            let mut topics: Vec<usize> = doc
                .iter()
                .map(|_| {
                    let k = rng.gen_range(0..self.num_topics);
                    counts[k] += 1;
                    k
                })
                .collect();
            for _ in 0..iterations {
                for (pos, &word_id) in doc.iter().enumerate() {
                    counts[topics[pos]] -= 1;
                    for (k, p) in probs.iter_mut().enumerate() {
                        *p = (counts[k] as f64 + self.alpha) * self.beta[k][word_id];
                    }
                    let k = sample_index(&probs, &mut rng)?;
                    counts[k] += 1;
                    topics[pos] = k;
                }
            }
            let denom = doc.len() as f64 + self.num_topics as f64 * self.alpha;
            theta.push(counts.iter().map(|&c| (c as f64 + self.alpha) / denom).collect());
        }
        renormalize_rows(&mut theta, "held-out theta");
        Ok(theta)
    }

    /// In-sample perplexity against the matrix the model was fitted on.
    pub fn perplexity(&self, dtm: &SparseMatrix<u32>) -> Result<f64> {
        perplexity::perplexity(&self.theta, &self.beta, dtm)
    }
}

/// `Topic 3: stall-airspeed-spin`, numbered from 1 for people.
fn generate_topic_name(topic_id: usize, words: &[(String, f64)]) -> String {
    let top_words: Vec<&str> = words.iter().take(3).map(|(w, _)| w.as_str()).collect();
    if top_words.is_empty() {
        return format!("Topic {}", topic_id + 1);
    }
    format!("Topic {}: {}", topic_id + 1, top_words.join("-"))
}

/// Count tables of the collapsed sampler.
struct SamplerState {
    word_topic_counts: Vec<Vec<u32>>, // words x topics
    doc_topic_counts: Vec<Vec<u32>>,  // documents x topics
    topic_counts: Vec<u64>,
    doc_lengths: Vec<usize>,
    doc_word_topics: Vec<Vec<usize>>,
}

impl SamplerState {
    fn initialize(word_docs: &[Vec<usize>], vocab_size: usize, num_topics: usize, rng: &mut ChaCha8Rng) -> Self {
        let mut state = SamplerState {
            word_topic_counts: vec![vec![0; num_topics]; vocab_size],
            doc_topic_counts: vec![vec![0; num_topics]; word_docs.len()],
            topic_counts: vec![0; num_topics],
            doc_lengths: word_docs.iter().map(Vec::len).collect(),
            doc_word_topics: Vec::with_capacity(word_docs.len()),
        };
        for (doc_id, doc) in word_docs.iter().enumerate() {
            let mut word_topics = Vec::with_capacity(doc.len());
            for &word_id in doc {
                let topic = rng.gen_range(0..num_topics);
                state.add(doc_id, word_id, topic);
                word_topics.push(topic);
            }
            state.doc_word_topics.push(word_topics);
        }
        state
    }

    fn add(&mut self, doc_id: usize, word_id: usize, topic: usize) {
        self.word_topic_counts[word_id][topic] += 1;
        self.doc_topic_counts[doc_id][topic] += 1;
        self.topic_counts[topic] += 1;
    }

    fn remove(&mut self, doc_id: usize, word_id: usize, topic: usize) {
        self.word_topic_counts[word_id][topic] -= 1;
        self.doc_topic_counts[doc_id][topic] -= 1;
        self.topic_counts[topic] -= 1;
    }

    /// θ_dk = (n_dk + α) / (N_d + Kα)
    fn theta(&self, alpha: f64) -> Vec<Vec<f64>> {
        let k_alpha = self.topic_counts.len() as f64 * alpha;
        self.doc_topic_counts
            .iter()
            .zip(&self.doc_lengths)
            .map(|(counts, &len)| {
                let denom = len as f64 + k_alpha;
                counts.iter().map(|&c| (c as f64 + alpha) / denom).collect()
            })
            .collect()
    }

    /// β_kw = (n_kw + η) / (n_k + Vη)
    fn beta(&self, eta: f64) -> Vec<Vec<f64>> {
        let vocab_eta = self.word_topic_counts.len() as f64 * eta;
        self.topic_counts
            .iter()
            .enumerate()
            .map(|(topic, &total)| {
                let denom = total as f64 + vocab_eta;
                self.word_topic_counts
                    .iter()
                    .map(|counts| (counts[topic] as f64 + eta) / denom)
                    .collect()
            })
            .collect()
    }
}

/// Expand each count row into a token list of term indices, in column order.
fn expand_documents(dtm: &SparseMatrix<u32>) -> Result<Vec<Vec<usize>>> {
    if dtm.is_empty() {
        return Err(Error::EmptyCorpus);
    }
    dtm.rows()
        .enumerate()
        .map(|(row, entries)| {
            let doc: Vec<usize> = entries
                .iter()
                .flat_map(|&(j, c)| std::iter::repeat(j).take(c as usize))
                .collect();
            if doc.is_empty() {
                Err(Error::EmptyDocument { row })
            } else {
                Ok(doc)
            }
        })
        .collect()
}

/// Draw an index with probability proportional to `weights`.
fn sample_index(weights: &[f64], rng: &mut ChaCha8Rng) -> Result<usize> {
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(Error::NumericalFailure(format!(
            "topic weights sum to {total}; check alpha and eta"
        )));
    }
    let mut u = rng.gen::<f64>() * total;
    for (i, &w) in weights.iter().enumerate() {
        u -= w;
        if u < 0.0 {
            return Ok(i);
        }
    }
    // rounding left a sliver past the last bucket
    Ok(weights.iter().rposition(|&w| w > 0.0).unwrap_or(weights.len() - 1))
}

fn accumulate(sum: &mut [Vec<f64>], sample: &[Vec<f64>]) {
    for (acc, row) in sum.iter_mut().zip(sample) {
        for (a, v) in acc.iter_mut().zip(row) {
            *a += v;
        }
    }
}

fn scale(mut rows: Vec<Vec<f64>>, n: f64) -> Vec<Vec<f64>> {
    for row in &mut rows {
        for v in row.iter_mut() {
            *v /= n;
        }
    }
    rows
}

/// Force every row to sum to 1, reporting rows that had drifted.
fn renormalize_rows(rows: &mut [Vec<f64>], what: &str) {
    for (i, row) in rows.iter_mut().enumerate() {
        let sum: f64 = row.iter().sum();
        if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
            warn!(matrix = what, row = i, sum, "posterior row drifted from 1; renormalizing");
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two obvious themes: weather words and engine words.
    fn corpus() -> SparseMatrix<u32> {
        // 0 carburetor, 1 engine, 2 fuel, 3 gust, 4 ice, 5 wind
        SparseMatrix::from_rows(
            6,
            vec![
                vec![(0, 2), (1, 3), (2, 2)],
                vec![(1, 2), (2, 3)],
                vec![(0, 3), (1, 1), (2, 1)],
                vec![(3, 3), (5, 2)],
                vec![(3, 1), (4, 2), (5, 3)],
                vec![(4, 3), (5, 1)],
            ],
        )
        .unwrap()
    }

    fn config(k: usize) -> LDAConfig {
        LDAConfig {
            iterations: 200,
            alpha: Some(0.1),
            ..LDAConfig::with_topics(k)
        }
    }

    fn assert_rows_sum_to_one(rows: &[Vec<f64>]) {
        for row in rows {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6, "row sums to {sum}");
            assert!(row.iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn posteriors_are_distributions() {
        let model = GibbsLDA::new(config(2)).fit(&corpus()).unwrap();
        assert_eq!(model.theta.len(), 6);
        assert_eq!(model.beta.len(), 2);
        assert!(model.beta.iter().all(|row| row.len() == 6));
        assert_rows_sum_to_one(&model.theta);
        assert_rows_sum_to_one(&model.beta);
    }

    #[test]
    fn same_seed_gives_identical_fits() {
        let a = GibbsLDA::new(config(3)).fit(&corpus()).unwrap();
        let b = GibbsLDA::new(config(3)).fit(&corpus()).unwrap();
        assert_eq!(a.theta, b.theta);
        assert_eq!(a.beta, b.beta);
        assert_eq!(a.assignments, b.assignments);
    }

    #[test]
    fn different_seeds_change_assignments() {
        let one_sweep = LDAConfig { iterations: 1, ..config(3) };
        let a = GibbsLDA::new(one_sweep.clone()).fit(&corpus()).unwrap();
        let b = GibbsLDA::new(LDAConfig { seed: 7, ..one_sweep }).fit(&corpus()).unwrap();
        assert_ne!(a.assignments, b.assignments);
    }

    #[test]
    fn separates_obvious_themes() {
        let model = GibbsLDA::new(config(2)).fit(&corpus()).unwrap();
        let engine_topic = model.dominant_topic(0);
        assert_eq!(model.dominant_topic(1), engine_topic);
        assert_eq!(model.dominant_topic(2), engine_topic);
        for row in 3..6 {
            assert_ne!(model.dominant_topic(row), engine_topic);
        }
    }

    #[test]
    fn assignments_cover_every_token() {
        let dtm = corpus();
        let model = GibbsLDA::new(config(2)).fit(&dtm).unwrap();
        for (row, topics) in model.assignments.iter().enumerate() {
            assert_eq!(topics.len() as u64, dtm.row_sum(row));
            assert!(topics.iter().all(|&k| k < 2));
        }
    }

    #[test]
    fn single_topic_puts_all_mass_on_it() {
        let model = GibbsLDA::new(config(1)).fit(&corpus()).unwrap();
        assert!(model.theta.iter().all(|row| row == &vec![1.0]));
    }

    #[test]
    fn thinned_samples_are_still_distributions() {
        let cfg = LDAConfig {
            burn_in: 50,
            thin: 10,
            keep: 25,
            ..config(2)
        };
        let model = GibbsLDA::new(cfg).fit(&corpus()).unwrap();
        assert_rows_sum_to_one(&model.theta);
        assert_rows_sum_to_one(&model.beta);
        let recorded: Vec<usize> = model.log_likelihood.iter().map(|&(i, _)| i).collect();
        assert_eq!(recorded, vec![25, 50, 75, 100, 125, 150, 175, 200]);
        assert!(model.log_likelihood.iter().all(|&(_, ll)| ll < 0.0));
    }

    #[test]
    fn top_terms_are_sorted_by_probability() {
        let vocab = Vocabulary::new(["carburetor", "engine", "fuel", "gust", "ice", "wind"].map(String::from));
        let model = GibbsLDA::new(config(2)).fit(&corpus()).unwrap();
        for topic in 0..2 {
            let top = model.top_terms(topic, 4, &vocab);
            assert_eq!(top.len(), 4);
            assert!(top.windows(2).all(|w| w[0].1 >= w[1].1));
        }
        let topics = model.topics(&vocab, 3);
        assert_eq!(topics.len(), 2);
        assert!(topics[0].name.starts_with("Topic 1: "));
        let assigned: usize = topics.iter().map(|t| t.documents.len()).sum();
        assert_eq!(assigned, 6);
    }

    #[test]
    fn default_alpha_follows_topic_count() {
        assert_eq!(LDAConfig::with_topics(10).alpha(), 5.0);
        assert_eq!(LDAConfig { alpha: Some(0.3), ..LDAConfig::with_topics(10) }.alpha(), 0.3);
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let dtm = corpus();
        let bad = [
            LDAConfig::with_topics(0),
            LDAConfig { iterations: 0, ..config(2) },
            LDAConfig { alpha: Some(0.0), ..config(2) },
            LDAConfig { alpha: Some(f64::NAN), ..config(2) },
            LDAConfig { eta: -1.0, ..config(2) },
            LDAConfig { burn_in: 200, thin: 5, ..config(2) },
            LDAConfig { burn_in: 10, thin: 0, ..config(2) },
        ];
        for cfg in bad {
            assert!(matches!(GibbsLDA::new(cfg).fit(&dtm), Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn drifted_rows_are_renormalized() {
        let mut rows = vec![vec![0.5, 0.6], vec![0.25, 0.75]];
        renormalize_rows(&mut rows, "theta");
        assert_rows_sum_to_one(&rows);
        assert!((rows[0][0] - 0.5 / 1.1).abs() < 1e-12);
        assert_eq!(rows[1], vec![0.25, 0.75]);
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let empty = SparseMatrix::<u32>::from_rows(3, Vec::new()).unwrap();
        assert_eq!(GibbsLDA::new(config(2)).fit(&empty).unwrap_err(), Error::EmptyCorpus);
        let hole = SparseMatrix::from_rows(3, vec![vec![(0, 1u32)], vec![]]).unwrap();
        assert_eq!(GibbsLDA::new(config(2)).fit(&hole).unwrap_err(), Error::EmptyDocument { row: 1 });
    }

    #[test]
    fn infer_returns_distributions_for_new_documents() {
        let model = GibbsLDA::new(config(2)).fit(&corpus()).unwrap();
        let new_docs = SparseMatrix::from_rows(6, vec![vec![(1, 4), (2, 1)], vec![(5, 5)]]).unwrap();
        let theta = model.infer(&new_docs, 50, 1).unwrap();
        assert_rows_sum_to_one(&theta);
        let engine_topic = model.dominant_topic(0);
        assert!(theta[0][engine_topic] > theta[1][engine_topic]);
        assert_eq!(theta, model.infer(&new_docs, 50, 1).unwrap());

        let wrong = SparseMatrix::from_rows(2, vec![vec![(0, 1u32)]]).unwrap();
        assert!(matches!(model.infer(&wrong, 10, 1), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn sampler_rejects_unusable_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(sample_index(&[f64::NAN, 1.0], &mut rng), Err(Error::NumericalFailure(_))));
        assert!(matches!(sample_index(&[0.0, 0.0], &mut rng), Err(Error::NumericalFailure(_))));
        assert_eq!(sample_index(&[0.0, 2.0, 0.0], &mut rng).unwrap(), 1);
    }
}
