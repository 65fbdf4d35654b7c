//! Vocabulary and document-term matrix construction.

use std::collections::HashMap;

use counter::Counter;
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};

/// Row-major sparse matrix. Each row holds `(column, value)` pairs sorted by
/// column, without explicit zeros unless a weighting scheme produced them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SparseMatrix<T> {
    n_cols: usize,
    rows: Vec<Vec<(usize, T)>>,
}

impl<T: Copy> SparseMatrix<T> {
    /// Build from rows; entries must be sorted by column and lie inside
    /// `n_cols`.
    pub fn from_rows(n_cols: usize, rows: Vec<Vec<(usize, T)>>) -> Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.windows(2).any(|w| w[0].0 >= w[1].0) {
                return Err(Error::ShapeMismatch(format!("row {i} columns are not strictly increasing")));
            }
            if row.last().is_some_and(|&(c, _)| c >= n_cols) {
                return Err(Error::ShapeMismatch(format!("row {i} has a column outside 0..{n_cols}")));
            }
        }
        Ok(SparseMatrix { n_cols, rows })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, i: usize) -> &[(usize, T)] {
        &self.rows[i]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[(usize, T)]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Stored entries.
    pub fn nnz(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        let row = &self.rows[row];
        row.binary_search_by_key(&col, |&(c, _)| c).ok().map(|i| row[i].1)
    }

    /// Keep only the rows at `keep` (ascending positions), in order.
    pub fn select_rows(&self, keep: &[usize]) -> Self {
        SparseMatrix {
            n_cols: self.n_cols,
            rows: keep.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    pub(crate) fn map<U>(&self, mut f: impl FnMut(usize, usize, T) -> U) -> SparseMatrix<U> {
        SparseMatrix {
            n_cols: self.n_cols,
            rows: self
                .rows
                .iter()
                .enumerate()
                .map(|(i, row)| row.iter().map(|&(j, v)| (j, f(i, j, v))).collect())
                .collect(),
        }
    }
}

impl<T: Copy + Default> SparseMatrix<T> {
    pub fn to_dense(&self) -> Vec<Vec<T>> {
        self.rows
            .iter()
            .map(|row| {
                let mut dense = vec![T::default(); self.n_cols];
                for &(j, v) in row {
                    dense[j] = v;
                }
                dense
            })
            .collect()
    }
}

impl SparseMatrix<u32> {
    pub fn row_sum(&self, i: usize) -> u64 {
        self.rows[i].iter().map(|&(_, c)| u64::from(c)).sum()
    }

    /// Total token occurrences in the matrix.
    pub fn total(&self) -> u64 {
        (0..self.n_rows()).map(|i| self.row_sum(i)).sum()
    }

    /// Number of rows with a non-zero count in each column.
    pub fn document_frequencies(&self) -> Vec<usize> {
        let mut df = vec![0usize; self.n_cols];
        for row in &self.rows {
            for &(j, c) in row {
                if c > 0 {
                    df[j] += 1;
                }
            }
        }
        df
    }
}

/// Terms kept after pruning, in lexicographic order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vocabulary {
    terms: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Vocabulary {
    /// Build from arbitrary terms; duplicates collapse and order is sorted.
    pub fn new(terms: impl IntoIterator<Item = String>) -> Self {
        let mut terms: Vec<String> = terms.into_iter().collect();
        terms.sort();
        terms.dedup();
        let index = terms.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();
        Vocabulary { terms, index }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    pub fn term(&self, index: usize) -> Option<&str> {
        self.terms.get(index).map(String::as_str)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.terms.iter().enumerate().map(|(i, t)| (i, t.as_str()))
    }
}

/// Document-frequency pruning window and token filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DtmOptions {
    /// Lowest fraction of documents a term must appear in.
    pub min_doc_freq: f64,
    /// Highest fraction of documents a term may appear in.
    pub max_doc_freq: f64,
    /// Tokens shorter than this many characters are ignored.
    pub min_word_length: usize,
}

impl Default for DtmOptions {
    fn default() -> Self {
        DtmOptions {
            min_doc_freq: 0.01,
            max_doc_freq: 0.80,
            min_word_length: 1,
        }
    }
}

impl DtmOptions {
    pub fn with_bounds(min_doc_freq: f64, max_doc_freq: f64) -> Self {
        DtmOptions {
            min_doc_freq,
            max_doc_freq,
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        let (min, max) = (self.min_doc_freq, self.max_doc_freq);
        let in_unit = |f: f64| f.is_finite() && (0.0..=1.0).contains(&f);
        if !in_unit(min) || !in_unit(max) || min > max {
            return Err(Error::InvalidFrequencyBounds { min, max });
        }
        Ok(())
    }

    /// Inclusive document-count window `[ceil(N*min), floor(N*max)]`.
    pub fn document_count_bounds(&self, total_documents: usize) -> (usize, usize) {
        let n = total_documents as f64;
        let lower = snap(n * self.min_doc_freq).ceil() as usize;
        let upper = snap(n * self.max_doc_freq).floor() as usize;
        (lower, upper)
    }
}

/// Products such as `100 * 0.07` land a hair off the integer; pull them back.
fn snap(x: f64) -> f64 {
    let r = x.round();
    if (x - r).abs() < 1e-9 {
        r
    } else {
        x
    }
}

/// Pruned count matrix plus the bookkeeping needed to line rows back up with
/// the documents they came from.
#[derive(Debug, Clone, Serialize)]
pub struct Dtm {
    vocabulary: Vocabulary,
    counts: SparseMatrix<u32>,
    rows: Vec<usize>,
    empty_rows: Vec<usize>,
    total_documents: usize,
    bounds: (usize, usize),
}

impl Dtm {
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn counts(&self) -> &SparseMatrix<u32> {
        &self.counts
    }

    /// Input position of each matrix row.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Input positions whose row was empty after pruning.
    pub fn empty_rows(&self) -> &[usize] {
        &self.empty_rows
    }

    /// Corpus size `N` the pruning window was computed from.
    pub fn total_documents(&self) -> usize {
        self.total_documents
    }

    /// Inclusive document-count window used for pruning.
    pub fn bounds(&self) -> (usize, usize) {
        self.bounds
    }

    pub fn document_frequencies(&self) -> Vec<usize> {
        self.counts.document_frequencies()
    }

    /// Corpus-wide occurrences of each vocabulary term.
    pub fn term_totals(&self) -> Vec<u64> {
        let mut totals = vec![0u64; self.vocabulary.len()];
        for row in self.counts.rows() {
            for &(j, c) in row {
                totals[j] += u64::from(c);
            }
        }
        totals
    }
}

/// Count tokens per document, prune terms by document frequency and drop rows
/// left empty.
///
/// `N` is `docs.len()`, including documents that normalized to nothing.
pub fn build_dtm<S: AsRef<str>>(docs: &[Vec<S>], options: &DtmOptions) -> Result<Dtm> {
    options.validate()?;
    if docs.is_empty() {
        return Err(Error::EmptyCorpus);
    }
    if docs.iter().all(Vec::is_empty) {
        return Err(Error::AllDocumentsEmpty(docs.len()));
    }

    let doc_counts: Vec<Counter<&str>> = docs
        .iter()
        .map(|doc| {
            let mut counts: Counter<&str> = Counter::new();
            for token in doc {
                let token = token.as_ref();
                if token.chars().count() >= options.min_word_length {
                    counts[&token] += 1;
                }
            }
            counts
        })
        .collect();

    let mut doc_freq: Counter<&str> = Counter::new();
    for counts in &doc_counts {
        for &term in counts.keys() {
            doc_freq[&term] += 1;
        }
    }

    let total_documents = docs.len();
    let (lower, upper) = options.document_count_bounds(total_documents);
    let vocabulary = Vocabulary::new(
        doc_freq
            .iter()
            .filter(|&(_, &df)| df >= lower && df <= upper)
            .map(|(&term, _)| term.to_string()),
    );
    if vocabulary.is_empty() {
        return Err(Error::DegenerateVocabulary {
            lower,
            upper,
            candidates: doc_freq.len(),
        });
    }

    let mut rows = Vec::new();
    let mut empty_rows = Vec::new();
    let mut matrix = Vec::new();
    for (position, counts) in doc_counts.iter().enumerate() {
        let mut row: Vec<(usize, u32)> = counts
            .iter()
            .filter_map(|(&term, &c)| vocabulary.index_of(term).map(|j| (j, c as u32)))
            .collect();
        if row.is_empty() {
            empty_rows.push(position);
            continue;
        }
        row.sort_unstable_by_key(|&(j, _)| j);
        rows.push(position);
        matrix.push(row);
    }

    info!(
        documents = total_documents,
        candidates = doc_freq.len(),
        vocabulary = vocabulary.len(),
        lower,
        upper,
        kept_rows = rows.len(),
        empty_rows = empty_rows.len(),
        "built document-term matrix"
    );

    Ok(Dtm {
        counts: SparseMatrix {
            n_cols: vocabulary.len(),
            rows: matrix,
        },
        vocabulary,
        rows,
        empty_rows,
        total_documents,
        bounds: (lower, upper),
    })
}
