/// Errors raised by the narrative feature pipeline and topic engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// No documents were supplied.
    #[error("empty corpus: no documents supplied")]
    EmptyCorpus,
    /// Every document normalized to an empty token stream.
    #[error("all {0} documents are empty after normalization")]
    AllDocumentsEmpty(usize),
    /// Document-frequency fractions were not usable.
    #[error("invalid document-frequency bounds: min {min}, max {max} (need 0 <= min <= max <= 1)")]
    InvalidFrequencyBounds { min: f64, max: f64 },
    /// No term fell inside the document-frequency window.
    #[error("no term survives pruning: document frequency window [{lower}, {upper}] over {candidates} candidate terms")]
    DegenerateVocabulary {
        lower: usize,
        upper: usize,
        candidates: usize,
    },
    /// A model or weighting parameter was out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A matrix row handed to the topic engine had no terms.
    #[error("document row {row} has no terms")]
    EmptyDocument { row: usize },
    /// Matrices that must line up do not.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    /// Sampling or likelihood arithmetic produced an unusable value.
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
}

pub type Result<T> = std::result::Result<T, Error>;
