//! Text features and topic inference for accident "probable cause"
//! narratives.
//!
//! Pipeline: [`normalize`] raw narratives into tokens, count and prune them
//! into a document-term matrix ([`dtm`]), then either reweight it with
//! [`tfidf`] or decompose it into topics with [`topic_modeling`] and score
//! the fit with [`perplexity`]. [`pipeline`] wires the first two steps for a
//! batch of identified records and keeps every matrix row traceable to its
//! record.

pub mod dtm;
pub mod error;
pub mod models;
pub mod normalize;
pub mod perplexity;
pub mod pipeline;
pub mod stopwords;
pub mod tfidf;
pub mod topic_modeling;

pub use dtm::{build_dtm, Dtm, DtmOptions, SparseMatrix, Vocabulary};
pub use error::{Error, Result};
pub use normalize::Normalizer;
pub use perplexity::{heldout_perplexity_sweep, perplexity, perplexity_sweep, PerplexityPoint};
pub use pipeline::{prepare_corpus, Corpus, DropReason, DroppedRecord, Narrative, RecordId};
pub use tfidf::{tfidf, IdfVariant, TfIdfParams, TfVariant};
pub use topic_modeling::{GibbsLDA, LDAConfig, ModeledTopic, TopicModel};
