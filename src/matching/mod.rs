// src/matching/mod.rs
pub mod blocking;
pub mod embedding;
pub mod merge;
pub mod normalize;
pub mod similarity;

pub use blocking::{blocking_key, Block, BlockingIndex};
pub use merge::{merge_into, DedupOutcome, MergeGroup, MergeReason, MergeResolver};
pub use normalize::{canonical_website, normalize_name};
pub use similarity::{build_similarity_scorer, LexicalSimilarity, SimilarityScorer};
