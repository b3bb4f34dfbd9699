//! Retrieval engine (§4.2): timeframe parsing and the three search
//! strategies (fulltext, vector, hybrid), fused by Reciprocal Rank Fusion
//! with tag-based boosting.

mod hybrid;
mod rrf;
mod timeframe;

pub use hybrid::{fulltext_recall, hybrid_recall, vector_recall, SearchResult, Strategy};
pub use rrf::reciprocal_rank_fusion;
pub use timeframe::{parse_auto, parse_phrase, Timeframe, RECENT_DAYS, VAGUE_DAYS_AGO};
