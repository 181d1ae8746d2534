mod error;
mod fusion;
mod semantic;

pub use error::{Result, SearchError};
pub use fusion::{FusionWeights, MergedHit, QueryFusionEngine, ScoredEntity, Signal};
pub use semantic::SemanticSearch;
