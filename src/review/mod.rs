pub mod artifact;
pub mod orchestrator;
pub mod result;

pub use artifact::{ArtifactSource, FsArtifactSource};
pub use orchestrator::{ModelInfo, ModelListing, ReviewOrchestrator};
pub use result::{aggregate, AggregateResult, ModelReview, ReviewResponse, ReviewStatus, TokensUsed};
