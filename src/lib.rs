// Core modules
pub mod ai;
pub mod config;
pub mod review;

// Front end and shared infrastructure
pub mod cli;
pub mod infrastructure;

pub use config::{ModelConfig, ModelRegistry, ProviderKind, ReviewConfig, ReviewSettings};
pub use infrastructure::error::{Result, ReviewError};
pub use review::{AggregateResult, ReviewOrchestrator};
