pub mod backends;
pub mod cache;
pub mod config;
pub mod executor;
pub mod filter;
pub mod index;
pub mod model;
pub mod parsers;
pub mod traits;

// Re-export common types for convenience
pub use config::{load_config, ConfigError, IndexerConfig};
pub use executor::*;
pub use index::{index_repository, IndexPipeline, IndexReport, PipelineError};
pub use model::*;
pub use traits::*;
