//! Memoised lookups shared across one indexing run.
//!
//! - [`OwnerResolver`]: maintainer directory, fetched once with bounded retry
//! - [`ArchiveFileCache`]: scoped, lazily extracted view of one package payload
//! - [`IconResolver`]: icon-theme lookup and artifact generation
//!
//! None of these are process-wide: the pipeline receives them by injection,
//! so two runs never share state.

pub mod archive;
pub mod icon;
pub mod owner;

pub use archive::ArchiveFileCache;
pub use icon::IconResolver;
pub use owner::{OwnerResolver, RetryPolicy, DEFAULT_MAX_ATTEMPTS};
