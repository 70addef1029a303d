//! Error types for the cache store
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache store.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Size tracking is enabled but the entry has no size and no calculator
    #[error("Missing size: max_size or max_entry_size is set, but no size or size_calculation was given")]
    MissingSize,

    /// The computed or supplied entry size is not a positive integer
    #[error("Invalid size: entry size must be greater than zero")]
    InvalidSize,

    /// None of max, max_size or ttl was configured
    #[error("Unbounded cache: at least one of max, max_size or ttl is required")]
    Unbounded,

    /// The configured fetch method failed
    #[error("Fetch failed: {0}")]
    Fetch(Arc<anyhow::Error>),
}

impl From<anyhow::Error> for CacheError {
    fn from(err: anyhow::Error) -> Self {
        CacheError::Fetch(Arc::new(err))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache store.
pub type Result<T> = std::result::Result<T, CacheError>;
