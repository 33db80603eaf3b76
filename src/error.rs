//! Error types for kinlink.

use thiserror::Error;

/// Result type for kinlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for kinlink operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid configuration: mismatched field lists, bad weights, bad priors.
    ///
    /// Always a caller bug. Fails the operation immediately and is never
    /// silently defaulted.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The candidate search index could not be constructed.
    ///
    /// Distinct from an empty candidate list: an empty range query is a valid
    /// result, a failed construction means any results would be untrustworthy.
    #[error("Search index construction failed: {0}")]
    IndexConstruction(String),

    /// A record or edge expected to be present could not be read from an
    /// external store.
    #[error("Store error: {0}")]
    Store(String),

    /// A long-running sweep was cancelled cooperatively.
    #[error("Operation cancelled after {comparisons} comparisons")]
    Cancelled {
        /// Number of pair comparisons completed before the cancel was observed.
        comparisons: u64,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an index-construction error.
    pub fn index_construction(msg: impl Into<String>) -> Self {
        Error::IndexConstruction(msg.into())
    }

    /// Create a store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::config("field lists differ in length: 3 vs 4");
        assert!(e.to_string().contains("field lists differ"));

        let e = Error::Cancelled { comparisons: 1000 };
        assert!(e.to_string().contains("1000"));
    }

    #[test]
    fn test_index_construction_distinct_from_store() {
        let e = Error::index_construction("too few reference points");
        assert!(matches!(e, Error::IndexConstruction(_)));
        assert!(!matches!(e, Error::Store(_)));
    }
}
