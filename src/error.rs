//! Error types for sol_tracker operations.

use thiserror::Error;

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, SolError>;

/// Errors that can occur while tracking the sun.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolError {
    /// Latitude or longitude outside the valid range. Fatal for the configuration.
    #[error("invalid location: latitude {latitude}, longitude {longitude}")]
    InvalidLocation {
        /// Offending latitude in degrees.
        latitude: f64,
        /// Offending longitude in degrees.
        longitude: f64,
    },

    /// A configuration value other than the location was rejected.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Which value was rejected and why.
        message: String,
    },

    /// The signal did not reach its next step within the search lookahead.
    #[error("no crossing of {target} found within {lookahead_hours} h")]
    NoCrossingFound {
        /// Value the search was looking for.
        target: f64,
        /// Lookahead bound that was exhausted.
        lookahead_hours: i64,
    },

    /// The ephemeris could not produce a position.
    #[error("oracle error: {message}")]
    Oracle {
        /// Description of the ephemeris failure.
        message: String,
    },

    /// A persisted cache is older than its anchor allows.
    #[error("reversal cache is stale: {message}")]
    CacheStale {
        /// Why the snapshot was considered stale.
        message: String,
    },

    /// A persisted cache could not be decoded or violates its invariants.
    #[error("reversal cache is corrupt: {message}")]
    CacheCorrupt {
        /// Why the snapshot was rejected.
        message: String,
    },

    /// The durable store failed to load or save.
    #[error("store error: {message}")]
    Store {
        /// Description of the storage failure.
        message: String,
    },

    /// The background tracker task is no longer running.
    #[error("tracker has shut down")]
    Shutdown,
}

impl SolError {
    /// Creates an invalid-configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an oracle error.
    pub fn oracle(message: impl Into<String>) -> Self {
        Self::Oracle {
            message: message.into(),
        }
    }

    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Creates a corrupt-cache error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CacheCorrupt {
            message: message.into(),
        }
    }

    /// Creates a stale-cache error.
    pub fn stale(message: impl Into<String>) -> Self {
        Self::CacheStale {
            message: message.into(),
        }
    }

    /// True for errors that invalidate the whole configuration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidLocation { .. } | Self::InvalidConfig { .. })
    }
}

impl From<std::io::Error> for SolError {
    fn from(err: std::io::Error) -> Self {
        Self::store(err.to_string())
    }
}
