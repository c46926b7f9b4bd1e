//! Error types for the referral event synchronizer.
//!
//! This module provides a unified error type [`IndexerError`] covering every
//! failure that can occur while mirroring on-chain referral events into the
//! local store.
//!
//! # Design
//!
//! The error hierarchy is organized by layer:
//! - [`IndexerError::ConfigError`]: Configuration and environment issues
//! - [`IndexerError::RpcError`]: RPC provider and network errors
//! - [`IndexerError::RangeLimitError`]: Provider refused the requested block window
//! - [`IndexerError::DecodingError`]: Event decoding and parsing errors
//! - [`IndexerError::DatabaseError`]: Store reads and writes
//! - [`IndexerError::CursorConflict`]: Concurrent cursor advancement detected
//! - [`IndexerError::ValidationError`]: Invalid caller input
//!
//! All errors implement [`std::error::Error`] and include rich context via
//! the source error chain.
//!
//! # Example
//!
//! ```
//! use referral_sync::error::{IndexerError, IndexerResult};
//!
//! fn validate_window(window: u64) -> IndexerResult<()> {
//!     if window == 0 {
//!         return Err(IndexerError::validation("window cannot be zero"));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;

/// Result type alias using [`IndexerError`].
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Boxed source error carried by most variants.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for the referral event synchronizer.
#[derive(Debug)]
pub enum IndexerError {
    /// Configuration or environment variable errors.
    ///
    /// Variants include:
    /// - Missing or invalid environment variables
    /// - Invalid addresses or URLs
    /// - Inconsistent window bounds
    ConfigError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// RPC provider or network errors.
    RpcError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// The log provider rejected a block window as too wide.
    ///
    /// This is the only RPC failure the sync cursor recovers from locally,
    /// by halving its window.
    RangeLimitError {
        /// Provider message that matched a known range-limit pattern
        message: String,
    },

    /// Event decoding or parsing errors.
    DecodingError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// Database operation errors.
    DatabaseError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// Another sync run advanced the cursor first.
    ///
    /// Raised when the optimistic version check on the cursor row fails.
    CursorConflict {
        /// Event type of the contested cursor
        event_type: String,
        /// Contract address of the contested cursor
        contract_address: String,
        /// Version this run read before advancing
        expected_version: i64,
    },

    /// Invalid caller input (query parameters, CLI arguments).
    ValidationError {
        /// Human-readable error message
        message: String,
    },
}

impl IndexerError {
    /// Create a new configuration error.
    ///
    /// # Example
    ///
    /// ```
    /// use referral_sync::error::IndexerError;
    ///
    /// let err = IndexerError::config("RPC_URL not set", None);
    /// assert!(matches!(err, IndexerError::ConfigError { .. }));
    /// ```
    #[must_use]
    pub fn config(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::ConfigError {
            message: message.into(),
            source,
        }
    }

    /// Create a new RPC error.
    ///
    /// # Example
    ///
    /// ```
    /// use referral_sync::error::IndexerError;
    ///
    /// let err = IndexerError::rpc("Failed to connect to provider", None);
    /// assert!(matches!(err, IndexerError::RpcError { .. }));
    /// ```
    #[must_use]
    pub fn rpc(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::RpcError {
            message: message.into(),
            source,
        }
    }

    /// Create a new range-limit error.
    #[must_use]
    pub fn range_limit(message: impl Into<String>) -> Self {
        Self::RangeLimitError {
            message: message.into(),
        }
    }

    /// Create a new decoding error.
    #[must_use]
    pub fn decoding(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::DecodingError {
            message: message.into(),
            source,
        }
    }

    /// Create a new database error.
    ///
    /// # Example
    ///
    /// ```
    /// use referral_sync::error::IndexerError;
    ///
    /// let err = IndexerError::database("Connection failed", None);
    /// assert!(matches!(err, IndexerError::DatabaseError { .. }));
    /// ```
    #[must_use]
    pub fn database(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::DatabaseError {
            message: message.into(),
            source,
        }
    }

    /// Create a new cursor conflict error.
    #[must_use]
    pub fn cursor_conflict(
        event_type: impl Into<String>,
        contract_address: impl Into<String>,
        expected_version: i64,
    ) -> Self {
        Self::CursorConflict {
            event_type: event_type.into(),
            contract_address: contract_address.into(),
            expected_version,
        }
    }

    /// Create a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    /// Whether this error is a provider block-range refusal.
    #[must_use]
    pub const fn is_range_limit(&self) -> bool {
        matches!(self, Self::RangeLimitError { .. })
    }

    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Range-limit refusals are deterministic for a given window, and
    /// decoding, config and validation errors never heal on their own.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::RpcError { .. })
    }
}

impl fmt::Display for IndexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError { message, .. } => write!(f, "Configuration error: {message}"),
            Self::RpcError { message, .. } => write!(f, "RPC error: {message}"),
            Self::RangeLimitError { message } => write!(f, "Block range limit: {message}"),
            Self::DecodingError { message, .. } => write!(f, "Decoding error: {message}"),
            Self::DatabaseError { message, .. } => write!(f, "Database error: {message}"),
            Self::CursorConflict {
                event_type,
                contract_address,
                expected_version,
            } => write!(
                f,
                "Cursor conflict: {event_type}@{contract_address} moved past version {expected_version}"
            ),
            Self::ValidationError { message } => write!(f, "Validation error: {message}"),
        }
    }
}

impl std::error::Error for IndexerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigError { source, .. }
            | Self::RpcError { source, .. }
            | Self::DecodingError { source, .. }
            | Self::DatabaseError { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &dyn std::error::Error),
            Self::RangeLimitError { .. }
            | Self::CursorConflict { .. }
            | Self::ValidationError { .. } => None,
        }
    }
}

/// Convert from `eyre::Report` to `IndexerError`.
///
/// Reports that don't fit a specific category are treated as RPC errors.
impl From<eyre::Report> for IndexerError {
    fn from(err: eyre::Report) -> Self {
        Self::RpcError {
            message: err.to_string(),
            source: None,
        }
    }
}
