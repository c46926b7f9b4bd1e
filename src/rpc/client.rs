//! The chain log reader used by the synchronizer.
//!
//! [`ChainClient`] is the narrow seam between sync logic and the network:
//! current head, decoded events for a block window, and optional block
//! timestamps. [`AlloyChainClient`] implements it over an HTTP provider,
//! retrying transient failures and classifying provider range refusals as
//! [`IndexerError::RangeLimitError`].

use async_trait::async_trait;
use alloy::primitives::Address;
use alloy::providers::Provider as _;
use alloy::rpc::types::BlockTransactionsKind;
use tracing::{debug, instrument, warn};

use super::http::{check_connection, create_provider, Provider};
use crate::error::{BoxedSource, IndexerError, IndexerResult};
use crate::events::{create_event_filter, decode_log, DecodedEvent, EventType};
use crate::retry::{retry_with_backoff, Backoff};

/// Error fragments providers use when a log query spans too many blocks or
/// returns too many results. Matched case-insensitively.
pub const RANGE_LIMIT_PATTERNS: &[&str] = &[
    "block range",
    "range is too large",
    "range too large",
    "exceed maximum block range",
    "query returned more than",
    "query exceeds max results",
    "response size exceeded",
    "log response size",
    "too many blocks",
    "eth_getlogs is limited",
];

/// Throttling fragments. These are transient and retried, never treated as
/// a range refusal even when a range pattern also matches.
const THROTTLE_PATTERNS: &[&str] = &["rate limit", "too many requests"];

/// Whether a provider error message signals a block-range refusal.
#[must_use]
pub fn is_range_limit_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    if THROTTLE_PATTERNS.iter().any(|pattern| lowered.contains(pattern)) {
        return false;
    }
    RANGE_LIMIT_PATTERNS
        .iter()
        .any(|pattern| lowered.contains(pattern))
}

/// Turn a transport failure into a range-limit or plain RPC error.
fn classify_rpc_error(context: &str, err: impl Into<BoxedSource>) -> IndexerError {
    let source: BoxedSource = err.into();
    let text = source.to_string();
    if is_range_limit_message(&text) {
        IndexerError::range_limit(text)
    } else {
        IndexerError::rpc(format!("{context}: {text}"), Some(source))
    }
}

/// Upstream chain capabilities required by the sync cursor.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain head.
    async fn current_block_number(&self) -> IndexerResult<u64>;

    /// Decoded events of `event_type` emitted by `contract` within
    /// `[from_block, to_block]`, in provider order.
    ///
    /// Fails with [`IndexerError::RangeLimitError`] when the provider refuses
    /// the window.
    async fn get_events(
        &self,
        contract: Address,
        event_type: EventType,
        from_block: u64,
        to_block: u64,
    ) -> IndexerResult<Vec<DecodedEvent>>;

    /// Real timestamp of a block, if the chain can provide one.
    async fn block_timestamp(&self, block_number: u64) -> IndexerResult<Option<u64>>;
}

/// [`ChainClient`] backed by an alloy HTTP provider.
#[derive(Debug, Clone)]
pub struct AlloyChainClient {
    provider: Provider,
    max_attempts: u32,
    backoff: Backoff,
}

impl AlloyChainClient {
    /// Wrap an existing provider.
    #[must_use]
    pub fn new(provider: Provider, max_attempts: u32) -> Self {
        Self {
            provider,
            max_attempts,
            backoff: Backoff::default(),
        }
    }

    /// Connect to `rpc_url` and confirm the node answers a head query.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the node is unreachable.
    pub async fn connect(rpc_url: &str, max_attempts: u32) -> IndexerResult<Self> {
        let provider = create_provider(rpc_url).await?;
        check_connection(&provider).await?;
        Ok(Self::new(provider, max_attempts))
    }

    /// Override the retry backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    #[instrument(skip(self))]
    async fn current_block_number(&self) -> IndexerResult<u64> {
        retry_with_backoff(
            "get_block_number",
            self.max_attempts,
            &self.backoff,
            IndexerError::is_transient,
            || async {
                self.provider
                    .get_block_number()
                    .await
                    .map_err(|e| classify_rpc_error("Failed to fetch latest block number", e))
            },
        )
        .await
    }

    #[instrument(skip(self), fields(logs = tracing::field::Empty))]
    async fn get_events(
        &self,
        contract: Address,
        event_type: EventType,
        from_block: u64,
        to_block: u64,
    ) -> IndexerResult<Vec<DecodedEvent>> {
        let filter = create_event_filter(contract, event_type, from_block, to_block);

        let logs = retry_with_backoff(
            "get_logs",
            self.max_attempts,
            &self.backoff,
            IndexerError::is_transient,
            || async {
                self.provider
                    .get_logs(&filter)
                    .await
                    .map_err(|e| classify_rpc_error("Failed to fetch logs", e))
            },
        )
        .await?;

        tracing::Span::current().record("logs", logs.len());

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            if log.removed {
                warn!(block = ?log.block_number, "Skipping log removed by reorg");
                continue;
            }
            events.push(decode_log(event_type, log)?);
        }

        debug!(count = events.len(), "Decoded events");
        Ok(events)
    }

    #[instrument(skip(self))]
    async fn block_timestamp(&self, block_number: u64) -> IndexerResult<Option<u64>> {
        let block = retry_with_backoff(
            "get_block_by_number",
            self.max_attempts,
            &self.backoff,
            IndexerError::is_transient,
            || async {
                self.provider
                    .get_block_by_number(block_number.into(), BlockTransactionsKind::Hashes)
                    .await
                    .map_err(|e| classify_rpc_error("Failed to fetch block", e))
            },
        )
        .await?;

        Ok(block.map(|b| b.header.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_limit_messages() {
        for message in [
            "query returned more than 10000 results",
            "Block range is too large",
            "exceed maximum block range: 5000",
            "eth_getLogs is limited to a 1000 blocks range",
            "Log response size exceeded. You can make eth_getLogs requests with up to a 2K block range",
            "too many blocks requested",
        ] {
            assert!(is_range_limit_message(message), "{message}");
        }
    }

    #[test]
    fn test_other_messages_are_not_range_limits() {
        for message in [
            "connection reset by peer",
            "execution reverted",
            "request timed out",
            "invalid params",
            "server error: limit exceeded",
            "429 Too Many Requests: rate limit exceeded",
            "Rate limit exceeded for block range queries",
        ] {
            assert!(!is_range_limit_message(message), "{message}");
        }
    }

    #[test]
    fn test_classify_rpc_error() {
        let err = classify_rpc_error(
            "Failed to fetch logs",
            "query returned more than 10000 results".to_string(),
        );
        assert!(err.is_range_limit());

        let err = classify_rpc_error(
            "Failed to fetch logs",
            "429 Too Many Requests: rate limit exceeded".to_string(),
        );
        assert!(!err.is_range_limit());
        assert!(err.is_transient());

        let err = classify_rpc_error("Failed to fetch logs", "connection refused".to_string());
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "RPC error: Failed to fetch logs: connection refused"
        );
    }
}
