//! HTTP provider management for chain connections.
//!
//! ## Example
//!
//! ```no_run
//! use referral_sync::rpc::{create_provider, get_latest_block};
//! use referral_sync::error::IndexerResult;
//!
//! # async fn example() -> IndexerResult<()> {
//! let provider = create_provider("https://bsc-dataseed.example.org").await?;
//! let latest_block = get_latest_block(&provider).await?;
//! println!("Latest block: {}", latest_block);
//! # Ok(())
//! # }
//! ```

use crate::error::{IndexerError, IndexerResult};
use alloy::providers::{Provider as AlloProvider, ProviderBuilder, RootProvider};
use alloy::transports::http::{Client, Http};
use tracing::{debug, info, instrument, warn};

/// Type alias for the HTTP provider.
pub type Provider = RootProvider<Http<Client>>;

/// Strip path and query from an RPC URL so API keys never reach the logs.
fn redacted_host(rpc_url: &str) -> &str {
    let without_scheme = rpc_url.split("://").nth(1).unwrap_or(rpc_url);
    without_scheme.split(['/', '?']).next().unwrap_or("unknown")
}

/// Create a new chain RPC provider connected via HTTP.
///
/// # Errors
///
/// Returns an error if the RPC URL cannot be parsed.
#[allow(clippy::unused_async)]
#[instrument(skip(rpc_url), fields(rpc_host = tracing::field::Empty))]
pub async fn create_provider(rpc_url: &str) -> IndexerResult<Provider> {
    let host = redacted_host(rpc_url);
    tracing::Span::current().record("rpc_host", host);
    debug!(rpc_host = host, "Creating HTTP provider");

    let url = rpc_url.parse().map_err(|e| {
        IndexerError::rpc(
            format!("Invalid RPC URL for host '{host}'. Expected format: 'https://host/path'"),
            Some(Box::new(e)),
        )
    })?;

    let provider = ProviderBuilder::new().on_http(url);

    info!(rpc_host = host, "RPC provider initialized");

    Ok(provider)
}

/// Get the latest block number from the chain.
///
/// # Errors
///
/// Returns an error if the RPC request fails.
#[instrument(skip(provider), fields(block = tracing::field::Empty, duration_ms = tracing::field::Empty))]
pub async fn get_latest_block(provider: &Provider) -> IndexerResult<u64> {
    let start = std::time::Instant::now();
    let block_number = provider
        .get_block_number()
        .await
        .map_err(|e| IndexerError::rpc("Failed to fetch latest block number", Some(Box::new(e))))?;

    let duration = start.elapsed();
    tracing::Span::current().record("block", block_number);
    tracing::Span::current().record("duration_ms", duration.as_millis() as u64);

    debug!(block = block_number, "Latest block fetched");

    Ok(block_number)
}

/// Check if the provider connection is healthy by fetching the latest block.
///
/// # Errors
///
/// Returns an error if the RPC connection is not working.
#[instrument(skip(provider))]
pub async fn check_connection(provider: &Provider) -> IndexerResult<u64> {
    match get_latest_block(provider).await {
        Ok(block) => {
            info!(block = block, "Connection check successful");
            Ok(block)
        }
        Err(e) => {
            warn!(error = %e, "Connection check failed");
            Err(IndexerError::rpc(
                format!("Provider connection health check failed: {e}"),
                None,
            ))
        }
    }
}
