//! Configuration management for the referral event synchronizer.
//!
//! This module handles loading and validating configuration from environment variables
//! using the `dotenvy` crate. All operations return [`IndexerResult`].
//!
//! ## Environment Variables
//!
//! Required:
//! - `RPC_URL`: HTTP(S) JSON-RPC endpoint of the chain
//! - `REFERRAL_CONTRACT`: Address of the contract emitting referral events
//!
//! Optional (with defaults):
//! - `DATABASE_URL`: SQLite database (default: `sqlite:./referral_sync.db`)
//! - `MAX_BLOCK_WINDOW`: Provider ceiling for one log query (default: 1000)
//! - `MIN_BLOCK_WINDOW`: Floor when shrinking the window (default: 100)
//! - `REORG_MARGIN`: Blocks left behind the head when nothing was found (default: 10)
//! - `MEMBER_ADDED_START_BLOCK` / `UPLINE_CHANGED_START_BLOCK`: Cursor seeds (default: 47304058)
//! - `GENESIS_TIMESTAMP`: Linear clock origin in unix seconds (default: 1598671449)
//! - `AVG_BLOCK_TIME_MS`: Linear clock step (default: 3000)
//! - `USE_CHAIN_TIMESTAMPS`: Fetch real block timestamps (default: false)
//! - `RPC_MAX_RETRIES`: Attempts for transient RPC failures (default: 3)
//! - `AUTO_SYNC_PAUSE_MS`: Pause between auto-sync iterations (default: 1000)
//! - `API_PORT`: HTTP port (default: 3000)
//! - `RATE_LIMIT_RPM`: Request quota per minute (default: 60)
//! - `CORS_ORIGINS`: Comma separated allowed origins (default: `*`)
//!
//! ## Example
//!
//! ```no_run
//! use referral_sync::config::Config;
//! use referral_sync::error::IndexerResult;
//!
//! # fn main() -> IndexerResult<()> {
//! let config = Config::from_env()?;
//! println!("Syncing {}", config.contract_address());
//! # Ok(())
//! # }
//! ```

use crate::clock::BlockClock;
use crate::error::{IndexerError, IndexerResult};
use crate::events::EventType;
use alloy::primitives::Address;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default first block at which the referral contract emits events.
pub const DEFAULT_START_BLOCK: u64 = 47_304_058;

/// Tuning knobs for one [`crate::sync::MemberSyncer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Largest window the provider accepts
    pub max_window: u64,
    /// Floor for window halving
    pub min_window: u64,
    /// Blocks left unconfirmed near the head when a window is empty
    pub reorg_margin: u64,
    /// Seed for `MemberAdded` cursors
    pub member_added_start_block: u64,
    /// Seed for `UplineChanged` cursors
    pub upline_changed_start_block: u64,
    /// Block number to timestamp model
    pub clock: BlockClock,
    /// Ask the chain for real block timestamps instead of estimating
    pub use_chain_timestamps: bool,
}

impl SyncSettings {
    /// Historical start block for an event type.
    #[must_use]
    pub const fn start_block(&self, event_type: EventType) -> u64 {
        match event_type {
            EventType::MemberAdded => self.member_added_start_block,
            EventType::UplineChanged => self.upline_changed_start_block,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_window: 1000,
            min_window: 100,
            reorg_margin: 10,
            member_added_start_block: DEFAULT_START_BLOCK,
            upline_changed_start_block: DEFAULT_START_BLOCK,
            clock: BlockClock::default(),
            use_chain_timestamps: false,
        }
    }
}

/// Main configuration struct for the synchronizer.
///
/// Contains all runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    rpc_url: String,
    contract_address: Address,
    database_url: String,
    sync: SyncSettings,
    rpc_max_retries: u32,
    auto_sync_pause: Duration,
    api_port: u16,
    rate_limit_rpm: u32,
    cors_origins: Vec<String>,
}

/// Read an optional variable and parse it, falling back to `default`.
fn parse_var<T>(name: &str, default: T) -> IndexerResult<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map_err(|e| {
            IndexerError::config(format!("{name} has an invalid value: '{raw}'"), Some(Box::new(e)))
        }),
        _ => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This function:
    /// 1. Loads `.env` file using `dotenvy` (if present)
    /// 2. Reads and validates all environment variables
    /// 3. Applies defaults for optional variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `RPC_URL` or `REFERRAL_CONTRACT` is missing
    /// - A numeric variable does not parse
    /// - The contract is not a valid address
    /// - The window bounds are inconsistent
    pub fn from_env() -> IndexerResult<Self> {
        // Load .env file if present (ignore error if file doesn't exist)
        dotenvy::dotenv().ok();

        let rpc_url = env::var("RPC_URL").map_err(|e| {
            IndexerError::config("RPC_URL environment variable is required", Some(Box::new(e)))
        })?;
        if !rpc_url.starts_with("http://") && !rpc_url.starts_with("https://") {
            return Err(IndexerError::config(
                format!("RPC_URL must be an http(s) endpoint, got: {rpc_url}"),
                None,
            ));
        }

        let contract_raw = env::var("REFERRAL_CONTRACT").map_err(|e| {
            IndexerError::config(
                "REFERRAL_CONTRACT environment variable is required",
                Some(Box::new(e)),
            )
        })?;
        if !contract_raw.starts_with("0x") || contract_raw.len() != 42 {
            return Err(IndexerError::config(
                format!(
                    "REFERRAL_CONTRACT must be a valid address (0x + 40 hex chars), got: {contract_raw}"
                ),
                None,
            ));
        }
        let contract_address = contract_raw.parse::<Address>().map_err(|e| {
            IndexerError::config(
                format!("REFERRAL_CONTRACT is not a valid address: {contract_raw}"),
                Some(Box::new(e)),
            )
        })?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./referral_sync.db".to_string());

        let sync = SyncSettings {
            max_window: parse_var("MAX_BLOCK_WINDOW", 1000)?,
            min_window: parse_var("MIN_BLOCK_WINDOW", 100)?,
            reorg_margin: parse_var("REORG_MARGIN", 10)?,
            member_added_start_block: parse_var("MEMBER_ADDED_START_BLOCK", DEFAULT_START_BLOCK)?,
            upline_changed_start_block: parse_var(
                "UPLINE_CHANGED_START_BLOCK",
                DEFAULT_START_BLOCK,
            )?,
            clock: BlockClock::new(
                parse_var("GENESIS_TIMESTAMP", BlockClock::DEFAULT_GENESIS_TIMESTAMP)?,
                parse_var("AVG_BLOCK_TIME_MS", BlockClock::DEFAULT_BLOCK_TIME_MS)?,
            ),
            use_chain_timestamps: parse_var("USE_CHAIN_TIMESTAMPS", false)?,
        };
        validate_windows(&sync)?;

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            rpc_url,
            contract_address,
            database_url,
            sync,
            rpc_max_retries: parse_var("RPC_MAX_RETRIES", 3)?,
            auto_sync_pause: Duration::from_millis(parse_var("AUTO_SYNC_PAUSE_MS", 1000)?),
            api_port: parse_var("API_PORT", 3000)?,
            rate_limit_rpm: parse_var("RATE_LIMIT_RPM", 60)?,
            cors_origins,
        })
    }

    /// Get the RPC URL.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Get the referral contract address.
    #[must_use]
    pub const fn contract_address(&self) -> Address {
        self.contract_address
    }

    /// Get the database URL.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Get the sync tuning settings.
    #[must_use]
    pub const fn sync_settings(&self) -> &SyncSettings {
        &self.sync
    }

    /// Get the retry budget for transient RPC errors.
    #[must_use]
    pub const fn rpc_max_retries(&self) -> u32 {
        self.rpc_max_retries
    }

    /// Get the pause between auto-sync iterations.
    #[must_use]
    pub const fn auto_sync_pause(&self) -> Duration {
        self.auto_sync_pause
    }

    /// Get the API port.
    #[must_use]
    pub const fn api_port(&self) -> u16 {
        self.api_port
    }

    /// Get the rate limit in requests per minute.
    #[must_use]
    pub const fn rate_limit_rpm(&self) -> u32 {
        self.rate_limit_rpm
    }

    /// Get the allowed CORS origins.
    #[must_use]
    pub fn cors_origins(&self) -> &[String] {
        &self.cors_origins
    }
}

/// Check that the window bounds describe a usable range.
///
/// # Errors
///
/// Returns a config error when `min_window` is zero or exceeds `max_window`.
pub fn validate_windows(settings: &SyncSettings) -> IndexerResult<()> {
    if settings.min_window == 0 {
        return Err(IndexerError::config("MIN_BLOCK_WINDOW must be at least 1", None));
    }
    if settings.min_window > settings.max_window {
        return Err(IndexerError::config(
            format!(
                "MIN_BLOCK_WINDOW ({}) must not exceed MAX_BLOCK_WINDOW ({})",
                settings.min_window, settings.max_window
            ),
            None,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: &str = "0x00000000000000000000000000000000000000aB";

    fn clear_env() {
        for var in [
            "RPC_URL",
            "REFERRAL_CONTRACT",
            "MAX_BLOCK_WINDOW",
            "MIN_BLOCK_WINDOW",
            "AVG_BLOCK_TIME_MS",
        ] {
            env::remove_var(var);
        }
    }

    // Environment mutation is process-global, so every case runs in one test.
    #[test]
    fn test_config_from_env() {
        clear_env();
        assert!(Config::from_env().is_err(), "missing RPC_URL must fail");

        env::set_var("RPC_URL", "not-a-url");
        env::set_var("REFERRAL_CONTRACT", CONTRACT);
        assert!(Config::from_env().is_err(), "non-http RPC_URL must fail");

        env::set_var("RPC_URL", "https://rpc.example.org");
        env::set_var("REFERRAL_CONTRACT", "invalid_address");
        assert!(Config::from_env().is_err(), "bad contract must fail");

        env::set_var("REFERRAL_CONTRACT", CONTRACT);
        env::set_var("MIN_BLOCK_WINDOW", "2000");
        assert!(Config::from_env().is_err(), "min > max must fail");

        env::set_var("MIN_BLOCK_WINDOW", "50");
        env::set_var("AVG_BLOCK_TIME_MS", "1500");
        let config = Config::from_env();
        assert!(config.is_ok());
        if let Ok(config) = config {
            assert_eq!(config.rpc_url(), "https://rpc.example.org");
            assert_eq!(config.sync_settings().min_window, 50);
            assert_eq!(config.sync_settings().max_window, 1000);
            assert_eq!(config.sync_settings().clock.block_time_ms(), 1500);
            assert_eq!(
                config.sync_settings().start_block(EventType::UplineChanged),
                DEFAULT_START_BLOCK
            );
        }

        clear_env();
    }

    #[test]
    fn test_validate_windows() {
        let mut settings = SyncSettings::default();
        assert!(validate_windows(&settings).is_ok());

        settings.min_window = 0;
        assert!(validate_windows(&settings).is_err());

        settings.min_window = 10;
        settings.max_window = 5;
        assert!(validate_windows(&settings).is_err());
    }
}
