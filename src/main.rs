//! CLI entry point for the referral event synchronizer.
//!
//! ```text
//! main.rs (runtime + tracing)
//!     ↓
//! cli.rs  (command dispatch)
//!     ↓
//! config → db + rpc → sync → api / terminal output
//! ```

use referral_sync::{cli, observability};
use tracing::error;

/// Entry point.
///
/// Logging is controlled by `RUST_LOG`, `LOG_JSON` and `LOG_FILE`.
#[tokio::main]
async fn main() {
    // Loaded here as well as in Config so RUST_LOG from .env applies.
    let _ = dotenvy::dotenv();

    let log_level = std::env::var("RUST_LOG").ok();
    let log_file = std::env::var("LOG_FILE").ok().map(std::path::PathBuf::from);
    let json_output = std::env::var("LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    let _log_guard = match observability::init_tracing(log_level, log_file, json_output) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize tracing: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = cli::run().await {
        error!(error = %e, "Application error");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
