//! # Referral Event Synchronizer
//!
//! Mirrors `MemberAdded` and `UplineChanged` events of a referral contract
//! into a local SQLite member store, using [Alloy](https://github.com/alloy-rs/alloy)
//! for chain access and a resumable per-event-type cursor.
//!
//! ## Architecture
//!
//! 1. **Config** ([`config`]) - Environment variable loading
//! 2. **RPC** ([`rpc`]) - Provider management and the [`rpc::ChainClient`] seam
//! 3. **Events** ([`events`]) - `sol!` bindings, filters, decoding
//! 4. **Storage** ([`db`]) - Cursors and members, migrations, repository
//! 5. **Sync** ([`sync`]) - Window planning, sync-forward, auto-sync
//! 6. **API** ([`api`]) - Axum REST surface with OpenAPI docs
//!
//! Supporting modules: [`error`], [`retry`], [`clock`], [`observability`],
//! [`cli`].
//!
//! ## Quick Start
//!
//! ```bash
//! export RPC_URL=https://bsc-dataseed.example.org
//! export REFERRAL_CONTRACT=0x...
//! referral-sync sync --auto
//! referral-sync serve
//! ```
//!
//! ## Using as a Library
//!
//! ```rust,no_run
//! use referral_sync::{config::Config, db, events::EventType, rpc::AlloyChainClient, sync::MemberSyncer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let pool = db::create_pool(config.database_url()).await?;
//!     let chain = AlloyChainClient::connect(config.rpc_url(), config.rpc_max_retries()).await?;
//!
//!     let syncer = MemberSyncer::new(
//!         Arc::new(chain),
//!         Arc::new(db::Repository::new(pool)),
//!         config.contract_address(),
//!         config.sync_settings().clone(),
//!     );
//!     let outcome = syncer.sync_forward(EventType::MemberAdded).await?;
//!     println!("{}: {}", outcome.event_type, outcome.message);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`error::IndexerResult<T>`](error::IndexerResult).

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod app_state;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod observability;
pub mod retry;
pub mod rpc;
pub mod sync;
