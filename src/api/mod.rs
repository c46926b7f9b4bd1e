//! HTTP API module exposing the sync trigger and the mirrored member data.

pub mod docs;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod server;
