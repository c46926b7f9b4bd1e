//! HTTP handlers for API endpoints.

pub mod cursors;
pub mod health;
pub mod members;
pub mod sync;
