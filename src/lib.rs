//! Allowance relay: forwards token-approval reports to an operator chat and
//! executes delegated transfers on operator command.

pub mod api;
pub mod chain;
pub mod cli;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod notification;
pub mod router;
pub mod store;
pub mod transfer;

use std::sync::Arc;

/// Shared application state passed to HTTP handlers.
pub struct AppState {
    pub router: Arc<router::CommandRouter>,
}
