use sqlx::PgPool;
use std::sync::Arc;

use crate::db::store::{JobStore, LeadStore, OrderStore};
use crate::services::credits::CreditLedger;
use crate::services::queue::JobDispatcher;

/// Shared application state passed to all route handlers.
///
/// Stores and the dispatcher are trait objects so handler logic can be
/// exercised against in-memory implementations in tests.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub orders: Arc<dyn OrderStore>,
    pub jobs: Arc<dyn JobStore>,
    pub leads: Arc<dyn LeadStore>,
    pub queue: Arc<dyn JobDispatcher>,
    pub ledger: Arc<dyn CreditLedger>,
    /// Shared secret expected in the webhook auth header.
    pub webhook_secret: String,
}
