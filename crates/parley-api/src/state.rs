//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use parley_chat::ConversationalRouter;
use parley_storage::{DocumentDriver, RelationalDriver};

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks. The router
/// owns its own concurrent caches, so no outer lock is needed.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ConversationalRouter>,
    /// Drivers probed by the health check.
    pub relational: Arc<dyn RelationalDriver>,
    pub document: Arc<dyn DocumentDriver>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        router: Arc<ConversationalRouter>,
        relational: Arc<dyn RelationalDriver>,
        document: Arc<dyn DocumentDriver>,
    ) -> Self {
        Self {
            router,
            relational,
            document,
            start_time: Instant::now(),
        }
    }
}
