//! Shared application state.

use tally_core::RequestContext;
use tally_db::Database;

use crate::config::ApiConfig;

/// State shared by every handler. Cheap to clone: the database handle
/// wraps a pool and the config is small.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: ApiConfig,
}

impl AppState {
    pub fn new(db: Database, config: ApiConfig) -> Self {
        AppState { db, config }
    }

    /// Request context for an API caller. The actor arrives via the
    /// `X-Actor-Id` header when present; branch scope comes from config.
    pub fn api_context(&self, actor_id: Option<&str>) -> RequestContext {
        RequestContext::new(
            actor_id.unwrap_or("api"),
            self.config.default_branch_id.clone(),
        )
    }

    /// Request context for webhook-driven mutations.
    pub fn sync_context(&self) -> RequestContext {
        RequestContext::new("sync-webhook", self.config.default_branch_id.clone())
    }
}
