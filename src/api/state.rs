use std::sync::Arc;

use crate::db::{CatalogStore, CinemaStore};
use crate::services::{RefreshService, RetrievalService, SessionService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogStore>,
    pub cinemas: Arc<dyn CinemaStore>,
    pub sessions: Arc<SessionService>,
    pub retrieval: Arc<RetrievalService>,
    pub refresh: Arc<RefreshService>,
}
