use crate::config::Config;
use crate::screening::orchestrator::Screener;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Owns the task registry and schedules screening runs.
    pub screener: Screener,
    pub config: Config,
}
