use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use tower_http::cors::CorsLayer;

use crate::jobs::{JobInfo, JobScheduler};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<JobScheduler>,
}

/// Debug/health surface. The article read API is served elsewhere; this
/// process only exposes what operators need.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/jobs", get(list_jobs))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobInfo>> {
    Json(state.scheduler.list())
}
