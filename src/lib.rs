pub mod config;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod transfer;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::transfer::TransferRepository;

/// App backed by a private in-memory transfer database.
pub async fn create_app() -> Result<axum::Router, sqlx::Error> {
    let repo = TransferRepository::in_memory().await?;
    Ok(create_app_with_repo(Arc::new(repo)))
}

pub fn create_app_with_repo(repo: Arc<TransferRepository>) -> axum::Router {
    let state = AppState::new(repo);
    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
