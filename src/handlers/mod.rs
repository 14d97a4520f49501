use crate::AppState;
use axum::Router;

pub mod common;
pub mod health;
pub mod predictions;
pub mod uploads;

/// Every handler route mounted under `/api/v1`
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::health_routes())
        .merge(predictions::prediction_routes())
        .merge(uploads::upload_routes())
}
