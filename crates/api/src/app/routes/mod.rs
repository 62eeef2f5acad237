use axum::Router;

pub mod accounts;
pub mod jobs;
pub mod system;

/// Router for every endpoint that needs the batch services.
pub fn router() -> Router {
    Router::new().merge(jobs::router()).merge(accounts::router())
}
