/// HTTP API surface
use crate::context::AppContext;
use axum::Router;

pub mod middleware;
mod routes;

/// Build all API routes
pub fn routes() -> Router<AppContext> {
    routes::routes()
}
