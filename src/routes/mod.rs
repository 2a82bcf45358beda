use axum::Router;

use crate::state::AppState;

pub mod auth;
pub mod doc;
pub mod downloads;
pub mod health;
pub mod orders;
pub mod params;
pub mod payments;
pub mod products;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/products", products::router(max_upload_bytes))
        .nest("/orders", orders::router())
        .nest("/payments", payments::router())
        .nest("/downloads", downloads::router())
}
