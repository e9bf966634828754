use axum::Router;

pub mod inventory;
pub mod procurement;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/procurement", procurement::router())
        .nest("/inventory", inventory::router())
}
