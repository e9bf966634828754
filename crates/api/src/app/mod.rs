//! HTTP application wiring (axum router + service wiring).
//!
//! This folder is structured like:
//! - `services.rs`: store selection and the shared application services
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: response envelope and error mapping

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app() -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services().await?);

    // Domain routes require a resolved tenant context.
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(Extension(services))
            .layer(axum::middleware::from_fn(middleware::context_middleware)),
    );

    Ok(Router::new()
        .route("/healthz", get(routes::system::healthz))
        .merge(protected))
}
