use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use procura_core::{TenantId, UserId};

use crate::context::{ActorContext, TenantContext};

/// Tenant the request acts for. Required on every domain route.
pub const TENANT_HEADER: &str = "x-tenant-id";
/// Acting user, stamped onto writes. Optional; absent means unattributed.
pub const ACTOR_HEADER: &str = "x-actor-id";
/// Comma-separated capability list (`admin` unlocks bypass transitions).
pub const CAPABILITIES_HEADER: &str = "x-capabilities";

/// Resolve the request context from gateway-verified headers.
///
/// Authentication itself is an upstream concern: by the time a request lands
/// here, the fronting gateway has already verified the identity and put the
/// resolved tenant and actor into headers. A missing or malformed tenant
/// header is rejected before any handler runs.
pub async fn context_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let tenant_id = extract_tenant(req.headers())?;
    let actor = extract_actor(req.headers());

    req.extensions_mut().insert(TenantContext::new(tenant_id));
    req.extensions_mut().insert(actor);

    Ok(next.run(req).await)
}

fn extract_tenant(headers: &HeaderMap) -> Result<TenantId, StatusCode> {
    let header = headers
        .get(TENANT_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let uuid: Uuid = header
        .trim()
        .parse()
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    Ok(TenantId::from_uuid(uuid))
}

fn extract_actor(headers: &HeaderMap) -> ActorContext {
    let actor_id = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<Uuid>().ok())
        .map(UserId::from_uuid)
        .unwrap_or_else(|| UserId::from_uuid(Uuid::nil()));

    let capabilities = headers
        .get(CAPABILITIES_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| {
            s.split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default();

    ActorContext::new(actor_id, capabilities)
}
