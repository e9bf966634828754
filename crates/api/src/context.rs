use procura_core::{TenantId, UserId};

/// Tenant context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Acting identity for a request, plus the capabilities the gateway granted
/// it. The nil actor id marks an unattributed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor_id: UserId,
    capabilities: Vec<String>,
}

impl ActorContext {
    pub fn new(actor_id: UserId, capabilities: Vec<String>) -> Self {
        Self {
            actor_id,
            capabilities,
        }
    }

    pub fn actor_id(&self) -> UserId {
        self.actor_id
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn is_admin(&self) -> bool {
        self.capabilities.iter().any(|c| c == "admin")
    }
}
