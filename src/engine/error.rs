use crate::model::TenantId;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{entity} not found: tenant={tenant_id} id={id}")]
    NotFound {
        entity: &'static str,
        tenant_id: TenantId,
        id: String,
    },
    #[error("player is disqualified: tenant={tenant_id} id={player_id}")]
    PlayerDisqualified {
        tenant_id: TenantId,
        player_id: String,
    },
    #[error("competition is finished: tenant={tenant_id} id={competition_id}")]
    CompetitionFinished {
        tenant_id: TenantId,
        competition_id: String,
    },
    #[error("invalid tenant name: {0}")]
    InvalidTenantName(String),
    #[error("cannot lock tenant {tenant_id}: {reason}")]
    LockAcquire {
        tenant_id: TenantId,
        reason: &'static str,
    },
    #[error("storage error during {op} (tenant={tenant_id}): {source}")]
    Storage {
        op: &'static str,
        tenant_id: TenantId,
        #[source]
        source: StoreError,
    },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, tenant_id: TenantId, id: &str) -> Self {
        EngineError::NotFound {
            entity,
            tenant_id,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }
}

/// Attach the failing operation and tenant to a row-store error.
pub(crate) trait StoreResultExt<T> {
    fn during(self, op: &'static str, tenant_id: TenantId) -> Result<T, EngineError>;
}

impl<T> StoreResultExt<T> for Result<T, StoreError> {
    fn during(self, op: &'static str, tenant_id: TenantId) -> Result<T, EngineError> {
        self.map_err(|source| EngineError::Storage {
            op,
            tenant_id,
            source,
        })
    }
}
