use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::Instrument;

use super::{Capability, PermissionChecker};
use crate::iplogin::directory::UserId;
use crate::iplogin::error::{Error, Result};

/// Permissions granted per user in `user_permissions`.
#[derive(Clone, Debug)]
pub struct PgPermissionChecker {
    pool: PgPool,
}

impl PgPermissionChecker {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionChecker for PgPermissionChecker {
    async fn is_permitted(&self, user_id: UserId, capability: Capability) -> Result<bool> {
        let query = r"
            SELECT EXISTS (
                SELECT 1 FROM user_permissions
                WHERE uid = $1 AND permission = $2
            )
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let permitted: bool = sqlx::query_scalar(query)
            .bind(user_id.get())
            .bind(capability.as_str())
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to check permission")
            .map_err(Error::Permission)?;
        Ok(permitted)
    }
}
