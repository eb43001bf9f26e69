//! PostgreSQL-backed sessions (`user_sessions` joined to `users`).

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{generate_session_token, hash_session_token, SessionStore};
use crate::iplogin::directory::UserId;
use crate::iplogin::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn current_user(&self, token: &str) -> Result<Option<UserId>> {
        // Only live sessions of active accounts count.
        let query = r"
            SELECT users.uid
            FROM user_sessions
            JOIN users ON users.uid = user_sessions.uid
            WHERE user_sessions.session_hash = $1
              AND user_sessions.expires_at > NOW()
              AND users.status = 1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(hash_session_token(token))
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up session")
            .map_err(Error::Session)?;

        Ok(row.map(|row| UserId::new(row.get::<i64, _>("uid"))))
    }

    async fn start(&self, user_id: UserId, ttl_seconds: i64) -> Result<Option<String>> {
        // The SELECT doubles as the existence and status check: a blocked or
        // deleted account inserts nothing.
        let query = r"
            INSERT INTO user_sessions (uid, session_hash, expires_at)
            SELECT uid, $2, NOW() + ($3 * INTERVAL '1 second')
            FROM users
            WHERE uid = $1
              AND status = 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let token = generate_session_token()?;
        let result = sqlx::query(query)
            .bind(user_id.get())
            .bind(hash_session_token(&token))
            .bind(ttl_seconds)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert session")
            .map_err(Error::Session)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(token))
    }

    async fn end(&self, token: &str) -> Result<()> {
        // Logout is idempotent; it's fine if no rows are deleted.
        let query = "DELETE FROM user_sessions WHERE session_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(hash_session_token(token))
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")
            .map_err(Error::Session)?;
        Ok(())
    }
}
