//! PostgreSQL-backed range directory.
//!
//! Addresses are stored as 16-byte `bytea` in the mapped encoding, so the
//! byte-wise `bytea` ordering equals numeric ordering. The
//! `(ip_login_start, ip_login_end)` index serves the range predicate.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{RangeDirectory, UserId};
use crate::iplogin::address::AddressKey;
use crate::iplogin::error::{Error, Result};

pub(crate) const LOOKUP_QUERY: &str = r"
    SELECT uid
    FROM users
    WHERE ip_login_start <= $1
      AND ip_login_end >= $1
      AND status = 1
    ORDER BY uid DESC
    LIMIT 1
";

#[derive(Clone, Debug)]
pub struct PgRangeDirectory {
    pool: PgPool,
}

impl PgRangeDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RangeDirectory for PgRangeDirectory {
    async fn lookup(&self, address: AddressKey) -> Result<Option<UserId>> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = LOOKUP_QUERY
        );
        let row = sqlx::query(LOOKUP_QUERY)
            .bind(address.to_bytes().to_vec())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up ip range binding")
            .map_err(Error::Directory)?;

        Ok(row.map(|row| UserId::new(row.get::<i64, _>("uid"))))
    }
}

#[cfg(test)]
mod tests {
    use super::LOOKUP_QUERY;

    #[test]
    fn lookup_query_keeps_tie_break_and_single_row() {
        let normalized = LOOKUP_QUERY.split_whitespace().collect::<Vec<_>>().join(" ");
        assert!(normalized.contains("ip_login_start <= $1 AND ip_login_end >= $1"));
        assert!(normalized.contains("AND status = 1"));
        assert!(normalized.ends_with("ORDER BY uid DESC LIMIT 1"));
    }
}
