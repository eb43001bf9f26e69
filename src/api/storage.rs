//! Storage backends behind the login service.
//!
//! Production runs on PostgreSQL. A JSON seed file backs the in-memory stores
//! for demos and tests.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use sqlx::{Connection, PgPool};
use std::{fs, path::Path, sync::Arc};
use tracing::{error, info_span, Instrument};

use crate::iplogin::{
    access::{Capability, MemoryPermissionChecker, PermissionChecker, PgPermissionChecker},
    address::AddressKey,
    directory::{IpRangeBinding, MemoryRangeDirectory, PgRangeDirectory, RangeDirectory, UserId},
    session::{MemorySessionStore, PgSessionStore, SessionStore},
};

#[derive(Clone)]
pub struct Storage {
    directory: Arc<dyn RangeDirectory>,
    sessions: Arc<dyn SessionStore>,
    permissions: Arc<dyn PermissionChecker>,
    pool: Option<PgPool>,
}

impl Storage {
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            directory: Arc::new(PgRangeDirectory::new(pool.clone())),
            sessions: Arc::new(PgSessionStore::new(pool.clone())),
            permissions: Arc::new(PgPermissionChecker::new(pool.clone())),
            pool: Some(pool),
        }
    }

    #[must_use]
    pub fn new(
        directory: Arc<dyn RangeDirectory>,
        sessions: Arc<dyn SessionStore>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self {
            directory,
            sessions,
            permissions,
            pool: None,
        }
    }

    /// Build in-memory stores from a seed document.
    ///
    /// # Errors
    /// Fails on unparseable addresses, inverted ranges, half-specified ranges
    /// or unknown permission names.
    pub fn from_seed(seed: Seed) -> Result<Self> {
        let mut bindings = Vec::new();
        let mut active_users = Vec::new();
        let mut permissions = MemoryPermissionChecker::new();

        for user in seed.users {
            let user_id = UserId::new(user.uid);
            if user.active {
                active_users.push(user_id);
            }

            match (user.ip_start.as_deref(), user.ip_end.as_deref()) {
                (Some(start), Some(end)) => {
                    let start = AddressKey::parse(start)
                        .ok_or_else(|| anyhow!("user {user_id}: invalid ip_start {start}"))?;
                    let end = AddressKey::parse(end)
                        .ok_or_else(|| anyhow!("user {user_id}: invalid ip_end {end}"))?;
                    bindings.push(IpRangeBinding::new(user_id, start, end, user.active)?);
                }
                (None, None) => {}
                _ => return Err(anyhow!("user {user_id}: ip_start and ip_end go together")),
            }

            for name in &user.permissions {
                let capability = name
                    .parse::<Capability>()
                    .map_err(|err| anyhow!("user {user_id}: {err}"))?;
                permissions = permissions.grant(user_id, capability);
            }
        }

        Ok(Self::new(
            Arc::new(MemoryRangeDirectory::new(bindings)),
            Arc::new(MemorySessionStore::new(active_users)),
            Arc::new(permissions),
        ))
    }

    /// # Errors
    /// Fails when the file cannot be read or is not a valid seed document.
    pub fn from_seed_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
        let seed: Seed = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid seed file: {}", path.display()))?;
        Self::from_seed(seed)
    }

    #[must_use]
    pub fn directory(&self) -> Arc<dyn RangeDirectory> {
        self.directory.clone()
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        self.sessions.clone()
    }

    #[must_use]
    pub fn permissions(&self) -> Arc<dyn PermissionChecker> {
        self.permissions.clone()
    }

    /// `"ok"` or `"error"` for the database, `"memory"` without one.
    pub async fn status(&self) -> &'static str {
        let Some(pool) = &self.pool else {
            return "memory";
        };

        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        match pool.acquire().instrument(acquire_span).await {
            Ok(mut conn) => {
                let ping_span =
                    info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
                match conn.ping().instrument(ping_span).await {
                    Ok(()) => "ok",
                    Err(err) => {
                        error!("Failed to ping database: {err}");
                        "error"
                    }
                }
            }
            Err(err) => {
                error!("Failed to acquire database connection: {err}");
                "error"
            }
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("postgres", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub uid: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    pub ip_start: Option<String>,
    pub ip_end: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

const fn default_active() -> bool {
    true
}
