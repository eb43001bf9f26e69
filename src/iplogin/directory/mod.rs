//! IP range to user resolution.
//!
//! A binding assigns one inclusive address interval to one user. Bindings may
//! overlap; when several active bindings contain an address the binding of the
//! numerically largest user id wins, so the most recently created account takes
//! precedence under auto-increment ids.

mod memory;
mod postgres;

pub use memory::MemoryRangeDirectory;
pub use postgres::PgRangeDirectory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::address::AddressKey;
use super::error::{Error, Result};

/// Opaque, orderable user identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One user's authorized auto-login range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpRangeBinding {
    user_id: UserId,
    ip_start: AddressKey,
    ip_end: AddressKey,
    active: bool,
}

impl IpRangeBinding {
    /// # Errors
    /// Returns [`Error::InvalidRange`] when `ip_start > ip_end`.
    pub fn new(
        user_id: UserId,
        ip_start: AddressKey,
        ip_end: AddressKey,
        active: bool,
    ) -> Result<Self> {
        if ip_start > ip_end {
            return Err(Error::InvalidRange { user_id });
        }
        Ok(Self {
            user_id,
            ip_start,
            ip_end,
            active,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn ip_start(&self) -> AddressKey {
        self.ip_start
    }

    #[must_use]
    pub fn ip_end(&self) -> AddressKey {
        self.ip_end
    }

    #[must_use]
    pub fn active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn contains(&self, address: AddressKey) -> bool {
        self.ip_start <= address && address <= self.ip_end
    }
}

/// Source of range bindings.
///
/// Implementations must behave like
/// `ip_start <= :ip AND ip_end >= :ip AND active ORDER BY user_id DESC LIMIT 1`.
#[async_trait]
pub trait RangeDirectory: Send + Sync {
    /// # Errors
    /// Returns [`Error::Directory`] when the backing store is unavailable.
    async fn lookup(&self, address: AddressKey) -> Result<Option<UserId>>;
}
