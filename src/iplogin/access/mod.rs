//! Permission checks consulted after logout.

mod postgres;

pub use postgres::PgPermissionChecker;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use super::address::AddressKey;
use super::directory::{RangeDirectory, UserId};
use super::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    AdministerIpLogin,
    LoginAsAnotherUser,
}

impl Capability {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AdministerIpLogin => "administer ip login",
            Self::LoginAsAnotherUser => "can log in as another user",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim() {
            "administer ip login" => Ok(Self::AdministerIpLogin),
            "can log in as another user" => Ok(Self::LoginAsAnotherUser),
            other => Err(format!("unknown capability: {other}")),
        }
    }
}

#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn is_permitted(&self, user_id: UserId, capability: Capability) -> Result<bool>;
}

/// Whether `user_id`, browsing from `address`, may use a different identity
/// once logged out instead of being logged back in automatically.
///
/// Administrators always may, and so may users whose address matches no
/// range. Everyone else needs [`Capability::LoginAsAnotherUser`].
///
/// # Errors
/// Propagates permission and directory failures.
pub async fn can_login_as_another_user(
    permissions: &dyn PermissionChecker,
    directory: &dyn RangeDirectory,
    user_id: UserId,
    address: Option<AddressKey>,
) -> Result<bool> {
    if permissions
        .is_permitted(user_id, Capability::AdministerIpLogin)
        .await?
    {
        return Ok(true);
    }

    let matched = match address {
        Some(address) => directory.lookup(address).await?,
        None => None,
    };
    if matched.is_none() {
        return Ok(true);
    }

    permissions
        .is_permitted(user_id, Capability::LoginAsAnotherUser)
        .await
}

#[derive(Clone, Debug, Default)]
pub struct MemoryPermissionChecker {
    grants: HashMap<UserId, HashSet<Capability>>,
}

impl MemoryPermissionChecker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn grant(mut self, user_id: UserId, capability: Capability) -> Self {
        self.grants.entry(user_id).or_default().insert(capability);
        self
    }
}

#[async_trait]
impl PermissionChecker for MemoryPermissionChecker {
    async fn is_permitted(&self, user_id: UserId, capability: Capability) -> Result<bool> {
        Ok(self
            .grants
            .get(&user_id)
            .is_some_and(|grants| grants.contains(&capability)))
    }
}
