//! Process-local session store.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{generate_session_token, hash_session_token, SessionStore};
use crate::iplogin::directory::UserId;
use crate::iplogin::error::Result;

struct SessionEntry {
    user_id: UserId,
    expires_at: Instant,
}

pub struct MemorySessionStore {
    active_users: HashSet<UserId>,
    sessions: Mutex<HashMap<Vec<u8>, SessionEntry>>,
}

impl MemorySessionStore {
    /// `active_users` are the accounts allowed to hold a session.
    pub fn new(active_users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            active_users: active_users.into_iter().collect(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live sessions.
    pub async fn live_sessions(&self) -> usize {
        let now = Instant::now();
        let sessions = self.sessions.lock().await;
        sessions
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn current_user(&self, token: &str) -> Result<Option<UserId>> {
        let hash = hash_session_token(token);
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, entry| entry.expires_at > now);
        Ok(sessions
            .get(&hash)
            .map(|entry| entry.user_id)
            .filter(|user_id| self.active_users.contains(user_id)))
    }

    async fn start(&self, user_id: UserId, ttl_seconds: i64) -> Result<Option<String>> {
        if !self.active_users.contains(&user_id) {
            return Ok(None);
        }
        let token = generate_session_token()?;
        let ttl = Duration::from_secs(u64::try_from(ttl_seconds).unwrap_or(0));
        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            hash_session_token(&token),
            SessionEntry {
                user_id,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(Some(token))
    }

    async fn end(&self, token: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(&hash_session_token(token));
        Ok(())
    }
}

impl std::fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySessionStore")
            .field("active_users", &self.active_users.len())
            .finish_non_exhaustive()
    }
}
