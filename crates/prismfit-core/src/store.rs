//! In-memory storage backends
//!
//! Used for development, tests, and single-instance deployments. Every
//! mutation runs under a write lock, so the conditional delete on the
//! refresh-token store is serialized per key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{RefreshToken, RefreshTokenStore, Result, StoreError, User, UserDirectory};

/// In-memory user directory
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn save(&self, user: User) -> Result<User> {
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!(
                "email already registered: {}",
                user.email
            )));
        }

        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        self.users.write().await.remove(&id);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// In-memory refresh-token fingerprint store keyed by `(user_id, hash)`
#[derive(Debug, Default)]
pub struct MemoryRefreshTokenStore {
    records: RwLock<HashMap<(Uuid, String), RefreshToken>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones included
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Records currently held for a user
    pub async fn records_for_user(&self, user_id: Uuid) -> Vec<RefreshToken> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn save(&self, record: RefreshToken) -> Result<()> {
        let key = (record.user_id, record.hashed_token.clone());
        self.records.write().await.insert(key, record);
        Ok(())
    }

    async fn find_by_user_id_and_hash(
        &self,
        user_id: Uuid,
        hashed_token: &str,
    ) -> Result<Option<RefreshToken>> {
        let now = Utc::now();
        let records = self.records.read().await;

        Ok(records
            .get(&(user_id, hashed_token.to_string()))
            .filter(|r| !r.is_expired_at(now))
            .cloned())
    }

    async fn delete_by_user_id_and_hash(&self, user_id: Uuid, hashed_token: &str) -> Result<bool> {
        let removed = self
            .records
            .write()
            .await
            .remove(&(user_id, hashed_token.to_string()));
        Ok(removed.is_some())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|(owner, _), _| *owner != user_id);
        Ok((before - records.len()) as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !r.is_expired_at(now));
        Ok((before - records.len()) as u64)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
