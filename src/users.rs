//! Narrow account-storage seam consumed by the login flow.
//!
//! Persistent user storage lives outside this service; the flow only needs
//! create-or-get keyed by `(provider, provider_user_id)` and a blocked check.
//! The in-memory implementation backs tests and single-instance deployments.

use crate::correlation::LoginProvider;
use crate::identity::ExternalIdentity;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: i64,
    pub provider: LoginProvider,
    pub provider_user_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub blocked: bool,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_external_id(
        &self,
        provider: LoginProvider,
        provider_user_id: &str,
    ) -> Option<Account>;

    async fn create_from_identity(&self, identity: &ExternalIdentity) -> Account;

    async fn is_blocked(&self, account: &Account) -> bool;
}

pub struct MemoryUserRepository {
    accounts: Arc<RwLock<HashMap<(LoginProvider, String), Account>>>,
    next_id: AtomicI64,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicI64::new(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// Marks an account blocked; used by tests and admin tooling.
    pub async fn set_blocked(&self, provider: LoginProvider, provider_user_id: &str) -> bool {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&(provider, provider_user_id.to_string())) {
            Some(account) => {
                account.blocked = true;
                true
            }
            None => false,
        }
    }
}

impl Default for MemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_external_id(
        &self,
        provider: LoginProvider,
        provider_user_id: &str,
    ) -> Option<Account> {
        let accounts = self.accounts.read().await;
        accounts
            .get(&(provider, provider_user_id.to_string()))
            .cloned()
    }

    async fn create_from_identity(&self, identity: &ExternalIdentity) -> Account {
        let mut accounts = self.accounts.write().await;
        let key = (identity.provider, identity.provider_user_id.clone());

        // Create-or-get: a concurrent creation for the same identity must
        // not mint a second account.
        if let Some(existing) = accounts.get(&key) {
            return existing.clone();
        }

        let account = Account {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            provider: identity.provider,
            provider_user_id: identity.provider_user_id.clone(),
            display_name: identity.display_name.clone(),
            email: identity.email.clone(),
            blocked: false,
        };
        accounts.insert(key, account.clone());
        account
    }

    async fn is_blocked(&self, account: &Account) -> bool {
        let accounts = self.accounts.read().await;
        accounts
            .get(&(account.provider, account.provider_user_id.clone()))
            .map(|a| a.blocked)
            .unwrap_or(account.blocked)
    }
}
