//! TTL-expiring store for in-flight login sessions.
//!
//! Each record is keyed by an opaque correlation token held by the client.
//! Expiry is lazy on access, with a periodic sweeper bounding memory. No
//! network call may run while the store lock is held; the provider exchange
//! happens strictly between `consume_once` and `transition_to_success`.

use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Length of generated correlation tokens.
pub const LOGIN_TOKEN_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoginProvider {
    Github,
    Yandex,
    DirectCode,
}

impl LoginProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginProvider::Github => "github",
            LoginProvider::Yandex => "yandex",
            LoginProvider::DirectCode => "direct-code",
        }
    }

    /// Maps the `type` query parameter of `/login` to a provider.
    pub fn from_login_type(value: &str) -> Option<Self> {
        match value {
            "github" => Some(LoginProvider::Github),
            "yandex" => Some(LoginProvider::Yandex),
            "code" => Some(LoginProvider::DirectCode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    Pending,
    Success,
}

#[derive(Debug, Clone)]
pub struct CorrelationRecord {
    pub provider: LoginProvider,
    pub status: LoginStatus,
    pub code_verifier: Option<String>,
    pub login_code: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CorrelationRecord {
    /// A fresh pending record; timestamps are stamped on insertion.
    pub fn pending(provider: LoginProvider) -> Self {
        let now = Utc::now();
        Self {
            provider,
            status: LoginStatus::Pending,
            code_verifier: None,
            login_code: None,
            access_token: None,
            refresh_token: None,
            created_at: now,
            expires_at: now,
        }
    }

    pub fn with_code_verifier(mut self, verifier: String) -> Self {
        self.code_verifier = Some(verifier);
        self
    }

    pub fn with_login_code(mut self, code: String) -> Self {
        self.login_code = Some(code);
        self
    }
}

/// Internal entry state. `Consumed` marks a record taken by the callback
/// handler and awaiting its success transition; it is never observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Live,
    Consumed,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    record: CorrelationRecord,
    state: EntryState,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        Utc::now() > self.record.expires_at
    }
}

pub struct CorrelationStore {
    entries: Arc<RwLock<HashMap<String, StoredEntry>>>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Inserts a record under a freshly generated random token and returns
    /// it, retrying generation on the negligible chance of a collision.
    pub async fn create(&self, record: CorrelationRecord, ttl: Duration) -> String {
        loop {
            let token = generate_login_token();
            let mut entries = self.entries.write().await;
            if entries.contains_key(&token) {
                continue;
            }
            entries.insert(token.clone(), StoredEntry::stamped(record.clone(), ttl));
            return token;
        }
    }

    /// Upserts a record under a caller-held token (the opaque login handle
    /// the client generated before calling `/login`).
    pub async fn insert(&self, token: &str, record: CorrelationRecord, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(token.to_string(), StoredEntry::stamped(record, ttl));
    }

    /// Looks up a record. Expired and consumed entries behave as not found;
    /// expired entries are purged on access.
    pub async fn get(&self, token: &str) -> Option<CorrelationRecord> {
        let entries = self.entries.read().await;
        match entries.get(token) {
            Some(entry) if entry.is_expired() => {
                drop(entries);
                let mut entries = self.entries.write().await;
                // The handle may have been re-used for a fresh record while
                // the lock was released; only remove what is still expired.
                if entries.get(token).is_some_and(|entry| entry.is_expired()) {
                    entries.remove(token);
                }
                None
            }
            Some(entry) if entry.state == EntryState::Consumed => None,
            Some(entry) => Some(entry.record.clone()),
            None => None,
        }
    }

    /// Atomic get-and-invalidate restricted to pending records. Exactly one
    /// caller can ever obtain a given pending record; a second call (or a
    /// call racing with it) returns `None`.
    pub async fn consume_once(&self, token: &str) -> Option<CorrelationRecord> {
        let mut entries = self.entries.write().await;
        if entries.get(token).is_some_and(|entry| entry.is_expired()) {
            entries.remove(token);
            return None;
        }

        let entry = entries.get_mut(token)?;
        if entry.state != EntryState::Live || entry.record.status != LoginStatus::Pending {
            return None;
        }

        entry.state = EntryState::Consumed;
        Some(entry.record.clone())
    }

    /// Moves a record previously taken via `consume_once` to `Success`,
    /// storing the issued token pair and opening a fresh viewing window.
    /// Returns false if the record is missing or was never consumed.
    pub async fn transition_to_success(
        &self,
        token: &str,
        access_token: String,
        refresh_token: String,
        ttl: Duration,
    ) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(token) {
            Some(entry) if entry.state == EntryState::Consumed => {
                entry.record.status = LoginStatus::Success;
                entry.record.access_token = Some(access_token);
                entry.record.refresh_token = Some(refresh_token);
                entry.record.expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
                entry.state = EntryState::Live;
                true
            }
            _ => false,
        }
    }

    /// Removes every expired entry; returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    /// Spawns a background task sweeping expired entries at `interval`.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let purged = store.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "swept expired login records");
                }
            }
        })
    }

    pub fn health_checker(self: &Arc<Self>) -> Arc<CorrelationStoreHealthChecker> {
        Arc::new(CorrelationStoreHealthChecker {
            store: Arc::clone(self),
        })
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Reports the store as healthy with its current entry count.
pub struct CorrelationStoreHealthChecker {
    store: Arc<CorrelationStore>,
}

#[async_trait::async_trait]
impl crate::health::HealthChecker for CorrelationStoreHealthChecker {
    fn name(&self) -> &str {
        "correlation_store"
    }

    async fn check(&self) -> crate::health::HealthCheckResult {
        let entries = self.store.entries.read().await.len();
        crate::health::HealthCheckResult::healthy_with_details(serde_json::json!({
            "entries": entries,
        }))
    }
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoredEntry {
    fn stamped(mut record: CorrelationRecord, ttl: Duration) -> Self {
        let now = Utc::now();
        record.created_at = now;
        record.expires_at = now + chrono::Duration::from_std(ttl).unwrap_or_default();
        Self {
            record,
            state: EntryState::Live,
        }
    }
}

pub fn generate_login_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(LOGIN_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_create_then_get_returns_pending() {
        let store = CorrelationStore::new();
        let token = store
            .create(CorrelationRecord::pending(LoginProvider::Github), TTL)
            .await;

        let record = store.get(&token).await.unwrap();
        assert_eq!(record.status, LoginStatus::Pending);
        assert_eq!(record.provider, LoginProvider::Github);
        assert!(record.access_token.is_none());
    }

    #[tokio::test]
    async fn test_consume_once_succeeds_exactly_once() {
        let store = CorrelationStore::new();
        store
            .insert("tok-1", CorrelationRecord::pending(LoginProvider::Github), TTL)
            .await;

        assert!(store.consume_once("tok-1").await.is_some());
        assert!(store.consume_once("tok-1").await.is_none());
        // Consumed records are unobservable.
        assert!(store.get("tok-1").await.is_none());
    }

    #[tokio::test]
    async fn test_transition_to_success_makes_record_readable() {
        let store = CorrelationStore::new();
        store
            .insert("tok-1", CorrelationRecord::pending(LoginProvider::Yandex), TTL)
            .await;

        store.consume_once("tok-1").await.unwrap();
        let ok = store
            .transition_to_success("tok-1", "acc".to_string(), "ref".to_string(), TTL)
            .await;
        assert!(ok);

        let record = store.get("tok-1").await.unwrap();
        assert_eq!(record.status, LoginStatus::Success);
        assert_eq!(record.access_token.as_deref(), Some("acc"));
        assert_eq!(record.refresh_token.as_deref(), Some("ref"));

        // A success record is no longer consumable.
        assert!(store.consume_once("tok-1").await.is_none());
    }

    #[tokio::test]
    async fn test_transition_without_consume_fails() {
        let store = CorrelationStore::new();
        store
            .insert("tok-1", CorrelationRecord::pending(LoginProvider::Github), TTL)
            .await;

        assert!(
            !store
                .transition_to_success("tok-1", "a".to_string(), "r".to_string(), TTL)
                .await
        );
        assert!(
            !store
                .transition_to_success("missing", "a".to_string(), "r".to_string(), TTL)
                .await
        );
    }

    #[tokio::test]
    async fn test_expired_record_behaves_as_not_found() {
        let store = CorrelationStore::new();
        store
            .insert(
                "tok-1",
                CorrelationRecord::pending(LoginProvider::Github),
                Duration::from_millis(50),
            )
            .await;

        assert!(store.get("tok-1").await.is_some());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.get("tok-1").await.is_none());
        assert!(store.consume_once("tok-1").await.is_none());
        // Lazy expiry also purged the entry.
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_purge_expired_bounds_memory() {
        let store = CorrelationStore::new();
        for i in 0..10 {
            store
                .insert(
                    &format!("tok-{i}"),
                    CorrelationRecord::pending(LoginProvider::Github),
                    Duration::from_millis(10),
                )
                .await;
        }
        store
            .insert("tok-live", CorrelationRecord::pending(LoginProvider::Yandex), TTL)
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let purged = store.purge_expired().await;
        assert_eq!(purged, 10);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_success_window_is_recomputed() {
        let store = CorrelationStore::new();
        store
            .insert(
                "tok-1",
                CorrelationRecord::pending(LoginProvider::Github),
                Duration::from_secs(600),
            )
            .await;

        let pending_expiry = {
            let record = store.get("tok-1").await.unwrap();
            record.expires_at
        };

        store.consume_once("tok-1").await.unwrap();
        store
            .transition_to_success(
                "tok-1",
                "acc".to_string(),
                "ref".to_string(),
                Duration::from_secs(60),
            )
            .await;

        let record = store.get("tok-1").await.unwrap();
        // Fresh, shorter post-success window.
        assert!(record.expires_at < pending_expiry);
        assert!(record.expires_at > Utc::now());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lazy_purge_spares_freshly_reused_handle() {
        let store = Arc::new(CorrelationStore::new());

        // A reader purging an expired entry races a client restarting its
        // login under the same handle; the fresh record must survive.
        for _ in 0..2_000 {
            store
                .insert(
                    "tok-1",
                    CorrelationRecord::pending(LoginProvider::Github),
                    Duration::ZERO,
                )
                .await;

            let reader = {
                let store = store.clone();
                tokio::spawn(async move { store.get("tok-1").await })
            };
            let writer = {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .insert("tok-1", CorrelationRecord::pending(LoginProvider::Github), TTL)
                        .await
                })
            };
            let (reader, writer) = tokio::join!(reader, writer);
            reader.unwrap();
            writer.unwrap();

            assert!(
                store.get("tok-1").await.is_some(),
                "fresh record destroyed by stale purge"
            );
        }
    }

    #[test]
    fn test_generate_login_token_shape() {
        let token = generate_login_token();
        assert_eq!(token.len(), LOGIN_TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_login_type_mapping() {
        assert_eq!(
            LoginProvider::from_login_type("github"),
            Some(LoginProvider::Github)
        );
        assert_eq!(
            LoginProvider::from_login_type("yandex"),
            Some(LoginProvider::Yandex)
        );
        assert_eq!(
            LoginProvider::from_login_type("code"),
            Some(LoginProvider::DirectCode)
        );
        assert_eq!(LoginProvider::from_login_type("google"), None);
        assert_eq!(LoginProvider::from_login_type(""), None);
    }
}
