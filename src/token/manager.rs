//! Token Manager
//!
//! Hands out usable access credentials per principal, refreshing them when
//! they are about to expire.
//!
//! Refreshes are single-flight per principal: concurrent callers wait on the
//! principal's slot and reuse the outcome of the refresh they queued behind,
//! the stored record on success or the same error on failure. Unrelated
//! principals never share a slot.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::{Clock, SystemClock};
use crate::error::{AccessError, AccessResult};
use crate::flows::{AuthorizationCodeExchanger, TokenRefresher};
use crate::telemetry::{AccessMetrics, NoOpMetrics};
use crate::token::revocation::{TokenRevoker, TokenTypeHint};
use crate::token::storage::{CredentialStore, StoreEntry};
use crate::types::{
    AccessCredential, CredentialStatus, TokenRecord, DEFAULT_SAFETY_MARGIN_SECS,
};

/// Token manager interface.
#[async_trait]
pub trait TokenManager: Send + Sync {
    /// Get a credential good for at least the safety margin, refreshing if
    /// needed.
    ///
    /// A transient refresh failure is an error; a rejected refresh
    /// credential is `NeedsInteractiveAuth`.
    async fn get_usable_credential(&self, principal: &str) -> AccessResult<CredentialStatus>;

    /// Replace a credential the provider rejected before its expiry.
    ///
    /// Refreshes unless another caller already replaced `rejected`.
    async fn refresh_rejected(
        &self,
        principal: &str,
        rejected: &AccessCredential,
    ) -> AccessResult<CredentialStatus>;

    /// Exchange an authorization code and store the resulting record.
    async fn authorize(
        &self,
        principal: &str,
        code: &str,
        redirect_uri: &str,
    ) -> AccessResult<TokenRecord>;

    /// Store a record obtained elsewhere.
    async fn store_record(&self, principal: &str, record: TokenRecord) -> AccessResult<()>;

    /// Forget the principal's credentials, optionally revoking them first.
    async fn invalidate(&self, principal: &str, revoke: bool) -> AccessResult<bool>;

    /// Check for a usable or refreshable record without network I/O.
    async fn has_usable_credential(&self, principal: &str) -> bool;
}

/// Token manager configuration.
#[derive(Debug, Clone)]
pub struct TokenManagerConfig {
    /// Refresh this long before expiry (default: 60 seconds).
    pub safety_margin: Duration,
}

impl Default for TokenManagerConfig {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_secs(DEFAULT_SAFETY_MARGIN_SECS),
        }
    }
}

impl TokenManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set safety margin
    pub fn safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }
}

/// Per-principal refresh slot.
#[derive(Default)]
struct RefreshSlot {
    lock: tokio::sync::Mutex<()>,
    outcome: Mutex<SlotOutcome>,
}

/// Outcome of the latest refresh settled in a slot.
#[derive(Default)]
struct SlotOutcome {
    generation: u64,
    failure: Option<AccessError>,
}

impl RefreshSlot {
    fn generation(&self) -> u64 {
        self.outcome.lock().generation
    }

    /// Error of a refresh settled after `seen`, if the latest one failed.
    fn failure_since(&self, seen: u64) -> Option<AccessError> {
        let outcome = self.outcome.lock();
        if outcome.generation == seen {
            return None;
        }
        outcome.failure.clone()
    }

    fn settle(&self, failure: Option<AccessError>) {
        let mut outcome = self.outcome.lock();
        outcome.generation += 1;
        outcome.failure = failure;
    }
}

/// Default token manager implementation.
pub struct DefaultTokenManager {
    store: Arc<CredentialStore>,
    exchanger: Arc<dyn AuthorizationCodeExchanger>,
    refresher: Arc<dyn TokenRefresher>,
    revoker: Option<Arc<dyn TokenRevoker>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn AccessMetrics>,
    config: TokenManagerConfig,
    slots: Mutex<HashMap<String, Arc<RefreshSlot>>>,
}

impl DefaultTokenManager {
    /// Create new token manager.
    pub fn new(
        store: Arc<CredentialStore>,
        exchanger: Arc<dyn AuthorizationCodeExchanger>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            store,
            exchanger,
            refresher,
            revoker: None,
            clock: Arc::new(SystemClock),
            metrics: Arc::new(NoOpMetrics),
            config: TokenManagerConfig::default(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Set configuration.
    pub fn with_config(mut self, config: TokenManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set revoker used by [`TokenManager::invalidate`].
    pub fn with_revoker(mut self, revoker: Arc<dyn TokenRevoker>) -> Self {
        self.revoker = Some(revoker);
        self
    }

    /// Set clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set metrics.
    pub fn with_metrics(mut self, metrics: Arc<dyn AccessMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Credential store behind this manager.
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Build the provider authorization URL for a new authorization.
    pub fn authorization_url(&self, state: &str, scopes: Option<&[String]>) -> AccessResult<String> {
        self.exchanger.authorization_url(state, scopes)
    }

    fn slot_for(&self, principal: &str) -> Arc<RefreshSlot> {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(principal.to_string()).or_default())
    }

    fn release_slot(&self, principal: &str, slot: Arc<RefreshSlot>) {
        let mut slots = self.slots.lock();
        // Only the map and this caller hold it; nobody else can be waiting.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(principal);
        }
    }

    /// Refresh under the principal's slot.
    ///
    /// A caller that queued behind a failed refresh gets that refresh's error
    /// without calling the provider again. Otherwise `stale` decides, once the
    /// slot is held, whether the stored record still needs replacing or was
    /// already refreshed by the previous holder.
    async fn refresh_single_flight<F>(&self, principal: &str, stale: F) -> AccessResult<CredentialStatus>
    where
        F: Fn(&TokenRecord) -> bool + Send + Sync,
    {
        let slot = self.slot_for(principal);
        let seen = slot.generation();
        let result = {
            let _held = slot.lock.lock().await;
            match slot.failure_since(seen) {
                Some(error) => {
                    debug!(principal = %principal, error = %error, "Sharing failed refresh outcome");
                    Err(error)
                }
                None => {
                    let result = self.refresh_locked(principal, &stale).await;
                    slot.settle(result.as_ref().err().cloned());
                    result
                }
            }
        };
        self.release_slot(principal, slot);
        result
    }

    /// Write `record` for `principal` once no refresh is in flight.
    async fn replace_record(&self, principal: &str, record: TokenRecord) -> AccessResult<()> {
        let slot = self.slot_for(principal);
        let result = {
            let _held = slot.lock.lock().await;
            let result = self.store.put(principal, record).await;
            slot.settle(None);
            result
        };
        self.release_slot(principal, slot);
        result
    }

    async fn refresh_locked<F>(&self, principal: &str, stale: &F) -> AccessResult<CredentialStatus>
    where
        F: Fn(&TokenRecord) -> bool + Send + Sync,
    {
        let current = match self.store.get(principal).await {
            Some(StoreEntry::Active(record)) => record,
            _ => return Ok(CredentialStatus::NeedsInteractiveAuth),
        };

        if !stale(&current) {
            debug!(principal = %principal, "Reusing credentials refreshed by another caller");
            self.metrics.record_refresh_coalesced();
            return Ok(CredentialStatus::Usable(current.to_credential()));
        }

        let Some(refresh_credential) = current.refresh_credential() else {
            return Ok(CredentialStatus::NeedsInteractiveAuth);
        };

        debug!(principal = %principal, expires_at = %current.expires_at, "Refreshing credentials");

        match self.refresher.refresh(refresh_credential).await {
            Ok(refreshed) => {
                if refreshed.expires_at < current.expires_at {
                    warn!(
                        principal = %principal,
                        previous = %current.expires_at,
                        reported = %refreshed.expires_at,
                        "Refreshed credentials expire earlier than the previous ones"
                    );
                }

                let credential = refreshed.to_credential();
                if let Err(e) = self.store.put(principal, refreshed).await {
                    // The cache already holds the new record.
                    warn!(principal = %principal, error = %e, "Refreshed credentials not persisted");
                }
                info!(principal = %principal, expires_at = %credential.expires_at, "Credentials refreshed");
                Ok(CredentialStatus::Usable(credential))
            }
            Err(error) if error.needs_interactive_auth() => {
                self.store
                    .invalidate(principal, error.to_string(), self.clock.now())
                    .await;
                Ok(CredentialStatus::NeedsInteractiveAuth)
            }
            Err(error) => Err(error),
        }
    }
}

#[async_trait]
impl TokenManager for DefaultTokenManager {
    async fn get_usable_credential(&self, principal: &str) -> AccessResult<CredentialStatus> {
        let margin = self.config.safety_margin;

        let record = match self.store.get(principal).await {
            None => {
                debug!(principal = %principal, "No credentials stored");
                return Ok(CredentialStatus::NeedsInteractiveAuth);
            }
            Some(StoreEntry::Invalidated { .. }) => {
                debug!(principal = %principal, "Credentials invalidated, authorization required");
                return Ok(CredentialStatus::NeedsInteractiveAuth);
            }
            Some(StoreEntry::Active(record)) => record,
        };

        if record.is_usable_at(self.clock.now(), margin) {
            return Ok(CredentialStatus::Usable(record.to_credential()));
        }

        if !record.has_refresh_credential() {
            debug!(principal = %principal, "Credentials expired without refresh credential");
            return Ok(CredentialStatus::NeedsInteractiveAuth);
        }

        let clock = Arc::clone(&self.clock);
        self.refresh_single_flight(principal, move |current| {
            !current.is_usable_at(clock.now(), margin)
        })
        .await
    }

    async fn refresh_rejected(
        &self,
        principal: &str,
        rejected: &AccessCredential,
    ) -> AccessResult<CredentialStatus> {
        let rejected = rejected.secret().to_string();
        let margin = self.config.safety_margin;
        let clock = Arc::clone(&self.clock);

        self.refresh_single_flight(principal, move |current| {
            current.access_credential() == rejected || !current.is_usable_at(clock.now(), margin)
        })
        .await
    }

    async fn authorize(
        &self,
        principal: &str,
        code: &str,
        redirect_uri: &str,
    ) -> AccessResult<TokenRecord> {
        let record = self.exchanger.exchange(code, redirect_uri).await?;
        self.replace_record(principal, record.clone()).await?;
        info!(principal = %principal, expires_at = %record.expires_at, "Principal authorized");
        Ok(record)
    }

    async fn store_record(&self, principal: &str, record: TokenRecord) -> AccessResult<()> {
        self.replace_record(principal, record).await
    }

    async fn invalidate(&self, principal: &str, revoke: bool) -> AccessResult<bool> {
        let slot = self.slot_for(principal);
        let result = {
            let _held = slot.lock.lock().await;

            if revoke {
                if let (Some(revoker), Some(entry)) =
                    (&self.revoker, self.store.get(principal).await)
                {
                    let record = entry.record();
                    let (token, hint) = match record.refresh_credential() {
                        Some(refresh) => (refresh, TokenTypeHint::RefreshToken),
                        None => (record.access_credential(), TokenTypeHint::AccessToken),
                    };
                    if let Err(e) = revoker.revoke(token, hint).await {
                        warn!(principal = %principal, error = %e, "Revocation failed, removing credentials anyway");
                    }
                }
            }

            let result = self.store.remove(principal).await;
            slot.settle(None);
            result
        };
        self.release_slot(principal, slot);

        if matches!(result, Ok(true)) {
            info!(principal = %principal, revoke, "Credentials removed");
        }
        result
    }

    async fn has_usable_credential(&self, principal: &str) -> bool {
        match self.store.get(principal).await {
            Some(StoreEntry::Active(record)) => {
                record.has_refresh_credential()
                    || record.is_usable_at(self.clock.now(), self.config.safety_margin)
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for DefaultTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultTokenManager")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("revoker", &self.revoker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::error::{AccessError, ErrorKind, ProviderError};
    use crate::flows::{MockAuthorizationCodeExchanger, MockTokenRefresher};
    use crate::telemetry::InMemoryMetrics;
    use crate::token::{MockTokenPersistence, MockTokenRevoker};
    use futures::future::join_all;

    struct Harness {
        manager: Arc<DefaultTokenManager>,
        refresher: Arc<MockTokenRefresher>,
        exchanger: Arc<MockAuthorizationCodeExchanger>,
        revoker: Arc<MockTokenRevoker>,
        clock: Arc<ManualClock>,
        metrics: Arc<InMemoryMetrics>,
    }

    fn harness(config: TokenManagerConfig) -> Harness {
        let refresher = Arc::new(MockTokenRefresher::new());
        let exchanger = Arc::new(MockAuthorizationCodeExchanger::new());
        let revoker = Arc::new(MockTokenRevoker::new());
        let clock = Arc::new(ManualClock::starting_now());
        let metrics = Arc::new(InMemoryMetrics::new());
        let manager = DefaultTokenManager::new(
            Arc::new(CredentialStore::new()),
            exchanger.clone(),
            refresher.clone(),
        )
        .with_revoker(revoker.clone())
        .with_clock(clock.clone())
        .with_metrics(metrics.clone())
        .with_config(config);

        Harness {
            manager: Arc::new(manager),
            refresher,
            exchanger,
            revoker,
            clock,
            metrics,
        }
    }

    fn record(h: &Harness, access: &str, ttl_secs: u64) -> TokenRecord {
        TokenRecord::new(access, h.clock.now(), Duration::from_secs(ttl_secs))
            .with_refresh_credential("rt-1")
    }

    fn access(status: CredentialStatus) -> String {
        status.credential().expect("usable").secret().to_string()
    }

    #[tokio::test]
    async fn test_fresh_credentials_need_no_refresh() {
        let h = harness(TokenManagerConfig::default());
        h.manager
            .store_record("user-1", record(&h, "at-1", 3600))
            .await
            .unwrap();

        for _ in 0..5 {
            let status = h.manager.get_usable_credential("user-1").await.unwrap();
            assert_eq!(access(status), "at-1");
        }
        assert_eq!(h.refresher.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_principal_needs_authorization() {
        let h = harness(TokenManagerConfig::default());
        let status = h.manager.get_usable_credential("nobody").await.unwrap();
        assert!(!status.is_usable());
        assert!(!h.manager.has_usable_credential("nobody").await);
    }

    #[tokio::test]
    async fn test_authorize_then_get_uses_exchanged_record() {
        let h = harness(TokenManagerConfig::default());
        h.exchanger.set_next_record(record(&h, "at-exchanged", 3600));

        let stored = h
            .manager
            .authorize("user-1", "code-1", "https://app.example.com/callback")
            .await
            .unwrap();
        assert_eq!(stored.access_credential(), "at-exchanged");

        let status = h.manager.get_usable_credential("user-1").await.unwrap();
        assert_eq!(access(status), "at-exchanged");
        assert_eq!(h.refresher.refresh_count(), 0);
        assert_eq!(
            h.exchanger.get_exchange_history(),
            vec![("code-1".to_string(), "https://app.example.com/callback".to_string())]
        );
    }

    #[tokio::test]
    async fn test_refresh_within_safety_margin() {
        let h = harness(TokenManagerConfig::new().safety_margin(Duration::from_secs(300)));
        let t0 = h.clock.now();
        h.manager
            .store_record("user-1", record(&h, "at-1", 3600))
            .await
            .unwrap();
        h.refresher.queue_record(
            TokenRecord::new("at-2", t0 + chrono::Duration::seconds(3500), Duration::from_secs(3600)),
        );

        h.clock.advance(Duration::from_secs(100));
        let status = h.manager.get_usable_credential("user-1").await.unwrap();
        assert_eq!(access(status), "at-1");
        assert_eq!(h.refresher.refresh_count(), 0);

        h.clock.advance(Duration::from_secs(3400));
        let status = h.manager.get_usable_credential("user-1").await.unwrap();
        assert_eq!(access(status), "at-2");
        assert_eq!(h.refresher.refresh_count(), 1);

        let stored = h.manager.store().get_cached("user-1").unwrap();
        assert!(stored.record().expires_at > t0 + chrono::Duration::seconds(3600));
        assert_eq!(stored.record().refresh_credential(), Some("rt-1"));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let h = harness(TokenManagerConfig::default());
        h.manager
            .store_record("user-1", record(&h, "at-1", 30))
            .await
            .unwrap();
        h.refresher
            .set_latency(Duration::from_millis(50))
            .queue_record(TokenRecord::new("at-2", h.clock.now(), Duration::from_secs(3600)));

        let calls = (0..10).map(|_| {
            let manager = Arc::clone(&h.manager);
            async move { manager.get_usable_credential("user-1").await }
        });
        let results = join_all(calls).await;

        for result in results {
            assert_eq!(access(result.unwrap()), "at-2");
        }
        assert_eq!(h.refresher.refresh_count(), 1);
        assert_eq!(h.metrics.count("token_refresh_coalesced"), 9);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failed_refresh() {
        let h = harness(TokenManagerConfig::default());
        h.manager
            .store_record("user-1", record(&h, "at-1", 30))
            .await
            .unwrap();
        h.refresher.set_latency(Duration::from_millis(20));
        for _ in 0..10 {
            h.refresher.queue_transient_failure();
        }

        let calls = (0..10).map(|_| {
            let manager = Arc::clone(&h.manager);
            async move { manager.get_usable_credential("user-1").await }
        });
        let results = join_all(calls).await;

        for result in results {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::TransientNetwork);
        }
        assert_eq!(h.refresher.refresh_count(), 1);

        // A later caller tries again on its own.
        h.manager.get_usable_credential("user-1").await.unwrap_err();
        assert_eq!(h.refresher.refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_authorize_waits_for_refresh_in_flight() {
        let h = harness(TokenManagerConfig::default());
        h.manager
            .store_record(
                "user-1",
                TokenRecord::new("at-old", h.clock.now(), Duration::from_secs(30))
                    .with_refresh_credential("rt-old"),
            )
            .await
            .unwrap();
        h.refresher.set_latency(Duration::from_millis(50));
        h.exchanger.set_next_record(
            TokenRecord::new("fresh-auth", h.clock.now(), Duration::from_secs(3600))
                .with_refresh_credential("rt-new"),
        );

        let (refreshed, authorized) = tokio::join!(
            h.manager.get_usable_credential("user-1"),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                h.manager
                    .authorize("user-1", "code-2", "https://app.example.com/callback")
                    .await
            }
        );
        refreshed.unwrap();
        authorized.unwrap();

        let stored = h.manager.store().get_cached("user-1").unwrap();
        assert_eq!(stored.record().access_credential(), "fresh-auth");
        assert_eq!(stored.record().refresh_credential(), Some("rt-new"));
    }

    #[tokio::test]
    async fn test_principals_refresh_independently() {
        let h = harness(TokenManagerConfig::default());
        for principal in ["user-1", "user-2"] {
            h.manager
                .store_record(principal, record(&h, "stale", 10))
                .await
                .unwrap();
        }
        h.refresher.set_latency(Duration::from_millis(20));

        let (a, b) = tokio::join!(
            h.manager.get_usable_credential("user-1"),
            h.manager.get_usable_credential("user-2")
        );
        assert!(a.unwrap().is_usable());
        assert!(b.unwrap().is_usable());
        assert_eq!(h.refresher.refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_grant_marks_entry_invalid() {
        let h = harness(TokenManagerConfig::default());
        h.manager
            .store_record("user-1", record(&h, "at-1", 10))
            .await
            .unwrap();
        h.refresher.queue_error(AccessError::Provider(ProviderError::InvalidGrant {
            message: "Token has been revoked".to_string(),
        }));

        let status = h.manager.get_usable_credential("user-1").await.unwrap();
        assert!(!status.is_usable());
        assert!(h.manager.store().get_cached("user-1").unwrap().is_invalidated());

        let status = h.manager.get_usable_credential("user-1").await.unwrap();
        assert!(!status.is_usable());
        assert_eq!(h.refresher.refresh_count(), 1);
        assert!(!h.manager.has_usable_credential("user-1").await);
    }

    #[tokio::test]
    async fn test_transient_refresh_failure_is_an_error() {
        let h = harness(TokenManagerConfig::default());
        h.manager
            .store_record("user-1", record(&h, "at-1", 10))
            .await
            .unwrap();
        h.refresher.queue_transient_failure();

        let error = h.manager.get_usable_credential("user-1").await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TransientNetwork);

        // The entry stays usable for a later attempt.
        let status = h.manager.get_usable_credential("user-1").await.unwrap();
        assert!(status.is_usable());
        assert_eq!(h.refresher.refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_credential() {
        let h = harness(TokenManagerConfig::default());
        let expired = TokenRecord::new("at-1", h.clock.now(), Duration::from_secs(10));
        h.manager.store_record("user-1", expired).await.unwrap();

        let status = h.manager.get_usable_credential("user-1").await.unwrap();
        assert!(!status.is_usable());
        assert_eq!(h.refresher.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_keeps_reported_expiry() {
        let h = harness(TokenManagerConfig::default());
        h.manager
            .store_record("user-1", record(&h, "at-1", 30))
            .await
            .unwrap();
        let reported = TokenRecord::new(
            "at-2",
            h.clock.now() - chrono::Duration::seconds(600),
            Duration::from_secs(60),
        );
        let reported_expiry = reported.expires_at;
        h.refresher.queue_record(reported);

        h.manager.get_usable_credential("user-1").await.unwrap();
        let stored = h.manager.store().get_cached("user-1").unwrap();
        assert_eq!(stored.record().access_credential(), "at-2");
        assert_eq!(stored.record().expires_at, reported_expiry);
    }

    #[tokio::test]
    async fn test_refresh_rejected_replaces_credential_once() {
        let h = harness(TokenManagerConfig::default());
        h.manager
            .store_record("user-1", record(&h, "at-1", 3600))
            .await
            .unwrap();

        let rejected = h
            .manager
            .get_usable_credential("user-1")
            .await
            .unwrap()
            .credential()
            .cloned()
            .unwrap();

        let first = h.manager.refresh_rejected("user-1", &rejected).await.unwrap();
        let second = h.manager.refresh_rejected("user-1", &rejected).await.unwrap();

        assert_ne!(access(first.clone()), "at-1");
        assert_eq!(access(first), access(second));
        assert_eq!(h.refresher.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_revokes_refresh_credential() {
        let h = harness(TokenManagerConfig::default());
        h.manager
            .store_record("user-1", record(&h, "at-1", 3600))
            .await
            .unwrap();

        assert!(h.manager.invalidate("user-1", true).await.unwrap());
        assert!(h.revoker.was_revoked("rt-1"));
        assert!(h.manager.store().is_empty());
        assert!(!h.manager.invalidate("user-1", false).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_survives_revocation_failure() {
        let h = harness(TokenManagerConfig::default());
        h.manager
            .store_record("user-1", record(&h, "at-1", 3600))
            .await
            .unwrap();
        h.revoker.set_next_error(AccessError::Provider(ProviderError::ServerError {
            status: 500,
            message: "down".to_string(),
        }));

        assert!(h.manager.invalidate("user-1", true).await.unwrap());
        assert!(h.manager.store().is_empty());
    }

    #[tokio::test]
    async fn test_loads_from_persistence_on_miss() {
        let persistence = Arc::new(MockTokenPersistence::new());
        let clock = Arc::new(ManualClock::starting_now());
        persistence.seed(
            "user-1",
            TokenRecord::new("at-persisted", clock.now(), Duration::from_secs(3600)),
        );
        let manager = DefaultTokenManager::new(
            Arc::new(CredentialStore::with_persistence(persistence.clone())),
            Arc::new(MockAuthorizationCodeExchanger::new()),
            Arc::new(MockTokenRefresher::new()),
        )
        .with_clock(clock);

        let status = manager.get_usable_credential("user-1").await.unwrap();
        assert_eq!(access(status), "at-persisted");
        assert!(manager.has_usable_credential("user-1").await);
    }

    #[tokio::test]
    async fn test_slots_are_released() {
        let h = harness(TokenManagerConfig::default());
        h.manager
            .store_record("user-1", record(&h, "at-1", 10))
            .await
            .unwrap();
        h.manager.get_usable_credential("user-1").await.unwrap();
        assert!(h.manager.slots.lock().is_empty());
    }
}
