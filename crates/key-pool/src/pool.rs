//! Credential pool: first-eligible selection with durable quarantine
//!
//! The pool holds the credentials of one key-type family in load order and
//! always hands out the first one not currently quarantined. Selection is
//! round-robin by exhaustion: the same credential is returned until a caller
//! reports it bad via `release_bad`.
//!
//! Quarantine entries expire lazily: every `acquire()` drops entries older
//! than the TTL and persists the pruned map. When nothing is eligible the
//! whole store is reset and credentials are reloaded from configuration, so
//! a provider outage that burned every key never leaves the pool empty for a
//! full day.
//!
//! Each pool guards its credential list with its own `tokio::sync::Mutex`.
//! Store read-modify-write sequences additionally hold the store's
//! `write_lock()`, which every pool on that store shares. Lock order is
//! always pool, then store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::credential::{Credential, CredentialShape};
use crate::error::Result;
use crate::source::{CredentialSource, load_credentials};
use crate::store::{QuarantineMap, QuarantineStore};

/// How long a quarantine entry is honored.
pub const DEFAULT_QUARANTINE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Highest numeric suffix scanned when none is configured.
pub const DEFAULT_MAX_KEYS: usize = 50;

/// Which credentials a pool loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Prefix of the configuration entries, e.g. `TEXT_KEY`.
    pub key_type: String,
    /// Scan `{key_type}_1` through `{key_type}_{max_keys}`.
    pub max_keys: usize,
    pub shape: CredentialShape,
}

impl PoolConfig {
    pub fn new(key_type: impl Into<String>, max_keys: usize, shape: CredentialShape) -> Self {
        Self {
            key_type: key_type.into(),
            max_keys,
            shape,
        }
    }

    pub fn single(key_type: impl Into<String>) -> Self {
        Self::new(key_type, DEFAULT_MAX_KEYS, CredentialShape::Single)
    }

    pub fn paired(key_type: impl Into<String>) -> Self {
        Self::new(key_type, DEFAULT_MAX_KEYS, CredentialShape::Paired)
    }
}

/// Rotation pool for one key-type family.
pub struct KeyPool {
    config: PoolConfig,
    ttl: TimeDelta,
    source: Arc<dyn CredentialSource>,
    store: Arc<dyn QuarantineStore>,
    audit: AuditLog,
    credentials: Mutex<Vec<Credential>>,
}

impl KeyPool {
    /// Build a pool, scanning `source` once for its credentials.
    ///
    /// A pool with zero credentials is valid; `acquire()` will return `None`
    /// until configuration provides some.
    pub fn new(
        config: PoolConfig,
        source: Arc<dyn CredentialSource>,
        store: Arc<dyn QuarantineStore>,
    ) -> Self {
        let credentials = load_credentials(source.as_ref(), &config);
        if credentials.is_empty() {
            warn!(key_type = %config.key_type, "no credentials configured for pool");
        }
        info!(
            key_type = %config.key_type,
            credentials = credentials.len(),
            "pool initialized"
        );
        Self {
            config,
            ttl: to_time_delta(DEFAULT_QUARANTINE_TTL),
            source,
            store,
            audit: AuditLog::disabled(),
            credentials: Mutex::new(credentials),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = to_time_delta(ttl);
        self
    }

    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn key_type(&self) -> &str {
        &self.config.key_type
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of credentials currently loaded.
    pub async fn len(&self) -> usize {
        self.credentials.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Return the first credential not in quarantine.
    ///
    /// Prunes expired entries first. If every credential is quarantined, the
    /// store is cleared, the reset is written to the audit log, and
    /// credentials are reloaded from the source. `Ok(None)` means there is
    /// still nothing to hand out; callers should answer "try again later".
    pub async fn acquire(&self) -> Result<Option<Credential>> {
        let mut credentials = self.credentials.lock().await;
        let _write = self.store.write_lock().lock().await;
        let mut quarantine = self.load_pruned().await?;

        if let Some(credential) = first_eligible(&credentials, &quarantine) {
            debug!(
                key_type = %self.config.key_type,
                credential = credential.name(),
                "credential selected"
            );
            record_acquire(&self.config.key_type, "selected");
            return Ok(Some(credential));
        }

        warn!(
            key_type = %self.config.key_type,
            loaded = credentials.len(),
            quarantined = quarantine.len(),
            "no eligible credential, resetting quarantine store"
        );
        quarantine.clear();
        self.store.save(&quarantine).await?;
        self.audit
            .record(&format!(
                "{}: all credentials quarantined or missing, quarantine store reset",
                self.config.key_type
            ))
            .await;
        metrics::counter!("key_pool_resets_total", "key_type" => self.config.key_type.clone())
            .increment(1);

        *credentials = load_credentials(self.source.as_ref(), &self.config);
        info!(
            key_type = %self.config.key_type,
            credentials = credentials.len(),
            "credentials reloaded after reset"
        );

        match credentials.first() {
            Some(credential) => {
                record_acquire(&self.config.key_type, "selected_after_reset");
                Ok(Some(credential.clone()))
            }
            None => {
                warn!(key_type = %self.config.key_type, "pool exhausted, no credentials configured");
                record_acquire(&self.config.key_type, "exhausted");
                Ok(None)
            }
        }
    }

    /// Quarantine `name` as of now and persist immediately.
    ///
    /// Re-quarantining refreshes the timestamp. The name is not checked
    /// against this pool: the store is shared, so any name is accepted.
    pub async fn release_bad(&self, name: &str) -> Result<()> {
        let _guard = self.credentials.lock().await;
        let _write = self.store.write_lock().lock().await;
        let mut quarantine = self.store.load().await?;
        quarantine.insert(name.to_string(), Utc::now());
        self.store.save(&quarantine).await?;

        info!(
            key_type = %self.config.key_type,
            credential = name,
            ttl_secs = self.ttl.num_seconds(),
            "credential quarantined"
        );
        metrics::counter!("key_pool_quarantined_total", "key_type" => self.config.key_type.clone())
            .increment(1);
        Ok(())
    }

    /// Read-only pool summary for health reporting. Never exposes secrets.
    ///
    /// Status mapping: every credential eligible → healthy, some → degraded,
    /// none (or nothing loaded) → unhealthy.
    pub async fn status(&self) -> Result<serde_json::Value> {
        let credentials = self.credentials.lock().await;
        let quarantine = self.store.load().await?;
        let now = Utc::now();

        let mut entries = Vec::with_capacity(credentials.len());
        let mut available = 0usize;

        for credential in credentials.iter() {
            let since = credential
                .names()
                .iter()
                .filter_map(|name| quarantine.get(*name))
                .filter(|at| !self.is_expired(at, now))
                .max()
                .copied();

            match since {
                None => {
                    available += 1;
                    entries.push(serde_json::json!({
                        "name": credential.name(),
                        "status": "available"
                    }));
                }
                Some(at) => {
                    let remaining = at
                        .checked_add_signed(self.ttl)
                        .map(|until| (until - now).num_seconds().max(0));
                    entries.push(serde_json::json!({
                        "name": credential.name(),
                        "status": "quarantined",
                        "quarantined_at": at.to_rfc3339_opts(SecondsFormat::Secs, true),
                        "remaining_secs": remaining
                    }));
                }
            }
        }

        let total = credentials.len();
        let status = if total > 0 && available == total {
            "healthy"
        } else if available > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        Ok(serde_json::json!({
            "key_type": self.config.key_type,
            "status": status,
            "credentials_total": total,
            "credentials_available": available,
            "credentials_quarantined": total - available,
            "credentials": entries
        }))
    }

    /// Load the store and drop entries older than the TTL, persisting if
    /// anything was removed.
    async fn load_pruned(&self) -> Result<QuarantineMap> {
        let mut quarantine = self.store.load().await?;
        let now = Utc::now();
        let before = quarantine.len();
        quarantine.retain(|_, at| !self.is_expired(at, now));

        let removed = before - quarantine.len();
        if removed > 0 {
            self.store.save(&quarantine).await?;
            debug!(
                key_type = %self.config.key_type,
                removed,
                "pruned expired quarantine entries"
            );
        }
        Ok(quarantine)
    }

    fn is_expired(&self, at: &DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(*at) > self.ttl
    }
}

fn first_eligible(credentials: &[Credential], quarantine: &QuarantineMap) -> Option<Credential> {
    credentials
        .iter()
        .find(|c| c.is_eligible(quarantine))
        .cloned()
}

fn to_time_delta(ttl: Duration) -> TimeDelta {
    TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX)
}

fn record_acquire(key_type: &str, outcome: &'static str) {
    metrics::counter!(
        "key_pool_acquire_total",
        "key_type" => key_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
