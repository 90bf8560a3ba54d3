//! Single-use enforcement for payment proofs.
//!
//! [`ReplayGuard::consume_once`] answers `true` exactly once per proof
//! identifier for as long as the proof could still be accepted: the record
//! outlives both the configured retention and the proof's own `validBefore`.
//! The atomicity lives in the
//! [`ReplayStore`]: its `insert_if_absent` is a single check-and-set, so two
//! requests racing on the same proof can never both observe "absent".
//!
//! [`InMemoryReplayStore`] serves a single instance. A store shared between
//! instances (Redis `SET NX PX`, a database unique key) plugs in through the
//! same trait.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use x402_paywall_types::codec::ProofId;
use x402_paywall_types::timestamp::UnixTimestamp;

#[derive(Debug, thiserror::Error)]
#[error("Replay store unavailable: {0}")]
pub struct ReplayStoreError(pub String);

/// Time-bounded key store with an atomic check-and-set.
#[async_trait]
pub trait ReplayStore: Send + Sync {
    /// Records `id` for at least `ttl` unless it is already recorded and
    /// unexpired. Returns `true` when this call recorded it.
    async fn insert_if_absent(&self, id: &ProofId, ttl: Duration) -> Result<bool, ReplayStoreError>;
}

/// Process-local [`ReplayStore`] on a sharded concurrent map.
///
/// Expired entries are dropped lazily: on access, and by a sweep every
/// [`InMemoryReplayStore::SWEEP_EVERY`] insertions.
#[derive(Debug, Default)]
pub struct InMemoryReplayStore {
    expires_at: DashMap<ProofId, Instant>,
    inserts: AtomicUsize,
}

impl InMemoryReplayStore {
    const SWEEP_EVERY: usize = 1024;
    /// Expiry used when `now + ttl` does not fit in an [`Instant`].
    const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.expires_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expires_at.is_empty()
    }

    /// Drops every entry whose retention has elapsed.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.expires_at.retain(|_, expires_at| *expires_at > now);
    }
}

#[async_trait]
impl ReplayStore for InMemoryReplayStore {
    async fn insert_if_absent(&self, id: &ProofId, ttl: Duration) -> Result<bool, ReplayStoreError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + Self::MAX_TTL);
        let inserted = match self.expires_at.entry(*id) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > now {
                    false
                } else {
                    occupied.insert(expires_at);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(expires_at);
                true
            }
        };
        // The entry guard is released above; sweeping while holding it would deadlock its shard.
        if inserted && self.inserts.fetch_add(1, Ordering::Relaxed) % Self::SWEEP_EVERY == Self::SWEEP_EVERY - 1 {
            self.purge_expired();
        }
        Ok(inserted)
    }
}

/// Consumes proof identifiers, each at most once while the proof is acceptable.
#[derive(Clone)]
pub struct ReplayGuard {
    store: Arc<dyn ReplayStore>,
    retention: Duration,
}

impl std::fmt::Debug for ReplayGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayGuard")
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl ReplayGuard {
    /// Creates a guard keeping entries for at least `retention`, usually the
    /// requirement's validity window.
    pub fn new(store: Arc<dyn ReplayStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    pub fn in_memory(retention: Duration) -> Self {
        Self::new(Arc::new(InMemoryReplayStore::new()), retention)
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// How long the record of a proof expiring at `valid_before` is kept.
    ///
    /// Never shorter than the time left until `valid_before`, plus one second
    /// for the whole-second resolution of authorization windows.
    pub fn retention_for(&self, valid_before: Option<UnixTimestamp>) -> Duration {
        let remaining = valid_before
            .map(|deadline| {
                let secs = deadline.as_secs().saturating_sub(UnixTimestamp::now().as_secs());
                Duration::from_secs(secs.saturating_add(1))
            })
            .unwrap_or_default();
        self.retention.max(remaining)
    }

    /// `true` only for the first consumption of `id`.
    pub async fn consume_once(
        &self,
        id: &ProofId,
        valid_before: Option<UnixTimestamp>,
    ) -> Result<bool, ReplayStoreError> {
        self.store
            .insert_if_absent(id, self.retention_for(valid_before))
            .await
    }
}
