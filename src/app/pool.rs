//! Shared candidate pool
//!
//! The pool is the single piece of mutable state shared between harvesting
//! agents (append), the validation checker (read and in-place update) and
//! the aggregator (read/pop). Every enumerate-then-mutate operation runs
//! under one async mutex; callers never iterate the backing storage
//! without holding the lock or taking a snapshot.
//!
//! Duplicate addresses are tolerated on purpose: validation treats each
//! entry independently, so a duplicate costs one extra probe at worst.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::app::models::{CheckStatus, ProxyCandidate};

/// Outcome of a single candidate probe, applied back onto the pool entry
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// Probe succeeded within the timeout
    Valid { latency: Duration },
    /// Probe failed; the reason is kept for logging only
    Invalid { reason: String },
}

impl CheckOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, CheckOutcome::Valid { .. })
    }
}

/// Aggregate pool counters, taken under the lock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub not_checked: usize,
    pub checking: usize,
    pub checked: usize,
    pub invalid: usize,
}

/// Mutex-guarded collection of proxy candidates
///
/// Wrap in an `Arc` to share between workers.
#[derive(Debug, Default)]
pub struct ProxyPool {
    entries: Mutex<Vec<ProxyCandidate>>,
}

impl ProxyPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one candidate
    pub async fn push(&self, candidate: ProxyCandidate) {
        let mut entries = self.entries.lock().await;
        debug!("pool add {} ({})", candidate.address(), candidate.protocol);
        entries.push(candidate);
    }

    /// Append a batch of candidates, returning how many were added
    pub async fn extend(&self, candidates: Vec<ProxyCandidate>) -> usize {
        let count = candidates.len();
        if count == 0 {
            return 0;
        }
        let mut entries = self.entries.lock().await;
        entries.extend(candidates);
        count
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Number of entries currently validated
    pub async fn checked_count(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.iter().filter(|c| c.status.is_checked()).count()
    }

    /// Copy of the current entries, for observers
    pub async fn snapshot(&self) -> Vec<ProxyCandidate> {
        self.entries.lock().await.clone()
    }

    /// Return one validated proxy, if any
    ///
    /// With `pop = false` the first `Checked` entry is cloned and the pool
    /// is left untouched; with `pop = true` the entry is removed. `None`
    /// means nothing is validated right now — a normal, retryable
    /// condition, not an error.
    pub async fn get_one(&self, pop: bool) -> Option<ProxyCandidate> {
        let mut entries = self.entries.lock().await;
        let index = entries.iter().position(|c| c.status.is_checked())?;
        if pop {
            Some(entries.remove(index))
        } else {
            Some(entries[index].clone())
        }
    }

    /// Claim every entry that is due for a probe
    ///
    /// Due means never checked, or checked longer ago than
    /// `recheck_interval`. Claimed entries are marked `Checking` under the
    /// lock and returned as snapshots for the probe tasks; identity slots
    /// stay in the pool, so in-place result writes stay race-free.
    pub async fn begin_checks(&self, recheck_interval: Duration) -> Vec<ProxyCandidate> {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();
        let mut due = Vec::new();

        for candidate in entries.iter_mut() {
            let is_due = match candidate.status {
                CheckStatus::NotChecked => true,
                CheckStatus::Checking => false,
                CheckStatus::Checked | CheckStatus::CheckedInvalid => candidate
                    .last_checked
                    .map(|checked| {
                        now.signed_duration_since(checked)
                            .to_std()
                            .unwrap_or(Duration::ZERO)
                            >= recheck_interval
                    })
                    .unwrap_or(true),
            };

            if is_due {
                candidate.mark_checking();
                due.push(candidate.clone());
            }
        }

        due
    }

    /// Write a probe outcome back onto the entry with the given id
    ///
    /// Returns `false` when the entry has been popped in the meantime.
    pub async fn apply_outcome(&self, id: Uuid, outcome: &CheckOutcome) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(candidate) = entries.iter_mut().find(|c| c.id == id) else {
            return false;
        };

        match outcome {
            CheckOutcome::Valid { latency } => candidate.mark_checked(*latency),
            CheckOutcome::Invalid { reason } => {
                debug!("pool demote {}: {}", candidate.address(), reason);
                candidate.mark_invalid();
            }
        }
        true
    }

    /// Demote an entry by id, the convention used by proxy consumers
    /// when a borrowed proxy fails mid-use
    pub async fn invalidate(&self, id: Uuid) -> bool {
        self.apply_outcome(
            id,
            &CheckOutcome::Invalid {
                reason: "reported invalid by consumer".to_string(),
            },
        )
        .await
    }

    /// Remove every entry
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Aggregate counters for logging and the batch signal
    pub async fn stats(&self) -> PoolStats {
        let entries = self.entries.lock().await;
        let mut stats = PoolStats {
            total: entries.len(),
            ..Default::default()
        };
        for candidate in entries.iter() {
            match candidate.status {
                CheckStatus::NotChecked => stats.not_checked += 1,
                CheckStatus::Checking => stats.checking += 1,
                CheckStatus::Checked => stats.checked += 1,
                CheckStatus::CheckedInvalid => stats.invalid += 1,
            }
        }
        stats
    }
}
