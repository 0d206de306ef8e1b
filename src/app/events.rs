//! Signal surface for pipeline observers
//!
//! All pipeline components report through a shared broadcast hub:
//! multi-subscriber, fire-and-forget, no return values. The one exception
//! is the generator's "starting" notification, which must be observable
//! *before* the fetch begins so a subscriber can cancel it; that one is a
//! synchronous hook list with an advisory cancel guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::app::models::{FetchTarget, ProxyCandidate};
use crate::constants::manager;

/// Events published on the signal hub
#[derive(Debug, Clone)]
pub enum HarvestEvent {
    /// A harvesting agent parsed one candidate out of a listing page
    CandidateParsed {
        source: String,
        candidate: ProxyCandidate,
    },
    /// A source returned a page failing its validity predicate and is done
    SourceCompleted { source: String, pages_harvested: u64 },
    /// Every configured source has completed
    AllSourcesCompleted { total_pages: u64 },
    /// The checker finished probing one candidate
    ProxyChecked { candidate: ProxyCandidate },
    /// The checker finished one full pool sweep
    BatchChecked {
        swept: usize,
        valid: usize,
        invalid: usize,
    },
    /// The pool holds its first validated proxy; fires at most once
    PoolReady,
    /// The generator resolved a fetch target
    GeneratorDone {
        target: FetchTarget,
        elapsed: Duration,
        proxy: Option<ProxyCandidate>,
    },
    /// The generator hit an error while resolving a target
    GeneratorException { target: FetchTarget, error: String },
}

/// Multi-subscriber broadcast hub for [`HarvestEvent`]
///
/// Cloning a hub clones the sender side; every clone publishes into the
/// same channel. Emission never blocks and never fails: with no active
/// subscribers events are simply dropped.
#[derive(Debug, Clone)]
pub struct SignalHub {
    tx: broadcast::Sender<HarvestEvent>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::with_capacity(manager::EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<HarvestEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all current subscribers, fire-and-forget
    pub fn emit(&self, event: HarvestEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers (for diagnostics)
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Advisory cancellation flag passed to generator starting hooks
///
/// Cancellation is cooperative: it is observed once, before the fetch
/// begins. An in-flight fetch is never interrupted.
#[derive(Debug, Default)]
pub struct CancelGuard {
    cancelled: AtomicBool,
}

impl CancelGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the pending fetch be skipped
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Synchronous observer invoked before each generator fetch
pub type StartingHook = Box<dyn Fn(&FetchTarget, &CancelGuard) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::ProxyProtocol;

    #[tokio::test]
    async fn test_hub_fan_out() {
        let hub = SignalHub::new();
        let mut rx1 = hub.subscribe();
        let mut rx2 = hub.subscribe();

        hub.emit(HarvestEvent::PoolReady);

        assert!(matches!(rx1.recv().await.unwrap(), HarvestEvent::PoolReady));
        assert!(matches!(rx2.recv().await.unwrap(), HarvestEvent::PoolReady));
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_fire_and_forget() {
        let hub = SignalHub::new();
        // No subscribers; must not panic or error.
        hub.emit(HarvestEvent::SourceCompleted {
            source: "demo".to_string(),
            pages_harvested: 3,
        });
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_payload_round_trip() {
        let hub = SignalHub::new();
        let mut rx = hub.subscribe();

        let candidate = ProxyCandidate::new("10.0.0.1", 8080, ProxyProtocol::Http);
        hub.emit(HarvestEvent::CandidateParsed {
            source: "demo".to_string(),
            candidate: candidate.clone(),
        });

        match rx.recv().await.unwrap() {
            HarvestEvent::CandidateParsed {
                source,
                candidate: received,
            } => {
                assert_eq!(source, "demo");
                assert_eq!(received.id, candidate.id);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_cancel_guard() {
        let guard = CancelGuard::new();
        assert!(!guard.is_cancelled());
        guard.cancel();
        assert!(guard.is_cancelled());
    }
}
