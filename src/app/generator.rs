//! Generic queue-based fetch worker
//!
//! A single-consumer loop over a caller-fed queue of fetch targets. The
//! generator is not proxy-specific: it optionally borrows a proxy from a
//! supplied provider callback and reports proxy failures through an
//! equally generic invalidator callback. Targets whose fetch fails with a
//! proxy-attributable transport error are re-queued rather than lost.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::events::{CancelGuard, HarvestEvent, SignalHub, StartingHook};
use crate::app::models::{FetchTarget, ProxyCandidate};
use crate::constants::{generator, http};
use crate::errors::{GeneratorError, GeneratorResult};

/// Callback supplying an optional proxy for the next fetch
pub type ProxyProvider =
    Arc<dyn Fn() -> BoxFuture<'static, Option<ProxyCandidate>> + Send + Sync>;

/// Callback notified when a borrowed proxy fails mid-use
pub type ProxyInvalidator = Arc<dyn Fn(Uuid) -> BoxFuture<'static, ()> + Send + Sync>;

/// Configuration for the content generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Poll interval when the queue is empty
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Timeout for a single target fetch
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: generator::POLL_INTERVAL,
            fetch_timeout: generator::FETCH_TIMEOUT,
        }
    }
}

impl GeneratorConfig {
    /// Configuration tuned for fast tests
    pub fn for_testing() -> Self {
        Self {
            poll_interval: Duration::from_millis(5),
            fetch_timeout: Duration::from_millis(500),
        }
    }
}

/// Shared mutable queue of fetch targets
///
/// Callers push targets from anywhere; the single generator loop is the
/// only consumer, so each target is dequeued exactly once per attempt.
#[derive(Debug, Clone, Default)]
pub struct FetchQueue {
    inner: Arc<Mutex<VecDeque<FetchTarget>>>,
}

impl FetchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a target to the back of the queue
    pub async fn push(&self, target: FetchTarget) {
        self.inner.lock().await.push_back(target);
    }

    /// Put a target back at the front, ahead of newer work
    pub async fn requeue_front(&self, target: FetchTarget) {
        self.inner.lock().await.push_front(target);
    }

    pub async fn pop(&self) -> Option<FetchTarget> {
        self.inner.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

/// Single-consumer fetch worker
pub struct ContentGenerator {
    config: GeneratorConfig,
    queue: FetchQueue,
    provider: Option<ProxyProvider>,
    invalidator: Option<ProxyInvalidator>,
    starting_hooks: Vec<StartingHook>,
    hub: SignalHub,
    shutdown_rx: mpsc::Receiver<()>,
}

impl ContentGenerator {
    pub fn new(
        config: GeneratorConfig,
        queue: FetchQueue,
        hub: SignalHub,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            config,
            queue,
            provider: None,
            invalidator: None,
            starting_hooks: Vec::new(),
            hub,
            shutdown_rx,
        }
    }

    /// Supply the proxy provider and failure callback
    pub fn with_proxy_source(
        mut self,
        provider: ProxyProvider,
        invalidator: ProxyInvalidator,
    ) -> Self {
        self.provider = Some(provider);
        self.invalidator = Some(invalidator);
        self
    }

    /// Register a synchronous hook run before every fetch
    ///
    /// Hooks may cancel the pending fetch through the guard; cancellation
    /// re-queues the target untouched.
    pub fn on_starting(&mut self, hook: StartingHook) {
        self.starting_hooks.push(hook);
    }

    /// Run the generator loop until a shutdown signal arrives
    pub async fn run(mut self) {
        info!("content generator starting");

        loop {
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(mpsc::error::TryRecvError::Disconnected) => break,
                Err(mpsc::error::TryRecvError::Empty) => {}
            }

            let processed = self.process_next().await;
            if !processed {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    _ = self.shutdown_rx.recv() => break,
                }
            }
        }

        info!("content generator shutting down");
    }

    /// Dequeue and resolve one target; `false` means the tick was idle
    async fn process_next(&mut self) -> bool {
        let Some(mut target) = self.queue.pop().await else {
            return false;
        };

        // Starting hooks run synchronously so a cancel is observed before
        // the fetch begins; an in-flight fetch is never interrupted.
        let guard = CancelGuard::new();
        for hook in &self.starting_hooks {
            hook(&target, &guard);
        }
        if guard.is_cancelled() {
            debug!("fetch of {} cancelled by subscriber", target.url);
            self.queue.requeue_front(target).await;
            return false;
        }

        let proxy = match &self.provider {
            Some(provider) => provider().await,
            None => None,
        };
        let started = Instant::now();

        match self.fetch(&target, proxy.as_ref()).await {
            Ok(body) => {
                target.content = Some(body);
                debug!("resolved {} in {:?}", target.url, started.elapsed());
                self.hub.emit(HarvestEvent::GeneratorDone {
                    target,
                    elapsed: started.elapsed(),
                    proxy,
                });
            }
            Err(GeneratorError::ProxyTransport { message }) => {
                // The proxy, not the target, is the likely culprit:
                // re-queue the target and demote the proxy so the
                // checker's next sweep sees it.
                warn!("proxy failure fetching {}: {}", target.url, message);
                self.queue.push(target.clone()).await;
                if let (Some(invalidator), Some(candidate)) = (&self.invalidator, &proxy) {
                    invalidator(candidate.id).await;
                }
                self.hub.emit(HarvestEvent::GeneratorException {
                    target,
                    error: message,
                });
            }
            Err(err) => {
                warn!("failed to fetch {}: {}", target.url, err);
                target.invalid_page = true;
                self.hub.emit(HarvestEvent::GeneratorException {
                    target,
                    error: err.to_string(),
                });
            }
        }

        true
    }

    /// Fetch one target, optionally through a proxy with a rotated
    /// user agent
    async fn fetch(
        &self,
        target: &FetchTarget,
        proxy: Option<&ProxyCandidate>,
    ) -> GeneratorResult<String> {
        let user_agent = random_user_agent();
        let mut builder = Client::builder()
            .timeout(self.config.fetch_timeout)
            .user_agent(user_agent);

        if let Some(candidate) = proxy {
            let mut reqwest_proxy = reqwest::Proxy::all(candidate.proxy_url())?;
            if let Some(auth) = &candidate.auth {
                reqwest_proxy = reqwest_proxy.basic_auth(&auth.username, &auth.password);
            }
            builder = builder.proxy(reqwest_proxy);
        }

        let client = builder.build()?;
        let response = client.get(&target.url).send().await.map_err(|err| {
            if proxy.is_some() && (err.is_connect() || err.is_timeout()) {
                GeneratorError::ProxyTransport {
                    message: err.to_string(),
                }
            } else {
                GeneratorError::Http(err)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeneratorError::BadStatus {
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(GeneratorError::Http)
    }
}

/// Pick a user agent at random from the rotation list
fn random_user_agent() -> &'static str {
    let index = rand::thread_rng().gen_range(0..http::USER_AGENTS.len());
    http::USER_AGENTS[index]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::ProxyProtocol;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn spawn_http_server(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = stream.read(&mut buf).await;
                    let response = format!(
                        "{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status_line,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{}/", addr)
    }

    async fn dead_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    fn generator_for(queue: FetchQueue, hub: SignalHub) -> ContentGenerator {
        let (_shutdown_tx, shutdown_rx) = mpsc::channel(1);
        ContentGenerator::new(GeneratorConfig::for_testing(), queue, hub, shutdown_rx)
    }

    #[tokio::test]
    async fn test_empty_queue_is_idle() {
        let queue = FetchQueue::new();
        let mut generator = generator_for(queue, SignalHub::new());
        assert!(!generator.process_next().await);
    }

    #[tokio::test]
    async fn test_successful_fetch_emits_done() {
        let url = spawn_http_server("HTTP/1.1 200 OK", "hello").await;
        let queue = FetchQueue::new();
        queue.push(FetchTarget::new(&url)).await;

        let hub = SignalHub::new();
        let mut rx = hub.subscribe();
        let mut generator = generator_for(queue.clone(), hub);

        assert!(generator.process_next().await);
        assert!(queue.is_empty().await);

        match rx.try_recv().unwrap() {
            HarvestEvent::GeneratorDone {
                target,
                elapsed,
                proxy,
            } => {
                assert_eq!(target.content.as_deref(), Some("hello"));
                assert!(!target.invalid_page);
                assert!(elapsed > Duration::ZERO);
                assert!(proxy.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    /// A proxy-attributable failure re-queues the target (exactly once
    /// per failure) and reports the proxy to the invalidator.
    #[tokio::test]
    async fn test_proxy_failure_requeues_target() {
        let port = dead_port().await;
        let candidate = ProxyCandidate::new("127.0.0.1", port, ProxyProtocol::Http);
        let candidate_id = candidate.id;

        let invalidations = Arc::new(AtomicUsize::new(0));
        let invalidations_cb = Arc::clone(&invalidations);

        let provider: ProxyProvider = Arc::new(move || {
            let candidate = candidate.clone();
            Box::pin(async move { Some(candidate) })
        });
        let invalidator: ProxyInvalidator = Arc::new(move |id| {
            assert_eq!(id, candidate_id);
            let invalidations = Arc::clone(&invalidations_cb);
            Box::pin(async move {
                invalidations.fetch_add(1, Ordering::SeqCst);
            })
        });

        let queue = FetchQueue::new();
        queue.push(FetchTarget::new("http://target.invalid/")).await;

        let hub = SignalHub::new();
        let mut rx = hub.subscribe();
        let mut generator =
            generator_for(queue.clone(), hub).with_proxy_source(provider, invalidator);

        // First failure: target is back in the queue, proxy reported.
        assert!(generator.process_next().await);
        assert_eq!(queue.len().await, 1);
        assert_eq!(invalidations.load(Ordering::SeqCst), 1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            HarvestEvent::GeneratorException { .. }
        ));

        // Second failure: re-queued again, never lost.
        assert!(generator.process_next().await);
        assert_eq!(queue.len().await, 1);
        assert_eq!(invalidations.load(Ordering::SeqCst), 2);
    }

    /// A cancelling starting hook skips the fetch and keeps the target.
    #[tokio::test]
    async fn test_starting_hook_cancels_fetch() {
        let queue = FetchQueue::new();
        let target = FetchTarget::new("http://target.invalid/");
        let target_id = target.id;
        queue.push(target).await;

        let hub = SignalHub::new();
        let mut rx = hub.subscribe();
        let mut generator = generator_for(queue.clone(), hub);
        generator.on_starting(Box::new(|_, guard| guard.cancel()));

        assert!(!generator.process_next().await);
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.pop().await.unwrap().id, target_id);
        assert!(rx.try_recv().is_err());
    }

    /// A non-success status is not proxy-attributable: the target is
    /// flagged invalid and removed.
    #[tokio::test]
    async fn test_bad_status_flags_invalid_page() {
        let url = spawn_http_server("HTTP/1.1 404 Not Found", "gone").await;
        let queue = FetchQueue::new();
        queue.push(FetchTarget::new(&url)).await;

        let hub = SignalHub::new();
        let mut rx = hub.subscribe();
        let mut generator = generator_for(queue.clone(), hub);

        assert!(generator.process_next().await);
        assert!(queue.is_empty().await);

        match rx.try_recv().unwrap() {
            HarvestEvent::GeneratorException { target, error } => {
                assert!(target.invalid_page);
                assert!(error.contains("404"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    /// Multiple hooks all observe the starting notification.
    #[tokio::test]
    async fn test_multiple_starting_hooks_fan_out() {
        let url = spawn_http_server("HTTP/1.1 200 OK", "ok").await;
        let queue = FetchQueue::new();
        queue.push(FetchTarget::new(&url)).await;

        let seen = Arc::new(AtomicUsize::new(0));
        let mut generator = generator_for(queue.clone(), SignalHub::new());
        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            generator.on_starting(Box::new(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert!(generator.process_next().await);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
