//! Harvest aggregation and orchestration
//!
//! The manager is the control plane of the pipeline: it owns the shared
//! pool, one harvesting agent per source and the validation checker,
//! collects agent reports into the pool, tracks per-source completion and
//! exposes the consumer surface (`get_one`, readiness, lifecycle verbs).
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use proxy_harvester::app::{
//!     CheckerConfig, ClientConfig, HarvestManager, ListSource, ManagerConfig,
//!     PageClient, ProxySource,
//! };
//! use proxy_harvester::config::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let fetcher = Arc::new(PageClient::new(ClientConfig::default())?);
//!
//! let mut sources: Vec<Arc<dyn ProxySource>> = Vec::new();
//! for source_config in &config.sources {
//!     sources.push(Arc::new(ListSource::new(source_config.clone())?));
//! }
//!
//! let mut manager = HarvestManager::new(
//!     ManagerConfig::default(),
//!     CheckerConfig::default(),
//!     sources,
//!     fetcher,
//! );
//! manager.start().await;
//!
//! // Consumers poll for a validated proxy; `None` is normal early on.
//! if let Some(proxy) = manager.get_one(false).await {
//!     println!("validated proxy: {}", proxy);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::agent::{AgentHandle, AgentMessage, AgentStatus, HarvestAgent};
use crate::app::checker::{CheckerConfig, PoolChecker};
use crate::app::client::PageFetcher;
use crate::app::events::{HarvestEvent, SignalHub};
use crate::app::generator::{ProxyInvalidator, ProxyProvider};
use crate::app::models::ProxyCandidate;
use crate::app::pool::{PoolStats, ProxyPool};
use crate::app::source::ProxySource;
use crate::constants::manager;

/// Configuration for the harvest manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Delay between starting consecutive agents
    #[serde(with = "humantime_serde")]
    pub stagger_delay: Duration,
    /// Capacity of the agent report channel
    pub report_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            stagger_delay: manager::STAGGER_DELAY,
            report_capacity: manager::REPORT_CHANNEL_CAPACITY,
        }
    }
}

impl ManagerConfig {
    /// Configuration tuned for fast tests
    pub fn for_testing() -> Self {
        Self {
            stagger_delay: Duration::from_millis(1),
            report_capacity: 16,
        }
    }
}

/// Lifecycle state of the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Created,
    Running,
    Suspended,
}

/// Central aggregator owning the pool, agents and checker
pub struct HarvestManager {
    config: ManagerConfig,
    pool: Arc<ProxyPool>,
    hub: SignalHub,
    agents: Vec<AgentHandle>,
    checker_shutdown: mpsc::Sender<()>,
    checker_handle: JoinHandle<()>,
    collector_handle: JoinHandle<()>,
    watcher_handle: JoinHandle<()>,
    ready: Arc<AtomicBool>,
    state: ManagerState,
}

impl HarvestManager {
    /// Wire up agents, checker and collector for the given sources
    ///
    /// Agents spawn suspended; call [`start`](Self::start) to begin
    /// harvesting. The checker starts sweeping immediately, which is a
    /// no-op until candidates arrive.
    pub fn new(
        config: ManagerConfig,
        checker_config: CheckerConfig,
        sources: Vec<Arc<dyn ProxySource>>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let pool = Arc::new(ProxyPool::new());
        let hub = SignalHub::new();

        let (report_tx, report_rx) = mpsc::channel(config.report_capacity);
        let agents: Vec<AgentHandle> = sources
            .into_iter()
            .map(|source| HarvestAgent::spawn(source, Arc::clone(&fetcher), report_tx.clone()))
            .collect();
        // The collector ends when every agent has dropped its sender.
        drop(report_tx);

        let collector_handle = tokio::spawn(collect_reports(
            report_rx,
            Arc::clone(&pool),
            hub.clone(),
            agents.len(),
        ));

        let ready = Arc::new(AtomicBool::new(false));
        let watcher_handle = tokio::spawn(watch_readiness(hub.subscribe(), hub.clone(), Arc::clone(&ready)));

        let (checker_shutdown, checker_shutdown_rx) = mpsc::channel(1);
        let checker = PoolChecker::new(
            checker_config,
            Arc::clone(&pool),
            hub.clone(),
            checker_shutdown_rx,
        );
        let checker_handle = tokio::spawn(checker.run());

        Self {
            config,
            pool,
            hub,
            agents,
            checker_shutdown,
            checker_handle,
            collector_handle,
            watcher_handle,
            ready,
            state: ManagerState::Created,
        }
    }

    /// Resume every agent, staggered to avoid a synchronized burst of
    /// first requests
    pub async fn start(&mut self) {
        info!("starting {} harvesting agents", self.agents.len());
        for agent in &self.agents {
            agent.resume();
            tokio::time::sleep(self.config.stagger_delay).await;
        }
        self.state = ManagerState::Running;
    }

    /// Suspend every agent; in-flight pages finish first
    pub fn stop(&mut self) {
        info!("suspending {} harvesting agents", self.agents.len());
        for agent in &self.agents {
            agent.suspend();
        }
        self.state = ManagerState::Suspended;
    }

    /// Return one validated proxy, if any
    ///
    /// `None` means no validated entry exists right now; callers treat
    /// this as a normal, retryable condition.
    pub async fn get_one(&self, pop: bool) -> Option<ProxyCandidate> {
        self.pool.get_one(pop).await
    }

    /// Whether the pool has held at least one validated proxy
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Whether every source has completed
    pub fn all_sources_completed(&self) -> bool {
        !self.agents.is_empty() && self.agents.iter().all(AgentHandle::is_completed)
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// Current status per agent, for diagnostics
    pub fn agent_statuses(&self) -> Vec<(String, AgentStatus)> {
        self.agents
            .iter()
            .map(|agent| (agent.name().to_string(), agent.status()))
            .collect()
    }

    /// Shared pool handle for collaborating components
    pub fn pool(&self) -> Arc<ProxyPool> {
        Arc::clone(&self.pool)
    }

    pub async fn pool_stats(&self) -> PoolStats {
        self.pool.stats().await
    }

    /// Subscribe to the pipeline signal surface
    pub fn subscribe(&self) -> broadcast::Receiver<HarvestEvent> {
        self.hub.subscribe()
    }

    /// Signal hub handle, for components that emit alongside the manager
    pub fn hub(&self) -> SignalHub {
        self.hub.clone()
    }

    /// Provider callback lending validated proxies to a content generator
    pub fn proxy_provider(&self) -> ProxyProvider {
        let pool = Arc::clone(&self.pool);
        Arc::new(move || {
            let pool = Arc::clone(&pool);
            Box::pin(async move { pool.get_one(false).await })
        })
    }

    /// Invalidator callback demoting a borrowed proxy that failed in use
    pub fn proxy_invalidator(&self) -> ProxyInvalidator {
        let pool = Arc::clone(&self.pool);
        Arc::new(move |id| {
            let pool = Arc::clone(&pool);
            Box::pin(async move {
                pool.invalidate(id).await;
            })
        })
    }

    /// Terminate agents, checker and background tasks
    pub async fn shutdown(mut self) {
        info!("shutting down harvest manager");

        for agent in self.agents.drain(..) {
            let name = agent.name().to_string();
            if let Err(err) = agent.shutdown().await {
                warn!("agent {} finished with error: {}", name, err);
            }
        }

        let _ = self.checker_shutdown.send(()).await;
        let _ = self.checker_handle.await;

        // The collector drains naturally once all report senders are gone.
        let _ = self.collector_handle.await;
        self.watcher_handle.abort();

        info!("harvest manager shut down");
    }
}

/// Move agent reports into the pool and track source completion
async fn collect_reports(
    mut report_rx: mpsc::Receiver<AgentMessage>,
    pool: Arc<ProxyPool>,
    hub: SignalHub,
    total_agents: usize,
) {
    let mut completed_sources = 0usize;
    let mut total_pages = 0u64;

    while let Some(message) = report_rx.recv().await {
        match message {
            AgentMessage::Parsed { source, candidates } => {
                for candidate in &candidates {
                    hub.emit(HarvestEvent::CandidateParsed {
                        source: source.clone(),
                        candidate: candidate.clone(),
                    });
                }
                let added = pool.extend(candidates).await;
                debug!("{}: {} candidates moved into the pool", source, added);
            }
            AgentMessage::Completed {
                source,
                pages_harvested,
            } => {
                info!("{} completed after {} pages", source, pages_harvested);
                total_pages += pages_harvested;
                completed_sources += 1;
                hub.emit(HarvestEvent::SourceCompleted {
                    source,
                    pages_harvested,
                });

                if total_agents > 0 && completed_sources == total_agents {
                    info!("all {} sources completed ({} pages)", total_agents, total_pages);
                    hub.emit(HarvestEvent::AllSourcesCompleted { total_pages });
                }
            }
        }
    }
}

/// Latch pool readiness off the first successful check
///
/// The ready signal fires at most once per process lifetime, no matter
/// how many entries become validated afterwards.
async fn watch_readiness(
    mut events: broadcast::Receiver<HarvestEvent>,
    hub: SignalHub,
    ready: Arc<AtomicBool>,
) {
    loop {
        match events.recv().await {
            Ok(HarvestEvent::ProxyChecked { candidate }) => {
                if candidate.status.is_checked() && !ready.swap(true, Ordering::SeqCst) {
                    info!("pool ready: first validated proxy is {}", candidate.address());
                    hub.emit(HarvestEvent::PoolReady);
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("readiness watcher lagged by {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::PageFetcher;
    use crate::app::models::{CheckStatus, PadInstruction, ProxyCandidate, ProxyProtocol};
    use crate::app::source::{ListSource, SourceConfig};
    use crate::errors::SourceResult;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::timeout;

    struct ScriptedFetcher {
        pages: Mutex<VecDeque<String>>,
    }

    impl ScriptedFetcher {
        fn new(pages: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into_iter().map(String::from).collect()),
            })
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch_page(&self, _url: &str) -> SourceResult<String> {
            Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    fn scripted_source_with_cooldown(name: &str, cooldown: Duration) -> Arc<dyn ProxySource> {
        let config = SourceConfig {
            name: name.to_string(),
            url_template: "https://proxies.example/{PAGENO}".to_string(),
            start_page: 1,
            pad: PadInstruction::default(),
            cooldown,
            protocol: ProxyProtocol::Http,
            valid_marker: Some("PROXY LIST".to_string()),
            row_selector: None,
        };
        Arc::new(ListSource::new(config).unwrap())
    }

    fn scripted_source(name: &str) -> Arc<dyn ProxySource> {
        scripted_source_with_cooldown(name, Duration::from_millis(1))
    }

    fn quiet_checker_config() -> CheckerConfig {
        // Long sweep interval after the first pass; probes hit loopback
        // ports with nothing listening and fail fast.
        CheckerConfig {
            sweep_interval: Duration::from_secs(3600),
            ..CheckerConfig::for_testing()
        }
    }

    fn test_manager(sources: Vec<Arc<dyn ProxySource>>, fetcher: Arc<dyn PageFetcher>) -> HarvestManager {
        HarvestManager::new(
            ManagerConfig::for_testing(),
            quiet_checker_config(),
            sources,
            fetcher,
        )
    }

    /// One source, one page of candidates, then exhaustion: candidates
    /// land in the pool and the aggregate completion signal fires.
    #[tokio::test]
    async fn test_harvest_flow_fills_pool() {
        let fetcher = ScriptedFetcher::new(vec![
            "PROXY LIST\n127.0.0.1:1\n127.0.0.1:2",
            "<html>no more pages</html>",
        ]);
        let source = scripted_source("alpha");
        let mut manager = test_manager(vec![source], fetcher);
        let mut events = manager.subscribe();

        manager.start().await;
        assert_eq!(manager.state(), ManagerState::Running);

        // Wait for the aggregate completion signal.
        let mut saw_source_completed = false;
        let mut total_pages = None;
        let deadline = Duration::from_secs(2);
        while total_pages.is_none() {
            match timeout(deadline, events.recv()).await.unwrap().unwrap() {
                HarvestEvent::SourceCompleted { source, pages_harvested } => {
                    assert_eq!(source, "alpha");
                    assert_eq!(pages_harvested, 1);
                    saw_source_completed = true;
                }
                HarvestEvent::AllSourcesCompleted { total_pages: pages } => {
                    total_pages = Some(pages);
                }
                _ => {}
            }
        }

        assert!(saw_source_completed);
        assert_eq!(total_pages, Some(1));
        assert!(manager.all_sources_completed());
        assert_eq!(manager.pool().len().await, 2);

        manager.shutdown().await;
    }

    /// Candidate-parsed signals fire once per candidate moved into the
    /// pool.
    #[tokio::test]
    async fn test_candidate_parsed_signals() {
        let fetcher = ScriptedFetcher::new(vec![
            "PROXY LIST\n127.0.0.1:1\n127.0.0.1:2\n127.0.0.1:3",
            "done",
        ]);
        let source = scripted_source("beta");
        let mut manager = test_manager(vec![source], fetcher);
        let mut events = manager.subscribe();

        manager.start().await;

        let mut parsed = 0;
        loop {
            match timeout(Duration::from_secs(2), events.recv())
                .await
                .unwrap()
                .unwrap()
            {
                HarvestEvent::CandidateParsed { source, .. } => {
                    assert_eq!(source, "beta");
                    parsed += 1;
                }
                HarvestEvent::AllSourcesCompleted { .. } => break,
                _ => {}
            }
        }
        assert_eq!(parsed, 3);

        manager.shutdown().await;
    }

    /// The ready latch flips on the first validated entry and the signal
    /// fires exactly once, no matter how many entries validate later.
    #[tokio::test]
    async fn test_pool_ready_fires_once() {
        let manager = test_manager(Vec::new(), ScriptedFetcher::new(Vec::new()));
        let mut events = manager.subscribe();
        assert!(!manager.is_ready());

        let mut first = ProxyCandidate::new("127.0.0.1", 1, ProxyProtocol::Http);
        first.mark_checked(Duration::from_millis(10));
        let mut second = ProxyCandidate::new("127.0.0.1", 2, ProxyProtocol::Http);
        second.mark_checked(Duration::from_millis(20));

        let hub = manager.hub();
        hub.emit(HarvestEvent::ProxyChecked { candidate: first });
        hub.emit(HarvestEvent::ProxyChecked { candidate: second });

        let mut ready_signals = 0;
        // Drain events until the stream is quiet.
        while let Ok(Ok(event)) = timeout(Duration::from_millis(200), events.recv()).await {
            if matches!(event, HarvestEvent::PoolReady) {
                ready_signals += 1;
            }
        }

        assert_eq!(ready_signals, 1);
        assert!(manager.is_ready());

        manager.shutdown().await;
    }

    /// A failed check must not flip the ready latch.
    #[tokio::test]
    async fn test_invalid_check_does_not_ready() {
        let manager = test_manager(Vec::new(), ScriptedFetcher::new(Vec::new()));
        let mut events = manager.subscribe();

        let mut candidate = ProxyCandidate::new("127.0.0.1", 1, ProxyProtocol::Http);
        candidate.mark_invalid();
        manager.hub().emit(HarvestEvent::ProxyChecked { candidate });

        let mut saw_ready = false;
        while let Ok(Ok(event)) = timeout(Duration::from_millis(100), events.recv()).await {
            if matches!(event, HarvestEvent::PoolReady) {
                saw_ready = true;
            }
        }
        assert!(!saw_ready);
        assert!(!manager.is_ready());

        manager.shutdown().await;
    }

    /// `get_one` delegates to the pool with both peek and pop semantics.
    #[tokio::test]
    async fn test_get_one_delegates_to_pool() {
        let manager = test_manager(Vec::new(), ScriptedFetcher::new(Vec::new()));

        assert!(manager.get_one(false).await.is_none());

        let mut candidate = ProxyCandidate::new("127.0.0.1", 1, ProxyProtocol::Http);
        candidate.mark_checked(Duration::from_millis(5));
        manager.pool().push(candidate).await;

        assert!(manager.get_one(false).await.is_some());
        assert!(manager.get_one(true).await.is_some());
        assert!(manager.get_one(false).await.is_none());

        manager.shutdown().await;
    }

    /// Stop suspends the agents without completing them.
    #[tokio::test]
    async fn test_stop_suspends_agents() {
        let fetcher = ScriptedFetcher::new(vec!["PROXY LIST\n127.0.0.1:1"]);
        // Long cool-down keeps the agent from exhausting its source
        // before the suspend lands.
        let source = scripted_source_with_cooldown("gamma", Duration::from_secs(30));
        let mut manager = test_manager(vec![source], fetcher);

        manager.start().await;
        manager.stop();
        assert_eq!(manager.state(), ManagerState::Suspended);
        assert!(!manager.all_sources_completed());

        manager.shutdown().await;
    }

    /// The proxy provider lends validated entries without popping them.
    #[tokio::test]
    async fn test_proxy_provider_and_invalidator() {
        let manager = test_manager(Vec::new(), ScriptedFetcher::new(Vec::new()));

        let mut candidate = ProxyCandidate::new("127.0.0.1", 1, ProxyProtocol::Http);
        candidate.mark_checked(Duration::from_millis(5));
        let id = candidate.id;
        manager.pool().push(candidate).await;

        let provider = manager.proxy_provider();
        let lent = provider().await.unwrap();
        assert_eq!(lent.id, id);
        assert_eq!(manager.pool().len().await, 1);

        let invalidator = manager.proxy_invalidator();
        invalidator(id).await;
        let snapshot = manager.pool().snapshot().await;
        assert_eq!(snapshot[0].status, CheckStatus::CheckedInvalid);

        manager.shutdown().await;
    }
}
