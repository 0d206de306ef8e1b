//! Pool validation checker
//!
//! An independent repeating worker that sweeps the shared pool, probes
//! every due candidate by fetching a low-cost reference URL through it,
//! and writes the outcome back in place. Probe failures of any kind are
//! contained here: the checker demotes the candidate and moves on, it
//! never lets an error escape its own loop.

use std::time::{Duration, Instant};

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::app::events::{HarvestEvent, SignalHub};
use crate::app::models::ProxyCandidate;
use crate::app::pool::{CheckOutcome, ProxyPool};
use crate::constants::checker;
use crate::errors::{CheckError, CheckResult};

/// Configuration for the validation checker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Number of parallel probe slots
    pub parallelism: usize,
    /// Low-cost reference URL fetched through each candidate
    pub probe_url: String,
    /// Per-probe timeout
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    /// Delay between consecutive pool sweeps
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Age after which a checked candidate becomes due again
    #[serde(with = "humantime_serde")]
    pub recheck_interval: Duration,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            parallelism: checker::DEFAULT_PARALLELISM,
            probe_url: checker::PROBE_URL.to_string(),
            probe_timeout: checker::PROBE_TIMEOUT,
            sweep_interval: checker::SWEEP_INTERVAL,
            recheck_interval: checker::RECHECK_INTERVAL,
        }
    }
}

impl CheckerConfig {
    /// Configuration tuned for fast tests
    pub fn for_testing() -> Self {
        Self {
            parallelism: 2,
            probe_url: "http://probe.invalid/".to_string(),
            probe_timeout: Duration::from_millis(500),
            sweep_interval: Duration::from_millis(10),
            recheck_interval: Duration::from_secs(600),
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.parallelism == 0 {
            return Err("parallelism must be greater than 0".to_string());
        }
        if self.probe_url.is_empty() {
            return Err("probe_url must not be empty".to_string());
        }
        Ok(())
    }
}

/// Repeating pool-sweep worker
pub struct PoolChecker {
    config: CheckerConfig,
    pool: Arc<ProxyPool>,
    hub: SignalHub,
    shutdown_rx: mpsc::Receiver<()>,
}

impl PoolChecker {
    pub fn new(
        config: CheckerConfig,
        pool: Arc<ProxyPool>,
        hub: SignalHub,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            config,
            pool,
            hub,
            shutdown_rx,
        }
    }

    /// Run sweeps until a shutdown signal arrives
    pub async fn run(mut self) {
        info!(
            "checker starting with {} probe slots against {}",
            self.config.parallelism, self.config.probe_url
        );

        loop {
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(mpsc::error::TryRecvError::Disconnected) => break,
                Err(mpsc::error::TryRecvError::Empty) => {}
            }

            let (swept, valid, invalid) = self.sweep().await;
            if swept > 0 {
                debug!(
                    "sweep finished: {} probed, {} valid, {} invalid",
                    swept, valid, invalid
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.sweep_interval) => {}
                _ = self.shutdown_rx.recv() => break,
            }
        }

        info!("checker shutting down");
    }

    /// Probe every due candidate once and write the outcomes back
    ///
    /// Returns `(swept, valid, invalid)` counts for the batch signal.
    async fn sweep(&self) -> (usize, usize, usize) {
        let due = self.pool.begin_checks(self.config.recheck_interval).await;
        if due.is_empty() {
            return (0, 0, 0);
        }
        debug!("sweeping {} due candidates", due.len());

        let outcomes: Vec<(ProxyCandidate, CheckOutcome)> = stream::iter(due)
            .map(|candidate| async move {
                let outcome = self.probe(&candidate).await;
                (candidate, outcome)
            })
            .buffer_unordered(self.config.parallelism)
            .collect()
            .await;

        let swept = outcomes.len();
        let mut valid = 0;
        let mut invalid = 0;

        for (mut candidate, outcome) in outcomes {
            self.pool.apply_outcome(candidate.id, &outcome).await;

            // The emitted snapshot mirrors the pool entry after the write.
            match &outcome {
                CheckOutcome::Valid { latency } => {
                    valid += 1;
                    candidate.mark_checked(*latency);
                }
                CheckOutcome::Invalid { reason } => {
                    invalid += 1;
                    debug!("probe failed for {}: {}", candidate.address(), reason);
                    candidate.mark_invalid();
                }
            }
            self.hub.emit(HarvestEvent::ProxyChecked { candidate });
        }

        self.hub.emit(HarvestEvent::BatchChecked {
            swept,
            valid,
            invalid,
        });
        (swept, valid, invalid)
    }

    /// Probe one candidate; all failures collapse into `Invalid`
    async fn probe(&self, candidate: &ProxyCandidate) -> CheckOutcome {
        let started = Instant::now();
        match self.try_probe(candidate).await {
            Ok(()) => CheckOutcome::Valid {
                latency: started.elapsed(),
            },
            Err(err) => CheckOutcome::Invalid {
                reason: err.to_string(),
            },
        }
    }

    async fn try_probe(&self, candidate: &ProxyCandidate) -> CheckResult<()> {
        let client = self.build_probe_client(candidate)?;

        let response = tokio::time::timeout(
            self.config.probe_timeout,
            client.get(&self.config.probe_url).send(),
        )
        .await
        .map_err(|_| CheckError::Timeout {
            seconds: self.config.probe_timeout.as_secs(),
        })?
        .map_err(CheckError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CheckError::BadStatus {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// Map the candidate onto a native client proxy configuration
    fn build_probe_client(&self, candidate: &ProxyCandidate) -> CheckResult<Client> {
        let mut proxy =
            reqwest::Proxy::all(candidate.proxy_url()).map_err(CheckError::ClientBuild)?;
        if let Some(auth) = &candidate.auth {
            proxy = proxy.basic_auth(&auth.username, &auth.password);
        }

        Client::builder()
            .proxy(proxy)
            .timeout(self.config.probe_timeout)
            .build()
            .map_err(CheckError::ClientBuild)
    }
}
