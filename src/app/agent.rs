//! Harvesting agent state machine
//!
//! One agent per configured source. Each agent runs as an independent
//! background task driving the state cycle
//! `Idle → Reading → Parsing → Parsed → Idle`, with `Completed` as the
//! terminal state once the source's validity predicate rejects a page.
//! Agents never return values directly: candidates and completion are
//! reported to the aggregator over a channel, and the aggregator turns
//! them into pool entries and signals.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::client::PageFetcher;
use crate::app::models::{PageCursor, ProxyCandidate};
use crate::app::source::ProxySource;
use crate::errors::{SourceError, SourceResult};

/// Lifecycle state of a harvesting agent; exactly one value is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    /// Waiting for the next scheduling tick
    Idle,
    /// Fetching the current listing page
    Reading,
    /// Extracting candidates from a valid page
    Parsing,
    /// Page fully processed; cooling down before the next one
    Parsed,
    /// Source exhausted or fatally misconfigured; terminal
    Completed,
}

/// Control verbs accepted between ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentCommand {
    Run,
    Suspend,
    Stop,
}

/// Reports sent from agents to the aggregator
#[derive(Debug, Clone)]
pub enum AgentMessage {
    /// Candidates parsed from one page (the agent's buffer, handed off)
    Parsed {
        source: String,
        candidates: Vec<ProxyCandidate>,
    },
    /// The source is done; carries how many pages it yielded
    Completed {
        source: String,
        pages_harvested: u64,
    },
}

/// Result of one scheduling tick
enum TickOutcome {
    /// Page harvested; number of candidates found (zero is fine)
    Parsed(usize),
    /// Validity predicate rejected the page; the source is finished
    SourceExhausted,
}

/// One background harvesting worker bound to a single source
pub struct HarvestAgent {
    source: Arc<dyn ProxySource>,
    fetcher: Arc<dyn PageFetcher>,
    cursor: PageCursor,
    /// Transient per-page buffer, drained into each report
    buffer: Vec<ProxyCandidate>,
    pages_harvested: u64,
    report_tx: mpsc::Sender<AgentMessage>,
    command_rx: watch::Receiver<AgentCommand>,
    status_tx: watch::Sender<AgentStatus>,
}

impl HarvestAgent {
    /// Spawn an agent task for the given source
    ///
    /// The agent starts suspended; call [`AgentHandle::resume`] to begin
    /// harvesting.
    pub fn spawn(
        source: Arc<dyn ProxySource>,
        fetcher: Arc<dyn PageFetcher>,
        report_tx: mpsc::Sender<AgentMessage>,
    ) -> AgentHandle {
        let (command_tx, command_rx) = watch::channel(AgentCommand::Suspend);
        let (status_tx, status_rx) = watch::channel(AgentStatus::Idle);
        let name = source.name().to_string();
        let cursor = PageCursor::new(source.start_page(), source.pad());

        let agent = Self {
            source,
            fetcher,
            cursor,
            buffer: Vec::new(),
            pages_harvested: 0,
            report_tx,
            command_rx,
            status_tx,
        };
        let join = tokio::spawn(agent.run());

        AgentHandle {
            name,
            command_tx,
            status_rx,
            join,
        }
    }

    /// Main agent loop; runs until stopped or the source completes
    async fn run(mut self) -> SourceResult<()> {
        info!(
            "agent {} starting at page {}",
            self.source.name(),
            self.cursor.page()
        );

        loop {
            // Copy the command out so no borrow is held across an await.
            let command = *self.command_rx.borrow();
            match command {
                AgentCommand::Stop => break,
                AgentCommand::Suspend => {
                    if self.command_rx.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                AgentCommand::Run => {}
            }

            match self.tick().await {
                Ok(TickOutcome::Parsed(count)) => {
                    debug!(
                        "agent {} harvested page {} ({} candidates)",
                        self.source.name(),
                        self.cursor.page() - 1,
                        count
                    );
                    self.cooldown_pause().await;
                    self.set_status(AgentStatus::Idle);
                }
                Ok(TickOutcome::SourceExhausted) => {
                    info!(
                        "agent {} completed after {} pages",
                        self.source.name(),
                        self.pages_harvested
                    );
                    return Ok(());
                }
                Err(err) if is_contract_error(&err) => {
                    // Contract violations are fatal for the agent but must
                    // not corrupt aggregate bookkeeping.
                    warn!("agent {} aborting: {}", self.source.name(), err);
                    self.complete().await;
                    return Err(err);
                }
                Err(err) => {
                    // Transient fetch failure: keep the cursor, try the
                    // same page again after the cool-down.
                    warn!(
                        "agent {} page {} fetch failed: {}",
                        self.source.name(),
                        self.cursor.page(),
                        err
                    );
                    self.set_status(AgentStatus::Idle);
                    self.cooldown_pause().await;
                }
            }
        }

        Ok(())
    }

    /// Process the current page: fetch, validate, extract, hand off
    async fn tick(&mut self) -> SourceResult<TickOutcome> {
        self.set_status(AgentStatus::Reading);
        let url = self.cursor.format_url(self.source.url_template())?;
        let body = self.fetcher.fetch_page(&url).await?;

        if !self.source.page_is_valid(&body) {
            self.complete().await;
            return Ok(TickOutcome::SourceExhausted);
        }

        self.set_status(AgentStatus::Parsing);
        let mut found = self.source.extract(&body);
        let count = found.len();
        self.buffer.append(&mut found);
        self.pages_harvested += 1;

        // One-way hand-off: the buffer moves to the aggregator and is
        // cleared here, so no candidate can be counted twice.
        let batch = std::mem::take(&mut self.buffer);
        if !batch.is_empty() {
            let _ = self
                .report_tx
                .send(AgentMessage::Parsed {
                    source: self.source.name().to_string(),
                    candidates: batch,
                })
                .await;
        }

        self.set_status(AgentStatus::Parsed);
        self.cursor.advance();
        Ok(TickOutcome::Parsed(count))
    }

    /// Enter the terminal state and notify the aggregator
    async fn complete(&mut self) {
        self.set_status(AgentStatus::Completed);
        let _ = self
            .report_tx
            .send(AgentMessage::Completed {
                source: self.source.name().to_string(),
                pages_harvested: self.pages_harvested,
            })
            .await;
    }

    /// Wait out the inter-page cool-down, staying responsive to commands
    async fn cooldown_pause(&mut self) {
        let sleep = tokio::time::sleep(self.source.cooldown());
        tokio::pin!(sleep);
        tokio::select! {
            _ = &mut sleep => {}
            _ = self.command_rx.changed() => {}
        }
    }

    fn set_status(&self, status: AgentStatus) {
        let _ = self.status_tx.send(status);
    }
}

fn is_contract_error(err: &SourceError) -> bool {
    matches!(
        err,
        SourceError::PadLengthExceeded { .. }
            | SourceError::MissingPlaceholder { .. }
            | SourceError::InvalidSelector { .. }
    )
}

/// Control handle for a spawned agent
pub struct AgentHandle {
    name: String,
    command_tx: watch::Sender<AgentCommand>,
    status_rx: watch::Receiver<AgentStatus>,
    join: JoinHandle<SourceResult<()>>,
}

impl AgentHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state
    pub fn status(&self) -> AgentStatus {
        *self.status_rx.borrow()
    }

    pub fn is_completed(&self) -> bool {
        self.status() == AgentStatus::Completed
    }

    /// Start or unpause the agent's scheduling loop
    pub fn resume(&self) {
        let _ = self.command_tx.send(AgentCommand::Run);
    }

    /// Pause after the in-flight page finishes (cooperative)
    pub fn suspend(&self) {
        let _ = self.command_tx.send(AgentCommand::Suspend);
    }

    /// Terminate the agent and wait for its task to finish
    pub async fn shutdown(self) -> SourceResult<()> {
        let _ = self.command_tx.send(AgentCommand::Stop);
        match self.join.await {
            Ok(result) => result,
            Err(err) => {
                warn!("agent {} task panicked: {}", self.name, err);
                Ok(())
            }
        }
    }
}
