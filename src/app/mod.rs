//! Core pipeline components
//!
//! The harvesting pipeline, leaf-first: data model, signal hub, shared
//! pool, page client, sources, agents, checker, generator, and the
//! manager wiring them together.
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
//! let fetcher = Arc::new(PageClient::new(config.client.clone())?);
//!
//! let mut sources: Vec<Arc<dyn ProxySource>> = Vec::new();
//! for source_config in &config.sources {
//!     sources.push(Arc::new(ListSource::new(source_config.clone())?));
//! }
//!
//! let mut manager = HarvestManager::new(
//!     config.manager.clone(),
//!     config.checker.clone(),
//!     sources,
//!     fetcher,
//! );
//! manager.start().await;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod checker;
pub mod client;
pub mod events;
pub mod generator;
pub mod manager;
pub mod models;
pub mod pool;
pub mod source;

// Re-export main public API
pub use agent::{AgentHandle, AgentMessage, AgentStatus, HarvestAgent};
pub use checker::{CheckerConfig, PoolChecker};
pub use client::{ClientConfig, PageClient, PageFetcher};
pub use events::{CancelGuard, HarvestEvent, SignalHub, StartingHook};
pub use generator::{
    ContentGenerator, FetchQueue, GeneratorConfig, ProxyInvalidator, ProxyProvider,
};
pub use manager::{HarvestManager, ManagerConfig, ManagerState};
pub use models::{
    CheckStatus, FetchTarget, PadDirection, PadInstruction, PageCursor, ProxyAuth,
    ProxyCandidate, ProxyProtocol,
};
pub use pool::{CheckOutcome, PoolStats, ProxyPool};
pub use source::{parse_candidate_line, ListSource, ProxySource, SourceConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        // Ensure public API is accessible
        let config = ClientConfig::default();
        assert!(config.rate_limit_rps > 0);
    }
}
