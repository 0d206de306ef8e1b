//! Application constants for the proxy harvester
//!
//! Centralizes tunables used throughout the application, organized by
//! functional domain.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for listing-page requests
    pub const USER_AGENT: &str = "ProxyHarvester/0.1.0";

    /// User agents rotated by the content generator
    pub const USER_AGENTS: &[&str] = &[
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ];

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default rate limit for listing-page requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 2;
}

/// Retry configuration
pub mod limits {
    use super::Duration;

    /// Maximum retry attempts for a listing-page fetch
    pub const PAGE_FETCH_RETRIES: usize = 3;

    /// Fixed delay between listing-page retry attempts
    pub const PAGE_FETCH_RETRY_DELAY: Duration = Duration::from_secs(2);

    /// Backoff table for long-running recovery loops
    pub const INCREASING_DELAYS: [Duration; 5] = [
        Duration::from_secs(2),
        Duration::from_secs(30),
        Duration::from_secs(120),
        Duration::from_secs(600),
        Duration::from_secs(1800),
    ];
}

/// Paginated source defaults
pub mod pages {
    use super::Duration;

    /// Placeholder substituted with the formatted page number
    pub const PLACEHOLDER: &str = "{PAGENO}";

    /// Default first page number
    pub const START_PAGE: u64 = 1;

    /// Default pad width for formatted page numbers
    pub const DEFAULT_PAD_WIDTH: usize = 4;

    /// Default pad fill character
    pub const DEFAULT_PAD_FILL: char = '0';

    /// Default cool-down between consecutive pages of one source
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);
}

/// Validation checker defaults
pub mod checker {
    use super::Duration;

    /// Default number of parallel probe slots
    pub const DEFAULT_PARALLELISM: usize = 8;

    /// Low-cost reference URL fetched through each candidate
    pub const PROBE_URL: &str = "http://httpbin.org/ip";

    /// Per-probe timeout
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Delay between consecutive pool sweeps
    pub const SWEEP_INTERVAL: Duration = Duration::from_secs(15);

    /// Age after which a checked candidate becomes due again
    pub const RECHECK_INTERVAL: Duration = Duration::from_secs(600);
}

/// Content generator defaults
pub mod generator {
    use super::Duration;

    /// Poll interval when the fetch queue is empty
    pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Timeout for a single target fetch
    pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Aggregator and orchestration constants
pub mod manager {
    use super::Duration;

    /// Delay between starting consecutive agents
    pub const STAGGER_DELAY: Duration = Duration::from_millis(500);

    /// Capacity of the agent report channel
    pub const REPORT_CHANNEL_CAPACITY: usize = 64;

    /// Capacity of the broadcast signal hub
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

// Re-export commonly used constants for convenience
pub use checker::{DEFAULT_PARALLELISM, PROBE_URL};
pub use http::{DEFAULT_TIMEOUT as HTTP_TIMEOUT, USER_AGENT};
pub use pages::PLACEHOLDER as PAGE_PLACEHOLDER;
