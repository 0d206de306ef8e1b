//! Core data structures for the harvesting pipeline
//!
//! Defines the proxy candidate record shared by agents, the checker and
//! the aggregator, plus the page-cursor formatting rules and the fetch
//! targets consumed by the content generator.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::pages;
use crate::errors::{SourceError, SourceResult};

/// Protocol a proxy endpoint claims to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyProtocol {
    /// URL scheme used when mapping the candidate to a client proxy
    pub fn scheme(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks4 => "socks4",
            ProxyProtocol::Socks5 => "socks5",
        }
    }
}

impl fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scheme())
    }
}

/// Proxy authentication credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

impl ProxyAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Validation state of a pool entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CheckStatus {
    /// Never probed
    #[default]
    NotChecked,
    /// A probe is in flight
    Checking,
    /// Last probe succeeded
    Checked,
    /// Last probe failed
    CheckedInvalid,
}

impl CheckStatus {
    pub fn is_checked(&self) -> bool {
        matches!(self, CheckStatus::Checked)
    }

    pub fn is_checking(&self) -> bool {
        matches!(self, CheckStatus::Checking)
    }
}

/// A proxy endpoint extracted from a listing page
///
/// Candidates are created by harvesting agents, appended to the shared
/// pool, and mutated in place by the validation checker. Entries are never
/// destroyed implicitly; they persist until popped or cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCandidate {
    /// Generated unique identity, stable across status updates
    pub id: Uuid,
    pub host: String,
    pub port: u16,
    pub auth: Option<ProxyAuth>,
    pub protocol: ProxyProtocol,
    /// When the checker last finished a probe, pass or fail
    pub last_checked: Option<DateTime<Utc>>,
    /// Measured probe latency; zero until a probe succeeds
    pub latency: Duration,
    pub status: CheckStatus,
}

impl ProxyCandidate {
    /// Create a new unchecked candidate without credentials
    pub fn new(host: impl Into<String>, port: u16, protocol: ProxyProtocol) -> Self {
        Self {
            id: Uuid::new_v4(),
            host: host.into(),
            port,
            auth: None,
            protocol,
            last_checked: None,
            latency: Duration::ZERO,
            status: CheckStatus::NotChecked,
        }
    }

    /// Create a new unchecked candidate with credentials
    pub fn with_auth(
        host: impl Into<String>,
        port: u16,
        protocol: ProxyProtocol,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let mut candidate = Self::new(host, port, protocol);
        candidate.auth = Some(ProxyAuth::new(username, password));
        candidate
    }

    /// Network address in `host:port` form
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full proxy URL with scheme, suitable for client configuration
    pub fn proxy_url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }

    /// Record the start of a probe
    pub fn mark_checking(&mut self) {
        self.status = CheckStatus::Checking;
    }

    /// Record a successful probe
    pub fn mark_checked(&mut self, latency: Duration) {
        self.status = CheckStatus::Checked;
        self.latency = latency;
        self.last_checked = Some(Utc::now());
    }

    /// Record a failed probe; latency is reset to zero
    pub fn mark_invalid(&mut self) {
        self.status = CheckStatus::CheckedInvalid;
        self.latency = Duration::ZERO;
        self.last_checked = Some(Utc::now());
    }
}

impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.proxy_url())
    }
}

/// Pad direction for formatted page numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PadDirection {
    #[default]
    Left,
    Right,
}

/// Formatting rule for substituting page numbers into URL templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadInstruction {
    /// Total formatted width
    pub width: usize,
    /// Fill character
    pub fill: char,
    pub direction: PadDirection,
}

impl Default for PadInstruction {
    fn default() -> Self {
        Self {
            width: pages::DEFAULT_PAD_WIDTH,
            fill: pages::DEFAULT_PAD_FILL,
            direction: PadDirection::Left,
        }
    }
}

impl PadInstruction {
    /// Format a page number to the configured width
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::PadLengthExceeded`] when the decimal
    /// representation is wider than the pad width. Truncating would
    /// silently fetch the wrong page, so this is a hard error.
    pub fn format(&self, page: u64) -> SourceResult<String> {
        let digits = page.to_string();
        if digits.len() > self.width {
            return Err(SourceError::PadLengthExceeded {
                page,
                width: self.width,
            });
        }

        let padding: String = std::iter::repeat(self.fill)
            .take(self.width - digits.len())
            .collect();
        Ok(match self.direction {
            PadDirection::Left => format!("{}{}", padding, digits),
            PadDirection::Right => format!("{}{}", digits, padding),
        })
    }
}

/// Per-agent page position plus its formatting rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    page: u64,
    pad: PadInstruction,
}

impl PageCursor {
    pub fn new(start_page: u64, pad: PadInstruction) -> Self {
        Self {
            page: start_page,
            pad,
        }
    }

    /// Current page number
    pub fn page(&self) -> u64 {
        self.page
    }

    /// Move to the next page
    pub fn advance(&mut self) {
        self.page += 1;
    }

    /// Substitute the formatted page number into a URL template
    ///
    /// The template must contain the literal page placeholder; callers
    /// validate that at construction time.
    pub fn format_url(&self, template: &str) -> SourceResult<String> {
        let formatted = self.pad.format(self.page)?;
        Ok(template.replace(pages::PLACEHOLDER, &formatted))
    }
}

/// A queued fetch request for the content generator
///
/// Lifecycle: created by a caller, queued, dequeued exactly once per
/// attempt by the generator loop, removed on success or re-queued on a
/// proxy-attributable failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    /// Generated identity so signal consumers can correlate attempts
    pub id: Uuid,
    pub url: String,
    /// Response body, populated on a successful fetch
    pub content: Option<String>,
    /// Set when the target responded but the page is unusable
    pub invalid_page: bool,
}

impl FetchTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            content: None,
            invalid_page: false,
        }
    }
}
