//! Resilient fetcher: bounded retry with linear backoff, session refresh and
//! magic-byte validation.
//!
//! Status handling per attempt:
//! - 200 → body, unless expected magic bytes are missing (an HTML error page
//!   served with 200), which fails immediately without retry
//! - 403 → treated as an expired session: open a fresh session, retry
//! - 404 → the file is not published for that date: `NotFound`, no retry
//! - anything else → log and retry
//!
//! Timeouts are retried on the same session; connection errors get a fresh
//! session first. Every `session_refresh_every` fetches the session is
//! replaced regardless, to stay ahead of server-side expiry.

use super::transport::{HttpSession, SessionFactory, TransportError};
use std::time::Duration;
use thiserror::Error;

/// Retry and pacing knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per URL (including the first).
    pub max_attempts: u32,
    /// Backoff unit: the wait after attempt `n` is `base_delay * n`.
    pub base_delay: Duration,
    /// Replace the session after this many fetches (0 disables).
    pub session_refresh_every: u32,
    /// Pause between consecutive fetches.
    pub request_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(5),
            session_refresh_every: 20,
            request_pause: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Wait after a failed attempt (1-based): 5s, 10s, 15s with the defaults.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// No sleeping at all. For tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            session_refresh_every: 0,
            request_pause: Duration::ZERO,
        }
    }
}

/// Why a fetch produced no bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("not published (HTTP 404): {url}")]
    NotFound { url: String },

    #[error("unexpected content from {url}: missing expected magic bytes")]
    UnexpectedContent { url: String },

    #[error("gave up on {url} after {attempts} attempts (last: {last})")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
}

impl FetchError {
    /// True when the resource is legitimately absent rather than unreachable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// URL → bytes. The collection loop depends on this rather than on HTTP, so
/// it can be driven by fakes in tests.
pub trait Fetch {
    fn fetch(&mut self, url: &str, magic: Option<&[u8]>) -> Result<Vec<u8>, FetchError>;
}

/// The production [`Fetch`] implementation.
pub struct ResilientFetcher<F: SessionFactory> {
    factory: F,
    session: F::Session,
    policy: RetryPolicy,
    downloads: u32,
    refreshes: u32,
    requests: u64,
}

impl<F: SessionFactory> ResilientFetcher<F> {
    /// Opens (and seeds) the first session.
    pub fn new(factory: F, policy: RetryPolicy) -> Result<Self, TransportError> {
        let session = factory.open()?;
        Ok(Self {
            factory,
            session,
            policy,
            downloads: 0,
            refreshes: 0,
            requests: 0,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Number of sessions replaced since construction.
    pub fn refresh_count(&self) -> u32 {
        self.refreshes
    }

    /// Number of HTTP requests issued (every attempt counts).
    pub fn request_count(&self) -> u64 {
        self.requests
    }

    fn label(&self) -> &str {
        self.factory.label()
    }

    fn refresh_session(&mut self, reason: &str) {
        tracing::info!(source = %self.label(), reason, "refreshing session");
        match self.factory.open() {
            Ok(session) => {
                self.session = session;
                self.refreshes += 1;
            }
            Err(e) => {
                tracing::warn!(source = %self.label(), error = %e, "session refresh failed, keeping current session")
            }
        }
    }

    fn maybe_refresh(&mut self) {
        if self.policy.session_refresh_every == 0 {
            return;
        }
        self.downloads += 1;
        if self.downloads >= self.policy.session_refresh_every {
            self.refresh_session("periodic");
            self.downloads = 0;
        }
    }

    fn pause(duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

impl<F: SessionFactory> Fetch for ResilientFetcher<F> {
    fn fetch(&mut self, url: &str, magic: Option<&[u8]>) -> Result<Vec<u8>, FetchError> {
        self.maybe_refresh();
        if self.requests > 0 {
            Self::pause(self.policy.request_pause);
        }

        let max = self.policy.max_attempts.max(1);
        let mut last = String::from("no attempt made");

        for attempt in 1..=max {
            tracing::debug!(source = %self.label(), url, attempt, max, "GET");
            self.requests += 1;

            match self.session.get(url) {
                Ok(resp) if resp.status == 200 => {
                    if let Some(magic) = magic {
                        if !resp.body.starts_with(magic) {
                            tracing::warn!(source = %self.label(), url, "unexpected content");
                            return Err(FetchError::UnexpectedContent { url: url.into() });
                        }
                    }
                    tracing::info!(source = %self.label(), url, bytes = resp.body.len(), "downloaded");
                    return Ok(resp.body);
                }
                Ok(resp) if resp.status == 403 => {
                    tracing::warn!(source = %self.label(), url, attempt, "HTTP 403");
                    last = "HTTP 403".into();
                    if attempt < max {
                        self.refresh_session("HTTP 403");
                    }
                }
                Ok(resp) if resp.status == 404 => {
                    tracing::debug!(source = %self.label(), url, "HTTP 404, not published yet");
                    return Err(FetchError::NotFound { url: url.into() });
                }
                Ok(resp) => {
                    tracing::warn!(source = %self.label(), url, attempt, status = resp.status, "unexpected status");
                    last = format!("HTTP {}", resp.status);
                }
                Err(TransportError::Timeout(msg)) => {
                    tracing::warn!(source = %self.label(), url, attempt, "timeout");
                    last = format!("timeout: {msg}");
                }
                Err(TransportError::Connect(msg)) => {
                    tracing::warn!(source = %self.label(), url, attempt, error = %msg, "connection error");
                    last = format!("connection error: {msg}");
                    if attempt < max {
                        self.refresh_session("connection error");
                    }
                }
                Err(TransportError::Other(msg)) => {
                    tracing::error!(source = %self.label(), url, error = %msg, "request failed");
                    return Err(FetchError::Transport {
                        url: url.into(),
                        reason: msg,
                    });
                }
            }

            if attempt < max {
                let wait = self.policy.backoff(attempt);
                tracing::info!(source = %self.label(), wait_secs = wait.as_secs_f64(), "retrying");
                Self::pause(wait);
            }
        }

        Err(FetchError::RetriesExhausted {
            url: url.into(),
            attempts: max,
            last,
        })
    }
}
