//! Transport seam between the fetcher and the HTTP stack.
//!
//! The fetcher only needs "GET this URL with the current cookies" and "give
//! me a fresh, cookie-seeded session". Keeping that behind two small traits
//! lets tests script status codes and transport failures without a network.

use thiserror::Error;

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Request-level failures, split the way the retry policy treats them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("connection error: {0}")]
    Connect(String),

    #[error("request error: {0}")]
    Other(String),
}

/// A stateful HTTP session (cookie jar + default headers).
pub trait HttpSession {
    fn get(&mut self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// Creates sessions. Opening a session is where cookies get seeded.
pub trait SessionFactory {
    type Session: HttpSession;

    /// Human-readable label for log lines.
    fn label(&self) -> &str;

    fn open(&self) -> Result<Self::Session, TransportError>;
}
