//! Browsing-context capability consumed by the crawler.
//!
//! The crawler never talks to a rendering engine directly. It drives a
//! [`BrowsingContext`] (navigate, fill, click, wait, read documents) and asks a
//! [`Launcher`] for a fresh one at the start of every cycle.

pub mod http;

#[cfg(test)]
pub mod fake;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("navigation to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("invalid url '{0}'")]
    InvalidUrl(String),

    #[error("no page loaded")]
    NoPage,
}

impl BrowserError {
    /// Timeouts, rate limits and server errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            BrowserError::Timeout { .. } => true,
            BrowserError::Status { status, .. } => *status == 429 || *status >= 500,
            BrowserError::Request { .. } => true,
            BrowserError::InvalidUrl(_) | BrowserError::NoPage => false,
        }
    }
}

/// One rendered document: the page itself or one of its embedded frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDocument {
    pub url: String,
    pub html: String,
}

impl CandidateDocument {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

#[async_trait]
pub trait BrowsingContext: Send {
    /// Load `url` as the current page.
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Set `value` on the first element matching any of `selectors`, in
    /// order, and notify the page of the change. Returns `false` when
    /// nothing matched.
    async fn fill(&mut self, selectors: &[&str], value: &str) -> Result<bool, BrowserError>;

    /// Activate the first element matching any of `selectors`.
    async fn click(&mut self, selectors: &[&str]) -> Result<bool, BrowserError>;

    /// The current page followed by its embedded frames in document order.
    async fn documents(&mut self) -> Result<Vec<CandidateDocument>, BrowserError>;

    /// Give the page time to settle after an action with no completion signal.
    async fn settle(&mut self, duration: Duration);

    /// Release the context. Called exactly once, whatever the cycle outcome.
    async fn close(&mut self);
}

#[async_trait]
pub trait Launcher: Send + Sync {
    type Context: BrowsingContext;

    async fn launch(&self) -> Result<Self::Context, BrowserError>;
}
