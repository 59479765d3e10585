use thiserror::Error;

use crate::browser::BrowserError;

/// Failures of one crawl cycle.
///
/// Everything except the per-reference variants aborts the current cycle;
/// the scheduler tries again after the polling interval.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("credentials unavailable for provider '{provider}': {reason}")]
    CredentialsUnavailable { provider: String, reason: String },

    #[error("could not open browsing context: {0}")]
    BrowserLaunch(#[source] BrowserError),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("listing page {page} could not be loaded: {source}")]
    ListingNavigation {
        page: u32,
        #[source]
        source: BrowserError,
    },

    #[error("detail page for {reference} could not be loaded: {source}")]
    DetailNavigation {
        reference: String,
        #[source]
        source: BrowserError,
    },

    #[error("no candidate document of {reference} yielded a record")]
    ExtractionMiss { reference: String },

    #[error("record {reference} could not be stored: {message}")]
    Store { reference: String, message: String },
}

impl CrawlError {
    /// Whether the error only concerns a single reference.
    pub fn is_per_reference(&self) -> bool {
        matches!(
            self,
            CrawlError::DetailNavigation { .. }
                | CrawlError::ExtractionMiss { .. }
                | CrawlError::Store { .. }
        )
    }
}
