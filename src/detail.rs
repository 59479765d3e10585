use std::time::Duration;

use tracing::{debug, warn};

use crate::browser::{BrowserError, BrowsingContext, CandidateDocument};
use crate::config::{CrawlSettings, PortalConfig};
use crate::error::CrawlError;

/// Loads a case's detail page and hands back every candidate document.
pub struct DetailFetcher {
    portal: PortalConfig,
    timeout: Duration,
    settle: Duration,
    max_retries: u32,
    base_backoff: Duration,
}

impl DetailFetcher {
    pub fn new(portal: PortalConfig, settings: &CrawlSettings) -> Self {
        Self {
            portal,
            timeout: settings.navigation_timeout,
            settle: settings.detail_settle,
            max_retries: settings.detail_retries,
            base_backoff: settings.retry_backoff,
        }
    }

    pub async fn fetch<B: BrowsingContext + ?Sized>(
        &self,
        ctx: &mut B,
        reference: &str,
    ) -> Result<Vec<CandidateDocument>, CrawlError> {
        let url = self.portal.detail_url(reference);
        let mut attempt = 0;
        loop {
            match self.fetch_once(ctx, &url).await {
                Ok(documents) => {
                    debug!(reference, documents = documents.len(), "Detail loaded");
                    return Ok(documents);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let backoff = self.base_backoff * 2u32.pow(attempt);
                    warn!(
                        reference,
                        error = %e,
                        "Detail attempt {}/{} failed, backing off {:.1}s",
                        attempt + 1,
                        self.max_retries + 1,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(CrawlError::DetailNavigation {
                        reference: reference.to_string(),
                        source,
                    })
                }
            }
        }
    }

    async fn fetch_once<B: BrowsingContext + ?Sized>(
        &self,
        ctx: &mut B,
        url: &str,
    ) -> Result<Vec<CandidateDocument>, BrowserError> {
        tokio::time::timeout(self.timeout, ctx.goto(url))
            .await
            .map_err(|_| BrowserError::Timeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            })??;
        ctx.settle(self.settle).await;
        ctx.documents().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::FakePortal;

    const BASE: &str = "https://portal.example/w3multi";

    fn fetcher() -> DetailFetcher {
        DetailFetcher::new(PortalConfig::new(BASE), &CrawlSettings::default())
    }

    fn detail(reference: &str) -> String {
        format!("{BASE}/repasos1.php?reparacion={reference}")
    }

    #[tokio::test(start_paused = true)]
    async fn returns_page_and_frames_in_order() {
        let portal = FakePortal::new().page(&detail("77"), &["<frameset></frameset>", "<p>datos</p>"]);
        let mut ctx = portal.context();

        let docs = fetcher().fetch(&mut ctx, "77").await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].html, "<p>datos</p>");
        assert_eq!(portal.state().settled, Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried() {
        let portal = FakePortal::new()
            .page(&detail("77"), &["<p>ok</p>"])
            .flaky(&detail("77"), 2);
        let mut ctx = portal.context();

        let docs = fetcher().fetch(&mut ctx, "77").await.unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(portal.visits_to(&detail("77")), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let portal = FakePortal::new().flaky(&detail("77"), 10);
        let mut ctx = portal.context();

        let err = fetcher().fetch(&mut ctx, "77").await.unwrap_err();

        assert!(matches!(err, CrawlError::DetailNavigation { ref reference, .. } if reference == "77"));
        assert_eq!(portal.visits_to(&detail("77")), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let portal = FakePortal::new().failing(&detail("77"));
        let mut ctx = portal.context();

        assert!(fetcher().fetch(&mut ctx, "77").await.is_err());
        assert_eq!(portal.visits_to(&detail("77")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_navigation_times_out() {
        let portal = FakePortal::new().hanging(&detail("77"));
        let mut ctx = portal.context();

        let err = fetcher().fetch(&mut ctx, "77").await.unwrap_err();

        assert!(matches!(
            err,
            CrawlError::DetailNavigation { source: BrowserError::Timeout { secs: 60, .. }, .. }
        ));
        // timeouts are transient, so every attempt timed out
        assert_eq!(portal.visits_to(&detail("77")), 3);
    }
}
