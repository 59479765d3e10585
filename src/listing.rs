use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::browser::{BrowsingContext, CandidateDocument};
use crate::config::PortalConfig;
use crate::error::CrawlError;

static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"reparacion=([0-9]+)").unwrap());
static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="reparacion="]"#).unwrap());

/// Unique case references linked from `html`, in link order.
pub fn harvest_links(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    doc.select(&LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| REFERENCE_RE.captures(href).map(|c| c[1].to_string()))
        .filter(|r| seen.insert(r.clone()))
        .collect()
}

/// References of a listing: the page itself, or else the first frame that
/// has any.
pub fn harvest(documents: &[CandidateDocument]) -> Vec<String> {
    let Some((primary, frames)) = documents.split_first() else {
        return Vec::new();
    };
    let refs = harvest_links(&primary.html);
    if !refs.is_empty() {
        return refs;
    }
    frames
        .iter()
        .map(|f| harvest_links(&f.html))
        .find(|r| !r.is_empty())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub number: u32,
    pub references: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Active,
    Exhausted,
}

/// Walks the listing one page at a time. Once exhausted it stays exhausted.
pub struct Paginator {
    portal: PortalConfig,
    max_pages: Option<u32>,
    warmup_loads: u32,
    settle: Duration,
    page: u32,
    state: State,
}

impl Paginator {
    pub fn new(portal: PortalConfig, max_pages: Option<u32>, warmup_loads: u32, settle: Duration) -> Self {
        Self {
            portal,
            max_pages,
            warmup_loads,
            settle,
            page: 0,
            state: State::Fresh,
        }
    }

    /// Load and harvest the next listing page, or `None` once the listing
    /// ran dry or the page cap was reached.
    pub async fn next_page<B: BrowsingContext + ?Sized>(
        &mut self,
        ctx: &mut B,
    ) -> Result<Option<ListingPage>, CrawlError> {
        let number = match self.state {
            State::Exhausted => return Ok(None),
            State::Fresh => {
                self.warm_up(ctx).await?;
                1
            }
            State::Active => {
                if self.max_pages.is_some_and(|max| self.page >= max) {
                    info!(page = self.page, "Page cap reached");
                    self.state = State::Exhausted;
                    return Ok(None);
                }
                let next = self.page + 1;
                info!(page = next, "Advancing listing");
                self.load(ctx, next).await?;
                next
            }
        };

        let references = self.harvest_current(ctx, number).await?;
        if references.is_empty() {
            info!(page = number, "No references; listing exhausted");
            self.state = State::Exhausted;
            return Ok(None);
        }

        if number > 1 {
            ctx.settle(self.settle).await;
        }
        self.page = number;
        self.state = State::Active;
        info!(page = number, found = references.len(), "Listing page harvested");
        Ok(Some(ListingPage { number, references }))
    }

    /// The portal only fills the listing after it has been refreshed a few
    /// times in the same session.
    async fn warm_up<B: BrowsingContext + ?Sized>(&mut self, ctx: &mut B) -> Result<(), CrawlError> {
        info!(loads = self.warmup_loads, "Loading listing");
        for _ in 0..self.warmup_loads.max(1) {
            self.load(ctx, 1).await?;
            if self.warmup_loads > 0 {
                ctx.settle(self.settle).await;
            }
        }
        Ok(())
    }

    async fn load<B: BrowsingContext + ?Sized>(&self, ctx: &mut B, page: u32) -> Result<(), CrawlError> {
        ctx.goto(&self.portal.listing_url(page))
            .await
            .map_err(|source| CrawlError::ListingNavigation { page, source })
    }

    async fn harvest_current<B: BrowsingContext + ?Sized>(
        &self,
        ctx: &mut B,
        page: u32,
    ) -> Result<Vec<String>, CrawlError> {
        let documents = ctx
            .documents()
            .await
            .map_err(|source| CrawlError::ListingNavigation { page, source })?;
        debug!(page, documents = documents.len(), "Harvesting listing");
        Ok(harvest(&documents))
    }
}
