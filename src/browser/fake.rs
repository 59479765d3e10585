//! Scripted portal for tests: every URL maps to a list of documents (the page
//! followed by its frames) and selected URLs fail on navigation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{BrowserError, BrowsingContext, CandidateDocument, Launcher};

#[derive(Default)]
pub struct FakeState {
    pages: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    flaky: HashMap<String, u32>,
    hanging: HashSet<String>,
    pub visits: Vec<String>,
    pub filled: Vec<(String, String)>,
    pub clicks: usize,
    pub settled: Duration,
    pub launches: usize,
    pub closes: usize,
}

#[derive(Clone, Default)]
pub struct FakePortal {
    state: Arc<Mutex<FakeState>>,
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page<S: AsRef<str>>(self, url: &str, documents: &[S]) -> Self {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), documents.iter().map(|d| d.as_ref().to_string()).collect());
        self
    }

    pub fn failing(self, url: &str) -> Self {
        self.state.lock().unwrap().failing.insert(url.to_string());
        self
    }

    /// Answer HTTP 503 for the first `times` visits of `url`.
    pub fn flaky(self, url: &str, times: u32) -> Self {
        self.state.lock().unwrap().flaky.insert(url.to_string(), times);
        self
    }

    /// Navigation to `url` never completes.
    pub fn hanging(self, url: &str) -> Self {
        self.state.lock().unwrap().hanging.insert(url.to_string());
        self
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn context(&self) -> FakeContext {
        FakeContext {
            state: Arc::clone(&self.state),
            current: None,
        }
    }

    pub fn visits_to(&self, url: &str) -> usize {
        self.state().visits.iter().filter(|v| *v == url).count()
    }
}

#[async_trait]
impl Launcher for FakePortal {
    type Context = FakeContext;

    async fn launch(&self) -> Result<FakeContext, BrowserError> {
        self.state().launches += 1;
        Ok(self.context())
    }
}

pub struct FakeContext {
    state: Arc<Mutex<FakeState>>,
    current: Option<String>,
}

impl FakeContext {
    fn primary(&self) -> Result<String, BrowserError> {
        let url = self.current.as_ref().ok_or(BrowserError::NoPage)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .pages
            .get(url)
            .and_then(|docs| docs.first().cloned())
            .unwrap_or_default())
    }
}

fn matches_any(html: &str, selectors: &[&str]) -> bool {
    let doc = Html::parse_document(html);
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .any(|sel| doc.select(&sel).next().is_some())
}

#[async_trait]
impl BrowsingContext for FakeContext {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            state.visits.push(url.to_string());
            if state.failing.contains(url) {
                return Err(BrowserError::Status {
                    url: url.to_string(),
                    status: 404,
                });
            }
            if let Some(left) = state.flaky.get_mut(url).filter(|n| **n > 0) {
                *left -= 1;
                return Err(BrowserError::Status {
                    url: url.to_string(),
                    status: 503,
                });
            }
            state.hanging.contains(url)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn fill(&mut self, selectors: &[&str], value: &str) -> Result<bool, BrowserError> {
        let html = self.primary()?;
        if !matches_any(&html, selectors) {
            return Ok(false);
        }
        self.state
            .lock()
            .unwrap()
            .filled
            .push((selectors[0].to_string(), value.to_string()));
        Ok(true)
    }

    async fn click(&mut self, selectors: &[&str]) -> Result<bool, BrowserError> {
        let html = self.primary()?;
        if !matches_any(&html, selectors) {
            return Ok(false);
        }
        self.state.lock().unwrap().clicks += 1;
        Ok(true)
    }

    async fn documents(&mut self) -> Result<Vec<CandidateDocument>, BrowserError> {
        let url = self.current.clone().ok_or(BrowserError::NoPage)?;
        let state = self.state.lock().unwrap();
        let docs = state.pages.get(&url).cloned().unwrap_or_default();
        Ok(docs
            .into_iter()
            .enumerate()
            .map(|(i, html)| CandidateDocument::new(format!("{}#frame{}", url, i), html))
            .collect())
    }

    async fn settle(&mut self, duration: Duration) {
        self.state.lock().unwrap().settled += duration;
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().closes += 1;
        self.current = None;
    }
}
