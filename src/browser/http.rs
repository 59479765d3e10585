use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::{BrowserError, BrowsingContext, CandidateDocument, Launcher};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

static CONTROL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[name], textarea[name], select[name]").unwrap());
static OPTION_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("option").unwrap());
static FRAME_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("frame[src], iframe[src]").unwrap());

/// Opens cookie-carrying HTTP sessions that behave like a minimal browser:
/// forms are submitted the way the page declares them and frames are fetched
/// as separate documents.
pub struct HttpLauncher {
    timeout: Duration,
}

impl HttpLauncher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Launcher for HttpLauncher {
    type Context = HttpContext;

    async fn launch(&self) -> Result<HttpContext, BrowserError> {
        let client = Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .build()
            .map_err(|e| BrowserError::Request {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(HttpContext {
            client,
            timeout: self.timeout,
            page: None,
            filled: Vec::new(),
        })
    }
}

struct LoadedPage {
    url: Url,
    html: String,
}

pub struct HttpContext {
    client: Client,
    timeout: Duration,
    page: Option<LoadedPage>,
    /// Values set through `fill`, keyed by input name, sent on the next submit.
    filled: Vec<(String, String)>,
}

impl HttpContext {
    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<(Url, String), BrowserError> {
        let response = request.send().await.map_err(|e| self.request_error(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BrowserError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let final_url = response.url().clone();
        let html = response.text().await.map_err(|e| self.request_error(url, e))?;
        Ok((final_url, html))
    }

    async fn load(&mut self, request: RequestBuilder, url: &Url) -> Result<(), BrowserError> {
        let (final_url, html) = self.send(request, url).await?;
        debug!(url = %final_url, bytes = html.len(), "page loaded");
        self.page = Some(LoadedPage {
            url: final_url,
            html,
        });
        self.filled.clear();
        Ok(())
    }

    fn request_error(&self, url: &Url, e: reqwest::Error) -> BrowserError {
        if e.is_timeout() {
            BrowserError::Timeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            }
        } else {
            BrowserError::Request {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl BrowsingContext for HttpContext {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        let url = Url::parse(url).map_err(|_| BrowserError::InvalidUrl(url.to_string()))?;
        let request = self.client.get(url.clone());
        self.load(request, &url).await
    }

    async fn fill(&mut self, selectors: &[&str], value: &str) -> Result<bool, BrowserError> {
        let page = self.page.as_ref().ok_or(BrowserError::NoPage)?;
        let Some(name) = find_input_name(&page.html, selectors) else {
            return Ok(false);
        };
        self.filled.retain(|(n, _)| *n != name);
        self.filled.push((name, value.to_string()));
        Ok(true)
    }

    async fn click(&mut self, selectors: &[&str]) -> Result<bool, BrowserError> {
        let page = self.page.as_ref().ok_or(BrowserError::NoPage)?;
        let Some(action) = resolve_click(&page.html, &page.url, selectors, &self.filled) else {
            return Ok(false);
        };
        let (request, url) = match action {
            ClickAction::Follow(url) => (self.client.get(url.clone()), url),
            ClickAction::Submit(form) if form.post => {
                (self.client.post(form.action.clone()).form(&form.fields), form.action)
            }
            ClickAction::Submit(form) => {
                (self.client.get(form.action.clone()).query(&form.fields), form.action)
            }
        };
        self.load(request, &url).await?;
        Ok(true)
    }

    async fn documents(&mut self) -> Result<Vec<CandidateDocument>, BrowserError> {
        let page = self.page.as_ref().ok_or(BrowserError::NoPage)?;
        let mut docs = vec![CandidateDocument::new(page.url.as_str(), page.html.clone())];
        let mut walk = FrameWalk::new(&page.html, &page.url);

        while let Some((url, depth)) = walk.next_frame() {
            match self.send(self.client.get(url.clone()), &url).await {
                Ok((final_url, html)) => {
                    walk.loaded(&html, &final_url, depth);
                    docs.push(CandidateDocument::new(final_url.as_str(), html));
                }
                Err(e) => warn!(frame = %url, error = %e, "Skipping unreachable frame"),
            }
        }
        Ok(docs)
    }

    async fn settle(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn close(&mut self) {
        self.page = None;
        self.filled.clear();
        debug!("browsing context closed");
    }
}

// ── DOM helpers (sync; `Html` never crosses an await) ──

fn matches_in_order<'a>(doc: &'a Html, selectors: &[&str]) -> Vec<ElementRef<'a>> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .flat_map(|sel| doc.select(&sel).collect::<Vec<_>>())
        .collect()
}

fn find_input_name(html: &str, selectors: &[&str]) -> Option<String> {
    let doc = Html::parse_document(html);
    matches_in_order(&doc, selectors)
        .into_iter()
        .find_map(|el| el.value().attr("name").map(str::to_string))
}

#[derive(Debug)]
struct FormSubmission {
    action: Url,
    post: bool,
    fields: Vec<(String, String)>,
}

#[derive(Debug)]
enum ClickAction {
    Follow(Url),
    Submit(FormSubmission),
}

fn resolve_click(
    html: &str,
    base: &Url,
    selectors: &[&str],
    filled: &[(String, String)],
) -> Option<ClickAction> {
    let doc = Html::parse_document(html);
    matches_in_order(&doc, selectors).into_iter().find_map(|el| {
        if el.value().name() == "a" {
            let href = el.value().attr("href")?;
            return base.join(href).ok().map(ClickAction::Follow);
        }
        let form = el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|a| a.value().name() == "form")?;
        build_submission(form, el, base, filled).map(ClickAction::Submit)
    })
}

fn build_submission(
    form: ElementRef,
    submitter: ElementRef,
    base: &Url,
    filled: &[(String, String)],
) -> Option<FormSubmission> {
    let action = match form.value().attr("action") {
        Some(a) if !a.trim().is_empty() => base.join(a.trim()).ok()?,
        _ => base.clone(),
    };
    let post = form
        .value()
        .attr("method")
        .is_some_and(|m| m.eq_ignore_ascii_case("post"));

    let mut fields = form_defaults(form);
    for (name, value) in filled {
        match fields.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value.clone(),
            None => fields.push((name.clone(), value.clone())),
        }
    }
    if let Some(name) = submitter.value().attr("name") {
        let value = submitter.value().attr("value").unwrap_or_default();
        fields.push((name.to_string(), value.to_string()));
    }

    Some(FormSubmission {
        action,
        post,
        fields,
    })
}

/// Name/value pairs a browser would send for `form` before any user input.
fn form_defaults(form: ElementRef) -> Vec<(String, String)> {
    let mut fields = Vec::new();

    for control in form.select(&CONTROL_SEL) {
        let el = control.value();
        if el.attr("disabled").is_some() {
            continue;
        }
        let Some(name) = el.attr("name") else { continue };
        let value = match el.name() {
            "textarea" => control.text().collect::<String>(),
            "select" => {
                let chosen = control
                    .select(&OPTION_SEL)
                    .find(|o| o.value().attr("selected").is_some())
                    .or_else(|| control.select(&OPTION_SEL).next());
                match chosen {
                    Some(o) => o
                        .value()
                        .attr("value")
                        .map(str::to_string)
                        .unwrap_or_else(|| o.text().collect::<String>().trim().to_string()),
                    None => continue,
                }
            }
            _ => {
                let kind = el.attr("type").unwrap_or("text").to_ascii_lowercase();
                match kind.as_str() {
                    "submit" | "button" | "image" | "reset" | "file" => continue,
                    "checkbox" | "radio" if el.attr("checked").is_none() => continue,
                    "checkbox" | "radio" => el.attr("value").unwrap_or("on").to_string(),
                    _ => el.attr("value").unwrap_or_default().to_string(),
                }
            }
        };
        fields.push((name.to_string(), value));
    }
    fields
}

/// Frame nesting followed below the top-level page.
const MAX_FRAME_DEPTH: usize = 3;

/// Depth-first walk over nested frames in document order. Each URL is
/// visited once, so frames pointing back at an ancestor do not loop.
struct FrameWalk {
    pending: Vec<(Url, usize)>,
    seen: HashSet<Url>,
}

impl FrameWalk {
    fn new(html: &str, url: &Url) -> Self {
        let mut walk = Self {
            pending: Vec::new(),
            seen: HashSet::from([url.clone()]),
        };
        walk.discover(html, url, 0);
        walk
    }

    fn next_frame(&mut self) -> Option<(Url, usize)> {
        while let Some((url, depth)) = self.pending.pop() {
            if self.seen.insert(url.clone()) {
                return Some((url, depth));
            }
        }
        None
    }

    /// Record a fetched frame and queue its own frames ahead of its siblings.
    fn loaded(&mut self, html: &str, final_url: &Url, depth: usize) {
        self.seen.insert(final_url.clone());
        self.discover(html, final_url, depth);
    }

    fn discover(&mut self, html: &str, url: &Url, depth: usize) {
        if depth >= MAX_FRAME_DEPTH {
            return;
        }
        let children = frame_sources(html, url);
        self.pending
            .extend(children.into_iter().rev().map(|u| (u, depth + 1)));
    }
}

fn frame_sources(html: &str, base: &Url) -> Vec<Url> {
    let doc = Html::parse_document(html);
    doc.select(&FRAME_SEL)
        .filter_map(|f| f.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty() && !src.starts_with("about:") && !src.starts_with("javascript:"))
        .filter_map(|src| base.join(src).ok())
        .collect()
}
