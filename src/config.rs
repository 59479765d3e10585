use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://web.multiasistencia.com/w3multi";
pub const DEFAULT_PROVIDER: &str = "multiasistencia";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration value {0}")]
    Missing(&'static str),
}

/// Identity the document store is opened under.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
}

impl ServiceAccount {
    /// All three values are mandatory. The key usually arrives through an
    /// environment variable with its newlines written as `\n`.
    pub fn from_parts(
        project_id: Option<String>,
        client_email: Option<String>,
        private_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        let project_id = required(project_id, "STORE_PROJECT_ID")?;
        let client_email = required(client_email, "STORE_CLIENT_EMAIL")?;
        let private_key = required(private_key, "STORE_PRIVATE_KEY")?.replace("\\n", "\n");
        Ok(Self {
            project_id,
            client_email,
            private_key,
        })
    }

    pub fn has_pem_key(&self) -> bool {
        self.private_key.contains("-----BEGIN") && self.private_key.contains("PRIVATE KEY-----")
    }

    pub fn default_db_path(&self) -> PathBuf {
        PathBuf::from("data").join(format!("{}.sqlite", self.project_id))
    }
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

/// Portal resource layout.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
}

impl PortalConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn login_url(&self) -> String {
        format!("{}/acceso.php", self.base_url)
    }

    pub fn listing_url(&self, page: u32) -> String {
        if page <= 1 {
            format!("{}/frepasos_new.php?refresh=1", self.base_url)
        } else {
            format!("{}/frepasos_new.php?refresh=1&paginasiguiente={}", self.base_url, page)
        }
    }

    pub fn detail_url(&self, reference: &str) -> String {
        format!("{}/repasos1.php?reparacion={}", self.base_url, reference)
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Knobs of one crawl cycle.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub provider: String,
    /// `None` walks until the listing runs dry.
    pub max_pages: Option<u32>,
    /// Refresh loads of the listing before harvesting page 1.
    pub warmup_loads: u32,
    pub navigation_timeout: Duration,
    pub login_settle: Duration,
    pub listing_settle: Duration,
    pub detail_settle: Duration,
    pub detail_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            max_pages: Some(3),
            warmup_loads: 3,
            navigation_timeout: Duration::from_secs(60),
            login_settle: Duration::from_millis(4000),
            listing_settle: Duration::from_millis(2000),
            detail_settle: Duration::from_millis(1500),
            detail_retries: 2,
            retry_backoff: Duration::from_millis(2000),
        }
    }
}
