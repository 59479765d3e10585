mod browser;
mod config;
mod db;
mod detail;
mod error;
mod listing;
mod parser;
mod pipeline;
mod scheduler;
mod session;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use browser::http::HttpLauncher;
use config::{CrawlSettings, PortalConfig, ServiceAccount, DEFAULT_BASE_URL, DEFAULT_PROVIDER};
use pipeline::Orchestrator;
use scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "expedientes_harvester", about = "Harvests pending case files from the Multiasistencia provider portal")]
struct Cli {
    #[arg(long, env = "STORE_PROJECT_ID")]
    project_id: Option<String>,
    #[arg(long, env = "STORE_CLIENT_EMAIL")]
    client_email: Option<String>,
    #[arg(long, env = "STORE_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,
    /// Document store file (default: data/<project-id>.sqlite)
    #[arg(long)]
    db_path: Option<PathBuf>,
    /// Credentials document to log in with
    #[arg(long, default_value = DEFAULT_PROVIDER)]
    provider: String,
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,
    /// Pause between cycles
    #[arg(long, default_value = "900")]
    interval_secs: u64,
    /// Listing pages per cycle, 0 for all
    #[arg(long, default_value = "3")]
    max_pages: u32,
    /// Listing refreshes before harvesting page 1
    #[arg(long, default_value = "3")]
    warmup_loads: u32,
    #[arg(long, default_value = "60")]
    timeout_secs: u64,
    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let account = match ServiceAccount::from_parts(
        cli.project_id.clone(),
        cli.client_email.clone(),
        cli.private_key.clone(),
    ) {
        Ok(account) => account,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    if !account.has_pem_key() {
        warn!("STORE_PRIVATE_KEY does not look like a PEM private key");
    }

    let db_path = cli.db_path.clone().unwrap_or_else(|| account.default_db_path());
    let store = db::DocumentStore::open(&db_path)
        .with_context(|| format!("opening document store {}", db_path.display()))?;
    info!(
        project = %account.project_id,
        account = %account.client_email,
        path = %db_path.display(),
        records = store.count(db::RECORDS_COLLECTION)?,
        "Document store ready"
    );

    let settings = CrawlSettings {
        provider: cli.provider.clone(),
        max_pages: (cli.max_pages > 0).then_some(cli.max_pages),
        warmup_loads: cli.warmup_loads,
        navigation_timeout: Duration::from_secs(cli.timeout_secs),
        ..CrawlSettings::default()
    };
    let launcher = HttpLauncher::new(settings.navigation_timeout);
    let orchestrator = Orchestrator::new(
        &launcher,
        &store,
        &store,
        PortalConfig::new(&cli.base_url),
        settings,
    );

    let scheduler = Scheduler::new(Duration::from_secs(cli.interval_secs))
        .with_max_cycles(cli.once.then_some(1));
    let cycles = scheduler
        .run(scheduler::shutdown_signal(), || orchestrator.run_cycle())
        .await;

    info!("Stopped after {} cycle(s) in {}", cycles, format_duration(t0.elapsed()));
    Ok(())
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
