use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::CrawlError;
use crate::pipeline::CycleReport;

/// Runs crawl cycles back to back with a fixed pause in between.
pub struct Scheduler {
    interval: Duration,
    max_cycles: Option<usize>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_cycles: None,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: Option<usize>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    /// Run until `shutdown` turns true (or its sender goes away) or the cycle
    /// limit is hit. Shutdown is only observed between cycles. A failed cycle
    /// is logged and the loop goes on. Returns how many cycles ran.
    pub async fn run<F, Fut>(&self, mut shutdown: watch::Receiver<bool>, mut cycle: F) -> usize
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CycleReport, CrawlError>>,
    {
        let mut cycles = 0;
        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested; scheduler stopping");
                break;
            }

            let started = Instant::now();
            cycles += 1;
            info!(cycle = cycles, "Starting crawl cycle");
            match cycle().await {
                Ok(report) => info!(
                    cycle = cycles,
                    saved = report.saved,
                    format_errors = report.format_errors,
                    failed = report.failed,
                    "Cycle done in {:.1}s",
                    started.elapsed().as_secs_f64()
                ),
                Err(e) => error!(cycle = cycles, error = %e, "Cycle aborted"),
            }

            if self.max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }

            info!("Next cycle in {}s", self.interval.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        cycles
    }
}

/// Receiver that turns true on Ctrl-C or SIGTERM.
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received; finishing current cycle");
        tx.send(true).ok();
    });
    rx
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
