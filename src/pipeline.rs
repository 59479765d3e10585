use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::browser::{BrowsingContext, Launcher};
use crate::config::{CrawlSettings, PortalConfig};
use crate::db::{CredentialSource, Credentials, RecordSink, RecordStatus, RecordWrite};
use crate::detail::DetailFetcher;
use crate::error::CrawlError;
use crate::listing::Paginator;
use crate::parser;
use crate::session;

/// Counters for one crawl cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub pages: usize,
    pub references: usize,
    pub saved: usize,
    pub format_errors: usize,
    pub failed: usize,
}

/// One crawl cycle: credentials → login → listing → detail → store.
pub struct Orchestrator<'a, L, C, S> {
    launcher: &'a L,
    credentials: &'a C,
    sink: &'a S,
    portal: PortalConfig,
    settings: CrawlSettings,
}

impl<'a, L, C, S> Orchestrator<'a, L, C, S>
where
    L: Launcher,
    C: CredentialSource,
    S: RecordSink,
{
    pub fn new(
        launcher: &'a L,
        credentials: &'a C,
        sink: &'a S,
        portal: PortalConfig,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            launcher,
            credentials,
            sink,
            portal,
            settings,
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, CrawlError> {
        let creds = self.load_credentials()?;
        let mut ctx = self
            .launcher
            .launch()
            .await
            .map_err(CrawlError::BrowserLaunch)?;

        let result = self.crawl(&mut ctx, &creds).await;
        ctx.close().await;
        result
    }

    fn load_credentials(&self) -> Result<Credentials, CrawlError> {
        let provider = &self.settings.provider;
        let unavailable = |reason: String| CrawlError::CredentialsUnavailable {
            provider: provider.clone(),
            reason,
        };
        match self.credentials.credentials(provider) {
            Ok(Some(creds)) if creds.is_complete() => Ok(creds),
            Ok(Some(_)) => Err(unavailable("user or pass is empty".into())),
            Ok(None) => Err(unavailable("nothing stored".into())),
            Err(e) => Err(unavailable(format!("{:#}", e))),
        }
    }

    async fn crawl(&self, ctx: &mut L::Context, creds: &Credentials) -> Result<CycleReport, CrawlError> {
        session::login(ctx, &self.portal.login_url(), creds, self.settings.login_settle).await?;

        let mut paginator = Paginator::new(
            self.portal.clone(),
            self.settings.max_pages,
            self.settings.warmup_loads,
            self.settings.listing_settle,
        );
        let fetcher = DetailFetcher::new(self.portal.clone(), &self.settings);
        let mut report = CycleReport::default();

        while let Some(page) = paginator.next_page(ctx).await? {
            report.pages += 1;
            info!(page = page.number, references = page.references.len(), "Processing listing page");
            let pb = progress_bar(page.references.len());

            for reference in &page.references {
                report.references += 1;
                match self.process(ctx, &fetcher, reference).await {
                    Ok(RecordStatus::PendingValidation) => report.saved += 1,
                    Ok(RecordStatus::FormatError) => report.format_errors += 1,
                    Err(e) if e.is_per_reference() => {
                        report.failed += 1;
                        error!(reference = %reference, error = %e, "Reference skipped");
                    }
                    Err(e) => {
                        pb.finish_and_clear();
                        return Err(e);
                    }
                }
                pb.inc(1);
            }
            pb.finish_and_clear();
        }

        info!(
            pages = report.pages,
            references = report.references,
            saved = report.saved,
            format_errors = report.format_errors,
            failed = report.failed,
            "Cycle finished"
        );
        Ok(report)
    }

    /// Fetch, extract and store one reference. Whatever was fetched gets
    /// written: the record, or the format-error sentinel.
    async fn process(
        &self,
        ctx: &mut L::Context,
        fetcher: &DetailFetcher,
        reference: &str,
    ) -> Result<RecordStatus, CrawlError> {
        let documents = fetcher.fetch(ctx, reference).await?;

        let write = match parser::extract_first(&documents) {
            Some((document, mut record)) => {
                record.service_number = reference.to_string();
                info!(
                    reference,
                    document = %documents[document].url,
                    client = %record.client_name,
                    status = %record.status_text,
                    "Record extracted"
                );
                RecordWrite::Extracted(record)
            }
            None => {
                let miss = CrawlError::ExtractionMiss {
                    reference: reference.to_string(),
                };
                warn!(documents = documents.len(), "{}; storing format-error sentinel", miss);
                RecordWrite::FormatError
            }
        };

        self.sink
            .upsert(reference, &write)
            .map_err(|e| CrawlError::Store {
                reference: reference.to_string(),
                message: format!("{:#}", e),
            })?;
        Ok(write.status())
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;
    use serde_json::Map;

    use super::*;
    use crate::browser::fake::FakePortal;
    use crate::db::{DocumentStore, CREDENTIALS_COLLECTION, FORMAT_ERROR_CLIENT, RECORDS_COLLECTION};

    const BASE: &str = "https://portal.example/w3multi";
    const LOGIN_FORM: &str = r#"<form action="valida.php" method="post">
        <input type="text" name="usuario"><input type="password" name="clave">
        <input type="submit" value="Entrar"></form>"#;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn links(refs: &[&str]) -> String {
        refs.iter()
            .map(|r| format!(r#"<a href="repasos1.php?reparacion={r}">{r}</a>"#))
            .collect()
    }

    fn listing(page: u32) -> String {
        PortalConfig::new(BASE).listing_url(page)
    }

    fn detail(reference: &str) -> String {
        PortalConfig::new(BASE).detail_url(reference)
    }

    fn store_with_credentials(user: &str, pass: &str) -> DocumentStore {
        let store = DocumentStore::open_in_memory().unwrap();
        let mut fields = Map::new();
        fields.insert("user".into(), user.into());
        fields.insert("pass".into(), pass.into());
        store.merge(CREDENTIALS_COLLECTION, "multiasistencia", &fields).unwrap();
        store
    }

    /// Login page, one listing page with three references, an empty page 2.
    fn portal(refs: &[&str]) -> FakePortal {
        FakePortal::new()
            .page(&format!("{BASE}/acceso.php"), &[LOGIN_FORM])
            .page(&listing(1), &[links(refs)])
            .page(&listing(2), &["<p>Sin resultados</p>"])
    }

    fn orchestrator<'a, C: CredentialSource, S: RecordSink>(
        launcher: &'a FakePortal,
        credentials: &'a C,
        sink: &'a S,
    ) -> Orchestrator<'a, FakePortal, C, S> {
        Orchestrator::new(launcher, credentials, sink, PortalConfig::new(BASE), CrawlSettings::default())
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(String, RecordStatus)>>,
        reject: Option<&'static str>,
    }

    impl RecordSink for RecordingSink {
        fn upsert(&self, reference: &str, write: &RecordWrite) -> anyhow::Result<()> {
            if self.reject == Some(reference) {
                return Err(anyhow!("write rejected"));
            }
            self.calls.lock().unwrap().push((reference.to_string(), write.status()));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_cycle_writes_records_and_sentinels() {
        let portal = portal(&["4512876", "4513001", "4513044"])
            .page(&detail("4512876"), &[fixture("detalle_marco"), fixture("detalle_columnas")])
            .failing(&detail("4513001"))
            .page(&detail("4513044"), &[fixture("sesion_caducada")]);
        let store = store_with_credentials("taller01", "s3cret");

        let report = orchestrator(&portal, &store, &store).run_cycle().await.unwrap();

        assert_eq!(
            report,
            CycleReport { pages: 1, references: 3, saved: 1, format_errors: 1, failed: 1 }
        );

        let ok = store.get(RECORDS_COLLECTION, "4512876").unwrap().unwrap();
        assert_eq!(ok.body["status"], "pending_validation");
        assert_eq!(ok.body["serviceNumber"], "4512876");
        assert_eq!(ok.body["clientName"], "María López García");

        let miss = store.get(RECORDS_COLLECTION, "4513044").unwrap().unwrap();
        assert_eq!(miss.body["status"], "format_error");
        assert_eq!(miss.body["clientName"], FORMAT_ERROR_CLIENT);

        assert!(store.get(RECORDS_COLLECTION, "4513001").unwrap().is_none());
        assert_eq!(portal.state().closes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_reference_does_not_stop_the_batch() {
        let portal = portal(&["1", "2", "3"])
            .page(&detail("1"), &[fixture("detalle_filas")])
            .failing(&detail("2"))
            .page(&detail("3"), &[fixture("detalle_columnas")]);
        let creds = store_with_credentials("taller01", "s3cret");
        let sink = RecordingSink::default();

        orchestrator(&portal, &creds, &sink).run_cycle().await.unwrap();

        let calls = sink.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                ("1".to_string(), RecordStatus::PendingValidation),
                ("3".to_string(), RecordStatus::PendingValidation),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_is_isolated_to_its_reference() {
        let portal = portal(&["1", "2"])
            .page(&detail("1"), &[fixture("detalle_filas")])
            .page(&detail("2"), &[fixture("detalle_filas")]);
        let creds = store_with_credentials("taller01", "s3cret");
        let sink = RecordingSink {
            reject: Some("1"),
            ..Default::default()
        };

        let report = orchestrator(&portal, &creds, &sink).run_cycle().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.saved, 1);
        assert_eq!(sink.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_credentials_skip_the_cycle() {
        let portal = portal(&["1"]);
        let empty = DocumentStore::open_in_memory().unwrap();

        let err = orchestrator(&portal, &empty, &empty).run_cycle().await.unwrap_err();

        assert!(matches!(err, CrawlError::CredentialsUnavailable { .. }));
        assert_eq!(portal.state().launches, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn incomplete_credentials_skip_the_cycle() {
        let portal = portal(&["1"]);
        let store = store_with_credentials("taller01", "");

        let err = orchestrator(&portal, &store, &store).run_cycle().await.unwrap_err();

        assert!(matches!(err, CrawlError::CredentialsUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn login_failure_still_releases_context() {
        let portal = FakePortal::new().page(&format!("{BASE}/acceso.php"), &["<p>Mantenimiento</p>"]);
        let store = store_with_credentials("taller01", "s3cret");

        let err = orchestrator(&portal, &store, &store).run_cycle().await.unwrap_err();

        assert!(matches!(err, CrawlError::Authentication(_)));
        assert_eq!(portal.state().launches, 1);
        assert_eq!(portal.state().closes, 1);
        assert_eq!(portal.visits_to(&listing(1)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_pages_merge_into_one_document() {
        let portal = FakePortal::new()
            .page(&format!("{BASE}/acceso.php"), &[LOGIN_FORM])
            .page(&listing(1), &[links(&["1", "2"])])
            .page(&listing(2), &[links(&["2"])])
            .page(&listing(3), &["<p></p>"])
            .page(&detail("1"), &[fixture("detalle_filas")])
            .page(&detail("2"), &[fixture("detalle_columnas")]);
        let store = store_with_credentials("taller01", "s3cret");

        let report = orchestrator(&portal, &store, &store).run_cycle().await.unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(report.references, 3);
        assert_eq!(store.count(RECORDS_COLLECTION).unwrap(), 2);
        assert_eq!(portal.visits_to(&detail("2")), 2);
    }
}
