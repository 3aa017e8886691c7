use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::browser::{CardSelectors, PageNavigator};
use crate::config::Config;
use crate::error::Result;
use crate::harvest::growth::{settle, GrowthSettings, ResultGrowthController};
use crate::harvest::session::{SearchSession, SessionState};
use crate::notify::{Attachments, Notifier};
use crate::parser::{ListingExtractor, ListingRecord};
use crate::storage::{ArtifactStore, Exporter, ImageFetcher, SeenRegistry, SeenSet};

/// Everything a run talks to besides its configuration.
pub struct Collaborators {
    pub navigator: Arc<dyn PageNavigator>,
    pub registry: Arc<dyn SeenRegistry>,
    pub exporter: Arc<dyn Exporter>,
    pub notifier: Arc<dyn Notifier>,
    pub image_fetcher: Arc<dyn ImageFetcher>,
    pub artifacts: ArtifactStore,
}

/// How one search term went.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub term: String,
    pub state: SessionState,
    pub records: Vec<ListingRecord>,
    pub error: Option<String>,
    pub capture: Option<PathBuf>,
    pub table: Option<PathBuf>,
}

impl SessionReport {
    fn new(term: &str) -> Self {
        Self {
            term: term.to_string(),
            state: SessionState::NotStarted,
            records: Vec::new(),
            error: None,
            capture: None,
            table: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub sessions: Vec<SessionReport>,
    /// New records across every session, keyed by listing id.
    pub unique: HashMap<String, ListingRecord>,
}

impl RunSummary {
    pub fn total_unique(&self) -> usize {
        self.unique.len()
    }

    pub fn failed_sessions(&self) -> usize {
        self.sessions.iter().filter(|s| s.state == SessionState::Failed).count()
    }
}

/// Runs one search session per configured term, one after the other, over
/// a single browser page.
pub struct SearchOrchestrator {
    config: Config,
    deps: Collaborators,
    growth: GrowthSettings,
    selectors: CardSelectors,
    found: AtomicUsize,
}

impl SearchOrchestrator {
    pub fn new(config: Config, deps: Collaborators) -> Self {
        let growth = GrowthSettings::from_config(&config);
        let selectors = CardSelectors::from(&config.selectors);
        Self {
            config,
            deps,
            growth,
            selectors,
            found: AtomicUsize::new(0),
        }
    }

    /// New listings accepted so far by the current run.
    pub fn found_so_far(&self) -> usize {
        self.found.load(Ordering::SeqCst)
    }

    /// A failing session is logged and skipped. Only an unreadable seen
    /// registry aborts the run.
    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let terms = self.config.search.effective_terms();
        info!("Starting run {} for {} search term(s)", run_id, terms.len());
        self.found.store(0, Ordering::SeqCst);

        let mut seen = match self.deps.registry.load().await {
            Ok(seen) => seen,
            Err(e) => {
                error!("Could not load seen listings: {}", e);
                info!("Total unique new listings found in this run: 0");
                return Err(e);
            }
        };
        info!("Loaded {} previously seen listing ids", seen.len());

        let mut sessions = Vec::with_capacity(terms.len());
        for term in &terms {
            let span = info_span!("session", term = %term);
            let report = self.run_session(term, &mut seen).instrument(span).await;
            sessions.push(report);
        }

        let mut unique = HashMap::new();
        for report in &sessions {
            for record in &report.records {
                unique.insert(record.id.clone(), record.clone());
            }
        }

        let summary = RunSummary { run_id, sessions, unique };
        if summary.failed_sessions() > 0 {
            warn!("{} of {} session(s) failed", summary.failed_sessions(), summary.sessions.len());
        }
        info!("Total unique new listings found in this run: {}", summary.total_unique());
        Ok(summary)
    }

    async fn run_session(&self, term: &str, seen: &mut SeenSet) -> SessionReport {
        info!("--- Starting search for: '{}' ---", term);
        let mut session = SearchSession::new(term, &self.config.search);
        let mut report = SessionReport::new(term);

        match self.drive_session(&mut session, seen, &mut report).await {
            Ok(records) => report.records = records,
            Err(e) => {
                error!("Search for '{}' failed: {}", term, e);
                session.fail(e.to_string());
                report.error = session.failure().map(str::to_string);
                self.save_diagnostic(term).await;
            }
        }

        report.state = session.state();
        report
    }

    async fn drive_session(
        &self,
        session: &mut SearchSession,
        seen: &mut SeenSet,
        report: &mut SessionReport,
    ) -> Result<Vec<ListingRecord>> {
        let navigator = self.deps.navigator.as_ref();

        let url = session.search_url()?;
        navigator.navigate(&url).await?;
        session.advance(SessionState::Navigated);

        self.resolve_consent().await;
        session.advance(SessionState::CookiesResolved);

        let outcome = ResultGrowthController::new(navigator, &self.growth)
            .expand(session.max_results)
            .await?;
        info!(
            "Results expanded to {} card(s) in {} iteration(s) ({:?})",
            outcome.rendered, outcome.iterations, outcome.reason
        );
        session.advance(SessionState::Expanded);
        report.capture = self.save_capture(&session.term).await;

        let cards = navigator.cards(&self.selectors).await?;
        let mut extractor = ListingExtractor::new();
        let mut records = extractor.extract(&cards, &*seen, session.max_results, self.config.output.save_images);
        let stats = extractor.stats();
        info!(
            "Examined {} card(s): {} new, {} already seen, {} failed",
            stats.examined, stats.accepted, stats.already_seen, stats.failed
        );
        session.advance(SessionState::Extracted);

        if records.is_empty() {
            info!("No new listings found for search term: '{}'", session.term);
            session.advance(SessionState::Done);
            return Ok(records);
        }
        info!("Found a total of {} new listings for '{}'", records.len(), session.term);
        self.mark_seen(&records, seen).await;

        if self.config.output.save_images {
            self.download_images(&mut records).await;
        }

        report.table = match self.deps.exporter.write_table(&records, &session.term).await {
            Ok(path) => {
                info!("Results saved to {:?}", path);
                Some(path)
            }
            Err(e) => {
                warn!("Failed to export results for '{}': {}", session.term, e);
                None
            }
        };
        session.advance(SessionState::Exported);

        if self.config.notify.enabled {
            let attachments = Attachments {
                table: report.table.clone(),
                capture: report.capture.clone(),
            };
            if let Err(e) = self.deps.notifier.send(&records, &attachments).await {
                warn!("Failed to send notification for '{}': {}", session.term, e);
            }
        } else {
            info!("Notifications disabled, skipping alert for '{}'", session.term);
        }
        session.advance(SessionState::Notified);
        session.advance(SessionState::Done);

        Ok(records)
    }

    /// Persist each accepted id, then add it to the run's seen set so later
    /// sessions skip it. The in-memory insert happens even when the
    /// durable append fails.
    async fn mark_seen(&self, records: &[ListingRecord], seen: &mut SeenSet) {
        let mut recorded = 0;
        for record in records {
            match self.deps.registry.append(&record.id).await {
                Ok(()) => recorded += 1,
                Err(e) => error!("Failed to record listing {} as seen: {}", record.id, e),
            }
            if seen.insert(record.id.clone()) {
                self.found.fetch_add(1, Ordering::SeqCst);
            }
        }
        info!("Recorded {} listing id(s) as seen", recorded);
    }

    async fn resolve_consent(&self) {
        let pacing = &self.config.pacing;
        match self
            .deps
            .navigator
            .dismiss_consent(&self.config.selectors.consent_button, pacing.consent_timeout)
            .await
        {
            Ok(true) => {
                info!("Accepted cookies");
                settle(pacing.after_consent).await;
            }
            Ok(false) => info!("No cookies banner found, continuing"),
            Err(e) => warn!("Could not dismiss cookies banner: {}", e),
        }
    }

    async fn download_images(&self, records: &mut [ListingRecord]) {
        for record in records.iter_mut() {
            let Some(image_url) = record.image_url.clone() else {
                continue;
            };

            let bytes = match self.deps.image_fetcher.fetch(&image_url).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to download image for {}: {}", record.id, e);
                    continue;
                }
            };

            match self.deps.artifacts.save_image(&record.id, &record.title, &bytes) {
                Ok(path) => record.image_path = Some(path.display().to_string()),
                Err(e) => warn!("Failed to save image for {}: {}", record.id, e),
            }
        }
    }

    async fn save_capture(&self, term: &str) -> Option<PathBuf> {
        let png = match self.deps.navigator.capture().await {
            Ok(png) => png,
            Err(e) => {
                warn!("Failed to capture search page: {}", e);
                return None;
            }
        };
        match self.deps.artifacts.save_capture(term, &png) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to save screenshot: {}", e);
                None
            }
        }
    }

    async fn save_diagnostic(&self, term: &str) {
        let result = match self.deps.navigator.capture().await {
            Ok(png) => self.deps.artifacts.save_diagnostic(term, &png),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Could not save diagnostic screenshot: {}", e);
        }
    }
}
