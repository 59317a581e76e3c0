use chrono::Duration as ChronoDuration;
use history_sync_config::Config;
use history_sync_models::{WatchEvent, Watermark};
use history_sync_sources::{CredentialManager, HistoryApi, HistoryFetcher, RetryPolicy, SourceError};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use crate::cursor::{Backfill, CursorStore};
use crate::diff::reconcile;
use crate::enrich::CatalogEnricher;
use crate::event_log::EventLog;
use crate::normalize::normalize_batch;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Credentials could not be renewed; needs operator action
    #[error("credentials expired: {0}")]
    AuthExpired(String),

    #[error("history fetch failed: {0}")]
    FetchFailed(#[source] SourceError),

    #[error("event log error: {0:#}")]
    Persistence(anyhow::Error),

    #[error("cursor error: {0:#}")]
    Cursor(anyhow::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn is_fatal_auth(&self) -> bool {
        matches!(self, SyncError::AuthExpired(_))
    }
}

impl From<SourceError> for SyncError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::AuthExpired(msg) => SyncError::AuthExpired(msg),
            SourceError::Config(msg) => SyncError::Config(msg),
            other => SyncError::FetchFailed(other),
        }
    }
}

/// Where a run currently is; the fatal phases are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    DetermineWatermark,
    VerifySession,
    Fetch,
    Normalize,
    Enrich,
    Dedup,
    Append,
    AdvanceCursor,
    AuthFatal,
    FetchFatal,
    PersistFatal,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::DetermineWatermark => "determine_watermark",
            SyncPhase::VerifySession => "verify_session",
            SyncPhase::Fetch => "fetch",
            SyncPhase::Normalize => "normalize",
            SyncPhase::Enrich => "enrich",
            SyncPhase::Dedup => "dedup",
            SyncPhase::Append => "append",
            SyncPhase::AdvanceCursor => "advance_cursor",
            SyncPhase::AuthFatal => "auth_fatal",
            SyncPhase::FetchFatal => "fetch_fatal",
            SyncPhase::PersistFatal => "persist_fatal",
        };
        write!(f, "{}", name)
    }
}

/// Knobs for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Overrides the stored cursor as the fetch start
    pub start_at: Option<Watermark>,
    pub page_size: u32,
    pub max_pages: u32,
    pub cursor_margin: ChronoDuration,
    pub enrich: bool,
    pub verify_session: bool,
    /// Fetch and reconcile, but write nothing
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            start_at: None,
            page_size: 200,
            max_pages: 5,
            cursor_margin: ChronoDuration::seconds(1),
            enrich: true,
            verify_session: true,
            dry_run: false,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let start_at = match config.start_at_override.as_deref() {
            Some(raw) => Some(
                Watermark::parse(raw)
                    .ok_or_else(|| SyncError::Config(format!("start_at is not an RFC 3339 timestamp: {}", raw)))?,
            ),
            None => None,
        };
        Ok(Self {
            start_at,
            page_size: config.sync.page_size,
            max_pages: config.sync.max_pages,
            cursor_margin: ChronoDuration::seconds(config.sync.cursor_margin_seconds.max(0)),
            enrich: config.sync.enrich,
            verify_session: config.sync.verify_session,
            dry_run: false,
        })
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub watermark_before: Option<Watermark>,
    pub watermark_after: Option<Watermark>,
    pub pages: u32,
    pub fetched: usize,
    pub normalized: usize,
    pub skipped: usize,
    pub enriched: bool,
    pub duplicates: usize,
    pub appended: usize,
    pub appended_labels: Vec<String>,
    /// Stopped at `max_pages`; the cursor holds until older history is in
    pub truncated: bool,
    /// Older history still to fetch, newest bound first
    pub backfill_until: Option<Watermark>,
    pub token_refreshed: bool,
    pub dry_run: bool,
    pub duration_ms: u64,
}

/// Runs one linear pass:
/// watermark → session check → fetch → normalize → enrich → dedup → append → cursor.
///
/// Nothing is written before the whole pass succeeds, so a fatal error
/// leaves the log and the cursor as they were. A pass cut short by
/// `max_pages` keeps the cursor and records a backfill window instead; the
/// following runs page backwards through it before the cursor moves.
pub struct SyncOrchestrator {
    history: Arc<dyn HistoryApi>,
    credentials: CredentialManager,
    enricher: Option<CatalogEnricher>,
    event_log: EventLog,
    cursor: CursorStore,
    retry: RetryPolicy,
    options: RunOptions,
    phase: SyncPhase,
}

impl SyncOrchestrator {
    pub fn new(
        history: Arc<dyn HistoryApi>,
        credentials: CredentialManager,
        event_log: EventLog,
        cursor: CursorStore,
    ) -> Self {
        Self {
            history,
            credentials,
            enricher: None,
            event_log,
            cursor,
            retry: RetryPolicy::default(),
            options: RunOptions::default(),
            phase: SyncPhase::Idle,
        }
    }

    pub fn with_enricher(mut self, enricher: Option<CatalogEnricher>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn enricher(&self) -> Option<&CatalogEnricher> {
        self.enricher.as_ref()
    }

    /// Hand back the enricher so its cache can be persisted
    pub fn into_enricher(self) -> Option<CatalogEnricher> {
        self.enricher
    }

    #[instrument(skip(self), fields(dry_run = self.options.dry_run))]
    pub async fn run(&mut self) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let refreshes_before = self.credentials.refresh_count();

        self.phase = SyncPhase::DetermineWatermark;
        let stored = self.cursor.load();
        let watermark = self.options.start_at.or(stored);
        let backfill = self.cursor.load_backfill();
        info!(
            operation = "sync_start",
            watermark = ?watermark.map(|w| w.to_string()),
            backfill_until = ?backfill.map(|b| b.end_at.to_string()),
            overridden = self.options.start_at.is_some(),
            "Starting history sync"
        );

        if self.options.verify_session {
            self.phase = SyncPhase::VerifySession;
            if let Err(e) = self.verify_session().await {
                return Err(self.fail(e));
            }
        }

        self.phase = SyncPhase::Fetch;
        let fetcher = HistoryFetcher::new(
            self.history.clone(),
            self.retry.clone(),
            self.options.page_size,
            self.options.max_pages,
        );
        let mut pages = fetcher.fetch_window(watermark, backfill.map(|b| b.end_at), &mut self.credentials);
        let fetched = pages.collect_all().await;
        let pages_requested = pages.pages_requested();
        let truncated = pages.truncated();
        drop(pages);
        let raw = match fetched {
            Ok(raw) => raw,
            Err(e) => return Err(self.fail(e.into())),
        };
        info!(operation = "fetch", pages = pages_requested, items = raw.len(), truncated, "Fetched history");
        let oldest = raw
            .iter()
            .filter_map(|item| item.watched_at.as_deref().and_then(Watermark::parse))
            .min();

        self.phase = SyncPhase::Normalize;
        let mut events = normalize_batch(&raw);
        let skipped = raw.len() - events.len();
        let newest = events.iter().map(WatchEvent::watched_at).max();

        let mut enriched = false;
        if self.options.enrich && !events.is_empty() {
            if let Some(enricher) = self.enricher.as_mut() {
                self.phase = SyncPhase::Enrich;
                events = enricher.enrich_batch(events).await;
                enriched = true;
            }
        }

        self.phase = SyncPhase::Dedup;
        let normalized = events.len();
        let existing = self.event_log.load();
        let to_append = reconcile(&existing, events);
        let duplicates = normalized - to_append.len();

        self.phase = SyncPhase::Append;
        if self.options.dry_run {
            info!(operation = "append", would_append = to_append.len(), "Dry run, event log left unchanged");
        } else if let Err(e) = self.event_log.append(&to_append) {
            return Err(self.fail(SyncError::Persistence(e)));
        }

        self.phase = SyncPhase::AdvanceCursor;
        let high_water = match (backfill.map(|b| b.high_water), newest) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let (next, pending) = if truncated {
            let pending = match (oldest, high_water) {
                (Some(end_at), Some(high_water)) => Some(Backfill { end_at, high_water }),
                _ => backfill,
            };
            if let (Some(previous), Some(current)) = (backfill, pending) {
                if current.end_at >= previous.end_at {
                    warn!(
                        end_at = %current.end_at,
                        "Backfill made no progress; raise max_pages or page_size"
                    );
                }
            }
            (stored, pending)
        } else {
            (Watermark::advance(stored, high_water, self.options.cursor_margin), None)
        };

        if !self.options.dry_run {
            if let Err(e) = self.store_position(stored, next, backfill, pending) {
                return Err(self.fail(SyncError::Cursor(e)));
            }
        }

        self.phase = SyncPhase::Idle;
        let report = SyncReport {
            watermark_before: stored,
            watermark_after: next,
            pages: pages_requested,
            fetched: raw.len(),
            normalized,
            skipped,
            enriched,
            duplicates,
            appended: to_append.len(),
            appended_labels: to_append.iter().map(WatchEvent::label).collect(),
            truncated,
            backfill_until: pending.map(|b| b.end_at),
            token_refreshed: self.credentials.refresh_count() > refreshes_before,
            dry_run: self.options.dry_run,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            operation = "sync_complete",
            fetched = report.fetched,
            appended = report.appended,
            duplicates = report.duplicates,
            skipped = report.skipped,
            watermark = ?report.watermark_after.map(|w| w.to_string()),
            backfill_until = ?report.backfill_until.map(|w| w.to_string()),
            duration_ms = report.duration_ms,
            "History sync finished"
        );
        Ok(report)
    }

    /// Cursor first, then the backfill file, so an interrupted write at worst
    /// repeats an already deduplicated window
    fn store_position(
        &self,
        stored: Option<Watermark>,
        next: Option<Watermark>,
        backfill: Option<Backfill>,
        pending: Option<Backfill>,
    ) -> anyhow::Result<()> {
        if next != stored {
            if let Some(next) = next {
                self.cursor.save(next)?;
            }
        }
        match pending {
            Some(pending) if Some(pending) != backfill => self.cursor.save_backfill(&pending)?,
            Some(_) => {}
            None => {
                if backfill.is_some() {
                    self.cursor.clear_backfill()?;
                }
            }
        }
        Ok(())
    }

    /// `/users/me` check; only expired credentials are fatal here
    async fn verify_session(&mut self) -> Result<(), SyncError> {
        let api = &*self.history;
        let result = self
            .credentials
            .authorize(move |token| async move { api.current_user(&token).await })
            .await;
        match result {
            Ok(user) => {
                info!(user = %user.username, "Session verified");
                Ok(())
            }
            Err(SourceError::AuthExpired(msg)) => Err(SyncError::AuthExpired(msg)),
            Err(e) => {
                warn!("Session check failed, continuing: {}", e);
                Ok(())
            }
        }
    }

    fn fail(&mut self, err: SyncError) -> SyncError {
        self.phase = match &err {
            SyncError::AuthExpired(_) => SyncPhase::AuthFatal,
            SyncError::Persistence(_) | SyncError::Cursor(_) => SyncPhase::PersistFatal,
            _ => SyncPhase::FetchFatal,
        };
        error!(operation = "sync_failed", phase = %self.phase, "History sync aborted: {}", err);
        err
    }
}

#[cfg(test)]
mod tests;
