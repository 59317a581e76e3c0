use super::*;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use history_sync_models::Credential;
use history_sync_sources::{
    CredentialSink, HistoryPage, HistoryQuery, RawEpisode, RawHistoryItem, RawShow, TokenEndpoint, TraktIds,
    UserProfile,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use tempfile::tempdir;

#[derive(Default)]
struct ScriptedHistory {
    pages: Mutex<VecDeque<Result<HistoryPage, SourceError>>>,
    session: Mutex<VecDeque<Result<UserProfile, SourceError>>>,
    queries: Mutex<Vec<(String, HistoryQuery)>>,
}

impl ScriptedHistory {
    fn new(pages: Vec<Result<HistoryPage, SourceError>>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into()),
            ..Self::default()
        })
    }

    fn with_session(pages: Vec<Result<HistoryPage, SourceError>>, session: Vec<Result<UserProfile, SourceError>>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into()),
            session: Mutex::new(session.into()),
            ..Self::default()
        })
    }

    fn queries(&self) -> Vec<(String, HistoryQuery)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryApi for ScriptedHistory {
    async fn history_page(&self, access_token: &str, query: &HistoryQuery) -> Result<HistoryPage, SourceError> {
        self.queries.lock().unwrap().push((access_token.to_string(), query.clone()));
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(HistoryPage::default()))
    }

    async fn current_user(&self, _access_token: &str) -> Result<UserProfile, SourceError> {
        self.session.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(UserProfile {
                username: "viewer".to_string(),
                name: None,
            })
        })
    }
}

/// Server-side history that honors the query window and paginates it
struct WindowedHistory {
    items: Vec<RawHistoryItem>,
    queries: Mutex<Vec<HistoryQuery>>,
}

impl WindowedHistory {
    /// `items` newest first, as the API returns them
    fn new(items: Vec<RawHistoryItem>) -> Arc<Self> {
        Arc::new(Self {
            items,
            queries: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl HistoryApi for WindowedHistory {
    async fn history_page(&self, _access_token: &str, query: &HistoryQuery) -> Result<HistoryPage, SourceError> {
        self.queries.lock().unwrap().push(query.clone());
        let window: Vec<RawHistoryItem> = self
            .items
            .iter()
            .filter(|item| {
                let watched = Watermark::parse(item.watched_at.as_deref().unwrap_or_default())
                    .unwrap()
                    .timestamp();
                query.start_at.map_or(true, |start| watched >= start) && query.end_at.map_or(true, |end| watched <= end)
            })
            .cloned()
            .collect();
        let limit = query.limit as usize;
        let page_count = ((window.len() + limit - 1) / limit).max(1) as u32;
        let items = window.into_iter().skip((query.page as usize - 1) * limit).take(limit).collect();
        Ok(HistoryPage {
            items,
            page_count: Some(page_count),
        })
    }

    async fn current_user(&self, _access_token: &str) -> Result<UserProfile, SourceError> {
        Ok(UserProfile {
            username: "viewer".to_string(),
            name: None,
        })
    }
}

struct Endpoint {
    fail: bool,
}

#[async_trait]
impl TokenEndpoint for Endpoint {
    async fn refresh(&self, _refresh_token: &str) -> Result<Credential, SourceError> {
        if self.fail {
            return Err(SourceError::Http {
                status: 400,
                body: "invalid_grant".to_string(),
            });
        }
        Ok(Credential::new("fresh".to_string(), "fresh-refresh".to_string()))
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    persisted: Arc<Mutex<Vec<Credential>>>,
}

impl CredentialSink for RecordingSink {
    fn persist(&mut self, credential: &Credential) -> anyhow::Result<()> {
        self.persisted.lock().unwrap().push(credential.clone());
        Ok(())
    }
}

fn at(hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
}

fn episode_item(number: u32, hour: u32) -> RawHistoryItem {
    RawHistoryItem {
        id: Some(u64::from(number) * 100),
        watched_at: Some(at(hour).to_rfc3339()),
        action: Some("watch".to_string()),
        item_type: Some("episode".to_string()),
        show: Some(RawShow {
            title: Some("Dark".to_string()),
            year: Some(2017),
            ids: TraktIds {
                trakt: Some(1),
                ..TraktIds::default()
            },
        }),
        episode: Some(RawEpisode {
            season: Some(1),
            number: Some(number),
            ..RawEpisode::default()
        }),
        ..RawHistoryItem::default()
    }
}

fn page(items: Vec<RawHistoryItem>, page_count: u32) -> Result<HistoryPage, SourceError> {
    Ok(HistoryPage {
        items,
        page_count: Some(page_count),
    })
}

struct Harness {
    dir: tempfile::TempDir,
    sink: RecordingSink,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: tempdir().unwrap(),
            sink: RecordingSink::default(),
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn log(&self) -> EventLog {
        EventLog::new(self.root().join("history.jsonl"), self.root().join("backups"))
    }

    fn cursor(&self) -> CursorStore {
        CursorStore::new(self.root().join("history.cursor"))
    }

    fn orchestrator(&self, history: Arc<dyn HistoryApi>, refresh_fails: bool) -> SyncOrchestrator {
        let credentials = CredentialManager::new(
            Credential::new("stale".to_string(), "refresh".to_string()),
            Box::new(Endpoint { fail: refresh_fails }),
            Box::new(self.sink.clone()),
        );
        SyncOrchestrator::new(history, credentials, self.log(), self.cursor())
            .with_retry_policy(RetryPolicy::immediate(2))
    }

    fn persisted(&self) -> usize {
        self.sink.persisted.lock().unwrap().len()
    }
}

#[tokio::test]
async fn test_first_run_appends_everything_and_sets_cursor() {
    let h = Harness::new();
    let history = ScriptedHistory::new(vec![
        page(vec![episode_item(2, 21), episode_item(1, 20)], 2),
        page(vec![episode_item(3, 22)], 2),
    ]);

    let mut sync = h.orchestrator(history.clone(), false);
    let report = sync.run().await.unwrap();

    assert_eq!(report.fetched, 3);
    assert_eq!(report.appended, 3);
    assert_eq!(report.pages, 2);
    assert_eq!(sync.phase(), SyncPhase::Idle);

    let times: Vec<_> = h.log().load().iter().map(WatchEvent::watched_at).collect();
    assert_eq!(times, vec![at(20), at(21), at(22)]);

    let cursor = h.cursor().load().unwrap();
    assert_eq!(cursor.timestamp(), at(22) - ChronoDuration::seconds(1));
    assert!(history.queries()[0].1.start_at.is_none());
}

#[tokio::test]
async fn test_rerun_only_appends_new_watches() {
    let h = Harness::new();
    let first = ScriptedHistory::new(vec![page(vec![episode_item(2, 21), episode_item(1, 20)], 1)]);
    h.orchestrator(first, false).run().await.unwrap();
    let stored = h.cursor().load().unwrap();

    // boundary item comes back because of the cursor margin
    let second = ScriptedHistory::new(vec![page(vec![episode_item(3, 22), episode_item(2, 21)], 1)]);
    let report = h.orchestrator(second.clone(), false).run().await.unwrap();

    assert_eq!(second.queries()[0].1.start_at, Some(stored.timestamp()));
    assert_eq!(report.appended, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(h.log().load().len(), 3);

    let third = ScriptedHistory::new(vec![page(vec![episode_item(3, 22)], 1)]);
    let report = h.orchestrator(third, false).run().await.unwrap();
    assert_eq!(report.appended, 0);
    assert_eq!(h.log().load().len(), 3);
}

#[tokio::test]
async fn test_unauthorized_refreshes_once_and_continues() {
    let h = Harness::new();
    let history = ScriptedHistory::new(vec![Err(SourceError::Unauthorized), page(vec![episode_item(1, 20)], 1)]);

    let report = h.orchestrator(history.clone(), false).run().await.unwrap();

    assert!(report.token_refreshed);
    assert_eq!(report.appended, 1);
    assert_eq!(h.persisted(), 1);
    let tokens: Vec<String> = history.queries().into_iter().map(|(token, _)| token).collect();
    assert_eq!(tokens, vec!["stale", "fresh"]);
}

#[tokio::test]
async fn test_failed_refresh_is_fatal_and_writes_nothing() {
    let h = Harness::new();
    let history = ScriptedHistory::new(vec![Err(SourceError::Unauthorized)]);

    let mut sync = h.orchestrator(history, true).with_options(RunOptions {
        verify_session: false,
        ..RunOptions::default()
    });
    let err = sync.run().await.unwrap_err();

    assert!(err.is_fatal_auth());
    assert_eq!(sync.phase(), SyncPhase::AuthFatal);
    assert!(!h.log().exists());
    assert!(h.cursor().load().is_none());
    assert_eq!(h.persisted(), 0);
}

#[tokio::test]
async fn test_session_check_detects_expired_credentials() {
    let h = Harness::new();
    let history = ScriptedHistory::with_session(vec![page(vec![episode_item(1, 20)], 1)], vec![Err(SourceError::Unauthorized)]);

    let mut sync = h.orchestrator(history.clone(), true);
    assert!(sync.run().await.unwrap_err().is_fatal_auth());
    assert!(history.queries().is_empty());
    assert!(!h.log().exists());
}

#[tokio::test]
async fn test_session_check_errors_are_not_fatal() {
    let h = Harness::new();
    let history = ScriptedHistory::with_session(
        vec![page(vec![episode_item(1, 20)], 1)],
        vec![Err(SourceError::Transient("timeout".to_string()))],
    );

    let report = h.orchestrator(history, false).run().await.unwrap();
    assert_eq!(report.appended, 1);
}

#[tokio::test]
async fn test_exhausted_retries_leave_state_untouched() {
    let h = Harness::new();
    let seed = ScriptedHistory::new(vec![page(vec![episode_item(1, 20)], 1)]);
    h.orchestrator(seed, false).run().await.unwrap();
    let log_before = std::fs::read_to_string(h.log().path()).unwrap();
    let cursor_before = h.cursor().load();

    let history = ScriptedHistory::new(vec![
        page(vec![episode_item(2, 21)], 2),
        Err(SourceError::Transient("503".to_string())),
        Err(SourceError::Transient("503".to_string())),
    ]);
    let mut sync = h.orchestrator(history, false);
    let err = sync.run().await.unwrap_err();

    assert!(matches!(err, SyncError::FetchFailed(SourceError::FetchFailed { attempts: 2, .. })));
    assert_eq!(sync.phase(), SyncPhase::FetchFatal);
    assert_eq!(std::fs::read_to_string(h.log().path()).unwrap(), log_before);
    assert_eq!(h.cursor().load(), cursor_before);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let h = Harness::new();
    let history = ScriptedHistory::new(vec![page(vec![episode_item(1, 20), episode_item(2, 21)], 1)]);

    let mut sync = h.orchestrator(history, false).with_options(RunOptions {
        dry_run: true,
        ..RunOptions::default()
    });
    let report = sync.run().await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.appended, 2);
    assert!(report.watermark_after.is_some());
    assert!(!h.log().exists());
    assert!(h.cursor().load().is_none());
}

#[tokio::test]
async fn test_start_override_replaces_cursor_for_fetch_only() {
    let h = Harness::new();
    let stored = Watermark(at(12));
    h.cursor().save(stored).unwrap();

    let history = ScriptedHistory::new(vec![page(vec![episode_item(1, 5)], 1)]);
    let mut sync = h.orchestrator(history.clone(), false).with_options(RunOptions {
        start_at: Some(Watermark(at(1))),
        ..RunOptions::default()
    });
    let report = sync.run().await.unwrap();

    assert_eq!(history.queries()[0].1.start_at, Some(at(1)));
    assert_eq!(report.appended, 1);
    // older than the stored cursor, which must not move back
    assert_eq!(h.cursor().load(), Some(stored));
}

#[tokio::test]
async fn test_unusable_entries_are_counted_as_skipped() {
    let h = Harness::new();
    let mut broken = episode_item(9, 23);
    broken.watched_at = None;
    let history = ScriptedHistory::new(vec![page(vec![episode_item(1, 20), broken], 1)]);

    let report = h.orchestrator(history, false).run().await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.appended, 1);
    assert_eq!(h.cursor().load().unwrap().timestamp(), at(20) - ChronoDuration::seconds(1));
}

#[test]
fn test_run_options_reject_bad_start_at() {
    let mut config = Config::default();
    config.start_at_override = Some("yesterday".to_string());
    assert!(matches!(RunOptions::from_config(&config), Err(SyncError::Config(_))));

    config.start_at_override = Some("2024-01-01T00:00:00Z".to_string());
    let options = RunOptions::from_config(&config).unwrap();
    assert_eq!(options.start_at, Some(Watermark(at(0))));
}

#[tokio::test]
async fn test_page_limited_runs_backfill_before_moving_cursor() {
    let h = Harness::new();
    // three pages of two, newest first
    let history = WindowedHistory::new((17..=22).rev().map(|hour| episode_item(hour - 16, hour)).collect());
    let options = RunOptions {
        page_size: 2,
        max_pages: 1,
        ..RunOptions::default()
    };
    let next_run = |h: &Harness| {
        h.orchestrator(history.clone(), false).with_options(options.clone())
    };

    let report = next_run(&h).run().await.unwrap();
    assert!(report.truncated);
    assert_eq!(report.appended, 2);
    assert_eq!(report.watermark_after, None);
    assert_eq!(report.backfill_until, Some(Watermark(at(21))));
    assert_eq!(h.cursor().load(), None);
    assert_eq!(
        h.cursor().load_backfill(),
        Some(Backfill {
            end_at: Watermark(at(21)),
            high_water: at(22),
        })
    );

    let mut appended = vec![report.appended];
    for _ in 0..4 {
        appended.push(next_run(&h).run().await.unwrap().appended);
    }
    assert_eq!(appended, vec![2, 1, 1, 1, 1]);

    let mut times: Vec<_> = h.log().load().iter().map(WatchEvent::watched_at).collect();
    times.sort();
    assert_eq!(times, (17..=22).map(at).collect::<Vec<_>>());

    // window closed: cursor jumps to the newest event seen while backfilling
    assert_eq!(h.cursor().load_backfill(), None);
    let cursor = h.cursor().load().unwrap();
    assert_eq!(cursor.timestamp(), at(22) - ChronoDuration::seconds(1));

    let report = next_run(&h).run().await.unwrap();
    assert!(!report.truncated);
    assert_eq!(report.appended, 0);
    let last = history.queries.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.start_at, Some(cursor.timestamp()));
    assert_eq!(last.end_at, None);
}

#[tokio::test]
async fn test_dry_run_does_not_record_backfill() {
    let h = Harness::new();
    let history = WindowedHistory::new((17..=22).rev().map(|hour| episode_item(hour - 16, hour)).collect());
    let options = RunOptions {
        page_size: 2,
        max_pages: 1,
        dry_run: true,
        ..RunOptions::default()
    };

    let report = h.orchestrator(history, false).with_options(options).run().await.unwrap();

    assert!(report.truncated);
    assert_eq!(report.backfill_until, Some(Watermark(at(21))));
    assert_eq!(h.cursor().load_backfill(), None);
    assert_eq!(h.cursor().load(), None);
}
