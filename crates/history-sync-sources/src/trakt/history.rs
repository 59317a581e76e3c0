use history_sync_models::Watermark;
use std::sync::Arc;
use tracing::{debug, info, warn};
use crate::error::SourceError;
use crate::retry::RetryPolicy;
use crate::traits::HistoryApi;
use crate::trakt::api::{HistoryPage, HistoryQuery, RawHistoryItem};
use crate::trakt::auth::CredentialManager;

/// Builds paginated history reads starting at a watermark
#[derive(Clone)]
pub struct HistoryFetcher {
    api: Arc<dyn HistoryApi>,
    policy: RetryPolicy,
    page_size: u32,
    max_pages: u32,
}

impl HistoryFetcher {
    pub fn new(api: Arc<dyn HistoryApi>, policy: RetryPolicy, page_size: u32, max_pages: u32) -> Self {
        Self {
            api,
            policy,
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
        }
    }

    /// Lazy page sequence for everything watched at or after `watermark`.
    ///
    /// The sequence is single-pass; calling this again with the same
    /// watermark starts over from page one.
    pub fn fetch_since<'c>(&self, watermark: Option<Watermark>, credentials: &'c mut CredentialManager) -> HistoryPages<'c> {
        self.fetch_window(watermark, None, credentials)
    }

    /// Like [`fetch_since`](Self::fetch_since), bounded above by `end_at`
    pub fn fetch_window<'c>(
        &self,
        start_at: Option<Watermark>,
        end_at: Option<Watermark>,
        credentials: &'c mut CredentialManager,
    ) -> HistoryPages<'c> {
        HistoryPages {
            api: self.api.clone(),
            policy: self.policy.clone(),
            credentials,
            start_at,
            end_at,
            page: 1,
            page_size: self.page_size,
            max_pages: self.max_pages,
            finished: false,
            truncated: false,
        }
    }
}

pub struct HistoryPages<'c> {
    api: Arc<dyn HistoryApi>,
    policy: RetryPolicy,
    credentials: &'c mut CredentialManager,
    start_at: Option<Watermark>,
    end_at: Option<Watermark>,
    page: u32,
    page_size: u32,
    max_pages: u32,
    finished: bool,
    truncated: bool,
}

impl<'c> HistoryPages<'c> {
    /// Next non-empty page, or `None` once the sequence is exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<RawHistoryItem>>, SourceError> {
        if self.finished {
            return Ok(None);
        }
        if self.page > self.max_pages {
            self.finished = true;
            self.truncated = true;
            info!(max_pages = self.max_pages, "Reached page limit, remaining history is left for the next run");
            return Ok(None);
        }

        let query = HistoryQuery {
            start_at: self.start_at.map(|w| w.timestamp()),
            end_at: self.end_at.map(|w| w.timestamp()),
            page: self.page,
            limit: self.page_size,
        };
        let HistoryPage { items, page_count } = self.request(&query).await?;

        if items.is_empty() {
            self.finished = true;
            return Ok(None);
        }
        if page_count.map_or(false, |count| self.page >= count) {
            self.finished = true;
        }
        self.page += 1;
        Ok(Some(items))
    }

    /// Drain the remaining pages into one batch
    pub async fn collect_all(&mut self) -> Result<Vec<RawHistoryItem>, SourceError> {
        let mut all = Vec::new();
        while let Some(items) = self.next_page().await? {
            all.extend(items);
        }
        Ok(all)
    }

    /// Pages requested so far
    pub fn pages_requested(&self) -> u32 {
        self.page - 1
    }

    /// Stopped at `max_pages` with older history still on the server
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    async fn request(&mut self, query: &HistoryQuery) -> Result<HistoryPage, SourceError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let api = &*self.api;
            let result = self
                .credentials
                .authorize(move |token| async move { api.history_page(&token, query).await })
                .await;

            match result {
                Ok(page) => {
                    if attempts > 1 {
                        debug!(page = query.page, attempt = attempts, "History request succeeded after retry");
                    }
                    return Ok(page);
                }
                Err(err) if self.policy.should_retry(&err, attempts) => {
                    let delay = self.policy.delay_for(&err, attempts - 1);
                    warn!(
                        page = query.page,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "History request failed, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(self.policy.give_up(err, attempts)),
            }
        }
    }
}
