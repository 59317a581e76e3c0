use std::collections::HashMap;
use tracing::{info, warn};

/// Progress tracker for passes over a batch of events
/// Provides periodic progress updates and final summaries to reduce log noise
pub struct ProgressTracker {
    total: usize,
    enriched: usize,
    unchanged: usize,
    failed: usize,
    start_time: std::time::Instant,
    progress_interval: usize,
    last_progress_log: usize,
    error_counts: HashMap<String, usize>,
}

impl ProgressTracker {
    /// # Arguments
    /// * `total` - Total number of items to process
    /// * `progress_interval` - Log progress every N items
    pub fn new(total: usize, progress_interval: usize) -> Self {
        // Small batches finish instantly; skip the start line for them
        if total > 10 {
            info!("Starting operation: {} items to process", total);
        }
        Self {
            total,
            enriched: 0,
            unchanged: 0,
            failed: 0,
            start_time: std::time::Instant::now(),
            progress_interval: progress_interval.max(1),
            last_progress_log: 0,
            error_counts: HashMap::new(),
        }
    }

    /// An item gained at least one field
    pub fn record_enriched(&mut self) {
        self.enriched += 1;
    }

    /// Nothing could be added to the item
    pub fn record_unchanged(&mut self) {
        self.unchanged += 1;
    }

    /// One lookup failed; grouped by category in the summary
    pub fn record_failed_with_error(&mut self, error_category: &str) {
        self.failed += 1;
        *self.error_counts.entry(error_category.to_string()).or_insert(0) += 1;
    }

    pub fn enriched(&self) -> usize {
        self.enriched
    }

    pub fn unchanged(&self) -> usize {
        self.unchanged
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Call after each item with its 1-based position
    pub fn log_progress(&mut self, current: usize) {
        if current - self.last_progress_log >= self.progress_interval || current == self.total {
            let elapsed = self.start_time.elapsed();
            // Cache-only passes are too fast to be worth reporting
            if elapsed.as_secs_f64() < 0.5 && current < self.total {
                return;
            }
            let rate = if elapsed.as_secs_f64() > 0.0 {
                current as f64 / elapsed.as_secs_f64()
            } else {
                0.0
            };

            info!(
                "Progress: {}/{} ({:.1} items/sec) | Enriched: {} | Unchanged: {} | Failed lookups: {}",
                current, self.total, rate, self.enriched, self.unchanged, self.failed
            );
            self.last_progress_log = current;
        }
    }

    /// Log final summary of the operation
    pub fn log_summary(&self, operation_name: &str) {
        let elapsed = self.start_time.elapsed();
        if self.failed > 0 {
            warn!(
                "{} completed: {} total in {:.1}s | Enriched: {} | Unchanged: {} | Failed lookups: {}",
                operation_name, self.total, elapsed.as_secs_f64(), self.enriched, self.unchanged, self.failed
            );

            let mut error_entries: Vec<_> = self.error_counts.iter().collect();
            error_entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            let error_summary: Vec<String> = error_entries
                .iter()
                .map(|(category, count)| format!("{}: {}", category, count))
                .collect();
            info!("Error breakdown: {}", error_summary.join(", "));
        } else if self.total > 0 {
            info!(
                "{} completed: {} total in {:.1}s | Enriched: {} | Unchanged: {}",
                operation_name, self.total, elapsed.as_secs_f64(), self.enriched, self.unchanged
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut tracker = ProgressTracker::new(3, 50);
        tracker.record_enriched();
        tracker.record_unchanged();
        tracker.record_failed_with_error("rate_limited");
        tracker.record_failed_with_error("rate_limited");
        for i in 1..=3 {
            tracker.log_progress(i);
        }
        tracker.log_summary("Enrichment");
        assert_eq!(tracker.enriched(), 1);
        assert_eq!(tracker.unchanged(), 1);
        assert_eq!(tracker.failed(), 2);
    }
}
