//! Periodic freshness sweeps and retention cleanup.
//!
//! [`Scheduler::start`] spawns two timer loops: a daily sweep over every
//! topic's active mapping and a weekly prune of old content versions. Both can
//! also be run on demand. [`Scheduler::stop`] cancels the loops and waits for
//! them to exit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Datelike, Days, NaiveTime, Utc, Weekday};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use freshdocs_shared::{FreshDocsError, MappingId, Result, SchedulerConfig, TopicId};
use freshdocs_storage::Storage;

use crate::service::{ContentService, RefreshOutcome};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// A topic whose refresh failed during a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub topic_id: TopicId,
    pub mapping_id: MappingId,
    pub error: String,
}

/// Tally of one freshness sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Targets considered (including those skipped as recently checked).
    pub total: usize,
    pub regenerated: usize,
    pub unchanged: usize,
    pub in_progress: usize,
    pub skipped_recent: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SweepFailure>,
    pub elapsed_ms: u64,
}

/// Result of one retention cleanup.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub keep: u32,
    pub deleted: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Owns the sweep and cleanup cadence for one process.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    running: Mutex<Option<Running>>,
}

/// Loops spawned by one `start`; each start gets its own token.
struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

struct SchedulerInner {
    service: Arc<ContentService>,
    storage: Arc<Storage>,
    config: SchedulerConfig,
    sweeping: AtomicBool,
}

impl Scheduler {
    pub fn new(service: Arc<ContentService>, storage: Arc<Storage>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                service,
                storage,
                config,
                sweeping: AtomicBool::new(false),
            }),
            running: Mutex::new(None),
        }
    }

    /// Spawn the sweep and cleanup loops. Calling `start` twice is a no-op;
    /// a stopped scheduler can be started again.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("scheduler already started");
            return;
        }
        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(2);

        let config = &self.inner.config;
        info!(
            sweep_hour = config.sweep_hour,
            cleanup_weekday = %config.cleanup_weekday,
            cleanup_hour = config.cleanup_hour,
            concurrency = config.concurrency,
            "scheduler started"
        );

        let inner = self.inner.clone();
        let token = cancel.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                let next = next_sweep_at(Utc::now(), inner.config.sweep_hour);
                debug!(%next, "next sweep scheduled");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep_until(next) => {}
                }
                if let Err(e) = inner.sweep().await {
                    warn!(error = %e, "scheduled sweep failed");
                }
            }
        }));

        let inner = self.inner.clone();
        let token = cancel.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                let next = next_cleanup_at(
                    Utc::now(),
                    inner.config.cleanup_weekday,
                    inner.config.cleanup_hour,
                );
                debug!(%next, "next cleanup scheduled");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep_until(next) => {}
                }
                if let Err(e) = inner.cleanup(inner.config.keep_versions).await {
                    warn!(error = %e, "scheduled cleanup failed");
                }
            }
        }));

        *running = Some(Running { cancel, tasks });
    }

    /// Cancel both loops and wait for them to finish. A sweep already running
    /// completes first.
    pub async fn stop(&self) {
        let Some(Running { cancel, tasks }) = self.running.lock().await.take() else {
            debug!("scheduler not running");
            return;
        };
        cancel.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "scheduler task ended abnormally");
            }
        }
        info!("scheduler stopped");
    }

    /// When the sweep loop fires next after `now`.
    pub fn next_sweep(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        next_sweep_at(now, self.inner.config.sweep_hour)
    }

    /// When the cleanup loop fires next after `now`.
    pub fn next_cleanup(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        next_cleanup_at(
            now,
            self.inner.config.cleanup_weekday,
            self.inner.config.cleanup_hour,
        )
    }

    /// Run a sweep now. Fails with [`FreshDocsError::SweepInProgress`] while
    /// another sweep is running.
    pub async fn trigger_sweep_now(&self) -> Result<SweepReport> {
        self.inner.sweep().await
    }

    /// Prune old versions now, keeping `keep` per key (or the configured count).
    pub async fn run_cleanup(&self, keep: Option<u32>) -> Result<CleanupReport> {
        self.inner
            .cleanup(keep.unwrap_or(self.inner.config.keep_versions))
            .await
    }
}

/// Clears the in-flight sweep flag when dropped.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SchedulerInner {
    #[instrument(skip_all)]
    async fn sweep(&self) -> Result<SweepReport> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FreshDocsError::SweepInProgress);
        }
        let _guard = SweepGuard(&self.sweeping);

        match self.run_sweep().await {
            Ok(report) => {
                info!(
                    total = report.total,
                    regenerated = report.regenerated,
                    unchanged = report.unchanged,
                    in_progress = report.in_progress,
                    skipped_recent = report.skipped_recent,
                    failed = report.failed,
                    elapsed_ms = report.elapsed_ms,
                    "sweep complete"
                );
                let details = serde_json::to_value(&report)
                    .map_err(|e| FreshDocsError::Storage(format!("encode sweep report: {e}")))?;
                self.storage
                    .insert_run_log("sweep", "completed", Some(&details), None)
                    .await?;
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "sweep aborted");
                log_failure(&self.storage, "sweep", &e).await;
                Err(e)
            }
        }
    }

    async fn run_sweep(&self) -> Result<SweepReport> {
        let started = Instant::now();
        let recheck_after = chrono::Duration::from_std(self.config.recheck_after)
            .map_err(|e| FreshDocsError::config(format!("invalid recheck interval: {e}")))?;

        let targets = self.storage.list_sweep_targets().await?;
        let now = Utc::now();
        let mut report = SweepReport {
            total: targets.len(),
            ..SweepReport::default()
        };

        let (recent, due): (Vec<_>, Vec<_>) = targets
            .into_iter()
            .partition(|t| t.last_scraped_at.is_some_and(|at| now - at < recheck_after));
        report.skipped_recent = recent.len();
        info!(due = due.len(), skipped_recent = recent.len(), "sweep started");

        let service = &self.service;
        let results: Vec<_> = stream::iter(due)
            .map(|target| async move {
                let outcome = service
                    .refresh(target.topic_id, target.mapping_id, false)
                    .await;
                (target, outcome)
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        for (target, outcome) in results {
            match outcome {
                Ok(RefreshOutcome::Regenerated { .. }) => report.regenerated += 1,
                Ok(RefreshOutcome::Unchanged { .. }) => report.unchanged += 1,
                Ok(RefreshOutcome::InProgress { .. }) => report.in_progress += 1,
                Err(e) => {
                    warn!(
                        topic_id = %target.topic_id,
                        topic = %target.topic_title,
                        url = %target.url,
                        error = %e,
                        "topic refresh failed during sweep"
                    );
                    report.failed += 1;
                    report.failures.push(SweepFailure {
                        topic_id: target.topic_id,
                        mapping_id: target.mapping_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(report)
    }

    async fn cleanup(&self, keep: u32) -> Result<CleanupReport> {
        cleanup_versions(&self.storage, keep).await
    }
}

/// Prune old versions, keeping `keep` per key, and record the run. Failures
/// are recorded with status `error` before being returned.
#[instrument(skip_all, fields(keep))]
pub async fn cleanup_versions(storage: &Storage, keep: u32) -> Result<CleanupReport> {
    match storage.prune_old_versions(keep).await {
        Ok(deleted) => {
            let report = CleanupReport {
                keep: keep.max(1),
                deleted,
            };
            info!(deleted, keep = report.keep, "cleanup complete");
            let details = serde_json::to_value(&report)
                .map_err(|e| FreshDocsError::Storage(format!("encode cleanup report: {e}")))?;
            storage
                .insert_run_log("cleanup", "completed", Some(&details), None)
                .await?;
            Ok(report)
        }
        Err(e) => {
            warn!(error = %e, "cleanup failed");
            log_failure(storage, "cleanup", &e).await;
            Err(e)
        }
    }
}

async fn log_failure(storage: &Storage, kind: &str, error: &FreshDocsError) {
    let message = error.to_string();
    if let Err(e) = storage
        .insert_run_log(kind, "error", None, Some(&message))
        .await
    {
        warn!(kind, error = %e, "failed to record run failure");
    }
}

// ---------------------------------------------------------------------------
// Cadence
// ---------------------------------------------------------------------------

/// The next `hour:00` UTC strictly after `now`.
pub fn next_sweep_at(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let today = at_hour(now, hour);
    if today > now {
        today
    } else {
        today + Days::new(1)
    }
}

/// The next `weekday` at `hour:00` UTC strictly after `now`.
pub fn next_cleanup_at(now: DateTime<Utc>, weekday: Weekday, hour: u32) -> DateTime<Utc> {
    let ahead = (7 + weekday.num_days_from_monday() - now.weekday().num_days_from_monday()) % 7;
    let candidate = at_hour(now, hour) + Days::new(u64::from(ahead));
    if candidate > now {
        candidate
    } else {
        candidate + Days::new(7)
    }
}

fn at_hour(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    now.date_naive().and_time(time).and_utc()
}

async fn sleep_until(at: DateTime<Utc>) {
    let wait = (at - Utc::now()).to_std().unwrap_or_default();
    tokio::time::sleep(wait).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::testutil::{Harness, docs_text};

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            sweep_hour: 0,
            cleanup_weekday: Weekday::Sun,
            cleanup_hour: 1,
            concurrency: 2,
            recheck_after: Duration::from_secs(24 * 3600),
            keep_versions: 3,
        }
    }

    fn scheduler(h: &Harness, config: SchedulerConfig) -> Scheduler {
        Scheduler::new(h.service.clone(), h.storage.clone(), config)
    }

    fn utc(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, hh, mm, 0).single().expect("valid time")
    }

    #[test]
    fn next_sweep_is_strictly_in_the_future() {
        // 2026-10-16 is a Friday.
        let now = utc(2026, 10, 16, 10, 30);
        assert_eq!(next_sweep_at(now, 0), utc(2026, 10, 17, 0, 0));
        assert_eq!(next_sweep_at(now, 12), utc(2026, 10, 16, 12, 0));
        assert_eq!(next_sweep_at(utc(2026, 10, 16, 12, 0), 12), utc(2026, 10, 17, 12, 0));
    }

    #[test]
    fn next_cleanup_lands_on_the_configured_weekday() {
        let friday = utc(2026, 10, 16, 10, 30);
        assert_eq!(next_cleanup_at(friday, Weekday::Sun, 1), utc(2026, 10, 18, 1, 0));
        assert_eq!(next_cleanup_at(friday, Weekday::Fri, 11), utc(2026, 10, 16, 11, 0));
        assert_eq!(next_cleanup_at(friday, Weekday::Fri, 9), utc(2026, 10, 23, 9, 0));

        let sunday_after = utc(2026, 10, 18, 2, 0);
        assert_eq!(next_cleanup_at(sunday_after, Weekday::Sun, 1), utc(2026, 10, 25, 1, 0));
    }

    #[tokio::test]
    async fn sweep_tallies_outcomes_and_logs_the_run() {
        let h = Harness::with_defaults().await;
        h.source.set(&h.url, &docs_text("Ownership moves values"));

        let course = h
            .storage
            .get_topic(h.topic)
            .await
            .expect("query")
            .expect("topic")
            .course_id;
        let broken = h
            .storage
            .insert_topic(course, "Borrowing", None, 2)
            .await
            .expect("topic");
        let broken_url = "https://docs.example.com/borrowing";
        h.storage
            .insert_mapping(broken, broken_url, 0, true)
            .await
            .expect("mapping");
        h.source.fail(broken_url, "HTTP 404");

        let scheduler = scheduler(&h, config());
        let report = scheduler.trigger_sweep_now().await.expect("sweep");
        assert_eq!(report.total, 2);
        assert_eq!(report.regenerated, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].topic_id, broken);
        assert!(report.failures[0].error.contains("HTTP 404"));

        let second = scheduler.trigger_sweep_now().await.expect("second sweep");
        assert_eq!(second.skipped_recent, 1);
        assert_eq!(second.failed, 1);
        assert_eq!(h.completion.calls(), 1);

        let logs = h.storage.list_run_logs(10).await.expect("logs");
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.kind == "sweep" && l.status == "completed"));
        let details = logs[0].details.as_ref().expect("details");
        assert_eq!(details["skipped_recent"], 1);
    }

    #[tokio::test]
    async fn zero_recheck_interval_revisits_every_target() {
        let h = Harness::with_defaults().await;
        h.source.set(&h.url, &docs_text("Structs group related data"));
        let scheduler = scheduler(
            &h,
            SchedulerConfig {
                recheck_after: Duration::ZERO,
                ..config()
            },
        );

        scheduler.trigger_sweep_now().await.expect("first");
        let second = scheduler.trigger_sweep_now().await.expect("second");
        assert_eq!(second.skipped_recent, 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(h.completion.calls(), 1);
    }

    #[tokio::test]
    async fn overlapping_sweep_is_rejected() {
        let h = Harness::with_defaults().await;
        let scheduler = scheduler(&h, config());

        scheduler.inner.sweeping.store(true, Ordering::SeqCst);
        let err = scheduler.trigger_sweep_now().await.expect_err("overlap");
        assert!(matches!(err, FreshDocsError::SweepInProgress));

        scheduler.inner.sweeping.store(false, Ordering::SeqCst);
        scheduler.trigger_sweep_now().await.expect("sweep after release");
        assert!(!scheduler.inner.sweeping.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cleanup_keeps_three_most_recent_versions() {
        let h = Harness::with_defaults().await;
        h.source.set(&h.url, &docs_text("Vectors grow on the heap"));
        for _ in 0..5 {
            h.service
                .force_update_topic(h.topic, true)
                .await
                .expect("forced refresh");
        }
        let before = h.storage.list_versions(h.topic, h.mapping).await.expect("versions");
        assert_eq!(before.len(), 5);

        let scheduler = scheduler(&h, config());
        let report = scheduler.run_cleanup(None).await.expect("cleanup");
        assert_eq!(report.deleted, 2);
        assert_eq!(report.keep, 3);

        let after = h.storage.list_versions(h.topic, h.mapping).await.expect("versions");
        let kept: Vec<_> = after.iter().map(|r| r.id.as_str()).collect();
        let newest: Vec<_> = before.iter().take(3).map(|r| r.id.as_str()).collect();
        assert_eq!(kept, newest);

        let logs = h.storage.list_run_logs(1).await.expect("logs");
        assert_eq!(logs[0].kind, "cleanup");
        assert_eq!(logs[0].details.as_ref().expect("details")["deleted"], 2);
    }

    #[tokio::test]
    async fn start_and_stop() {
        let h = Harness::with_defaults().await;
        let scheduler = scheduler(&h, config());

        scheduler.start().await;
        scheduler.start().await;
        assert_eq!(
            scheduler.running.lock().await.as_ref().map(|r| r.tasks.len()),
            Some(2)
        );

        tokio::time::timeout(Duration::from_secs(2), scheduler.stop())
            .await
            .expect("stop completes promptly");
        assert!(scheduler.running.lock().await.is_none());
    }

    #[tokio::test]
    async fn restart_after_stop_runs_live_loops() {
        let h = Harness::with_defaults().await;
        let scheduler = scheduler(&h, config());

        scheduler.start().await;
        scheduler.stop().await;
        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        {
            let running = scheduler.running.lock().await;
            let running = running.as_ref().expect("restarted");
            assert!(!running.cancel.is_cancelled());
            assert!(running.tasks.iter().all(|t| !t.is_finished()));
        }
        scheduler.stop().await;
    }
}
