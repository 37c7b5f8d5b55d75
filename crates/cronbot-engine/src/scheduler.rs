//! The scheduler: serialized mutation surface plus the periodic due-task
//! scan.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cronbot_store::{CronDb, Result, StoreError};
use cronbot_types::{ExecutionReport, Job, OutputMode, Schedule, Task};

use crate::executor;
use crate::notify::{MessageFormat, Notifier};

/// Owns the job/task store behind a single exclusive lock and drives the
/// due-task scan.
///
/// Every operator mutation and the entire per-tick scan serialize on that
/// lock, so a scan can never race a concurrent create/delete/pause of the
/// record it is rewriting. Job subprocesses run inside the critical section;
/// a slow job therefore delays visibility of operator commands issued during
/// that tick.
pub struct Scheduler {
    store: Mutex<CronDb>,
    notifier: Arc<dyn Notifier>,
    timezone: Option<String>,
}

impl Scheduler {
    pub fn new(store: CronDb, notifier: Arc<dyn Notifier>, timezone: Option<String>) -> Self {
        Self {
            store: Mutex::new(store),
            notifier,
            timezone,
        }
    }

    /// Timezone used for cron evaluation and operator time input.
    pub fn timezone(&self) -> Option<&str> {
        self.timezone.as_deref()
    }

    // ─── Job registry surface ───────────────────────────────

    pub async fn create_job(&self, name: &str, command: Vec<String>) -> Result<Job> {
        self.store.lock().await.create_job(name, command, Default::default())
    }

    pub async fn get_job(&self, name: &str) -> Result<Job> {
        self.store.lock().await.get_job(name)
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.store.lock().await.list_jobs()
    }

    pub async fn set_job_env(&self, name: &str, key: &str, value: &str) -> Result<Job> {
        self.store.lock().await.set_job_env(name, key, value)
    }

    pub async fn delete_job(&self, name: &str) -> Result<()> {
        self.store.lock().await.delete_job(name)
    }

    /// Run a job immediately with full output, outside the schedule.
    pub async fn run_job_now(&self, name: &str) -> Result<ExecutionReport> {
        let job = self.store.lock().await.get_job(name)?;
        Ok(executor::run_job(&job, OutputMode::Full).await)
    }

    // ─── Task surface ───────────────────────────────────────

    /// Schedule a one-shot run of `job_name` at a fixed instant.
    pub async fn create_once_task(
        &self,
        job_name: &str,
        fire_at: DateTime<Utc>,
        output: OutputMode,
    ) -> Result<Task> {
        let store = self.store.lock().await;
        store.get_job(job_name)?;
        store.create_once(job_name, fire_at, output)
    }

    /// Schedule a cron-recurring run of `job_name`.
    pub async fn create_cron_task(
        &self,
        job_name: &str,
        expr: &str,
        output: OutputMode,
    ) -> Result<Task> {
        let store = self.store.lock().await;
        store.get_job(job_name)?;
        store.create_cron(job_name, expr, self.timezone.as_deref(), output)
    }

    pub async fn get_task(&self, id: i64) -> Result<Task> {
        self.store.lock().await.get_task(id)
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.store.lock().await.list_tasks()
    }

    pub async fn delete_task(&self, id: i64) -> Result<()> {
        self.store.lock().await.delete_task(id)
    }

    pub async fn set_task_output(&self, id: i64, output: OutputMode) -> Result<()> {
        self.store.lock().await.set_output(id, output)
    }

    pub async fn pause_task(&self, id: i64) -> Result<()> {
        self.store.lock().await.set_paused(id, true)
    }

    /// Resume a paused task. The fire time is recomputed so a long-paused
    /// cron task fires at its next future occurrence instead of replaying a
    /// backlog from the stale cached time.
    pub async fn resume_task(&self, id: i64) -> Result<()> {
        let store = self.store.lock().await;
        store.set_paused(id, false)?;
        if let Err(e) = store.reschedule(id, self.timezone.as_deref()) {
            warn!(task = id, "Reschedule on resume failed: {e}");
        }
        Ok(())
    }

    // ─── Due-task scan ──────────────────────────────────────

    /// One due-task scan. The store lock is held for the entire pass; the
    /// reference time is snapshotted once so all comparisons within the
    /// batch are consistent.
    pub async fn tick(&self) {
        let store = self.store.lock().await;
        let now = Utc::now();

        let tasks = match store.list_tasks() {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("Could not list tasks: {e}");
                return;
            }
        };

        for task in tasks {
            if !task.is_due(now) {
                continue;
            }
            self.fire(&store, task).await;
        }
    }

    /// Execute one due task and commit its next state. Failures are
    /// contained here so one task cannot abort the rest of the batch.
    async fn fire(&self, store: &CronDb, task: Task) {
        debug!(task = task.id, job = %task.job_name, "Task due");

        let job = match store.get_job(&task.job_name) {
            Ok(job) => job,
            Err(StoreError::JobNotFound(_)) => {
                // The referenced job is gone for good; a dangling task would
                // otherwise stay due forever.
                info!(task = task.id, job = %task.job_name, "Job no longer exists, unscheduling task");
                if let Err(e) = store.delete_task(task.id) {
                    warn!(task = task.id, "Could not unschedule task: {e}");
                }
                return;
            }
            Err(e) => {
                warn!(task = task.id, "Could not resolve job, will retry next tick: {e}");
                return;
            }
        };

        let report = executor::run_job(&job, task.output).await;
        if let Some(text) = &report.message {
            self.send(text).await;
        }

        match &task.schedule {
            Schedule::Once { .. } => {
                // One-shot tasks are removed regardless of the job's outcome.
                if let Err(e) = store.delete_task(task.id) {
                    warn!(task = task.id, "Could not remove one-shot task: {e}");
                }
            }
            Schedule::Cron { .. } => match store.reschedule(task.id, self.timezone.as_deref()) {
                Ok(true) => {
                    if let Ok(updated) = store.get_task(task.id) {
                        self.send(&format!(
                            "Job '{}' has been rescheduled for {}",
                            task.job_name,
                            updated.schedule.fire_at().to_rfc2822()
                        ))
                        .await;
                    }
                }
                Ok(false) => warn!(task = task.id, "Cron task had no expression to reschedule"),
                Err(e) => {
                    // The stale fire time keeps the task due, so it is
                    // retried every tick until the operator intervenes.
                    warn!(task = task.id, "Reschedule failed: {e}");
                    self.send(&format!("Task {} could not be rescheduled: {e}", task.id))
                        .await;
                }
            },
        }
    }

    async fn send(&self, text: &str) {
        if let Err(e) = self.notifier.notify(text, MessageFormat::Plain).await {
            warn!("Notification delivery failed: {e}");
        }
    }

    /// Scan at a fixed interval until cancelled.
    pub async fn run(self: Arc<Self>, tick_interval: Duration, cancel: CancellationToken) {
        info!("Scheduler started, scanning every {tick_interval:?}");
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.tick().await,
            }
        }

        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    struct MockNotifier {
        messages: std::sync::Mutex<Vec<String>>,
    }

    impl MockNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                messages: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn notify(&self, text: &str, _format: MessageFormat) -> anyhow::Result<()> {
            self.messages.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn scheduler() -> (Scheduler, Arc<MockNotifier>) {
        let notifier = MockNotifier::new();
        let store = CronDb::open_in_memory().unwrap();
        (Scheduler::new(store, notifier.clone(), None), notifier)
    }

    #[tokio::test]
    async fn test_one_shot_fires_and_is_removed() {
        let (sched, notifier) = scheduler();
        sched
            .create_job("ping", vec!["echo".into(), "ok".into()])
            .await
            .unwrap();
        sched
            .create_once_task(
                "ping",
                Utc::now() - ChronoDuration::seconds(1),
                OutputMode::Full,
            )
            .await
            .unwrap();

        sched.tick().await;

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("✅ "));
        assert!(messages[0].contains("ok"));
        assert!(sched.list_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_shot_removed_even_when_job_fails() {
        let (sched, notifier) = scheduler();
        sched
            .create_job("broken", vec!["false".into()])
            .await
            .unwrap();
        sched
            .create_once_task(
                "broken",
                Utc::now() - ChronoDuration::seconds(1),
                OutputMode::Result,
            )
            .await
            .unwrap();

        sched.tick().await;

        assert!(notifier.messages()[0].starts_with("❌ "));
        assert!(sched.list_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_future_task_left_untouched() {
        let (sched, notifier) = scheduler();
        sched
            .create_job("ping", vec!["echo".into(), "ok".into()])
            .await
            .unwrap();
        let task = sched
            .create_once_task(
                "ping",
                Utc::now() + ChronoDuration::hours(1),
                OutputMode::Full,
            )
            .await
            .unwrap();

        sched.tick().await;

        assert!(notifier.messages().is_empty());
        assert_eq!(sched.list_tasks().await.unwrap(), vec![task]);
    }

    #[tokio::test]
    async fn test_paused_task_is_skipped() {
        let (sched, notifier) = scheduler();
        sched
            .create_job("ping", vec!["echo".into(), "ok".into()])
            .await
            .unwrap();
        let task = sched
            .create_once_task(
                "ping",
                Utc::now() - ChronoDuration::hours(1),
                OutputMode::Full,
            )
            .await
            .unwrap();
        sched.pause_task(task.id).await.unwrap();

        sched.tick().await;

        assert!(notifier.messages().is_empty());
        assert_eq!(sched.list_tasks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_none_mode_success_sends_nothing() {
        let (sched, notifier) = scheduler();
        sched
            .create_job("quiet", vec!["echo".into(), "ok".into()])
            .await
            .unwrap();
        sched
            .create_once_task(
                "quiet",
                Utc::now() - ChronoDuration::seconds(1),
                OutputMode::None,
            )
            .await
            .unwrap();

        sched.tick().await;

        assert!(notifier.messages().is_empty());
        assert!(sched.list_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dangling_job_drops_task_silently() {
        let (sched, notifier) = scheduler();
        sched
            .create_job("ping", vec!["echo".into(), "ok".into()])
            .await
            .unwrap();
        sched
            .create_once_task(
                "ping",
                Utc::now() - ChronoDuration::seconds(1),
                OutputMode::Full,
            )
            .await
            .unwrap();
        sched.delete_job("ping").await.unwrap();

        sched.tick().await;

        // Dropped with a log-level report only, no operator notification.
        assert!(notifier.messages().is_empty());
        assert!(sched.list_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cron_task_fires_once_and_advances() {
        let (sched, notifier) = scheduler();
        sched
            .create_job("ping", vec!["echo".into(), "ok".into()])
            .await
            .unwrap();
        // Six-field expression firing every second.
        let task = sched
            .create_cron_task("ping", "* * * * * *", OutputMode::Result)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        sched.tick().await;

        let reports: Vec<String> = notifier
            .messages()
            .into_iter()
            .filter(|m| m.starts_with("✅ "))
            .collect();
        assert_eq!(reports.len(), 1);

        // Still present, with the fire time advanced past the tick.
        let updated = sched.get_task(task.id).await.unwrap();
        assert!(updated.schedule.fire_at() > task.schedule.fire_at());

        // An immediate second scan crosses no new boundary.
        sched.tick().await;
        let reports = notifier
            .messages()
            .into_iter()
            .filter(|m| m.starts_with("✅ "))
            .count();
        assert_eq!(reports, 1);
    }

    #[tokio::test]
    async fn test_resume_recomputes_fire_time() {
        let (sched, _) = scheduler();
        sched
            .create_job("ping", vec!["echo".into(), "ok".into()])
            .await
            .unwrap();
        let task = sched
            .create_cron_task("ping", "* * * * * *", OutputMode::Full)
            .await
            .unwrap();

        // Let the cached fire time fall into the past while paused.
        sched.pause_task(task.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let stale = sched.get_task(task.id).await.unwrap();
        assert!(stale.schedule.fire_at() <= Utc::now());

        sched.resume_task(task.id).await.unwrap();
        let resumed = sched.get_task(task.id).await.unwrap();
        assert!(!resumed.paused);
        assert!(resumed.schedule.fire_at() > stale.schedule.fire_at());
    }

    #[tokio::test]
    async fn test_task_creation_requires_job() {
        let (sched, _) = scheduler();
        assert!(matches!(
            sched
                .create_once_task("ghost", Utc::now(), OutputMode::Full)
                .await,
            Err(StoreError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_run_job_now() {
        let (sched, notifier) = scheduler();
        sched
            .create_job("ping", vec!["echo".into(), "ok".into()])
            .await
            .unwrap();

        let report = sched.run_job_now("ping").await.unwrap();
        assert!(report.succeeded);
        assert!(report.message.unwrap().contains("ok"));
        // Immediate runs report back through the command layer, not the
        // notifier.
        assert!(notifier.messages().is_empty());
    }
}
