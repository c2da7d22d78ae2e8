//! Background dispatch of accepted pull request events.
//!
//! Tasks go through a bounded queue to a pool of workers. The pool starts at
//! `min_workers` and grows up to `max_workers` when the queue is full; extra
//! workers run the task that overflowed the queue and exit after sitting idle
//! for `keep_alive`. When the queue is full and the pool is at its maximum,
//! the submitter runs the task itself, so no delivery is ever dropped.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::api::metrics::{
    record_caller_run, record_task_completed, record_task_failed, record_workers,
};
use crate::config::DispatchConfig;
use crate::webhook::WebhookEvent;

/// Work performed for each dispatched event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: WebhookEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Where a submitted task ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Placed on the queue for an existing worker.
    Queued,
    /// Queue was full; a new worker was started for it.
    Spawned,
    /// Queue full and pool at maximum (or shut down); ran on the submitter.
    RanOnCaller,
}

pub struct DispatchTask {
    pub id: Uuid,
    pub event: WebhookEvent,
    handler: Arc<dyn EventHandler>,
}

impl DispatchTask {
    pub fn new(event: WebhookEvent, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            handler,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub min_workers: usize,
    pub max_workers: usize,
    pub queue_capacity: usize,
    pub keep_alive: Duration,
}

impl From<&DispatchConfig> for DispatchSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            queue_capacity: config.queue_capacity,
            keep_alive: Duration::from_secs(config.keep_alive_seconds),
        }
    }
}

/// Point-in-time counters for the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub caller_runs: u64,
    pub workers: usize,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    caller_runs: AtomicU64,
    workers: AtomicUsize,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<DispatchTask>>>;

pub struct Dispatcher {
    sender: RwLock<Option<mpsc::Sender<DispatchTask>>>,
    receiver: SharedReceiver,
    tracker: TaskTracker,
    settings: DispatchSettings,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// Create the queue and start the core workers. Must be called from
    /// within a Tokio runtime.
    pub fn start(settings: DispatchSettings) -> Self {
        let min_workers = settings.min_workers.max(1);
        let max_workers = settings.max_workers.max(min_workers);
        let settings = DispatchSettings {
            min_workers,
            max_workers,
            queue_capacity: settings.queue_capacity.max(1),
            keep_alive: settings.keep_alive,
        };

        let (tx, rx) = mpsc::channel(settings.queue_capacity);
        let dispatcher = Self {
            sender: RwLock::new(Some(tx)),
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
            tracker: TaskTracker::new(),
            settings,
            counters: Arc::new(Counters::default()),
        };

        for _ in 0..dispatcher.settings.min_workers {
            dispatcher.counters.workers.fetch_add(1, Ordering::SeqCst);
            dispatcher.spawn_worker(None, None);
        }
        record_workers(dispatcher.settings.min_workers);

        tracing::info!(
            min_workers = dispatcher.settings.min_workers,
            max_workers = dispatcher.settings.max_workers,
            queue_capacity = dispatcher.settings.queue_capacity,
            "Dispatcher started"
        );
        dispatcher
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Hand an event to the pool.
    ///
    /// Returns once the task is queued or a worker has been started for it.
    /// Under saturation the task runs to completion before this returns.
    pub async fn submit(&self, event: WebhookEvent, handler: Arc<dyn EventHandler>) -> SubmitOutcome {
        let task = DispatchTask::new(event, handler);
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let sender = self.sender.read().clone();
        let Some(sender) = sender else {
            tracing::warn!(task_id = %task.id, "Dispatcher is shut down, running task on caller");
            return self.run_on_caller(task).await;
        };

        match sender.try_send(task) {
            Ok(()) => {
                tracing::debug!(state = %TaskState::Queued, "Task queued");
                SubmitOutcome::Queued
            }
            Err(TrySendError::Full(task)) => {
                if self.reserve_worker() {
                    tracing::debug!(task_id = %task.id, "Queue full, starting extra worker");
                    self.spawn_worker(Some(task), Some(self.settings.keep_alive));
                    SubmitOutcome::Spawned
                } else {
                    tracing::warn!(
                        task_id = %task.id,
                        pr_number = task.event.pull_request_number,
                        "Dispatch queue saturated, running task on caller"
                    );
                    self.run_on_caller(task).await
                }
            }
            Err(TrySendError::Closed(task)) => self.run_on_caller(task).await,
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            caller_runs: self.counters.caller_runs.load(Ordering::Relaxed),
            workers: self.counters.workers.load(Ordering::SeqCst),
        }
    }

    /// Stop queueing new work, let the workers drain what is already queued,
    /// and wait for them to exit.
    pub async fn shutdown(&self) {
        // Dropping the last sender closes the channel once it is empty
        let sender = self.sender.write().take();
        drop(sender);
        self.tracker.close();

        tracing::info!("Waiting for dispatch workers to drain the queue");
        self.tracker.wait().await;
        tracing::info!(stats = ?self.stats(), "Dispatcher stopped");
    }

    /// Run a task while the submitter waits for it. The task lives on the
    /// tracker, so it still finishes if the submitter is dropped mid-way.
    async fn run_on_caller(&self, task: DispatchTask) -> SubmitOutcome {
        self.counters.caller_runs.fetch_add(1, Ordering::Relaxed);
        record_caller_run();

        let task_id = task.id;
        let counters = self.counters.clone();
        let handle = self
            .tracker
            .spawn(async move { run_task(task, &counters).await });
        if let Err(e) = handle.await {
            tracing::error!(%task_id, "Caller-run task did not complete: {}", e);
        }
        SubmitOutcome::RanOnCaller
    }

    fn reserve_worker(&self) -> bool {
        match self
            .counters
            .workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < self.settings.max_workers).then_some(current + 1)
            }) {
            Ok(previous) => {
                record_workers(previous + 1);
                true
            }
            Err(_) => false,
        }
    }

    fn spawn_worker(&self, first: Option<DispatchTask>, idle_timeout: Option<Duration>) {
        let receiver = self.receiver.clone();
        let counters = self.counters.clone();
        self.tracker
            .spawn(worker_loop(receiver, counters, first, idle_timeout));
    }
}

async fn worker_loop(
    receiver: SharedReceiver,
    counters: Arc<Counters>,
    first: Option<DispatchTask>,
    idle_timeout: Option<Duration>,
) {
    if let Some(task) = first {
        run_task(task, &counters).await;
    }

    loop {
        let next = async {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };
        let task = match idle_timeout {
            None => next.await,
            Some(timeout) => match tokio::time::timeout(timeout, next).await {
                Ok(task) => task,
                Err(_) => {
                    tracing::debug!("Extra dispatch worker idle, exiting");
                    break;
                }
            },
        };

        match task {
            Some(task) => {
                run_task(task, &counters).await;
            }
            None => break,
        }
    }

    let workers = counters.workers.fetch_sub(1, Ordering::SeqCst) - 1;
    record_workers(workers);
}

/// Run one task, isolating errors and panics from the rest of the pool.
async fn run_task(task: DispatchTask, counters: &Counters) -> TaskState {
    let DispatchTask { id, event, handler } = task;
    let pr_number = event.pull_request_number;
    tracing::debug!(task_id = %id, pr_number, state = %TaskState::Running, "Task started");

    let result = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
    let state = match result {
        Ok(Ok(())) => {
            counters.completed.fetch_add(1, Ordering::Relaxed);
            record_task_completed();
            TaskState::Completed
        }
        Ok(Err(e)) => {
            tracing::error!(task_id = %id, pr_number, "Task failed: {:#}", e);
            counters.failed.fetch_add(1, Ordering::Relaxed);
            record_task_failed();
            TaskState::Failed
        }
        Err(panic) => {
            tracing::error!(
                task_id = %id,
                pr_number,
                "Task panicked: {}",
                panic_message(&*panic)
            );
            counters.failed.fetch_add(1, Ordering::Relaxed);
            record_task_failed();
            TaskState::Failed
        }
    };

    tracing::debug!(task_id = %id, pr_number, state = %state, "Task finished");
    state
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_event;
    use tokio::sync::Notify;

    /// Handler that blocks on PR #1 until released, takes a while on PR #99,
    /// and records every PR it ran.
    #[derive(Default)]
    struct GatedHandler {
        started: Notify,
        release: Notify,
        handled: parking_lot::Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl EventHandler for GatedHandler {
        async fn handle(&self, event: WebhookEvent) -> anyhow::Result<()> {
            if event.pull_request_number == 1 {
                self.started.notify_one();
                self.release.notified().await;
            }
            if event.pull_request_number == 99 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            self.handled.lock().push(event.pull_request_number);
            Ok(())
        }
    }

    struct FlakyHandler;

    #[async_trait]
    impl EventHandler for FlakyHandler {
        async fn handle(&self, event: WebhookEvent) -> anyhow::Result<()> {
            match event.pull_request_number {
                1 => anyhow::bail!("GitHub API error: 502 - Bad Gateway"),
                2 => panic!("handler bug"),
                _ => Ok(()),
            }
        }
    }

    fn settings(min: usize, max: usize, capacity: usize) -> DispatchSettings {
        DispatchSettings {
            min_workers: min,
            max_workers: max,
            queue_capacity: capacity,
            keep_alive: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_queued_tasks_complete_on_shutdown() {
        let dispatcher = Dispatcher::start(settings(2, 2, 10));
        let handler = Arc::new(GatedHandler::default());

        for n in 10..15 {
            let outcome = dispatcher.submit(sample_event(n), handler.clone()).await;
            assert_eq!(outcome, SubmitOutcome::Queued);
        }
        dispatcher.shutdown().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.completed, 5);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.workers, 0);
        let mut handled = handler.handled.lock().clone();
        handled.sort_unstable();
        assert_eq!(handled, vec![10, 11, 12, 13, 14]);
    }

    #[tokio::test]
    async fn test_saturated_pool_runs_on_caller() {
        let dispatcher = Dispatcher::start(settings(1, 1, 1));
        let handler = Arc::new(GatedHandler::default());

        // Occupy the only worker
        assert_eq!(
            dispatcher.submit(sample_event(1), handler.clone()).await,
            SubmitOutcome::Queued
        );
        handler.started.notified().await;

        // Fill the queue
        assert_eq!(
            dispatcher.submit(sample_event(2), handler.clone()).await,
            SubmitOutcome::Queued
        );

        // Nothing left: the submitter runs it to completion
        assert_eq!(
            dispatcher.submit(sample_event(3), handler.clone()).await,
            SubmitOutcome::RanOnCaller
        );
        assert_eq!(*handler.handled.lock(), vec![3]);

        handler.release.notify_one();
        dispatcher.shutdown().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.caller_runs, 1);
    }

    #[tokio::test]
    async fn test_caller_run_survives_dropped_submitter() {
        let dispatcher = Dispatcher::start(settings(1, 1, 1));
        let handler = Arc::new(GatedHandler::default());

        dispatcher.submit(sample_event(1), handler.clone()).await;
        handler.started.notified().await;
        dispatcher.submit(sample_event(2), handler.clone()).await;

        // The request is abandoned while its task is still running inline
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            dispatcher.submit(sample_event(99), handler.clone()),
        )
        .await;
        assert!(abandoned.is_err());

        handler.release.notify_one();
        dispatcher.shutdown().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.completed + stats.failed, stats.submitted);
        assert_eq!(stats.caller_runs, 1);
        assert!(handler.handled.lock().contains(&99));
    }

    #[tokio::test]
    async fn test_pool_grows_when_queue_full() {
        let dispatcher = Dispatcher::start(settings(1, 2, 1));
        let handler = Arc::new(GatedHandler::default());

        dispatcher.submit(sample_event(1), handler.clone()).await;
        handler.started.notified().await;
        dispatcher.submit(sample_event(2), handler.clone()).await;

        let outcome = dispatcher.submit(sample_event(3), handler.clone()).await;
        assert_eq!(outcome, SubmitOutcome::Spawned);
        assert_eq!(dispatcher.stats().workers, 2);
        assert_eq!(dispatcher.stats().caller_runs, 0);

        handler.release.notify_one();
        dispatcher.shutdown().await;
        assert_eq!(dispatcher.stats().completed, 3);
    }

    #[tokio::test]
    async fn test_extra_worker_exits_after_keep_alive() {
        let mut s = settings(1, 2, 1);
        s.keep_alive = Duration::from_millis(50);
        let dispatcher = Dispatcher::start(s);
        let handler = Arc::new(GatedHandler::default());

        dispatcher.submit(sample_event(1), handler.clone()).await;
        handler.started.notified().await;
        dispatcher.submit(sample_event(2), handler.clone()).await;
        assert_eq!(
            dispatcher.submit(sample_event(3), handler.clone()).await,
            SubmitOutcome::Spawned
        );

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(dispatcher.stats().workers, 1);

        handler.release.notify_one();
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_isolated() {
        let dispatcher = Dispatcher::start(settings(1, 1, 10));
        let handler: Arc<dyn EventHandler> = Arc::new(FlakyHandler);

        for n in 1..=3 {
            dispatcher.submit(sample_event(n), handler.clone()).await;
        }
        dispatcher.shutdown().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 2);
    }

    #[test]
    fn test_outcomes_are_exported_as_metrics() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let dispatcher = Dispatcher::start(settings(1, 1, 10));
                let handler: Arc<dyn EventHandler> = Arc::new(FlakyHandler);
                for n in 1..=3 {
                    dispatcher.submit(sample_event(n), handler.clone()).await;
                }
                dispatcher.shutdown().await;
            });
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"dispatch_tasks_total{outcome="completed"} 1"#));
        assert!(rendered.contains(r#"dispatch_tasks_total{outcome="failed"} 2"#));
        assert!(rendered.contains("dispatch_workers 0"));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_runs_on_caller() {
        let dispatcher = Dispatcher::start(settings(1, 1, 1));
        dispatcher.shutdown().await;

        let handler = Arc::new(GatedHandler::default());
        let outcome = dispatcher.submit(sample_event(5), handler.clone()).await;
        assert_eq!(outcome, SubmitOutcome::RanOnCaller);
        assert_eq!(*handler.handled.lock(), vec![5]);
    }

    #[tokio::test]
    async fn test_settings_are_normalized() {
        let dispatcher = Dispatcher::start(settings(0, 0, 0));
        assert_eq!(dispatcher.settings().min_workers, 1);
        assert_eq!(dispatcher.settings().max_workers, 1);
        assert_eq!(dispatcher.settings().queue_capacity, 1);
        dispatcher.shutdown().await;
    }

    #[test]
    fn test_settings_from_config() {
        let s = DispatchSettings::from(&DispatchConfig::default());
        assert_eq!(s.min_workers, 5);
        assert_eq!(s.max_workers, 10);
        assert_eq!(s.queue_capacity, 100);
        assert_eq!(s.keep_alive, Duration::from_secs(60));
    }
}
