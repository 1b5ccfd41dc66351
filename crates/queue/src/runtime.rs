//! The queue runtime: one worker pool per queue plus the recurring-trigger
//! scheduler, all sharing a [`QueueStore`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::{health, metrics};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::entry::{FailureDisposition, JobEntry, JobHandle, JobOpts, QueueName};
use crate::error::QueueError;
use crate::outcome::{JobContext, JobFailure, JobHandler};
use crate::report::{entity_ref, FailureKind, FailureReporter, PermanentFailure};
use crate::schedule::Schedule;
use crate::store::{QueueCounts, QueueStore, RecurringTrigger};

/// Runtime tuning.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Sleep between polls when a queue is idle.
    pub poll_interval: Duration,
    /// Upper bound on one handler invocation.
    pub job_timeout: Duration,
    /// A running job locked longer than this is presumed abandoned.
    pub lock_ttl: Duration,
    /// How often recurring triggers are checked.
    pub scheduler_tick: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(300),
            lock_ttl: Duration::from_secs(900),
            scheduler_tick: Duration::from_secs(5),
        }
    }
}

struct WorkerSlot {
    handler: Arc<dyn JobHandler>,
    permits: Arc<Semaphore>,
    concurrency: usize,
}

/// Owns the named queues and their worker pools.
///
/// Constructed once per process and shared as `Arc<QueueRuntime>` with
/// anything that enqueues.
///
/// ```ignore
/// let runtime = Arc::new(QueueRuntime::new(store, RuntimeConfig::default()));
/// runtime.register_worker(QueueName::LeadDistribution, handler, 4)?;
/// runtime.enqueue_recurring("lead-distribution:sweep", QueueName::LeadDistribution,
///     &payload, &Schedule::parse("0 * * * *")?, JobOpts::default()).await?;
/// runtime.start();
/// ```
pub struct QueueRuntime {
    store: Arc<dyn QueueStore>,
    config: RuntimeConfig,
    worker_id: String,
    workers: Mutex<HashMap<QueueName, Arc<WorkerSlot>>>,
    reporter: Option<Arc<dyn FailureReporter>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl QueueRuntime {
    pub fn new(store: Arc<dyn QueueStore>, config: RuntimeConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            config,
            worker_id: format!("worker-{}", Uuid::new_v4()),
            workers: Mutex::new(HashMap::new()),
            reporter: None,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Send permanently failed jobs to `reporter` in addition to the log.
    pub fn with_failure_reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Durably enqueue a job.
    pub async fn enqueue<P: Serialize>(
        &self,
        queue: QueueName,
        payload: &P,
        opts: JobOpts,
    ) -> Result<JobHandle, QueueError> {
        let entry = JobEntry::new(queue, serde_json::to_value(payload)?, &opts, Utc::now());
        self.store.insert(&entry).await?;
        metrics().jobs_enqueued.inc();
        tracing::debug!(job_id = %entry.id, queue = %queue, run_at = %entry.run_at, "job enqueued");
        Ok(entry.handle())
    }

    /// Register (or replace) a recurring trigger identified by `key`.
    ///
    /// Every due slot produces an independent job; a slow previous run does
    /// not hold back the next one.
    pub async fn enqueue_recurring<P: Serialize>(
        &self,
        key: &str,
        queue: QueueName,
        payload: &P,
        schedule: &Schedule,
        opts: JobOpts,
    ) -> Result<(), QueueError> {
        let now = Utc::now();
        let next_run_at = schedule
            .next_after(now)
            .ok_or_else(|| QueueError::invalid_schedule(schedule.as_str(), "schedule never fires"))?;

        let trigger = RecurringTrigger {
            key: key.to_string(),
            queue,
            payload: serde_json::to_value(payload)?,
            schedule: schedule.clone(),
            opts,
            next_run_at,
        };
        self.store.upsert_recurring(&trigger).await?;
        tracing::info!(key, queue = %queue, schedule = %schedule, "recurring job registered");
        Ok(())
    }

    /// Bind the single handler for `queue`, run by `concurrency` workers.
    pub fn register_worker<H: JobHandler>(
        &self,
        queue: QueueName,
        handler: H,
        concurrency: usize,
    ) -> Result<(), QueueError> {
        let mut workers = self.workers.lock();
        if workers.contains_key(&queue) {
            return Err(QueueError::DuplicateWorker(queue));
        }
        let concurrency = concurrency.max(1);
        workers.insert(
            queue,
            Arc::new(WorkerSlot {
                handler: Arc::new(handler),
                permits: Arc::new(Semaphore::new(concurrency)),
                concurrency,
            }),
        );
        Ok(())
    }

    /// Spawn a polling loop per registered queue and the recurring scheduler.
    pub fn start(self: &Arc<Self>) {
        let slots: Vec<(QueueName, Arc<WorkerSlot>)> = self
            .workers
            .lock()
            .iter()
            .map(|(q, s)| (*q, s.clone()))
            .collect();

        let mut tasks = self.tasks.lock();
        for (queue, slot) in slots {
            tracing::info!(queue = %queue, concurrency = slot.concurrency, "starting worker pool");
            tasks.push(tokio::spawn(self.clone().poll_loop(queue, slot)));
        }
        tasks.push(tokio::spawn(self.clone().scheduler_loop()));
        health().queue.set_healthy();
    }

    /// Stop claiming work and wait for in-flight handlers to finish.
    pub async fn shutdown(&self) {
        tracing::info!("queue runtime shutting down");
        self.shutdown.send_replace(true);

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }

        let slots: Vec<Arc<WorkerSlot>> = self.workers.lock().values().cloned().collect();
        for slot in slots {
            // Holding every permit means nothing is running.
            if let Ok(all) = slot.permits.acquire_many(slot.concurrency as u32).await {
                all.forget();
            }
            slot.permits.close();
        }
        health().queue.set_unhealthy("shut down");
        tracing::info!("queue runtime stopped");
    }

    /// Claim and run a single job from `queue` inline. Returns the entry as
    /// persisted after the attempt, or None when nothing was due.
    pub async fn run_once(&self, queue: QueueName) -> Result<Option<JobEntry>, QueueError> {
        let handler = self
            .workers
            .lock()
            .get(&queue)
            .map(|slot| slot.handler.clone())
            .ok_or_else(|| QueueError::UnknownQueue(queue.to_string()))?;

        let claimed = self
            .store
            .claim_next(queue, &self.worker_id, Utc::now(), self.config.lock_ttl)
            .await?;

        match claimed {
            Some(entry) => Ok(Some(self.execute(handler.as_ref(), entry).await)),
            None => Ok(None),
        }
    }

    /// Fire every recurring trigger due at `now`. Missed slots collapse into
    /// one job. Returns how many jobs were produced by this process.
    pub async fn fire_due_recurring(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut fired = 0;
        for trigger in self.store.due_recurring(now).await? {
            let Some(next) = trigger.schedule.next_after(now) else {
                tracing::warn!(key = %trigger.key, "recurring schedule exhausted");
                continue;
            };
            let entry = trigger.materialize(now);
            if self
                .store
                .fire_recurring(&trigger.key, trigger.next_run_at, next, &entry)
                .await?
            {
                fired += 1;
                metrics().recurring_fired.inc();
                metrics().jobs_enqueued.inc();
                tracing::info!(
                    key = %trigger.key,
                    job_id = %entry.id,
                    queue = %trigger.queue,
                    next_run_at = %next,
                    "recurring job fired"
                );
            }
        }
        Ok(fired)
    }

    pub async fn counts(&self, queue: QueueName) -> Result<QueueCounts, QueueError> {
        self.store.counts(queue).await
    }

    async fn poll_loop(self: Arc<Self>, queue: QueueName, slot: Arc<WorkerSlot>) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = slot.permits.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            let claimed = self
                .store
                .claim_next(queue, &self.worker_id, Utc::now(), self.config.lock_ttl)
                .await;

            match claimed {
                Ok(Some(entry)) => {
                    health().queue.set_healthy();
                    let runtime = self.clone();
                    let handler = slot.handler.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        runtime.execute(handler.as_ref(), entry).await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    health().queue.set_healthy();
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(queue = %queue, error = %e, "failed to poll queue");
                    health().queue.set_unhealthy(format!("poll failed: {e}"));
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }
        tracing::debug!(queue = %queue, "worker pool stopped polling");
    }

    async fn scheduler_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.config.scheduler_tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.fire_due_recurring(Utc::now()).await {
                tracing::error!(error = %e, "failed to fire recurring jobs");
                health().queue.set_unhealthy(format!("scheduler failed: {e}"));
            }
        }
    }

    /// Run one attempt and persist the outcome.
    async fn execute(&self, handler: &dyn JobHandler, mut entry: JobEntry) -> JobEntry {
        let ctx = JobContext {
            id: entry.id,
            queue: entry.queue,
            attempt: entry.attempts,
            max_attempts: entry.max_attempts,
            payload: entry.payload.clone(),
        };
        let span = tracing::info_span!(
            "job",
            job_id = %entry.id,
            queue = %entry.queue,
            attempt = entry.attempts,
        );

        metrics().jobs_in_flight.inc();
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.config.job_timeout, handler.handle(ctx))
            .instrument(span.clone())
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                metrics().jobs_timed_out.inc();
                Err(JobFailure::retryable(format!(
                    "job timed out after {}s",
                    self.config.job_timeout.as_secs()
                )))
            }
        };
        metrics().job_duration_ms.observe(started.elapsed().as_millis() as u64);
        metrics().jobs_in_flight.dec();

        let now = Utc::now();
        let failed = span.in_scope(|| match outcome {
            Ok(result) => {
                entry.mark_completed(result, now);
                metrics().jobs_completed.inc();
                tracing::info!("job completed");
                None
            }
            Err(failure) => match entry.mark_failed(&failure, now) {
                FailureDisposition::Retry { delay } => {
                    metrics().jobs_retried.inc();
                    tracing::warn!(
                        error = %failure,
                        entity = entity_ref(&entry.payload).as_deref(),
                        retry_in_ms = delay.as_millis() as u64,
                        "job failed, scheduling retry"
                    );
                    None
                }
                FailureDisposition::Exhausted => Some(FailureKind::Exhausted),
                FailureDisposition::Terminal => Some(FailureKind::Terminal),
            },
        });

        if let Err(e) = self.store.update(&entry).await {
            // The lock will expire and the job will be claimed again.
            span.in_scope(|| tracing::error!(error = %e, "failed to persist job outcome"));
        }

        if let Some(kind) = failed {
            metrics().jobs_failed.inc();
            let failure = PermanentFailure::from_entry(&entry, kind);
            span.in_scope(|| {
                tracing::error!(
                    kind = kind.as_str(),
                    attempts = failure.attempts,
                    max_attempts = entry.max_attempts,
                    entity = failure.entity.as_deref(),
                    payload = %failure.payload,
                    error = %failure.error,
                    "job permanently failed"
                )
            });
            if let Some(reporter) = &self.reporter {
                reporter.report(&failure).instrument(span).await;
            }
        }

        entry
    }
}
