//! Bounded analysis dispatch with per-unit failure isolation.
//!
//! [`WorkerPool`] is a fixed set of tokio workers pulling task indices from a
//! shared queue. Each task runs behind `catch_unwind`, so a panicking task
//! yields an error for its own slot and the worker moves on to the next
//! index. The pool returns only after every worker has exited, with one
//! result slot per task.
//!
//! [`Dispatcher`] runs the analyzer over a batch of units on such a pool.
//! Everything that can go wrong for a unit (unreadable image, provider error,
//! timeout, panic) becomes an [`OutcomeStatus::Failed`] outcome; nothing
//! escapes to abort siblings.
//!
//! ```text
//!   queue: 0 1 2 3 4 5 …         worker 0 ─┐
//!          ▲ next index           worker 1 ─┼─▶ slots[i] = outcome(i)
//!          └──────────────────── worker C ─┘
//! ```

use crate::error::UnitError;
use crate::output::{AnalysisOutcome, OutcomeStatus};
use crate::pipeline::extract::AnalysisUnit;
use crate::pipeline::llm::{AnalysisReply, Analyzer};
use crate::progress::ProgressCallback;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Fixed-size worker pool over an indexed task queue.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `job(i)` for every `i` in `0..task_count`, at most `size` at a time.
    ///
    /// Each index is taken from the queue by exactly one worker. The returned
    /// vector has `task_count` slots; a slot holds `Err(message)` when its
    /// job panicked or its worker died before reaching it.
    pub async fn execute<F, Fut, R>(&self, task_count: usize, job: F) -> Vec<Result<R, String>>
    where
        F: Fn(usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let job = Arc::new(job);
        let next = Arc::new(AtomicUsize::new(0));
        let slots: Arc<Mutex<Vec<Option<Result<R, String>>>>> =
            Arc::new(Mutex::new((0..task_count).map(|_| None).collect()));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.size.min(task_count) {
            let job = Arc::clone(&job);
            let next = Arc::clone(&next);
            let slots = Arc::clone(&slots);
            workers.spawn(async move {
                loop {
                    let idx = next.fetch_add(1, Ordering::SeqCst);
                    if idx >= task_count {
                        break;
                    }
                    debug!("Worker {} takes task {}", worker_id, idx);
                    let result = AssertUnwindSafe(job(idx))
                        .catch_unwind()
                        .await
                        .map_err(panic_message);
                    let mut guard = slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    guard[idx] = Some(result);
                }
            });
        }

        // Join barrier: no slot is read until every worker has exited.
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("Worker exited abnormally: {}", e);
            }
        }

        let slots = match Arc::try_unwrap(slots) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()),
            Err(shared) => {
                let mut guard = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                std::mem::take(&mut *guard)
            }
        };

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err("worker exited before reaching this task".into())))
            .collect()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs the analysis call over every unit with bounded concurrency.
#[derive(Clone)]
pub struct Dispatcher {
    pool: WorkerPool,
    analyzer: Arc<dyn Analyzer>,
    prompt: Arc<str>,
    timeout: Option<Duration>,
    progress: Option<ProgressCallback>,
}

impl Dispatcher {
    pub fn new(analyzer: Arc<dyn Analyzer>, concurrency: usize, prompt: impl Into<Arc<str>>) -> Self {
        Self {
            pool: WorkerPool::new(concurrency),
            analyzer,
            prompt: prompt.into(),
            timeout: None,
            progress: None,
        }
    }

    /// Fail any single call that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Analyse every unit; returns one outcome per unit in `sequence_index` order.
    ///
    /// Resolves only after all outcomes exist.
    pub async fn dispatch(&self, units: &[AnalysisUnit]) -> Vec<AnalysisOutcome> {
        let total = units.len();
        info!(
            "Dispatching {} unit(s) across {} worker(s)",
            total,
            self.pool.size().min(total)
        );
        if let Some(ref cb) = self.progress {
            cb.on_batch_start(total);
        }

        let shared_units: Arc<[AnalysisUnit]> = units.to_vec().into();
        let ctx = self.clone();
        let job_units = Arc::clone(&shared_units);
        let results = self
            .pool
            .execute(total, move |idx| {
                let ctx = ctx.clone();
                let units = Arc::clone(&job_units);
                async move { ctx.analyze_unit(&units[idx], total).await }
            })
            .await;

        let outcomes: Vec<AnalysisOutcome> = results
            .into_iter()
            .enumerate()
            .map(|(idx, result)| match result {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = UnitError::Panicked(panic).to_string();
                    warn!("Unit {}: {}", idx, message);
                    if let Some(ref cb) = self.progress {
                        cb.on_unit_error(idx, total, &message);
                    }
                    AnalysisOutcome::failed(shared_units[idx].sequence_index, message)
                }
            })
            .collect();

        let success = outcomes.iter().filter(|o| o.is_success()).count();
        info!("Analysis finished: {}/{} unit(s) succeeded", success, total);
        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(total, success);
        }
        outcomes
    }

    /// Analyse one unit. Never fails: errors become a `Failed` outcome.
    async fn analyze_unit(&self, unit: &AnalysisUnit, total: usize) -> AnalysisOutcome {
        let index = unit.sequence_index;
        let start = Instant::now();
        if let Some(ref cb) = self.progress {
            cb.on_unit_start(index, total);
        }

        let result = self.call(unit).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(reply) => {
                debug!(
                    "Unit {} ({}): {} chars in {}ms",
                    index,
                    unit.source_label(),
                    reply.text.len(),
                    duration_ms
                );
                if let Some(ref cb) = self.progress {
                    cb.on_unit_complete(index, total, reply.text.len());
                }
                AnalysisOutcome {
                    sequence_index: index,
                    status: OutcomeStatus::Succeeded(reply.text),
                    input_tokens: reply.input_tokens,
                    output_tokens: reply.output_tokens,
                    duration_ms,
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Unit {} ({}): analysis failed — {}", index, unit.source_label(), message);
                if let Some(ref cb) = self.progress {
                    cb.on_unit_error(index, total, &message);
                }
                AnalysisOutcome {
                    duration_ms,
                    ..AnalysisOutcome::failed(index, message)
                }
            }
        }
    }

    async fn call(&self, unit: &AnalysisUnit) -> Result<AnalysisReply, UnitError> {
        let image = tokio::fs::read(&unit.source_locator)
            .await
            .map_err(|e| UnitError::ImageUnreadable(format!("{}: {}", unit.source_locator.display(), e)))?;

        let call = self.analyzer.analyze(&image, &self.prompt);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| UnitError::Timeout {
                    secs: limit.as_secs(),
                })?,
            None => call.await,
        }
    }
}
