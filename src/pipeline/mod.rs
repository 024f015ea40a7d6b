//! Bounded concurrent execution
//!
//! A [`WorkerPool`] runs one stage at a time: a dispatcher task feeds every item into a
//! bounded queue and closes it, `W` workers pull items until the queue is closed and
//! empty, and the caller collects one result per item. A failing or panicking item
//! becomes an [`ItemFailure`] and never affects its neighbours.
//!
//! The concrete stages (list tags, fetch metadata, delete) live in [`stages`].

pub mod stages;

pub use stages::{DeletionReport, RepositoryTags, delete_artifacts, fetch_artifacts, list_tags};

use crate::error::{PrunerError, Result};
use crate::logging::Logger;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, mpsc, watch};

/// Workers used when no parallelism is configured
pub const DEFAULT_PARALLELISM: usize = 10;

/// Something a stage can process; the label names the item in failure reports.
pub trait WorkItem: Send + 'static {
    fn label(&self) -> String;
}

impl WorkItem for String {
    fn label(&self) -> String {
        self.clone()
    }
}

/// Lifecycle of one stage run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Idle,
    /// Items are still being enqueued
    Dispatching,
    /// Queue closed, workers finishing
    Draining,
    Done,
}

/// One item that did not produce a result
#[derive(Debug)]
pub struct ItemFailure {
    pub label: String,
    pub error: PrunerError,
}

/// Everything a stage produced: successes in completion order, plus failures.
#[derive(Debug)]
pub struct StageOutcome<T> {
    pub successes: Vec<T>,
    pub failures: Vec<ItemFailure>,
}

impl<T> StageOutcome<T> {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Fixed-size pool of tokio workers
pub struct WorkerPool {
    workers: usize,
    logger: Logger,
    state: watch::Sender<StageState>,
}

impl WorkerPool {
    /// `parallelism` below one is clamped to one worker.
    pub fn new(parallelism: usize, logger: Logger) -> Self {
        let (state, _) = watch::channel(StageState::Idle);
        Self {
            workers: parallelism.max(1),
            logger,
            state,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn state(&self) -> StageState {
        *self.state.borrow()
    }

    /// Observe state transitions of every stage this pool runs
    pub fn subscribe(&self) -> watch::Receiver<StageState> {
        self.state.subscribe()
    }

    /// Run `op` over every item with at most `workers` in flight.
    ///
    /// Never fails as a whole; per-item errors and panics are returned as failures.
    pub async fn run<I, T, F, Fut>(&self, stage: &str, items: Vec<I>, op: F) -> StageOutcome<T>
    where
        I: WorkItem,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let start = Instant::now();
        let total = items.len();
        self.logger.detail(&format!(
            "{}: {} items on {} workers",
            stage, total, self.workers
        ));
        self.state.send_replace(StageState::Dispatching);

        let (work_tx, work_rx) = mpsc::channel::<I>(self.workers);
        let work_rx = Arc::new(Mutex::new(work_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let op = Arc::new(op);

        let dispatcher = tokio::spawn(async move {
            for item in items {
                if work_tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        for _ in 0..self.workers {
            let work_rx = Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            let op = Arc::clone(&op);

            tokio::spawn(async move {
                loop {
                    let next = work_rx.lock().await.recv().await;
                    let Some(item) = next else {
                        break;
                    };

                    let label = item.label();
                    let call = Arc::clone(&op);
                    let outcome = AssertUnwindSafe(async move { call(item).await })
                        .catch_unwind()
                        .await;
                    let result = match outcome {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(error)) => Err(ItemFailure { label, error }),
                        Err(payload) => Err(ItemFailure {
                            label,
                            error: PrunerError::Worker(panic_message(payload)),
                        }),
                    };
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        if let Err(e) = dispatcher.await {
            self.logger
                .error(&format!("{}: dispatcher stopped early: {}", stage, e));
        }
        self.state.send_replace(StageState::Draining);

        let mut outcome = StageOutcome {
            successes: Vec::with_capacity(total),
            failures: Vec::new(),
        };
        while let Some(result) = result_rx.recv().await {
            match result {
                Ok(value) => outcome.successes.push(value),
                Err(failure) => {
                    self.logger.warning(&format!(
                        "{}: {} failed: {}",
                        stage, failure.label, failure.error
                    ));
                    outcome.failures.push(failure);
                }
            }
        }

        self.state.send_replace(StageState::Done);
        self.logger.detail(&format!(
            "{}: {} succeeded, {} failed in {}",
            stage,
            outcome.successes.len(),
            outcome.failures.len(),
            self.logger.format_duration(start.elapsed())
        ));
        outcome
    }
}
