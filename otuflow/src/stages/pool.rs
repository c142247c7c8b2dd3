//! Bounded fan-out of per-file work.
//!
//! A [`FanOut`] runs one task per input file with at most `concurrency` tasks in
//! flight. Tasks that write to a common file go through a [`SharedSink`]. Under
//! [`FailureMode::FailFast`] the first failing task trips a [`FirstErrorLatch`], the
//! pool stops submitting, and the latched error is returned once in-flight tasks have
//! drained. Under [`FailureMode::ContinueOnFailure`] failures are collected per input.

use crate::cancellation::CancellationToken;
use crate::core::StageResult;
use crate::errors::{OtuflowError, Result};
use crate::utils::file_name;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// How the pool reacts to a failing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FailureMode {
    /// Stop on the first failure and propagate it.
    #[default]
    FailFast,
    /// Record the failure and let the remaining inputs finish.
    ContinueOnFailure,
}

/// Records the first failing input.
#[derive(Debug, Default)]
pub struct FirstErrorLatch {
    first: Mutex<Option<(PathBuf, String)>>,
}

impl FirstErrorLatch {
    /// Creates an open latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `input` as the first failure. Returns false if already latched.
    pub fn record(&self, input: &Path, message: impl Into<String>) -> bool {
        let mut first = self.first.lock();
        if first.is_some() {
            return false;
        }
        *first = Some((input.to_path_buf(), message.into()));
        true
    }

    /// Returns true once a failure was recorded.
    #[must_use]
    pub fn is_latched(&self) -> bool {
        self.first.lock().is_some()
    }

    /// The first failing input and its message.
    #[must_use]
    pub fn first(&self) -> Option<(PathBuf, String)> {
        self.first.lock().clone()
    }
}

/// A writer shared by every task of a pool. Each call holds the lock for its duration,
/// so one record is never interleaved with another.
pub struct SharedSink<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for SharedSink<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Write> SharedSink<W> {
    /// Wraps `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Runs `f` with exclusive access to the writer.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub fn with<R>(&self, f: impl FnOnce(&mut W) -> io::Result<R>) -> io::Result<R> {
        let mut writer = self.inner.lock();
        f(&mut writer)
    }

    /// Flushes the writer.
    ///
    /// # Errors
    ///
    /// Propagates the flush error.
    pub fn flush(&self) -> io::Result<()> {
        self.inner.lock().flush()
    }

    /// Returns the writer once no other handle is alive.
    pub fn into_inner(self) -> Option<W> {
        Arc::try_unwrap(self.inner).ok().map(Mutex::into_inner)
    }
}

impl<W> std::fmt::Debug for SharedSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSink")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}

/// Per-input results of a pool run that was not interrupted. Entries follow input order.
#[derive(Debug)]
pub struct FanOutReport<T> {
    /// Inputs whose task succeeded, with the task's value.
    pub completed: Vec<(PathBuf, T)>,
    /// Inputs whose task failed.
    pub failed: Vec<(PathBuf, OtuflowError)>,
    /// Inputs never started because the pool shut down.
    pub skipped: Vec<PathBuf>,
}

impl<T> Default for FanOutReport<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// How a pool run ended.
#[derive(Debug)]
pub enum FanOutOutcome<T> {
    /// Every submitted task finished.
    Finished(FanOutReport<T>),
    /// The stage token fired while draining.
    Interrupted,
}

/// A bounded worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    concurrency: usize,
    mode: FailureMode,
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new(1)
    }
}

impl FanOut {
    /// Creates a fail-fast pool running at most `concurrency` tasks at once.
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            mode: FailureMode::FailFast,
        }
    }

    /// Sets the failure mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: FailureMode) -> Self {
        self.mode = mode;
        self
    }

    /// The concurrency limit.
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs `task` once per input.
    ///
    /// Each task receives its input and the pool token, which fires when the stage is
    /// interrupted or, in fail-fast mode, when another task fails.
    ///
    /// # Errors
    ///
    /// In fail-fast mode, returns the first task error after in-flight tasks drain.
    /// In any mode, returns [`OtuflowError::Worker`] if a task panics.
    pub async fn run<T, F, Fut>(
        &self,
        inputs: Vec<PathBuf>,
        cancel: &CancellationToken,
        task: F,
    ) -> Result<FanOutOutcome<T>>
    where
        T: Send + 'static,
        F: Fn(PathBuf, Arc<CancellationToken>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let pool_token = cancel.child();
        let latch = Arc::new(FirstErrorLatch::new());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        let mut skipped = Vec::new();
        let mut pending = inputs.into_iter().enumerate();

        for (index, input) in pending.by_ref() {
            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    permit.map_err(|e| OtuflowError::Worker(e.to_string()))?
                }
                () = pool_token.cancelled() => {
                    skipped.push((index, input));
                    break;
                }
            };
            if pool_token.is_cancelled() {
                skipped.push((index, input));
                break;
            }

            debug!(input = %input.display(), "Submitting pool task");
            let work = task(input.clone(), Arc::clone(&pool_token));
            let latch = Arc::clone(&latch);
            let token = Arc::clone(&pool_token);
            let mode = self.mode;
            set.spawn(async move {
                let outcome = work.await;
                if let Err(e) = &outcome {
                    if mode == FailureMode::FailFast
                        && !e.is_cancellation()
                        && latch.record(&input, e.to_string())
                    {
                        token.cancel(format!("{} failed", input.display()));
                    }
                }
                drop(permit);
                (index, input, outcome)
            });
        }
        skipped.extend(pending);

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        loop {
            tokio::select! {
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok((index, input, Ok(value)))) => completed.push((index, input, value)),
                    Some(Ok((index, input, Err(e)))) => failed.push((index, input, e)),
                    Some(Err(e)) => {
                        pool_token.cancel("worker panicked");
                        set.abort_all();
                        return Err(OtuflowError::Worker(e.to_string()));
                    }
                },
                () = cancel.cancelled() => {
                    warn!(in_flight = set.len(), "Pool interrupted, shutting down");
                    set.abort_all();
                    return Ok(FanOutOutcome::Interrupted);
                }
            }
        }

        if cancel.is_cancelled() {
            return Ok(FanOutOutcome::Interrupted);
        }

        completed.sort_by_key(|(index, _, _)| *index);
        failed.sort_by_key(|(index, _, _)| *index);
        skipped.sort_by_key(|(index, _)| *index);

        if let Some((first, _)) = latch.first() {
            let position = failed.iter().position(|(_, input, _)| *input == first);
            if let Some(position) = position {
                return Err(failed.swap_remove(position).2);
            }
        }

        Ok(FanOutOutcome::Finished(FanOutReport {
            completed: completed.into_iter().map(|(_, i, v)| (i, v)).collect(),
            failed: failed.into_iter().map(|(_, i, e)| (i, e)).collect(),
            skipped: skipped.into_iter().map(|(_, i)| i).collect(),
        }))
    }
}

/// Runs blocking file work on the blocking thread pool.
///
/// # Errors
///
/// Propagates the closure's error, or [`OtuflowError::Worker`] if it panicked.
pub async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| OtuflowError::Worker(e.to_string()))?
}

/// Applies the partial-success policy to `result`.
///
/// Every failed input becomes a warning naming the file. If nothing was produced across
/// all inputs, a fail message is added as well.
pub fn summarize_fan_out<T>(
    report: &FanOutReport<T>,
    result: &mut StageResult,
    produced: impl Fn(&T) -> u64,
) -> u64 {
    for (input, error) in &report.failed {
        result.add_warning(format!("Could not process {}: {error}", file_name(input)));
    }
    let total: u64 = report.completed.iter().map(|(_, value)| produced(value)).sum();
    if total == 0 {
        let inputs = report.completed.len() + report.failed.len();
        result.add_fail(format!("No output produced from {inputs} input files"));
    }
    total
}
