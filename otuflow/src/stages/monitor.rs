//! Progress-monitoring decorator.

use super::{Stage, StageState};
use crate::cancellation::CancellationToken;
use crate::config::MonitorSettings;
use crate::core::{StageIdentity, StageOutcome, StageResult};
use crate::errors::Result;
use crate::events::{EventSink, NoOpEventSink};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

const SPINNER_FRAMES: [&str; 4] = [".", "..", "...", ""];

/// Wraps a stage and drives its `launch` while reporting progress.
///
/// The wrapped launch runs as the single worker. The monitor polls at a fixed interval,
/// ticking a spinner and emitting `stage.progress` events, and watches the token passed
/// to its own `launch`. When that token fires, the monitor cancels the worker's token,
/// waits up to the grace period for it to return, and reports
/// [`StageOutcome::Interrupted`]. Every other [`Stage`] method forwards to the inner
/// stage.
pub struct MonitoredStage<'a> {
    inner: &'a mut dyn Stage,
    settings: MonitorSettings,
    sink: Arc<dyn EventSink>,
}

impl<'a> MonitoredStage<'a> {
    /// Wraps `inner` with default settings and no event sink.
    pub fn new(inner: &'a mut dyn Stage) -> Self {
        Self {
            inner,
            settings: MonitorSettings::default(),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Replaces the monitor settings.
    #[must_use]
    pub fn with_settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl std::fmt::Debug for MonitoredStage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoredStage")
            .field("inner", &self.inner)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn spinner(label: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template("{prefix} {spinner}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&SPINNER_FRAMES);
    let bar = ProgressBar::new_spinner().with_style(style);
    bar.set_prefix(label.to_string());
    bar
}

enum Polled {
    Done(Result<StageResult>),
    Interrupted(String),
}

fn millis(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn render(label: &str, result: &StageResult, elapsed_ms: u64) {
    match result.outcome() {
        StageOutcome::Passed => info!(stage = %label, elapsed_ms, "{label}: process finished correctly"),
        StageOutcome::PassedWithWarnings => {
            warn!(stage = %label, elapsed_ms, "{label}: process finished with warnings");
        }
        StageOutcome::Failed | StageOutcome::FailedWithWarnings => {
            error!(stage = %label, elapsed_ms, "{label}: process finished with errors");
        }
        StageOutcome::Interrupted => warn!(stage = %label, elapsed_ms, "{label}: process interrupted"),
    }
    for warning in result.warnings().iter() {
        warn!(stage = %label, "{warning}");
    }
    for fail in result.fails().iter() {
        error!(stage = %label, "{fail}");
    }
}

#[async_trait]
impl<'a> Stage for MonitoredStage<'a> {
    fn state(&self) -> &StageState {
        self.inner.state()
    }

    fn state_mut(&mut self) -> &mut StageState {
        self.inner.state_mut()
    }

    async fn launch(&mut self, cancel: &CancellationToken) -> Result<StageResult> {
        let identity = self.inner.identity();
        let label = identity.label();
        let Self {
            inner,
            settings,
            sink,
        } = self;

        sink.emit("stage.started", Some(json!({ "stage": label }))).await;
        let bar = spinner(label, settings.show_progress);
        let started = Instant::now();
        let worker_token = CancellationToken::new();

        let polled = {
            let worker = inner.launch(&worker_token);
            tokio::pin!(worker);

            let mut ticker = tokio::time::interval(settings.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let polled = loop {
                tokio::select! {
                    biased;
                    result = &mut worker => break Polled::Done(result),
                    () = cancel.cancelled() => {
                        break Polled::Interrupted(cancel.reason().unwrap_or_default());
                    }
                    _ = ticker.tick() => {
                        bar.tick();
                        sink.try_emit(
                            "stage.progress",
                            Some(json!({
                                "stage": label,
                                "elapsed_ms": millis(started),
                            })),
                        );
                    }
                }
            };

            if let Polled::Interrupted(reason) = &polled {
                worker_token.cancel(reason.clone());
                if tokio::time::timeout(settings.grace(), &mut worker).await.is_err() {
                    warn!(stage = %label, "Stage did not stop within the grace period, abandoning it");
                }
            }
            polled
        };

        bar.finish_and_clear();
        let elapsed_ms = millis(started);

        match polled {
            Polled::Done(Ok(result)) => {
                render(label, &result, elapsed_ms);
                sink.emit(
                    "stage.completed",
                    Some(json!({
                        "stage": label,
                        "outcome": result.outcome(),
                        "warnings": result.warnings(),
                        "fails": result.fails(),
                        "outputs": inner.output_files().len(),
                        "elapsed_ms": elapsed_ms,
                    })),
                )
                .await;
                Ok(result)
            }
            Polled::Done(Err(e)) => {
                error!(stage = %label, error = %e, "{label}: process raised an error");
                sink.emit(
                    "stage.error",
                    Some(json!({ "stage": label, "error": e.to_string() })),
                )
                .await;
                Err(e)
            }
            Polled::Interrupted(reason) => {
                let result = StageResult::interrupted();
                render(label, &result, elapsed_ms);
                sink.emit(
                    "stage.interrupted",
                    Some(json!({ "stage": label, "reason": reason })),
                )
                .await;
                Ok(result)
            }
        }
    }

    fn identity(&self) -> StageIdentity {
        self.inner.identity()
    }

    fn set_input_files(&mut self, files: Vec<PathBuf>) {
        self.inner.set_input_files(files);
    }

    fn input_files(&self) -> Option<&[PathBuf]> {
        self.inner.input_files()
    }

    fn set_output_root(&mut self, root: &Path) {
        self.inner.set_output_root(root);
    }

    fn set_ordinal(&mut self, ordinal: Option<usize>) {
        self.inner.set_ordinal(ordinal);
    }

    fn output_dir(&self) -> PathBuf {
        self.inner.output_dir()
    }

    fn output_files(&self) -> &[PathBuf] {
        self.inner.output_files()
    }
}
