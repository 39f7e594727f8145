use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{CaptionError, Result};
use crate::events::RunEvent;
use crate::processor::CaptionProcessor;
use crate::types::{RunProgress, RunState, RunSummary};
use crate::{ImagePreprocessor, InferenceBackend};

/// Drives a [`CaptionProcessor`] over a file list, strictly one file at a time.
///
/// A worker is consumed by [`spawn()`](Self::spawn) or [`run()`](Self::run),
/// so it can never be started twice.
pub struct CaptionWorker<B, I> {
    processor: CaptionProcessor<B, I>,
    files: Vec<PathBuf>,
}

/// The presentation side of a spawned run.
pub struct RunHandle {
    /// Ordered notifications from the worker. Closed once the run ends.
    pub events: UnboundedReceiver<RunEvent>,
    /// Resolves to [`RunState::Completed`] or [`RunState::Failed`].
    pub task: JoinHandle<RunState>,
}

impl<B, I> CaptionWorker<B, I>
where
    B: InferenceBackend,
    I: ImagePreprocessor,
{
    /// # Errors
    ///
    /// Returns [`CaptionError::NoFiles`] for an empty file list.
    pub fn new(processor: CaptionProcessor<B, I>, files: Vec<PathBuf>) -> Result<Self> {
        if files.is_empty() {
            return Err(CaptionError::NoFiles);
        }
        Ok(Self { processor, files })
    }

    /// Start the run on its own tokio task.
    pub fn spawn(self) -> RunHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move { self.run(&tx).await });
        RunHandle { events: rx, task }
    }

    /// Process every file in order, reporting through `events`.
    ///
    /// The first processing error stops the run; persistence errors do not.
    pub async fn run(self, events: &UnboundedSender<RunEvent>) -> RunState {
        let start = Instant::now();
        let total = self.files.len();
        let mut captions_written = 0;
        let mut persist_failures = 0;

        info!(
            total,
            server = %self.processor.config().server,
            "processing started"
        );

        for (index, path) in self.files.iter().enumerate() {
            let (text, output_path) = match self.processor.process(path).await {
                Ok(result) => result,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "processing failed, aborting run");
                    emit(
                        events,
                        RunEvent::Failed {
                            path: path.clone(),
                            error: e.to_string(),
                        },
                    );
                    return RunState::Failed;
                }
            };

            match text {
                Some(text) => {
                    if self.processor.persist(&text, &output_path) {
                        captions_written += 1;
                    } else {
                        persist_failures += 1;
                    }
                    emit(
                        events,
                        RunEvent::ResultReady {
                            path: path.clone(),
                            text,
                        },
                    );
                }
                None => debug!(path = %path.display(), "no text generated"),
            }

            let progress = RunProgress {
                completed: index + 1,
                total,
            };
            debug!(completed = progress.completed, total, "file done");
            emit(events, RunEvent::Progress(progress));
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            total,
            captions_written,
            persist_failures,
            "processing completed in {:.2} seconds",
            elapsed_ms as f64 / 1000.0
        );
        emit(
            events,
            RunEvent::Completed(RunSummary {
                total,
                captions_written,
                persist_failures,
                elapsed_ms,
            }),
        );
        RunState::Completed
    }
}

fn emit(events: &UnboundedSender<RunEvent>, event: RunEvent) {
    // A dropped receiver only means nobody is watching any more.
    if events.send(event).is_err() {
        debug!("event receiver dropped");
    }
}
