//! Presentation-side state for a captioning session.
//!
//! The coordinator owns what a user edits (server, instructions, length,
//! file selection), decides which actions are currently allowed, and reacts
//! to [`RunEvent`]s coming back from the worker. It never blocks on the
//! worker: [`Coordinator::drive`] only awaits the next notification.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::clipboard::ClipboardSink;
use crate::error::{CaptionError, Result};
use crate::events::RunEvent;
use crate::template::InstructTemplate;
use crate::types::{
    parse_max_length, JobConfig, RunProgress, RunState, DEFAULT_MAX_DIMENSION, DEFAULT_SERVER,
    DEFAULT_SYSTEM_INSTRUCTION, INSTRUCTION_STYLES,
};
use crate::worker::RunHandle;

/// Raw form inputs as typed by the user.
#[derive(Debug, Clone)]
pub struct FormInputs {
    pub server: String,
    pub system_instruction: String,
    pub instruction: String,
    /// Unparsed; see [`parse_max_length`].
    pub max_length: String,
    pub max_dimension: u32,
    pub template: Option<InstructTemplate>,
    pub timeout: std::time::Duration,
}

impl Default for FormInputs {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            instruction: INSTRUCTION_STYLES[0].to_string(),
            max_length: "256".to_string(),
            max_dimension: DEFAULT_MAX_DIMENSION,
            template: None,
            timeout: std::time::Duration::from_secs(300),
        }
    }
}

pub struct Coordinator<C> {
    pub inputs: FormInputs,
    selected: Vec<PathBuf>,
    state: RunState,
    progress: Option<RunProgress>,
    last_error: Option<String>,
    clipboard: C,
}

impl<C: ClipboardSink> Coordinator<C> {
    pub fn new(inputs: FormInputs, clipboard: C) -> Self {
        Self {
            inputs,
            selected: Vec::new(),
            state: RunState::Idle,
            progress: None,
            last_error: None,
            clipboard,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn selected_files(&self) -> &[PathBuf] {
        &self.selected
    }

    pub fn progress(&self) -> Option<RunProgress> {
        self.progress
    }

    pub fn clipboard(&self) -> &C {
        &self.clipboard
    }

    pub fn can_select_files(&self) -> bool {
        self.state != RunState::Running
    }

    pub fn can_start(&self) -> bool {
        self.state != RunState::Running && !self.selected.is_empty()
    }

    /// Replace the selection. Empty selections are ignored, like a cancelled
    /// file dialog. Returns whether the selection changed.
    pub fn select_files<P: AsRef<Path>>(&mut self, files: &[P]) -> bool {
        if !self.can_select_files() || files.is_empty() {
            return false;
        }
        self.selected = files.iter().map(|p| absolutize(p.as_ref())).collect();
        self.last_error = None;
        true
    }

    /// Status line under the file picker.
    pub fn files_label(&self) -> String {
        if let Some(ref e) = self.last_error {
            return format!("Error: {}", e);
        }
        match self.selected.len() {
            0 => "No files selected".to_string(),
            n => format!("Selected {} images", n),
        }
    }

    /// Build the run-scoped configuration from the current inputs.
    pub fn job_config(&self) -> JobConfig {
        JobConfig::builder()
            .server(self.inputs.server.trim())
            .system_instruction(self.inputs.system_instruction.clone())
            .instruction(self.inputs.instruction.clone())
            .max_length(parse_max_length(&self.inputs.max_length))
            .max_dimension(self.inputs.max_dimension)
            .template(self.inputs.template)
            .timeout(self.inputs.timeout)
            .build()
    }

    /// Move to `Running` and hand out a fresh config and file list for the run.
    ///
    /// # Errors
    ///
    /// [`CaptionError::AlreadyRunning`] while a run is active,
    /// [`CaptionError::NoFiles`] when nothing is selected.
    pub fn begin_run(&mut self) -> Result<(JobConfig, Vec<PathBuf>)> {
        if self.state == RunState::Running {
            return Err(CaptionError::AlreadyRunning);
        }
        if self.selected.is_empty() {
            return Err(CaptionError::NoFiles);
        }
        self.state = RunState::Running;
        self.progress = Some(RunProgress {
            completed: 0,
            total: self.selected.len(),
        });
        self.last_error = None;
        Ok((self.job_config(), self.selected.clone()))
    }

    /// Return to a usable state when a run could not be spawned after
    /// [`begin_run`](Self::begin_run) succeeded.
    pub fn abort_run(&mut self, error: &CaptionError) {
        self.state = RunState::Failed;
        self.progress = None;
        self.last_error = Some(error.to_string());
    }

    /// React to one worker notification.
    pub fn handle_event(&mut self, event: &RunEvent) {
        match event {
            RunEvent::Progress(p) => {
                self.progress = Some(*p);
            }
            RunEvent::ResultReady { text, .. } => {
                if let Err(e) = self.clipboard.copy_text(text) {
                    warn!(error = %e, "failed to copy to clipboard");
                }
            }
            RunEvent::Completed(summary) => {
                self.state = RunState::Completed;
                self.progress = None;
                info!(
                    elapsed_ms = summary.elapsed_ms,
                    "output copied to clipboard and saved as txt file"
                );
            }
            RunEvent::Failed { error, .. } => {
                self.state = RunState::Failed;
                self.progress = None;
                self.last_error = Some(error.clone());
            }
        }
    }

    /// Hand the clipboard its end-of-run call. May block, see
    /// [`SystemClipboard`](crate::clipboard::SystemClipboard). Failures are logged.
    pub fn release_clipboard(&mut self) {
        if let Err(e) = self.clipboard.release() {
            warn!(error = %e, "failed to release clipboard");
        }
    }

    /// Consume notifications until the worker hangs up, calling `render`
    /// after each one, then wait for the worker task itself.
    pub async fn drive<F>(&mut self, handle: RunHandle, mut render: F) -> Result<RunState>
    where
        F: FnMut(&Self, &RunEvent),
    {
        let RunHandle { mut events, task } = handle;
        while let Some(event) = events.recv().await {
            self.handle_event(&event);
            render(&*self, &event);
        }

        match task.await {
            Ok(state) => Ok(state),
            Err(e) => {
                let err = CaptionError::from(e);
                self.abort_run(&err);
                Err(err)
            }
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::NoClipboard;

    fn coordinator() -> Coordinator<NoClipboard> {
        Coordinator::new(FormInputs::default(), NoClipboard)
    }

    #[test]
    fn starts_idle_without_files() {
        let c = coordinator();
        assert_eq!(c.state(), RunState::Idle);
        assert!(c.can_select_files());
        assert!(!c.can_start());
        assert_eq!(c.files_label(), "No files selected");
    }

    #[test]
    fn selection_enables_start() {
        let mut c = coordinator();
        assert!(c.select_files(&["/tmp/a.png", "/tmp/b.png"]));
        assert!(c.can_start());
        assert_eq!(c.files_label(), "Selected 2 images");
    }

    #[test]
    fn empty_selection_is_ignored() {
        let mut c = coordinator();
        c.select_files(&["/tmp/a.png"]);
        let none: [&str; 0] = [];
        assert!(!c.select_files(&none));
        assert_eq!(c.selected_files().len(), 1);
    }

    #[test]
    fn relative_paths_become_absolute() {
        let mut c = coordinator();
        c.select_files(&["a.png"]);
        assert!(c.selected_files()[0].is_absolute());
    }

    #[test]
    fn begin_run_disables_affordances() {
        let mut c = coordinator();
        c.select_files(&["/tmp/a.png"]);
        let (_, files) = c.begin_run().unwrap();
        assert_eq!(files, vec![PathBuf::from("/tmp/a.png")]);
        assert_eq!(c.state(), RunState::Running);
        assert!(!c.can_select_files());
        assert!(!c.can_start());
        assert!(!c.select_files(&["/tmp/b.png"]));
        assert!(matches!(c.begin_run(), Err(CaptionError::AlreadyRunning)));
    }

    #[test]
    fn begin_run_requires_files() {
        let mut c = coordinator();
        assert!(matches!(c.begin_run(), Err(CaptionError::NoFiles)));
        assert_eq!(c.state(), RunState::Idle);
    }

    #[test]
    fn job_config_parses_max_length() {
        let mut c = coordinator();
        c.inputs.max_length = "abc".to_string();
        assert_eq!(c.job_config().max_length, 256);
        c.inputs.max_length = "128".to_string();
        assert_eq!(c.job_config().max_length, 128);
    }

    #[test]
    fn failure_reenables_and_reports() {
        let mut c = coordinator();
        c.select_files(&["/tmp/a.png"]);
        c.begin_run().unwrap();
        c.handle_event(&RunEvent::Failed {
            path: PathBuf::from("/tmp/a.png"),
            error: "connection refused".to_string(),
        });
        assert_eq!(c.state(), RunState::Failed);
        assert!(c.can_start());
        assert_eq!(c.files_label(), "Error: connection refused");
        assert!(c.progress().is_none());
    }
}
