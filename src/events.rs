use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{RunProgress, RunSummary};

/// Notifications sent from the worker to the presentation layer.
///
/// A successful run emits one `Progress` per file (preceded by a
/// `ResultReady` whenever that file produced text) and ends with exactly one
/// `Completed`. A failed run ends with exactly one `Failed` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunEvent {
    /// A file finished, with or without text.
    Progress(RunProgress),
    /// A file produced text; observers (e.g. the clipboard) receive it.
    #[serde(rename_all = "camelCase")]
    ResultReady { path: PathBuf, text: String },
    /// Every file was processed.
    Completed(RunSummary),
    /// Processing `path` failed and the remaining files were abandoned.
    #[serde(rename_all = "camelCase")]
    Failed { path: PathBuf, error: String },
}

impl RunEvent {
    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Completed(_) | RunEvent::Failed { .. })
    }
}
