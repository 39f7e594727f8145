//! # kobold-captioner
//!
//! Caption images with a vision model served by KoboldCpp and store each
//! caption as a `.txt` file next to its image.
//!
//! ## Pieces
//!
//! - [`CaptionProcessor`]: one image in, caption text out (preprocess, then generate)
//! - [`CaptionWorker`]: walks a file list strictly in order on a background task,
//!   saving each caption and reporting [`RunEvent`]s
//! - [`Coordinator`]: presentation-side state: inputs, file selection,
//!   affordances, progress, clipboard
//! - [`KoboldClient`] / [`ImageProcessor`]: the default collaborators, behind the
//!   [`InferenceBackend`] and [`ImagePreprocessor`] traits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kobold_captioner::{CaptionProcessor, CaptionWorker, ImageProcessor, JobConfig, KoboldClient};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = JobConfig::builder().style(1).max_length(128).build();
//!     let processor = CaptionProcessor::new(
//!         KoboldClient::new(&config)?,
//!         ImageProcessor::new(config.max_dimension),
//!         config,
//!     );
//!
//!     let worker = CaptionWorker::new(processor, vec![PathBuf::from("photo.jpg")])?;
//!     let mut handle = worker.spawn();
//!     while let Some(event) = handle.events.recv().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod clipboard;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod kobold;
pub mod logging;
pub mod preprocess;
pub mod processor;
pub mod template;
pub mod types;
pub mod worker;

use std::path::{Path, PathBuf};

pub use clipboard::{ClipboardError, ClipboardSink, NoClipboard, SystemClipboard};
pub use coordinator::{Coordinator, FormInputs};
pub use error::{CaptionError, Result};
pub use events::RunEvent;
pub use kobold::KoboldClient;
pub use preprocess::{EncodedImage, ImageProcessor};
pub use processor::{persist_text, text_output_path, CaptionProcessor};
pub use template::InstructTemplate;
pub use types::{
    parse_max_length, GenerateRequest, JobConfig, JobConfigBuilder, RunProgress, RunState,
    RunSummary, SamplingParams, INSTRUCTION_STYLES,
};
pub use worker::{CaptionWorker, RunHandle};

/// Generates text for a request carrying one encoded image.
///
/// # Example
///
/// ```ignore
/// use kobold_captioner::*;
///
/// struct Canned;
///
/// impl InferenceBackend for Canned {
///     async fn generate(&self, _request: &GenerateRequest) -> Result<Option<String>> {
///         Ok(Some("A cat on a windowsill.".to_string()))
///     }
/// }
/// ```
pub trait InferenceBackend: Send + Sync + 'static {
    /// Returns `Ok(None)` when the model produced no text.
    fn generate(
        &self,
        request: &GenerateRequest,
    ) -> impl std::future::Future<Output = Result<Option<String>>> + Send;
}

/// Prepares an image file for inference.
///
/// Runs on the blocking thread pool, so implementations may do synchronous
/// decoding and file I/O.
pub trait ImagePreprocessor: Send + Sync + 'static {
    /// Returns the encoded image and the path the caption should be saved
    /// next to.
    fn process_image(&self, path: &Path) -> Result<(EncodedImage, PathBuf)>;
}
