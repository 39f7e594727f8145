use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{CaptionError, Result};
use crate::types::{GenerateRequest, JobConfig};
use crate::{ImagePreprocessor, InferenceBackend};

/// Turns one image path into caption text.
///
/// Each call is a two-step pipeline: preprocess the image, then ask the
/// backend to generate with the run's fixed instructions and sampling.
/// Nothing is cached or retried.
pub struct CaptionProcessor<B, I> {
    backend: B,
    preprocessor: Arc<I>,
    config: JobConfig,
}

impl<B, I> CaptionProcessor<B, I>
where
    B: InferenceBackend,
    I: ImagePreprocessor,
{
    pub fn new(backend: B, preprocessor: I, config: JobConfig) -> Self {
        Self {
            backend,
            preprocessor: Arc::new(preprocessor),
            config,
        }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Caption the image at `path`.
    ///
    /// Returns the generated text (`None` when the model produced nothing)
    /// and the output-path hint from preprocessing.
    ///
    /// # Errors
    ///
    /// Any preprocessing or inference failure is returned as-is; the caller
    /// treats it as fatal for the run.
    pub async fn process(&self, path: &Path) -> Result<(Option<String>, PathBuf)> {
        let preprocessor = Arc::clone(&self.preprocessor);
        let source = path.to_path_buf();
        let (encoded, output_path) =
            tokio::task::spawn_blocking(move || preprocessor.process_image(&source))
                .await
                .map_err(CaptionError::from)??;
        debug!(
            path = %path.display(),
            width = encoded.width,
            height = encoded.height,
            "image prepared"
        );

        let request = GenerateRequest {
            system_instruction: self.config.system_instruction.clone(),
            instruction: self.config.instruction.clone(),
            images: vec![encoded.base64],
            max_length: self.config.max_length,
            sampling: self.config.sampling,
        };

        let text = self.backend.generate(&request).await?;
        if let Some(ref text) = text {
            info!(path = %path.display(), "caption generated:\n{}", text);
        }
        Ok((text, output_path))
    }

    /// Write `text` next to `output_path` with a `.txt` extension, replacing
    /// any previous content.
    ///
    /// Returns `false` and logs on failure; it never errors.
    pub fn persist(&self, text: &str, output_path: &Path) -> bool {
        persist_text(text, output_path)
    }
}

/// The sibling text file for an image: same directory and stem, `.txt` extension.
pub fn text_output_path(path: &Path) -> PathBuf {
    path.with_extension("txt")
}

/// Full-overwrite write of `text` to [`text_output_path`] of `output_path`.
pub fn persist_text(text: &str, output_path: &Path) -> bool {
    let txt_path = text_output_path(output_path);
    match std::fs::write(&txt_path, text.as_bytes()) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %txt_path.display(), error = %e, "failed to save caption");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_replaces_extension() {
        assert_eq!(
            text_output_path(Path::new("/photos/photo.jpg")),
            PathBuf::from("/photos/photo.txt")
        );
        assert_eq!(
            text_output_path(Path::new("/photos/scan.PNG")),
            PathBuf::from("/photos/scan.txt")
        );
        assert_eq!(
            text_output_path(Path::new("/photos/archive.tar.webp")),
            PathBuf::from("/photos/archive.tar.txt")
        );
        assert_eq!(
            text_output_path(Path::new("/photos/noext")),
            PathBuf::from("/photos/noext.txt")
        );
    }

    #[test]
    fn persist_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.png");

        assert!(persist_text("first caption, much longer", &image));
        assert!(persist_text("second", &image));

        let written = std::fs::read_to_string(dir.path().join("a.txt")).unwrap();
        assert_eq!(written, "second");
    }

    #[test]
    fn persist_failure_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("missing-dir").join("a.png");
        assert!(!persist_text("caption", &image));
    }
}
