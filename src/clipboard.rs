use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to set clipboard text: {0}")]
    Write(String),
}

/// Destination for generated captions. Best effort: callers log failures.
pub trait ClipboardSink {
    fn copy_text(&mut self, text: &str) -> Result<(), ClipboardError>;

    /// Called once after a run completes, before the process may exit.
    fn release(&mut self) -> Result<(), ClipboardError> {
        Ok(())
    }
}

/// The desktop clipboard.
///
/// The connection is opened on first use and kept, since on X11/Wayland the
/// copied text disappears when the owning handle is dropped. The same happens
/// at process exit unless a clipboard manager takes it over; with
/// [`hold_on_release`](Self::hold_on_release) set, [`release`](ClipboardSink::release)
/// blocks on Linux until another application replaces the last caption.
#[derive(Default)]
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
    last: Option<String>,
    hold: bool,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold_on_release(mut self, hold: bool) -> Self {
        self.hold = hold;
        self
    }

    fn handle(&mut self) -> Result<&mut arboard::Clipboard, ClipboardError> {
        if self.inner.is_none() {
            let clipboard =
                arboard::Clipboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
            self.inner = Some(clipboard);
        }
        self.inner
            .as_mut()
            .ok_or_else(|| ClipboardError::Unavailable("not initialised".to_string()))
    }
}

impl ClipboardSink for SystemClipboard {
    fn copy_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.handle()?
            .set_text(text.to_string())
            .map_err(|e| ClipboardError::Write(e.to_string()))?;
        self.last = Some(text.to_string());
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn release(&mut self) -> Result<(), ClipboardError> {
        use arboard::SetExtLinux;

        if !self.hold {
            return Ok(());
        }
        let Some(text) = self.last.take() else {
            return Ok(());
        };
        self.handle()?
            .set()
            .wait()
            .text(text)
            .map_err(|e| ClipboardError::Write(e.to_string()))
    }
}

/// Discards everything. Used for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoClipboard;

impl ClipboardSink for NoClipboard {
    fn copy_text(&mut self, _text: &str) -> Result<(), ClipboardError> {
        Ok(())
    }
}
