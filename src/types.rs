use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::template::InstructTemplate;

/// Default KoboldCpp address.
pub const DEFAULT_SERVER: &str = "http://localhost:5001";

/// Default system instruction sent with every request.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful image captioner.";

/// Output length used when the configured value is missing or unparseable.
pub const DEFAULT_MAX_LENGTH: u32 = 256;

/// Longest image side, in pixels, sent to the model.
pub const DEFAULT_MAX_DIMENSION: u32 = 384;

/// Captioning styles offered by the presentation layer, in display order.
pub const INSTRUCTION_STYLES: [&str; 12] = [
    "Describe the image in detail. Be specific.",
    "Provide a brief description of the image.",
    "Write a descriptive caption for this image in a formal tone within 250 words.",
    "Write a long descriptive caption for this image in a formal tone.",
    "Write a descriptive caption for this image in a formal tone.",
    "Write a stable diffusion prompt for this image.",
    "Write a stable diffusion prompt for this image within 250 words.",
    "Write a MidJourney prompt for this image.",
    "Write a list of Booru tags for this image.",
    "Write a list of Booru-like tags for this image.",
    "Analyze this image like an art critic would.",
    "Describe the main objects and their relationships in the image.",
];

/// Parse a user-typed output length.
///
/// Anything that is not a plain positive integer falls back to
/// [`DEFAULT_MAX_LENGTH`] instead of erroring.
pub fn parse_max_length(input: &str) -> u32 {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return DEFAULT_MAX_LENGTH;
    }
    match trimmed.parse::<u32>() {
        Ok(n) if n > 0 => n,
        _ => DEFAULT_MAX_LENGTH,
    }
}

/// Sampling parameters sent with every generate call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Nucleus sampling threshold.
    pub top_p: f64,
    /// Top-k cutoff; 0 disables it.
    pub top_k: u32,
    pub temperature: f64,
    /// Repetition penalty.
    pub rep_pen: f64,
    /// Minimum-probability cutoff.
    pub min_p: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            top_p: 0.95,
            top_k: 0,
            temperature: 0.6,
            rep_pen: 1.1,
            min_p: 0.1,
        }
    }
}

/// Configuration for a single captioning run.
///
/// Built fresh by the coordinator for every run and never mutated while the
/// run is active. Use [`JobConfig::builder()`] to construct one.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// KoboldCpp base URL (e.g. "http://localhost:5001").
    pub server: String,
    pub system_instruction: String,
    pub instruction: String,
    /// Maximum tokens to generate per image.
    pub max_length: u32,
    /// Longest image side after preprocessing.
    pub max_dimension: u32,
    /// Instruct template; `None` asks the server which model is loaded.
    pub template: Option<InstructTemplate>,
    /// HTTP timeout for a single generate call.
    pub timeout: Duration,
    pub sampling: SamplingParams,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            instruction: INSTRUCTION_STYLES[0].to_string(),
            max_length: DEFAULT_MAX_LENGTH,
            max_dimension: DEFAULT_MAX_DIMENSION,
            template: None,
            timeout: Duration::from_secs(300),
            sampling: SamplingParams::default(),
        }
    }
}

impl JobConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> JobConfigBuilder {
        JobConfigBuilder::default()
    }
}

/// Builder for [`JobConfig`].
#[derive(Default)]
pub struct JobConfigBuilder {
    config: JobConfig,
}

impl JobConfigBuilder {
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.config.server = server.into();
        self
    }

    pub fn system_instruction(mut self, text: impl Into<String>) -> Self {
        self.config.system_instruction = text.into();
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = text.into();
        self
    }

    /// Pick one of [`INSTRUCTION_STYLES`]; out-of-range indices keep the current instruction.
    pub fn style(mut self, index: usize) -> Self {
        if let Some(style) = INSTRUCTION_STYLES.get(index) {
            self.config.instruction = style.to_string();
        }
        self
    }

    pub fn max_length(mut self, max_length: u32) -> Self {
        self.config.max_length = max_length;
        self
    }

    pub fn max_dimension(mut self, max_dimension: u32) -> Self {
        self.config.max_dimension = max_dimension;
        self
    }

    pub fn template(mut self, template: Option<InstructTemplate>) -> Self {
        self.config.template = template;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn sampling(mut self, sampling: SamplingParams) -> Self {
        self.config.sampling = sampling;
        self
    }

    /// Build the final [`JobConfig`].
    pub fn build(self) -> JobConfig {
        self.config
    }
}

/// Everything the inference backend needs for one image.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system_instruction: String,
    pub instruction: String,
    /// Base64-encoded images; the orchestrator always sends exactly one.
    pub images: Vec<String>,
    pub max_length: u32,
    pub sampling: SamplingParams,
}

/// Progress through the file list of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgress {
    pub completed: usize,
    pub total: usize,
}

impl RunProgress {
    /// Whole-number percentage, as shown on a progress bar.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed.min(self.total) * 100) / self.total) as u8
    }
}

/// Summary emitted once when a run completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub captions_written: usize,
    pub persist_failures: usize,
    pub elapsed_ms: u64,
}

/// Lifecycle of a run as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_length_accepts_digits() {
        assert_eq!(parse_max_length("256"), 256);
        assert_eq!(parse_max_length("512"), 512);
        assert_eq!(parse_max_length(" 64 "), 64);
    }

    #[test]
    fn max_length_falls_back() {
        assert_eq!(parse_max_length("abc"), 256);
        assert_eq!(parse_max_length(""), 256);
        assert_eq!(parse_max_length("-5"), 256);
        assert_eq!(parse_max_length("+5"), 256);
        assert_eq!(parse_max_length("0"), 256);
        assert_eq!(parse_max_length("12.5"), 256);
        assert_eq!(parse_max_length("99999999999999"), 256);
    }

    #[test]
    fn sampling_defaults() {
        let s = SamplingParams::default();
        assert_eq!(s.top_p, 0.95);
        assert_eq!(s.top_k, 0);
        assert_eq!(s.temperature, 0.6);
        assert_eq!(s.rep_pen, 1.1);
        assert_eq!(s.min_p, 0.1);
    }

    #[test]
    fn config_builder() {
        let config = JobConfig::builder()
            .server("http://gpu-box:5001")
            .style(8)
            .max_length(128)
            .build();
        assert_eq!(config.server, "http://gpu-box:5001");
        assert_eq!(config.instruction, INSTRUCTION_STYLES[8]);
        assert_eq!(config.max_length, 128);
        assert_eq!(config.max_dimension, DEFAULT_MAX_DIMENSION);
        assert_eq!(config.system_instruction, DEFAULT_SYSTEM_INSTRUCTION);
    }

    #[test]
    fn style_out_of_range_is_ignored() {
        let config = JobConfig::builder().instruction("custom").style(99).build();
        assert_eq!(config.instruction, "custom");
    }

    #[test]
    fn progress_percent() {
        assert_eq!(RunProgress { completed: 1, total: 3 }.percent(), 33);
        assert_eq!(RunProgress { completed: 2, total: 2 }.percent(), 100);
        assert_eq!(RunProgress { completed: 0, total: 0 }.percent(), 0);
    }
}
