//! Instruct templates for wrapping a system and user instruction into a
//! single raw prompt, the way KoboldCpp's `/api/v1/generate` expects it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prompt format understood by the loaded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructTemplate {
    ChatMl,
    Llama3,
    Alpaca,
    Mistral,
}

impl InstructTemplate {
    /// Wrap `system` and `instruction` into a prompt ending where the
    /// assistant's reply should begin.
    pub fn wrap(&self, system: &str, instruction: &str) -> String {
        match self {
            Self::ChatMl => format!(
                "<|im_start|>system\n{system}<|im_end|>\n<|im_start|>user\n{instruction}<|im_end|>\n<|im_start|>assistant\n"
            ),
            Self::Llama3 => format!(
                "<|start_header_id|>system<|end_header_id|>\n\n{system}<|eot_id|><|start_header_id|>user<|end_header_id|>\n\n{instruction}<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n"
            ),
            Self::Alpaca => {
                format!("{system}\n\n### Instruction:\n{instruction}\n\n### Response:\n")
            }
            Self::Mistral => format!("[INST] {system}\n\n{instruction} [/INST]"),
        }
    }

    /// Markers that end the assistant turn.
    pub fn stop_sequences(&self) -> &'static [&'static str] {
        match self {
            Self::ChatMl => &["<|im_end|>", "<|im_start|>"],
            Self::Llama3 => &["<|eot_id|>", "<|start_header_id|>"],
            Self::Alpaca => &["### Instruction:", "### Response:"],
            Self::Mistral => &["[INST]", "</s>"],
        }
    }

    /// Guess the template from a model name reported by the server.
    pub fn detect(model_name: &str) -> Self {
        let name = model_name.to_lowercase();
        if name.contains("llama-3") || name.contains("llama3") {
            Self::Llama3
        } else if name.contains("mistral") || name.contains("mixtral") {
            Self::Mistral
        } else if name.contains("alpaca") {
            Self::Alpaca
        } else {
            Self::ChatMl
        }
    }
}

impl fmt::Display for InstructTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ChatMl => "chatml",
            Self::Llama3 => "llama3",
            Self::Alpaca => "alpaca",
            Self::Mistral => "mistral",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for InstructTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chatml" => Ok(Self::ChatMl),
            "llama3" | "llama-3" => Ok(Self::Llama3),
            "alpaca" => Ok(Self::Alpaca),
            "mistral" => Ok(Self::Mistral),
            other => Err(format!("unknown instruct template '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chatml_wraps_both_turns() {
        let prompt = InstructTemplate::ChatMl.wrap("sys", "describe");
        assert!(prompt.starts_with("<|im_start|>system\nsys<|im_end|>"));
        assert!(prompt.contains("<|im_start|>user\ndescribe<|im_end|>"));
        assert!(prompt.ends_with("<|im_start|>assistant\n"));
    }

    #[test]
    fn alpaca_ends_at_response() {
        let prompt = InstructTemplate::Alpaca.wrap("sys", "tags");
        assert_eq!(prompt, "sys\n\n### Instruction:\ntags\n\n### Response:\n");
    }

    #[test]
    fn detect_from_model_name() {
        assert_eq!(
            InstructTemplate::detect("koboldcpp/Meta-Llama-3-8B-Instruct"),
            InstructTemplate::Llama3
        );
        assert_eq!(
            InstructTemplate::detect("koboldcpp/Mistral-7B-Instruct-v0.3"),
            InstructTemplate::Mistral
        );
        assert_eq!(
            InstructTemplate::detect("koboldcpp/qwen2-vl-7b"),
            InstructTemplate::ChatMl
        );
    }

    #[test]
    fn parse_round_trips_display() {
        for t in [
            InstructTemplate::ChatMl,
            InstructTemplate::Llama3,
            InstructTemplate::Alpaca,
            InstructTemplate::Mistral,
        ] {
            assert_eq!(t.to_string().parse::<InstructTemplate>().unwrap(), t);
        }
        assert!("vicuna".parse::<InstructTemplate>().is_err());
    }
}
