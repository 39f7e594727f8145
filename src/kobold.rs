use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::{CaptionError, Result};
use crate::template::InstructTemplate;
use crate::types::{GenerateRequest, JobConfig};
use crate::InferenceBackend;

/// Inference backend talking to a KoboldCpp server.
///
/// Each generate call is a single non-streaming `POST /api/v1/generate`.
/// When no template is configured, the loaded model's name is fetched from
/// `/api/v1/model` and used to pick one.
pub struct KoboldClient {
    client: Client,
    endpoint: String,
    configured_template: Option<InstructTemplate>,
    resolved_template: OnceCell<InstructTemplate>,
}

impl KoboldClient {
    /// Build a client for the server and timeout named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CaptionError::InvalidConfig`] if the server address is empty
    /// or the HTTP client cannot be constructed.
    pub fn new(config: &JobConfig) -> Result<Self> {
        let endpoint = config.server.trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(CaptionError::InvalidConfig(
                "server address is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CaptionError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            configured_template: config.template,
            resolved_template: OnceCell::new(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Name of the model currently loaded by the server.
    pub async fn model_name(&self) -> Result<String> {
        let url = format!("{}/api/v1/model", self.endpoint);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CaptionError::Connection(self.endpoint.clone(), e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(CaptionError::Server(status, text));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| CaptionError::InvalidResponse(e.to_string()))?;

        json.get("result")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| CaptionError::InvalidResponse("missing 'result' field".to_string()))
    }

    /// The template used for prompts, resolving it from the server on first use.
    ///
    /// Only a successful lookup is remembered; while the model cannot be
    /// queried each call falls back to ChatML and the next one asks again.
    pub async fn template(&self) -> InstructTemplate {
        if let Some(t) = self.configured_template {
            return t;
        }
        let resolved = self
            .resolved_template
            .get_or_try_init(|| async {
                let name = self.model_name().await?;
                let t = InstructTemplate::detect(&name);
                debug!(model = %name, template = %t, "detected instruct template");
                Ok::<_, CaptionError>(t)
            })
            .await;

        match resolved {
            Ok(t) => *t,
            Err(e) => {
                warn!(error = %e, "could not query loaded model, using chatml");
                InstructTemplate::ChatMl
            }
        }
    }
}

impl InferenceBackend for KoboldClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<Option<String>> {
        let template = self.template().await;
        let body = build_generate_body(template, request);

        let url = format!("{}/api/v1/generate", self.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CaptionError::Connection(self.endpoint.clone(), e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(CaptionError::Server(status, text));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| CaptionError::InvalidResponse(e.to_string()))?;

        Ok(extract_text(&json))
    }
}

/// Request body for `/api/v1/generate`.
pub(crate) fn build_generate_body(template: InstructTemplate, request: &GenerateRequest) -> Value {
    json!({
        "prompt": template.wrap(&request.system_instruction, &request.instruction),
        "images": request.images,
        "max_length": request.max_length,
        "top_p": request.sampling.top_p,
        "top_k": request.sampling.top_k,
        "temperature": request.sampling.temperature,
        "rep_pen": request.sampling.rep_pen,
        "min_p": request.sampling.min_p,
        "stop_sequence": template.stop_sequences(),
    })
}

/// Pull the generated text out of a generate response; blank output is `None`.
pub(crate) fn extract_text(json: &Value) -> Option<String> {
    let text = json
        .get("results")
        .and_then(|r| r.as_array())
        .and_then(|r| r.first())
        .and_then(|r| r.get("text"))
        .and_then(|t| t.as_str())?
        .trim();

    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
