//! OpenAI-compatible chat completions backend

use super::{BackendAnswer, Extraction, ExtractionSchema, Passage, ReasoningBackend, ReasoningError};
use crate::text::{content_terms, tokenize};
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are an enterprise document analyst. Answer strictly from the \
provided passages. If the passages do not contain the answer, say so.";

#[derive(Debug, Clone)]
pub struct OpenAiBackendConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub timeout: Duration,
}

pub struct OpenAiBackend {
    client: reqwest::Client,
    config: OpenAiBackendConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiBackendConfig) -> Result<Self, ReasoningError> {
        if config.api_key.is_empty() {
            return Err(ReasoningError::Backend("API key is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ReasoningError::Backend(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            model = %config.model,
            "Using OpenAI-compatible reasoning at {}",
            config.base_url
        );
        Ok(Self { client, config })
    }

    async fn complete(
        &self,
        messages: Vec<Value>,
        response_format: Option<Value>,
    ) -> Result<String, ReasoningError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&ChatRequest {
                model: &self.config.model,
                messages,
                temperature: self.config.temperature,
                response_format,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReasoningError::Timeout(self.config.timeout)
                } else {
                    ReasoningError::Backend(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReasoningError::Backend(format!("API error {}: {}", status, body)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReasoningError::Backend(format!("Failed to parse response: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| ReasoningError::Backend("Response has no message content".to_string()))
    }
}

#[async_trait]
impl ReasoningBackend for OpenAiBackend {
    async fn answer(
        &self,
        query: &str,
        passages: &[Passage],
    ) -> Result<BackendAnswer, ReasoningError> {
        let context = passages
            .iter()
            .enumerate()
            .map(|(i, p)| format!("[{}] ({})\n{}", i + 1, p.source, p.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let instruction = if query.trim().is_empty() {
            "Summarize the passages in a few sentences.".to_string()
        } else {
            format!("Question: {}", query.trim())
        };

        let text = self
            .complete(
                vec![
                    json!({"role": "system", "content": SYSTEM_PROMPT}),
                    json!({
                        "role": "user",
                        "content": format!("Passages:\n{}\n\n{}", context, instruction),
                    }),
                ],
                None,
            )
            .await?;

        Ok(BackendAnswer {
            confidence: coverage(query, passages),
            text,
        })
    }

    async fn extract(
        &self,
        text: &str,
        schema: &ExtractionSchema,
    ) -> Result<Extraction, ReasoningError> {
        let fields = schema
            .fields()
            .iter()
            .map(|f| format!("- {} ({})", f.name, f.field_type.as_str()))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Extract these fields from the document and reply with a single JSON object \
             using exactly these keys. Use null for any value the document does not state.\n\
             {}\n\nDocument:\n{}",
            fields, text
        );

        let reply = self
            .complete(
                vec![
                    json!({"role": "system", "content": SYSTEM_PROMPT}),
                    json!({"role": "user", "content": prompt}),
                ],
                Some(json!({"type": "json_object"})),
            )
            .await?;

        match serde_json::from_str::<Value>(strip_code_fence(&reply)) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ReasoningError::Backend(format!(
                "Expected a JSON object, got {}",
                other
            ))),
            Err(e) => Err(ReasoningError::Backend(format!("Invalid JSON reply: {}", e))),
        }
    }

    async fn describe_image(
        &self,
        bytes: &[u8],
        media_type: &str,
        query: &str,
    ) -> Result<String, ReasoningError> {
        let data_url = format!(
            "data:{};base64,{}",
            media_type,
            base64::engine::general_purpose::STANDARD.encode(bytes)
        );
        let prompt = if query.trim().is_empty() {
            "Describe this image, transcribing any visible text.".to_string()
        } else {
            format!(
                "Describe this image, transcribing any visible text. Focus on: {}",
                query.trim()
            )
        };

        self.complete(
            vec![json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": prompt},
                    {"type": "image_url", "image_url": {"url": data_url}}
                ]
            })],
            None,
        )
        .await
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Share of query terms present in the passages
fn coverage(query: &str, passages: &[Passage]) -> f32 {
    let terms = content_terms(query);
    if terms.is_empty() {
        return if passages.is_empty() { 0.0 } else { 0.5 };
    }

    let tokens: HashSet<String> = passages.iter().flat_map(|p| tokenize(&p.text)).collect();
    let hits = terms.iter().filter(|t| tokens.contains(*t)).count();
    hits as f32 / terms.len() as f32
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
