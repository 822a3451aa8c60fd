//! Generation service client.
//!
//! Thin wrapper over the `generateContent` HTTP API. Every failure mode is
//! a [`GenerationError`] kind rather than control flow: the orchestrator
//! decides what to do with an error (it embeds the message in the overview
//! so retrieved documents still reach the caller). A non-2xx response is a
//! hard failure for that step; there is no retry.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::GenerationConfig;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("GEMINI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("generation request failed: {0}")]
    Transport(String),

    #[error("generation service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed generation response: {0}")]
    MalformedResponse(String),
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationOptions,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationOptions {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

pub struct GeminiClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f64,
    max_output_tokens: u32,
}

impl GeminiClient {
    /// Build a client from configuration. Fails fast when the API key is
    /// absent so the orchestrator can report it without issuing a request.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key =
            std::env::var("GEMINI_API_KEY").map_err(|_| GenerationError::MissingApiKey)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    /// One generation call: prompt in, trimmed answer text out.
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationOptions {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        extract_answer_text(&json)
    }
}

/// Pull `candidates[0].content.parts[0].text` out of the response JSON.
fn extract_answer_text(json: &serde_json::Value) -> Result<String, GenerationError> {
    json.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
        .map(|t| t.trim().to_string())
        .ok_or_else(|| {
            GenerationError::MalformedResponse("missing candidates[0].content.parts[0].text".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "What is soil erosion?",
                }],
            }],
            generation_config: GenerationOptions {
                temperature: 0.3,
                max_output_tokens: 1600,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json["contents"][0]["parts"][0]["text"],
            "What is soil erosion?"
        );
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1600);
        assert!((json["generationConfig"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_extract_answer_text() {
        let json = serde_json::json!({
            "candidates": [
                {"content": {"parts": [{"text": "  An answer. \n"}]}}
            ]
        });
        assert_eq!(extract_answer_text(&json).unwrap(), "An answer.");
    }

    #[test]
    fn test_extract_answer_text_missing_candidates() {
        let json = serde_json::json!({"promptFeedback": {}});
        assert!(matches!(
            extract_answer_text(&json),
            Err(GenerationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_error_display_includes_status() {
        let err = GenerationError::Status {
            status: 403,
            body: "forbidden".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("403"));
        assert!(msg.contains("forbidden"));
    }
}
