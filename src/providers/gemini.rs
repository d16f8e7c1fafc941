//! Gemini `generateContent` client.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ContentGenerator, Part};
use crate::error::AppError;

pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: format!("{base_url}/models/{model}:generateContent"),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn generate(&self, parts: Vec<Part>) -> Result<String, AppError> {
        let payload = request_body(&parts);
        debug!(parts = parts.len(), "sending generateContent request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| AppError::upstream(format!("Gemini request failed: {err}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| AppError::upstream(format!("failed to read Gemini response: {err}")))?;

        if !status.is_success() {
            let message = api_error_message(&body).unwrap_or(body);
            warn!(%status, "Gemini rejected request");
            return Err(AppError::upstream(format!(
                "Gemini API error ({status}): {message}"
            )));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|err| AppError::upstream(format!("unexpected Gemini response: {err}")))?;
        extract_text(parsed)
    }
}

fn request_body(parts: &[Part]) -> Value {
    let parts = parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => json!({ "text": text }),
            Part::InlineData { mime_type, data } => json!({
                "inline_data": {
                    "mime_type": mime_type,
                    "data": STANDARD.encode(data),
                }
            }),
        })
        .collect::<Vec<_>>();

    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn extract_text(response: GenerateContentResponse) -> Result<String, AppError> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(AppError::upstream(format!(
            "Gemini blocked the prompt: {reason}"
        )));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(AppError::upstream("Gemini returned no candidates"));
    };

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate
            .finish_reason
            .unwrap_or_else(|| "UNKNOWN".to_string());
        return Err(AppError::upstream(format!(
            "Gemini returned no text (finish reason {reason})"
        )));
    }

    Ok(text)
}

fn api_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value["error"]["message"].as_str().map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> GenerateContentResponse {
        serde_json::from_str(raw).expect("response json")
    }

    #[test]
    fn joins_text_parts_of_first_candidate() {
        let response = parse(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"A "},{"text":"cat."}]},"finishReason":"STOP"}]}"#,
        );
        assert_eq!(extract_text(response).unwrap(), "A cat.");
    }

    #[test]
    fn blocked_prompt_is_upstream_error() {
        let response = parse(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        let err = extract_text(response).unwrap_err();
        assert!(matches!(err, AppError::Upstream(ref m) if m.contains("SAFETY")));
    }

    #[test]
    fn candidate_without_text_reports_finish_reason() {
        let response = parse(r#"{"candidates":[{"finishReason":"RECITATION"}]}"#);
        let err = extract_text(response).unwrap_err();
        assert!(err.to_string().contains("RECITATION"));
    }

    #[test]
    fn inline_image_is_base64_encoded() {
        let body = request_body(&[
            Part::Text("Describe this image in detail:".to_string()),
            Part::InlineData {
                mime_type: "image/png".to_string(),
                data: vec![1, 2, 3],
            },
        ]);
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "Describe this image in detail:");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "AQID");
        assert_eq!(body["contents"][0]["role"], "user");
    }

    #[test]
    fn api_error_message_reads_nested_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body).as_deref(), Some("API key not valid"));
        assert_eq!(api_error_message("<html>"), None);
    }
}
