//! Google Translate web endpoint client (`client=gtx`).

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::warn;

use super::TranslationProvider;
use crate::error::AppError;

pub struct GoogleTranslateClient {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleTranslateClient {
    pub fn new(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl TranslationProvider for GoogleTranslateClient {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, AppError> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("client", "gtx"), ("sl", source), ("tl", target), ("dt", "t")])
            .form(&[("q", text)])
            .send()
            .await
            .map_err(|err| AppError::upstream(format!("translation request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, target, "translation provider rejected request");
            return Err(rejection_error(status, target, &body));
        }

        let body: Value = response.json().await.map_err(|err| {
            AppError::upstream(format!("unexpected translation response: {err}"))
        })?;
        parse_translation(&body)
    }
}

/// Builds the error for a non-2xx response, keeping a short body excerpt.
fn rejection_error(status: StatusCode, target: &str, body: &str) -> AppError {
    let excerpt = body.trim().chars().take(200).collect::<String>();
    if excerpt.is_empty() {
        AppError::upstream(format!(
            "translation provider returned {status} for target language {target:?}"
        ))
    } else {
        AppError::upstream(format!(
            "translation provider returned {status} for target language {target:?}: {excerpt}"
        ))
    }
}

/// Joins the translated segments of a `translate_a/single` response.
///
/// The body is a nested array whose first element lists
/// `[translated, original, ...]` segments.
fn parse_translation(body: &Value) -> Result<String, AppError> {
    let Some(top) = body.as_array() else {
        return Err(AppError::upstream(
            "unexpected translation response: expected a JSON array",
        ));
    };
    let segments = match top.first().unwrap_or(&Value::Null) {
        Value::Array(segments) => segments,
        Value::Null => return Ok(String::new()),
        _ => {
            return Err(AppError::upstream(
                "unexpected translation response: missing segment list",
            ))
        }
    };

    Ok(segments
        .iter()
        .filter_map(|segment| segment[0].as_str())
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use reqwest::StatusCode;

    use super::{parse_translation, rejection_error};
    use crate::error::AppError;

    #[test]
    fn concatenates_segments_in_order() {
        let body = json!([
            [
                ["Bonjour le monde ! ", "Hello, world! ", null, null, 10],
                ["Un chat.", "A cat.", null, null, 10]
            ],
            null,
            "en"
        ]);
        assert_eq!(
            parse_translation(&body).unwrap(),
            "Bonjour le monde ! Un chat."
        );
    }

    #[test]
    fn null_segment_list_is_empty_translation() {
        assert_eq!(parse_translation(&json!([null, null, "en"])).unwrap(), "");
    }

    #[test]
    fn object_body_is_rejected() {
        assert!(parse_translation(&json!({"error": "bad"})).is_err());
    }

    #[test]
    fn non_array_bodies_are_upstream_errors() {
        for body in [json!(null), json!("Bonjour"), json!({"0": [["x"]]})] {
            assert!(matches!(
                parse_translation(&body),
                Err(AppError::Upstream(_))
            ));
        }
    }

    #[test]
    fn rejected_status_names_status_target_and_body() {
        let err = rejection_error(StatusCode::BAD_REQUEST, "zz", "  Bad Request: tl  ");
        assert!(matches!(err, AppError::Upstream(_)));
        let message = err.to_string();
        assert!(message.contains("400 Bad Request"));
        assert!(message.contains("\"zz\""));
        assert!(message.ends_with(": Bad Request: tl"));
    }

    #[test]
    fn rejected_status_without_body_omits_excerpt() {
        let err = rejection_error(StatusCode::SERVICE_UNAVAILABLE, "fr", "");
        assert_eq!(
            err.to_string(),
            "translation provider returned 503 Service Unavailable for target language \"fr\""
        );
    }
}
