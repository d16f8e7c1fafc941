//! Azure Speech REST client: short-audio recognition and neural TTS.
//!
//! Credentials are optional at startup. A missing key or region is reported
//! on each call so the rest of the relay stays usable.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::SpeechProvider;
use crate::error::AppError;
use crate::speech::{Recognition, Voice};

const OUTPUT_FORMAT: &str = "audio-16khz-128kbitrate-mono-mp3";
const WAV_CONTENT_TYPE: &str = "audio/wav; codecs=audio/pcm; samplerate=16000";

pub struct AzureSpeechClient {
    client: reqwest::Client,
    key: Option<String>,
    region: Option<String>,
}

impl AzureSpeechClient {
    pub fn new(client: reqwest::Client, key: Option<String>, region: Option<String>) -> Self {
        Self {
            client,
            key,
            region,
        }
    }

    fn credentials(&self) -> Result<(&str, &str), AppError> {
        match (self.key.as_deref(), self.region.as_deref()) {
            (Some(key), Some(region)) => Ok((key, region)),
            _ => Err(AppError::configuration(
                "speech service is not configured; set AZURE_SPEECH_KEY and AZURE_SPEECH_REGION",
            )),
        }
    }
}

#[async_trait]
impl SpeechProvider for AzureSpeechClient {
    async fn recognize_once(&self, locale: &str, wav: Vec<u8>) -> Result<Recognition, AppError> {
        let (key, region) = self.credentials()?;
        let url = format!(
            "https://{region}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1"
        );

        let response = self
            .client
            .post(url)
            .query(&[("language", locale), ("format", "simple")])
            .header("Ocp-Apim-Subscription-Key", key)
            .header(reqwest::header::CONTENT_TYPE, WAV_CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, "application/json")
            .body(wav)
            .send()
            .await
            .map_err(|err| AppError::upstream(format!("speech recognition request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, locale, "speech recognition rejected");
            return Err(AppError::upstream(format!(
                "speech recognition failed with {status}: {body}"
            )));
        }

        let result: RecognitionResponse = response.json().await.map_err(|err| {
            AppError::upstream(format!("unexpected speech recognition response: {err}"))
        })?;
        debug!(status = %result.recognition_status, "speech recognition finished");
        result.into_recognition()
    }

    async fn synthesize(&self, text: &str, voice: &Voice) -> Result<Vec<u8>, AppError> {
        let (key, region) = self.credentials()?;
        let url = format!("https://{region}.tts.speech.microsoft.com/cognitiveservices/v1");

        let response = self
            .client
            .post(url)
            .header("Ocp-Apim-Subscription-Key", key)
            .header(reqwest::header::CONTENT_TYPE, "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .body(ssml(text, voice))
            .send()
            .await
            .map_err(|err| AppError::upstream(format!("speech synthesis request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, voice = voice.name, "speech synthesis rejected");
            return Err(AppError::upstream(format!(
                "Text-to-Speech conversion failed with {status}: {body}"
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|err| AppError::upstream(format!("failed to read synthesized audio: {err}")))?;
        if audio.is_empty() {
            return Err(AppError::upstream(
                "Text-to-Speech conversion failed: no audio returned",
            ));
        }
        Ok(audio.to_vec())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognitionResponse {
    recognition_status: String,
    display_text: Option<String>,
}

impl RecognitionResponse {
    fn into_recognition(self) -> Result<Recognition, AppError> {
        match self.recognition_status.as_str() {
            "Success" => match self.display_text.filter(|text| !text.trim().is_empty()) {
                Some(text) => Ok(Recognition::Recognized(text)),
                None => Ok(Recognition::NotRecognized),
            },
            "NoMatch" | "InitialSilenceTimeout" | "BabbleTimeout" => Ok(Recognition::NotRecognized),
            other => Err(AppError::upstream(format!(
                "speech recognition failed with status {other}"
            ))),
        }
    }
}

fn ssml(text: &str, voice: &Voice) -> String {
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{locale}'><voice name='{name}'>{text}</voice></speak>",
        locale = voice.locale,
        name = voice.name,
        text = escape_xml(text),
    )
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
