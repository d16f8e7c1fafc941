//! Provider abstraction for the three external services.
//!
//! Adapters and the HTTP layer depend on these traits instead of concrete
//! clients, which keeps request sequencing decoupled from wire formats.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::speech::{Recognition, Voice};

pub mod azure_speech;
pub mod gemini;
pub mod google_translate;

/// One piece of a generative-model prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    /// Raw media bytes sent inline with their MIME type.
    InlineData { mime_type: String, data: Vec<u8> },
}

/// Generative-content contract: prompt parts in, text out.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, parts: Vec<Part>) -> Result<String, AppError>;
}

/// Machine-translation contract.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Translates `text` from `source` (or `"auto"`) into `target`.
    async fn translate(&self, text: &str, source: &str, target: &str)
        -> Result<String, AppError>;
}

/// Speech recognition and synthesis contract.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Recognizes one utterance from a 16 kHz mono PCM WAV clip.
    async fn recognize_once(&self, locale: &str, wav: Vec<u8>) -> Result<Recognition, AppError>;
    /// Synthesizes `text` with `voice`, returning MPEG audio bytes.
    async fn synthesize(&self, text: &str, voice: &Voice) -> Result<Vec<u8>, AppError>;
}

/// Concrete provider set used by the running server.
pub struct Providers {
    pub generator: Arc<dyn ContentGenerator>,
    pub translation: Arc<dyn TranslationProvider>,
    pub speech: Arc<dyn SpeechProvider>,
}

/// Builds the provider clients from configuration, sharing one HTTP client.
pub fn build_providers(cfg: &AppConfig) -> Result<Providers, AppError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| AppError::internal(format!("failed to create HTTP client: {err}")))?;

    Ok(Providers {
        generator: Arc::new(gemini::GeminiClient::new(
            client.clone(),
            &cfg.genai_base_url,
            &cfg.genai_model,
            &cfg.genai_key,
        )),
        translation: Arc::new(google_translate::GoogleTranslateClient::new(
            client.clone(),
            &cfg.translate_base_url,
        )),
        speech: Arc::new(azure_speech::AzureSpeechClient::new(
            client,
            cfg.speech_key.clone(),
            cfg.speech_region.clone(),
        )),
    })
}
