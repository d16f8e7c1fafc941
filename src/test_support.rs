//! Provider doubles shared by unit and router tests.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use image::{ImageBuffer, ImageFormat, Rgb};

use crate::capture::AudioCapture;
use crate::error::AppError;
use crate::providers::{ContentGenerator, Part, SpeechProvider, TranslationProvider};
use crate::speech::{Recognition, Voice};

/// Target language the translation double refuses.
pub const REJECTED_LANGUAGE: &str = "xx";

/// Prefixes text with `[target] `; fails for [`REJECTED_LANGUAGE`].
#[derive(Default)]
pub struct MockTranslation {
    calls: Mutex<Vec<(String, String, String)>>,
}

impl MockTranslation {
    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranslationProvider for MockTranslation {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, AppError> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), source.to_string(), target.to_string()));
        if target == REJECTED_LANGUAGE {
            return Err(AppError::upstream(format!("invalid destination language {target}")));
        }
        Ok(format!("[{target}] {text}"))
    }
}

/// Never answers; signals once a translation has started.
#[derive(Default)]
pub struct HangingTranslation {
    entered: tokio::sync::Notify,
}

impl HangingTranslation {
    pub async fn entered(&self) {
        self.entered.notified().await;
    }
}

#[async_trait]
impl TranslationProvider for HangingTranslation {
    async fn translate(
        &self,
        _text: &str,
        _source: &str,
        _target: &str,
    ) -> Result<String, AppError> {
        self.entered.notify_one();
        std::future::pending().await
    }
}

/// Answers image prompts with `description` and text prompts with `reply`.
pub struct MockGenerator {
    description: String,
    reply: String,
    fail: bool,
    calls: Mutex<Vec<Vec<Part>>>,
}

impl MockGenerator {
    pub fn new(description: &str, reply: &str) -> Self {
        Self {
            description: description.to_string(),
            reply: reply.to_string(),
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("", "")
        }
    }

    pub fn calls(&self) -> Vec<Vec<Part>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(&self, parts: Vec<Part>) -> Result<String, AppError> {
        let has_image = parts
            .iter()
            .any(|part| matches!(part, Part::InlineData { .. }));
        self.calls.lock().unwrap().push(parts);
        if self.fail {
            return Err(AppError::upstream("Gemini API error (503): overloaded"));
        }
        Ok(if has_image {
            self.description.clone()
        } else {
            self.reply.clone()
        })
    }
}

/// Synthesizes `voice|text` as the audio bytes.
pub struct MockSpeech {
    recognition: Recognition,
    locales: Mutex<Vec<String>>,
    synthesized: Mutex<Vec<(String, String)>>,
}

impl Default for MockSpeech {
    fn default() -> Self {
        Self {
            recognition: Recognition::NotRecognized,
            locales: Mutex::new(Vec::new()),
            synthesized: Mutex::new(Vec::new()),
        }
    }
}

impl MockSpeech {
    pub fn recognizing(text: &str) -> Self {
        Self {
            recognition: Recognition::Recognized(text.to_string()),
            ..Self::default()
        }
    }

    pub fn recognized_locales(&self) -> Vec<String> {
        self.locales.lock().unwrap().clone()
    }

    pub fn synthesized(&self) -> Vec<(String, String)> {
        self.synthesized.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechProvider for MockSpeech {
    async fn recognize_once(&self, locale: &str, _wav: Vec<u8>) -> Result<Recognition, AppError> {
        self.locales.lock().unwrap().push(locale.to_string());
        Ok(self.recognition.clone())
    }

    async fn synthesize(&self, text: &str, voice: &Voice) -> Result<Vec<u8>, AppError> {
        self.synthesized
            .lock()
            .unwrap()
            .push((text.to_string(), voice.name.to_string()));
        tokio::task::yield_now().await;
        Ok(format!("{}|{}", voice.name, text).into_bytes())
    }
}

/// Returns one second of silence and counts sessions.
#[derive(Default)]
pub struct MockCapture {
    captures: AtomicUsize,
}

impl MockCapture {
    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioCapture for MockCapture {
    async fn capture(&self) -> Result<Vec<f32>, AppError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.0; 16_000])
    }
}

/// Fresh, existing directory for synthesized audio.
pub fn test_output_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("polyglot-relay-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// A small solid-color image encoded as `format`.
pub fn encode_image(format: ImageFormat) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(4, 4, Rgb([200u8, 120, 40]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}
