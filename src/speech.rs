//! Speech adapter: one-shot recognition and synthesis to a per-request file.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::capture::{AudioCapture, CAPTURE_SAMPLE_RATE};
use crate::error::AppError;
use crate::providers::SpeechProvider;

/// Neural voice used for one target language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    pub language: &'static str,
    pub locale: &'static str,
    pub name: &'static str,
}

pub const VOICES: [Voice; 6] = [
    Voice {
        language: "en",
        locale: "en-US",
        name: "en-US-JennyNeural",
    },
    Voice {
        language: "fr",
        locale: "fr-FR",
        name: "fr-FR-DeniseNeural",
    },
    Voice {
        language: "es",
        locale: "es-ES",
        name: "es-ES-ElviraNeural",
    },
    Voice {
        language: "hi",
        locale: "hi-IN",
        name: "hi-IN-MadhurNeural",
    },
    Voice {
        language: "ta",
        locale: "ta-IN",
        name: "ta-IN-ValluvarNeural",
    },
    Voice {
        language: "te",
        locale: "te-IN",
        name: "te-IN-MohanNeural",
    },
];

/// Voice for `language`, falling back to English for unknown codes.
pub fn voice_for(language: &str) -> &'static Voice {
    VOICES
        .iter()
        .find(|voice| voice.language == language)
        .unwrap_or(&VOICES[0])
}

/// Recognition locale for `language`; unknown codes are passed through.
pub fn recognition_locale(language: &str) -> &str {
    VOICES
        .iter()
        .find(|voice| voice.language == language)
        .map(|voice| voice.locale)
        .unwrap_or(language)
}

/// Outcome of one recognition attempt. No speech is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    Recognized(String),
    NotRecognized,
}

/// Synthesized audio on local storage; the file is removed on drop.
#[derive(Debug)]
pub struct SynthesizedAudio {
    path: PathBuf,
}

impl SynthesizedAudio {
    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Reads the audio into memory.
    pub async fn read(&self) -> Result<Vec<u8>, AppError> {
        tokio::fs::read(&self.path).await.map_err(|err| {
            AppError::internal(format!(
                "failed to read synthesized audio {:?}: {err}",
                self.path
            ))
        })
    }
}

impl Drop for SynthesizedAudio {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub struct SpeechAdapter {
    provider: Arc<dyn SpeechProvider>,
    capture: Arc<dyn AudioCapture>,
    output_dir: PathBuf,
}

impl SpeechAdapter {
    pub fn new(
        provider: Arc<dyn SpeechProvider>,
        capture: Arc<dyn AudioCapture>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provider,
            capture,
            output_dir: output_dir.into(),
        }
    }

    /// Recognizes one utterance in `language`.
    ///
    /// `clip` holds 16 kHz mono samples from an upload; without it one
    /// capture session runs on the configured input device.
    pub async fn recognize_once(
        &self,
        language: &str,
        clip: Option<Vec<f32>>,
    ) -> Result<Recognition, AppError> {
        let samples = match clip {
            Some(samples) => samples,
            None => {
                info!("listening for speech");
                self.capture.capture().await?
            }
        };
        let wav = encode_wav(&samples)?;
        let locale = recognition_locale(language);
        debug!(locale, bytes = wav.len(), "recognizing speech");
        self.provider.recognize_once(locale, wav).await
    }

    /// Synthesizes `text` with the voice for `language` into a unique file.
    pub async fn synthesize(
        &self,
        text: &str,
        language: &str,
    ) -> Result<SynthesizedAudio, AppError> {
        let voice = voice_for(language);
        info!(voice = voice.name, chars = text.chars().count(), "synthesizing speech");

        let audio = self.provider.synthesize(text, voice).await?;

        let path = self
            .output_dir
            .join(format!("speech-{}.mp3", Uuid::new_v4()));
        tokio::fs::write(&path, &audio).await.map_err(|err| {
            AppError::internal(format!("failed to write synthesized audio {path:?}: {err}"))
        })?;
        Ok(SynthesizedAudio { path })
    }
}

/// Encodes mono samples as 16-bit PCM WAV at the capture rate.
fn encode_wav(samples: &[f32]) -> Result<Vec<u8>, AppError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: CAPTURE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|err| AppError::internal(format!("failed to start WAV encoding: {err}")))?;
    for sample in samples {
        let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(pcm)
            .map_err(|err| AppError::internal(format!("failed to encode WAV sample: {err}")))?;
    }
    writer
        .finalize()
        .map_err(|err| AppError::internal(format!("failed to finish WAV encoding: {err}")))?;
    Ok(cursor.into_inner())
}
