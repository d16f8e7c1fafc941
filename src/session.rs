//! Process-wide session: target language, transcript, and the translator
//! bound to the current language.
//!
//! All reads and mutations go through one async mutex. Handlers that need a
//! multi-step update (chat) hold the guard across the whole sequence.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::error::AppError;
use crate::providers::TranslationProvider;
use crate::translation::Translator;

/// Text translated once to validate a new target language.
pub const TRIAL_TEXT: &str = "Hello, world!";
const MAX_LANGUAGE_CODE_LEN: usize = 12;

/// Mutable session contents, reachable only through [`Session::lock`].
pub struct SessionState {
    target_language: String,
    transcript: Vec<String>,
    translator: Translator,
}

impl SessionState {
    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// Translator for the current target language; fetch it per call.
    pub fn translator(&self) -> Translator {
        self.translator.clone()
    }

    /// Replaces the transcript with a single turn.
    pub fn reset_transcript(&mut self, text: impl Into<String>) {
        self.transcript = vec![text.into()];
    }

    pub fn append_transcript(&mut self, text: impl Into<String>) {
        self.transcript.push(text.into());
    }

    /// Returns the most recent turn.
    pub fn last_turn(&self) -> Result<&str, AppError> {
        self.transcript
            .last()
            .map(String::as_str)
            .ok_or_else(|| AppError::precondition("No response available to convert to speech."))
    }
}

/// Result of a successful language change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageChange {
    pub language: String,
    pub test_translation: String,
}

/// The single session shared by every request handler.
pub struct Session {
    provider: Arc<dyn TranslationProvider>,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(provider: Arc<dyn TranslationProvider>, default_language: &str) -> Self {
        let language = normalize_language(default_language);
        let translator = Translator::new(provider.clone(), language.clone());
        Self {
            provider,
            state: Mutex::new(SessionState {
                target_language: language,
                transcript: Vec::new(),
                translator,
            }),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Switches the target language after a trial translation succeeds.
    ///
    /// The previous language and translator stay in place on failure.
    pub async fn set_language(&self, code: &str) -> Result<LanguageChange, AppError> {
        let language = normalize_language(code);
        validate_language_code(&language)?;

        let translator = Translator::new(self.provider.clone(), language.clone());
        let test_translation = translator.translate(TRIAL_TEXT).await.map_err(|err| {
            warn!(language = %language, error = %err, "translation setup failed");
            AppError::configuration(format!("Failed to set language {language:?}: {err}"))
        })?;

        let mut state = self.state.lock().await;
        state.target_language = language.clone();
        state.translator = translator;
        info!(language = %language, test_translation = %test_translation, "target language updated");

        Ok(LanguageChange {
            language,
            test_translation,
        })
    }
}

fn normalize_language(code: &str) -> String {
    code.trim().to_lowercase()
}

/// Accepts ASCII letters and `-`, up to twelve characters.
pub fn validate_language_code(code: &str) -> Result<(), AppError> {
    let well_formed = !code.is_empty()
        && code.len() <= MAX_LANGUAGE_CODE_LEN
        && code.chars().all(|c| c.is_ascii_alphabetic() || c == '-');
    if well_formed {
        Ok(())
    } else {
        Err(AppError::configuration(format!(
            "invalid language code {code:?}"
        )))
    }
}
