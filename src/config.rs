//! Configuration loading from environment variables.
//!
//! Values are validated early so startup fails fast with actionable errors.
//! Only the generative-AI key is mandatory; speech credentials are checked per
//! call so the rest of the relay keeps working without them.

use std::env;
use std::path::PathBuf;

use crate::error::AppError;
use crate::session::validate_language_code;

pub const DEFAULT_GENAI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TRANSLATE_BASE_URL: &str = "https://translate.googleapis.com/translate_a/single";
pub const DEFAULT_CAPTURE_SECS: usize = 5;
pub const MAX_CAPTURE_SECS: usize = 30;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 20;
pub const MAX_UPLOAD_MB: usize = 100;

/// Runtime configuration for the HTTP server and the provider clients.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host interface to bind, for example `127.0.0.1`.
    pub host: String,
    /// TCP port to bind.
    pub port: u16,
    /// Gemini API key.
    pub genai_key: String,
    /// Gemini model used for image description and chat.
    pub genai_model: String,
    /// Base URL of the Gemini REST API, without trailing slash.
    pub genai_base_url: String,
    /// Endpoint of the Google Translate web API.
    pub translate_base_url: String,
    /// Azure Speech subscription key.
    pub speech_key: Option<String>,
    /// Azure Speech region, for example `westeurope`.
    pub speech_region: Option<String>,
    /// Target language the session starts with.
    pub default_language: String,
    /// Length of one microphone capture session.
    pub capture_secs: usize,
    /// Directory for synthesized audio files.
    pub audio_output_dir: PathBuf,
    /// Request body cap for multipart uploads, in bytes.
    pub max_upload_bytes: usize,
}

impl AppConfig {
    /// Builds configuration from environment variables.
    ///
    /// Variables:
    /// - `HOST` (default `127.0.0.1`)
    /// - `PORT` (default `8000`)
    /// - `GENAI_KEY` (required)
    /// - `GENAI_MODEL` (default `gemini-2.0-flash`)
    /// - `GENAI_BASE_URL`, `TRANSLATE_BASE_URL` (provider endpoints)
    /// - `AZURE_SPEECH_KEY`, `AZURE_SPEECH_REGION` (optional)
    /// - `DEFAULT_LANGUAGE` (default `en`)
    /// - `SPEECH_CAPTURE_SECS` (default `5`, min `1`, max `30`)
    /// - `AUDIO_OUTPUT_DIR` (default: system temp directory)
    /// - `MAX_UPLOAD_MB` (default `20`, min `1`, max `100`)
    pub fn from_env() -> Result<Self, AppError> {
        let genai_key = env_opt("GENAI_KEY").ok_or_else(|| {
            AppError::configuration("missing GENAI_KEY; a Gemini API key is required")
        })?;
        let capture_secs = env_usize_bounded(
            "SPEECH_CAPTURE_SECS",
            DEFAULT_CAPTURE_SECS,
            1,
            MAX_CAPTURE_SECS,
        )?;
        let max_upload_mb =
            env_usize_bounded("MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB, 1, MAX_UPLOAD_MB)?;

        Ok(Self {
            host: env_str("HOST", "127.0.0.1"),
            port: env_u16("PORT", 8000)?,
            genai_key,
            genai_model: env_str("GENAI_MODEL", DEFAULT_GENAI_MODEL),
            genai_base_url: env_str("GENAI_BASE_URL", DEFAULT_GENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            translate_base_url: env_str("TRANSLATE_BASE_URL", DEFAULT_TRANSLATE_BASE_URL),
            speech_key: env_opt("AZURE_SPEECH_KEY"),
            speech_region: env_opt("AZURE_SPEECH_REGION"),
            default_language: parse_default_language(&env_str("DEFAULT_LANGUAGE", "en"))?,
            capture_secs,
            audio_output_dir: env_opt("AUDIO_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }
}

fn parse_default_language(raw: &str) -> Result<String, AppError> {
    let language = raw.trim().to_ascii_lowercase();
    validate_language_code(&language).map_err(|_| {
        AppError::configuration(format!(
            "invalid DEFAULT_LANGUAGE={raw:?}; expected a language code such as `en` or `zh-cn`"
        ))
    })?;
    Ok(language)
}

fn env_str(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

fn env_u16(name: &str, default: u16) -> Result<u16, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_port(name, &raw)
}

fn parse_port(name: &str, raw: &str) -> Result<u16, AppError> {
    let parsed = raw.trim().parse::<u16>().map_err(|_| {
        AppError::configuration(format!("invalid {name}={raw:?}; expected integer 1-65535"))
    })?;
    if parsed == 0 {
        return Err(AppError::configuration(format!(
            "invalid {name}={raw:?}; expected > 0"
        )));
    }
    Ok(parsed)
}

fn env_usize_bounded(
    name: &str,
    default: usize,
    min: usize,
    max: usize,
) -> Result<usize, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_usize_bounded(name, &raw, min, max)
}

fn parse_usize_bounded(name: &str, raw: &str, min: usize, max: usize) -> Result<usize, AppError> {
    let trimmed = raw.trim();
    let parsed = trimmed.parse::<usize>().map_err(|_| {
        AppError::configuration(format!(
            "invalid {name}={raw:?}; expected integer in range [{min}, {max}]"
        ))
    })?;
    if parsed < min || parsed > max {
        return Err(AppError::configuration(format!(
            "invalid {name}={raw:?}; expected integer in range [{min}, {max}]"
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::{parse_default_language, parse_port, parse_usize_bounded};

    #[test]
    fn parse_usize_bounded_accepts_in_range_values() {
        assert_eq!(
            parse_usize_bounded("SPEECH_CAPTURE_SECS", "1", 1, 30).unwrap(),
            1
        );
        assert_eq!(
            parse_usize_bounded("SPEECH_CAPTURE_SECS", " 30 ", 1, 30).unwrap(),
            30
        );
    }

    #[test]
    fn parse_usize_bounded_rejects_non_numeric_value() {
        assert!(parse_usize_bounded("MAX_UPLOAD_MB", "lots", 1, 100).is_err());
    }

    #[test]
    fn parse_usize_bounded_rejects_out_of_range_values() {
        assert!(parse_usize_bounded("SPEECH_CAPTURE_SECS", "0", 1, 30).is_err());
        assert!(parse_usize_bounded("SPEECH_CAPTURE_SECS", "31", 1, 30).is_err());
    }

    #[test]
    fn parse_port_rejects_zero_and_garbage() {
        assert_eq!(parse_port("PORT", "8000").unwrap(), 8000);
        assert!(parse_port("PORT", "0").is_err());
        assert!(parse_port("PORT", "http").is_err());
    }

    #[test]
    fn parse_default_language_lowercases_valid_codes() {
        assert_eq!(parse_default_language("FR").unwrap(), "fr");
        assert_eq!(parse_default_language(" zh-CN ").unwrap(), "zh-cn");
    }

    #[test]
    fn parse_default_language_rejects_malformed_codes() {
        for raw in ["en_US", "", "f r", "thisiswaytoolong"] {
            assert!(parse_default_language(raw).is_err(), "{raw:?}");
        }
    }
}
