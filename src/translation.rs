//! Translation adapter bound to one target language.

use std::sync::Arc;

use crate::error::AppError;
use crate::providers::TranslationProvider;

/// Source language sent with every request; the provider detects it.
pub const SOURCE_AUTO: &str = "auto";
/// Longest text the provider accepts in one request.
pub const MAX_CHUNK_CHARS: usize = 5000;

/// Translator for a fixed `(auto, target)` pair.
///
/// Instances are cheap to clone. A language change builds a new one; holders
/// must not keep an instance past such a change.
#[derive(Clone)]
pub struct Translator {
    provider: Arc<dyn TranslationProvider>,
    target: String,
}

impl Translator {
    pub fn new(provider: Arc<dyn TranslationProvider>, target: impl Into<String>) -> Self {
        Self {
            provider,
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Translates `text` into the bound target language.
    ///
    /// Whitespace-only input is returned as-is without a provider call.
    pub async fn translate(&self, text: &str) -> Result<String, AppError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let mut translated = String::with_capacity(text.len());
        for chunk in split_chunks(text, MAX_CHUNK_CHARS) {
            let piece = self
                .provider
                .translate(chunk, SOURCE_AUTO, &self.target)
                .await?;
            translated.push_str(&piece);
        }
        Ok(translated)
    }
}

/// Splits `text` into pieces of at most `max_chars` characters, preferring
/// line boundaries. Concatenating the pieces yields `text` again.
fn split_chunks(text: &str, max_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut chars_in_chunk = 0;
    let mut last_break: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        if chars_in_chunk == max_chars {
            let end = last_break.unwrap_or(idx);
            chunks.push(&text[start..end]);
            chars_in_chunk = text[end..idx].chars().count();
            start = end;
            last_break = None;
        }
        chars_in_chunk += 1;
        if ch == '\n' {
            last_break = Some(idx + ch.len_utf8());
        }
    }

    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockTranslation;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_chunks("A cat.", 10), vec!["A cat."]);
    }

    #[test]
    fn splits_after_last_newline_within_limit() {
        let chunks = split_chunks("abc\ndef\nghij", 6);
        assert_eq!(chunks, vec!["abc\n", "def\n", "ghij"]);
        assert_eq!(chunks.concat(), "abc\ndef\nghij");
    }

    #[test]
    fn hard_splits_long_lines_on_char_boundaries() {
        let text = "ééééé";
        let chunks = split_chunks(text, 2);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }

    #[tokio::test]
    async fn translates_with_auto_source_and_bound_target() {
        let provider = Arc::new(MockTranslation::default());
        let translator = Translator::new(provider.clone(), "fr");

        assert_eq!(translator.translate("A cat.").await.unwrap(), "[fr] A cat.");
        assert_eq!(
            provider.calls(),
            vec![("A cat.".to_string(), "auto".to_string(), "fr".to_string())]
        );
    }

    #[tokio::test]
    async fn blank_text_skips_provider() {
        let provider = Arc::new(MockTranslation::default());
        let translator = Translator::new(provider.clone(), "fr");

        assert_eq!(translator.translate("  ").await.unwrap(), "  ");
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let provider = Arc::new(MockTranslation::default());
        let translator = Translator::new(provider, "xx");

        let err = translator.translate("Hello").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }
}
