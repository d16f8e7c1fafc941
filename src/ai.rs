//! Generative-AI adapter: image description and transcript continuation.

use std::io::Cursor;
use std::sync::Arc;

use image::ImageFormat;
use tracing::debug;

use crate::error::AppError;
use crate::providers::{ContentGenerator, Part};

/// Instruction sent ahead of every uploaded image.
pub const DESCRIBE_INSTRUCTION: &str = "Describe this image in detail:";

pub struct AiAdapter {
    generator: Arc<dyn ContentGenerator>,
}

impl AiAdapter {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }

    /// Describes an uploaded image.
    ///
    /// Undecodable bytes fail before the provider is called.
    pub async fn describe_image(&self, image_bytes: Vec<u8>) -> Result<String, AppError> {
        let inline = tokio::task::spawn_blocking(move || prepare_image(image_bytes))
            .await
            .map_err(|err| AppError::internal(format!("image decode task failed: {err}")))??;

        self.generator
            .generate(vec![Part::Text(DESCRIBE_INSTRUCTION.to_string()), inline])
            .await
    }

    /// Sends the whole transcript, in order, and returns the model's next turn.
    pub async fn continue_chat(&self, transcript: &[String]) -> Result<String, AppError> {
        debug!(turns = transcript.len(), "continuing conversation");
        let parts = transcript.iter().cloned().map(Part::Text).collect();
        self.generator.generate(parts).await
    }
}

/// Decodes `bytes` to verify them and returns an inline part Gemini accepts.
///
/// PNG, JPEG and WebP pass through unchanged; other formats are re-encoded
/// as PNG.
fn prepare_image(bytes: Vec<u8>) -> Result<Part, AppError> {
    let format = image::guess_format(&bytes)
        .map_err(|err| AppError::upstream(format!("cannot identify image file: {err}")))?;
    let decoded = image::load_from_memory_with_format(&bytes, format)
        .map_err(|err| AppError::upstream(format!("failed to decode image: {err}")))?;

    match format {
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP => Ok(Part::InlineData {
            mime_type: format.to_mime_type().to_string(),
            data: bytes,
        }),
        _ => {
            let mut png = Cursor::new(Vec::new());
            decoded
                .write_to(&mut png, ImageFormat::Png)
                .map_err(|err| AppError::internal(format!("failed to re-encode image: {err}")))?;
            Ok(Part::InlineData {
                mime_type: ImageFormat::Png.to_mime_type().to_string(),
                data: png.into_inner(),
            })
        }
    }
}
