//! Speech input: uploaded clip decoding and microphone capture.
//!
//! Both paths produce 16 kHz mono PCM (`f32`), the format the recognizer is
//! sent as WAV.

use std::io::{Cursor, ErrorKind};
use std::sync::Arc;

use async_trait::async_trait;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use crate::config::AppConfig;
use crate::error::AppError;

pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// File extensions accepted for uploaded speech clips.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "flac", "ogg", "webm"];

/// Source of one utterance when no clip is uploaded.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Records one capture session as 16 kHz mono samples.
    async fn capture(&self) -> Result<Vec<f32>, AppError>;
}

/// Capture source used when the binary is built without microphone support.
pub struct NoCaptureDevice;

#[async_trait]
impl AudioCapture for NoCaptureDevice {
    async fn capture(&self) -> Result<Vec<f32>, AppError> {
        Err(AppError::configuration(
            "no capture device: build with the `microphone` feature or upload an audio clip",
        ))
    }
}

/// Builds the capture source for this build.
#[cfg(feature = "microphone")]
pub fn default_capture(cfg: &AppConfig) -> Arc<dyn AudioCapture> {
    Arc::new(microphone::MicrophoneCapture::new(
        std::time::Duration::from_secs(cfg.capture_secs as u64),
    ))
}

/// Builds the capture source for this build.
#[cfg(not(feature = "microphone"))]
pub fn default_capture(_cfg: &AppConfig) -> Arc<dyn AudioCapture> {
    Arc::new(NoCaptureDevice)
}

/// Validates and normalizes the file extension from an uploaded filename.
///
/// Returns the lowercased extension without the leading dot.
pub fn validate_extension(filename: &str) -> Result<String, AppError> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_ascii_lowercase())
        .ok_or_else(|| {
            AppError::unsupported_media_type(
                "file must include an extension; accepted extensions: .wav,.mp3,.m4a,.flac,.ogg,.webm",
            )
        })?;

    if !SUPPORTED_EXTENSIONS.iter().any(|ext| *ext == extension) {
        return Err(AppError::unsupported_media_type(format!(
            "unsupported file extension .{extension}; accepted extensions: .wav,.mp3,.m4a,.flac,.ogg,.webm"
        )));
    }

    Ok(extension)
}

/// Decodes media bytes into normalized 16 kHz mono samples.
///
/// `extension_hint` is used to improve container format probing.
pub fn decode_to_mono_16khz_f32(bytes: &[u8], extension_hint: &str) -> Result<Vec<f32>, AppError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(extension_hint);

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| {
            AppError::unsupported_media_type(format!("failed to open media file: {err}"))
        })?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| AppError::unsupported_media_type("no audio track found in uploaded file"))?;

    if track.codec_params.codec == CODEC_TYPE_NULL {
        return Err(AppError::unsupported_media_type(
            "unsupported codec: missing codec information",
        ));
    }

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| AppError::unsupported_media_type(format!("unsupported codec: {err}")))?;

    let mut sample_rate = track
        .codec_params
        .sample_rate
        .unwrap_or(CAPTURE_SAMPLE_RATE);
    let track_id = track.id;
    let mut mono = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => {
                return Err(AppError::unsupported_media_type(
                    "decoder reset required for this media stream",
                ));
            }
            Err(err) => {
                return Err(AppError::unsupported_media_type(format!(
                    "failed while reading media stream: {err}"
                )));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(err) => {
                return Err(AppError::unsupported_media_type(format!(
                    "failed to decode audio packet: {err}"
                )));
            }
        };

        sample_rate = decoded.spec().rate;
        let channels = decoded.spec().channels.count();

        let mut sample_buffer =
            SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sample_buffer.copy_interleaved_ref(decoded);
        mono.extend(downmix(sample_buffer.samples(), channels));
    }

    if mono.is_empty() {
        return Err(AppError::unsupported_media_type(
            "decoded audio is empty after processing",
        ));
    }

    Ok(normalize(mono, sample_rate))
}

/// Folds interleaved frames to mono, keeping the loudest channel per frame.
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| {
            frame
                .iter()
                .copied()
                .max_by(|a, b| a.abs().total_cmp(&b.abs()))
                .unwrap_or(0.0)
        })
        .collect()
}

fn normalize(mono: Vec<f32>, sample_rate: u32) -> Vec<f32> {
    let clamped = mono
        .into_iter()
        .map(|s| s.clamp(-1.0, 1.0))
        .collect::<Vec<_>>();
    if sample_rate == CAPTURE_SAMPLE_RATE {
        clamped
    } else {
        resample_linear(&clamped, sample_rate, CAPTURE_SAMPLE_RATE)
    }
}

/// Resamples a mono signal from `src_rate` to `dst_rate` via linear interpolation.
fn resample_linear(input: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || input.len() < 2 {
        return input.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = ((input.len() as f64) * (dst_rate as f64) / (src_rate as f64)).round() as usize;
    let out_len = out_len.max(1);

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;

        let a = input[idx.min(input.len() - 1)];
        let b = input[(idx + 1).min(input.len() - 1)];
        out.push(a + (b - a) * frac);
    }

    out
}

#[cfg(feature = "microphone")]
mod microphone {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, Sample, SampleFormat, SizedSample};
    use tracing::{debug, warn};

    use super::{downmix, normalize, AudioCapture};
    use crate::error::AppError;

    /// Records a fixed-length session from the default input device.
    pub struct MicrophoneCapture {
        duration: Duration,
    }

    impl MicrophoneCapture {
        pub fn new(duration: Duration) -> Self {
            Self { duration }
        }
    }

    #[async_trait]
    impl AudioCapture for MicrophoneCapture {
        async fn capture(&self) -> Result<Vec<f32>, AppError> {
            let duration = self.duration;
            tokio::task::spawn_blocking(move || record(duration))
                .await
                .map_err(|err| AppError::internal(format!("capture task failed: {err}")))?
        }
    }

    fn record(duration: Duration) -> Result<Vec<f32>, AppError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AppError::configuration("no default input device available"))?;
        let supported = device.default_input_config().map_err(|err| {
            AppError::configuration(format!("failed to query input device: {err}"))
        })?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));

        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, buffer.clone())?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, buffer.clone())?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, buffer.clone())?,
            other => {
                return Err(AppError::configuration(format!(
                    "unsupported input sample format {other:?}"
                )))
            }
        };

        stream
            .play()
            .map_err(|err| AppError::configuration(format!("failed to start capture: {err}")))?;
        std::thread::sleep(duration);
        drop(stream);

        let interleaved = buffer
            .lock()
            .map(|mut samples| std::mem::take(&mut *samples))
            .map_err(|_| AppError::internal("capture buffer poisoned"))?;
        debug!(samples = interleaved.len(), sample_rate, channels, "capture finished");

        Ok(normalize(downmix(&interleaved, channels), sample_rate))
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        buffer: Arc<Mutex<Vec<f32>>>,
    ) -> Result<cpal::Stream, AppError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut samples) = buffer.lock() {
                        samples.extend(data.iter().map(|s| f32::from_sample(*s)));
                    }
                },
                |err| warn!(error = %err, "input stream error"),
                None,
            )
            .map_err(|err| AppError::configuration(format!("failed to open input stream: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mp4() {
        assert!(validate_extension("clip.mp4").is_err());
    }

    #[test]
    fn accepts_uppercase_wav() {
        assert!(matches!(
            validate_extension("Question.WAV").as_deref(),
            Ok("wav")
        ));
    }

    #[test]
    fn downmix_keeps_loudest_channel() {
        assert_eq!(downmix(&[0.1, -0.4, 0.3, 0.2], 2), vec![-0.4, 0.3]);
        assert_eq!(downmix(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn resample_halves_length_from_32khz() {
        let input = vec![0.0; 3200];
        assert_eq!(resample_linear(&input, 32_000, 16_000).len(), 1600);
    }

    #[test]
    fn decodes_wav_clip_to_16khz() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..800 {
                writer.write_sample(1000i16).unwrap();
                writer.write_sample(-2000i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let samples = decode_to_mono_16khz_f32(&cursor.into_inner(), "wav").unwrap();
        assert_eq!(samples.len(), 1600);
        assert!(samples.iter().all(|s| *s < 0.0));
    }

    #[test]
    fn garbage_clip_is_unsupported_media() {
        let err = decode_to_mono_16khz_f32(b"not audio at all", "wav").unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMediaType(_)));
    }

    #[tokio::test]
    async fn without_device_capture_is_configuration_error() {
        let err = NoCaptureDevice.capture().await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }
}
