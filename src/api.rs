//! HTTP and WebSocket relay surface.
//!
//! This module owns request parsing and response formatting. Each handler
//! sequences the session and one or two adapters; no handler keeps state of
//! its own between calls.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::ai::AiAdapter;
use crate::capture::{decode_to_mono_16khz_f32, validate_extension, AudioCapture};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::providers::Providers;
use crate::session::Session;
use crate::speech::{Recognition, SpeechAdapter};

/// Human-readable service name returned by health endpoints.
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
/// Service version string returned by health endpoints.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Body of a successful recognition call that heard no speech.
pub const NOT_RECOGNIZED_MESSAGE: &str = "Could not recognize speech.";

/// Shared state injected into all route handlers.
pub struct AppState {
    /// Runtime configuration loaded at startup.
    pub cfg: AppConfig,
    /// The single process-wide session.
    pub session: Session,
    pub ai: AiAdapter,
    pub speech: SpeechAdapter,
}

impl AppState {
    /// Wires adapters and the session around a provider set.
    pub fn new(cfg: AppConfig, providers: Providers, capture: Arc<dyn AudioCapture>) -> Self {
        let session = Session::new(providers.translation, &cfg.default_language);
        let ai = AiAdapter::new(providers.generator);
        let speech = SpeechAdapter::new(providers.speech, capture, cfg.audio_output_dir.clone());
        Self {
            cfg,
            session,
            ai,
            speech,
        }
    }
}

/// Builds the Axum router for all public endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.cfg.max_upload_bytes);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/set_language/", post(set_language))
        .route(
            "/process_image/",
            post(process_image).layer(upload_limit.clone()),
        )
        .route("/chat/", post(chat))
        .route("/speech_to_text/", post(speech_to_text).layer(upload_limit))
        .route("/tts/", post(text_to_speech))
        .route("/ws", get(ws_echo))
        .with_state(state)
}

/// Status endpoint (`GET /`, `GET /health`).
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let session = state.session.lock().await;
    Json(json!({
        "status": "ok",
        "name": APP_NAME,
        "version": APP_VERSION,
        "language": session.target_language(),
        "turns": session.transcript().len(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct LanguageRequest {
    language: String,
}

/// Changes the target language (`POST /set_language/`).
pub async fn set_language(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LanguageRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload.map_err(json_rejection)?;
    info!(requested = %request.language, "language update requested");

    let change = state.session.set_language(&request.language).await?;
    Ok(Json(json!({
        "message": format!("Language set to {}", change.language),
        "test_translation": change.test_translation,
    })))
}

/// Describes an uploaded image and restarts the conversation from it
/// (`POST /process_image/`).
pub async fn process_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let image = parse_image_form(&mut multipart).await?;
    debug!(bytes = image.len(), "received image");

    let description = state.ai.describe_image(image).await?;

    let translator = {
        let mut session = state.session.lock().await;
        session.reset_transcript(description.clone());
        session.translator()
    };
    info!("conversation reset from image description");

    let translated = translator.translate(&description).await?;
    Ok(Json(json!({
        "image_analysis": translated,
        "original_analysis": description,
        "language": translator.target(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    message: String,
}

/// Continues the conversation (`POST /chat/`).
///
/// The session stays locked from the user turn to the model turn so
/// concurrent chats cannot interleave.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload.map_err(json_rejection)?;
    if request.message.trim().is_empty() {
        return Err(AppError::invalid_request(
            "message must not be empty",
            Some("message"),
            Some("empty_message"),
        ));
    }

    let (reply, translator) = {
        let mut session = state.session.lock().await;
        session.append_transcript(request.message);
        let reply = state.ai.continue_chat(session.transcript()).await?;
        session.append_transcript(reply.clone());
        (reply, session.translator())
    };

    let translated = translator.translate(&reply).await?;
    Ok(Json(json!({
        "response": translated,
        "original_response": reply,
    })))
}

/// Recognizes one utterance (`POST /speech_to_text/`).
///
/// An optional multipart `file` clip replaces the capture session. Hearing
/// nothing is a normal response carrying `error`.
pub async fn speech_to_text(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Value>, AppError> {
    let clip = read_speech_clip(request).await?;
    let language = state.session.lock().await.target_language().to_string();

    match state.speech.recognize_once(&language, clip).await? {
        Recognition::Recognized(text) => Ok(Json(json!({ "text": text }))),
        Recognition::NotRecognized => {
            info!(language = %language, "no speech recognized");
            Ok(Json(json!({ "error": NOT_RECOGNIZED_MESSAGE })))
        }
    }
}

/// Speaks the latest turn in the target language (`POST /tts/`).
pub async fn text_to_speech(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let (text, translator) = {
        let session = state.session.lock().await;
        (session.last_turn()?.to_string(), session.translator())
    };

    let translated = translator.translate(&text).await?;
    let audio = state
        .speech
        .synthesize(&translated, translator.target())
        .await?;
    let bytes = audio.read().await?;
    drop(audio);

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"speech.mp3\""),
        ],
        bytes,
    )
        .into_response())
}

/// Diagnostic echo socket (`GET /ws`).
pub async fn ws_echo(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(echo_socket)
}

async fn echo_socket(mut socket: WebSocket) {
    while let Some(message) = socket.recv().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                warn!("websocket received a binary frame; closing");
                break;
            }
            Err(err) => {
                warn!(error = %err, "websocket error");
                break;
            }
        };

        if let Err(err) = socket.send(Message::Text(echo_reply(&text))).await {
            warn!(error = %err, "websocket send failed");
            break;
        }
    }
}

fn echo_reply(text: &str) -> String {
    format!("Received: {text}")
}

fn json_rejection(err: JsonRejection) -> AppError {
    AppError::invalid_request(err.body_text(), None, Some("invalid_json"))
}

/// Reads the required `image` field of a multipart upload.
async fn parse_image_form(multipart: &mut Multipart) -> Result<Vec<u8>, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        AppError::invalid_request(
            format!("invalid multipart body: {err}"),
            None,
            Some("invalid_multipart"),
        )
    })? {
        if field.name() != Some("image") {
            continue;
        }

        let bytes = field.bytes().await.map_err(|err| {
            AppError::invalid_request(
                format!("failed to read image bytes: {err}"),
                Some("image"),
                Some("invalid_multipart"),
            )
        })?;
        if bytes.is_empty() {
            return Err(AppError::invalid_request(
                "uploaded image is empty",
                Some("image"),
                Some("empty_file"),
            ));
        }
        return Ok(bytes.to_vec());
    }

    Err(AppError::invalid_request(
        "missing required multipart field: image",
        Some("image"),
        None,
    ))
}

/// Decodes an uploaded speech clip when the request carries one.
async fn read_speech_clip(request: Request) -> Result<Option<Vec<f32>>, AppError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));
    if !is_multipart {
        return Ok(None);
    }

    let mut multipart = Multipart::from_request(request, &()).await.map_err(|err| {
        AppError::invalid_request(
            format!("invalid multipart body: {err}"),
            None,
            Some("invalid_multipart"),
        )
    })?;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        AppError::invalid_request(
            format!("invalid multipart body: {err}"),
            None,
            Some("invalid_multipart"),
        )
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                AppError::invalid_request(
                    "file field is missing filename",
                    Some("file"),
                    Some("invalid_multipart"),
                )
            })?;
        let extension = validate_extension(&filename)?;
        let bytes = field.bytes().await.map_err(|err| {
            AppError::invalid_request(
                format!("failed to read file bytes: {err}"),
                Some("file"),
                Some("invalid_multipart"),
            )
        })?;
        if bytes.is_empty() {
            return Err(AppError::invalid_request(
                "uploaded file is empty",
                Some("file"),
                Some("empty_file"),
            ));
        }

        let samples = tokio::task::spawn_blocking(move || {
            decode_to_mono_16khz_f32(&bytes, &extension)
        })
        .await
        .map_err(|err| AppError::internal(format!("audio decode task failed: {err}")))??;
        return Ok(Some(samples));
    }

    Ok(None)
}
