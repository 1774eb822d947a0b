use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info};

mod metrics;

use recap::segments::Segment;
use recap::{
    Engine, EngineConfig, ModelSize, PreprocessOpts, RecordingMode, TranscribeOpts,
    preprocess::preprocess,
};

/// Content types accepted for upload.
const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "audio/wav",
    "audio/webm",
    "audio/mp3",
    "audio/mpeg",
    "audio/mp4",
    "audio/ogg",
    "audio/flac",
    "audio/aac",
    "audio/x-m4a",
    "audio/m4a",
];

/// File extensions accepted for upload; also used as the decoder format hint.
const ALLOWED_EXTENSIONS: &[&str] = &[
    "wav", "webm", "mp3", "mpeg", "mp4", "ogg", "flac", "m4a", "aac",
];

/// Format hint when the upload doesn't reveal one. Browser recordings are
/// typically extensionless webm blobs.
const DEFAULT_FORMAT: &str = "webm";

#[derive(Parser, Debug)]
#[command(name = "recap-server")]
#[command(about = "HTTP server for audio transcription and mode-aware summarization")]
struct Params {
    /// Directory holding whisper.cpp models named `ggml-<size>.bin`.
    #[arg(short = 'm', long = "model-dir", env = "RECAP_MODEL_DIR", default_value = "models")]
    model_dir: PathBuf,

    /// Optional path to a Whisper-VAD model file.
    #[arg(short = 'v', long = "vad-model", env = "RECAP_VAD_MODEL")]
    vad_model: Option<PathBuf>,

    /// Model size used when a request doesn't name one.
    #[arg(long = "default-model-size", default_value = "base")]
    default_model_size: String,

    /// Hugging Face id of the summarization model.
    #[arg(
        long = "summarizer-model",
        env = "RECAP_SUMMARIZER_MODEL",
        default_value = recap::summarizer::DEFAULT_MODEL_ID
    )]
    summarizer_model: String,

    /// Host interface to bind to.
    #[arg(long = "host", env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", env = "PORT", default_value_t = 8001)]
    port: u16,

    /// Maximum request body size (bytes).
    #[arg(long = "max-bytes", default_value_t = 100 * 1024 * 1024)]
    max_bytes: usize,
}

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<recap::Error> for AppError {
    fn from(err: recap::Error) -> Self {
        match err {
            recap::Error::UnsupportedFormat(_) => AppError::bad_request(err.to_string()),
            _ => AppError::internal(format!("Processing failed: {err}")),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[tokio::main]
async fn main() {
    recap::init_logging();

    if let Err(err) = run().await {
        error!(error = ?err, "recap-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();

    metrics::init();

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let default_model_size: ModelSize = params
        .default_model_size
        .parse()
        .unwrap_or(ModelSize::Base);

    let engine = Engine::new(EngineConfig {
        model_dir: params.model_dir,
        vad_model: params.vad_model,
        default_model_size,
        summarizer_model_id: params.summarizer_model,
    });

    let state = AppState {
        engine: Arc::new(engine),
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/models", get(models))
        .route("/modes", get(modes))
        .route("/transcribe", post(transcribe))
        .route("/summarize", post(summarize))
        .route("/process", post(process))
        .route_layer(from_fn(metrics::track_http_metrics))
        .with_state(state)
        .layer(DefaultBodyLimit::max(params.max_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        );

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

async fn root() -> &'static str {
    "recap-server: POST /transcribe, /summarize, /process (multipart field: file)"
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    summarizer_loaded: bool,
    model_size: ModelSize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let default_size = state.engine.config().default_model_size;
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.engine.transcriber_loaded(default_size),
        summarizer_loaded: state.engine.summarizer_loaded(),
        model_size: default_size,
    })
}

#[derive(Debug, Serialize)]
struct RecommendedModels {
    fastest: ModelSize,
    balanced: ModelSize,
    accurate: ModelSize,
}

#[derive(Debug, Serialize)]
struct ModelsResponse {
    models: Vec<ModelSize>,
    recommended: RecommendedModels,
}

async fn models() -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: ModelSize::ALL.to_vec(),
        recommended: RecommendedModels {
            fastest: ModelSize::Tiny,
            balanced: ModelSize::Base,
            accurate: ModelSize::Small,
        },
    })
}

#[derive(Debug, Serialize)]
struct ModesResponse {
    modes: Vec<RecordingMode>,
}

async fn modes() -> Json<ModesResponse> {
    Json(ModesResponse {
        modes: RecordingMode::ALL.to_vec(),
    })
}

#[derive(Debug, Serialize)]
struct TranscriptionResponse {
    raw_transcript: String,
    clean_transcript: String,
    confidence_score: f32,
    language: String,
    processing_time: String,
    segments: Vec<Segment>,
}

async fn transcribe(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    multipart: Multipart,
) -> std::result::Result<Json<TranscriptionResponse>, AppError> {
    let start = Instant::now();

    let form = read_upload_form(multipart).await?.with_fallback(query);
    let format = validate_upload(&form)?;

    let language = form.field("language");
    let request = TranscribeRequest::from_form(&state, &form, format);

    let result = run_transcription(state.engine.clone(), form.data, request).await?;

    Ok(Json(TranscriptionResponse {
        raw_transcript: result.raw_text,
        clean_transcript: result.clean_text,
        confidence_score: result.confidence,
        language: result
            .language
            .or(language)
            .unwrap_or_else(|| "unknown".to_owned()),
        processing_time: format_elapsed(start),
        segments: result.segments,
    }))
}

#[derive(Debug, Deserialize)]
struct SummarizeRequest {
    transcript: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    custom_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct SummarizeResponse {
    summary: String,
    mode: RecordingMode,
    tokens_used: usize,
    confidence: f32,
    processing_time: String,
}

async fn summarize(
    State(state): State<AppState>,
    Json(request): Json<SummarizeRequest>,
) -> std::result::Result<Json<SummarizeResponse>, AppError> {
    let start = Instant::now();

    let mode = parse_mode(request.mode.as_deref());
    let engine = state.engine.clone();

    let result = tokio::task::spawn_blocking(move || {
        engine.summarize(&request.transcript, mode, request.custom_prompt.as_deref())
    })
    .await
    .map_err(|err| AppError::internal(format!("summarization task failed: {err}")))??;

    Ok(Json(SummarizeResponse {
        summary: result.summary,
        mode: result.mode,
        tokens_used: result.tokens_used,
        confidence: result.confidence,
        processing_time: format_elapsed(start),
    }))
}

#[derive(Debug, Serialize)]
struct ProcessResponse {
    raw_transcript: String,
    clean_transcript: String,
    confidence_score: f32,
    language: String,
    processing_time: String,
    segments: Vec<Segment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary_mode: Option<RecordingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary_confidence: Option<f32>,
}

async fn process(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    multipart: Multipart,
) -> std::result::Result<Json<ProcessResponse>, AppError> {
    let start = Instant::now();

    let form = read_upload_form(multipart).await?.with_fallback(query);
    let format = validate_upload(&form)?;

    let language = form.field("language");
    let mode = parse_mode(form.field("mode").as_deref());
    let custom_prompt = form.field("custom_prompt");
    let request = TranscribeRequest::from_form(&state, &form, format);

    let engine = state.engine.clone();
    let data = form.data;

    let result = tokio::task::spawn_blocking(move || {
        let audio = preprocess(&data, &request.format, &request.preprocess)?;
        metrics::observe_audio_seconds(audio.duration_seconds() as f64);
        engine.process_and_summarize(
            &audio.samples,
            audio.sample_rate,
            request.model_size,
            &request.opts,
            mode,
            custom_prompt.as_deref(),
        )
    })
    .await
    .map_err(|err| AppError::internal(format!("processing task failed: {err}")))??;

    Ok(Json(ProcessResponse {
        raw_transcript: result.raw_text,
        clean_transcript: result.clean_text,
        confidence_score: result.transcription_confidence,
        language: result
            .language
            .or(language)
            .unwrap_or_else(|| "unknown".to_owned()),
        processing_time: format_elapsed(start),
        segments: result.segments,
        summary: result.summary,
        summary_mode: result.summary_mode,
        summary_tokens: result.summary_tokens,
        summary_confidence: result.summary_confidence,
    }))
}

/// Per-request transcription parameters pulled out of the form fields.
struct TranscribeRequest {
    format: String,
    model_size: ModelSize,
    preprocess: PreprocessOpts,
    opts: TranscribeOpts,
}

impl TranscribeRequest {
    fn from_form(state: &AppState, form: &UploadForm, format: String) -> Self {
        let model_size = form
            .field("model_size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(state.engine.config().default_model_size);

        Self {
            format,
            model_size,
            preprocess: PreprocessOpts {
                noise_reduction: form.bool_field("noise_reduction", true),
                silence_trimming: form.bool_field("silence_trimming", true),
            },
            opts: TranscribeOpts {
                language: form.field("language"),
                ..TranscribeOpts::default()
            },
        }
    }
}

async fn run_transcription(
    engine: Arc<Engine>,
    data: Bytes,
    request: TranscribeRequest,
) -> std::result::Result<recap::TranscriptionResult, AppError> {
    tokio::task::spawn_blocking(move || {
        let audio = preprocess(&data, &request.format, &request.preprocess)?;
        metrics::observe_audio_seconds(audio.duration_seconds() as f64);
        engine.transcribe(
            &audio.samples,
            audio.sample_rate,
            request.model_size,
            &request.opts,
        )
    })
    .await
    .map_err(|err| AppError::internal(format!("transcription task failed: {err}")))?
    .map_err(AppError::from)
}

/// Collected multipart upload: the file plus any text fields.
struct UploadForm {
    data: Bytes,
    filename: String,
    content_type: String,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Merge query-string parameters in as fallbacks; form fields win.
    ///
    /// Older clients send `language`, `model_size` and the preprocessing flags
    /// on the query string instead of as multipart fields.
    fn with_fallback(mut self, params: HashMap<String, String>) -> Self {
        for (name, value) in params {
            self.fields.entry(name).or_insert(value);
        }
        self
    }

    fn field(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn bool_field(&self, name: &str, default: bool) -> bool {
        match self.field(name).as_deref() {
            Some(v) => parse_bool(v, default),
            None => default,
        }
    }
}

async fn read_upload_form(mut multipart: Multipart) -> std::result::Result<UploadForm, AppError> {
    let mut data = None;
    let mut filename = String::new();
    let mut content_type = String::new();
    let mut fields = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_owned();

        if name == "file" {
            filename = field.file_name().unwrap_or_default().to_owned();
            content_type = field.content_type().unwrap_or_default().to_owned();
            data = Some(field.bytes().await.map_err(|err| {
                AppError::bad_request(format!("failed to read upload: {err}"))
            })?);
        } else if !name.is_empty() {
            let value = field.text().await.map_err(|err| {
                AppError::bad_request(format!("failed to read field {name}: {err}"))
            })?;
            fields.insert(name, value);
        }
    }

    let data = data.ok_or_else(|| AppError::bad_request("missing multipart field: file"))?;
    if data.is_empty() {
        return Err(AppError::bad_request("uploaded file was empty"));
    }

    Ok(UploadForm {
        data,
        filename,
        content_type,
        fields,
    })
}

/// Check the upload against the allow-list and return the decoder format hint.
fn validate_upload(form: &UploadForm) -> std::result::Result<String, AppError> {
    let extension = file_extension(&form.filename);

    let type_ok = ALLOWED_CONTENT_TYPES.contains(&form.content_type.as_str());
    let ext_ok = extension
        .as_deref()
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext));

    if !type_ok && !ext_ok {
        return Err(recap::Error::UnsupportedFormat(form.content_type.clone()).into());
    }

    Ok(extension
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| DEFAULT_FORMAT.to_owned()))
}

fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_mode(mode: Option<&str>) -> RecordingMode {
    mode.unwrap_or("lecture").parse().unwrap_or(RecordingMode::Lecture)
}

fn format_elapsed(start: Instant) -> String {
    format!("{:.2}s", start.elapsed().as_secs_f64())
}
