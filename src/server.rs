use crate::config::Config;
use crate::engine::{language_code, OcrBackend, OcrEngine, Recognition, TextBox, TextStats};
use crate::engines::EngineRegistry;
use crate::error::PipelineError;
use crate::preprocessing::config::{PipelineConfig, Preset, Step};
use crate::preprocessing::{PipelineOutput, PipelineRunner};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use image::ImageFormat;
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn OcrEngine>,
    pub config: Arc<Config>,
}

/// OCR response
#[derive(Serialize)]
pub struct OcrResponse {
    pub text: String,
    /// Mean word confidence in [0, 1]
    pub confidence: f32,
    pub words: Vec<TextBox>,
    pub stats: TextStats,
    pub engine: String,
    pub processing_time_ms: u64,
    pub preprocessing: PipelineOutput,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub engine: String,
    pub engine_description: String,
    pub supported_languages: Vec<String>,
    pub steps: Vec<String>,
    pub presets: Vec<String>,
    pub max_file_size_bytes: usize,
    pub default_language: String,
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let registry = EngineRegistry::new(&config)?;
    let engine = registry
        .default()
        .ok_or_else(|| anyhow::anyhow!("no OCR engine initialized"))?;
    tracing::info!(
        "Using OCR engine '{}' (available: {:?})",
        engine.name(),
        registry.list()
    );

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        engine,
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let max_file_size = state.config.max_file_size;
    Router::new()
        .route("/preprocess", post(handle_preprocess))
        .route("/ocr", post(handle_ocr))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A parsed multipart request: image bytes plus a validated runner
struct PipelineRequest {
    data: Bytes,
    runner: PipelineRunner,
}

async fn parse_request(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<PipelineRequest, PipelineError> {
    let mut file_data: Option<Bytes> = None;
    let mut preset: Option<String> = None;
    let mut steps: Option<String> = None;
    let mut config_json: Option<String> = None;
    let mut language: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                file_data = Some(field.bytes().await.map_err(|e| {
                    PipelineError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?);
            }
            "preset" | "steps" | "config" | "language" => {
                let value = field.text().await.map_err(|e| {
                    PipelineError::InvalidRequest(format!("Invalid {} field: {}", name, e))
                })?;
                match name.as_str() {
                    "preset" => preset = Some(value),
                    "steps" => steps = Some(value),
                    "config" => config_json = Some(value),
                    _ => language = Some(value),
                }
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let data = file_data.ok_or(PipelineError::MissingFile)?;
    if data.len() > state.config.max_file_size {
        return Err(PipelineError::ImageTooLarge {
            size: data.len(),
            max: state.config.max_file_size,
        });
    }

    let mut config = match (&config_json, &preset) {
        (Some(json), _) => serde_json::from_str::<PipelineConfig>(json)
            .map_err(|e| PipelineError::Configuration(format!("Invalid config JSON: {}", e)))?,
        (None, Some(name)) => {
            let preset = Preset::from_name(name).ok_or_else(|| {
                PipelineError::Configuration(format!("unknown preset '{}'", name))
            })?;
            PipelineConfig::from_preset(preset)
        }
        (None, None) => PipelineConfig::default(),
    };

    if let Some(list) = &steps {
        config.steps = Step::parse_list(list)?;
    }
    match language {
        Some(lang) => config.language = lang,
        None if config_json.is_none() => config.language = state.config.default_language.clone(),
        None => {}
    }

    Ok(PipelineRequest {
        data,
        runner: PipelineRunner::new(config)?,
    })
}

/// Decode and normalize on the blocking pool, bounded by the request timeout.
///
/// When `recognize` is set the backend also reads the normalized image.
async fn run_pipeline(
    state: &AppState,
    request: PipelineRequest,
    recognize: bool,
) -> Result<(PipelineOutput, Option<Recognition>), PipelineError> {
    let engine = state.engine.clone();
    let PipelineRequest { data, runner } = request;

    let task = tokio::task::spawn_blocking(move || {
        let image = image::load_from_memory(&data)
            .map_err(|e| PipelineError::InvalidImage(e.to_string()))?;
        let output = runner.run(&image, engine.as_ref(), engine.as_ref())?;

        let recognition = if recognize && !output.degenerate_input {
            let language = language_code(&runner.config().language);
            Some(engine.recognize(&output.image, &language)?)
        } else {
            None
        };
        Ok::<_, PipelineError>((output, recognition))
    });

    match tokio::time::timeout(state.config.request_timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(PipelineError::Internal(format!("Pipeline task failed: {}", e))),
        Err(_) => Err(PipelineError::BackendUnavailable(format!(
            "processing exceeded {}s timeout",
            state.config.request_timeout.as_secs_f32()
        ))),
    }
}

/// Handle preprocessing requests: normalized PNG with diagnostics in headers
async fn handle_preprocess(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, PipelineError> {
    let request = parse_request(&state, multipart).await?;
    let (output, _) = run_pipeline(&state, request, false).await?;

    let mut png = Vec::new();
    output
        .image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| PipelineError::Internal(format!("Failed to encode PNG: {}", e)))?;

    tracing::info!(
        "Preprocessing completed in {}ms ({}x{})",
        output.total_time_ms,
        output.width,
        output.height
    );

    Ok((diagnostic_headers(&output)?, png))
}

fn diagnostic_headers(output: &PipelineOutput) -> Result<HeaderMap, PipelineError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));

    let mut put = |name: &'static str, value: String| -> Result<(), PipelineError> {
        let value = HeaderValue::try_from(value)
            .map_err(|e| PipelineError::Internal(format!("Invalid header value: {}", e)))?;
        headers.insert(HeaderName::from_static(name), value);
        Ok(())
    };

    put("x-docnorm-time-ms", output.total_time_ms.to_string())?;
    if let Some(decision) = &output.orientation {
        put(
            "x-docnorm-orientation",
            decision.chosen_angle.degrees().to_string(),
        )?;
        put("x-docnorm-rationale", decision.rationale.as_str().to_string())?;
    }
    if let Some(skew) = output
        .skew
        .or_else(|| output.orientation.as_ref().and_then(|d| d.skew))
    {
        put("x-docnorm-skew", format!("{:.2}", skew.correction_degrees))?;
    }
    if let Some(crop) = &output.crop {
        put(
            "x-docnorm-crop",
            format!("{},{},{},{}", crop.left, crop.top, crop.right, crop.bottom),
        )?;
    }
    if output.degenerate_input {
        put("x-docnorm-degenerate", "true".to_string())?;
    }

    Ok(headers)
}

/// Handle OCR requests: normalize, then recognize the normalized image
async fn handle_ocr(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<OcrResponse>, PipelineError> {
    let start = Instant::now();
    let request = parse_request(&state, multipart).await?;
    let (output, recognition) = run_pipeline(&state, request, true).await?;
    let recognition = recognition.unwrap_or_default();

    let processing_time_ms = start.elapsed().as_millis() as u64;
    let confidence = recognition.mean_confidence() / 100.0;

    tracing::info!(
        "OCR completed in {}ms, confidence: {:.2}, text length: {}",
        processing_time_ms,
        confidence,
        recognition.text.len()
    );

    Ok(Json(OcrResponse {
        stats: recognition.stats(),
        text: recognition.text,
        confidence,
        words: recognition.boxes,
        engine: state.engine.name().to_string(),
        processing_time_ms,
        preprocessing: output,
    }))
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: state.engine.name().to_string(),
        engine_description: state.engine.description().to_string(),
        supported_languages: state.engine.supported_languages(),
        steps: Step::STANDARD
            .iter()
            .chain([Step::Threshold, Step::Deskew].iter())
            .map(|s| s.as_str().to_string())
            .collect(),
        presets: [Preset::None, Preset::Minimal, Preset::Default, Preset::Aggressive]
            .iter()
            .map(|p| p.as_str().to_string())
            .collect(),
        max_file_size_bytes: state.config.max_file_size,
        default_language: state.config.default_language.clone(),
    })
}
