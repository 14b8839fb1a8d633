use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::analysis::PredictData;
use crate::audio::AudioInput;
use crate::error::{DecodeError, ErrorKind, PipelineError, PipelineFailure};
use crate::pipeline::{PipelineOrchestrator, Stage, UploadMeter, WarmUpStatus};
use crate::telemetry::{self, TelemetrySnapshot};

use super::sse;

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    started: Instant,
}

impl HttpState {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>) -> Self {
        Self {
            orchestrator,
            started: Instant::now(),
        }
    }
}

/// Query parameters for `POST /identify`.
#[derive(Debug, Default, Deserialize)]
pub struct IdentifyQuery {
    pub filename: Option<String>,
}

/// HTTP error variants mapped to JSON responses.
#[derive(Debug)]
pub enum HttpServerError {
    BadRequest(&'static str),
    /// The request body stopped arriving before it was complete
    UploadInterrupted,
    Pipeline(PipelineFailure),
}

impl HttpServerError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::UploadInterrupted => StatusCode::BAD_REQUEST,
            Self::Pipeline(failure) if failure.is_superseded() => StatusCode::CONFLICT,
            Self::Pipeline(failure) => match failure.kind {
                ErrorKind::UnsupportedFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ErrorKind::FileTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
                ErrorKind::CorruptAudio | ErrorKind::Extraction => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ErrorKind::CatalogUnavailable => StatusCode::BAD_GATEWAY,
                ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                ErrorKind::Inference | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest(msg) => serde_json::json!({ "error": msg }),
            Self::UploadInterrupted => serde_json::json!({
                "error": "upload interrupted",
                "retry_upload": true,
            }),
            Self::Pipeline(failure) => serde_json::json!({
                "confidence": 0.0,
                "error": failure.message,
                "error_kind": failure.kind,
                "code": failure.code,
            }),
        };
        (status, Json(body)).into_response()
    }
}

/// Health endpoint response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub stage: Stage,
    pub generation: u64,
    pub warm_up: WarmUpStatus,
    pub uptime_ms: u64,
    pub telemetry: TelemetrySnapshot,
}

/// Warm-up acknowledgement payload.
#[derive(Debug, Serialize)]
pub struct WarmUpAck {
    pub started: bool,
    pub status: WarmUpStatus,
}

/// Build the Axum router with all handlers.
///
/// Upload bodies are read as a stream by `identify`, which enforces the
/// decoder's size limit itself.
pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/identify", post(identify))
        .route("/warm-up", post(warm_up))
        .route("/events", get(events))
        .with_state(state)
}

/// Run the HTTP server loop.
pub async fn run_http_server(state: HttpState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding HTTP listener")?;
    log::info!("[HTTP] Listening on {}", addr);
    let router = build_router(state);
    axum::serve(listener, router)
        .await
        .context("serving HTTP router")?;
    Ok(())
}

pub async fn health(State(state): State<HttpState>) -> Json<HealthResponse> {
    let orchestrator = &state.orchestrator;
    Json(HealthResponse {
        status: "ok",
        stage: orchestrator.state(),
        generation: orchestrator.current_generation(),
        warm_up: orchestrator.warm_up_status(),
        uptime_ms: state.started.elapsed().as_millis() as u64,
        telemetry: telemetry::hub().snapshot(),
    })
}

pub async fn identify(
    State(state): State<HttpState>,
    Query(query): Query<IdentifyQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<PredictData>, HttpServerError> {
    let file_name = query
        .filename
        .filter(|name| !name.trim().is_empty())
        .ok_or(HttpServerError::BadRequest("filename query parameter is required"))?;

    let max_bytes = state.orchestrator.config().decoder.max_file_bytes;
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if let Some(size_bytes) = declared.filter(|size| *size > max_bytes) {
        return Err(too_large(size_bytes, max_bytes));
    }

    let data = receive_upload(&state.orchestrator, &file_name, declared, max_bytes, body).await?;
    let mut input = AudioInput::new(file_name, data);
    if let Some(mime) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        input = input.with_mime_type(mime);
    }

    state
        .orchestrator
        .identify(input)
        .await
        .map(Json)
        .map_err(HttpServerError::Pipeline)
}

/// Read the request body, publishing upload progress as chunks arrive
async fn receive_upload(
    orchestrator: &PipelineOrchestrator,
    file_name: &str,
    declared: Option<u64>,
    max_bytes: u64,
    body: Body,
) -> Result<Vec<u8>, HttpServerError> {
    let mut meter = UploadMeter::new(file_name, declared);
    let mut data = Vec::with_capacity(declared.map_or(0, |size| size as usize));
    let mut chunks = body.into_data_stream();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|err| {
            log::warn!(
                "[HTTP] Upload of {} interrupted after {} bytes: {}",
                file_name,
                meter.bytes_received(),
                err
            );
            HttpServerError::UploadInterrupted
        })?;
        data.extend_from_slice(&chunk);
        if data.len() as u64 > max_bytes {
            return Err(too_large(data.len() as u64, max_bytes));
        }
        if let Some(progress) = meter.record(chunk.len()) {
            orchestrator.report_upload(progress);
        }
    }

    orchestrator.report_upload(meter.finish());
    Ok(data)
}

fn too_large(size_bytes: u64, max_bytes: u64) -> HttpServerError {
    let err = PipelineError::from(DecodeError::FileTooLarge {
        size_bytes,
        max_bytes,
    });
    HttpServerError::Pipeline(PipelineFailure::from(err))
}

pub async fn warm_up(State(state): State<HttpState>) -> (StatusCode, Json<WarmUpAck>) {
    let started = state.orchestrator.warm_up();
    (
        StatusCode::ACCEPTED,
        Json(WarmUpAck {
            started,
            status: state.orchestrator.warm_up_status(),
        }),
    )
}

pub async fn events(State(state): State<HttpState>) -> sse::JobEventStream {
    sse::job_events(&state.orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::catalog::{InMemoryCatalog, SpeciesRecord};
    use crate::config::AppConfig;
    use crate::pipeline::PipelineEvent;
    use crate::testing::stubs::{CountingCatalog, FixedBackend};
    use crate::testing::{synth, wav};

    fn labels() -> Vec<String> {
        vec!["turdus_merula".to_string(), "parus_major".to_string()]
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.audio.n_fft = 512;
        config.audio.hop_length = 256;
        config.audio.n_mels = 40;
        config.audio.max_length = 22_050;
        config.decoder.max_file_bytes = 256 * 1024;
        config
    }

    fn make_state(output: Vec<f32>, catalog: CountingCatalog) -> HttpState {
        let orchestrator = PipelineOrchestrator::new(
            test_config(),
            Arc::new(FixedBackend::new(labels(), output)),
            Arc::new(catalog),
        )
        .expect("orchestrator");
        HttpState::new(Arc::new(orchestrator))
    }

    fn make_router(output: Vec<f32>, catalog: CountingCatalog) -> Router {
        build_router(make_state(output, catalog))
    }

    fn catalog() -> CountingCatalog {
        CountingCatalog::new(InMemoryCatalog::new(vec![SpeciesRecord::new(
            "turdus_merula",
            "Turdus merula",
            "Common blackbird",
        )]))
    }

    fn wav_body() -> Vec<u8> {
        wav::encode_mono_i16(&synth::sine(2_500.0, 0.5, 22_050, 0.5), 22_050).expect("wav")
    }

    async fn response_json(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let json = serde_json::from_slice::<Value>(&bytes).expect("JSON body");
        (status, json)
    }

    fn identify_request(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(body))
            .expect("identify request")
    }

    #[tokio::test]
    async fn health_reports_idle_pipeline() {
        let (status, json) = response_json(
            make_router(vec![0.9, 0.1], catalog())
                .oneshot(
                    Request::builder()
                        .uri("/health")
                        .body(Body::empty())
                        .expect("health request"),
                )
                .await
                .expect("health call"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["stage"], "idle");
        assert_eq!(json["warm_up"], "idle");
        assert!(json["telemetry"].is_object());
    }

    #[tokio::test]
    async fn identify_returns_matched_species() {
        let (status, json) = response_json(
            make_router(vec![0.9, 0.1], catalog())
                .oneshot(identify_request("/identify?filename=call.wav", wav_body()))
                .await
                .expect("identify call"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["bird_data"]["id"], "turdus_merula");
        assert_eq!(json["scientific_nm"], "Turdus merula");
        assert_eq!(json["outcome"], "identified");
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn identify_rejects_text_upload() {
        let (status, json) = response_json(
            make_router(vec![0.9, 0.1], catalog())
                .oneshot(identify_request(
                    "/identify?filename=notes.txt",
                    b"field notes".to_vec(),
                ))
                .await
                .expect("identify call"),
        )
        .await;

        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(json["error_kind"], "unsupported_format");
    }

    #[tokio::test]
    async fn identify_rejects_oversize_upload() {
        let (status, json) = response_json(
            make_router(vec![0.9, 0.1], catalog())
                .oneshot(identify_request(
                    "/identify?filename=call.wav",
                    vec![0u8; 256 * 1024 + 1],
                ))
                .await
                .expect("identify call"),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["error_kind"], "file_too_large");
    }

    #[tokio::test]
    async fn identify_rejects_declared_oversize_before_reading() {
        let state = make_state(vec![0.9, 0.1], catalog());
        let mut uploads = state.orchestrator.subscribe_uploads();
        let request = Request::builder()
            .method("POST")
            .uri("/identify?filename=call.wav")
            .header(CONTENT_LENGTH, 10 * 1024 * 1024_u64)
            .body(Body::from(wav_body()))
            .expect("identify request");

        let (status, json) = response_json(
            build_router(state.clone())
                .oneshot(request)
                .await
                .expect("identify call"),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["error_kind"], "file_too_large");
        assert!(uploads.try_recv().is_err());
        assert_eq!(state.orchestrator.current_generation(), 0);
    }

    #[tokio::test]
    async fn identify_reports_upload_progress_apart_from_job_progress() {
        let state = make_state(vec![0.9, 0.1], catalog());
        let mut uploads = state.orchestrator.subscribe_uploads();
        let mut jobs = state.orchestrator.subscribe();
        let body = wav_body();
        let total = body.len() as u64;
        let request = Request::builder()
            .method("POST")
            .uri("/identify?filename=call.wav")
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, total)
            .body(Body::from(body))
            .expect("identify request");

        let (status, _) = response_json(
            build_router(state.clone())
                .oneshot(request)
                .await
                .expect("identify call"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let mut updates = Vec::new();
        while let Ok(update) = uploads.try_recv() {
            updates.push(update);
        }
        let last = updates.last().expect("upload updates");
        assert!(last.done);
        assert_eq!(last.bytes_received, total);
        assert_eq!(last.bytes_total, Some(total));
        assert!(updates.iter().all(|u| u.file_name == "call.wav"));

        // A fully received upload does not count towards job percent
        match jobs.try_recv().expect("first job event").event {
            PipelineEvent::Progress(info) => {
                assert_eq!(info.stage, Stage::Loading);
                assert_eq!(info.percent, 0);
            }
            other => panic!("expected progress, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn identify_maps_catalog_outage_to_bad_gateway() {
        let (status, json) = response_json(
            make_router(vec![0.9, 0.1], catalog().unavailable())
                .oneshot(identify_request("/identify?filename=call.wav", wav_body()))
                .await
                .expect("identify call"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error_kind"], "catalog_unavailable");
    }

    #[tokio::test]
    async fn identify_requires_filename() {
        let (status, _) = response_json(
            make_router(vec![0.9, 0.1], catalog())
                .oneshot(identify_request("/identify", wav_body()))
                .await
                .expect("identify call"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn warm_up_is_accepted() {
        let (status, json) = response_json(
            make_router(vec![0.9, 0.1], catalog())
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/warm-up")
                        .body(Body::empty())
                        .expect("warm-up request"),
                )
                .await
                .expect("warm-up call"),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["started"], true);
    }

    #[test]
    fn interrupted_uploads_are_not_processing_errors() {
        let err = HttpServerError::UploadInterrupted;
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn superseded_failures_map_to_conflict() {
        let failure = PipelineFailure::from(crate::error::PipelineError::Superseded {
            generation: 1,
        });
        assert_eq!(
            HttpServerError::Pipeline(failure).status(),
            StatusCode::CONFLICT
        );
    }
}
