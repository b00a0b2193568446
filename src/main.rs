mod config;
mod error;
mod formatter;
mod gate;
mod transcript;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;

use config::Config;
use error::{panic_message, ApiError};
use gate::{Allowlist, ClientIp, HEALTH_PATH};
use transcript::{TranscriptService, YoutubeProvider};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone)]
struct AppState {
    service: Arc<TranscriptService>,
    allowlist: Arc<Allowlist>,
}

#[derive(Debug, Serialize)]
struct TranscriptReply {
    success: bool,
    transcript: String,
    length: usize,
    language: String,
    video_id: String,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = serve(config).await {
        log::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&filter)
        .init();
}

async fn serve(config: Config) -> Result<(), BoxError> {
    let service = TranscriptService::new(
        Arc::new(YoutubeProvider),
        config.strategies.clone(),
        config.attempt_timeout,
        config.error_detail,
    );
    let labels: Vec<&str> = service.strategies().iter().map(|s| s.label()).collect();
    log::info!("Language strategies: {}", labels.join(" -> "));

    if config.allowlist.is_empty() {
        log::info!("Access gate disabled, ALLOWED_IPS is empty");
    } else {
        log::info!("Access gate enabled for {} IPs", config.allowlist.len());
    }

    let state = AppState {
        service: Arc::new(service),
        allowlist: Arc::new(config.allowlist.clone()),
    };

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Launching transcript API on {}...", addr);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/transcript", post(get_transcript))
        .route(HEALTH_PATH, get(health))
        .route("/my-ip", get(my_ip))
        .layer(middleware::from_fn_with_state(state.allowlist.clone(), gate::enforce))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

async fn home(State(state): State<AppState>, Extension(ClientIp(ip)): Extension<ClientIp>) -> Json<Value> {
    let allowed = state.allowlist.permits(&ip);
    Json(json!({
        "service": "YouTube Transcript API",
        "status": "running",
        "usage": "POST /transcript with {\"video_id\": \"YOUR_VIDEO_ID\"}",
        "client_ip": ip,
        "ip_allowed": allowed,
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn my_ip(
    State(state): State<AppState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    headers: HeaderMap,
) -> Json<Value> {
    let mut received: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers.iter() {
        let value = String::from_utf8_lossy(value.as_bytes());
        received
            .entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.to_string());
    }

    let allowed = state.allowlist.permits(&ip);
    let allowed_ips: Vec<&str> = state.allowlist.iter().collect();
    Json(json!({
        "ip": ip,
        "headers": received,
        "allowed_ips": allowed_ips,
        "allowed": allowed,
    }))
}

async fn get_transcript(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<TranscriptReply>, ApiError> {
    let video_id = parse_video_id(&body?)?;
    log::info!("Attempting to get transcript for video ID: {}", video_id);

    let transcript = state.service.fetch(&video_id).await?;

    Ok(Json(TranscriptReply {
        success: true,
        transcript: transcript.text,
        length: transcript.length,
        language: transcript.language,
        video_id,
    }))
}

/// Extracts a trimmed, non-empty `video_id` from a JSON object body.
fn parse_video_id(body: &[u8]) -> Result<String, ApiError> {
    let data: Value = serde_json::from_slice(body).map_err(|_| ApiError::NoData)?;
    let object = data.as_object().ok_or(ApiError::NoData)?;

    object
        .get("video_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::MissingVideoId)
}

fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    ApiError::Internal(panic_message(&*err)).into_response()
}
