use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use snapshot_bucket_capture::{spawn_source, LatestFrame};
use snapshot_bucket_common::config::{Config, SafetyConfig};
use snapshot_bucket_common::safety::{self, Detection, SafetyReport};
use snapshot_bucket_store::{transform, FrameTransform, SnapshotStore, StoreError};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// JPEG quality for preview frames; they are transient, so favour size.
const PREVIEW_QUALITY: u8 = 75;

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

struct AppState {
    /// Serializes saves; only ever locked inside `spawn_blocking`.
    store: Mutex<SnapshotStore>,
    latest: LatestFrame,
    adjust: FrameTransform,
    safety: SafetyConfig,
}

impl AppState {
    fn store(&self) -> MutexGuard<'_, SnapshotStore> {
        // The guarded counter is only advanced after a completed write, so a
        // poisoned lock still holds a consistent store.
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FrameQuery {
    scale: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedSnapshot {
    index: u64,
    file_name: String,
    path: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotInfo {
    index: u64,
    file_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotList {
    next_index: u64,
    snapshots: Vec<SnapshotInfo>,
}

#[derive(Debug, Deserialize)]
struct SafetyCheckRequest {
    detections: Vec<Detection>,
}

#[derive(Debug, Serialize)]
struct SafetyCheckResponse {
    compliant: bool,
    #[serde(flatten)]
    report: SafetyReport,
}

fn store_error_response(e: &StoreError) -> axum::response::Response {
    let status = match e {
        // The camera handed us something that is not an image.
        StoreError::Decode(_) => StatusCode::BAD_GATEWAY,
        StoreError::SequenceExhausted(_) => StatusCode::INSUFFICIENT_STORAGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string()).into_response()
}

fn no_frame_response() -> axum::response::Response {
    (StatusCode::SERVICE_UNAVAILABLE, "no frame captured yet").into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// GET /frame?scale=S: current camera frame as JPEG, mirrored per config
async fn get_frame(
    State(state): State<Arc<AppState>>,
    Query(q): Query<FrameQuery>,
) -> impl IntoResponse {
    let scale = q.scale.unwrap_or(1.0);
    if !(scale > 0.0 && scale <= 1.0) {
        return (StatusCode::BAD_REQUEST, "scale must be in (0, 1]").into_response();
    }
    let Some(frame) = state.latest.current() else {
        return no_frame_response();
    };

    let adjust = state.adjust;
    let result = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, String> {
        let img = transform::decode(&frame.jpeg_data).map_err(|e| e.to_string())?;
        let img = adjust.apply(img);
        let img = transform::scaled(&img, scale).ok_or("invalid scale")?;
        transform::encode_jpeg(&img, PREVIEW_QUALITY).map_err(|e| e.to_string())
    })
    .await;

    match result {
        Ok(Ok(jpeg)) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        Ok(Err(e)) => {
            warn!(error = e, "failed to render preview frame");
            (StatusCode::BAD_GATEWAY, e).into_response()
        }
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// POST /snapshots: save the current frame under the next sequence number
async fn save_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(frame) = state.latest.current() else {
        return no_frame_response();
    };

    let st = Arc::clone(&state);
    let result = tokio::task::spawn_blocking(move || -> Result<SavedSnapshot, StoreError> {
        let mut store = st.store();
        let index = store.next_index();
        let path = store.save_frame(&frame, &st.adjust)?;
        Ok(SavedSnapshot {
            index,
            file_name: snapshot_bucket_store::snapshot_file_name(index),
            path: path.display().to_string(),
        })
    })
    .await;

    match result {
        Ok(Ok(saved)) => (StatusCode::CREATED, Json(saved)).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "snapshot save failed");
            store_error_response(&e)
        }
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /snapshots: snapshots on disk plus the index the next save will use
async fn list_snapshots(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let result = tokio::task::spawn_blocking(move || -> Result<SnapshotList, StoreError> {
        let store = state.store();
        let snapshots = store
            .list()?
            .into_iter()
            .map(|entry| SnapshotInfo {
                index: entry.index,
                file_name: entry.file_name(),
            })
            .collect();
        Ok(SnapshotList {
            next_index: store.next_index(),
            snapshots,
        })
    })
    .await;

    match result {
        Ok(Ok(list)) => Json(list).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "listing snapshots failed");
            store_error_response(&e)
        }
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// POST /safety/check: report required items absent from a frame's detections
/// Body: { "detections": [{ "class_name": "HardHat", "confidence": 0.91 }] }
/// Response: { "compliant": false, "missing": ["Safety Vest"], "alert": "MISSING: Safety Vest" }
async fn safety_check(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SafetyCheckRequest>,
) -> Json<SafetyCheckResponse> {
    let report = safety::check(&body.detections, &state.safety);
    if !report.is_compliant() {
        info!(missing = ?report.missing, "safety check found missing items");
    }
    Json(SafetyCheckResponse {
        compliant: report.is_compliant(),
        report,
    })
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/frame", get(get_frame))
        .route("/snapshots", get(list_snapshots).post(save_snapshot))
        .route("/safety/check", post(safety_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

/// Live camera preview with a save action, backed by a numbered snapshot directory.
#[derive(Parser, Debug)]
#[command(name = "snapshot-bucket-api", version, about)]
struct Args {
    /// TOML config file (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to store images in (overrides [store].output_dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Address to listen on (overrides [server].listen)
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match Config::load_or_default(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    let output = args.output.unwrap_or_else(|| config.store.output_dir.clone());
    info!(output = output.display().to_string(), "saving images");

    let store = match SnapshotStore::open_with_quality(&output, config.store.jpeg_quality) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to open snapshot store");
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState {
        store: Mutex::new(store),
        latest: spawn_source(&config.capture),
        adjust: FrameTransform::new(config.store.mirror),
        safety: config.safety.clone(),
    });

    let addr = args.listen.unwrap_or_else(|| config.server.listen.clone());
    info!(addr, "snapshot-bucket API server starting");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });
    if let Err(e) = axum::serve(listener, router(state)).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}
