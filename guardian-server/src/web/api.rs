use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use guardian_core::{
    Calibration, Event, GuardianError, ObserverPose, ProjectionFix, Sample, StatusSnapshot,
    TrackerConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::Session;

/// Request failure, answered with status 400 and `{"success": false, "error": ...}`.
///
/// The ingest route reports `ok` instead of `success`, as the firmware expects.
#[derive(Debug)]
pub(super) struct ApiError {
    message: String,
    flag: &'static str,
}

impl ApiError {
    fn new(message: impl Into<String>) -> Self {
        ApiError {
            message: message.into(),
            flag: "success",
        }
    }

    fn for_ingest(mut self) -> Self {
        self.flag = "ok";
        self
    }
}

impl From<GuardianError> for ApiError {
    fn from(e: GuardianError) -> Self {
        ApiError::new(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::new(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        log::debug!("Rejected request: {}", self.message);
        let mut body = serde_json::Map::new();
        body.insert(self.flag.to_string(), false.into());
        body.insert("error".to_string(), self.message.into());
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

pub(super) async fn index() -> impl IntoResponse {
    Json(json!({
        "name": "GuardianLink API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/api/status": "GET - Current device status",
            "/api/parent-location": "POST - Update observer position and heading",
            "/api/calibrate": "POST - Calibrate signal to distance",
            "/api/test-fall": "POST - Trigger a test fall alert",
            "/api/config": "GET/POST - Calibration and detection settings",
            "/ingest": "POST - Samples from hardware",
            "/events": "GET - Server-Sent Events stream"
        }
    }))
}

#[derive(Serialize)]
pub(super) struct StatusResponse {
    success: bool,
    #[serde(flatten)]
    snapshot: StatusSnapshot,
}

pub(super) async fn status(State(session): State<Session>) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        snapshot: session.snapshot(),
    })
}

#[derive(Deserialize)]
pub(super) struct PoseRequest {
    lat: f64,
    lng: f64,
    #[serde(default)]
    heading: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PoseResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    child_location: Option<ProjectionFix>,
}

pub(super) async fn parent_location(
    State(session): State<Session>,
    payload: Result<Json<PoseRequest>, JsonRejection>,
) -> Result<Json<PoseResponse>, ApiError> {
    let Json(request) = payload?;
    let pose = ObserverPose::new(request.lat, request.lng, Some(request.heading))?;
    Ok(Json(PoseResponse {
        success: true,
        child_location: session.set_observer(pose),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CalibrateRequest {
    #[serde(alias = "rssi")]
    signal: f64,
    #[serde(alias = "actual_distance")]
    actual_distance_meters: f64,
}

pub(super) async fn calibrate(
    State(session): State<Session>,
    payload: Result<Json<CalibrateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let reference = session.recalibrate(request.signal, request.actual_distance_meters)?;
    Ok(Json(json!({
        "success": true,
        "txPower": (reference * 10.0).round() / 10.0,
        "message": "Calibration successful"
    })))
}

pub(super) async fn test_fall(State(session): State<Session>) -> impl IntoResponse {
    let event = session.test_fall();
    Json(json!({ "success": true, "event": event }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ConfigResponse {
    success: bool,
    #[serde(flatten)]
    config: TrackerConfig,
    device_name: String,
}

pub(super) async fn get_config(State(session): State<Session>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        success: true,
        config: session.config(),
        device_name: session.key().to_string(),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ConfigRequest {
    #[serde(default, alias = "tx_power")]
    reference_signal: Option<f64>,
    #[serde(default, alias = "path_loss_exponent")]
    path_loss_exponent: Option<f64>,
}

#[derive(Serialize)]
pub(super) struct ConfigUpdated {
    success: bool,
    calibration: Calibration,
    message: &'static str,
}

pub(super) async fn set_config(
    State(session): State<Session>,
    payload: Result<Json<ConfigRequest>, JsonRejection>,
) -> Result<Json<ConfigUpdated>, ApiError> {
    let Json(request) = payload?;
    let calibration =
        session.update_calibration(request.reference_signal, request.path_loss_exponent)?;
    Ok(Json(ConfigUpdated {
        success: true,
        calibration,
        message: "Configuration updated",
    }))
}

#[derive(Serialize)]
pub(super) struct Ingested {
    ok: bool,
    events: Vec<Event>,
}

/// Accepts any body that parses as JSON, whatever its content type.
pub(super) async fn ingest(
    State(session): State<Session>,
    body: Bytes,
) -> Result<Json<Ingested>, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::new("invalid json").for_ingest())?;
    let sample = Sample::from_json(value).map_err(|e| ApiError::from(e).for_ingest())?;
    Ok(Json(Ingested {
        ok: true,
        events: session.ingest(sample),
    }))
}
