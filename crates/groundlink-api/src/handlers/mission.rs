//! /mission handlers: upload, download, clear, cancel and survey generation.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use groundlink_core::mission::{survey_grid, SurveyArea};
use groundlink_core::{MissionPlan, Waypoint};

use super::{bad_request, link_error, ApiState};

/// Default distance between survey passes, metres.
const SURVEY_SPACING: f64 = 20.0;

// ── /mission/upload (POST) ────────────────────────────────────────────────────

/// Either a waypoint file body or a list of items; `plan` wins if both are set.
#[derive(Deserialize)]
pub struct UploadRequest {
    pub plan: Option<String>,
    pub items: Option<Vec<Waypoint>>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub uploaded: usize,
}

pub async fn handle_mission_upload(
    State(state): State<ApiState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let plan = match (req.plan, req.items) {
        (Some(text), _) => MissionPlan::parse(&text).map_err(bad_request)?,
        (None, Some(items)) => MissionPlan::new(items).map_err(bad_request)?,
        (None, None) => return Err(bad_request("request needs `plan` or `items`")),
    };
    tracing::info!(items = plan.len(), "mission upload requested via API");
    let uploaded = state.link.upload_mission(plan).await.map_err(link_error)?;
    Ok(Json(UploadResponse { uploaded }))
}

// ── /mission/download (GET) ───────────────────────────────────────────────────

#[derive(Serialize)]
pub struct DownloadResponse {
    pub count: usize,
    pub items: Vec<Waypoint>,
    /// The same items as a waypoint file.
    pub plan: String,
}

pub async fn handle_mission_download(
    State(state): State<ApiState>,
) -> Result<Json<DownloadResponse>, (StatusCode, String)> {
    let plan = state.link.download_mission().await.map_err(link_error)?;
    let text = plan.to_plan_string();
    Ok(Json(DownloadResponse {
        count: plan.len(),
        plan: text,
        items: plan.into_items(),
    }))
}

// ── /mission/clear, /mission/cancel (POST) ────────────────────────────────────

#[derive(Serialize)]
pub struct DoneResponse {
    pub ok: bool,
}

pub async fn handle_mission_clear(
    State(state): State<ApiState>,
) -> Result<Json<DoneResponse>, (StatusCode, String)> {
    state.link.clear_mission().await.map_err(link_error)?;
    Ok(Json(DoneResponse { ok: true }))
}

pub async fn handle_mission_cancel(
    State(state): State<ApiState>,
) -> Result<Json<DoneResponse>, (StatusCode, String)> {
    state.link.cancel_transfer().await.map_err(link_error)?;
    Ok(Json(DoneResponse { ok: true }))
}

// ── /mission/survey (POST) ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SurveyRequest {
    #[serde(flatten)]
    pub area: SurveyArea,
    pub altitude: f32,
    pub spacing: Option<f64>,
    /// Send the generated plan to the vehicle as well.
    #[serde(default)]
    pub upload: bool,
}

#[derive(Serialize)]
pub struct SurveyResponse {
    pub count: usize,
    pub plan: String,
    pub uploaded: Option<usize>,
}

pub async fn handle_mission_survey(
    State(state): State<ApiState>,
    Json(req): Json<SurveyRequest>,
) -> Result<Json<SurveyResponse>, (StatusCode, String)> {
    let spacing = req.spacing.unwrap_or(SURVEY_SPACING);
    let plan = survey_grid(req.area, req.altitude, spacing).map_err(bad_request)?;
    let text = plan.to_plan_string();
    let count = plan.len();
    let uploaded = if req.upload {
        Some(state.link.upload_mission(plan).await.map_err(link_error)?)
    } else {
        None
    };
    Ok(Json(SurveyResponse {
        count,
        plan: text,
        uploaded,
    }))
}
