use axum::{
    Extension,
    extract::{Json, Path, State},
    response::IntoResponse,
};
use chrono::Utc;

use crate::AppState;
use crate::error::AppResult;
use crate::models::Attendance;
use crate::utils::{Claims, success_to_api_response};

use super::model::CheckAttendanceRequest;

#[axum::debug_handler]
pub async fn check_attendance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CheckAttendanceRequest>,
) -> AppResult<impl IntoResponse> {
    let attendance = Attendance::check(
        state.store.as_ref(),
        &req.schedule_id,
        &claims.sub,
        req.distance,
        Utc::now(),
        state.config.late_threshold(),
    )
    .await?;
    Ok(success_to_api_response(attendance))
}

#[axum::debug_handler]
pub async fn get_my_attendances(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let attendances = Attendance::find_by_user(state.store.as_ref(), &claims.sub).await?;
    Ok(success_to_api_response(attendances))
}

#[axum::debug_handler]
pub async fn get_schedule_attendances(
    State(state): State<AppState>,
    Path(schedule_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let attendances = Attendance::find_by_schedule(state.store.as_ref(), &schedule_id).await?;
    Ok(success_to_api_response(attendances))
}
