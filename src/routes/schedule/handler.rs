use axum::{
    Extension,
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::AppState;
use crate::error::AppResult;
use crate::models::Schedule;
use crate::utils::{Claims, success_to_api_response};

use super::model::{CreateScheduleRequest, ScheduleView, UpdateScheduleRequest};

#[axum::debug_handler]
pub async fn get_user_schedules(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let store = state.store.as_ref();
    let mut views = Vec::new();
    for schedule in Schedule::find_all_user_schedules(store, &claims.sub).await? {
        views.push(ScheduleView::for_user(store, schedule, &claims.sub).await?);
    }
    Ok(success_to_api_response(views))
}

#[axum::debug_handler]
pub async fn get_group_schedules(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let store = state.store.as_ref();
    let mut views = Vec::new();
    for schedule in Schedule::find_by_group(store, &group_id).await? {
        views.push(ScheduleView::with_count(store, schedule).await?);
    }
    Ok(success_to_api_response(views))
}

#[axum::debug_handler]
pub async fn get_schedule_detail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(schedule_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let store = state.store.as_ref();
    let schedule = Schedule::find_by_id(store, &schedule_id).await?;
    let view = ScheduleView::for_user(store, schedule, &claims.sub).await?;
    Ok(success_to_api_response(view))
}

#[axum::debug_handler]
pub async fn create_schedule(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateScheduleRequest>,
) -> AppResult<impl IntoResponse> {
    let schedule = Schedule::create(state.store.as_ref(), req, &claims.sub).await?;
    Ok((StatusCode::CREATED, success_to_api_response(schedule)))
}

#[axum::debug_handler]
pub async fn update_schedule(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(schedule_id): Path<String>,
    Json(req): Json<UpdateScheduleRequest>,
) -> AppResult<impl IntoResponse> {
    let schedule = Schedule::update(state.store.as_ref(), &schedule_id, req, &claims.sub).await?;
    Ok(success_to_api_response(schedule))
}

#[axum::debug_handler]
pub async fn remove_schedule(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(schedule_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Schedule::remove(state.store.as_ref(), &schedule_id, &claims.sub).await?;
    Ok(success_to_api_response(serde_json::json!({
        "success": true
    })))
}
