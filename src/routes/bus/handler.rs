use axum::{
    Extension,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{BusSeat, BusTemplate};
use crate::utils::{Claims, success_to_api_response};

use super::model::{
    AssignSeatRequest, BatchCreateSeatsRequest, CreateBusTemplateRequest,
    UpdateBusTemplateRequest,
};

#[derive(Debug, Deserialize)]
pub struct SeatQuery {
    pub bus_template_id: Option<String>,
}

#[axum::debug_handler]
pub async fn get_bus_templates(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let templates = BusTemplate::find_all(state.store.as_ref()).await?;
    Ok(success_to_api_response(templates))
}

#[axum::debug_handler]
pub async fn get_bus_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let template = BusTemplate::find_by_id(state.store.as_ref(), &id).await?;
    Ok(success_to_api_response(template))
}

#[axum::debug_handler]
pub async fn create_bus_template(
    State(state): State<AppState>,
    Json(req): Json<CreateBusTemplateRequest>,
) -> AppResult<impl IntoResponse> {
    let template = BusTemplate::create(state.store.as_ref(), req).await?;
    Ok((StatusCode::CREATED, success_to_api_response(template)))
}

#[axum::debug_handler]
pub async fn update_bus_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateBusTemplateRequest>,
) -> AppResult<impl IntoResponse> {
    let template = BusTemplate::update(state.store.as_ref(), &id, req).await?;
    Ok(success_to_api_response(template))
}

#[axum::debug_handler]
pub async fn remove_bus_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    BusTemplate::remove(state.store.as_ref(), &id).await?;
    Ok(success_to_api_response(serde_json::json!({
        "success": true
    })))
}

#[axum::debug_handler]
pub async fn batch_create_seats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BatchCreateSeatsRequest>,
) -> AppResult<impl IntoResponse> {
    let seats = BusSeat::batch_create(state.store.as_ref(), req, &claims.sub).await?;
    Ok((StatusCode::CREATED, success_to_api_response(seats)))
}

#[axum::debug_handler]
pub async fn get_schedule_seats(
    State(state): State<AppState>,
    Path(schedule_id): Path<String>,
    Query(query): Query<SeatQuery>,
) -> AppResult<impl IntoResponse> {
    let seats = BusSeat::find_by_schedule(
        state.store.as_ref(),
        &schedule_id,
        query.bus_template_id.as_deref(),
    )
    .await?;
    Ok(success_to_api_response(seats))
}

#[axum::debug_handler]
pub async fn get_my_seats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let seats = BusSeat::find_by_user(state.store.as_ref(), &claims.sub).await?;
    Ok(success_to_api_response(seats))
}

#[axum::debug_handler]
pub async fn assign_seat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AssignSeatRequest>,
) -> AppResult<impl IntoResponse> {
    let seat = BusSeat::assign(state.store.as_ref(), req, &claims.sub).await?;
    Ok(success_to_api_response(seat))
}

#[axum::debug_handler]
pub async fn release_seat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(seat_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let seat = BusSeat::release(state.store.as_ref(), &seat_id, &claims.sub).await?;
    Ok(success_to_api_response(seat))
}
