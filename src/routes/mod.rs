use axum::{
    Router,
    middleware::from_fn,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, post},
};

use crate::AppState;
use crate::middleware::{auth_middleware, log_errors};
use crate::utils::success_to_api_response;

pub mod attendance;
pub mod bus;
pub mod group;
pub mod schedule;

pub async fn health() -> impl IntoResponse {
    success_to_api_response(serde_json::json!({
        "status": "ok"
    }))
}

fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // 群组路由
        .route("/groups", get(group::get_user_groups).post(group::create_group))
        .route("/groups/public", get(group::find_public_groups))
        .route("/groups/search", get(group::search_groups))
        .route("/groups/join", post(group::join_group))
        .route(
            "/groups/{group_id}",
            get(group::get_group_detail)
                .put(group::update_group)
                .delete(group::remove_group),
        )
        .route("/groups/{group_id}/leave", delete(group::leave_group))
        .route("/groups/{group_id}/members", get(group::get_group_members))
        .route("/groups/{group_id}/members/role", post(group::set_member_role))
        .route(
            "/groups/{group_id}/members/{user_id}",
            delete(group::remove_group_member),
        )
        // 日程路由
        .route(
            "/schedules",
            get(schedule::get_user_schedules).post(schedule::create_schedule),
        )
        .route("/schedules/group/{group_id}", get(schedule::get_group_schedules))
        .route(
            "/schedules/{schedule_id}",
            get(schedule::get_schedule_detail)
                .put(schedule::update_schedule)
                .delete(schedule::remove_schedule),
        )
        // 签到路由
        .route("/attendances/check", post(attendance::check_attendance))
        .route("/attendances/me", get(attendance::get_my_attendances))
        .route(
            "/attendances/schedule/{schedule_id}",
            get(attendance::get_schedule_attendances),
        )
        // 大巴座位路由
        .route(
            "/bus-templates",
            get(bus::get_bus_templates).post(bus::create_bus_template),
        )
        .route(
            "/bus-templates/{id}",
            get(bus::get_bus_template)
                .put(bus::update_bus_template)
                .delete(bus::remove_bus_template),
        )
        .route("/bus-seats/batch", post(bus::batch_create_seats))
        .route("/bus-seats/me", get(bus::get_my_seats))
        .route("/bus-seats/assign", post(bus::assign_seat))
        .route("/bus-seats/schedule/{schedule_id}", get(bus::get_schedule_seats))
        .route("/bus-seats/{seat_id}/assignment", delete(bus::release_seat))
        .layer(from_fn_with_state(state.clone(), auth_middleware))
}

/// 组装全部路由，挂在 api_base_uri 下
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .merge(protected_routes(&state));

    let base = state.config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(base, api)
    };

    router.layer(from_fn(log_errors)).with_state(state)
}
