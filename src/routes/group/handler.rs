use axum::{
    Extension,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{Group, Membership};
use crate::utils::{Claims, success_to_api_response};

use super::member::{JoinGroupRequest, MemberInfo, UpdateMemberRoleRequest};
use super::model::{CreateGroupRequest, GroupInfo, SearchGroupQuery, UpdateGroupRequest};

#[axum::debug_handler]
pub async fn get_user_groups(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let groups = Group::find_user_groups(state.store.as_ref(), &claims.sub).await?;
    Ok(success_to_api_response(groups))
}

#[axum::debug_handler]
pub async fn find_public_groups(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let groups = Group::find_public(state.store.as_ref()).await?;
    Ok(success_to_api_response(groups))
}

#[axum::debug_handler]
pub async fn search_groups(
    State(state): State<AppState>,
    Query(query): Query<SearchGroupQuery>,
) -> AppResult<impl IntoResponse> {
    let groups = Group::search(state.store.as_ref(), query).await?;
    Ok(success_to_api_response(groups))
}

#[axum::debug_handler]
pub async fn get_group_detail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let group = Group::find_with_admin_status(state.store.as_ref(), &group_id, &claims.sub).await?;
    Ok(success_to_api_response(group))
}

#[axum::debug_handler]
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> AppResult<impl IntoResponse> {
    let group = Group::create(state.store.as_ref(), req, &claims.sub, Utc::now()).await?;
    Ok((
        StatusCode::CREATED,
        success_to_api_response(GroupInfo::new(group, true)),
    ))
}

#[axum::debug_handler]
pub async fn update_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<String>,
    Json(req): Json<UpdateGroupRequest>,
) -> AppResult<impl IntoResponse> {
    let group = Group::update(state.store.as_ref(), &group_id, req, &claims.sub).await?;
    Ok(success_to_api_response(GroupInfo::new(group, true)))
}

#[axum::debug_handler]
pub async fn remove_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Group::remove(state.store.as_ref(), &group_id, &claims.sub).await?;
    Ok(success_to_api_response(serde_json::json!({
        "success": true
    })))
}

#[axum::debug_handler]
pub async fn join_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinGroupRequest>,
) -> AppResult<impl IntoResponse> {
    let store = state.store.as_ref();
    let group = match (req.group_id, req.invite_code) {
        (Some(group_id), code) => {
            Membership::join(store, &claims.sub, &group_id, code.as_deref(), Utc::now()).await?;
            Group::find_by_id(store, &group_id).await?
        }
        (None, Some(code)) => {
            Membership::join_by_invite_code(store, &claims.sub, &code, Utc::now()).await?
        }
        (None, None) => {
            return Err(AppError::bad_request("group_id or invite_code is required"));
        }
    };
    Ok(success_to_api_response(GroupInfo::new(group, false)))
}

#[axum::debug_handler]
pub async fn leave_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Membership::leave(state.store.as_ref(), &group_id, &claims.sub).await?;
    Ok(success_to_api_response(serde_json::json!({
        "success": true
    })))
}

#[axum::debug_handler]
pub async fn get_group_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let members = Membership::list(state.store.as_ref(), &group_id, &claims.sub).await?;
    let members = members.into_iter().map(MemberInfo::from).collect::<Vec<_>>();
    Ok(success_to_api_response(members))
}

#[axum::debug_handler]
pub async fn set_member_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<String>,
    Json(req): Json<UpdateMemberRoleRequest>,
) -> AppResult<impl IntoResponse> {
    let member = Membership::update_role(
        state.store.as_ref(),
        &group_id,
        &req.user_id,
        req.is_admin,
        &claims.sub,
    )
    .await?;
    Ok(success_to_api_response(MemberInfo::from(member)))
}

#[axum::debug_handler]
pub async fn remove_group_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((group_id, user_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    Membership::kick(state.store.as_ref(), &group_id, &user_id, &claims.sub).await?;
    Ok(success_to_api_response(serde_json::json!({
        "success": true
    })))
}
