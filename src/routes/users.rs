use crate::{
    error::Result,
    models::user::{UpdateAvatarRequest, UpdateProfileRequest},
    services::AuthUser,
    state::AppState,
    utils::validation::validate_request,
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, put},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(get_me).put(update_me))
        .route("/me/avatar", put(update_avatar))
        .route("/me/liked-posts", get(get_liked_posts))
        .route("/:id", get(get_user))
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Value>> {
    let profile = state.user_service.get_profile(user.user_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": profile
    })))
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Value>> {
    validate_request(&request)?;
    let profile = state
        .user_service
        .update_profile(user.user_id, &request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": profile
    })))
}

async fn update_avatar(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<UpdateAvatarRequest>,
) -> Result<Json<Value>> {
    let profile = state
        .user_service
        .update_avatar(user.user_id, &request.avatar_url)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": profile
    })))
}

async fn get_liked_posts(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Value>> {
    let posts = state.post_service.list_liked_posts(user.user_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": posts
    })))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>> {
    let profile = state.user_service.get_profile(user_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": profile
    })))
}
