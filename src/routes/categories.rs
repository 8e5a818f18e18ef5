use crate::{
    error::Result,
    models::category::{CreateCategoryRequest, UpdateCategoryRequest},
    services::AuthUser,
    state::AppState,
    utils::validation::validate_request,
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/followed", get(list_followed))
        .route("/:id", get(get_category).put(update_category).delete(delete_category))
        .route("/:id/follow", post(follow_category).delete(unfollow_category))
}

/// 当前用户关注的类别
async fn list_followed(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Value>> {
    let categories = state.category_service.list_followed(user.user_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": categories
    })))
}

async fn list_categories(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let categories = state.category_service.list_categories().await?;

    Ok(Json(json!({
        "success": true,
        "data": categories
    })))
}

async fn get_category(
    State(state): State<Arc<AppState>>,
    Path(category_id): Path<i64>,
) -> Result<Json<Value>> {
    let category = state.category_service.get_category(category_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": category
    })))
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<Json<Value>> {
    validate_request(&request)?;
    let category = state.category_service.create_category(&request).await?;

    Ok(Json(json!({
        "success": true,
        "data": category
    })))
}

async fn update_category(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(category_id): Path<i64>,
    Json(request): Json<UpdateCategoryRequest>,
) -> Result<Json<Value>> {
    validate_request(&request)?;
    let category = state
        .category_service
        .update_category(category_id, &request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": category
    })))
}

async fn delete_category(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(category_id): Path<i64>,
) -> Result<Json<Value>> {
    state.category_service.delete_category(category_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "类别已删除"
    })))
}

async fn follow_category(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(category_id): Path<i64>,
) -> Result<Json<Value>> {
    state
        .category_service
        .follow_category(category_id, user.user_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "关注成功"
    })))
}

async fn unfollow_category(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(category_id): Path<i64>,
) -> Result<Json<Value>> {
    state
        .category_service
        .unfollow_category(category_id, user.user_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "已取消关注"
    })))
}
