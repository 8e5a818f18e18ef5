use crate::{error::Result, services::AuthUser, state::AppState};
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
        .route("/:id", get(get_comment).delete(delete_comment))
        .route("/:id/like", post(like_comment).delete(unlike_comment))
}

async fn get_comment(
    State(state): State<Arc<AppState>>,
    Path(comment_id): Path<i64>,
) -> Result<Json<Value>> {
    let comment = state.comment_service.get_comment(comment_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": comment
    })))
}

async fn delete_comment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(comment_id): Path<i64>,
) -> Result<Json<Value>> {
    state
        .comment_service
        .delete_comment(comment_id, user.user_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "评论已删除"
    })))
}

async fn like_comment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(comment_id): Path<i64>,
) -> Result<Json<Value>> {
    let newly_liked = state
        .comment_service
        .like_comment(comment_id, user.user_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": { "liked": true, "changed": newly_liked }
    })))
}

async fn unlike_comment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(comment_id): Path<i64>,
) -> Result<Json<Value>> {
    let removed = state
        .comment_service
        .unlike_comment(comment_id, user.user_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": { "liked": false, "changed": removed }
    })))
}
