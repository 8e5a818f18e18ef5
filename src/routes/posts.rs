use crate::{
    error::Result,
    models::post::{CreatePostRequest, PostListQuery, UpdatePostRequest},
    services::{AuthUser, OptionalAuthUser},
    state::AppState,
    utils::validation::validate_request,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_posts).post(create_post))
        .route("/:id", get(get_post).put(update_post).delete(delete_post))
        .route("/:id/like", post(like_post).delete(unlike_post))
        .route("/:id/comments", get(get_post_comments).post(add_comment))
}

async fn list_posts(
    State(state): State<Arc<AppState>>,
    OptionalAuthUser(user): OptionalAuthUser,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Value>> {
    let viewer_id = user.map(|u| u.user_id);
    let (posts, total) = state.post_service.list_posts(&query, viewer_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "posts": posts,
            "total": total,
            "page": query.page.unwrap_or(1)
        }
    })))
}

async fn create_post(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<CreatePostRequest>,
) -> Result<Json<Value>> {
    validate_request(&request)?;
    let post_id = state.post_service.create_post(user.user_id, &request).await?;
    let row = state.post_service.get_post_row(post_id).await?;
    let images = state.post_service.get_images(post_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": row.into_list_item(images)
    })))
}

/// 帖子详情：图片、嵌套评论与当前用户点赞状态
async fn get_post(
    State(state): State<Arc<AppState>>,
    OptionalAuthUser(user): OptionalAuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<Value>> {
    let row = state.post_service.get_visible_post(post_id).await?;
    let images = state.post_service.get_images(post_id).await?;
    let comments = state.comment_service.get_comments_for_post(post_id).await?;
    let is_liked = match user {
        Some(user) => state.post_service.is_liked(post_id, user.user_id).await?,
        None => false,
    };

    Ok(Json(json!({
        "success": true,
        "data": row.into_detail(images, comments, is_liked)
    })))
}

async fn update_post(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(post_id): Path<i64>,
    Json(request): Json<UpdatePostRequest>,
) -> Result<Json<Value>> {
    validate_request(&request)?;
    state
        .post_service
        .update_post(post_id, user.user_id, &request)
        .await?;
    let row = state.post_service.get_post_row(post_id).await?;
    let images = state.post_service.get_images(post_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": row.into_list_item(images)
    })))
}

async fn delete_post(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<Value>> {
    let image_urls = state.post_service.delete_post(post_id, user.user_id).await?;
    state.media_service.delete_images_best_effort(&image_urls).await;

    Ok(Json(json!({
        "success": true,
        "message": "帖子已删除"
    })))
}

async fn like_post(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<Value>> {
    let newly_liked = state.post_service.like_post(post_id, user.user_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "liked": true, "changed": newly_liked }
    })))
}

async fn unlike_post(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<Value>> {
    let removed = state.post_service.unlike_post(post_id, user.user_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "liked": false, "changed": removed }
    })))
}

async fn get_post_comments(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<i64>,
) -> Result<Json<Value>> {
    // 确认帖子对外可见再取评论
    state.post_service.get_visible_post(post_id).await?;
    let comments = state.comment_service.get_comments_for_post(post_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": comments
    })))
}

async fn add_comment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(post_id): Path<i64>,
    Json(request): Json<crate::models::comment::CreateCommentRequest>,
) -> Result<Json<Value>> {
    validate_request(&request)?;
    let comment_id = state
        .comment_service
        .add_comment(post_id, user.user_id, &request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": { "id": comment_id }
    })))
}
