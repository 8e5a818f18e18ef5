use crate::{
    error::Result,
    models::notification::{NotificationListQuery, UpdateNotificationSettingsRequest},
    services::AuthUser,
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get, put},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/mark-all-read", put(mark_all_as_read))
        .route("/settings", get(get_settings).put(update_settings))
        .route("/:id/read", put(mark_as_read))
        .route("/:id", delete(delete_notification))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<NotificationListQuery>,
) -> Result<Json<Value>> {
    let list = state
        .notification_service
        .list_notifications(user.user_id, &query)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": list
    })))
}

async fn unread_count(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Value>> {
    let count = state.notification_service.unread_count(user.user_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "unread_count": count }
    })))
}

async fn mark_as_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(notification_id): Path<i64>,
) -> Result<Json<Value>> {
    state
        .notification_service
        .mark_as_read(notification_id, user.user_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "已标记为已读"
    })))
}

async fn mark_all_as_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Value>> {
    let updated = state
        .notification_service
        .mark_all_as_read(user.user_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": { "updated": updated }
    })))
}

async fn delete_notification(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(notification_id): Path<i64>,
) -> Result<Json<Value>> {
    state
        .notification_service
        .delete_notification(notification_id, user.user_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "通知已删除"
    })))
}

async fn get_settings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Value>> {
    let settings = state.notification_service.get_settings(user.user_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": settings
    })))
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<UpdateNotificationSettingsRequest>,
) -> Result<Json<Value>> {
    let settings = state
        .notification_service
        .update_settings(user.user_id, &request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": settings
    })))
}
