use crate::{
    error::{AppError, Result},
    services::AuthUser,
    state::AppState,
};
use axum::{
    extract::{Multipart, State},
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// 单次请求最多接受的图片数
const MAX_IMAGES_PER_REQUEST: usize = 10;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/images", post(upload_images))
}

/// 接收 multipart 表单中的图片字段，逐个校验并存储
async fn upload_images(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let mut uploaded = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::FileUpload(format!("读取上传内容失败: {}", e)))?
    {
        if uploaded.len() >= MAX_IMAGES_PER_REQUEST {
            return Err(AppError::FileUpload(format!(
                "单次最多上传{}张图片",
                MAX_IMAGES_PER_REQUEST
            )));
        }
        let filename = field
            .file_name()
            .map(|name| name.to_string())
            .unwrap_or_else(|| "image.jpg".to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::FileUpload(format!("读取上传内容失败: {}", e)))?;

        let image_url = state.media_service.upload_image(&data, &filename).await?;
        uploaded.push(json!({
            "image_url": image_url,
            "sequence_number": uploaded.len()
        }));
    }

    if uploaded.is_empty() {
        return Err(AppError::FileUpload("未找到上传的图片".to_string()));
    }

    info!("User {} uploaded {} image(s)", user.user_id, uploaded.len());
    Ok(Json(json!({
        "success": true,
        "data": uploaded
    })))
}
