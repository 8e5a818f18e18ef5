use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("File upload error: {0}")]
    FileUpload(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Validation error: {0}")]
    ValidatorError(#[from] validator::ValidationErrors),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, code) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, localize("DATABASE_ERROR").to_string(), "DATABASE_ERROR")
            }
            AppError::Migration(e) => {
                tracing::error!("Migration error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, localize("DATABASE_ERROR").to_string(), "MIGRATION_ERROR")
            }
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, localize_or(msg), "AUTHENTICATION_ERROR")
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, localize_or(msg), "AUTHORIZATION_ERROR")
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, localize_or(msg), "VALIDATION_ERROR")
            }
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, localize_or(msg), "NOT_FOUND")
            }
            AppError::Conflict(msg) => {
                (StatusCode::CONFLICT, localize_or(msg), "CONFLICT")
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, localize_or(msg), "BAD_REQUEST")
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, localize("INTERNAL_ERROR").to_string(), "INTERNAL_ERROR")
            }
            AppError::RateLimitExceeded => {
                (StatusCode::TOO_MANY_REQUESTS, "请求过于频繁，请稍后再试".to_string(), "RATE_LIMIT_EXCEEDED")
            }
            AppError::FileUpload(msg) => {
                (StatusCode::BAD_REQUEST, localize_or(msg), "FILE_UPLOAD_ERROR")
            }
            AppError::ImageProcessing(msg) => {
                (StatusCode::BAD_REQUEST, localize_or(msg), "IMAGE_PROCESSING_ERROR")
            }
            AppError::Email(msg) => {
                tracing::error!("Email error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, localize("EMAIL_ERROR").to_string(), "EMAIL_ERROR")
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, localize("INTERNAL_ERROR").to_string(), "SERIALIZATION_ERROR")
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, localize("INTERNAL_ERROR").to_string(), "IO_ERROR")
            }
            AppError::Jwt(e) => {
                tracing::debug!("JWT error: {}", e);
                (StatusCode::UNAUTHORIZED, localize("INVALID_TOKEN").to_string(), "JWT_ERROR")
            }
            AppError::ValidatorError(e) => {
                let details = e
                    .field_errors()
                    .iter()
                    .map(|(field, errors)| {
                        (
                            field.to_string(),
                            errors
                                .iter()
                                .map(|e| {
                                    e.message
                                        .as_ref()
                                        .map(|m| m.to_string())
                                        .unwrap_or_else(|| "字段值无效".to_string())
                                })
                                .collect::<Vec<_>>(),
                        )
                    })
                    .collect::<std::collections::HashMap<String, Vec<String>>>();

                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "success": false,
                        "code": "VALIDATION_ERROR",
                        "message": "请求参数校验失败",
                        "details": details
                    })),
                )
                    .into_response();
            }
        };

        let body = Json(json!({
            "success": false,
            "code": code,
            "message": message
        }));

        (status, body).into_response()
    }
}

// 便利函数，用于创建常见错误
impl AppError {
    pub fn not_found(resource: &str) -> Self {
        Self::NotFound(format!("{}不存在", resource))
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self::Authentication(msg.to_string())
    }

    pub fn forbidden(msg: &str) -> Self {
        Self::Authorization(msg.to_string())
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::BadRequest(msg.to_string())
    }

    pub fn internal(msg: &str) -> Self {
        Self::Internal(msg.to_string())
    }

    pub fn conflict(msg: &str) -> Self {
        Self::Conflict(msg.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        Self::Validation(msg.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// 业务错误码到本地化文案的集中翻译
pub fn localize(key: &str) -> &'static str {
    match key {
        "USER_NOT_FOUND" => "用户不存在",
        "USER_NOT_ACTIVE" => "账号已被禁用",
        "EMAIL_NOT_VERIFIED" => "邮箱尚未验证，请先完成邮箱验证",
        "EMAIL_ALREADY_REGISTERED" => "邮箱已被注册",
        "WRONG_PASSWORD" => "密码错误",
        "INVALID_TOKEN" => "登录已过期，请重新登录",
        "INVALID_REFRESH_TOKEN" => "无效的刷新令牌",
        "INVALID_VERIFICATION_TOKEN" => "无效或已过期的验证令牌",
        "INVALID_RESET_TOKEN" => "无效或已过期的重置令牌",
        "LOGIN_REQUIRED" => "请先登录",
        "DATABASE_ERROR" => "数据库操作失败",
        "INTERNAL_ERROR" => "服务器内部错误",
        "EMAIL_ERROR" => "邮件服务异常",
        _ => "请求处理失败",
    }
}

/// 如果消息是已知错误码则翻译，否则原样返回
fn localize_or(msg: &str) -> String {
    if !msg.is_empty() && msg.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
        localize(msg).to_string()
    } else {
        msg.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localize_known_keys() {
        assert_eq!(localize("USER_NOT_FOUND"), "用户不存在");
        assert_eq!(localize("EMAIL_NOT_VERIFIED"), "邮箱尚未验证，请先完成邮箱验证");
    }

    #[test]
    fn localize_unknown_key_falls_back() {
        assert_eq!(localize("SOMETHING_ELSE"), "请求处理失败");
    }

    #[test]
    fn localize_or_passes_plain_messages_through() {
        assert_eq!(localize_or("帖子不存在"), "帖子不存在");
        assert_eq!(localize_or("USER_NOT_ACTIVE"), "账号已被禁用");
    }
}
