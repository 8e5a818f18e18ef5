use crate::{
    error::Result,
    models::user::{
        ForgotPasswordRequest, LoginRequest, RefreshTokenRequest, RegisterRequest,
        ResendVerificationRequest, ResetPasswordRequest, VerifyEmailQuery,
    },
    state::AppState,
    utils::validation::validate_request,
};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh_token))
        .route("/verify-email", get(verify_email))
        .route("/resend-verification", post(resend_verification))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/logout", post(logout))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<Value>> {
    validate_request(&request)?;
    let profile = state.user_service.register(&request).await?;

    Ok(Json(json!({
        "success": true,
        "message": "注册成功，请查收验证邮件",
        "data": profile
    })))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>> {
    validate_request(&request)?;
    let (profile, tokens) = state.user_service.login(&request).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "user": profile,
            "access_token": tokens.access_token,
            "refresh_token": tokens.refresh_token
        }
    })))
}

async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshTokenRequest>,
) -> Result<Json<Value>> {
    let tokens = state
        .user_service
        .refresh_tokens(&request.refresh_token)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": tokens
    })))
}

async fn verify_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<Value>> {
    state.user_service.verify_email(&query.token).await?;

    Ok(Json(json!({
        "success": true,
        "message": "邮箱验证成功"
    })))
}

async fn resend_verification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResendVerificationRequest>,
) -> Result<Json<Value>> {
    validate_request(&request)?;
    state.user_service.resend_verification(&request.email).await?;

    Ok(Json(json!({
        "success": true,
        "message": "验证邮件已重新发送"
    })))
}

/// 响应不区分邮箱是否已注册
async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>> {
    validate_request(&request)?;
    state.user_service.request_password_reset(&request.email).await?;

    Ok(Json(json!({
        "success": true,
        "message": "如果该邮箱已注册，重置邮件已发送"
    })))
}

async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<Value>> {
    validate_request(&request)?;
    state
        .user_service
        .reset_password(&request.token, &request.new_password)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "密码已重置，请使用新密码登录"
    })))
}

/// 无状态 JWT，登出由客户端丢弃令牌完成
async fn logout() -> Result<Json<Value>> {
    Ok(Json(json!({
        "success": true,
        "message": "已退出登录"
    })))
}
