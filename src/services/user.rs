use crate::{
    error::{AppError, Result},
    models::user::{
        LoginRequest, RegisterRequest, TokenPair, UpdateProfileRequest, User, UserProfile,
        VerificationToken,
    },
    services::{auth::AuthService, database::Database, email::EmailService},
};
use chrono::{Duration, Utc};
use rand::RngCore;
use std::sync::Arc;
use tracing::{info, warn};

const TOKEN_KIND_EMAIL_VERIFICATION: &str = "email_verification";
const TOKEN_KIND_PASSWORD_RESET: &str = "password_reset";

/// 重置令牌有效期（小时）
const PASSWORD_RESET_EXPIRY_HOURS: i64 = 2;

/// 用户服务：注册、邮箱验证、登录与资料维护
#[derive(Clone)]
pub struct UserService {
    db: Arc<Database>,
    auth_service: Arc<AuthService>,
    email_service: Arc<EmailService>,
    verification_token_expiry_hours: i64,
}

impl UserService {
    pub fn new(
        db: Arc<Database>,
        auth_service: Arc<AuthService>,
        email_service: Arc<EmailService>,
        verification_token_expiry_hours: i64,
    ) -> Self {
        Self {
            db,
            auth_service,
            email_service,
            verification_token_expiry_hours,
        }
    }

    /// 注册新用户。创建未验证账号并发送验证邮件，
    /// 邮件发送失败不回滚注册。
    pub async fn register(&self, request: &RegisterRequest) -> Result<UserProfile> {
        let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(&request.email)
            .fetch_one(self.db.pool())
            .await?;
        if existing > 0 {
            return Err(AppError::conflict("EMAIL_ALREADY_REGISTERED"));
        }

        let password_hash = self.auth_service.hash_password(&request.password)?;
        let nickname = request
            .nickname
            .clone()
            .unwrap_or_else(|| default_nickname(&request.email));

        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, nickname) VALUES (?, ?, ?)",
        )
        .bind(&request.email)
        .bind(&password_hash)
        .bind(&nickname)
        .execute(self.db.pool())
        .await?;
        let user_id = result.last_insert_id() as i64;
        info!("User registered: id={} email={}", user_id, request.email);

        if let Err(e) = self.issue_verification_email(user_id, &request.email, &nickname).await {
            warn!("Failed to send verification email to {}: {}", request.email, e);
        }

        self.get_profile(user_id).await
    }

    /// 校验验证令牌并激活账号。令牌一次性使用。
    pub async fn verify_email(&self, token: &str) -> Result<()> {
        let record = sqlx::query_as::<_, VerificationToken>(
            "SELECT * FROM verification_tokens WHERE token = ? AND type = ?",
        )
        .bind(token)
        .bind(TOKEN_KIND_EMAIL_VERIFICATION)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| AppError::bad_request("INVALID_VERIFICATION_TOKEN"))?;

        if record.expires_at < Utc::now() {
            return Err(AppError::bad_request("INVALID_VERIFICATION_TOKEN"));
        }

        let mut tx = self.db.pool().begin().await?;
        sqlx::query("UPDATE users SET is_verified = TRUE WHERE id = ?")
            .bind(record.user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM verification_tokens WHERE user_id = ? AND type = ?")
            .bind(record.user_id)
            .bind(TOKEN_KIND_EMAIL_VERIFICATION)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Email verified for user {}", record.user_id);

        // 欢迎邮件尽力而为
        if let Some(user) = self.find_by_id(record.user_id).await? {
            let nickname = user.nickname.clone().unwrap_or_else(|| default_nickname(&user.email));
            if let Err(e) = self.email_service.send_welcome_email(&user.email, &nickname).await {
                warn!("Failed to send welcome email to {}: {}", user.email, e);
            }
        }
        Ok(())
    }

    /// 重发验证邮件，旧令牌全部作废
    pub async fn resend_verification(&self, email: &str) -> Result<()> {
        let user = self.find_by_email(email).await?.ok_or_else(|| AppError::not_found("用户"))?;
        if user.is_verified {
            return Err(AppError::bad_request("邮箱已验证，无需重复验证"));
        }

        let nickname = user.nickname.clone().unwrap_or_else(|| default_nickname(email));
        self.issue_verification_email(user.id, email, &nickname).await
    }

    async fn issue_verification_email(&self, user_id: i64, email: &str, nickname: &str) -> Result<()> {
        let token = generate_token();
        let expires_at = Utc::now() + Duration::hours(self.verification_token_expiry_hours);

        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM verification_tokens WHERE user_id = ? AND type = ?")
            .bind(user_id)
            .bind(TOKEN_KIND_EMAIL_VERIFICATION)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO verification_tokens (user_id, token, type, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&token)
        .bind(TOKEN_KIND_EMAIL_VERIFICATION)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.email_service
            .send_verification_email(email, nickname, &token)
            .await
    }

    /// 发起密码重置。邮箱未注册时静默成功，不暴露注册状态。
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let Some(user) = self.find_by_email(email).await? else {
            info!("Password reset requested for unregistered email");
            return Ok(());
        };

        let token = generate_token();
        let expires_at = Utc::now() + Duration::hours(PASSWORD_RESET_EXPIRY_HOURS);

        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM verification_tokens WHERE user_id = ? AND type = ?")
            .bind(user.id)
            .bind(TOKEN_KIND_PASSWORD_RESET)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO verification_tokens (user_id, token, type, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&token)
        .bind(TOKEN_KIND_PASSWORD_RESET)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let nickname = user.nickname.clone().unwrap_or_else(|| default_nickname(email));
        self.email_service
            .send_password_reset_email(email, &nickname, &token)
            .await
    }

    /// 校验重置令牌并更新密码。令牌一次性使用。
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        let record = sqlx::query_as::<_, VerificationToken>(
            "SELECT * FROM verification_tokens WHERE token = ? AND type = ?",
        )
        .bind(token)
        .bind(TOKEN_KIND_PASSWORD_RESET)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| AppError::bad_request("INVALID_RESET_TOKEN"))?;

        if record.expires_at < Utc::now() {
            return Err(AppError::bad_request("INVALID_RESET_TOKEN"));
        }

        let password_hash = self.auth_service.hash_password(new_password)?;

        let mut tx = self.db.pool().begin().await?;
        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(&password_hash)
            .bind(record.user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM verification_tokens WHERE user_id = ? AND type = ?")
            .bind(record.user_id)
            .bind(TOKEN_KIND_PASSWORD_RESET)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Password reset for user {}", record.user_id);
        Ok(())
    }

    /// 登录。未验证邮箱的账号在密码校验通过后仍拒绝登录。
    pub async fn login(&self, request: &LoginRequest) -> Result<(UserProfile, TokenPair)> {
        let user = self
            .find_by_email(&request.email)
            .await?
            .ok_or_else(|| AppError::unauthorized("WRONG_PASSWORD"))?;

        if !self
            .auth_service
            .verify_password(&request.password, &user.password_hash)?
        {
            warn!("Login failed for {}: wrong password", request.email);
            return Err(AppError::unauthorized("WRONG_PASSWORD"));
        }

        if !user.is_verified {
            return Err(AppError::unauthorized("EMAIL_NOT_VERIFIED"));
        }
        if !user.is_active {
            return Err(AppError::forbidden("账号已被禁用"));
        }

        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = ?")
            .bind(user.id)
            .execute(self.db.pool())
            .await?;

        let tokens = self.auth_service.issue_token_pair(user.id)?;
        info!("User logged in: id={}", user.id);
        Ok((user.to_profile(), tokens))
    }

    /// 使用刷新令牌换发新令牌对
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.auth_service.verify_refresh_token(refresh_token)?;

        let user = self
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| AppError::unauthorized("INVALID_REFRESH_TOKEN"))?;
        if !user.is_active {
            return Err(AppError::forbidden("账号已被禁用"));
        }

        self.auth_service.issue_token_pair(user.id)
    }

    pub async fn get_profile(&self, user_id: i64) -> Result<UserProfile> {
        let user = self
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("用户"))?;
        Ok(user.to_profile())
    }

    /// 更新资料，仅覆盖请求中出现的字段
    pub async fn update_profile(
        &self,
        user_id: i64,
        request: &UpdateProfileRequest,
    ) -> Result<UserProfile> {
        let user = self
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("用户"))?;

        sqlx::query(
            "UPDATE users SET nickname = ?, bio = ?, gender = ?, location = ? WHERE id = ?",
        )
        .bind(request.nickname.clone().or(user.nickname))
        .bind(request.bio.clone().or(user.bio))
        .bind(request.gender.clone().or(user.gender))
        .bind(request.location.clone().or(user.location))
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        self.get_profile(user_id).await
    }

    pub async fn update_avatar(&self, user_id: i64, avatar_url: &str) -> Result<UserProfile> {
        let result = sqlx::query("UPDATE users SET avatar_url = ? WHERE id = ?")
            .bind(avatar_url)
            .bind(user_id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("用户"));
        }
        self.get_profile(user_id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(user)
    }
}

/// 随机验证令牌：32字节熵的十六进制表示
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// 未提供昵称时取邮箱 @ 前缀
fn default_nickname(email: &str) -> String {
    email.split('@').next().unwrap_or("用户").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_is_hex_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_default_nickname_from_email() {
        assert_eq!(default_nickname("zhang.wei@example.com"), "zhang.wei");
        assert_eq!(default_nickname("nomark"), "nomark");
    }
}

// 需要真实 MySQL 的集成测试，未设置 TEST_DATABASE_URL 时直接跳过
#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::config::Config;

    fn test_config(database_url: &str) -> Config {
        Config {
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            environment: "test".to_string(),
            log_level: "sporthub=debug".to_string(),
            database_url: database_url.to_string(),
            database_max_connections: 5,
            database_keepalive_interval: 300,
            jwt_secret: "test-secret".to_string(),
            jwt_expiry_hours: 24,
            jwt_refresh_expiry_hours: 168,
            verification_token_expiry_hours: 24,
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_from_name: "SportHub".to_string(),
            smtp_from_email: "noreply@test.local".to_string(),
            frontend_url: "http://localhost:3001".to_string(),
            upload_dir: "uploads/images".to_string(),
            upload_base_url: "/uploads/images".to_string(),
            max_upload_size: 10 * 1024 * 1024,
            allowed_image_types: "jpeg,jpg,png".to_string(),
            default_page_size: 10,
            notification_language: "zh-CN".to_string(),
            drop_orphan_comments: false,
            rate_limit_requests: 100,
            rate_limit_window: 60,
            cors_allowed_origins: "http://localhost:3001".to_string(),
        }
    }

    async fn test_service() -> Option<(Arc<Database>, UserService)> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let db = Arc::new(
            Database::connect(&url, 5)
                .await
                .expect("connect test database"),
        );
        db.run_migrations().await.expect("run migrations");

        let config = test_config(&url);
        let auth = Arc::new(AuthService::new(&config));
        let email = Arc::new(EmailService::new(&config).expect("email service"));
        let users = UserService::new(
            db.clone(),
            auth,
            email,
            config.verification_token_expiry_hours,
        );
        Some((db, users))
    }

    fn unique_email(tag: &str) -> String {
        format!("{}-{}@test.local", tag, uuid::Uuid::new_v4())
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "password123".to_string(),
            nickname: Some("测试用户".to_string()),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    async fn stored_token(db: &Arc<Database>, user_id: i64, kind: &str) -> String {
        sqlx::query_scalar::<_, String>(
            "SELECT token FROM verification_tokens WHERE user_id = ? AND type = ?",
        )
        .bind(user_id)
        .bind(kind)
        .fetch_one(db.pool())
        .await
        .expect("stored token")
    }

    #[tokio::test]
    async fn test_login_requires_verified_email() {
        let Some((db, users)) = test_service().await else { return };
        let email = unique_email("verify");
        let profile = users.register(&register_request(&email)).await.unwrap();

        match users.login(&login_request(&email, "password123")).await {
            Err(AppError::Authentication(code)) => assert_eq!(code, "EMAIL_NOT_VERIFIED"),
            other => panic!("expected EMAIL_NOT_VERIFIED, got {:?}", other.err()),
        }

        let token = stored_token(&db, profile.id, TOKEN_KIND_EMAIL_VERIFICATION).await;
        users.verify_email(&token).await.unwrap();
        users
            .login(&login_request(&email, "password123"))
            .await
            .unwrap();
        // 验证令牌一次性使用
        assert!(users.verify_email(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let Some((db, users)) = test_service().await else { return };
        let email = unique_email("reset");
        let profile = users.register(&register_request(&email)).await.unwrap();
        sqlx::query("UPDATE users SET is_verified = TRUE WHERE id = ?")
            .bind(profile.id)
            .execute(db.pool())
            .await
            .unwrap();

        // 未注册邮箱不报错
        users
            .request_password_reset("missing@test.local")
            .await
            .unwrap();

        users.request_password_reset(&email).await.unwrap();
        let token = stored_token(&db, profile.id, TOKEN_KIND_PASSWORD_RESET).await;
        users.reset_password(&token, "new-password-456").await.unwrap();

        assert!(users
            .login(&login_request(&email, "password123"))
            .await
            .is_err());
        users
            .login(&login_request(&email, "new-password-456"))
            .await
            .unwrap();
        // 重置令牌一次性使用
        assert!(users.reset_password(&token, "another-789").await.is_err());
    }
}
