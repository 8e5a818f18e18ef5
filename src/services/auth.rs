use crate::{
    config::Config,
    error::{AppError, Result},
    models::user::TokenPair,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    headers::{authorization::Bearer, Authorization},
    http::request::Parts,
    Extension, RequestPartsExt, TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// JWT 载荷
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,   // 用户ID
    pub exp: i64,   // 过期时间
    pub iat: i64,   // 签发时间
    pub token_use: String, // access 或 refresh
}

#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
    jwt_expiry_hours: i64,
    jwt_refresh_expiry_hours: i64,
}

impl AuthService {
    pub fn new(config: &Config) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            jwt_expiry_hours: config.jwt_expiry_hours,
            jwt_refresh_expiry_hours: config.jwt_refresh_expiry_hours,
        }
    }

    /// 签发访问令牌与刷新令牌
    pub fn issue_token_pair(&self, user_id: i64) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.sign(user_id, "access", self.jwt_expiry_hours)?,
            refresh_token: self.sign(user_id, "refresh", self.jwt_refresh_expiry_hours)?,
        })
    }

    fn sign(&self, user_id: i64, token_use: &str, expiry_hours: i64) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            exp: (now + Duration::hours(expiry_hours)).timestamp(),
            iat: now.timestamp(),
            token_use: token_use.to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )
        .map_err(AppError::from)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims> {
        let claims = self.verify(token, "INVALID_TOKEN")?;
        if claims.token_use != "access" {
            warn!("Token use mismatch: expected access, got {}", claims.token_use);
            return Err(AppError::unauthorized("INVALID_TOKEN"));
        }
        Ok(claims)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims> {
        let claims = self.verify(token, "INVALID_REFRESH_TOKEN")?;
        if claims.token_use != "refresh" {
            warn!("Token use mismatch: expected refresh, got {}", claims.token_use);
            return Err(AppError::unauthorized("INVALID_REFRESH_TOKEN"));
        }
        Ok(claims)
    }

    fn verify(&self, token: &str, error_key: &str) -> Result<Claims> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_ref());
        let validation = Validation::new(Algorithm::HS256);

        match decode::<Claims>(token, &decoding_key, &validation) {
            Ok(token_data) => {
                debug!("JWT token verified for user: {}", token_data.claims.sub);
                Ok(token_data.claims)
            }
            Err(e) => {
                warn!("JWT verification failed: {}", e);
                Err(AppError::unauthorized(error_key))
            }
        }
    }

    /// 密码哈希，使用随机盐的 Argon2id
    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    pub fn verify_password(&self, password: &str, password_hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

/// 已认证用户，从 Authorization 头解析
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i64,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::unauthorized("LOGIN_REQUIRED"))?;

        let Extension(auth_service): Extension<Arc<AuthService>> = parts
            .extract::<Extension<Arc<AuthService>>>()
            .await
            .map_err(|_| AppError::Internal("Auth service not found in request extensions".to_string()))?;

        let claims = auth_service.verify_access_token(bearer.token())?;
        Ok(AuthUser { user_id: claims.sub })
    }
}

/// 可选认证：未带令牌或令牌无效时为 None
pub struct OptionalAuthUser(pub Option<AuthUser>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        match AuthUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(OptionalAuthUser(Some(user))),
            Err(_) => Ok(OptionalAuthUser(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService {
            jwt_secret: "test-secret".to_string(),
            jwt_expiry_hours: 24,
            jwt_refresh_expiry_hours: 168,
        }
    }

    #[test]
    fn test_token_pair_round_trip() {
        let auth = service();
        let pair = auth.issue_token_pair(42).unwrap();

        let access = auth.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(access.sub, 42);
        assert_eq!(access.token_use, "access");

        let refresh = auth.verify_refresh_token(&pair.refresh_token).unwrap();
        assert_eq!(refresh.sub, 42);
        assert_eq!(refresh.token_use, "refresh");
    }

    #[test]
    fn test_access_token_rejected_as_refresh() {
        let auth = service();
        let pair = auth.issue_token_pair(7).unwrap();
        assert!(auth.verify_refresh_token(&pair.access_token).is_err());
        assert!(auth.verify_access_token(&pair.refresh_token).is_err());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let auth = service();
        let pair = auth.issue_token_pair(7).unwrap();
        let mut token = pair.access_token;
        token.push('x');
        assert!(auth.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_password_hash_and_verify() {
        let auth = service();
        let hash = auth.hash_password("s3cret-password").unwrap();
        assert_ne!(hash, "s3cret-password");
        assert!(auth.verify_password("s3cret-password", &hash).unwrap());
        assert!(!auth.verify_password("wrong-password", &hash).unwrap());
    }
}
