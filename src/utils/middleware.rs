use crate::{error::AppError, state::AppState};
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

type KeyedRateLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;
static RATE_LIMITER: OnceCell<KeyedRateLimiter> = OnceCell::const_new();

/// 认证中间件：把认证服务注入请求扩展，供提取器使用
pub async fn auth_middleware(
    State(app_state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next<Body>,
) -> Result<Response, AppError> {
    request.extensions_mut().insert(app_state.auth_service.clone());
    Ok(next.run(request).await)
}

/// 速率限制中间件，按客户端 IP 限流
pub async fn rate_limit_middleware(
    State(app_state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next<Body>,
) -> Result<Response, AppError> {
    let rate_limiter = RATE_LIMITER
        .get_or_init(|| async {
            let quota = rate_limit_quota(
                app_state.config.rate_limit_requests,
                app_state.config.rate_limit_window,
            );
            RateLimiter::dashmap(quota)
        })
        .await;

    let client_ip = get_client_ip(&request);
    match rate_limiter.check_key(&client_ip) {
        Ok(_) => {
            debug!("Rate limit check passed for IP: {}", client_ip);
            Ok(next.run(request).await)
        }
        Err(_) => {
            warn!("Rate limit exceeded for IP: {}", client_ip);
            Err(AppError::RateLimitExceeded)
        }
    }
}

/// 请求日志中间件
pub async fn request_logging_middleware(request: Request<Body>, next: Next<Body>) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = get_client_ip(&request);
    let start_time = std::time::Instant::now();

    debug!("Incoming request: {} {} from {}", method, uri, client_ip);

    let response = next.run(request).await;

    info!(
        "Request completed: {} {} {} - {}ms",
        method,
        uri,
        response.status().as_u16(),
        start_time.elapsed().as_millis()
    );

    response
}

/// 限流配额：窗口内允许 max_requests 次请求，突发上限10次。
/// 窗口或次数为0时回退为每分钟1次。
fn rate_limit_quota(max_requests: u32, window_secs: u64) -> Quota {
    let max = NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(10).unwrap_or(NonZeroU32::MIN);
    let period = std::time::Duration::from_millis(
        window_secs.saturating_mul(1000) / u64::from(max.get()),
    );
    match Quota::with_period(period) {
        Some(quota) => quota.allow_burst(burst),
        None => Quota::per_minute(NonZeroU32::MIN).allow_burst(burst),
    }
}

/// 获取客户端 IP，优先读取代理头
fn get_client_ip(request: &Request<Body>) -> String {
    let headers = request.headers();

    if let Some(forwarded_for) = headers.get("x-forwarded-for") {
        if let Ok(ip_str) = forwarded_for.to_str() {
            if let Some(ip) = ip_str.split(',').next() {
                return ip.trim().to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.to_string();
        }
    }

    request
        .extensions()
        .get::<SocketAddr>()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rate_limit_quota_spreads_requests_over_window() {
        let quota = rate_limit_quota(120, 60);
        assert_eq!(quota.replenish_interval(), Duration::from_millis(500));
        assert_eq!(quota.burst_size().get(), 10);
    }

    #[test]
    fn test_rate_limit_quota_zero_window_falls_back() {
        let quota = rate_limit_quota(100, 0);
        assert_eq!(quota.replenish_interval(), Duration::from_secs(60));

        let quota = rate_limit_quota(0, 60);
        assert_eq!(quota.replenish_interval(), Duration::from_secs(60));
    }
}
