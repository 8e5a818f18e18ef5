use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, Router},
};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod models;
mod routes;
mod services;
mod state;
mod utils;

use crate::{
    config::Config,
    services::{
        AuthService, CategoryService, CommentService, Database, EmailService, ImageStorage,
        LocalStorage, MediaService, NotificationService, PostService, UserService, VenueService,
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SportHub service...");

    // 初始化数据库连接并执行迁移
    let db = Arc::new(Database::new(&config).await?);
    db.verify_connection().await?;
    db.run_migrations().await?;

    // 初始化所有服务
    let auth_service = Arc::new(AuthService::new(&config));
    let email_service = Arc::new(EmailService::new(&config)?);
    let notification_service = Arc::new(NotificationService::new(
        db.clone(),
        config.notification_language.clone(),
    ));
    let user_service = UserService::new(
        db.clone(),
        auth_service.clone(),
        email_service.clone(),
        config.verification_token_expiry_hours,
    );
    let category_service = CategoryService::new(db.clone());
    let post_service = PostService::new(
        db.clone(),
        notification_service.clone(),
        config.default_page_size as u32,
    );
    let comment_service = CommentService::new(
        db.clone(),
        notification_service.clone(),
        config.drop_orphan_comments,
    );
    let venue_service = VenueService::new(db.clone(), config.default_page_size as u32);
    let storage: Arc<dyn ImageStorage> = Arc::new(LocalStorage::new(&config));
    let media_service = MediaService::new(storage, &config);

    // 创建应用状态
    let app_state = Arc::new(AppState {
        config: config.clone(),
        db: db.clone(),
        auth_service,
        user_service,
        category_service,
        post_service,
        comment_service,
        venue_service,
        notification_service: (*notification_service).clone(),
        media_service,
    });

    // 启动后台任务
    start_background_tasks(app_state.clone()).await;

    // 配置 CORS
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_origin(
            config
                .cors_allowed_origins
                .split(',')
                .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        );

    // 构建应用路由
    let app = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .nest("/api/auth", routes::auth::router())
        .nest("/api/users", routes::users::router())
        .nest("/api/categories", routes::categories::router())
        .nest("/api/posts", routes::posts::router())
        .nest("/api/comments", routes::comments::router())
        .nest("/api/venues", routes::venues::router())
        .nest("/api/notifications", routes::notifications::router())
        .nest("/api/upload", routes::media::router())
        .nest_service("/uploads/images", ServeDir::new(&config.upload_dir))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            utils::middleware::rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            utils::middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(utils::middleware::request_logging_middleware))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // 启动主服务器
    let addr = format!("{}:{}", config.server_host, config.server_port);
    info!("Starting server on http://{}", addr);

    axum::Server::bind(&addr.parse()?)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "SportHub is running!"
}

async fn start_background_tasks(app_state: Arc<AppState>) {
    info!("Starting background tasks...");

    // 数据库保活任务
    let keepalive_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(
            keepalive_state.config.database_keepalive_interval,
        ));

        loop {
            interval.tick().await;
            keepalive_state.db.ping().await;
        }
    });

    // 清理过期验证令牌任务
    let cleanup_state = app_state;
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;
            let result = sqlx::query("DELETE FROM verification_tokens WHERE expires_at < NOW()")
                .execute(cleanup_state.db.pool())
                .await;
            match result {
                Ok(outcome) if outcome.rows_affected() > 0 => {
                    info!("Cleaned {} expired verification tokens", outcome.rows_affected());
                }
                Ok(_) => {}
                Err(e) => error!("Failed to clean expired verification tokens: {}", e),
            }
        }
    });

    info!("Background tasks started successfully");
}
