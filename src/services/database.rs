use crate::{config::Config, error::Result};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::time::Duration;
use tracing::{error, info};

/// MySQL 连接池封装，所有服务共享一个实例
#[derive(Clone)]
pub struct Database {
    pool: MySqlPool,
}

impl Database {
    pub async fn new(config: &Config) -> Result<Self> {
        Self::connect(&config.database_url, config.database_max_connections).await
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        info!("Connecting to MySQL database");

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        info!("Database connection pool established");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// 启动时验证连通性
    pub async fn verify_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        info!("Database connection verified");
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// 保活探测，由后台任务周期调用
    pub async fn ping(&self) {
        if let Err(e) = sqlx::query("SELECT 1").execute(&self.pool).await {
            error!("Database keepalive ping failed: {}", e);
        }
    }
}
