use crate::{
    config::Config,
    error::{AppError, Result},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// 图片存储后端抽象，便于替换为对象存储
#[async_trait]
pub trait ImageStorage: Send + Sync {
    /// 保存图片并返回可访问的 URL
    async fn upload_image(&self, data: &[u8], extension: &str) -> Result<String>;

    /// 按 URL 删除图片，文件不存在视为成功
    async fn delete_image(&self, image_url: &str) -> Result<()>;
}

/// 本地磁盘存储
pub struct LocalStorage {
    upload_dir: PathBuf,
    base_url: String,
}

impl LocalStorage {
    pub fn new(config: &Config) -> Self {
        Self {
            upload_dir: PathBuf::from(&config.upload_dir),
            base_url: config.upload_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn file_path(&self, filename: &str) -> PathBuf {
        self.upload_dir.join(filename)
    }
}

#[async_trait]
impl ImageStorage for LocalStorage {
    async fn upload_image(&self, data: &[u8], extension: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;

        let filename = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.file_path(&filename);
        tokio::fs::write(&path, data).await?;

        info!("Image stored: {}", path.display());
        Ok(format!("{}/{}", self.base_url, filename))
    }

    async fn delete_image(&self, image_url: &str) -> Result<()> {
        // 只接受本服务签发的 URL，取末段文件名，拒绝路径穿越
        let filename = image_url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty() && !name.contains(".."))
            .ok_or_else(|| AppError::bad_request("无效的图片地址"))?;

        let path = self.file_path(filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Image deleted: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

/// 媒体服务：校验并存储上传的图片
#[derive(Clone)]
pub struct MediaService {
    storage: Arc<dyn ImageStorage>,
    max_upload_size: usize,
    allowed_types: Vec<String>,
}

impl MediaService {
    pub fn new(storage: Arc<dyn ImageStorage>, config: &Config) -> Self {
        Self {
            storage,
            max_upload_size: config.max_upload_size,
            allowed_types: config
                .allowed_image_types
                .split(',')
                .map(|t| t.trim().to_lowercase())
                .collect(),
        }
    }

    /// 校验大小、扩展名与图片内容后存储，返回 URL
    pub async fn upload_image(&self, data: &[u8], filename: &str) -> Result<String> {
        if data.is_empty() {
            return Err(AppError::FileUpload("上传内容为空".to_string()));
        }
        if data.len() > self.max_upload_size {
            return Err(AppError::FileUpload(format!(
                "图片大小超过限制（最大{}MB）",
                self.max_upload_size / 1024 / 1024
            )));
        }

        let extension = extract_extension(filename)
            .ok_or_else(|| AppError::FileUpload("无法识别的文件类型".to_string()))?;
        if !self.allowed_types.iter().any(|t| t == &extension) {
            return Err(AppError::FileUpload(format!(
                "不支持的图片格式: {}",
                extension
            )));
        }

        // 按内容解码验证，拒绝伪装成图片的文件
        image::load_from_memory(data)
            .map_err(|e| AppError::ImageProcessing(format!("图片解码失败: {}", e)))?;

        self.storage.upload_image(data, &extension).await
    }

    /// 清理存储文件，失败仅记录日志
    pub async fn delete_images_best_effort(&self, image_urls: &[String]) {
        for image_url in image_urls {
            if let Err(e) = self.storage.delete_image(image_url).await {
                warn!("Failed to delete image {}: {}", image_url, e);
            }
        }
    }
}

fn extract_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_extension() {
        assert_eq!(extract_extension("photo.JPG"), Some("jpg".to_string()));
        assert_eq!(extract_extension("archive.tar.png"), Some("png".to_string()));
        assert_eq!(extract_extension("noext"), None);
    }

    #[tokio::test]
    async fn test_local_storage_delete_rejects_traversal() {
        let storage = LocalStorage {
            upload_dir: PathBuf::from("uploads/test"),
            base_url: "/uploads/test".to_string(),
        };
        assert!(storage.delete_image("/uploads/test/..").await.is_err());
        assert!(storage.delete_image("/uploads/test/").await.is_err());
    }

    #[tokio::test]
    async fn test_local_storage_delete_missing_file_ok() {
        let storage = LocalStorage {
            upload_dir: std::env::temp_dir().join("sporthub-media-test"),
            base_url: "/uploads/images".to_string(),
        };
        let missing = format!("/uploads/images/{}.png", Uuid::new_v4());
        assert!(storage.delete_image(&missing).await.is_ok());
    }
}
