use crate::{
    error::{AppError, Result},
    models::{
        notification::{CreateNotification, NotificationType, RelatedType},
        post::{
            CreatePostRequest, PostImage, PostListItem, PostListQuery, PostRow, UpdatePostRequest,
        },
    },
    services::{database::Database, notification::NotificationService},
};
use sqlx::mysql::MySql;
use sqlx::Transaction;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_POST_KIND: &str = "normal";

/// 帖子服务：帖子、图片与点赞
#[derive(Clone)]
pub struct PostService {
    db: Arc<Database>,
    notification_service: Arc<NotificationService>,
    default_page_size: u32,
}

impl PostService {
    pub fn new(
        db: Arc<Database>,
        notification_service: Arc<NotificationService>,
        default_page_size: u32,
    ) -> Self {
        Self {
            db,
            notification_service,
            default_page_size,
        }
    }

    /// 发布帖子。帖子与图片在同一事务中写入，坐标以 POINT 存储。
    pub async fn create_post(&self, user_id: i64, request: &CreatePostRequest) -> Result<i64> {
        let kind = request.kind.as_deref().unwrap_or(DEFAULT_POST_KIND);

        let mut tx = self.db.pool().begin().await?;
        let result = sqlx::query(
            r#"INSERT INTO posts (user_id, category_id, title, content, type, location, coordinates)
               VALUES (?, ?, ?, ?, ?, ?, ST_GeomFromText(?))"#,
        )
        .bind(user_id)
        .bind(request.category_id)
        .bind(&request.title)
        .bind(&request.content)
        .bind(kind)
        .bind(&request.location)
        .bind(request.coordinates.to_wkt())
        .execute(&mut *tx)
        .await?;
        let post_id = result.last_insert_id() as i64;

        if let Some(images) = &request.images {
            insert_images(&mut tx, post_id, images).await?;
        }
        tx.commit().await?;

        info!("Post created: id={} user={}", post_id, user_id);
        Ok(post_id)
    }

    /// 帖子行，坐标展开为经纬度并联结作者信息
    pub async fn get_post_row(&self, post_id: i64) -> Result<PostRow> {
        sqlx::query_as::<_, PostRow>(
            r#"SELECT p.id, p.user_id, p.category_id, p.title, p.content, p.type,
                      p.location, ST_X(p.coordinates) AS x, ST_Y(p.coordinates) AS y,
                      p.is_approved, p.likes_count, p.comments_count,
                      p.created_at, p.updated_at,
                      u.nickname AS author_name, u.avatar_url AS author_avatar
               FROM posts p
               LEFT JOIN users u ON u.id = p.user_id
               WHERE p.id = ?"#,
        )
        .bind(post_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| AppError::not_found("帖子"))
    }

    /// 对外可见的帖子行：未审核的帖子与不存在等同。
    /// 作者本人的修改、删除走不过滤的 get_post_row。
    pub async fn get_visible_post(&self, post_id: i64) -> Result<PostRow> {
        let row = self.get_post_row(post_id).await?;
        ensure_visible(&row)?;
        Ok(row)
    }

    pub async fn get_images(&self, post_id: i64) -> Result<Vec<PostImage>> {
        let images = sqlx::query_as::<_, PostImage>(
            "SELECT * FROM post_images WHERE post_id = ? ORDER BY sequence_number ASC",
        )
        .bind(post_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(images)
    }

    /// 分页帖子列表，最新在前
    pub async fn list_posts(
        &self,
        query: &PostListQuery,
        viewer_id: Option<i64>,
    ) -> Result<(Vec<PostListItem>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(self.default_page_size).clamp(1, 50);
        let offset = (page - 1) * limit;

        let mut sql = String::from(
            r#"SELECT p.id, p.user_id, p.category_id, p.title, p.content, p.type,
                      p.location, ST_X(p.coordinates) AS x, ST_Y(p.coordinates) AS y,
                      p.is_approved, p.likes_count, p.comments_count,
                      p.created_at, p.updated_at,
                      u.nickname AS author_name, u.avatar_url AS author_avatar
               FROM posts p
               LEFT JOIN users u ON u.id = p.user_id
               WHERE 1 = 1"#,
        );
        let mut count_sql = String::from("SELECT COUNT(*) FROM posts p WHERE 1 = 1");

        let only_self = query.is_self.unwrap_or(false);
        if only_self && viewer_id.is_none() {
            return Err(AppError::unauthorized("LOGIN_REQUIRED"));
        }
        // 公共列表只含已审核帖子，自己的列表不过滤
        if !only_self {
            sql.push_str(" AND p.is_approved = TRUE");
            count_sql.push_str(" AND p.is_approved = TRUE");
        }
        if query.category_id.is_some() {
            sql.push_str(" AND p.category_id = ?");
            count_sql.push_str(" AND p.category_id = ?");
        }
        if query.kind.is_some() {
            sql.push_str(" AND p.type = ?");
            count_sql.push_str(" AND p.type = ?");
        }
        if only_self {
            sql.push_str(" AND p.user_id = ?");
            count_sql.push_str(" AND p.user_id = ?");
        }
        sql.push_str(" ORDER BY p.created_at DESC LIMIT ? OFFSET ?");

        let mut rows_query = sqlx::query_as::<_, PostRow>(&sql);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(category_id) = query.category_id {
            rows_query = rows_query.bind(category_id);
            count_query = count_query.bind(category_id);
        }
        if let Some(kind) = &query.kind {
            rows_query = rows_query.bind(kind);
            count_query = count_query.bind(kind);
        }
        if only_self {
            let viewer = viewer_id.unwrap_or_default();
            rows_query = rows_query.bind(viewer);
            count_query = count_query.bind(viewer);
        }

        let rows = rows_query
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(self.db.pool())
            .await?;
        let total = count_query.fetch_one(self.db.pool()).await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let images = self.get_images(row.id).await?;
            items.push(row.into_list_item(images));
        }
        Ok((items, total))
    }

    /// 更新帖子，仅作者可改。提供图片时整体替换。
    pub async fn update_post(
        &self,
        post_id: i64,
        user_id: i64,
        request: &UpdatePostRequest,
    ) -> Result<()> {
        let current = self.get_post_row(post_id).await?;
        if current.user_id != user_id {
            return Err(AppError::forbidden("只能修改自己的帖子"));
        }

        let coordinates = request
            .coordinates
            .unwrap_or(crate::models::post::Coordinates { x: current.x, y: current.y });

        let mut tx = self.db.pool().begin().await?;
        sqlx::query(
            r#"UPDATE posts SET title = ?, content = ?, category_id = ?, type = ?,
                      location = ?, coordinates = ST_GeomFromText(?)
               WHERE id = ?"#,
        )
        .bind(request.title.clone().unwrap_or(current.title))
        .bind(request.content.clone().unwrap_or(current.content))
        .bind(request.category_id.or(current.category_id))
        .bind(request.kind.clone().unwrap_or(current.kind))
        .bind(request.location.clone().or(current.location))
        .bind(coordinates.to_wkt())
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

        if let Some(images) = &request.images {
            sqlx::query("DELETE FROM post_images WHERE post_id = ?")
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
            insert_images(&mut tx, post_id, images).await?;
        }
        tx.commit().await?;

        info!("Post updated: id={} user={}", post_id, user_id);
        Ok(())
    }

    /// 删除帖子及其图片、点赞与评论，单事务完成。
    /// 返回图片 URL 以便调用方清理存储文件。
    pub async fn delete_post(&self, post_id: i64, user_id: i64) -> Result<Vec<String>> {
        let current = self.get_post_row(post_id).await?;
        if current.user_id != user_id {
            return Err(AppError::forbidden("只能删除自己的帖子"));
        }

        let image_urls: Vec<String> = self
            .get_images(post_id)
            .await?
            .into_iter()
            .map(|image| image.image_url)
            .collect();

        let mut tx = self.db.pool().begin().await?;
        sqlx::query(
            "DELETE cl FROM comment_likes cl INNER JOIN comments c ON c.id = cl.comment_id WHERE c.post_id = ?",
        )
        .bind(post_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM comments WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM post_likes WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM post_images WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Post deleted: id={} user={}", post_id, user_id);
        Ok(image_urls)
    }

    /// 点赞帖子。唯一约束保证幂等：重复请求不改变计数。
    /// 首次点赞后尽力通知作者，不给自己发。
    pub async fn like_post(&self, post_id: i64, user_id: i64) -> Result<bool> {
        let post = self.get_visible_post(post_id).await?;

        let mut tx = self.db.pool().begin().await?;
        let inserted = sqlx::query("INSERT IGNORE INTO post_likes (post_id, user_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let newly_liked = inserted.rows_affected() > 0;
        if newly_liked {
            sqlx::query("UPDATE posts SET likes_count = likes_count + 1 WHERE id = ?")
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        if newly_liked && post.user_id != user_id {
            let outcome = self
                .notification_service
                .create_notification(CreateNotification {
                    recipient_id: post.user_id,
                    sender_id: user_id,
                    kind: NotificationType::PostLike,
                    related_id: post_id,
                    related_type: RelatedType::Post,
                    title: None,
                    content: None,
                })
                .await;
            if let Err(e) = outcome {
                warn!("Failed to create like notification: {}", e);
            }
        }

        Ok(newly_liked)
    }

    pub async fn unlike_post(&self, post_id: i64, user_id: i64) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;
        let deleted = sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND user_id = ?")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let removed = deleted.rows_affected() > 0;
        if removed {
            sqlx::query("UPDATE posts SET likes_count = GREATEST(likes_count - 1, 0) WHERE id = ?")
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    /// 用户点赞过的帖子，按点赞时间倒序
    pub async fn list_liked_posts(&self, user_id: i64) -> Result<Vec<PostListItem>> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"SELECT p.id, p.user_id, p.category_id, p.title, p.content, p.type,
                      p.location, ST_X(p.coordinates) AS x, ST_Y(p.coordinates) AS y,
                      p.is_approved, p.likes_count, p.comments_count,
                      p.created_at, p.updated_at,
                      u.nickname AS author_name, u.avatar_url AS author_avatar
               FROM post_likes pl
               INNER JOIN posts p ON p.id = pl.post_id
               LEFT JOIN users u ON u.id = p.user_id
               WHERE pl.user_id = ?
               ORDER BY pl.created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let images = self.get_images(row.id).await?;
            items.push(row.into_list_item(images));
        }
        Ok(items)
    }

    pub async fn is_liked(&self, post_id: i64, user_id: i64) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM post_likes WHERE post_id = ? AND user_id = ?",
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await?;
        Ok(count > 0)
    }
}

async fn insert_images(
    tx: &mut Transaction<'_, MySql>,
    post_id: i64,
    images: &[String],
) -> Result<()> {
    for (index, image_url) in images.iter().enumerate() {
        sqlx::query(
            "INSERT INTO post_images (post_id, image_url, sequence_number) VALUES (?, ?, ?)",
        )
        .bind(post_id)
        .bind(image_url)
        .bind(index as i32)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// 未审核的帖子对外等同于不存在
fn ensure_visible(post: &PostRow) -> Result<()> {
    if post.is_approved {
        Ok(())
    } else {
        Err(AppError::not_found("帖子"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(is_approved: bool) -> PostRow {
        PostRow {
            id: 1,
            user_id: 10,
            category_id: None,
            title: "标题".to_string(),
            content: "内容".to_string(),
            kind: "normal".to_string(),
            location: None,
            x: 121.47,
            y: 31.23,
            is_approved,
            likes_count: 0,
            comments_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            author_name: None,
            author_avatar: None,
        }
    }

    #[test]
    fn test_unapproved_post_treated_as_missing() {
        assert!(ensure_visible(&row(true)).is_ok());
        assert!(matches!(
            ensure_visible(&row(false)),
            Err(AppError::NotFound(_))
        ));
    }
}

// 需要真实 MySQL 的集成测试，未设置 TEST_DATABASE_URL 时直接跳过
#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::models::post::Coordinates;

    async fn test_db() -> Option<Arc<Database>> {
        let url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => return None,
        };
        let db = Arc::new(
            Database::connect(&url, 5)
                .await
                .expect("connect test database"),
        );
        db.run_migrations().await.expect("run migrations");
        Some(db)
    }

    fn service(db: Arc<Database>) -> PostService {
        let notifications = Arc::new(NotificationService::new(db.clone(), "zh-CN".to_string()));
        PostService::new(db, notifications, 10)
    }

    async fn create_user(db: &Arc<Database>, tag: &str) -> i64 {
        let email = format!("{}-{}@test.local", tag, uuid::Uuid::new_v4());
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, nickname, is_verified) VALUES (?, ?, ?, TRUE)",
        )
        .bind(&email)
        .bind("x")
        .bind(tag)
        .execute(db.pool())
        .await
        .expect("insert user");
        result.last_insert_id() as i64
    }

    fn post_request(title: &str) -> CreatePostRequest {
        CreatePostRequest {
            title: title.to_string(),
            content: "测试内容".to_string(),
            category_id: None,
            kind: None,
            location: None,
            coordinates: Coordinates { x: 121.47, y: 31.23 },
            images: Some(vec!["/uploads/images/a.jpg".to_string()]),
        }
    }

    async fn count_where(db: &Arc<Database>, sql: &str, id: i64) -> i64 {
        sqlx::query_scalar::<_, i64>(sql)
            .bind(id)
            .fetch_one(db.pool())
            .await
            .expect("count rows")
    }

    #[tokio::test]
    async fn test_duplicate_like_changes_count_once() {
        let Some(db) = test_db().await else { return };
        let posts = service(db.clone());
        let author = create_user(&db, "author").await;
        let liker = create_user(&db, "liker").await;
        let post_id = posts
            .create_post(author, &post_request("重复点赞"))
            .await
            .unwrap();

        assert!(posts.like_post(post_id, liker).await.unwrap());
        assert!(!posts.like_post(post_id, liker).await.unwrap());
        assert_eq!(
            count_where(&db, "SELECT likes_count FROM posts WHERE id = ?", post_id).await,
            1
        );
        assert_eq!(
            count_where(
                &db,
                "SELECT COUNT(*) FROM post_likes WHERE post_id = ?",
                post_id
            )
            .await,
            1
        );

        assert!(posts.unlike_post(post_id, liker).await.unwrap());
        assert!(!posts.unlike_post(post_id, liker).await.unwrap());
        assert_eq!(
            count_where(&db, "SELECT likes_count FROM posts WHERE id = ?", post_id).await,
            0
        );
    }

    #[tokio::test]
    async fn test_delete_post_is_all_or_nothing() {
        let Some(db) = test_db().await else { return };
        let posts = service(db.clone());
        let author = create_user(&db, "owner").await;
        let other = create_user(&db, "other").await;
        let post_id = posts
            .create_post(author, &post_request("级联删除"))
            .await
            .unwrap();
        posts.like_post(post_id, other).await.unwrap();
        let comment =
            sqlx::query("INSERT INTO comments (post_id, user_id, content) VALUES (?, ?, ?)")
                .bind(post_id)
                .bind(other)
                .bind("评论")
                .execute(db.pool())
                .await
                .unwrap();
        let comment_id = comment.last_insert_id() as i64;
        sqlx::query("INSERT INTO comment_likes (comment_id, user_id) VALUES (?, ?)")
            .bind(comment_id)
            .bind(author)
            .execute(db.pool())
            .await
            .unwrap();

        // 非作者删除失败，关联行原样保留
        assert!(posts.delete_post(post_id, other).await.is_err());
        for sql in [
            "SELECT COUNT(*) FROM posts WHERE id = ?",
            "SELECT COUNT(*) FROM post_images WHERE post_id = ?",
            "SELECT COUNT(*) FROM post_likes WHERE post_id = ?",
            "SELECT COUNT(*) FROM comments WHERE post_id = ?",
        ] {
            assert_eq!(count_where(&db, sql, post_id).await, 1);
        }

        let image_urls = posts.delete_post(post_id, author).await.unwrap();
        assert_eq!(image_urls, vec!["/uploads/images/a.jpg".to_string()]);
        for sql in [
            "SELECT COUNT(*) FROM posts WHERE id = ?",
            "SELECT COUNT(*) FROM post_images WHERE post_id = ?",
            "SELECT COUNT(*) FROM post_likes WHERE post_id = ?",
            "SELECT COUNT(*) FROM comments WHERE post_id = ?",
        ] {
            assert_eq!(count_where(&db, sql, post_id).await, 0);
        }
        assert_eq!(
            count_where(
                &db,
                "SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?",
                comment_id
            )
            .await,
            0
        );
    }

    #[tokio::test]
    async fn test_unapproved_post_hidden_from_detail_and_like() {
        let Some(db) = test_db().await else { return };
        let posts = service(db.clone());
        let author = create_user(&db, "mod").await;
        let viewer = create_user(&db, "viewer").await;
        let post_id = posts
            .create_post(author, &post_request("待审核"))
            .await
            .unwrap();
        sqlx::query("UPDATE posts SET is_approved = FALSE WHERE id = ?")
            .bind(post_id)
            .execute(db.pool())
            .await
            .unwrap();

        assert!(matches!(
            posts.get_visible_post(post_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            posts.like_post(post_id, viewer).await,
            Err(AppError::NotFound(_))
        ));
        // 作者的修改、删除路径仍能取到原始行
        assert!(posts.get_post_row(post_id).await.is_ok());
    }
}
