use crate::{
    error::{AppError, Result},
    models::notification::{
        CreateNotification, Notification, NotificationContext, NotificationList,
        NotificationListQuery, NotificationSettings, NotificationTemplate, NotificationType,
        RelatedType, UpdateNotificationSettingsRequest,
    },
    services::database::Database,
};
use chrono::NaiveTime;
use sqlx::Row;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 预览内容截断长度（字符数）
const PREVIEW_LEN: usize = 50;

/// 通知服务：负责设置判定、内容生成与通知的读写
#[derive(Clone)]
pub struct NotificationService {
    db: Arc<Database>,
    language: String,
}

impl NotificationService {
    pub fn new(db: Arc<Database>, language: String) -> Self {
        Self { db, language }
    }

    /// 创建一条通知。按接收者设置判定是否发送，被抑制时返回 Ok(0)。
    /// 标题与内容按优先级解析：调用方显式给出 > 激活模板渲染 > 内置默认文案。
    pub async fn create_notification(&self, input: CreateNotification) -> Result<u64> {
        let settings = self.ensure_settings(input.recipient_id).await;
        if !should_send(input.kind, settings.as_ref()) {
            debug!(
                "Notification suppressed by settings: recipient={} kind={}",
                input.recipient_id,
                input.kind.as_str()
            );
            return Ok(0);
        }

        let (title, content) = match (&input.title, &input.content) {
            (Some(title), Some(content)) => (title.clone(), content.clone()),
            _ => self.resolve_content(&input).await,
        };

        let result = sqlx::query(
            r#"INSERT INTO notifications
               (recipient_id, sender_id, type, title, content, related_id, related_type)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(input.recipient_id)
        .bind(input.sender_id)
        .bind(input.kind)
        .bind(&title)
        .bind(&content)
        .bind(input.related_id)
        .bind(input.related_type)
        .execute(self.db.pool())
        .await?;

        let id = result.last_insert_id();
        info!(
            "Notification created: id={} recipient={} kind={}",
            id,
            input.recipient_id,
            input.kind.as_str()
        );
        Ok(id)
    }

    /// 确保接收者存在一行设置。并发安全：INSERT IGNORE 后回读，
    /// 两个并发调用至多产生一行。读取失败时返回 None。
    async fn ensure_settings(&self, user_id: i64) -> Option<NotificationSettings> {
        let inserted = sqlx::query(
            "INSERT IGNORE INTO user_notification_settings (user_id) VALUES (?)",
        )
        .bind(user_id)
        .execute(self.db.pool())
        .await;

        if let Err(e) = inserted {
            warn!("Failed to ensure notification settings for user {}: {}", user_id, e);
        }

        match sqlx::query_as::<_, NotificationSettings>(
            "SELECT * FROM user_notification_settings WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await
        {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load notification settings for user {}: {}", user_id, e);
                None
            }
        }
    }

    /// 模板渲染失败或缺失时回退内置文案，内容生成不阻断通知创建
    async fn resolve_content(&self, input: &CreateNotification) -> (String, String) {
        let context = self.build_context(input).await;

        match self.find_template(input.kind).await {
            Ok(Some(template)) => (
                render_template(&template.title_template, &context),
                render_template(&template.content_template, &context),
            ),
            Ok(None) => default_content(input.kind.as_str()),
            Err(e) => {
                warn!("Template lookup failed for kind {}: {}", input.kind.as_str(), e);
                default_content(input.kind.as_str())
            }
        }
    }

    async fn find_template(&self, kind: NotificationType) -> Result<Option<NotificationTemplate>> {
        let template = sqlx::query_as::<_, NotificationTemplate>(
            r#"SELECT * FROM notification_templates
               WHERE type = ? AND language = ? AND is_active = TRUE
               LIMIT 1"#,
        )
        .bind(kind)
        .bind(&self.language)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(template)
    }

    /// 汇集模板占位符数据，单项查询失败时使用缺省值
    async fn build_context(&self, input: &CreateNotification) -> NotificationContext {
        let mut context = NotificationContext::default();

        let sender = sqlx::query("SELECT nickname, avatar_url FROM users WHERE id = ?")
            .bind(input.sender_id)
            .fetch_optional(self.db.pool())
            .await;
        match sender {
            Ok(Some(row)) => {
                context.sender_name = row
                    .try_get::<Option<String>, _>("nickname")
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| "未知用户".to_string());
                context.sender_avatar = row.try_get("avatar_url").ok().flatten();
            }
            _ => context.sender_name = "未知用户".to_string(),
        }

        match input.related_type {
            RelatedType::Post => {
                context.post_title = Some(self.lookup_post_title(input.related_id).await);
            }
            RelatedType::Comment => match self.lookup_comment(input.related_id).await {
                Some((comment_content, post_id)) => {
                    let preview = truncate_preview(&comment_content);
                    context.reply_content = Some(preview.clone());
                    context.comment_content = Some(preview);
                    if let Some(post_id) = post_id {
                        context.post_title = Some(self.lookup_post_title(post_id).await);
                    }
                }
                None => {
                    context.reply_content = Some("未知评论".to_string());
                    context.comment_content = Some("未知评论".to_string());
                }
            },
        }

        context
    }

    async fn lookup_post_title(&self, post_id: i64) -> String {
        sqlx::query("SELECT title FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(self.db.pool())
            .await
            .ok()
            .flatten()
            .and_then(|row| row.try_get::<String, _>("title").ok())
            .unwrap_or_else(|| "未知帖子".to_string())
    }

    async fn lookup_comment(&self, comment_id: i64) -> Option<(String, Option<i64>)> {
        let row = sqlx::query("SELECT content, post_id FROM comments WHERE id = ?")
            .bind(comment_id)
            .fetch_optional(self.db.pool())
            .await
            .ok()
            .flatten()?;
        let content = row.try_get::<String, _>("content").ok()?;
        let post_id = row.try_get::<i64, _>("post_id").ok();
        Some((content, post_id))
    }

    /// 分页查询通知列表，附带发送者信息与未读计数
    pub async fn list_notifications(
        &self,
        user_id: i64,
        query: &NotificationListQuery,
    ) -> Result<NotificationList> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(10).clamp(1, 50);
        let offset = (page - 1) * limit;

        let mut sql = String::from(
            r#"SELECT n.*, u.nickname AS sender_name, u.avatar_url AS sender_avatar
               FROM notifications n
               LEFT JOIN users u ON u.id = n.sender_id
               WHERE n.recipient_id = ?"#,
        );
        let mut count_sql =
            String::from("SELECT COUNT(*) FROM notifications WHERE recipient_id = ?");

        if query.kind.is_some() {
            sql.push_str(" AND n.type = ?");
            count_sql.push_str(" AND type = ?");
        }
        if query.is_read.is_some() {
            sql.push_str(" AND n.is_read = ?");
            count_sql.push_str(" AND is_read = ?");
        }
        sql.push_str(" ORDER BY n.created_at DESC LIMIT ? OFFSET ?");

        let mut rows_query = sqlx::query_as::<_, Notification>(&sql).bind(user_id);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(user_id);
        if let Some(kind) = query.kind {
            rows_query = rows_query.bind(kind);
            count_query = count_query.bind(kind);
        }
        if let Some(is_read) = query.is_read {
            rows_query = rows_query.bind(is_read);
            count_query = count_query.bind(is_read);
        }

        let notifications = rows_query
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(self.db.pool())
            .await?;
        let total = count_query.fetch_one(self.db.pool()).await?;
        let unread_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(NotificationList {
            notifications,
            total,
            unread_count,
            current_page: page,
            total_pages: ((total as u32) + limit - 1) / limit.max(1),
        })
    }

    pub async fn unread_count(&self, user_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await?;
        Ok(count)
    }

    /// 标记单条通知已读，只能操作属于自己的通知
    pub async fn mark_as_read(&self, notification_id: i64, user_id: i64) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE notifications SET is_read = TRUE, read_at = NOW()
               WHERE id = ? AND recipient_id = ? AND is_read = FALSE"#,
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM notifications WHERE id = ? AND recipient_id = ?",
            )
            .bind(notification_id)
            .bind(user_id)
            .fetch_one(self.db.pool())
            .await?;
            if exists == 0 {
                return Err(AppError::not_found("通知"));
            }
        }
        Ok(())
    }

    pub async fn mark_all_as_read(&self, user_id: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"UPDATE notifications SET is_read = TRUE, read_at = NOW()
               WHERE recipient_id = ? AND is_read = FALSE"#,
        )
        .bind(user_id)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_notification(&self, notification_id: i64, user_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND recipient_id = ?")
            .bind(notification_id)
            .bind(user_id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("通知"));
        }
        Ok(())
    }

    pub async fn get_settings(&self, user_id: i64) -> Result<NotificationSettings> {
        self.ensure_settings(user_id)
            .await
            .ok_or_else(|| AppError::Internal("Failed to load notification settings".to_string()))
    }

    /// 更新通知设置，仅覆盖请求中出现的字段
    pub async fn update_settings(
        &self,
        user_id: i64,
        request: &UpdateNotificationSettingsRequest,
    ) -> Result<NotificationSettings> {
        let current = self.get_settings(user_id).await?;

        let quiet_hours_start = match &request.quiet_hours_start {
            Some(value) => Some(parse_time(value)?),
            None => current.quiet_hours_start,
        };
        let quiet_hours_end = match &request.quiet_hours_end {
            Some(value) => Some(parse_time(value)?),
            None => current.quiet_hours_end,
        };

        sqlx::query(
            r#"UPDATE user_notification_settings SET
                 post_like_enabled = ?,
                 post_comment_enabled = ?,
                 comment_reply_enabled = ?,
                 push_enabled = ?,
                 email_enabled = ?,
                 quiet_hours_start = ?,
                 quiet_hours_end = ?
               WHERE user_id = ?"#,
        )
        .bind(request.post_like_enabled.unwrap_or(current.post_like_enabled))
        .bind(request.post_comment_enabled.unwrap_or(current.post_comment_enabled))
        .bind(request.comment_reply_enabled.unwrap_or(current.comment_reply_enabled))
        .bind(request.push_enabled.unwrap_or(current.push_enabled))
        .bind(request.email_enabled.unwrap_or(current.email_enabled))
        .bind(quiet_hours_start)
        .bind(quiet_hours_end)
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        self.get_settings(user_id).await
    }
}

/// 按接收者设置判定某类通知是否发送。设置缺失或读取失败时默认发送。
pub fn should_send(kind: NotificationType, settings: Option<&NotificationSettings>) -> bool {
    match settings {
        Some(s) => match kind {
            NotificationType::PostLike => s.post_like_enabled,
            NotificationType::PostComment => s.post_comment_enabled,
            NotificationType::CommentReply => s.comment_reply_enabled,
        },
        None => true,
    }
}

/// 替换模板中的 {key} 占位符。仅替换上下文中取值非空的键，
/// 未匹配的占位符保留原样。
pub fn render_template(template: &str, context: &NotificationContext) -> String {
    let mut rendered = template.to_string();
    for (key, value) in context.entries() {
        if let Some(value) = value {
            if !value.is_empty() {
                rendered = rendered.replace(&format!("{{{}}}", key), value);
            }
        }
    }
    rendered
}

/// 内置默认文案，模板缺失时使用。未知类型给出通用文案。
pub fn default_content(kind: &str) -> (String, String) {
    let (title, content) = match kind {
        "post_like" => ("你的帖子收到了点赞", "有用户点赞了你的帖子"),
        "post_comment" => ("你的帖子收到了评论", "有用户评论了你的帖子"),
        "comment_reply" => ("你的评论收到了回复", "有用户回复了你的评论"),
        _ => ("新通知", "你有一条新通知"),
    };
    (title.to_string(), content.to_string())
}

/// 截取预览：超过50个字符时截断并追加省略号
fn truncate_preview(content: &str) -> String {
    let mut chars = content.chars();
    let preview: String = chars.by_ref().take(PREVIEW_LEN).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| AppError::bad_request("时间格式无效，应为 HH:MM 或 HH:MM:SS"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> NotificationContext {
        NotificationContext {
            sender_name: "小李".to_string(),
            sender_avatar: None,
            post_title: Some("周末羽毛球约战".to_string()),
            comment_content: Some("这个场地不错".to_string()),
            reply_content: None,
        }
    }

    #[test]
    fn test_render_template_substitutes_known_keys() {
        let rendered = render_template("{sender_name} 评论了《{post_title}》", &context());
        assert_eq!(rendered, "小李 评论了《周末羽毛球约战》");
    }

    #[test]
    fn test_render_template_leaves_unknown_placeholder() {
        let rendered = render_template("{sender_name}: {unknown_key}", &context());
        assert_eq!(rendered, "小李: {unknown_key}");
    }

    #[test]
    fn test_render_template_skips_empty_values() {
        let mut ctx = context();
        ctx.post_title = Some(String::new());
        let rendered = render_template("{post_title}", &ctx);
        assert_eq!(rendered, "{post_title}");
    }

    #[test]
    fn test_render_template_without_placeholders_is_identity() {
        let rendered = render_template("固定文案，无占位符", &context());
        assert_eq!(rendered, "固定文案，无占位符");
    }

    #[test]
    fn test_default_content_per_kind() {
        assert_eq!(
            default_content("post_like"),
            ("你的帖子收到了点赞".to_string(), "有用户点赞了你的帖子".to_string())
        );
        assert_eq!(
            default_content("post_comment"),
            ("你的帖子收到了评论".to_string(), "有用户评论了你的帖子".to_string())
        );
        assert_eq!(
            default_content("comment_reply"),
            ("你的评论收到了回复".to_string(), "有用户回复了你的评论".to_string())
        );
    }

    #[test]
    fn test_default_content_unknown_kind_is_generic() {
        assert_eq!(
            default_content("system_announcement"),
            ("新通知".to_string(), "你有一条新通知".to_string())
        );
    }

    #[test]
    fn test_truncate_preview_short_content_unchanged() {
        assert_eq!(truncate_preview("短评论"), "短评论");
    }

    #[test]
    fn test_truncate_preview_long_content() {
        let long = "好".repeat(60);
        let preview = truncate_preview(&long);
        assert_eq!(preview.chars().count(), PREVIEW_LEN + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_truncate_preview_exact_boundary() {
        let exact = "a".repeat(PREVIEW_LEN);
        assert_eq!(truncate_preview(&exact), exact);
    }

    fn settings(post_like: bool, post_comment: bool, comment_reply: bool) -> NotificationSettings {
        use chrono::Utc;
        NotificationSettings {
            id: 1,
            user_id: 1,
            post_like_enabled: post_like,
            post_comment_enabled: post_comment,
            comment_reply_enabled: comment_reply,
            push_enabled: true,
            email_enabled: false,
            quiet_hours_start: None,
            quiet_hours_end: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_should_send_respects_per_kind_flags() {
        let s = settings(false, true, true);
        assert!(!should_send(NotificationType::PostLike, Some(&s)));
        assert!(should_send(NotificationType::PostComment, Some(&s)));
        assert!(should_send(NotificationType::CommentReply, Some(&s)));
    }

    #[test]
    fn test_should_send_defaults_to_true_without_settings() {
        assert!(should_send(NotificationType::PostLike, None));
        assert!(should_send(NotificationType::CommentReply, None));
    }

    #[test]
    fn test_parse_time_formats() {
        assert!(parse_time("22:00").is_ok());
        assert!(parse_time("22:00:30").is_ok());
        assert!(parse_time("晚上十点").is_err());
    }
}
