use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// 通知事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NotificationType {
    PostLike,
    PostComment,
    CommentReply,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostLike => "post_like",
            Self::PostComment => "post_comment",
            Self::CommentReply => "comment_reply",
        }
    }

}

/// 通知关联实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RelatedType {
    Post,
    Comment,
}

/// notifications 表行，列表查询时附带发送者信息
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    pub sender_id: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub content: String,
    pub related_id: i64,
    pub related_type: RelatedType,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub sender_name: Option<String>,
    #[sqlx(default)]
    pub sender_avatar: Option<String>,
}

/// user_notification_settings 表行，一个用户至多一行
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationSettings {
    pub id: i64,
    pub user_id: i64,
    pub post_like_enabled: bool,
    pub post_comment_enabled: bool,
    pub comment_reply_enabled: bool,
    pub push_enabled: bool,
    pub email_enabled: bool,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// notification_templates 表行
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationTemplate {
    pub id: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: NotificationType,
    pub language: String,
    pub title_template: String,
    pub content_template: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 创建通知的输入
#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub recipient_id: i64,
    pub sender_id: i64,
    pub kind: NotificationType,
    pub related_id: i64,
    pub related_type: RelatedType,
    pub title: Option<String>,
    pub content: Option<String>,
}

/// 模板渲染上下文
#[derive(Debug, Clone, Default)]
pub struct NotificationContext {
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    pub post_title: Option<String>,
    pub comment_content: Option<String>,
    pub reply_content: Option<String>,
}

impl NotificationContext {
    /// 模板占位符键及对应取值
    pub fn entries(&self) -> [(&'static str, Option<&str>); 5] {
        [
            ("sender_name", Some(self.sender_name.as_str())),
            ("sender_avatar", self.sender_avatar.as_deref()),
            ("post_title", self.post_title.as_deref()),
            ("comment_content", self.comment_content.as_deref()),
            ("reply_content", self.reply_content.as_deref()),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(rename = "type")]
    pub kind: Option<NotificationType>,
    pub is_read: Option<bool>,
}

/// 通知列表响应
#[derive(Debug, Clone, Serialize)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub total: i64,
    pub unread_count: i64,
    pub current_page: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateNotificationSettingsRequest {
    pub post_like_enabled: Option<bool>,
    pub post_comment_enabled: Option<bool>,
    pub comment_reply_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub email_enabled: Option<bool>,
    pub quiet_hours_start: Option<String>,
    pub quiet_hours_end: Option<String>,
}
