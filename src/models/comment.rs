use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 评论查询行：comments 与作者信息的联结结果
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
    pub parent_id: Option<i64>,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
    pub author_name: Option<String>,
    pub author_avatar: Option<String>,
}

/// 评论作者展示信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub id: i64,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
}

/// 嵌套评论节点：回复挂在各自父节点下，深度不设上限
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentNode {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
    pub user: CommentAuthor,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    pub fn from_row(row: CommentRow, replies: Vec<CommentNode>) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            user_id: row.user_id,
            content: row.content,
            likes_count: row.likes_count,
            created_at: row.created_at,
            user: CommentAuthor {
                id: row.user_id,
                nickname: row.author_name,
                avatar_url: row.author_avatar,
            },
            replies,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 1000, message = "评论内容长度必须在1-1000个字符之间"))]
    pub content: String,
    pub parent_id: Option<i64>,
}
