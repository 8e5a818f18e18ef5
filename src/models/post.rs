use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::comment::CommentNode;

/// 帖子坐标，x 为经度、y 为纬度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

impl Coordinates {
    /// 转为 MySQL 空间函数可用的 WKT 表示
    pub fn to_wkt(&self) -> String {
        format!("POINT({} {})", self.x, self.y)
    }
}

/// 帖子查询行：posts 与作者信息的联结结果，坐标已展开为经纬度
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostRow {
    pub id: i64,
    pub user_id: i64,
    pub category_id: Option<i64>,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub location: Option<String>,
    pub x: f64,
    pub y: f64,
    pub is_approved: bool,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author_name: Option<String>,
    pub author_avatar: Option<String>,
}

/// post_images 表行
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostImage {
    pub id: i64,
    pub post_id: i64,
    pub image_url: String,
    pub sequence_number: i32,
    pub created_at: DateTime<Utc>,
}

/// 帖子作者展示信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostAuthor {
    pub id: i64,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
}

/// 列表接口返回的帖子
#[derive(Debug, Clone, Serialize)]
pub struct PostListItem {
    pub id: i64,
    pub user_id: i64,
    pub category_id: Option<i64>,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: Option<String>,
    pub coordinates: Coordinates,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
    pub user: PostAuthor,
    pub images: Vec<PostImage>,
}

/// 详情接口返回的帖子，附图片与评论树
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub id: i64,
    pub user_id: i64,
    pub category_id: Option<i64>,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: Option<String>,
    pub coordinates: Coordinates,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: PostAuthor,
    pub images: Vec<PostImage>,
    pub comments: Vec<CommentNode>,
    pub is_liked: bool,
}

impl PostRow {
    pub fn into_list_item(self, images: Vec<PostImage>) -> PostListItem {
        PostListItem {
            id: self.id,
            user_id: self.user_id,
            category_id: self.category_id,
            title: self.title,
            content: self.content,
            kind: self.kind,
            location: self.location,
            coordinates: Coordinates { x: self.x, y: self.y },
            likes_count: self.likes_count,
            comments_count: self.comments_count,
            created_at: self.created_at,
            user: PostAuthor {
                id: self.user_id,
                nickname: self.author_name,
                avatar_url: self.author_avatar,
            },
            images,
        }
    }

    pub fn into_detail(
        self,
        images: Vec<PostImage>,
        comments: Vec<CommentNode>,
        is_liked: bool,
    ) -> PostDetail {
        PostDetail {
            id: self.id,
            user_id: self.user_id,
            category_id: self.category_id,
            title: self.title,
            content: self.content,
            kind: self.kind,
            location: self.location,
            coordinates: Coordinates { x: self.x, y: self.y },
            likes_count: self.likes_count,
            comments_count: self.comments_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
            user: PostAuthor {
                id: self.user_id,
                nickname: self.author_name,
                avatar_url: self.author_avatar,
            },
            images,
            comments,
            is_liked,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 100, message = "标题长度必须在1-100个字符之间"))]
    pub title: String,
    #[validate(length(min = 1, max = 10000, message = "内容长度必须在1-10000个字符之间"))]
    pub content: String,
    pub category_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub location: Option<String>,
    pub coordinates: Coordinates,
    /// 已上传图片的 URL，按展示顺序
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(min = 1, max = 100, message = "标题长度必须在1-100个字符之间"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 10000, message = "内容长度必须在1-10000个字符之间"))]
    pub content: Option<String>,
    pub category_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub location: Option<String>,
    pub coordinates: Option<Coordinates>,
    /// 提供时整体替换帖子图片
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_self: Option<bool>,
}
