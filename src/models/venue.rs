use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 场地查询行：venues 与创建者信息的联结结果
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Venue {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub category_id: Option<i64>,
    pub longitude: f64,
    pub latitude: f64,
    pub is_free: bool,
    pub price_description: Option<String>,
    pub crowd_level: Option<String>,
    pub user_id: i64,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub creator_name: Option<String>,
    #[sqlx(default)]
    pub creator_avatar: Option<String>,
    /// 附近查询时返回的距离（米）
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

/// venue_images 表行
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VenueImage {
    pub id: i64,
    pub venue_id: i64,
    pub image_url: String,
    pub sequence_number: i32,
    pub created_at: DateTime<Utc>,
}

/// venue_opening_hours 表行
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VenueOpeningHours {
    pub id: i64,
    pub venue_id: i64,
    pub day_of_week: i32,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateVenueRequest {
    #[validate(length(min = 1, max = 100, message = "场地名称长度必须在1-100个字符之间"))]
    pub name: String,
    #[validate(length(min = 1, max = 200, message = "地址长度必须在1-200个字符之间"))]
    pub address: String,
    pub category_id: Option<i64>,
    #[validate(range(min = -180.0, max = 180.0, message = "经度必须在-180到180之间"))]
    pub longitude: f64,
    #[validate(range(min = -90.0, max = 90.0, message = "纬度必须在-90到90之间"))]
    pub latitude: f64,
    pub is_free: bool,
    pub price_description: Option<String>,
    pub crowd_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateVenueRequest {
    #[validate(length(min = 1, max = 100, message = "场地名称长度必须在1-100个字符之间"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 200, message = "地址长度必须在1-200个字符之间"))]
    pub address: Option<String>,
    pub category_id: Option<i64>,
    #[validate(range(min = -180.0, max = 180.0, message = "经度必须在-180到180之间"))]
    pub longitude: Option<f64>,
    #[validate(range(min = -90.0, max = 90.0, message = "纬度必须在-90到90之间"))]
    pub latitude: Option<f64>,
    pub is_free: Option<bool>,
    pub price_description: Option<String>,
    pub crowd_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category_id: Option<i64>,
    pub is_free: Option<bool>,
    pub crowd_level: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// 距离（公里）
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NearbyQuery {
    pub latitude: f64,
    pub longitude: f64,
    /// 距离（公里），默认5
    pub distance: Option<f64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category_id: Option<i64>,
}

/// 营业时间输入，时间格式 "HH:MM" 或 "HH:MM:SS"
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OpeningHourInput {
    #[validate(range(min = 0, max = 6, message = "星期必须在0-6之间"))]
    pub day_of_week: i32,
    pub open_time: String,
    pub close_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOpeningHoursRequest {
    pub opening_hours: Vec<OpeningHourInput>,
}
