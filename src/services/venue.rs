use crate::{
    error::{AppError, Result},
    models::venue::{
        CreateVenueRequest, NearbyQuery, UpdateOpeningHoursRequest, UpdateVenueRequest, Venue,
        VenueImage, VenueListQuery, VenueOpeningHours,
    },
    services::database::Database,
};
use chrono::NaiveTime;
use std::sync::Arc;
use tracing::info;

const DEFAULT_NEARBY_DISTANCE_KM: f64 = 5.0;

/// 场地服务：场地维护、图片、营业时间与附近检索
#[derive(Clone)]
pub struct VenueService {
    db: Arc<Database>,
    default_page_size: u32,
}

impl VenueService {
    pub fn new(db: Arc<Database>, default_page_size: u32) -> Self {
        Self { db, default_page_size }
    }

    pub async fn create_venue(&self, user_id: i64, request: &CreateVenueRequest) -> Result<i64> {
        let result = sqlx::query(
            r#"INSERT INTO venues
               (name, address, category_id, coordinates, is_free, price_description, crowd_level, user_id)
               VALUES (?, ?, ?, ST_GeomFromText(?), ?, ?, ?, ?)"#,
        )
        .bind(&request.name)
        .bind(&request.address)
        .bind(request.category_id)
        .bind(format!("POINT({} {})", request.longitude, request.latitude))
        .bind(request.is_free)
        .bind(&request.price_description)
        .bind(&request.crowd_level)
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        let venue_id = result.last_insert_id() as i64;
        info!("Venue created: id={} user={}", venue_id, user_id);
        Ok(venue_id)
    }

    pub async fn get_venue(&self, venue_id: i64) -> Result<Venue> {
        sqlx::query_as::<_, Venue>(
            r#"SELECT v.id, v.name, v.address, v.category_id,
                      ST_X(v.coordinates) AS longitude, ST_Y(v.coordinates) AS latitude,
                      v.is_free, v.price_description, v.crowd_level, v.user_id,
                      v.is_approved, v.created_at, v.updated_at,
                      u.nickname AS creator_name, u.avatar_url AS creator_avatar
               FROM venues v
               LEFT JOIN users u ON u.id = v.user_id
               WHERE v.id = ?"#,
        )
        .bind(venue_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| AppError::not_found("场地"))
    }

    /// 对外可见的场地：未审核的场地与不存在等同。
    /// 创建者的修改、删除走不过滤的 get_venue。
    pub async fn get_visible_venue(&self, venue_id: i64) -> Result<Venue> {
        let venue = self.get_venue(venue_id).await?;
        ensure_visible(&venue)?;
        Ok(venue)
    }

    /// 分页场地列表。带经纬度时附带球面距离并按距离升序，
    /// 否则按创建时间倒序。
    pub async fn list_venues(&self, query: &VenueListQuery) -> Result<(Vec<Venue>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(self.default_page_size).clamp(1, 50);
        let offset = (page - 1) * limit;
        let with_location = query.latitude.is_some() && query.longitude.is_some();

        let mut sql = String::from(
            r#"SELECT v.id, v.name, v.address, v.category_id,
                      ST_X(v.coordinates) AS longitude, ST_Y(v.coordinates) AS latitude,
                      v.is_free, v.price_description, v.crowd_level, v.user_id,
                      v.is_approved, v.created_at, v.updated_at,
                      u.nickname AS creator_name, u.avatar_url AS creator_avatar"#,
        );
        if with_location {
            sql.push_str(
                ", ST_Distance_Sphere(v.coordinates, ST_GeomFromText(?)) AS distance",
            );
        }
        sql.push_str(
            r#" FROM venues v
               LEFT JOIN users u ON u.id = v.user_id
               WHERE v.is_approved = TRUE"#,
        );
        let mut count_sql =
            String::from("SELECT COUNT(*) FROM venues v WHERE v.is_approved = TRUE");

        if query.category_id.is_some() {
            sql.push_str(" AND v.category_id = ?");
            count_sql.push_str(" AND v.category_id = ?");
        }
        if query.is_free.is_some() {
            sql.push_str(" AND v.is_free = ?");
            count_sql.push_str(" AND v.is_free = ?");
        }
        if query.crowd_level.is_some() {
            sql.push_str(" AND v.crowd_level = ?");
            count_sql.push_str(" AND v.crowd_level = ?");
        }
        if with_location && query.distance.is_some() {
            sql.push_str(
                " AND ST_Distance_Sphere(v.coordinates, ST_GeomFromText(?)) <= ?",
            );
            count_sql.push_str(
                " AND ST_Distance_Sphere(v.coordinates, ST_GeomFromText(?)) <= ?",
            );
        }
        if with_location {
            sql.push_str(" ORDER BY distance ASC");
        } else {
            sql.push_str(" ORDER BY v.created_at DESC");
        }
        sql.push_str(" LIMIT ? OFFSET ?");

        let point = format!(
            "POINT({} {})",
            query.longitude.unwrap_or_default(),
            query.latitude.unwrap_or_default()
        );
        let distance_meters = query.distance.unwrap_or_default() * 1000.0;

        let mut rows_query = sqlx::query_as::<_, Venue>(&sql);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if with_location {
            rows_query = rows_query.bind(point.clone());
        }
        if let Some(category_id) = query.category_id {
            rows_query = rows_query.bind(category_id);
            count_query = count_query.bind(category_id);
        }
        if let Some(is_free) = query.is_free {
            rows_query = rows_query.bind(is_free);
            count_query = count_query.bind(is_free);
        }
        if let Some(crowd_level) = &query.crowd_level {
            rows_query = rows_query.bind(crowd_level);
            count_query = count_query.bind(crowd_level);
        }
        if with_location && query.distance.is_some() {
            rows_query = rows_query.bind(point.clone()).bind(distance_meters);
            count_query = count_query.bind(point).bind(distance_meters);
        }

        let venues = rows_query
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(self.db.pool())
            .await?;
        let total = count_query.fetch_one(self.db.pool()).await?;
        Ok((venues, total))
    }

    /// 附近场地：按球面距离升序，默认半径5公里
    pub async fn nearby_venues(&self, query: &NearbyQuery) -> Result<Vec<Venue>> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(self.default_page_size).clamp(1, 50);
        let offset = (page - 1) * limit;
        let distance_meters = query.distance.unwrap_or(DEFAULT_NEARBY_DISTANCE_KM) * 1000.0;
        let point = format!("POINT({} {})", query.longitude, query.latitude);

        let mut sql = String::from(
            r#"SELECT v.id, v.name, v.address, v.category_id,
                      ST_X(v.coordinates) AS longitude, ST_Y(v.coordinates) AS latitude,
                      v.is_free, v.price_description, v.crowd_level, v.user_id,
                      v.is_approved, v.created_at, v.updated_at,
                      u.nickname AS creator_name, u.avatar_url AS creator_avatar,
                      ST_Distance_Sphere(v.coordinates, ST_GeomFromText(?)) AS distance
               FROM venues v
               LEFT JOIN users u ON u.id = v.user_id
               WHERE v.is_approved = TRUE
                 AND ST_Distance_Sphere(v.coordinates, ST_GeomFromText(?)) <= ?"#,
        );
        if query.category_id.is_some() {
            sql.push_str(" AND v.category_id = ?");
        }
        sql.push_str(" ORDER BY distance ASC LIMIT ? OFFSET ?");

        let mut rows_query = sqlx::query_as::<_, Venue>(&sql)
            .bind(point.clone())
            .bind(point)
            .bind(distance_meters);
        if let Some(category_id) = query.category_id {
            rows_query = rows_query.bind(category_id);
        }
        let venues = rows_query
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(self.db.pool())
            .await?;
        Ok(venues)
    }

    /// 更新场地，仅创建者可改
    pub async fn update_venue(
        &self,
        venue_id: i64,
        user_id: i64,
        request: &UpdateVenueRequest,
    ) -> Result<()> {
        let current = self.get_venue(venue_id).await?;
        if current.user_id != user_id {
            return Err(AppError::forbidden("只能修改自己创建的场地"));
        }

        let longitude = request.longitude.unwrap_or(current.longitude);
        let latitude = request.latitude.unwrap_or(current.latitude);

        sqlx::query(
            r#"UPDATE venues SET name = ?, address = ?, category_id = ?,
                      coordinates = ST_GeomFromText(?), is_free = ?,
                      price_description = ?, crowd_level = ?
               WHERE id = ?"#,
        )
        .bind(request.name.clone().unwrap_or(current.name))
        .bind(request.address.clone().unwrap_or(current.address))
        .bind(request.category_id.or(current.category_id))
        .bind(format!("POINT({} {})", longitude, latitude))
        .bind(request.is_free.unwrap_or(current.is_free))
        .bind(request.price_description.clone().or(current.price_description))
        .bind(request.crowd_level.clone().or(current.crowd_level))
        .bind(venue_id)
        .execute(self.db.pool())
        .await?;

        info!("Venue updated: id={} user={}", venue_id, user_id);
        Ok(())
    }

    /// 删除场地及附属数据，返回图片 URL 供调用方清理文件
    pub async fn delete_venue(&self, venue_id: i64, user_id: i64) -> Result<Vec<String>> {
        let current = self.get_venue(venue_id).await?;
        if current.user_id != user_id {
            return Err(AppError::forbidden("只能删除自己创建的场地"));
        }

        let image_urls: Vec<String> = self
            .get_images(venue_id)
            .await?
            .into_iter()
            .map(|image| image.image_url)
            .collect();

        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM venue_images WHERE venue_id = ?")
            .bind(venue_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM venue_opening_hours WHERE venue_id = ?")
            .bind(venue_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM venues WHERE id = ?")
            .bind(venue_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Venue deleted: id={} user={}", venue_id, user_id);
        Ok(image_urls)
    }

    pub async fn get_images(&self, venue_id: i64) -> Result<Vec<VenueImage>> {
        let images = sqlx::query_as::<_, VenueImage>(
            "SELECT * FROM venue_images WHERE venue_id = ? ORDER BY sequence_number ASC",
        )
        .bind(venue_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(images)
    }

    pub async fn add_images(&self, venue_id: i64, user_id: i64, image_urls: &[String]) -> Result<()> {
        let current = self.get_venue(venue_id).await?;
        if current.user_id != user_id {
            return Err(AppError::forbidden("只能管理自己创建的场地"));
        }

        let next_sequence = sqlx::query_scalar::<_, Option<i32>>(
            "SELECT MAX(sequence_number) FROM venue_images WHERE venue_id = ?",
        )
        .bind(venue_id)
        .fetch_one(self.db.pool())
        .await?
        .map(|max| max + 1)
        .unwrap_or(0);

        let mut tx = self.db.pool().begin().await?;
        for (index, image_url) in image_urls.iter().enumerate() {
            sqlx::query(
                "INSERT INTO venue_images (venue_id, image_url, sequence_number) VALUES (?, ?, ?)",
            )
            .bind(venue_id)
            .bind(image_url)
            .bind(next_sequence + index as i32)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_opening_hours(&self, venue_id: i64) -> Result<Vec<VenueOpeningHours>> {
        let hours = sqlx::query_as::<_, VenueOpeningHours>(
            "SELECT * FROM venue_opening_hours WHERE venue_id = ? ORDER BY day_of_week ASC, open_time ASC",
        )
        .bind(venue_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(hours)
    }

    /// 整体替换营业时间，仅创建者可改
    pub async fn update_opening_hours(
        &self,
        venue_id: i64,
        user_id: i64,
        request: &UpdateOpeningHoursRequest,
    ) -> Result<Vec<VenueOpeningHours>> {
        let current = self.get_venue(venue_id).await?;
        if current.user_id != user_id {
            return Err(AppError::forbidden("只能管理自己创建的场地"));
        }

        let mut parsed = Vec::with_capacity(request.opening_hours.len());
        for entry in &request.opening_hours {
            let open_time = parse_time(&entry.open_time)?;
            let close_time = parse_time(&entry.close_time)?;
            if close_time <= open_time {
                return Err(AppError::bad_request("结束时间必须晚于开始时间"));
            }
            parsed.push((entry.day_of_week, open_time, close_time));
        }

        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM venue_opening_hours WHERE venue_id = ?")
            .bind(venue_id)
            .execute(&mut *tx)
            .await?;
        for (day_of_week, open_time, close_time) in parsed {
            sqlx::query(
                "INSERT INTO venue_opening_hours (venue_id, day_of_week, open_time, close_time) VALUES (?, ?, ?, ?)",
            )
            .bind(venue_id)
            .bind(day_of_week)
            .bind(open_time)
            .bind(close_time)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.get_opening_hours(venue_id).await
    }
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| AppError::bad_request("时间格式无效，应为 HH:MM 或 HH:MM:SS"))
}

/// 未审核的场地对外等同于不存在
fn ensure_visible(venue: &Venue) -> Result<()> {
    if venue.is_approved {
        Ok(())
    } else {
        Err(AppError::not_found("场地"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn venue(is_approved: bool) -> Venue {
        Venue {
            id: 1,
            name: "篮球馆".to_string(),
            address: "体育路1号".to_string(),
            category_id: None,
            longitude: 121.47,
            latitude: 31.23,
            is_free: true,
            price_description: None,
            crowd_level: None,
            user_id: 10,
            is_approved,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            creator_name: None,
            creator_avatar: None,
            distance: None,
        }
    }

    #[test]
    fn test_unapproved_venue_treated_as_missing() {
        assert!(ensure_visible(&venue(true)).is_ok());
        assert!(matches!(
            ensure_visible(&venue(false)),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_time_accepts_both_formats() {
        assert_eq!(
            parse_time("08:30").unwrap(),
            NaiveTime::from_hms_opt(8, 30, 0).unwrap()
        );
        assert_eq!(
            parse_time("21:00:30").unwrap(),
            NaiveTime::from_hms_opt(21, 0, 30).unwrap()
        );
        assert!(parse_time("25:00").is_err());
        assert!(parse_time("上午八点").is_err());
    }
}
