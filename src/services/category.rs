use crate::{
    error::{AppError, Result},
    models::category::{Category, CreateCategoryRequest, UpdateCategoryRequest},
    services::database::Database,
};
use std::sync::Arc;
use tracing::info;

/// 运动类别服务：类别维护与用户关注关系
#[derive(Clone)]
pub struct CategoryService {
    db: Arc<Database>,
}

impl CategoryService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let categories =
            sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY id ASC")
                .fetch_all(self.db.pool())
                .await?;
        Ok(categories)
    }

    pub async fn get_category(&self, category_id: i64) -> Result<Category> {
        sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
            .bind(category_id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| AppError::not_found("类别"))
    }

    pub async fn create_category(&self, request: &CreateCategoryRequest) -> Result<Category> {
        let existing =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories WHERE name = ?")
                .bind(&request.name)
                .fetch_one(self.db.pool())
                .await?;
        if existing > 0 {
            return Err(AppError::conflict("类别名称已存在"));
        }

        let result = sqlx::query(
            "INSERT INTO categories (name, description, icon_url) VALUES (?, ?, ?)",
        )
        .bind(&request.name)
        .bind(&request.description)
        .bind(&request.icon_url)
        .execute(self.db.pool())
        .await?;

        let id = result.last_insert_id() as i64;
        info!("Category created: id={} name={}", id, request.name);
        self.get_category(id).await
    }

    pub async fn update_category(
        &self,
        category_id: i64,
        request: &UpdateCategoryRequest,
    ) -> Result<Category> {
        let current = self.get_category(category_id).await?;

        sqlx::query("UPDATE categories SET name = ?, description = ?, icon_url = ? WHERE id = ?")
            .bind(request.name.clone().unwrap_or(current.name))
            .bind(request.description.clone().or(current.description))
            .bind(request.icon_url.clone().or(current.icon_url))
            .bind(category_id)
            .execute(self.db.pool())
            .await?;

        self.get_category(category_id).await
    }

    pub async fn delete_category(&self, category_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(category_id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("类别"));
        }
        info!("Category deleted: id={}", category_id);
        Ok(())
    }

    /// 关注类别，重复关注返回冲突
    pub async fn follow_category(&self, category_id: i64, user_id: i64) -> Result<()> {
        self.get_category(category_id).await?;

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user_categories WHERE user_id = ? AND category_id = ?",
        )
        .bind(user_id)
        .bind(category_id)
        .fetch_one(self.db.pool())
        .await?;
        if existing > 0 {
            return Err(AppError::conflict("已关注该类别"));
        }

        sqlx::query("INSERT INTO user_categories (user_id, category_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(category_id)
            .execute(self.db.pool())
            .await?;

        info!("User {} followed category {}", user_id, category_id);
        Ok(())
    }

    pub async fn unfollow_category(&self, category_id: i64, user_id: i64) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM user_categories WHERE user_id = ? AND category_id = ?",
        )
        .bind(user_id)
        .bind(category_id)
        .execute(self.db.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("关注记录"));
        }
        info!("User {} unfollowed category {}", user_id, category_id);
        Ok(())
    }

    /// 用户关注的类别列表
    pub async fn list_followed(&self, user_id: i64) -> Result<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            r#"SELECT c.* FROM categories c
               INNER JOIN user_categories uc ON uc.category_id = c.id
               WHERE uc.user_id = ?
               ORDER BY uc.created_at ASC"#,
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(categories)
    }
}
