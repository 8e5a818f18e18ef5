use crate::{
    error::{AppError, Result},
    models::{
        comment::{CommentNode, CommentRow, CreateCommentRequest},
        notification::{CreateNotification, NotificationType, RelatedType},
    },
    services::{database::Database, notification::NotificationService},
};
use sqlx::Row;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 评论服务：评论的增删、点赞与嵌套树的组装
#[derive(Clone)]
pub struct CommentService {
    db: Arc<Database>,
    notification_service: Arc<NotificationService>,
    drop_orphan_comments: bool,
}

impl CommentService {
    pub fn new(
        db: Arc<Database>,
        notification_service: Arc<NotificationService>,
        drop_orphan_comments: bool,
    ) -> Self {
        Self {
            db,
            notification_service,
            drop_orphan_comments,
        }
    }

    /// 查询帖子的全部评论并组装为嵌套树
    pub async fn get_comments_for_post(&self, post_id: i64) -> Result<Vec<CommentNode>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"SELECT c.id, c.post_id, c.user_id, c.content, c.parent_id,
                      c.likes_count, c.created_at,
                      u.nickname AS author_name, u.avatar_url AS author_avatar
               FROM comments c
               LEFT JOIN users u ON u.id = c.user_id
               WHERE c.post_id = ?
               ORDER BY c.created_at ASC"#,
        )
        .bind(post_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(build_comment_tree(rows, self.drop_orphan_comments))
    }

    /// 单条评论，联结作者信息
    pub async fn get_comment(&self, comment_id: i64) -> Result<CommentRow> {
        sqlx::query_as::<_, CommentRow>(
            r#"SELECT c.id, c.post_id, c.user_id, c.content, c.parent_id,
                      c.likes_count, c.created_at,
                      u.nickname AS author_name, u.avatar_url AS author_avatar
               FROM comments c
               LEFT JOIN users u ON u.id = c.user_id
               WHERE c.id = ?"#,
        )
        .bind(comment_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| AppError::not_found("评论"))
    }

    /// 发表评论或回复。评论插入与帖子计数更新在同一事务中；
    /// 通知发送是尽力而为，失败不回滚评论。
    pub async fn add_comment(
        &self,
        post_id: i64,
        user_id: i64,
        request: &CreateCommentRequest,
    ) -> Result<i64> {
        let post = sqlx::query("SELECT id, user_id, is_approved FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| AppError::not_found("帖子"))?;
        // 未审核的帖子对外等同于不存在，不接受评论
        if !post.try_get::<bool, _>("is_approved")? {
            return Err(AppError::not_found("帖子"));
        }
        let post_author_id: i64 = post.try_get("user_id")?;

        // 回复时父评论必须存在且属于同一帖子
        let parent_author_id = match request.parent_id {
            Some(parent_id) => {
                let parent = sqlx::query("SELECT user_id, post_id FROM comments WHERE id = ?")
                    .bind(parent_id)
                    .fetch_optional(self.db.pool())
                    .await?
                    .ok_or_else(|| AppError::not_found("父评论"))?;
                let parent_post_id: i64 = parent.try_get("post_id")?;
                if parent_post_id != post_id {
                    return Err(AppError::bad_request("父评论不属于该帖子"));
                }
                Some(parent.try_get::<i64, _>("user_id")?)
            }
            None => None,
        };

        let mut tx = self.db.pool().begin().await?;
        let result = sqlx::query(
            "INSERT INTO comments (post_id, user_id, content, parent_id) VALUES (?, ?, ?, ?)",
        )
        .bind(post_id)
        .bind(user_id)
        .bind(&request.content)
        .bind(request.parent_id)
        .execute(&mut *tx)
        .await?;
        let comment_id = result.last_insert_id() as i64;

        sqlx::query("UPDATE posts SET comments_count = comments_count + 1 WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Comment created: id={} post={} user={}", comment_id, post_id, user_id);

        // 回复通知父评论作者，顶层评论通知帖子作者，不给自己发
        let (recipient_id, kind, related_id, related_type) = match (request.parent_id, parent_author_id) {
            (Some(parent_id), Some(author)) => {
                (author, NotificationType::CommentReply, parent_id, RelatedType::Comment)
            }
            _ => (post_author_id, NotificationType::PostComment, post_id, RelatedType::Post),
        };
        if recipient_id != user_id {
            let outcome = self
                .notification_service
                .create_notification(CreateNotification {
                    recipient_id,
                    sender_id: user_id,
                    kind,
                    related_id,
                    related_type,
                    title: None,
                    content: None,
                })
                .await;
            if let Err(e) = outcome {
                warn!("Failed to create comment notification: {}", e);
            }
        }

        Ok(comment_id)
    }

    /// 删除评论，仅评论作者可删。评论、点赞与帖子计数在同一事务中更新。
    pub async fn delete_comment(&self, comment_id: i64, user_id: i64) -> Result<()> {
        let comment = sqlx::query("SELECT user_id, post_id FROM comments WHERE id = ?")
            .bind(comment_id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| AppError::not_found("评论"))?;
        let author_id: i64 = comment.try_get("user_id")?;
        let post_id: i64 = comment.try_get("post_id")?;

        if author_id != user_id {
            return Err(AppError::forbidden("只能删除自己的评论"));
        }

        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM comment_likes WHERE comment_id = ?")
            .bind(comment_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(comment_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE posts SET comments_count = GREATEST(comments_count - 1, 0) WHERE id = ?",
        )
        .bind(post_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!("Comment deleted: id={} user={}", comment_id, user_id);
        Ok(())
    }

    /// 点赞评论。唯一约束保证幂等：重复点赞不会增加计数。
    pub async fn like_comment(&self, comment_id: i64, user_id: i64) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE id = ?")
            .bind(comment_id)
            .fetch_one(self.db.pool())
            .await?;
        if exists == 0 {
            return Err(AppError::not_found("评论"));
        }

        let mut tx = self.db.pool().begin().await?;
        let inserted = sqlx::query(
            "INSERT IGNORE INTO comment_likes (comment_id, user_id) VALUES (?, ?)",
        )
        .bind(comment_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let newly_liked = inserted.rows_affected() > 0;
        if newly_liked {
            sqlx::query("UPDATE comments SET likes_count = likes_count + 1 WHERE id = ?")
                .bind(comment_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(newly_liked)
    }

    pub async fn unlike_comment(&self, comment_id: i64, user_id: i64) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;
        let deleted = sqlx::query("DELETE FROM comment_likes WHERE comment_id = ? AND user_id = ?")
            .bind(comment_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let removed = deleted.rows_affected() > 0;
        if removed {
            sqlx::query(
                "UPDATE comments SET likes_count = GREATEST(likes_count - 1, 0) WHERE id = ?",
            )
            .bind(comment_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(removed)
    }
}

/// 将按创建时间升序排列的评论行组装为嵌套树。
/// 父评论缺失的孤儿默认提升为根节点并告警；drop_orphans 为真时静默丢弃。
/// 同级顺序保持输入顺序，嵌套深度不设上限。
pub fn build_comment_tree(rows: Vec<CommentRow>, drop_orphans: bool) -> Vec<CommentNode> {
    let ids: HashSet<i64> = rows.iter().map(|row| row.id).collect();
    let mut children: HashMap<i64, Vec<CommentRow>> = HashMap::new();
    let mut roots: Vec<CommentRow> = Vec::new();

    for row in rows {
        match row.parent_id {
            None => roots.push(row),
            Some(parent_id) if ids.contains(&parent_id) => {
                children.entry(parent_id).or_default().push(row);
            }
            Some(parent_id) => {
                if drop_orphans {
                    debug!("Dropping orphan comment {}: parent {} missing", row.id, parent_id);
                } else {
                    warn!(
                        "Promoting orphan comment {} to root: parent {} missing",
                        row.id, parent_id
                    );
                    roots.push(row);
                }
            }
        }
    }

    roots
        .into_iter()
        .map(|row| attach_replies(row, &mut children))
        .collect()
}

fn attach_replies(row: CommentRow, children: &mut HashMap<i64, Vec<CommentRow>>) -> CommentNode {
    let replies = children
        .remove(&row.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| attach_replies(child, children))
        .collect();
    CommentNode::from_row(row, replies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(id: i64, parent_id: Option<i64>, minute: u32) -> CommentRow {
        CommentRow {
            id,
            post_id: 1,
            user_id: 100 + id,
            content: format!("评论{}", id),
            parent_id,
            likes_count: 0,
            created_at: Utc.with_ymd_and_hms(2026, 8, 1, 12, minute, 0).unwrap(),
            author_name: Some(format!("用户{}", id)),
            author_avatar: None,
        }
    }

    #[test]
    fn test_build_tree_nests_replies() {
        // 1 ← 2 ← 3，三层嵌套
        let rows = vec![row(1, None, 0), row(2, Some(1), 1), row(3, Some(2), 2)];
        let tree = build_comment_tree(rows, false);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, 1);
        assert_eq!(tree[0].replies.len(), 1);
        assert_eq!(tree[0].replies[0].id, 2);
        assert_eq!(tree[0].replies[0].replies.len(), 1);
        assert_eq!(tree[0].replies[0].replies[0].id, 3);
    }

    #[test]
    fn test_build_tree_preserves_sibling_order() {
        let rows = vec![
            row(1, None, 0),
            row(2, None, 1),
            row(3, Some(1), 2),
            row(4, Some(1), 3),
        ];
        let tree = build_comment_tree(rows, false);

        assert_eq!(tree.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(
            tree[0].replies.iter().map(|n| n.id).collect::<Vec<_>>(),
            vec![3, 4]
        );
    }

    #[test]
    fn test_orphan_promoted_to_root_by_default() {
        let rows = vec![row(1, None, 0), row(5, Some(99), 1)];
        let tree = build_comment_tree(rows, false);

        assert_eq!(tree.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 5]);
        assert!(tree[1].replies.is_empty());
    }

    #[test]
    fn test_orphan_dropped_when_configured() {
        let rows = vec![row(1, None, 0), row(5, Some(99), 1), row(6, Some(5), 2)];
        let tree = build_comment_tree(rows, true);

        // 孤儿 5 被丢弃，但其子节点 6 仍挂在 5 下，因而随之消失
        assert_eq!(tree.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_empty_input_yields_empty_tree() {
        assert!(build_comment_tree(Vec::new(), false).is_empty());
        assert!(build_comment_tree(Vec::new(), true).is_empty());
    }

    #[test]
    fn test_reply_to_orphan_follows_promoted_parent() {
        let rows = vec![row(5, Some(99), 0), row(6, Some(5), 1)];
        let tree = build_comment_tree(rows, false);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, 5);
        assert_eq!(tree[0].replies[0].id, 6);
    }
}
