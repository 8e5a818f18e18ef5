use crate::{
    config::Config,
    services::{
        auth::AuthService, category::CategoryService, comment::CommentService,
        database::Database, media::MediaService, notification::NotificationService,
        post::PostService, user::UserService, venue::VenueService,
    },
};
use std::sync::Arc;

/// 应用程序的共享状态
/// 包含所有服务和配置的引用
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Config,

    /// 数据库连接
    pub db: Arc<Database>,

    /// 认证服务
    pub auth_service: Arc<AuthService>,

    /// 用户服务
    pub user_service: UserService,

    /// 类别服务
    pub category_service: CategoryService,

    /// 帖子服务
    pub post_service: PostService,

    /// 评论服务
    pub comment_service: CommentService,

    /// 场地服务
    pub venue_service: VenueService,

    /// 通知服务
    pub notification_service: NotificationService,

    /// 媒体服务
    pub media_service: MediaService,
}

impl AppState {
    pub fn is_production(&self) -> bool {
        self.config.is_production()
    }

    pub fn is_development(&self) -> bool {
        self.config.is_development()
    }
}
