pub mod auth;
pub mod category;
pub mod comment;
pub mod database;
pub mod email;
pub mod media;
pub mod notification;
pub mod post;
pub mod user;
pub mod venue;

pub use auth::{AuthService, AuthUser, OptionalAuthUser};
pub use category::CategoryService;
pub use comment::CommentService;
pub use database::Database;
pub use email::EmailService;
pub use media::{ImageStorage, LocalStorage, MediaService};
pub use notification::NotificationService;
pub use post::PostService;
pub use user::UserService;
pub use venue::VenueService;
