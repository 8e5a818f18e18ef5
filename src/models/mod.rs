pub mod category;
pub mod comment;
pub mod notification;
pub mod post;
pub mod user;
pub mod venue;
