pub mod comments;
pub mod images;
pub mod notifications;
pub mod presenter;
pub mod reports;
