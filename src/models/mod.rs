pub mod auth;
pub mod comment;
pub mod elder;
pub mod health;
pub mod report;
pub mod user;
