pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

#[cfg(test)]
mod test_helpers;

use std::sync::Arc;

use sqlx::PgPool;

use config::Config;
use db::store::Store;
use services::{images::ImageStorage, notifications::NotificationService};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
    pub notifications: Arc<NotificationService>,
    pub images: Arc<ImageStorage>,
}
