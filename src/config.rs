use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub media_dir: String,
    /// Public prefix under which stored report images are served.
    pub media_base_url: String,
    pub fcm_api_key: Option<String>,
    pub push_timeout_secs: u64,
    pub push_max_attempts: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            media_dir: env::var("MEDIA_DIR").unwrap_or_else(|_| "/data/media".into()),
            media_base_url: env::var("MEDIA_BASE_URL").unwrap_or_else(|_| "/media".into()),
            fcm_api_key: env::var("FCM_API_KEY").ok().filter(|s| !s.is_empty()),
            push_timeout_secs: env::var("PUSH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".into())
                .parse()?,
            push_max_attempts: env::var("PUSH_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".into())
                .parse()?,
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
