pub struct Env {
    pub jwt_secret: String,
    pub database_url: String,
    pub redis_url: String,
    pub frontend_url: String,
    pub ip: String,
    pub port: u16,
    pub backend_timeout_secs: u64,
    pub backend_max_retries: u32,
    pub backend_retry_delay_ms: u64,
    pub profile_ready_retries: u32,
    pub profile_ready_delay_ms: u64,
    pub profile_cache_ttl: usize,
    pub max_message_length: usize,
    pub realtime_buffer: usize,
}

fn var_or<T: std::str::FromStr>(key: &str, default: &str) -> T {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .unwrap_or_else(|_| panic!("{key} must be a valid number"))
}

impl Env {
    fn new() -> Self {
        let jwt_secret = std::env::var("SECRET_KEY")
            .expect("SECRET_KEY must be set in .env file or environment variable");

        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set in .env file or environment variable");
        let redis_url = std::env::var("REDIS_URL")
            .expect("REDIS_URL must be set in .env file or environment variable");

        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let ip = std::env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = var_or("PORT", "8080");

        Env {
            jwt_secret,
            database_url,
            redis_url,
            frontend_url,
            ip,
            port,
            backend_timeout_secs: var_or("BACKEND_TIMEOUT_SECS", "5"),
            backend_max_retries: var_or("BACKEND_MAX_RETRIES", "3"),
            backend_retry_delay_ms: var_or("BACKEND_RETRY_DELAY_MS", "200"),
            profile_ready_retries: var_or("PROFILE_READY_RETRIES", "3"),
            profile_ready_delay_ms: var_or("PROFILE_READY_DELAY_MS", "1000"),
            profile_cache_ttl: var_or("PROFILE_CACHE_TTL", "3600"),
            max_message_length: var_or("MAX_MESSAGE_LENGTH", "2000"),
            realtime_buffer: var_or("REALTIME_BUFFER", "1024"),
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

/// Notification channel the `messages` trigger publishes on.
pub const MESSAGE_CHANGES_CHANNEL: &str = "message_changes";

pub const UNKNOWN_USER_NAME: &str = "Unknown User";

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;
pub const MAX_PROFILE_BATCH: usize = 100;
