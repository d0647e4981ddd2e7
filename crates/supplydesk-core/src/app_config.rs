use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub policy_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub extraction_url: String,
    pub catalog_url: String,
    pub directory_url: String,
    /// Bearer token sent to the extraction, catalog and directory services.
    pub service_api_key: Option<String>,
    pub service_timeout_secs: u64,
    pub extraction_timeout_secs: u64,
    pub client_max_retries: u32,
    pub client_backoff_base_ms: u64,
    pub extraction_queue_capacity: usize,
    pub webhook_verify_token: Option<String>,
    pub api_keys: Vec<String>,
    pub rate_limit_per_minute: usize,
    pub recovery_sweep_cron: String,
    pub stale_sweep_cron: String,
    pub pending_dispatch_cron: String,
}

impl AppConfig {
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.env == Environment::Development
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("policy_path", &self.policy_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("extraction_url", &self.extraction_url)
            .field("catalog_url", &self.catalog_url)
            .field("directory_url", &self.directory_url)
            .field(
                "service_api_key",
                &self.service_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("service_timeout_secs", &self.service_timeout_secs)
            .field("extraction_timeout_secs", &self.extraction_timeout_secs)
            .field("client_max_retries", &self.client_max_retries)
            .field("client_backoff_base_ms", &self.client_backoff_base_ms)
            .field("extraction_queue_capacity", &self.extraction_queue_capacity)
            .field(
                "webhook_verify_token",
                &self.webhook_verify_token.as_ref().map(|_| "[redacted]"),
            )
            .field("api_keys", &format!("[{} redacted]", self.api_keys.len()))
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("recovery_sweep_cron", &self.recovery_sweep_cron)
            .field("stale_sweep_cron", &self.stale_sweep_cron)
            .field("pending_dispatch_cron", &self.pending_dispatch_cron)
            .finish()
    }
}
