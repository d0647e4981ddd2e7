use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_url = |var: &str, default: &str| -> Result<String, ConfigError> {
        let raw = or_default(var, default);
        let trimmed = raw.trim().trim_end_matches('/');
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Ok(trimmed.to_string())
        } else {
            Err(invalid(var, format!("'{raw}' is not an http(s) URL")))
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("SUPPLYDESK_ENV", "development"))?;

    let bind_addr = or_default("SUPPLYDESK_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("SUPPLYDESK_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("SUPPLYDESK_LOG_LEVEL", "info");
    let policy_path = PathBuf::from(or_default(
        "SUPPLYDESK_POLICY_PATH",
        "./config/pipeline.yaml",
    ));

    let db_max_connections = parse_u32("SUPPLYDESK_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SUPPLYDESK_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("SUPPLYDESK_DB_ACQUIRE_TIMEOUT_SECS", "10")?;
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "SUPPLYDESK_DB_MIN_CONNECTIONS",
            format!("{db_min_connections} exceeds SUPPLYDESK_DB_MAX_CONNECTIONS {db_max_connections}"),
        ));
    }

    let extraction_url = parse_url("SUPPLYDESK_EXTRACTION_URL", "http://127.0.0.1:8081")?;
    let catalog_url = parse_url("SUPPLYDESK_CATALOG_URL", "http://127.0.0.1:8082")?;
    let directory_url = parse_url("SUPPLYDESK_DIRECTORY_URL", "http://127.0.0.1:8083")?;
    let service_api_key = optional("SUPPLYDESK_SERVICE_API_KEY");

    let service_timeout_secs = parse_u64("SUPPLYDESK_SERVICE_TIMEOUT_SECS", "10")?;
    let extraction_timeout_secs = parse_u64("SUPPLYDESK_EXTRACTION_TIMEOUT_SECS", "60")?;
    if extraction_timeout_secs == 0 {
        return Err(invalid(
            "SUPPLYDESK_EXTRACTION_TIMEOUT_SECS",
            "must be greater than zero".to_string(),
        ));
    }
    let client_max_retries = parse_u32("SUPPLYDESK_CLIENT_MAX_RETRIES", "2")?;
    let client_backoff_base_ms = parse_u64("SUPPLYDESK_CLIENT_BACKOFF_BASE_MS", "250")?;
    let extraction_queue_capacity = parse_usize("SUPPLYDESK_EXTRACTION_QUEUE_CAPACITY", "256")?;
    if extraction_queue_capacity == 0 {
        return Err(invalid(
            "SUPPLYDESK_EXTRACTION_QUEUE_CAPACITY",
            "must be greater than zero".to_string(),
        ));
    }

    let webhook_verify_token = optional("SUPPLYDESK_WEBHOOK_VERIFY_TOKEN");
    let api_keys: Vec<String> = or_default("SUPPLYDESK_API_KEYS", "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect();
    let rate_limit_per_minute = parse_usize("SUPPLYDESK_RATE_LIMIT_PER_MINUTE", "120")?;

    let recovery_sweep_cron = or_default("SUPPLYDESK_RECOVERY_SWEEP_CRON", "0 * * * * *");
    let stale_sweep_cron = or_default("SUPPLYDESK_STALE_SWEEP_CRON", "0 */5 * * * *");
    let pending_dispatch_cron = or_default("SUPPLYDESK_PENDING_DISPATCH_CRON", "30 * * * * *");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        policy_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        extraction_url,
        catalog_url,
        directory_url,
        service_api_key,
        service_timeout_secs,
        extraction_timeout_secs,
        client_max_retries,
        client_backoff_base_ms,
        extraction_queue_capacity,
        webhook_verify_token,
        api_keys,
        rate_limit_per_minute,
        recovery_sweep_cron,
        stale_sweep_cron,
        pending_dispatch_cron,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "SUPPLYDESK_ENV".to_string(),
            reason: format!("expected development, test or production; got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
