//! Offline tests for supplydesk-db pool configuration and row helpers.
//! These tests do not require a live database connection.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use chrono::Utc;
use supplydesk_core::{AppConfig, Environment};
use supplydesk_db::{ExtractionOutcome, PoolConfig, SubmissionRow};
use uuid::Uuid;

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        policy_path: PathBuf::from("./config/pipeline.yaml"),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        extraction_url: "http://127.0.0.1:8081".to_string(),
        catalog_url: "http://127.0.0.1:8082".to_string(),
        directory_url: "http://127.0.0.1:8083".to_string(),
        service_api_key: None,
        service_timeout_secs: 10,
        extraction_timeout_secs: 60,
        client_max_retries: 2,
        client_backoff_base_ms: 250,
        extraction_queue_capacity: 16,
        webhook_verify_token: None,
        api_keys: vec![],
        rate_limit_per_minute: 120,
        recovery_sweep_cron: "0 * * * * *".to_string(),
        stale_sweep_cron: "0 */5 * * * *".to_string(),
        pending_dispatch_cron: "30 * * * * *".to_string(),
    }
}

fn submission_row(supplier_id: Option<&str>) -> SubmissionRow {
    SubmissionRow {
        id: 1,
        public_id: Uuid::new_v4(),
        source_message_id: "wamid.1".to_string(),
        supplier_phone: "+34600000001".to_string(),
        supplier_id: supplier_id.map(ToOwned::to_owned),
        supplier_name: None,
        content_type: "text".to_string(),
        content: Some("10x iPhone 13 128GB 420 EUR".to_string()),
        media_url: None,
        processing_status: "pending".to_string(),
        validation_status: "pending".to_string(),
        overall_confidence: None,
        extraction_attempt: 0,
        last_error: None,
        dispatched_at: None,
        processing_started_at: None,
        processed_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout, std::time::Duration::from_secs(9));
}

#[test]
fn pool_config_never_keeps_more_idle_than_max() {
    let mut config = app_config();
    config.db_max_connections = 2;
    config.db_min_connections = 5;
    let pool_config = PoolConfig::from_app_config(&config);
    assert_eq!(pool_config.min_connections, 2);
}

#[test]
fn supplier_key_prefers_directory_id() {
    assert_eq!(submission_row(Some("SUP-7")).supplier_key(), "SUP-7");
    assert_eq!(submission_row(None).supplier_key(), "+34600000001");
}

#[test]
fn extraction_outcome_labels_match_schema() {
    assert_eq!(ExtractionOutcome::Succeeded.as_str(), "succeeded");
    assert_eq!(ExtractionOutcome::Failed.as_str(), "failed");
}
