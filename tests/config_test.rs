use std::env;
use std::fs;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Environment variables are process-wide; tests touching them run one at a time
static ENV_LOCK: Mutex<()> = Mutex::new(());

const ENV_VARS: &[&str] = &[
    "S3_ENDPOINT",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "S3_KEY",
    "S3_SECRET",
    "S3_BUCKET",
    "S3SYNC_WORKERS",
    "S3SYNC_MAX_ATTEMPTS",
];

fn save_env() -> Vec<(&'static str, Option<String>)> {
    ENV_VARS.iter().map(|name| (*name, env::var(name).ok())).collect()
}

fn restore_env(saved: Vec<(&'static str, Option<String>)>) {
    for (name, value) in saved {
        cleanup_env(name, value);
    }
}

fn cleanup_env(key: &str, original: Option<String>) {
    match original {
        Some(val) => env::set_var(key, val),
        None => env::remove_var(key),
    }
}

/// Test loading configuration from YAML file
#[test]
fn test_load_yaml_config() {
    let yaml = r#"
profiles:
  test:
    endpoint: https://s3.example.com
    access_key: AKIATEST
    secret_key: secrettest
    bucket: test-bucket
  staging:
    endpoint: http://localhost:9000
    access_key: minio
    secret_key: minio123

batch:
  workers: 16
  max_attempts: 5
  base_backoff_ms: 50
  max_backoff_ms: 2000
  progress_interval_ms: 500
  request_timeout: 60

default_profile: test
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = s3sync::config::load_from_yaml(&config_path).unwrap();

    assert_eq!(config.profiles.len(), 2);
    let profile = config.get_profile(None).unwrap();
    assert_eq!(profile.endpoint, "https://s3.example.com");
    assert_eq!(profile.access_key, "AKIATEST");
    assert_eq!(profile.secret_key, "secrettest");
    assert_eq!(profile.bucket, Some("test-bucket".to_string()));

    let staging = config.get_profile(Some("staging")).unwrap();
    assert_eq!(staging.endpoint, "http://localhost:9000");

    assert_eq!(config.batch.workers, 16);
    assert_eq!(config.batch.request_timeout(), Duration::from_secs(60));

    let retry = config.batch.retry_policy();
    assert_eq!(retry.max_attempts, 5);
    assert_eq!(retry.base_delay, Duration::from_millis(50));
    assert_eq!(retry.max_delay, Duration::from_millis(2000));
    assert_eq!(
        config.batch.batch_config().progress_interval,
        Duration::from_millis(500)
    );
}

/// Test loading configuration from environment variables (AWS standard format)
#[test]
fn test_load_env_config_aws_format() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let saved = save_env();
    for name in ENV_VARS {
        env::remove_var(name);
    }

    env::set_var("S3_ENDPOINT", "https://s3.test.com");
    env::set_var("AWS_ACCESS_KEY_ID", "test_key");
    env::set_var("AWS_SECRET_ACCESS_KEY", "test_secret");
    env::set_var("S3_BUCKET", "test-bucket");
    env::set_var("S3SYNC_WORKERS", "12");
    env::set_var("S3SYNC_MAX_ATTEMPTS", "6");

    let config = s3sync::config::load_from_env();
    restore_env(saved);
    let config = config.unwrap();

    assert_eq!(config.profiles.len(), 1);
    let profile = config.profiles.get("default").unwrap();
    assert_eq!(profile.endpoint, "https://s3.test.com");
    assert_eq!(profile.access_key, "test_key");
    assert_eq!(profile.secret_key, "test_secret");
    assert_eq!(profile.bucket, Some("test-bucket".to_string()));
    assert_eq!(config.default_profile, Some("default".to_string()));
    assert_eq!(config.batch.workers, 12);
    assert_eq!(config.batch.max_attempts, 6);
}

/// Test loading configuration from environment variables (short format)
#[test]
fn test_load_env_config_short_format() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let saved = save_env();
    for name in ENV_VARS {
        env::remove_var(name);
    }

    env::set_var("S3_ENDPOINT", "http://localhost:9000");
    env::set_var("S3_KEY", "short_key");
    env::set_var("S3_SECRET", "short_secret");

    let config = s3sync::config::load_from_env();
    restore_env(saved);
    let config = config.unwrap();

    let profile = config.profiles.get("default").unwrap();
    assert_eq!(profile.access_key, "short_key");
    assert_eq!(profile.secret_key, "short_secret");
    assert_eq!(profile.bucket, None);
    assert_eq!(config.batch.workers, 4);
}

/// Test that a malformed numeric override is rejected
#[test]
fn test_env_invalid_workers() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let saved = save_env();
    for name in ENV_VARS {
        env::remove_var(name);
    }

    env::set_var("S3_ENDPOINT", "http://localhost:9000");
    env::set_var("S3_KEY", "key");
    env::set_var("S3_SECRET", "secret");
    env::set_var("S3SYNC_WORKERS", "many");

    let result = s3sync::config::load_from_env();
    restore_env(saved);
    assert!(result.is_err());
}

/// Test default values
#[test]
fn test_default_values() {
    let yaml = r#"
profiles:
  minimal:
    endpoint: https://s3.test.com
    access_key: key
    secret_key: secret
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = s3sync::config::load_from_yaml(&config_path).unwrap();

    let profile = config.profiles.get("minimal").unwrap();
    // Bucket should be None
    assert_eq!(profile.bucket, None);

    // Should use default batch settings
    assert_eq!(config.batch.workers, 4);
    assert_eq!(config.batch.max_attempts, 3);
    assert_eq!(config.batch.base_backoff_ms, 100);
    assert_eq!(config.batch.max_backoff_ms, 5000);
    assert_eq!(config.batch.progress_interval_ms, 250);
    assert_eq!(config.batch.request_timeout, 300);
}

/// Test profile selection through load_config
#[test]
fn test_load_config_profile_selection() {
    let yaml = r#"
profiles:
  one:
    endpoint: https://one.test.com
    access_key: k1
    secret_key: s1
  two:
    endpoint: https://two.test.com
    access_key: k2
    secret_key: s2
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();
    let path = config_path.to_str().unwrap();

    let config = s3sync::config::load_config(Some(path), Some("two")).unwrap();
    assert_eq!(config.get_profile(None).unwrap().endpoint, "https://two.test.com");

    let missing = s3sync::config::load_config(Some(path), Some("three"));
    assert!(missing.is_err());
}

/// Test invalid YAML handling
#[test]
fn test_invalid_yaml() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, "profiles: [not, a, map").unwrap();

    assert!(s3sync::config::load_from_yaml(&config_path).is_err());
    assert!(s3sync::config::load_from_yaml(temp_dir.path().join("absent.yaml")).is_err());
}
