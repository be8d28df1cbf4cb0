//! Integration tests for layered configuration loading.

use std::fs;

use evosync::config::{ConfigError, ConfigLoader};
use tempfile::TempDir;

#[test]
fn layered_env_files_merge_with_local_overrides() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".env"),
        "EVOSYNC_OPERATOR_TOKEN=base-token\n\
         EVOSYNC_EVOLUTION_BASE_URL=http://evo.internal:8088\n\
         EVOSYNC_RECONCILER_TICK_INTERVAL_SECONDS=120\n",
    )
    .unwrap();
    fs::write(
        dir.path().join(".env.local"),
        "EVOSYNC_PAIRING_MAX_POLL_ATTEMPTS=5\n\
         EVOSYNC_WATCHER_DISCONNECT_GUARD_SECONDS=10\n",
    )
    .unwrap();

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap();

    assert_eq!(config.profile, "local");
    assert_eq!(config.operator_tokens, vec!["base-token".to_string()]);
    assert_eq!(config.evolution.base_url, "http://evo.internal:8088");
    assert_eq!(config.reconciler.tick_interval_seconds, 120);
    assert_eq!(config.pairing.max_poll_attempts, 5);
    assert_eq!(config.watcher.disconnect_guard_seconds, 10);
}

#[test]
fn operator_token_list_is_split_and_trimmed() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".env"),
        "EVOSYNC_OPERATOR_TOKENS=token-one, token-two ,token-three\n",
    )
    .unwrap();

    let config = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap();

    assert_eq!(
        config.operator_tokens,
        vec![
            "token-one".to_string(),
            "token-two".to_string(),
            "token-three".to_string()
        ]
    );
}

#[test]
fn missing_operator_tokens_fail_load() {
    let dir = TempDir::new().unwrap();

    let result = ConfigLoader::with_base_dir(dir.path().to_path_buf()).load();

    assert!(matches!(result, Err(ConfigError::MissingOperatorTokens)));
}

#[test]
fn out_of_bounds_values_fail_load() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".env"),
        "EVOSYNC_OPERATOR_TOKEN=token\n\
         EVOSYNC_RECONCILER_TICK_INTERVAL_SECONDS=1\n",
    )
    .unwrap();

    let result = ConfigLoader::with_base_dir(dir.path().to_path_buf()).load();

    assert!(matches!(
        result,
        Err(ConfigError::InvalidReconcilerTickInterval { value: 1 })
    ));
}
