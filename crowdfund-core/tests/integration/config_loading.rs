use crowdfund_core::foundation::{EscrowError, NANOS_PER_SECOND};
use crowdfund_core::infrastructure::config::{load_config_from_env, load_config_from_file, load_config_from_file_with_profile, EscrowConfig};
use crowdfund_core::infrastructure::logging::init_logger;
use std::env;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};

fn lock_env() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("crowdfund.toml");
    std::fs::write(&path, contents).expect("write config");
    path
}

const NODE_CONFIG: &str = r#"
[node]
name = "PartyB"

[notary]
name = "Notary"
time_tolerance_secs = 10

[settlement]
broadcast_to_observers = false

[scheduler]
poll_interval_ms = 250

[profiles.fast.scheduler]
poll_interval_ms = 5

[profiles.fast.notary]
time_tolerance_secs = 1
"#;

#[test]
fn test_config_loading_when_file_present_then_overrides_defaults() {
    let _guard = lock_env();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_config(&dir, NODE_CONFIG);

    let config = load_config_from_file(&path).expect("load config");

    assert_eq!(config.node.name, "PartyB");
    assert_eq!(config.notary.time_tolerance_secs, 10);
    assert_eq!(config.notary_tolerance_nanos(), 10 * NANOS_PER_SECOND);
    assert!(!config.settlement.broadcast_to_observers);
    assert_eq!(config.scheduler.poll_interval_ms, 250);
    assert_eq!(config.transport, EscrowConfig::default().transport);
}

#[test]
fn test_config_loading_when_profile_selected_then_profile_wins() {
    let _guard = lock_env();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_config(&dir, NODE_CONFIG);

    let config = load_config_from_file_with_profile(&path, "fast").expect("load profile");

    assert_eq!(config.node.name, "PartyB");
    assert_eq!(config.scheduler.poll_interval_ms, 5);
    assert_eq!(config.notary.time_tolerance_secs, 1);
}

#[test]
fn test_config_loading_when_profile_missing_then_config_error() {
    let _guard = lock_env();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_config(&dir, NODE_CONFIG);

    let err = load_config_from_file_with_profile(&path, "absent").expect_err("missing profile");
    assert!(matches!(err, EscrowError::ConfigError(_)));
}

#[test]
fn test_config_loading_when_env_override_set_then_env_wins() {
    let _guard = lock_env();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_config(&dir, NODE_CONFIG);

    env::set_var("CROWDFUND_NOTARY__TIME_TOLERANCE_SECS", "45");
    let from_file = load_config_from_file(&path);
    let from_env = load_config_from_env();
    env::remove_var("CROWDFUND_NOTARY__TIME_TOLERANCE_SECS");

    assert_eq!(from_file.expect("file config").notary.time_tolerance_secs, 45);
    let from_env = from_env.expect("env config");
    assert_eq!(from_env.notary.time_tolerance_secs, 45);
    assert_eq!(from_env.node.name, EscrowConfig::default().node.name);
}

#[test]
fn test_config_loading_when_file_absent_then_defaults_used() {
    let _guard = lock_env();
    let dir = tempfile::tempdir().expect("temp dir");

    let config = load_config_from_file(&dir.path().join("missing.toml")).expect("defaults");
    assert_eq!(config, EscrowConfig::default());
}

#[test]
fn test_config_loading_when_invalid_values_then_validation_error() {
    let _guard = lock_env();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_config(&dir, "[node]\nname = \"Notary\"\n\n[transport]\ninbox_capacity = 0\n");

    let err = load_config_from_file(&path).expect_err("invalid");
    let EscrowError::ConfigError(message) = err else {
        panic!("expected config error");
    };
    assert!(message.contains("notary.name must differ from node.name"));
    assert!(message.contains("transport.inbox_capacity"));
}

#[test]
fn test_init_logger_when_log_dir_given_then_succeeds() {
    let dir = tempfile::tempdir().expect("temp dir");
    let log_dir = dir.path().to_str().expect("utf8 path");
    assert!(init_logger(Some(log_dir), "debug,crowdfund_core=trace").is_ok());
    // The logger is global; a second initialisation is ignored.
    assert!(init_logger(None, "info").is_ok());
}

#[test]
fn test_config_loading_when_serialized_config_written_then_loaded_back() {
    let _guard = lock_env();
    let dir = tempfile::tempdir().expect("temp dir");
    let mut expected = EscrowConfig::default();
    expected.node.name = "PartyC".to_string();
    expected.scheduler.enabled = false;
    expected.logging.filters = "debug".to_string();
    let path = write_config(&dir, &toml::to_string(&expected).expect("serialize"));

    assert_eq!(load_config_from_file(&path).expect("load"), expected);
}
