//! Layered configuration: YAML file plus `FIELDFLOW_` environment overrides.

use std::io::Write;

use fieldflow::infrastructure::config::ConfigLoader;
use tempfile::NamedTempFile;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_env_overrides_nested_keys() {
    let file = config_file("worker:\n  batch_size: 10\n  concurrency: 2\ncron:\n  secret: from-file\n");

    let config = temp_env::with_vars(
        [
            ("FIELDFLOW_WORKER__BATCH_SIZE", Some("40")),
            ("FIELDFLOW_AUTOMATION__ACTION_DEDUP_SECS", Some("120")),
            ("FIELDFLOW_INTEGRATIONS__BASE_URL", Some("https://gateway.example.com")),
        ],
        || ConfigLoader::load_from_file(file.path()).unwrap(),
    );

    assert_eq!(config.worker.batch_size, 40);
    assert_eq!(config.worker.concurrency, 2);
    assert_eq!(config.automation.action_dedup_secs, 120);
    assert_eq!(config.cron.secret.as_deref(), Some("from-file"));
    assert_eq!(config.integrations.base_url.as_deref(), Some("https://gateway.example.com"));
}

#[test]
fn test_env_values_are_validated() {
    let file = config_file("logging:\n  level: info\n");

    let result = temp_env::with_var("FIELDFLOW_AUTOMATION__MAX_ATTEMPTS", Some("0"), || {
        ConfigLoader::load_from_file(file.path())
    });
    assert!(result.is_err());
}

#[test]
fn test_invalid_file_is_reported() {
    let file = config_file("worker:\n  batch_size: many\n");
    let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to load config"));
}
