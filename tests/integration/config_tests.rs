use dupevault::config::Config;
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Figment without Env, so variables set by other tests do not leak in.
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r#"
quick_scan = false
quick_scan_threshold = 500
skip_hidden = true
extensions = ["jpg", "png"]
quarantine_dir = "/srv/quarantine"
"#;
    fs::write(&config_path, toml_content).unwrap();

    let config = Config::load_from(Some(&config_path));

    assert!(!config.quick_scan);
    assert_eq!(config.quick_scan_threshold, 500);
    assert!(config.skip_hidden);
    assert_eq!(config.extensions, vec!["jpg", "png"]);
    assert_eq!(config.quarantine_dir(), PathBuf::from("/srv/quarantine"));
    // Unset fields keep their defaults.
    assert_eq!(config.progress_interval, 10);
}

#[test]
fn test_env_overrides_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "hash_threads = 8\ninclude_empty = false\n").unwrap();

    std::env::set_var("DUPEVAULT_HASH_THREADS", "3");
    std::env::set_var("DUPEVAULT_INCLUDE_EMPTY", "true");

    let config: Config = Config::figment(Some(&config_path)).extract().unwrap();

    std::env::remove_var("DUPEVAULT_HASH_THREADS");
    std::env::remove_var("DUPEVAULT_INCLUDE_EMPTY");

    assert_eq!(config.hash_threads, 3);
    assert!(config.include_empty);
}

#[test]
fn test_malformed_toml_falls_back_to_defaults() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "quick_scan = \"definitely not a bool\"").unwrap();

    let config = Config::load_from(Some(&config_path));
    assert_eq!(config.quick_scan_threshold, Config::default().quick_scan_threshold);
    assert!(config.quick_scan);
}

#[test]
fn test_save_and_reload() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let config = Config {
        quick_scan_threshold: 42,
        extensions: vec!["mp3".to_string()],
        restore_dir: Some(PathBuf::from("/srv/restored")),
        ..Config::default()
    };
    config.save(&config_path).unwrap();

    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path));
    let loaded: Config = figment.extract().unwrap();
    assert_eq!(loaded, config);
}
