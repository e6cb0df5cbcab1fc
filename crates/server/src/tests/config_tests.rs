use super::{load_settings_from, normalize_database_url, prepare_database_url};

use std::{collections::HashMap, fs, time::Duration};

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
}

#[test]
fn keeps_in_memory_url_untouched() {
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
}

#[test]
fn creates_parent_dir_for_relative_sqlite_url() {
    let temp_root = tempdir_path("prepare");
    let db_path = temp_root.join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(temp_root.join("data").exists());

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn defaults_apply_without_file_or_env() {
    let settings = load_settings_from(&tempdir_path("missing").join("server.toml"), env_from(&[]));
    assert_eq!(settings.server_bind, "127.0.0.1:5000");
    assert_eq!(settings.tick_interval_ms, 1000);
    assert_eq!(settings.broadcast_every_ticks, 2);
    assert!(settings.seed_defaults);
    assert!(!settings.simulate_traffic);
    assert_eq!(settings.scheduler().tick_interval, Duration::from_secs(1));
}

#[test]
fn file_values_are_overridden_by_environment() {
    let temp_root = tempdir_path("layered");
    fs::create_dir_all(&temp_root).expect("temp root");
    let path = temp_root.join("server.toml");
    fs::write(
        &path,
        "bind_addr = \"0.0.0.0:9000\"\ntick_interval_ms = 250\nsimulate_traffic = true\n",
    )
    .expect("write settings");

    let settings = load_settings_from(
        &path,
        env_from(&[
            ("APP__BIND_ADDR", "127.0.0.1:7000"),
            ("APP__BROADCAST_EVERY_TICKS", "5"),
            ("APP__SEED_DEFAULTS", "false"),
        ]),
    );
    assert_eq!(settings.server_bind, "127.0.0.1:7000");
    assert_eq!(settings.tick_interval_ms, 250);
    assert!(settings.simulate_traffic);
    assert_eq!(settings.broadcast_every_ticks, 5);
    assert!(!settings.seed_defaults);

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn unparsable_env_override_keeps_previous_value() {
    let settings = load_settings_from(
        &tempdir_path("bad-env").join("server.toml"),
        env_from(&[("APP__TICK_INTERVAL_MS", "soon")]),
    );
    assert_eq!(settings.tick_interval_ms, 1000);
}

fn tempdir_path(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "signal_server_{label}_{}",
        uuid::Uuid::new_v4().simple()
    ))
}
