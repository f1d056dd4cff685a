// tests/config_env.rs
use jobfeed::config::AppConfig;
use std::{env, fs};

const VARS: [&str; 6] = [
    "JOBFEED_CONFIG",
    "CHECK_INTERVAL_MINUTES",
    "ADMIN_ID",
    "GROUP_CHAT_ID",
    "JOOBLE_API_KEY",
    "DB_PATH",
];

fn clear_env() {
    for v in VARS {
        env::remove_var(v);
    }
}

#[serial_test::serial]
#[test]
fn file_then_env_precedence() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobfeed.toml");
    fs::write(
        &path,
        r#"
cycle_interval_secs = 1800
fetch_limit_per_source = 12
group_chat_id = -1001
db_path = "data/jobs.db"
"#,
    )
    .unwrap();

    env::set_var("JOBFEED_CONFIG", path.display().to_string());
    let from_file = AppConfig::load_default().unwrap();
    assert_eq!(from_file.cycle_interval_secs, 1800);
    assert_eq!(from_file.fetch_limit_per_source, 12);
    assert_eq!(from_file.group_chat_id, Some(-1001));
    // Untouched keys keep their defaults.
    assert_eq!(from_file.max_postings_per_delivery, 5);

    env::set_var("CHECK_INTERVAL_MINUTES", "5");
    env::set_var("ADMIN_ID", "99");
    env::set_var("DB_PATH", "/tmp/other.db");
    let with_env = AppConfig::load_default().unwrap();
    assert_eq!(with_env.cycle_interval_secs, 300);
    assert_eq!(with_env.admin_identity, Some(99));
    assert_eq!(with_env.db_path.to_str(), Some("/tmp/other.db"));
    assert_eq!(with_env.fetch_limit_per_source, 12);

    clear_env();
}

#[serial_test::serial]
#[test]
fn missing_explicit_path_is_an_error() {
    clear_env();
    env::set_var("JOBFEED_CONFIG", "/definitely/not/here.toml");
    assert!(AppConfig::load_default().is_err());
    clear_env();
}

#[serial_test::serial]
#[test]
fn defaults_without_any_file() {
    clear_env();
    // Isolate CWD so the repo's own config/ is not picked up.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();

    env::set_var("JOOBLE_API_KEY", "  ");
    let cfg = AppConfig::load_default().unwrap();
    assert_eq!(cfg, AppConfig::default(), "blank env values are ignored");

    env::set_current_dir(&old).unwrap();
    clear_env();
}
