use std::time::Duration;
use std::{env, fs};

use trakteer_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("trakteer.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081

[logging]
level = "debug"

[auth.session]
secret = "0123456789abcdef0123456789abcdef"
expires = "12h"
default_role = "member"

[auth.federation]
enabled = true
client_id = "1234.apps.googleusercontent.com"

[auth.cache]
max_retries = 3
retry_period = "500ms"
refresh_period = "1m"
validity_threshold = "3h 30m"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses, unspecified values keep their defaults
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.auth.session.expires, Duration::from_secs(12 * 3600));
    assert_eq!(cfg.auth.session.audience, "trakteer");
    assert_eq!(cfg.auth.session.default_role, "member");
    assert!(cfg.auth.federation.enabled);
    assert_eq!(cfg.auth.federation.trusted_issuers.len(), 2);
    assert_eq!(cfg.auth.cache.max_retries, 3);
    assert_eq!(cfg.auth.cache.retry_period, Duration::from_millis(500));
    assert_eq!(
        cfg.auth.cache.validity_threshold,
        Duration::from_secs(3 * 3600 + 30 * 60)
    );

    // 2) Env override should win over file
    unsafe {
        env::set_var("TRAKTEER__SERVER__PORT", "9090");
        env::set_var("TRAKTEER__AUTH__SESSION__AUDIENCE", "courses");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.server.port, 9090);
    assert_eq!(cfg_env.auth.session.audience, "courses");
    unsafe {
        env::remove_var("TRAKTEER__SERVER__PORT");
        env::remove_var("TRAKTEER__AUTH__SESSION__AUDIENCE");
    }

    // 3) Invalid config is rejected with the failing key
    let invalid = toml_content.replace(
        "secret = \"0123456789abcdef0123456789abcdef\"",
        "secret = \"short\"",
    );
    fs::write(&path, invalid).expect("write invalid toml");
    let err = load_config(path.to_str()).expect_err("short secret must be rejected");
    assert!(err.contains("session.secret"), "{err}");

    let invalid = toml_content.replace("validity_threshold = \"3h 30m\"", "validity_threshold = \"30s\"");
    fs::write(&path, invalid).expect("write invalid toml");
    let err = load_config(path.to_str()).expect_err("threshold below refresh period");
    assert!(err.contains("validity_threshold"), "{err}");
}

#[test]
fn missing_file_requires_secret() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let err = load_config(path.to_str()).expect_err("defaults have no secret");
    assert!(err.contains("session.secret"), "{err}");
}
