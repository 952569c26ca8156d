// ABOUTME: Tests for configuration loading and validation
// ABOUTME: Verifies TOML parsing, env var overrides, and required field validation

use serial_test::serial;
use std::io::Write;
use std::path::{Path, PathBuf};

use chatrelay::config::Config;

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    for var in [
        "CHATRELAY_CONFIG_PATH",
        "STEAM_ACCOUNT_NAME",
        "STEAM_PASSWORD",
        "STEAM_AUTH_CODE",
        "SLACK_BOT_TOKEN",
        "SLACK_APP_TOKEN",
        "IRC_PASSWORD",
        "RELAY_DATA_DIR",
    ] {
        std::env::remove_var(var);
    }
}

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

const FULL_CONFIG: &str = r##"
[steam]
sidecar = "/usr/local/bin/steam-sidecar"
account_name = "relaybot"
password = "from-file"
chatroom = "103582791429521412"

[irc]
server = "irc.libera.chat"
port = 6697
tls = true
nickname = "relaybot"
channel = "#relay"

[slack]
app_token = "xapp-file"
bot_token = "xoxb-file"
channel = "relay"

[watchdog]
inactivity_threshold_secs = 7200
check_interval_secs = 120

[templates]
message = "[{name}] {body}"
"##;

#[test]
#[serial]
fn test_config_loads_from_toml_file() {
    clear_config_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let path = write_config(temp_dir.path(), FULL_CONFIG);

    let config = Config::load_with(Some(&path)).unwrap();

    assert_eq!(config.steam.sidecar, "/usr/local/bin/steam-sidecar");
    assert_eq!(config.steam.account_name, "relaybot");
    assert_eq!(config.steam.password, "from-file");
    assert_eq!(config.steam.chatroom, "103582791429521412");

    let irc = config.irc.as_ref().unwrap();
    assert_eq!(irc.port, 6697);
    assert!(irc.tls);
    assert_eq!(irc.channel, "#relay");

    let slack = config.slack.as_ref().unwrap();
    assert_eq!(slack.bot_token, "xoxb-file");
    assert!(!slack.private);

    assert_eq!(config.watchdog.inactivity_threshold_secs, 7200);
    assert_eq!(config.watchdog.check_interval_secs, 120);
    assert_eq!(config.watchdog.reconnect_grace_secs, 5);
    assert_eq!(config.templates.message, "[{name}] {body}");
}

#[test]
#[serial]
fn test_config_path_env_var_is_used() {
    clear_config_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let path = write_config(temp_dir.path(), FULL_CONFIG);
    std::env::set_var("CHATRELAY_CONFIG_PATH", path.to_str().unwrap());

    let config = Config::load().unwrap();
    assert_eq!(config.steam.account_name, "relaybot");

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_env_vars_override_file_values() {
    clear_config_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let path = write_config(temp_dir.path(), FULL_CONFIG);
    let data_dir = temp_dir.path().join("state");

    std::env::set_var("STEAM_PASSWORD", "from-env");
    std::env::set_var("STEAM_AUTH_CODE", "ABCDE");
    std::env::set_var("SLACK_BOT_TOKEN", "xoxb-env");
    std::env::set_var("SLACK_APP_TOKEN", "xapp-env");
    std::env::set_var("IRC_PASSWORD", "irc-env");
    std::env::set_var("RELAY_DATA_DIR", data_dir.to_str().unwrap());

    let config = Config::load_with(Some(&path)).unwrap();

    assert_eq!(config.steam.password, "from-env");
    assert_eq!(config.steam.auth_code.as_deref(), Some("ABCDE"));
    let slack = config.slack.as_ref().unwrap();
    assert_eq!(slack.bot_token, "xoxb-env");
    assert_eq!(slack.app_token, "xapp-env");
    assert_eq!(config.irc.as_ref().unwrap().password.as_deref(), Some("irc-env"));
    assert_eq!(config.storage.data_dir(), data_dir);
    assert_eq!(config.storage.sentry_path(), data_dir.join("sentry"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_steam_password_is_removed_from_env_after_load() {
    clear_config_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let path = write_config(temp_dir.path(), FULL_CONFIG);
    std::env::set_var("STEAM_PASSWORD", "from-env");

    let config = Config::load_with(Some(&path)).unwrap();

    assert_eq!(config.steam.password, "from-env");
    assert!(std::env::var("STEAM_PASSWORD").is_err());
}

#[test]
#[serial]
fn test_password_can_come_from_env_only() {
    clear_config_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let path = write_config(
        temp_dir.path(),
        r#"
[steam]
account_name = "relaybot"
password = ""
chatroom = "103582791429521412"
"#,
    );

    let err = Config::load_with(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("steam.password"), "got: {err:#}");

    std::env::set_var("STEAM_PASSWORD", "from-env");
    let config = Config::load_with(Some(&path)).unwrap();
    assert_eq!(config.steam.password, "from-env");
    assert!(config.irc.is_none());
    assert!(config.slack.is_none());
}

#[test]
#[serial]
fn test_slack_tokens_required_when_section_present() {
    clear_config_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let path = write_config(
        temp_dir.path(),
        r#"
[steam]
account_name = "relaybot"
password = "secret"
chatroom = "103582791429521412"

[slack]
app_token = ""
bot_token = "xoxb-file"
channel = "relay"
"#,
    );

    let err = Config::load_with(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("slack"), "got: {err:#}");
}

#[test]
#[serial]
fn test_missing_file_reports_path() {
    clear_config_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("nope.toml");

    let err = Config::load_with(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("nope.toml"));
}

#[test]
#[serial]
fn test_malformed_toml_is_rejected() {
    clear_config_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let path = write_config(temp_dir.path(), "[steam\naccount_name = ");

    assert!(Config::load_with(Some(&path)).is_err());
}
