// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and provides sensible defaults for optional ones
use crate::format::Templates;
use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub steam: SteamConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irc: Option<IrcConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<SlackConfig>,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub templates: Templates,
    #[serde(default)]
    pub storage: StorageConfig,
}

// ─── SteamConfig ────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct SteamConfig {
    /// Helper process that owns the Steam client library
    #[serde(default = "default_sidecar")]
    pub sidecar: String,
    #[serde(default)]
    pub sidecar_args: Vec<String>,
    pub account_name: String,
    pub password: String,
    /// Steam Guard code, only needed until a sentry blob is cached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_code: Option<String>,
    /// Group chat room (64-bit SteamID of the clan chat)
    pub chatroom: String,
    /// Prefix for member profile links in presence lines
    #[serde(default = "default_profile_url")]
    pub profile_url: String,
}

// Custom Debug impl to redact password and auth_code
impl std::fmt::Debug for SteamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SteamConfig")
            .field("sidecar", &self.sidecar)
            .field("sidecar_args", &self.sidecar_args)
            .field("account_name", &self.account_name)
            .field("password", &"[REDACTED]")
            .field("auth_code", &self.auth_code.as_ref().map(|_| "[REDACTED]"))
            .field("chatroom", &self.chatroom)
            .field("profile_url", &self.profile_url)
            .finish()
    }
}

impl SteamConfig {
    /// Profile link for a member, e.g. https://steamcommunity.com/profiles/7656...
    pub fn profile_link(&self, steam_id: &str) -> String {
        format!("{}{}", self.profile_url, steam_id)
    }
}

fn default_sidecar() -> String {
    "chatrelay-steam-sidecar".to_string()
}

fn default_profile_url() -> String {
    "https://steamcommunity.com/profiles/".to_string()
}

// ─── IrcConfig ──────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    pub server: String,
    #[serde(default = "default_irc_port")]
    pub port: u16,
    pub nickname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default = "default_realname")]
    pub realname: String,
    pub channel: String,
    /// Server password sent with PASS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: bool,
}

// Custom Debug impl to redact the server password
impl std::fmt::Debug for IrcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrcConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("nickname", &self.nickname)
            .field("username", &self.username)
            .field("realname", &self.realname)
            .field("channel", &self.channel)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("tls", &self.tls)
            .finish()
    }
}

impl IrcConfig {
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nickname)
    }
}

fn default_irc_port() -> u16 {
    6667
}

fn default_realname() -> String {
    "chatrelay".to_string()
}

// ─── SlackConfig ────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub app_token: String,
    pub bot_token: String,
    /// Channel name (without #) or channel ID
    pub channel: String,
    /// Whether `channel` names a private channel
    #[serde(default)]
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steam_icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irc_icon_url: Option<String>,
}

// Custom Debug impl to redact app_token and bot_token
impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("app_token", &"[REDACTED]")
            .field("bot_token", &"[REDACTED]")
            .field("channel", &self.channel)
            .field("private", &self.private)
            .field("steam_icon_url", &self.steam_icon_url)
            .field("irc_icon_url", &self.irc_icon_url)
            .finish()
    }
}

// ─── WatchdogConfig ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_inactivity_threshold_secs")]
    pub inactivity_threshold_secs: u64,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_reconnect_grace_secs")]
    pub reconnect_grace_secs: u64,
}

impl WatchdogConfig {
    pub fn inactivity_threshold(&self) -> Duration {
        Duration::from_secs(self.inactivity_threshold_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_secs(self.reconnect_grace_secs)
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold_secs: default_inactivity_threshold_secs(),
            check_interval_secs: default_check_interval_secs(),
            reconnect_grace_secs: default_reconnect_grace_secs(),
        }
    }
}

fn default_inactivity_threshold_secs() -> u64 {
    3 * 3600 // 3 hours
}

fn default_check_interval_secs() -> u64 {
    300 // 5 minutes
}

fn default_reconnect_grace_secs() -> u64 {
    5
}

// ─── StorageConfig ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Where the server list and sentry files live (defaults to the XDG data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(paths::data_dir)
    }

    pub fn servers_path(&self) -> PathBuf {
        self.data_dir().join("servers")
    }

    pub fn sentry_path(&self) -> PathBuf {
        self.data_dir().join("sentry")
    }
}

/// `~` or a `~/` prefix becomes the home directory; anything else is kept.
/// Without a home directory the path is returned unchanged.
fn expand_tilde(path: &str) -> String {
    let rest = match path {
        "~" => "",
        _ => match path.strip_prefix("~/") {
            Some(rest) => rest,
            None => return path.to_string(),
        },
    };
    match directories::BaseDirs::new() {
        Some(base) => base.home_dir().join(rest).to_string_lossy().into_owned(),
        None => {
            tracing::warn!(path = %path, "Cannot expand ~ without a home directory");
            path.to_string()
        }
    }
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. CHATRELAY_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/chatrelay/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("CHATRELAY_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from the usual search locations
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Load configuration, preferring `explicit` over the search locations,
    /// then apply environment overrides and validate.
    pub fn load_with(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::find_config_file().ok_or_else(|| {
                anyhow::anyhow!(
                    "No config file found (set CHATRELAY_CONFIG_PATH, create ./config.toml or {})",
                    paths::config_file().display()
                )
            })?,
        };

        tracing::info!(path = %config_path.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let mut config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse without env overrides or validation
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str::<Config>(content)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("STEAM_ACCOUNT_NAME") {
            self.steam.account_name = val;
        }
        if let Ok(val) = std::env::var("STEAM_PASSWORD") {
            self.steam.password = val;
            // Read once, then scrubbed from the process environment
            std::env::remove_var("STEAM_PASSWORD");
        }
        if let Ok(val) = std::env::var("STEAM_AUTH_CODE") {
            self.steam.auth_code = Some(val);
        }
        if let Some(ref mut slack) = self.slack {
            if let Ok(val) = std::env::var("SLACK_BOT_TOKEN") {
                slack.bot_token = val;
            }
            if let Ok(val) = std::env::var("SLACK_APP_TOKEN") {
                slack.app_token = val;
            }
        }
        if let Some(ref mut irc) = self.irc {
            if let Ok(val) = std::env::var("IRC_PASSWORD") {
                irc.password = Some(val);
            }
        }
        if let Ok(val) = std::env::var("RELAY_DATA_DIR") {
            self.storage.data_dir = Some(val);
        }

        self.steam.sidecar = expand_tilde(&self.steam.sidecar);
        if let Some(dir) = self.storage.data_dir.take() {
            self.storage.data_dir = Some(expand_tilde(&dir));
        }
    }

    /// Check required fields and value ranges
    pub fn validate(&self) -> Result<()> {
        if self.steam.account_name.trim().is_empty() {
            anyhow::bail!(
                "steam.account_name is required (set in config.toml or STEAM_ACCOUNT_NAME env var)"
            );
        }
        if self.steam.password.is_empty() {
            anyhow::bail!("steam.password is required (set in config.toml or STEAM_PASSWORD env var)");
        }
        if self.steam.chatroom.trim().is_empty() {
            anyhow::bail!("steam.chatroom is required");
        }
        if self.steam.sidecar.trim().is_empty() {
            anyhow::bail!("steam.sidecar must name the helper binary");
        }

        if let Some(ref irc) = self.irc {
            if irc.server.trim().is_empty() {
                anyhow::bail!("irc.server is required when [irc] is present");
            }
            if irc.nickname.trim().is_empty() || irc.nickname.contains(char::is_whitespace) {
                anyhow::bail!("Invalid irc.nickname: {:?}", irc.nickname);
            }
            if !irc.channel.starts_with(['#', '&']) || irc.channel.contains([' ', ',']) {
                anyhow::bail!("Invalid irc.channel: {:?}", irc.channel);
            }
        }

        if let Some(ref slack) = self.slack {
            if slack.bot_token.trim().is_empty() || slack.app_token.trim().is_empty() {
                anyhow::bail!("slack.bot_token and slack.app_token are required when [slack] is present");
            }
            if slack.channel.trim().is_empty() {
                anyhow::bail!("slack.channel is required when [slack] is present");
            }
        }

        let watchdog = &self.watchdog;
        if watchdog.inactivity_threshold_secs == 0 || watchdog.check_interval_secs == 0 {
            anyhow::bail!("watchdog.inactivity_threshold_secs and watchdog.check_interval_secs must be > 0");
        }
        if watchdog.reconnect_grace_secs >= watchdog.check_interval_secs {
            anyhow::bail!(
                "watchdog.reconnect_grace_secs ({}) must be shorter than watchdog.check_interval_secs ({})",
                watchdog.reconnect_grace_secs,
                watchdog.check_interval_secs
            );
        }

        Ok(())
    }
}
