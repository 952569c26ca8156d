// ABOUTME: XDG Base Directory paths for config, logs and the Steam cache files
// ABOUTME: Falls back to the working directory when no home directory is available

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "chatrelay", "chatrelay")
}

/// Default home of the `servers` and `sentry` cache files
/// (e.g. ~/.local/share/chatrelay/), `./data` without a home directory
pub fn data_dir() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        None => PathBuf::from("data"),
    }
}

/// Rolling JSON logs. Uses the XDG state dir where the platform has one.
pub fn log_dir() -> PathBuf {
    project_dirs()
        .and_then(|dirs| dirs.state_dir().map(|state| state.join("logs")))
        .unwrap_or_else(|| data_dir().join("logs"))
}

/// ~/.config/chatrelay/config.toml, the last place the loader looks
pub fn config_file() -> PathBuf {
    let dir = match project_dirs() {
        Some(dirs) => dirs.config_dir().to_path_buf(),
        None => PathBuf::from("."),
    };
    dir.join("config.toml")
}
