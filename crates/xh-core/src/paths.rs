use dirs::home_dir;
use std::path::PathBuf;

/// Returns the xh home directory, or None if the user's home cannot be resolved.
pub fn try_xh_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("XH_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".xh"))
}

/// Returns the canonical xh home directory (`~/.xh`).
///
/// Falls back to `./.xh` when neither `XH_HOME` nor a home directory is
/// available, which is the case for some service accounts on Android.
pub fn xh_home() -> PathBuf {
    try_xh_home().unwrap_or_else(|| PathBuf::from(".xh"))
}

/// Default configuration file: ~/.xh/config.toml
pub fn default_config_path() -> PathBuf {
    xh_home().join("config.toml")
}

/// Default data directory (containers, geodata, subscriptions): ~/.xh/data
pub fn default_data_dir() -> PathBuf {
    xh_home().join("data")
}

/// Default runtime directory (pid file, core logs): ~/.xh/run
pub fn default_run_dir() -> PathBuf {
    xh_home().join("run")
}

/// Default binary directory: ~/.xh/bin
pub fn bin_path() -> PathBuf {
    xh_home().join("bin")
}
