//! Configuration file and the per-run context.
//!
//! The configuration is a TOML file loaded once by the binary. It is then
//! bundled with an HTTP client into a [`Context`] that every workflow entry
//! point takes explicitly.
//!
//! ```toml
//! [core]
//! type = "sing-box"
//! path = "/data/adb/xh/bin/sing-box"
//! config = "/data/adb/xh/confs/config.json"
//! data_dir = "/data/adb/xh/data"
//!
//! [subscribe]
//! sources = ["https://sub.example.com/feed"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xh_schema::{CoreType, UnsupportedCoreType};

use crate::paths::{bin_path, default_data_dir, default_run_dir, xh_home};

const XRAY_DOWNLOAD_URL: &str =
    "https://github.com/XTLS/Xray-core/releases/latest/download/Xray-android-arm64-v8a.zip";
const SINGBOX_RELEASE_API: &str = "https://api.github.com/repos/SagerNet/sing-box/releases/latest";
const SINGBOX_ASSET_PATTERN: &str = "android-arm64.tar.gz";
const GEOIP_URL: &str =
    "https://github.com/Loyalsoldier/v2ray-rules-dat/releases/latest/download/geoip.dat";
const GEOSITE_URL: &str =
    "https://github.com/Loyalsoldier/v2ray-rules-dat/releases/latest/download/geosite.dat";
const TUN2SOCKS_URL: &str = "https://github.com/heiher/hev-socks5-tunnel/releases/latest/download/hev-socks5-tunnel-linux-arm64";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    CoreType(#[from] UnsupportedCoreType),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub core: CoreSection,
    pub update: UpdateSection,
    pub subscribe: SubscribeSection,
}

/// The `[core]` section: which core is managed and where it lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSection {
    /// Core name as written by the user. Parsed lazily via [`Self::core_type`]
    /// so an unknown name fails at the start of an update, not at load time.
    #[serde(rename = "type")]
    pub core_type: String,
    /// Final path of the core executable. Defaults to `~/.xh/bin/<core>`.
    pub path: Option<PathBuf>,
    /// Core configuration (a directory for xray, a file for sing-box).
    pub config: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub run_dir: PathBuf,
    /// Explicit start arguments, replacing the per-core defaults.
    pub args: Option<Vec<String>>,
}

impl Default for CoreSection {
    fn default() -> Self {
        Self {
            core_type: CoreType::default().as_str().to_string(),
            path: None,
            config: None,
            data_dir: default_data_dir(),
            run_dir: default_run_dir(),
            args: None,
        }
    }
}

impl CoreSection {
    /// Parse the configured core name.
    pub fn core_type(&self) -> Result<CoreType, UnsupportedCoreType> {
        self.core_type.parse()
    }

    /// Final swap target for `core`.
    pub fn core_path(&self, core: CoreType) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| bin_path().join(core.binary_name()))
    }

    /// Core configuration path, defaulting to `~/.xh/confs`.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| xh_home().join("confs"))
    }
}

/// The `[update]` section: remote locations of every downloadable asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSection {
    pub xray_url: String,
    pub singbox_release_api: String,
    /// Substring an asset name must contain to be picked from a release.
    pub asset_pattern: String,
    pub geoip_url: String,
    pub geosite_url: String,
    pub tun2socks_url: String,
    /// Upper bound for every single HTTP request.
    pub timeout_secs: u64,
}

impl Default for UpdateSection {
    fn default() -> Self {
        Self {
            xray_url: XRAY_DOWNLOAD_URL.to_string(),
            singbox_release_api: SINGBOX_RELEASE_API.to_string(),
            asset_pattern: SINGBOX_ASSET_PATTERN.to_string(),
            geoip_url: GEOIP_URL.to_string(),
            geosite_url: GEOSITE_URL.to_string(),
            tun2socks_url: TUN2SOCKS_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

/// The `[subscribe]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscribeSection {
    /// Feed URLs, processed in order.
    pub sources: Vec<String>,
    /// Output file name inside the data directory.
    pub output: String,
}

impl Default for SubscribeSection {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            output: "sub.txt".to_string(),
        }
    }
}

impl Config {
    /// Load and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Where the aggregated subscription feed is written.
    pub fn subscription_output(&self) -> PathBuf {
        self.core.data_dir.join(&self.subscribe.output)
    }
}

/// Configuration plus the shared HTTP client, built once per run.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub client: reqwest::Client,
}

impl Context {
    /// Build a context with a client bounded by `update.timeout_secs`.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(Duration::from_secs(config.update.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn with_client(config: Config, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.core.core_type().unwrap(), CoreType::Xray);
        assert_eq!(config.update.asset_pattern, "android-arm64.tar.gz");
        assert_eq!(config.update.timeout_secs, 60);
        assert!(config.subscribe.sources.is_empty());
        assert_eq!(config.subscribe.output, "sub.txt");
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            [core]
            type = "sing-box"
            path = "/opt/xh/bin/sing-box"
            data_dir = "/opt/xh/data"

            [update]
            asset_pattern = "linux-amd64.tar.gz"

            [subscribe]
            sources = ["https://a.example/sub", "https://b.example/sub"]
            "#,
        )
        .unwrap();

        let core = config.core.core_type().unwrap();
        assert_eq!(core, CoreType::SingBox);
        assert_eq!(
            config.core.core_path(core),
            PathBuf::from("/opt/xh/bin/sing-box")
        );
        assert_eq!(
            config.subscription_output(),
            PathBuf::from("/opt/xh/data/sub.txt")
        );
        assert_eq!(config.subscribe.sources.len(), 2);
        assert_eq!(config.update.asset_pattern, "linux-amd64.tar.gz");
    }

    #[test]
    fn test_unknown_core_type_is_lazy() {
        let config = Config::from_toml("[core]\ntype = \"clash\"\n").unwrap();
        assert!(config.core.core_type().is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("[core\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
