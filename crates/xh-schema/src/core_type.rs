//! Proxy core identity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a configured core name is not one xh knows how to update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported core type: {0}")]
pub struct UnsupportedCoreType(pub String);

/// The proxy core executable being managed.
///
/// The variant decides the name of the executable inside a release
/// container and the container family it ships in.
///
/// # Example
///
/// ```
/// use xh_schema::CoreType;
///
/// let core: CoreType = "sing-box".parse().unwrap();
/// assert_eq!(core.binary_name(), "sing-box");
/// assert!("clash".parse::<CoreType>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CoreType {
    /// Xray-core, released as a zip archive.
    #[default]
    #[serde(rename = "xray")]
    Xray,
    /// sing-box, released as a gzip-compressed tarball.
    #[serde(rename = "sing-box")]
    SingBox,
}

impl CoreType {
    /// Canonical configuration spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xray => "xray",
            Self::SingBox => "sing-box",
        }
    }

    /// Base name of the executable entry inside a release container.
    pub fn binary_name(&self) -> &'static str {
        // Release archives name the executable after the core itself.
        self.as_str()
    }

    /// File name used for the downloaded container in the data directory.
    pub fn container_file_name(&self) -> &'static str {
        match self {
            Self::Xray => "xray.zip",
            Self::SingBox => "sing-box.tar.gz",
        }
    }
}

impl std::fmt::Display for CoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CoreType {
    type Err = UnsupportedCoreType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "xray" => Ok(Self::Xray),
            "sing-box" => Ok(Self::SingBox),
            other => Err(UnsupportedCoreType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_cores() {
        assert_eq!("xray".parse::<CoreType>(), Ok(CoreType::Xray));
        assert_eq!(" sing-box ".parse::<CoreType>(), Ok(CoreType::SingBox));
    }

    #[test]
    fn test_parse_unknown_core() {
        let err = "v2ray".parse::<CoreType>().unwrap_err();
        assert_eq!(err, UnsupportedCoreType("v2ray".to_string()));
        assert_eq!(err.to_string(), "unsupported core type: v2ray");
    }

    #[test]
    fn test_container_names() {
        assert_eq!(CoreType::Xray.container_file_name(), "xray.zip");
        assert_eq!(CoreType::SingBox.container_file_name(), "sing-box.tar.gz");
        assert_eq!(CoreType::SingBox.to_string(), "sing-box");
    }
}
