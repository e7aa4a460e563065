//! Protocol-agnostic node descriptor.
//!
//! Every share link, whatever its grammar, is reduced to a [`NodeDescriptor`]:
//! a name, an endpoint and a flat map of protocol-specific fields. A
//! descriptor is validated on construction and never mutated afterwards.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Proxy protocol a node speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// Shadowsocks (`ss://`).
    Shadowsocks,
    /// VMess (`vmess://`).
    Vmess,
    /// VLESS (`vless://`).
    Vless,
    /// Trojan (`trojan://`).
    Trojan,
}

impl ProtocolKind {
    /// Lowercase protocol name, as used by core configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shadowsocks => "shadowsocks",
            Self::Vmess => "vmess",
            Self::Vless => "vless",
            Self::Trojan => "trojan",
        }
    }

    /// Human-readable name for summaries.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Shadowsocks => "Shadowsocks",
            Self::Vmess => "VMess",
            Self::Vless => "VLESS",
            Self::Trojan => "Trojan",
        }
    }
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected descriptor construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// Port 0 is not a connectable endpoint.
    #[error("port must be in 1-65535")]
    ZeroPort,

    /// The server address was empty.
    #[error("address is empty")]
    EmptyAddress,
}

/// One parsed proxy node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDescriptor {
    node_name: String,
    protocol_kind: ProtocolKind,
    address: String,
    port: u16,
    protocol_fields: BTreeMap<String, String>,
}

impl NodeDescriptor {
    /// Build a descriptor, rejecting an empty address or port 0.
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::BTreeMap;
    /// use xh_schema::{NodeDescriptor, ProtocolKind};
    ///
    /// let node = NodeDescriptor::new("hk-1", ProtocolKind::Trojan, "hk.example.com", 443, BTreeMap::new())
    ///     .unwrap();
    /// assert_eq!(node.endpoint(), "hk.example.com:443");
    /// ```
    pub fn new(
        node_name: impl Into<String>,
        protocol_kind: ProtocolKind,
        address: impl Into<String>,
        port: u16,
        protocol_fields: BTreeMap<String, String>,
    ) -> Result<Self, NodeError> {
        let address = address.into();
        if address.is_empty() {
            return Err(NodeError::EmptyAddress);
        }
        if port == 0 {
            return Err(NodeError::ZeroPort);
        }
        Ok(Self {
            node_name: node_name.into(),
            protocol_kind,
            address,
            port,
            protocol_fields,
        })
    }

    /// Display name of the node (decoded from the link).
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Protocol of the node.
    pub fn protocol_kind(&self) -> ProtocolKind {
        self.protocol_kind
    }

    /// Server host name or IP literal (IPv6 without brackets).
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Server port, always in 1-65535.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Protocol-specific fields such as `method`/`password` or `uuid`.
    pub fn protocol_fields(&self) -> &BTreeMap<String, String> {
        &self.protocol_fields
    }

    /// Look up a single protocol field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.protocol_fields.get(key).map(String::as_str)
    }

    /// `address:port`, bracketing IPv6 literals.
    pub fn endpoint(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}
