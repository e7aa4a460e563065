//! `vmess://` links: a base64-wrapped JSON object in the v2 layout.
//!
//! ```json
//! {"v": "2", "ps": "name", "add": "host", "port": "443", "id": "<uuid>",
//!  "aid": "0", "scy": "auto", "net": "ws", "type": "none",
//!  "host": "cdn.example.com", "path": "/ray", "tls": "tls", "sni": ""}
//! ```
//!
//! Numeric fields are accepted either as JSON numbers or as strings.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use xh_schema::{NodeDescriptor, ProtocolKind};

use super::{ShareLink, ShareLinkError, parse_port, stream_settings, summary_line};
use crate::feed::decode_base64;

/// JSON keys copied into the descriptor, with their normalized names.
const FIELDS: &[(&str, &str)] = &[
    ("aid", "alter_id"),
    ("scy", "cipher"),
    ("net", "network"),
    ("type", "header_type"),
    ("host", "host"),
    ("path", "path"),
    ("tls", "security"),
    ("sni", "sni"),
    ("alpn", "alpn"),
    ("fp", "fingerprint"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vmess {
    node: NodeDescriptor,
}

/// A scalar JSON value as trimmed text; absent, null and empty are `None`.
fn scalar(obj: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match obj.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

impl Vmess {
    /// Parse everything after `vmess://`.
    pub fn parse(rest: &str) -> Result<Self, ShareLinkError> {
        let decoded = decode_base64(rest).map_err(|source| ShareLinkError::Decode {
            segment: "body",
            source,
        })?;
        let body: Value = serde_json::from_slice(&decoded)
            .map_err(|e| ShareLinkError::malformed("body", format!("is not JSON: {e}")))?;
        let obj = body
            .as_object()
            .ok_or_else(|| ShareLinkError::malformed("body", "is not a JSON object"))?;

        let address = scalar(obj, "add")
            .ok_or_else(|| ShareLinkError::malformed("add", "is missing"))?;
        let port = match scalar(obj, "port") {
            Some(port) => parse_port(&port)?,
            None => return Err(ShareLinkError::malformed("port", "is missing")),
        };
        let uuid = scalar(obj, "id").ok_or_else(|| ShareLinkError::malformed("id", "is missing"))?;
        let name = scalar(obj, "ps").unwrap_or_else(|| format!("{address}:{port}"));

        let mut fields = BTreeMap::new();
        fields.insert("uuid".to_string(), uuid);
        for (key, normalized) in FIELDS {
            if let Some(value) = scalar(obj, key) {
                fields.insert((*normalized).to_string(), value);
            }
        }

        let node = NodeDescriptor::new(name, ProtocolKind::Vmess, address, port, fields)?;
        Ok(Self { node })
    }
}

impl ShareLink for Vmess {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.node
    }

    fn summarize(&self) -> String {
        summary_line(&self.node, &["network", "security", "cipher"])
    }

    fn to_outbound(&self, tag: &str) -> Result<Value, ShareLinkError> {
        let node = &self.node;
        let alter_id: u32 = node
            .field("alter_id")
            .and_then(|a| a.parse().ok())
            .unwrap_or(0);

        Ok(json!({
            "tag": tag,
            "protocol": "vmess",
            "settings": {
                "vnext": [{
                    "address": node.address(),
                    "port": node.port(),
                    "users": [{
                        "id": node.field("uuid").unwrap_or_default(),
                        "alterId": alter_id,
                        "security": node.field("cipher").unwrap_or("auto"),
                    }],
                }],
            },
            "streamSettings": stream_settings(node),
        }))
    }
}
