//! `ss://` links in SIP002 form: `ss://<base64(method:password)>@host:port#name`.

use std::collections::BTreeMap;

use serde_json::Value;
use xh_schema::{NodeDescriptor, ProtocolKind};

use super::{ShareLink, ShareLinkError, decode_component, parse_uri, summary_line};
use crate::feed::decode_base64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shadowsocks {
    node: NodeDescriptor,
}

impl Shadowsocks {
    /// Parse everything after `ss://`.
    pub fn parse(rest: &str) -> Result<Self, ShareLinkError> {
        let parts = parse_uri(rest)?;

        let userinfo = decode_component(&parts.credential);
        let decoded = decode_base64(&userinfo).map_err(|source| ShareLinkError::Decode {
            segment: "userinfo",
            source,
        })?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| ShareLinkError::malformed("userinfo", "is not UTF-8"))?;
        let (method, password) = decoded
            .split_once(':')
            .ok_or_else(|| ShareLinkError::malformed("userinfo", "is missing ':'"))?;

        let mut fields = BTreeMap::new();
        fields.insert("method".to_string(), method.to_string());
        fields.insert("password".to_string(), password.to_string());
        if let Some(plugin) = parts.query.get("plugin").filter(|p| !p.is_empty()) {
            fields.insert("plugin".to_string(), plugin.clone());
        }

        let node = NodeDescriptor::new(
            parts.name,
            ProtocolKind::Shadowsocks,
            parts.address,
            parts.port,
            fields,
        )?;
        Ok(Self { node })
    }
}

impl ShareLink for Shadowsocks {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.node
    }

    fn summarize(&self) -> String {
        summary_line(&self.node, &["method", "plugin"])
    }

    fn to_outbound(&self, _tag: &str) -> Result<Value, ShareLinkError> {
        Err(ShareLinkError::NotImplemented(ProtocolKind::Shadowsocks))
    }
}
