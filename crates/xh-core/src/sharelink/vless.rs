//! `vless://<uuid>@host:port?type=ws&security=tls&...#name` links.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use xh_schema::{NodeDescriptor, ProtocolKind};

use super::{
    ShareLink, ShareLinkError, TRANSPORT_QUERY, decode_component, map_query, parse_uri,
    stream_settings, summary_line,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vless {
    node: NodeDescriptor,
}

impl Vless {
    /// Parse everything after `vless://`.
    pub fn parse(rest: &str) -> Result<Self, ShareLinkError> {
        let parts = parse_uri(rest)?;

        let mut fields = BTreeMap::new();
        fields.insert("uuid".to_string(), decode_component(&parts.credential));
        map_query(&parts.query, TRANSPORT_QUERY, &mut fields);
        map_query(
            &parts.query,
            &[("flow", "flow"), ("encryption", "encryption")],
            &mut fields,
        );

        let node = NodeDescriptor::new(
            parts.name,
            ProtocolKind::Vless,
            parts.address,
            parts.port,
            fields,
        )?;
        Ok(Self { node })
    }
}

impl ShareLink for Vless {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.node
    }

    fn summarize(&self) -> String {
        summary_line(&self.node, &["network", "security", "flow"])
    }

    fn to_outbound(&self, tag: &str) -> Result<Value, ShareLinkError> {
        let node = &self.node;
        let mut user = json!({
            "id": node.field("uuid").unwrap_or_default(),
            "encryption": node.field("encryption").unwrap_or("none"),
        });
        if let Some(flow) = node.field("flow") {
            user["flow"] = json!(flow);
        }

        Ok(json!({
            "tag": tag,
            "protocol": "vless",
            "settings": {
                "vnext": [{
                    "address": node.address(),
                    "port": node.port(),
                    "users": [user],
                }],
            },
            "streamSettings": stream_settings(node),
        }))
    }
}
