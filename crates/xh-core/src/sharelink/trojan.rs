//! `trojan://<password>@host:port?sni=...#name` links. TLS is implied.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use xh_schema::{NodeDescriptor, ProtocolKind};

use super::{
    ShareLink, ShareLinkError, TRANSPORT_QUERY, decode_component, map_query, parse_uri,
    stream_settings, summary_line,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trojan {
    node: NodeDescriptor,
}

impl Trojan {
    /// Parse everything after `trojan://`.
    pub fn parse(rest: &str) -> Result<Self, ShareLinkError> {
        let parts = parse_uri(rest)?;

        let mut fields = BTreeMap::new();
        fields.insert("password".to_string(), decode_component(&parts.credential));
        map_query(&parts.query, TRANSPORT_QUERY, &mut fields);
        fields
            .entry("security".to_string())
            .or_insert_with(|| "tls".to_string());

        let node = NodeDescriptor::new(
            parts.name,
            ProtocolKind::Trojan,
            parts.address,
            parts.port,
            fields,
        )?;
        Ok(Self { node })
    }
}

impl ShareLink for Trojan {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.node
    }

    fn summarize(&self) -> String {
        summary_line(&self.node, &["network", "sni"])
    }

    fn to_outbound(&self, tag: &str) -> Result<Value, ShareLinkError> {
        let node = &self.node;
        Ok(json!({
            "tag": tag,
            "protocol": "trojan",
            "settings": {
                "servers": [{
                    "address": node.address(),
                    "port": node.port(),
                    "password": node.field("password").unwrap_or_default(),
                }],
            },
            "streamSettings": stream_settings(node),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_sni() {
        let trojan =
            Trojan::parse("p%40ss@t.example.com:443?sni=front.example.com#HK%201").unwrap();
        let node = trojan.descriptor();

        assert_eq!(node.node_name(), "HK 1");
        assert_eq!(node.protocol_kind(), ProtocolKind::Trojan);
        assert_eq!(node.field("password"), Some("p@ss"));
        assert_eq!(node.field("sni"), Some("front.example.com"));
        assert_eq!(node.field("security"), Some("tls"));
    }

    #[test]
    fn test_outbound() {
        let outbound = Trojan::parse("secret@t.example.com:8443?type=ws&path=%2Ftj#t")
            .unwrap()
            .to_outbound("trojan-out")
            .unwrap();

        let server = &outbound["settings"]["servers"][0];
        assert_eq!(server["password"], "secret");
        assert_eq!(server["port"], 8443);
        assert_eq!(outbound["streamSettings"]["network"], "ws");
        assert_eq!(outbound["streamSettings"]["wsSettings"]["path"], "/tj");
        assert_eq!(
            outbound["streamSettings"]["tlsSettings"]["serverName"],
            "t.example.com"
        );
    }

    #[test]
    fn test_summary_omits_password() {
        let trojan = Trojan::parse("secret@t.example.com:443#T").unwrap();
        let summary = trojan.summarize();
        assert_eq!(summary, "[Trojan] T @ t.example.com:443");
        assert!(!summary.contains("secret"));
    }

    #[test]
    fn test_bad_port() {
        let err = Trojan::parse("secret@t.example.com:-1#T").unwrap_err();
        assert!(matches!(err, ShareLinkError::InvalidPort(_)));
    }
}
