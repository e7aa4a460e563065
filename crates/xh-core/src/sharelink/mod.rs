//! Share-link parsing.
//!
//! A share link is a single-line URI such as
//! `ss://<base64 userinfo>@host:port#name`. Each scheme has its own grammar
//! and is handled by one variant type implementing [`ShareLink`]; the
//! [`ShareLinkRegistry`] maps scheme names to variant parsers.
//!
//! Every variant yields the same [`NodeDescriptor`] shape, built only once
//! the whole link has been parsed. Field names in
//! [`NodeDescriptor::protocol_fields`] are normalized across schemes
//! (`uuid`, `network`, `security`, `sni`, `host`, `path`, ...).

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value, json};
use thiserror::Error;
use xh_schema::{NodeDescriptor, NodeError, ProtocolKind};

pub mod shadowsocks;
pub mod trojan;
pub mod vless;
pub mod vmess;

pub use shadowsocks::Shadowsocks;
pub use trojan::Trojan;
pub use vless::Vless;
pub use vmess::Vmess;

#[derive(Error, Debug)]
pub enum ShareLinkError {
    #[error("Unrecognized share link scheme '{0}'")]
    UnrecognizedScheme(String),

    #[error("Malformed share link: {segment} {reason}")]
    MalformedShareLink {
        segment: &'static str,
        reason: String,
    },

    #[error("Invalid port '{0}'")]
    InvalidPort(String),

    #[error("Invalid base64 in {segment}: {source}")]
    Decode {
        segment: &'static str,
        source: base64::DecodeError,
    },

    #[error("Outbound rendering is not implemented for {0}")]
    NotImplemented(ProtocolKind),

    #[error(transparent)]
    Node(#[from] NodeError),
}

impl ShareLinkError {
    pub(crate) fn malformed(segment: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedShareLink {
            segment,
            reason: reason.into(),
        }
    }
}

/// One parsed share link.
pub trait ShareLink: fmt::Debug + Send + Sync {
    /// The validated node this link describes.
    fn descriptor(&self) -> &NodeDescriptor;

    /// One-line description for diagnostics. Secrets are never included.
    fn summarize(&self) -> String;

    /// Core outbound configuration for this node, tagged `tag`.
    ///
    /// Variants without a renderer return [`ShareLinkError::NotImplemented`].
    fn to_outbound(&self, tag: &str) -> Result<Value, ShareLinkError>;
}

/// Parses the part of a link after `<scheme>://`.
pub type ParseFn = fn(&str) -> Result<Box<dyn ShareLink>, ShareLinkError>;

/// Scheme name to parser table.
#[derive(Clone)]
pub struct ShareLinkRegistry {
    parsers: HashMap<String, ParseFn>,
}

impl fmt::Debug for ShareLinkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes = self.schemes();
        schemes.sort_unstable();
        f.debug_struct("ShareLinkRegistry")
            .field("schemes", &schemes)
            .finish()
    }
}

impl Default for ShareLinkRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl ShareLinkRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// A registry with `ss`, `vmess`, `vless` and `trojan`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("ss", |rest| Ok(Box::new(Shadowsocks::parse(rest)?)));
        registry.register("vmess", |rest| Ok(Box::new(Vmess::parse(rest)?)));
        registry.register("vless", |rest| Ok(Box::new(Vless::parse(rest)?)));
        registry.register("trojan", |rest| Ok(Box::new(Trojan::parse(rest)?)));
        registry
    }

    /// Register `parser` for links starting with `<scheme>://`, replacing
    /// any previous parser for that scheme.
    pub fn register(&mut self, scheme: &str, parser: ParseFn) {
        self.parsers.insert(scheme.to_ascii_lowercase(), parser);
    }

    pub fn schemes(&self) -> Vec<&str> {
        self.parsers.keys().map(String::as_str).collect()
    }

    /// Parse one line. Surrounding whitespace is ignored and the scheme is
    /// matched case-insensitively.
    pub fn parse(&self, line: &str) -> Result<Box<dyn ShareLink>, ShareLinkError> {
        let line = line.trim();
        let Some((scheme, rest)) = line.split_once("://") else {
            return Err(ShareLinkError::UnrecognizedScheme(String::new()));
        };
        let parser = self
            .parsers
            .get(&scheme.to_ascii_lowercase())
            .ok_or_else(|| ShareLinkError::UnrecognizedScheme(scheme.to_string()))?;
        parser(rest)
    }
}

/// Percent-decode a URI component.
pub(crate) fn decode_component(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Percent-decode a query value or node name, where `+` is a space.
pub(crate) fn decode_form(s: &str) -> String {
    decode_component(&s.replace('+', " "))
}

/// Validate a port string: an integer in 1-65535.
pub(crate) fn parse_port(s: &str) -> Result<u16, ShareLinkError> {
    match s.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ShareLinkError::InvalidPort(s.to_string())),
    }
}

/// Split `host:port` on the last `:`, unbracketing IPv6 literals.
pub(crate) fn split_server(server: &str) -> Result<(String, u16), ShareLinkError> {
    let (host, port) = server
        .rsplit_once(':')
        .ok_or_else(|| ShareLinkError::malformed("server", "is missing ':'"))?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    Ok((host.to_string(), parse_port(port)?))
}

/// Components shared by `credential@host:port[/][?query]#name` links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UriParts {
    /// Userinfo, still percent-encoded.
    pub credential: String,
    pub address: String,
    pub port: u16,
    /// Raw query keys, decoded values.
    pub query: BTreeMap<String, String>,
    pub name: String,
}

pub(crate) fn parse_uri(rest: &str) -> Result<UriParts, ShareLinkError> {
    let (body, name) = rest
        .rsplit_once('#')
        .ok_or_else(|| ShareLinkError::malformed("name", "is missing '#'"))?;
    let (credential, server) = body
        .split_once('@')
        .ok_or_else(|| ShareLinkError::malformed("userinfo", "is missing '@'"))?;
    if credential.is_empty() {
        return Err(ShareLinkError::malformed("userinfo", "is empty"));
    }

    let (server, query) = server.split_once('?').unwrap_or((server, ""));
    let (address, port) = split_server(server.trim_end_matches('/'))?;

    let query = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_form(k), decode_form(v))
        })
        .collect();

    Ok(UriParts {
        credential: credential.to_string(),
        address,
        port,
        query,
        name: decode_form(name),
    })
}

/// Copy non-empty `query` values into `fields` under normalized names.
pub(crate) fn map_query(
    query: &BTreeMap<String, String>,
    names: &[(&str, &str)],
    fields: &mut BTreeMap<String, String>,
) {
    for (raw, normalized) in names {
        if let Some(value) = query.get(*raw).filter(|v| !v.is_empty()) {
            fields.insert((*normalized).to_string(), value.clone());
        }
    }
}

/// Query keys used by the URI-shaped variants for transport and TLS.
pub(crate) const TRANSPORT_QUERY: &[(&str, &str)] = &[
    ("type", "network"),
    ("security", "security"),
    ("sni", "sni"),
    ("host", "host"),
    ("path", "path"),
    ("serviceName", "service_name"),
    ("headerType", "header_type"),
    ("alpn", "alpn"),
    ("fp", "fingerprint"),
    ("pbk", "public_key"),
    ("sid", "short_id"),
    ("allowInsecure", "allow_insecure"),
];

/// `[Kind] name @ endpoint key=value ...` with only the present keys.
pub(crate) fn summary_line(node: &NodeDescriptor, keys: &[&str]) -> String {
    let mut line = format!(
        "[{}] {} @ {}",
        node.protocol_kind().display_name(),
        node.node_name(),
        node.endpoint()
    );
    for key in keys {
        if let Some(value) = node.field(key) {
            line.push_str(&format!(" {key}={value}"));
        }
    }
    line
}

/// Transport and TLS settings of an outbound, from normalized fields.
pub(crate) fn stream_settings(node: &NodeDescriptor) -> Value {
    let network = node.field("network").unwrap_or("tcp");
    let security = match node.field("security") {
        Some("") | None => "none",
        Some(s) => s,
    };

    let mut stream = Map::new();
    stream.insert("network".to_string(), json!(network));
    stream.insert("security".to_string(), json!(security));

    match network {
        "ws" => {
            let mut ws = Map::new();
            ws.insert("path".to_string(), json!(node.field("path").unwrap_or("/")));
            if let Some(host) = node.field("host") {
                ws.insert("headers".to_string(), json!({ "Host": host }));
            }
            stream.insert("wsSettings".to_string(), Value::Object(ws));
        }
        "grpc" => {
            let service = node
                .field("service_name")
                .or_else(|| node.field("path"))
                .unwrap_or_default();
            stream.insert(
                "grpcSettings".to_string(),
                json!({ "serviceName": service }),
            );
        }
        _ => {}
    }

    let server_name = node
        .field("sni")
        .or_else(|| node.field("host"))
        .unwrap_or(node.address());
    match security {
        "tls" => {
            let mut tls = Map::new();
            tls.insert("serverName".to_string(), json!(server_name));
            if let Some(alpn) = node.field("alpn") {
                tls.insert(
                    "alpn".to_string(),
                    json!(alpn.split(',').collect::<Vec<_>>()),
                );
            }
            if let Some(fp) = node.field("fingerprint") {
                tls.insert("fingerprint".to_string(), json!(fp));
            }
            if matches!(node.field("allow_insecure"), Some("1" | "true")) {
                tls.insert("allowInsecure".to_string(), json!(true));
            }
            stream.insert("tlsSettings".to_string(), Value::Object(tls));
        }
        "reality" => {
            stream.insert(
                "realitySettings".to_string(),
                json!({
                    "serverName": server_name,
                    "publicKey": node.field("public_key").unwrap_or_default(),
                    "shortId": node.field("short_id").unwrap_or_default(),
                    "fingerprint": node.field("fingerprint").unwrap_or("chrome"),
                }),
            );
        }
        _ => {}
    }

    Value::Object(stream)
}
