//! Subscription aggregation and node resolution.
//!
//! Sources are fetched one at a time in configuration order. Each body is
//! base64-decoded as a whole and its lines appended to an
//! [`AggregatedFeed`]. A source that fails to fetch or decode is logged and
//! skipped; the rest are still attempted.

use std::path::{Path, PathBuf};

use reqwest::Client;
use thiserror::Error;

use crate::config::Context;
use crate::feed::{FeedError, decode_feed, feed_lines};
use crate::io::download::{DownloadError, fetch_bytes};
use crate::sharelink::{ShareLink, ShareLinkError, ShareLinkRegistry};

#[derive(Error, Debug)]
pub enum SubscribeError {
    #[error("Failed to fetch subscription: {0}")]
    Network(#[from] DownloadError),

    #[error("Failed to decode subscription: {0}")]
    Decode(#[from] FeedError),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A remote feed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSource {
    pub url: String,
}

impl From<&str> for SubscriptionSource {
    fn from(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }
}

/// Share-link lines from every source, in source then line order.
/// Duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedFeed {
    lines: Vec<String>,
}

impl AggregatedFeed {
    /// Append the lines of one decoded body.
    pub fn push_block(&mut self, text: &str) -> usize {
        let before = self.lines.len();
        self.lines.extend(feed_lines(text).map(str::to_string));
        self.lines.len() - before
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// One link per line, newline-terminated.
    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }
}

/// A source that was skipped.
#[derive(Debug)]
pub struct SourceFailure {
    pub url: String,
    pub error: SubscribeError,
}

/// Outcome of aggregating a list of sources.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub feed: AggregatedFeed,
    pub succeeded: usize,
    pub failures: Vec<SourceFailure>,
}

/// Counts for one subscription update.
#[derive(Debug, Default)]
pub struct SubscriptionReport {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<SourceFailure>,
    pub lines: usize,
    /// Output file, when anything was written.
    pub written: Option<PathBuf>,
}

impl SubscriptionReport {
    /// At least one source was configured and none produced a feed.
    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.succeeded == 0
    }
}

/// Fetch and decode a single source.
pub async fn fetch_source(
    client: &Client,
    source: &SubscriptionSource,
) -> Result<String, SubscribeError> {
    let body = fetch_bytes(client, &source.url).await?;
    Ok(decode_feed(&body)?)
}

/// Fetch every source in order, isolating per-source failures.
pub async fn aggregate_feeds(client: &Client, sources: &[SubscriptionSource]) -> Aggregation {
    let mut aggregation = Aggregation::default();

    for source in sources {
        match fetch_source(client, source).await {
            Ok(text) => {
                let added = aggregation.feed.push_block(&text);
                aggregation.succeeded += 1;
                tracing::info!("Fetched {added} links from {}", source.url);
            }
            Err(error) => {
                tracing::warn!("Skipping subscription {}: {error}", source.url);
                aggregation.failures.push(SourceFailure {
                    url: source.url.clone(),
                    error,
                });
            }
        }
    }

    aggregation
}

/// Write the feed as one whole-file write, creating the parent directory.
pub async fn write_feed(feed: &AggregatedFeed, path: &Path) -> Result<(), SubscribeError> {
    let write_err = |source| SubscribeError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    tokio::fs::write(path, feed.to_text()).await.map_err(write_err)
}

/// Refresh the subscription output from every configured source.
///
/// Never fails because sources failed: when nothing was fetched, nothing is
/// written and the report says so. Only a failure to write the output is
/// an error.
pub async fn update_subscriptions(ctx: &Context) -> Result<SubscriptionReport, SubscribeError> {
    let sources: Vec<SubscriptionSource> = ctx
        .config
        .subscribe
        .sources
        .iter()
        .map(|url| SubscriptionSource::from(url.as_str()))
        .collect();

    let Aggregation {
        feed,
        succeeded,
        failures,
    } = aggregate_feeds(&ctx.client, &sources).await;

    let mut report = SubscriptionReport {
        total: sources.len(),
        succeeded,
        failures,
        lines: feed.len(),
        written: None,
    };

    if feed.is_empty() {
        tracing::warn!(
            "No share links fetched from {} source(s), leaving output untouched",
            report.total
        );
        return Ok(report);
    }

    let output = ctx.config.subscription_output();
    write_feed(&feed, &output).await?;
    tracing::info!("Wrote {} links to {}", report.lines, output.display());
    report.written = Some(output);
    Ok(report)
}

/// A line that did not yield a node.
#[derive(Debug)]
pub struct SkippedLine {
    /// 1-based position in the input.
    pub line: usize,
    pub error: ShareLinkError,
}

/// Parsed nodes plus the lines that were skipped.
#[derive(Debug, Default)]
pub struct NodeBatch {
    pub nodes: Vec<Box<dyn ShareLink>>,
    pub skipped: Vec<SkippedLine>,
}

impl NodeBatch {
    /// There was input and not a single line parsed.
    pub fn all_failed(&self) -> bool {
        self.nodes.is_empty() && !self.skipped.is_empty()
    }
}

/// Parse every line through `registry`, isolating per-line failures.
pub fn resolve_nodes<'a, I>(lines: I, registry: &ShareLinkRegistry) -> NodeBatch
where
    I: IntoIterator<Item = &'a str>,
{
    let mut batch = NodeBatch::default();

    for (idx, line) in lines.into_iter().enumerate() {
        match registry.parse(line) {
            Ok(link) => batch.nodes.push(link),
            Err(error) => {
                tracing::warn!("Skipping line {}: {error}", idx + 1);
                batch.skipped.push(SkippedLine {
                    line: idx + 1,
                    error,
                });
            }
        }
    }

    tracing::debug!(
        "Resolved {} node(s), skipped {}",
        batch.nodes.len(),
        batch.skipped.len()
    );
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use mockito::Server;
    use xh_schema::ProtocolKind;

    const SS: &str = "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ=@example.com:8443#My%20Node";
    const TROJAN: &str = "trojan://secret@t.example.com:443#T";

    fn context(dir: &Path, sources: Vec<String>) -> Context {
        let mut config = Config::default();
        config.core.data_dir = dir.join("data");
        config.subscribe.sources = sources;
        Context::with_client(config, Client::new())
    }

    #[tokio::test]
    async fn test_bad_source_is_skipped() {
        let mut server = Server::new_async().await;
        let _s1 = server
            .mock("GET", "/one")
            .with_status(200)
            .with_body(STANDARD.encode(format!("{SS}\n")))
            .create_async()
            .await;
        let _s2 = server
            .mock("GET", "/two")
            .with_status(200)
            .with_body("%%% definitely not base64 %%%")
            .create_async()
            .await;
        let _s3 = server
            .mock("GET", "/three")
            .with_status(200)
            .with_body(STANDARD.encode(format!("{TROJAN}\r\n{SS}")))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            dir.path(),
            ["/one", "/two", "/three"]
                .iter()
                .map(|p| format!("{}{p}", server.url()))
                .collect(),
        );

        let report = update_subscriptions(&ctx).await.unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].url.ends_with("/two"));
        assert!(matches!(report.failures[0].error, SubscribeError::Decode(_)));
        assert_eq!(report.lines, 3);

        let written = report.written.unwrap();
        assert_eq!(
            std::fs::read_to_string(written).unwrap(),
            format!("{SS}\n{TROJAN}\n{SS}\n")
        );
    }

    #[tokio::test]
    async fn test_all_sources_failing_writes_nothing() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/down")
            .with_status(503)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), vec![format!("{}/down", server.url())]);
        let output = ctx.config.subscription_output();
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, "previous\n").unwrap();

        let report = update_subscriptions(&ctx).await.unwrap();

        assert!(report.all_failed());
        assert!(report.written.is_none());
        assert!(matches!(report.failures[0].error, SubscribeError::Network(_)));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "previous\n");
    }

    #[tokio::test]
    async fn test_no_sources() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), Vec::new());

        let report = update_subscriptions(&ctx).await.unwrap();

        assert!(!report.all_failed());
        assert!(report.written.is_none());
        assert!(!ctx.config.subscription_output().exists());
    }

    #[test]
    fn test_feed_text() {
        let mut feed = AggregatedFeed::default();
        assert_eq!(feed.to_text(), "");
        assert_eq!(feed.push_block("a\n\n b \n"), 2);
        assert_eq!(feed.push_block("a"), 1);
        assert_eq!(feed.lines(), ["a", "b", "a"]);
        assert_eq!(feed.to_text(), "a\nb\na\n");
    }

    #[test]
    fn test_resolve_nodes_isolates_bad_lines() {
        let registry = ShareLinkRegistry::with_builtin();
        let lines = [
            SS,
            "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ=@example.com:http#bad-port",
            "hysteria2://x@h:1#n",
            TROJAN,
        ];

        let batch = resolve_nodes(lines, &registry);

        assert!(!batch.all_failed());
        let kinds: Vec<_> = batch
            .nodes
            .iter()
            .map(|n| n.descriptor().protocol_kind())
            .collect();
        assert_eq!(kinds, [ProtocolKind::Shadowsocks, ProtocolKind::Trojan]);
        assert_eq!(batch.skipped.len(), 2);
        assert_eq!(batch.skipped[0].line, 2);
        assert!(matches!(batch.skipped[0].error, ShareLinkError::InvalidPort(_)));
        assert!(matches!(
            batch.skipped[1].error,
            ShareLinkError::UnrecognizedScheme(_)
        ));
    }

    #[test]
    fn test_resolve_nodes_all_failed() {
        let registry = ShareLinkRegistry::with_builtin();
        let batch = resolve_nodes(["nope", "ss://broken"], &registry);
        assert!(batch.all_failed());
        assert!(!resolve_nodes(Vec::<&str>::new(), &registry).all_failed());
    }
}
