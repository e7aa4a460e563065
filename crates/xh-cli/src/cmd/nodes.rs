//! Nodes command: parse the aggregated feed into node descriptors.

use anyhow::{Context, Result, bail};
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use std::path::Path;
use xh_core::Config;
use xh_core::feed::feed_lines;
use xh_core::sharelink::{ShareLinkError, ShareLinkRegistry};
use xh_core::subscribe::{NodeBatch, resolve_nodes};

use crate::ui::Output;

/// How parsed nodes are printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodesMode {
    /// A summary table.
    Table,
    /// Node descriptors as a JSON array.
    Json,
    /// Core outbound fragments, tagged `<tag>` or `<tag>-<n>`.
    Outbound(String),
}

/// Parse every line of the feed and print the result.
///
/// Lines that fail to parse are reported and skipped; the command fails
/// only when there were lines and none of them parsed.
pub fn nodes(config: &Config, file: Option<&Path>, mode: &NodesMode) -> Result<()> {
    let output = match mode {
        NodesMode::Table => Output::new(),
        NodesMode::Json | NodesMode::Outbound(_) => Output::quiet(),
    };

    let path = file.map_or_else(|| config.subscription_output(), Path::to_path_buf);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let registry = ShareLinkRegistry::with_builtin();
    let batch = resolve_nodes(feed_lines(&text), &registry);

    for skipped in &batch.skipped {
        output.warning(&format!("line {}: {}", skipped.line, skipped.error));
    }
    if batch.all_failed() {
        bail!(
            "None of the {} share links in {} could be parsed",
            batch.skipped.len(),
            path.display()
        );
    }

    match mode {
        NodesMode::Table => print_table(&batch, &output),
        NodesMode::Json => {
            let descriptors: Vec<_> = batch.nodes.iter().map(|n| n.descriptor()).collect();
            println!("{}", serde_json::to_string_pretty(&descriptors)?);
        }
        NodesMode::Outbound(tag) => print_outbounds(&batch, tag, &output)?,
    }
    Ok(())
}

fn print_table(batch: &NodeBatch, output: &Output) {
    if batch.nodes.is_empty() {
        output.info("No share links found");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Protocol", "Name", "Endpoint", "Summary"]);

    for (idx, link) in batch.nodes.iter().enumerate() {
        let node = link.descriptor();
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(node.protocol_kind().display_name()),
            Cell::new(node.node_name()).fg(Color::Cyan),
            Cell::new(node.endpoint()),
            Cell::new(link.summarize()).fg(Color::DarkGrey),
        ]);
    }

    println!("{table}");
    output.success(&format!(
        "{} node{} parsed, {} skipped",
        batch.nodes.len(),
        if batch.nodes.len() == 1 { "" } else { "s" },
        batch.skipped.len()
    ));
}

fn print_outbounds(batch: &NodeBatch, tag: &str, output: &Output) -> Result<()> {
    let single = batch.nodes.len() == 1;
    let mut outbounds = Vec::with_capacity(batch.nodes.len());

    for (idx, link) in batch.nodes.iter().enumerate() {
        let node_tag = if single {
            tag.to_string()
        } else {
            format!("{tag}-{}", idx + 1)
        };
        match link.to_outbound(&node_tag) {
            Ok(outbound) => outbounds.push(outbound),
            Err(ShareLinkError::NotImplemented(kind)) => output.warning(&format!(
                "{}: no outbound renderer for {kind}, skipped",
                link.descriptor().node_name()
            )),
            Err(e) => return Err(e.into()),
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "outbounds": outbounds }))?
    );
    Ok(())
}
