//! xh - proxy core and subscription provisioning
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Keeps the runtime assets of an on-device proxy current: the core
//! executable (xray or sing-box), routing data, the tun2socks helper and
//! the aggregated subscription feed.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.xh/
//! ├── config.toml  # Configuration (optional)
//! ├── bin/         # Core and helper binaries
//! ├── confs/       # Core configuration
//! ├── data/        # Geodata, downloaded containers, sub.txt
//! └── run/         # core.pid, error.log
//! ```

pub mod cmd;
pub mod ui;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "xh")]
#[command(author, version = env!("XH_VERSION"), about = "xh - proxy core and subscription provisioning")]
pub struct Cli {
    /// Configuration file [default: ~/.xh/config.toml]
    #[arg(short, long, global = true, env = "XH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download and install runtime assets
    Update {
        #[command(subcommand)]
        target: UpdateTarget,
    },
    /// Parse the aggregated subscription into nodes
    Nodes {
        /// Feed file to read instead of the configured subscription output
        #[arg(long)]
        file: Option<PathBuf>,
        /// Print node descriptors as JSON
        #[arg(long, conflicts_with = "outbound")]
        json: bool,
        /// Print core outbound configuration, tagged with TAG
        #[arg(long, value_name = "TAG")]
        outbound: Option<String>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum UpdateTarget {
    /// Replace the proxy core with its latest release
    Core,
    /// Replace the tun2socks helper
    Tun2socks,
    /// Refresh geoip.dat and geosite.dat
    Geodata,
    /// Fetch every subscription source and rewrite the aggregated feed
    Subscribe,
}
