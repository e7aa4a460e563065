//! Core library for xh.
//!
//! Two independent workflows live here, sharing only the download
//! primitive in [`io::download`]:
//!
//! - **Binary update** ([`swap`]): resolve the release for this platform,
//!   download the container, stop the running core, extract the executable
//!   over the old one and restart.
//! - **Subscriptions** ([`subscribe`]): fetch base64 feeds, aggregate their
//!   share links and parse them into [`xh_schema::NodeDescriptor`]s through
//!   the [`sharelink`] registry.

pub mod assets;
pub mod config;
pub mod feed;
pub mod io;
pub mod paths;
pub mod release;
pub mod service;
pub mod sharelink;
pub mod subscribe;
pub mod swap;

pub use config::{Config, Context};
pub use paths::*;
pub use service::{PidFileService, ServiceCoordinator, ServiceState};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("xh/", env!("CARGO_PKG_VERSION"));
