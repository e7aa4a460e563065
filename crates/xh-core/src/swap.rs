//! Core binary replacement.
//!
//! An update walks through
//! `Idle → Downloading → ReadyToSwap → ServiceStopping? → Swapping →
//! ServiceStarting? → Done`, and may fail from any phase. Two finalizers run
//! on every exit path, held by a [`SwapSession`] guard:
//!
//! 1. the downloaded container is deleted;
//! 2. if the core was running when the swap began, it is started again.
//!
//! Stop and start failures are logged and never abort the update: a replaced
//! binary with a stale process is recoverable by a restart, while an
//! abandoned extraction leaves no usable binary at all.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use thiserror::Error;
use xh_schema::{CoreType, UnsupportedCoreType};

use crate::config::{Context, CoreSection, UpdateSection};
use crate::io::download::{DownloadError, download_to_file};
use crate::io::extract::{ArchiveEntryRequest, ContainerKind, ExtractError, extract_entry};
use crate::release::{ReleaseError, resolve_asset};
use crate::service::ServiceCoordinator;

#[derive(Error, Debug)]
pub enum SwapError {
    #[error(transparent)]
    UnsupportedCoreType(#[from] UnsupportedCoreType),

    #[error("Failed to create {}: {source}", path.display())]
    Prepare {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Release(#[from] ReleaseError),

    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("Extraction task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Phases of a single update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapPhase {
    Idle,
    Downloading,
    ReadyToSwap,
    ServiceStopping,
    Swapping,
    ServiceStarting,
    Done,
}

impl fmt::Display for SwapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where the new binary goes and where its container is staged.
#[derive(Debug, Clone)]
pub struct CoreBinaryTarget {
    pub final_path: PathBuf,
    pub temp_container_path: PathBuf,
    pub core_type: CoreType,
}

impl CoreBinaryTarget {
    pub fn from_config(core: &CoreSection) -> Result<Self, UnsupportedCoreType> {
        let core_type = core.core_type()?;
        Ok(Self {
            final_path: core.core_path(core_type),
            temp_container_path: core.data_dir.join(core_type.container_file_name()),
            core_type,
        })
    }
}

/// How the container URL is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseSource {
    /// A stable "latest" download link.
    Direct(String),
    /// A release-listing API plus the asset name substring to pick.
    Api { url: String, pattern: String },
}

impl ReleaseSource {
    /// xray publishes a stable download link; sing-box needs an API lookup.
    pub fn for_core(core: CoreType, update: &UpdateSection) -> Self {
        match core {
            CoreType::Xray => Self::Direct(update.xray_url.clone()),
            CoreType::SingBox => Self::Api {
                url: update.singbox_release_api.clone(),
                pattern: update.asset_pattern.clone(),
            },
        }
    }
}

/// Result of a completed swap.
#[derive(Debug, Clone)]
pub struct SwapOutcome {
    pub core_type: CoreType,
    pub final_path: PathBuf,
    pub download_url: String,
    pub bytes_written: u64,
    /// The core was running before the swap and a restart was attempted.
    pub restarted: bool,
}

/// Always-run finalizers for one update.
///
/// [`SwapSession::finish`] runs them on every return path of
/// [`BinarySwapper::run`]. `Drop` covers an update future dropped mid-flight.
struct SwapSession<S: ServiceCoordinator + ?Sized + 'static> {
    service: Arc<S>,
    container: PathBuf,
    phase: SwapPhase,
    restart: bool,
    finished: bool,
}

impl<S: ServiceCoordinator + ?Sized + 'static> SwapSession<S> {
    fn new(service: Arc<S>, container: PathBuf) -> Self {
        Self {
            service,
            container,
            phase: SwapPhase::Idle,
            restart: false,
            finished: false,
        }
    }

    fn advance(&mut self, phase: SwapPhase) {
        tracing::debug!("core update: {} -> {phase}", self.phase);
        self.phase = phase;
    }

    fn remove_container(&self) {
        match std::fs::remove_file(&self.container) {
            Ok(()) => tracing::debug!("Removed {}", self.container.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {e}", self.container.display()),
        }
    }

    async fn finish(mut self) {
        let failed_in = (self.phase != SwapPhase::Done).then_some(self.phase);
        self.remove_container();

        if self.restart {
            self.advance(SwapPhase::ServiceStarting);
            tracing::info!("Starting core");
            let service = Arc::clone(&self.service);
            match tokio::task::spawn_blocking(move || service.start()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Failed to restart core: {e}"),
                Err(e) => tracing::warn!("Core restart task failed: {e}"),
            }
        }

        match failed_in {
            Some(phase) => tracing::warn!("Core update failed during {phase}"),
            None => self.advance(SwapPhase::Done),
        }
        self.finished = true;
    }
}

impl<S: ServiceCoordinator + ?Sized + 'static> Drop for SwapSession<S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::warn!("Core update abandoned during {}", self.phase);
        self.remove_container();

        if self.restart {
            let service = Arc::clone(&self.service);
            let start = move || {
                if let Err(e) = service.start() {
                    tracing::warn!("Failed to restart core: {e}");
                }
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => drop(handle.spawn_blocking(start)),
                Err(_) => start(),
            }
        }
    }
}

/// Downloads a core release and swaps it in under a stopped service.
pub struct BinarySwapper<'a, S: ServiceCoordinator + ?Sized + 'static> {
    client: &'a Client,
    service: Arc<S>,
    target: CoreBinaryTarget,
    source: ReleaseSource,
}

impl<S: ServiceCoordinator + ?Sized + 'static> fmt::Debug for BinarySwapper<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinarySwapper")
            .field("target", &self.target)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl<'a, S: ServiceCoordinator + ?Sized + 'static> BinarySwapper<'a, S> {
    pub fn new(
        client: &'a Client,
        service: Arc<S>,
        target: CoreBinaryTarget,
        source: ReleaseSource,
    ) -> Self {
        Self {
            client,
            service,
            target,
            source,
        }
    }

    /// Build from configuration. The core type is validated here, before
    /// any network or filesystem activity.
    pub fn from_context(ctx: &'a Context, service: Arc<S>) -> Result<Self, SwapError> {
        let target = CoreBinaryTarget::from_config(&ctx.config.core)?;
        let source = ReleaseSource::for_core(target.core_type, &ctx.config.update);
        Ok(Self::new(&ctx.client, service, target, source))
    }

    /// Run the update to completion or to its first unrecoverable error.
    pub async fn run(self) -> Result<SwapOutcome, SwapError> {
        let Self {
            client,
            service,
            target,
            source,
        } = self;

        for dir in [target.temp_container_path.parent(), target.final_path.parent()]
            .into_iter()
            .flatten()
        {
            ensure_dir(dir)?;
        }

        let mut session = SwapSession::new(service, target.temp_container_path.clone());
        let result = swap(client, &target, source, &mut session).await;
        let restarted = session.restart;
        session.finish().await;

        let (download_url, bytes_written) = result?;
        Ok(SwapOutcome {
            core_type: target.core_type,
            final_path: target.final_path,
            download_url,
            bytes_written,
            restarted,
        })
    }
}

async fn swap<S: ServiceCoordinator + ?Sized + 'static>(
    client: &Client,
    target: &CoreBinaryTarget,
    source: ReleaseSource,
    session: &mut SwapSession<S>,
) -> Result<(String, u64), SwapError> {
    let core_type = target.core_type;

    session.advance(SwapPhase::Downloading);
    let (download_url, asset_name, sha256) = match source {
        ReleaseSource::Direct(url) => (url, None, None),
        ReleaseSource::Api { url, pattern } => {
            let asset = resolve_asset(client, &url, &pattern).await?;
            (asset.download_url, Some(asset.name), asset.sha256)
        }
    };
    let kind = container_kind(asset_name.as_deref().unwrap_or(&download_url), core_type);
    tracing::info!("Downloading {core_type} from {download_url}");
    download_to_file(
        client,
        &download_url,
        &target.temp_container_path,
        sha256.as_deref(),
    )
    .await?;

    session.advance(SwapPhase::ReadyToSwap);
    let state = session.service.is_running();
    if state.running {
        session.advance(SwapPhase::ServiceStopping);
        session.restart = true;
        tracing::info!(
            "Core is running (pid {}), stopping it",
            state.pid.as_deref().unwrap_or("?")
        );
        let service = Arc::clone(&session.service);
        match tokio::task::spawn_blocking(move || service.stop()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to stop core, replacing binary anyway: {e}"),
            Err(e) => tracing::warn!("Core stop task failed, replacing binary anyway: {e}"),
        }
        if let Err(e) = std::fs::remove_file(&target.final_path) {
            tracing::debug!("Could not remove old binary: {e}");
        }
    }

    session.advance(SwapPhase::Swapping);
    let entry = core_type.binary_name();
    let container = target.temp_container_path.clone();
    let dest = target.final_path.clone();
    let bytes_written = tokio::task::spawn_blocking(move || {
        let request = ArchiveEntryRequest {
            container_path: &container,
            target_entry_name: entry,
        };
        extract_entry(&request, kind, &dest)
    })
    .await??;

    tracing::info!(
        "Installed {core_type} ({bytes_written} bytes) at {}",
        target.final_path.display()
    );
    session.advance(SwapPhase::Done);
    Ok((download_url, bytes_written))
}

/// Container family named by the asset file, else the one the core publishes.
fn container_kind(file_name: &str, core: CoreType) -> ContainerKind {
    let path = file_name.split(['?', '#']).next().unwrap_or(file_name);
    ContainerKind::detect(Path::new(path)).unwrap_or_else(|| ContainerKind::for_core(core))
}

fn ensure_dir(dir: &Path) -> Result<(), SwapError> {
    std::fs::create_dir_all(dir).map_err(|source| SwapError::Prepare {
        path: dir.to_path_buf(),
        source,
    })
}

/// Update the configured core, validating its type before any side effect.
pub async fn update_core<S: ServiceCoordinator + ?Sized + 'static>(
    ctx: &Context,
    service: Arc<S>,
) -> Result<SwapOutcome, SwapError> {
    BinarySwapper::from_context(ctx, service)?.run().await
}
