//! Auxiliary assets: routing data files and the tun2socks helper.
//!
//! These are plain files fetched from stable "latest" URLs. Each one is
//! downloaded beside its destination and renamed into place, so the core
//! never reads a partially written file.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{Context, CoreSection};
use crate::io::download::{DownloadError, DownloadedFile, download_replace};
use crate::paths::bin_path;

pub const GEOIP_FILE: &str = "geoip.dat";
pub const GEOSITE_FILE: &str = "geosite.dat";
pub const TUN2SOCKS_FILE: &str = "tun2socks";

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn create_dir(dir: &Path) -> Result<(), AssetError> {
    std::fs::create_dir_all(dir).map_err(|source| AssetError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// Directory holding the core binary, where helper binaries also live.
pub fn helper_dir(core: &CoreSection) -> PathBuf {
    core.path
        .as_deref()
        .and_then(Path::parent)
        .map_or_else(bin_path, Path::to_path_buf)
}

/// Refresh `geoip.dat` and `geosite.dat` in the data directory.
///
/// Stops at the first failure; files already replaced stay replaced.
pub async fn update_geodata(ctx: &Context) -> Result<Vec<DownloadedFile>, AssetError> {
    let data_dir = &ctx.config.core.data_dir;
    create_dir(data_dir)?;

    let update = &ctx.config.update;
    let mut files = Vec::with_capacity(2);
    for (url, name) in [
        (&update.geoip_url, GEOIP_FILE),
        (&update.geosite_url, GEOSITE_FILE),
    ] {
        tracing::info!("Downloading {name} from {url}");
        let file = download_replace(&ctx.client, url, &data_dir.join(name)).await?;
        tracing::debug!("{name}: {} bytes", file.size);
        files.push(file);
    }
    Ok(files)
}

/// Refresh the tun2socks binary next to the core and mark it executable.
pub async fn update_tun2socks(ctx: &Context) -> Result<DownloadedFile, AssetError> {
    let dir = helper_dir(&ctx.config.core);
    create_dir(&dir)?;

    let dest = dir.join(TUN2SOCKS_FILE);
    let url = &ctx.config.update.tun2socks_url;
    tracing::info!("Downloading tun2socks from {url}");
    let file = download_replace(&ctx.client, url, &dest).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o755)).map_err(
            |source| AssetError::Io {
                path: dest.clone(),
                source,
            },
        )?;
    }

    tracing::info!("Installed tun2socks at {}", dest.display());
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use mockito::Server;
    use reqwest::Client;

    fn context(server: &Server, root: &Path) -> Context {
        let mut config = Config::default();
        config.core.data_dir = root.join("data");
        config.core.path = Some(root.join("bin").join("xray"));
        config.update.geoip_url = format!("{}/geoip.dat", server.url());
        config.update.geosite_url = format!("{}/geosite.dat", server.url());
        config.update.tun2socks_url = format!("{}/hev-socks5-tunnel-linux-arm64", server.url());
        Context::with_client(config, Client::new())
    }

    #[tokio::test]
    async fn test_update_geodata() {
        let mut server = Server::new_async().await;
        let _ip = server
            .mock("GET", "/geoip.dat")
            .with_body("geoip-bytes")
            .create_async()
            .await;
        let _site = server
            .mock("GET", "/geosite.dat")
            .with_body("geosite-bytes")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&server, dir.path());
        let files = update_geodata(&ctx).await.unwrap();

        assert_eq!(files.len(), 2);
        let data = dir.path().join("data");
        assert_eq!(std::fs::read(data.join(GEOIP_FILE)).unwrap(), b"geoip-bytes");
        assert_eq!(std::fs::read(data.join(GEOSITE_FILE)).unwrap(), b"geosite-bytes");
        assert!(!data.join("geoip.dat.part").exists());
    }

    #[tokio::test]
    async fn test_geodata_failure_keeps_previous_file() {
        let mut server = Server::new_async().await;
        let _ip = server
            .mock("GET", "/geoip.dat")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&server, dir.path());
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join(GEOIP_FILE), b"old").unwrap();

        let err = update_geodata(&ctx).await.unwrap_err();
        assert!(matches!(err, AssetError::Download(_)));
        assert_eq!(std::fs::read(data.join(GEOIP_FILE)).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_update_tun2socks() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/hev-socks5-tunnel-linux-arm64")
            .with_body("ELF")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&server, dir.path());
        let file = update_tun2socks(&ctx).await.unwrap();

        let dest = dir.path().join("bin").join(TUN2SOCKS_FILE);
        assert_eq!(file.path, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"ELF");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_helper_dir_defaults_to_bin() {
        let core = CoreSection {
            path: None,
            ..CoreSection::default()
        };
        assert_eq!(helper_dir(&core), bin_path());
    }
}
