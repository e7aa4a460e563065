//! Update command: core, helper, geodata and subscriptions.

use anyhow::{Result, bail};
use crossterm::style::Stylize;
use std::sync::Arc;
use xh_core::Context;
use xh_core::{PidFileService, ServiceCoordinator};
use xh_core::assets::{update_geodata, update_tun2socks};
use xh_core::subscribe::update_subscriptions;
use xh_core::swap::update_core;

use crate::ui::Output;

/// Replace the configured proxy core with its latest release.
pub async fn core(ctx: &Context) -> Result<()> {
    let output = Output::new();
    // Validates the core type before anything touches the network.
    let service = Arc::new(PidFileService::from_config(&ctx.config.core)?);

    output.section("Core");
    let outcome = update_core(ctx, Arc::clone(&service)).await?;

    output.success(&format!(
        "{} installed at {} ({} bytes)",
        outcome.core_type.as_str().bold(),
        outcome.final_path.display(),
        outcome.bytes_written
    ));
    if outcome.restarted {
        let state = service.is_running();
        if state.running {
            output.info(&format!(
                "Core restarted (pid {})",
                state.pid.unwrap_or_default()
            ));
        } else {
            output.warning("Core was running before the update but is not running now");
        }
    }
    Ok(())
}

/// Replace the tun2socks helper binary.
pub async fn tun2socks(ctx: &Context) -> Result<()> {
    let output = Output::new();
    output.section("tun2socks");
    let file = update_tun2socks(ctx).await?;
    output.success(&format!(
        "tun2socks installed at {} ({} bytes)",
        file.path.display(),
        file.size
    ));
    Ok(())
}

/// Refresh geoip.dat and geosite.dat.
pub async fn geodata(ctx: &Context) -> Result<()> {
    let output = Output::new();
    output.section("Geodata");
    for file in update_geodata(ctx).await? {
        output.success(&format!("{} ({} bytes)", file.path.display(), file.size));
    }
    Ok(())
}

/// Fetch every subscription source and rewrite the aggregated feed.
///
/// Fails only when sources are configured and every one of them failed.
pub async fn subscribe(ctx: &Context) -> Result<()> {
    let output = Output::new();
    output.section("Subscriptions");

    let report = update_subscriptions(ctx).await?;

    if report.total == 0 {
        output.warning("No subscription sources configured ([subscribe] sources)");
        return Ok(());
    }

    for failure in &report.failures {
        output.error(&format!("{}: {}", failure.url, failure.error));
    }

    if report.all_failed() {
        bail!("All {} subscription sources failed", report.total);
    }

    let counts = format!("{}/{} sources", report.succeeded, report.total);
    match &report.written {
        Some(path) => output.success(&format!(
            "{} links from {} written to {}",
            report.lines,
            counts.dark_grey(),
            path.display()
        )),
        None => output.warning(&format!("Sources returned no share links ({counts})")),
    }
    Ok(())
}
