/*
 *  main.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use image::DynamicImage;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

use inkplay::config::{Cli, DeviceConfig};
use inkplay::display::{DisplayManager, DriverRegistry, RenderSettings};
use inkplay::playlist::PlaylistManager;
use inkplay::plugins::{clock::render_text, PluginRegistry};
use inkplay::scheduler::RefreshScheduler;
use inkplay::trigger::{Trigger, TriggerHandle};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Waits for SIGINT, SIGTERM or SIGHUP. SIGUSR1 and SIGUSR2 are the
/// manual buttons: refresh the current plugin, step to the next one.
async fn signal_handler(triggers: TriggerHandle) -> Result<(), std::io::Error> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;

    loop {
        tokio::select! {
            _ = sigusr1.recv() => {
                info!("SIGUSR1 received. Refreshing current plugin.");
                triggers.request(Trigger::RefreshCurrent);
            }
            _ = sigusr2.recv() => {
                info!("SIGUSR2 received. Moving to next plugin.");
                triggers.request(Trigger::NextPlugin);
            }
            _ = sigint.recv() => {
                info!("SIGINT received. Initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received. Initiating graceful shutdown.");
                break;
            }
            _ = sighup.recv() => {
                info!("SIGHUP received. Initiating graceful shutdown.");
                break;
            }
        }
    }
    Ok(())
}

fn splash(config: &DeviceConfig) -> anyhow::Result<DynamicImage> {
    let (w, h) = config.resolution();
    let text = format!("{} v{}\n{}x{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), w, h);
    Ok(DynamicImage::ImageRgb8(render_text(&text, config.canvas_size())?))
}

/// First boot after install: show the splash once, then remember it was shown
fn show_startup_image(config: &DeviceConfig, display: &DisplayManager) {
    if !config.get("startup", false) {
        return;
    }
    info!("Startup flag set, showing splash");
    match splash(config).and_then(|img| Ok(display.display_image(&img, &RenderSettings::empty())?)) {
        Ok(()) => {
            if let Err(e) = config.update("startup", false, config.path().is_some()) {
                warn!("Could not clear startup flag: {}", e);
            }
        }
        Err(e) => error!("Startup image failed: {}", e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(DeviceConfig::load(&cli).context("loading configuration")?);

    if cli.dump_config {
        println!("{}", serde_yaml::to_string(&config.snapshot())?);
        return Ok(());
    }

    let level = if cli.debug {
        "debug".to_string()
    } else {
        config.get("log_level", "info".to_string())
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    info!("{} e-paper playlists", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);
    if let Some(path) = config.path() {
        info!("Configuration from {}", path.display());
    }

    let registry = DriverRegistry::builtin();
    let display = Arc::new(
        DisplayManager::new(Arc::clone(&config), &registry)
            .with_context(|| format!("display type {}", config.display_type()))?,
    );

    let playlists = PlaylistManager::from_config(&config.snapshot()).shared();
    let plugins = Arc::new(PluginRegistry::builtin());
    info!("Plugins available: {}", plugins.ids().join(", "));

    show_startup_image(&config, &display);

    let scheduler = RefreshScheduler::new(Arc::clone(&config), Arc::clone(&display), playlists, plugins);
    scheduler.start();

    if let Err(e) = signal_handler(scheduler.trigger_handle()).await {
        error!("Signal handling failed: {}", e);
    }

    if !scheduler.stop().await {
        warn!("Exiting with a render still in flight");
    }
    display.shutdown();
    info!("Bye");
    Ok(())
}
