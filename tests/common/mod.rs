/*
 *  tests/common/mod.rs
 *
 *  Shared fixtures for the integration tests
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 */

#![allow(dead_code)]

use image::{DynamicImage, RgbImage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use inkplay::config::{Config, DeviceConfig, DisplayConfig};
use inkplay::display::{BoxedDriver, DisplayManager};
use inkplay::playlist::{Playlist, PlaylistManager, PluginInstance};
use inkplay::plugins::{Plugin, PluginError, PluginRegistry, Settings};
use inkplay::scheduler::RefreshScheduler;

pub const WIDTH: u32 = 32;
pub const HEIGHT: u32 = 16;

/// Counts generate calls and the most that ever overlapped
#[derive(Default)]
pub struct Probe {
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub calls: AtomicUsize,
}

impl Probe {
    pub fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Plain frames, optionally slow, with overlap accounting
pub struct Blank {
    pub probe: Arc<Probe>,
    pub work: Duration,
}

impl Plugin for Blank {
    fn id(&self) -> &str {
        "blank"
    }

    fn generate_image(&self, _settings: &Settings, config: &DeviceConfig) -> Result<DynamicImage, PluginError> {
        self.probe.enter();
        std::thread::sleep(self.work);
        self.probe.leave();
        let (w, h) = config.canvas_size();
        Ok(DynamicImage::ImageRgb8(RgbImage::new(w, h)))
    }
}

pub fn device_config(dir: &Path, display_type: &str) -> Arc<DeviceConfig> {
    Arc::new(DeviceConfig::new(base_config(dir, display_type), None))
}

pub fn base_config(dir: &Path, display_type: &str) -> Config {
    Config {
        display: DisplayConfig {
            display_type: display_type.to_string(),
            width: WIDTH,
            height: HEIGHT,
            current_image_file: dir.join("images/current_image.png"),
            mock_output_dir: dir.join("mock"),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn playlist(names: &[&str], interval: Duration) -> Arc<Mutex<PlaylistManager>> {
    let plugins = names.iter().map(|n| PluginInstance::new(n, "blank", interval)).collect();
    PlaylistManager::new(vec![Playlist::new("Default", plugins)], Some("Default")).shared()
}

pub struct Rig {
    pub scheduler: Arc<RefreshScheduler>,
    pub probe: Arc<Probe>,
    pub dir: tempfile::TempDir,
}

pub fn rig(names: &[&str], interval: Duration, driver: BoxedDriver, work: Duration) -> Rig {
    rig_with(|_| {}, names, interval, driver, work)
}

/// `rig` with a chance to adjust the config first
pub fn rig_with(
    tweak: impl FnOnce(&mut Config),
    names: &[&str],
    interval: Duration,
    driver: BoxedDriver,
    work: Duration,
) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = base_config(dir.path(), "mock");
    tweak(&mut cfg);
    let config = Arc::new(DeviceConfig::new(cfg, None));
    let display = Arc::new(DisplayManager::with_driver(Arc::clone(&config), driver));
    let probe = Arc::new(Probe::default());
    let plugins = Arc::new(PluginRegistry::new().with(Blank { probe: Arc::clone(&probe), work }));
    let scheduler = RefreshScheduler::new(config, display, playlist(names, interval), plugins);
    Rig { scheduler: Arc::new(scheduler), probe, dir }
}

pub fn cursor(scheduler: &RefreshScheduler) -> Option<usize> {
    scheduler
        .playlists()
        .lock()
        .unwrap()
        .active_playlist()
        .unwrap()
        .current_index()
}

pub fn last_refresh(scheduler: &RefreshScheduler, name: &str) -> Option<tokio::time::Instant> {
    scheduler
        .playlists()
        .lock()
        .unwrap()
        .active_playlist()
        .unwrap()
        .plugin(name)
        .and_then(|p| p.last_refresh())
}
