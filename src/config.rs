/*
 *  config.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Device configuration: file + CLI layering, typed lookups and updates
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

use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::sync::RwLock;
use std::{fs, path::{Path, PathBuf}};
use std::time::Duration;
use thiserror::Error;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("No config file to persist to")]
    NotPersistent,
}

/// Top-level device configuration as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    /// show the splash image on the next start, cleared once shown
    pub startup: bool,
    pub display: DisplayConfig,
    pub scheduler: SchedulerConfig,
    pub active_playlist: Option<String>,
    pub playlists: Vec<PlaylistConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            startup: true,
            display: DisplayConfig::default(),
            scheduler: SchedulerConfig::default(),
            active_playlist: None,
            playlists: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// "mock", "inky" or a waveshare model such as "epd7in5_V2"
    pub display_type: String,
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
    pub inverted_image: bool,
    pub image_settings: Enhancement,
    /// last rendered (pre-transform) image, reused by the overlay path
    pub current_image_file: PathBuf,
    /// where the mock driver writes its frames
    pub mock_output_dir: PathBuf,
    pub bus: BusConfig,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            display_type: "inky".to_string(),
            width: 800,
            height: 480,
            orientation: Orientation::Horizontal,
            inverted_image: false,
            image_settings: Enhancement::default(),
            current_image_file: PathBuf::from("static/images/current_image.png"),
            mock_output_dir: PathBuf::from("mock_display_output"),
            bus: BusConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

/// Enhancement factors, 1.0 leaves the image untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Enhancement {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub sharpness: f32,
}

impl Default for Enhancement {
    fn default() -> Self {
        Self { brightness: 1.0, contrast: 1.0, saturation: 1.0, sharpness: 1.0 }
    }
}

impl Enhancement {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

/// SPI wiring shared by the e-paper families. Pins use BCM numbering on
/// the gpio chip; unset pins fall back to the family's HAT defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub spi: String,
    pub gpio_chip: String,
    pub dc_pin: Option<u32>,
    pub rst_pin: Option<u32>,
    pub busy_pin: Option<u32>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            spi: "/dev/spidev0.0".to_string(),
            gpio_chip: "/dev/gpiochip0".to_string(),
            dc_pin: None,
            rst_pin: None,
            busy_pin: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub debounce_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_secs: 60, shutdown_timeout_secs: 30, debounce_ms: 500 }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration { Duration::from_secs(self.tick_secs) }
    pub fn shutdown_timeout(&self) -> Duration { Duration::from_secs(self.shutdown_timeout_secs) }
    pub fn debounce(&self) -> Duration { Duration::from_millis(self.debounce_ms) }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlaylistConfig {
    pub name: String,
    #[serde(default)]
    pub plugins: Vec<PluginInstanceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInstanceConfig {
    pub name: String,
    pub plugin_id: String,
    /// refresh interval in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

fn default_interval_secs() -> u64 { 15 * 60 }

/// CLI overrides. All fields are Options so we can layer them over the file.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "inkplay", about = "inkplay e-paper playlist display", version)]
pub struct Cli {
    /// Path to a YAML or JSON config file (overrides search)
    #[arg(long, short = 'c', value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Development mode: mock display and config/device_dev.yaml
    #[arg(long, action = ArgAction::SetTrue)]
    pub dev: bool,
    /// Enable debug log level
    #[arg(long, short = 'v', alias = "verbose", action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub display_type: Option<String>,
    #[arg(long)]
    pub display_width: Option<u32>,
    #[arg(long)]
    pub display_height: Option<u32>,
    #[arg(long, action = ArgAction::Set)]
    pub display_inverted: Option<bool>,
    #[arg(long)]
    pub tick_secs: Option<u64>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Shared, mutable view over the device configuration.
///
/// Reads go through typed accessors or the dotted-key `get`; writes go
/// through `update`, which re-validates and optionally persists back to the
/// file the configuration was loaded from.
#[derive(Debug)]
pub struct DeviceConfig {
    inner: RwLock<Config>,
    path: Option<PathBuf>,
}

impl DeviceConfig {
    pub fn new(config: Config, path: Option<PathBuf>) -> Self {
        Self { inner: RwLock::new(config), path }
    }

    /// Resolve configuration from the CLI, the config file and defaults.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let path = match cli.config.as_ref() {
            Some(p) if p.exists() => Some(p.clone()),
            Some(p) => {
                return Err(ConfigError::Validation(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            None => find_config_file(cli.dev),
        };

        let mut cfg = match path.as_ref() {
            Some(p) => {
                info!("Loading configuration from {}", p.display());
                read_config(p)?
            }
            None => {
                info!("No configuration file found, using defaults");
                Config::default()
            }
        };

        apply_cli_overrides(&mut cfg, cli);
        validate(&cfg)?;

        Ok(Self::new(cfg, path))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Clone of the current configuration.
    pub fn snapshot(&self) -> Config {
        self.read(|c| c.clone())
    }

    fn read<R>(&self, f: impl FnOnce(&Config) -> R) -> R {
        match self.inner.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    pub fn display(&self) -> DisplayConfig {
        self.read(|c| c.display.clone())
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        self.read(|c| c.scheduler.clone())
    }

    pub fn display_type(&self) -> String {
        self.read(|c| c.display.display_type.clone())
    }

    /// Panel resolution as (width, height).
    pub fn resolution(&self) -> (u32, u32) {
        self.read(|c| (c.display.width, c.display.height))
    }

    /// Size plugins should draw at: the resolution, swapped for vertical
    pub fn canvas_size(&self) -> (u32, u32) {
        let (w, h) = self.resolution();
        match self.orientation() {
            Orientation::Horizontal => (w, h),
            Orientation::Vertical => (h, w),
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.read(|c| c.display.orientation)
    }

    pub fn inverted(&self) -> bool {
        self.read(|c| c.display.inverted_image)
    }

    pub fn enhancement(&self) -> Enhancement {
        self.read(|c| c.display.image_settings)
    }

    pub fn current_image_path(&self) -> PathBuf {
        self.read(|c| c.display.current_image_file.clone())
    }

    /// Typed lookup by dotted key, e.g. `get("display.width", 800u32)`.
    /// Missing keys and type mismatches both yield `default`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let tree = match self.read(|c| serde_yaml::to_value(c)) {
            Ok(v) => v,
            Err(e) => {
                debug!("config serialisation failed for lookup of {}: {}", key, e);
                return default;
            }
        };
        lookup(&tree, key)
            .and_then(|v| serde_yaml::from_value(v.clone()).ok())
            .unwrap_or(default)
    }

    /// Set a dotted key, re-validate, and write the file back when `persist`.
    pub fn update<T: Serialize>(&self, key: &str, value: T, persist: bool) -> Result<(), ConfigError> {
        let value = serde_yaml::to_value(value)?;
        let updated = {
            let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
            let mut tree = serde_yaml::to_value(&*guard)?;
            assign(&mut tree, key, value)?;
            let cfg: Config = serde_yaml::from_value(tree)?;
            validate(&cfg)?;
            *guard = cfg.clone();
            cfg
        };
        debug!("config key {} updated", key);

        if persist {
            let path = self.path.as_ref().ok_or(ConfigError::NotPersistent)?;
            write_config(path, &updated)?;
            info!("Configuration written to {}", path.display());
        }
        Ok(())
    }
}

fn lookup<'a>(tree: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(tree, |node, part| node.get(part))
}

fn assign(tree: &mut Value, key: &str, value: Value) -> Result<(), ConfigError> {
    let mut parts = key.split('.').peekable();
    let mut node = tree;
    while let Some(part) = parts.next() {
        let map = node.as_mapping_mut().ok_or_else(|| {
            ConfigError::Validation(format!("{} does not name a config section", key))
        })?;
        let k = Value::String(part.to_string());
        if parts.peek().is_none() {
            map.insert(k, value);
            return Ok(());
        }
        if !map.contains_key(&k) {
            map.insert(k.clone(), Value::Mapping(Mapping::new()));
        }
        node = map
            .get_mut(&k)
            .ok_or_else(|| ConfigError::Validation(format!("cannot descend into {}", key)))?;
    }
    Err(ConfigError::Validation("empty config key".into()))
}

/// Try common locations in order (first hit wins).
fn find_config_file(dev: bool) -> Option<PathBuf> {
    let names: &[&str] = if dev {
        &["config/device_dev.yaml", "config/device_dev.json"]
    } else {
        &["config/device.yaml", "config/device.json", "inkplay.yaml"]
    };
    if !dev {
        // XDG-style: ~/.config/inkplay/device.yaml
        if let Some(home) = home_dir() {
            let p = home.join(".config/inkplay/device.yaml");
            if p.exists() { return Some(p) }
        }
    }
    names.iter().map(PathBuf::from).find(|p| p.exists())
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg = if is_json(path) {
        serde_json::from_str(&s)?
    } else {
        serde_yaml::from_str(&s)?
    };
    Ok(cfg)
}

fn write_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    let s = if is_json(path) {
        serde_json::to_string_pretty(cfg)?
    } else {
        serde_yaml::to_string(cfg)?
    };
    fs::write(path, s)?;
    Ok(())
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()   { cfg.log_level = cli.log_level.clone(); }
    if cli.dev                   { cfg.display.display_type = "mock".to_string(); }
    if let Some(t) = cli.display_type.as_ref() { cfg.display.display_type = t.clone(); }
    if let Some(w) = cli.display_width         { cfg.display.width = w; }
    if let Some(h) = cli.display_height        { cfg.display.height = h; }
    if let Some(i) = cli.display_inverted      { cfg.display.inverted_image = i; }
    if let Some(t) = cli.tick_secs             { cfg.scheduler.tick_secs = t; }
}

/// Put any invariants here (required fields, ranges, etc.)
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let d = &cfg.display;
    if d.width == 0 || d.height == 0 {
        return Err(ConfigError::Validation("display width/height must be > 0".into()));
    }
    if d.display_type.trim().is_empty() {
        return Err(ConfigError::Validation("display_type must not be empty".into()));
    }
    let e = &d.image_settings;
    for (name, v) in [
        ("brightness", e.brightness),
        ("contrast", e.contrast),
        ("saturation", e.saturation),
        ("sharpness", e.sharpness),
    ] {
        if !v.is_finite() || v < 0.0 {
            return Err(ConfigError::Validation(format!("image_settings.{} must be >= 0", name)));
        }
    }
    if cfg.scheduler.tick_secs == 0 {
        return Err(ConfigError::Validation("scheduler tick_secs must be > 0".into()));
    }
    for (i, p) in cfg.playlists.iter().enumerate() {
        if cfg.playlists[..i].iter().any(|q| q.name == p.name) {
            return Err(ConfigError::Validation(format!("playlist {} defined twice", p.name)));
        }
        for (j, inst) in p.plugins.iter().enumerate() {
            if p.plugins[..j].iter().any(|o| o.name == inst.name) {
                return Err(ConfigError::Validation(format!(
                    "plugin instance {} appears twice in playlist {}",
                    inst.name, p.name
                )));
            }
            if inst.interval_secs == 0 {
                return Err(ConfigError::Validation(format!(
                    "plugin instance {} in playlist {} needs interval_secs > 0",
                    inst.name, p.name
                )));
            }
        }
    }
    if let Some(active) = cfg.active_playlist.as_ref() {
        if !cfg.playlists.iter().any(|p| &p.name == active) {
            return Err(ConfigError::Validation(format!("active playlist {} is not defined", active)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(cfg: Config) -> DeviceConfig {
        DeviceConfig::new(cfg, None)
    }

    #[test]
    fn test_get_dotted_keys() {
        let dc = device(Config::default());
        assert_eq!(dc.get("display.width", 0u32), 800);
        assert_eq!(dc.get("display.display_type", String::new()), "inky");
        assert!(dc.get("startup", false));
    }

    #[test]
    fn test_get_missing_or_mistyped_falls_back() {
        let dc = device(Config::default());
        assert_eq!(dc.get("display.nope", 7u32), 7);
        assert_eq!(dc.get("display.display_type", 3u32), 3);
    }

    #[test]
    fn test_update_in_memory() {
        let dc = device(Config::default());
        dc.update("display.inverted_image", true, false).unwrap();
        assert!(dc.inverted());
        dc.update("startup", false, false).unwrap();
        assert!(!dc.get("startup", true));
    }

    #[test]
    fn test_update_rejects_invalid_value() {
        let dc = device(Config::default());
        assert!(dc.update("display.width", 0u32, false).is_err());
        assert_eq!(dc.resolution(), (800, 480));
    }

    #[test]
    fn test_update_persist_without_file() {
        let dc = device(Config::default());
        assert!(matches!(dc.update("startup", false, true), Err(ConfigError::NotPersistent)));
    }

    #[test]
    fn test_update_persists_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["device.yaml", "device.json"] {
            let path = dir.path().join(name);
            write_config(&path, &Config::default()).unwrap();
            let dc = DeviceConfig::new(read_config(&path).unwrap(), Some(path.clone()));
            dc.update("startup", false, true).unwrap();
            assert!(!read_config(&path).unwrap().startup);
        }
    }

    #[test]
    fn test_parse_yaml_playlists() {
        let yaml = r#"
display:
  display_type: epd7in5_V2
  width: 800
  height: 480
  orientation: vertical
active_playlist: Default
playlists:
  - name: Default
    plugins:
      - name: wall clock
        plugin_id: clock
        interval_secs: 60
        settings: { format: "%H:%M" }
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.display.orientation, Orientation::Vertical);
        assert_eq!(cfg.playlists[0].plugins[0].interval_secs, 60);
        assert_eq!(cfg.scheduler.tick_secs, 60);
    }

    #[test]
    fn test_validate_unknown_active_playlist() {
        let cfg = Config { active_playlist: Some("Nope".into()), ..Default::default() };
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut cfg = Config::default();
        let cli = Cli { dev: true, display_width: Some(640), tick_secs: Some(5), ..Default::default() };
        apply_cli_overrides(&mut cfg, &cli);
        assert_eq!(cfg.display.display_type, "mock");
        assert_eq!(cfg.display.width, 640);
        assert_eq!(cfg.scheduler.tick_secs, 5);
    }
}
