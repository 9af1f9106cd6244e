/*
 *  plugins/mod.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Content plugins
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

//! Content plugins for playlist instances
//!
//! A plugin turns an instance's settings blob into a raster image. The
//! scheduler never looks inside the image; it hands it to the display
//! manager together with the instance's render settings.
//!
//! ## Built-in plugins
//!
//! - `image_file` - a file, or a random image from a directory
//! - `clock` - the local time, large and centred
//!
//! ## Render settings
//!
//! An instance may carry `image_settings: ["keep-width"]` (any strings the
//! pipeline understands) in its settings; otherwise the plugin's defaults
//! apply.

pub mod clock;
pub mod image_file;

use image::DynamicImage;
use log::debug;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::DeviceConfig;
use crate::display::pipeline::RenderSettings;
use crate::playlist::PluginInstance;

pub use clock::ClockPlugin;
pub use image_file::ImageFilePlugin;

/// Settings blob attached to a plugin instance
pub type Settings = Map<String, Value>;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("Missing setting: {0}")]
    MissingSetting(String),

    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("No images found in {0}")]
    NoImages(PathBuf),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plugin failed: {0}")]
    Failed(String),
}

pub trait Plugin: Send + Sync {
    fn id(&self) -> &str;

    /// Produce the image for one instance
    fn generate_image(&self, settings: &Settings, config: &DeviceConfig) -> Result<DynamicImage, PluginError>;

    /// Settings handed to the display when the instance has none of its own
    fn render_settings(&self) -> RenderSettings {
        RenderSettings::empty()
    }
}

/// String setting, `MissingSetting` when absent
pub fn required_str<'a>(settings: &'a Settings, key: &str) -> Result<&'a str, PluginError> {
    match settings.get(key) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(PluginError::InvalidSetting { key: key.to_string(), reason: "expected a string".into() }),
        None => Err(PluginError::MissingSetting(key.to_string())),
    }
}

pub fn optional_str<'a>(settings: &'a Settings, key: &str) -> Option<&'a str> {
    settings.get(key).and_then(Value::as_str)
}

/// Plugin type id to implementation
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        Self::new()
            .with(ImageFilePlugin)
            .with(ClockPlugin)
    }

    pub fn with<P: Plugin + 'static>(mut self, plugin: P) -> Self {
        self.register(Arc::new(plugin));
        self
    }

    /// Add or replace a plugin under its id
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        debug!("plugin {} registered", plugin.id());
        self.plugins.insert(plugin.id().to_string(), plugin);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Render settings for an instance: its own `image_settings` list if
    /// present, else the plugin default.
    pub fn render_settings_for(&self, instance: &PluginInstance) -> RenderSettings {
        if let Some(Value::Array(items)) = instance.settings.get("image_settings") {
            return RenderSettings::new(items.iter().filter_map(Value::as_str));
        }
        self.get(&instance.plugin_id)
            .map(|p| p.render_settings())
            .unwrap_or_else(RenderSettings::empty)
    }

    pub fn generate(&self, instance: &PluginInstance, config: &DeviceConfig) -> Result<DynamicImage, PluginError> {
        let plugin = self
            .get(&instance.plugin_id)
            .ok_or_else(|| PluginError::UnknownPlugin(instance.plugin_id.clone()))?;
        debug!("generating {} via {}", instance.name, plugin.id());
        plugin.generate_image(&instance.settings, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use image::RgbImage;
    use serde_json::json;
    use std::time::Duration;

    struct Solid;

    impl Plugin for Solid {
        fn id(&self) -> &str {
            "solid"
        }

        fn generate_image(&self, _settings: &Settings, config: &DeviceConfig) -> Result<DynamicImage, PluginError> {
            let (w, h) = config.canvas_size();
            Ok(DynamicImage::ImageRgb8(RgbImage::new(w, h)))
        }

        fn render_settings(&self) -> RenderSettings {
            RenderSettings::new(["pad"])
        }
    }

    fn settings(v: Value) -> Settings {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_builtin_ids() {
        assert_eq!(PluginRegistry::builtin().ids(), vec!["clock", "image_file"]);
    }

    #[test]
    fn test_unknown_plugin() {
        let registry = PluginRegistry::new();
        let inst = PluginInstance::new("x", "weather", Duration::from_secs(1));
        let err = registry.generate(&inst, &DeviceConfig::new(Config::default(), None)).err().unwrap();
        assert!(matches!(err, PluginError::UnknownPlugin(ref id) if id == "weather"));
    }

    #[test]
    fn test_render_settings_override() {
        let registry = PluginRegistry::new().with(Solid);
        let plain = PluginInstance::new("a", "solid", Duration::from_secs(1));
        assert_eq!(registry.render_settings_for(&plain), RenderSettings::new(["pad"]));

        let custom = plain.clone().with_settings(settings(json!({ "image_settings": ["keep-width"] })));
        assert_eq!(registry.render_settings_for(&custom), RenderSettings::new(["keep-width"]));
    }

    #[test]
    fn test_setting_helpers() {
        let s = settings(json!({ "path": "/tmp", "n": 3 }));
        assert_eq!(required_str(&s, "path").unwrap(), "/tmp");
        assert!(matches!(required_str(&s, "n"), Err(PluginError::InvalidSetting { .. })));
        assert!(matches!(required_str(&s, "nope"), Err(PluginError::MissingSetting(_))));
        assert_eq!(optional_str(&s, "n"), None);
    }
}
