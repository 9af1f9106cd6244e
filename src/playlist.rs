/*
 *  playlist.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Playlists of plugin instances and the rotation cursor
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

use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{Config, PlaylistConfig, PluginInstanceConfig};

/// Playlist manager shared between the scheduler and trigger sources
pub type SharedPlaylists = Arc<Mutex<PlaylistManager>>;

/// One configured use of a plugin inside a playlist
#[derive(Debug, Clone)]
pub struct PluginInstance {
    pub name: String,
    pub plugin_id: String,
    pub settings: Map<String, Value>,
    pub interval: Duration,
    last_refresh: Option<Instant>,
}

impl PluginInstance {
    pub fn new(name: &str, plugin_id: &str, interval: Duration) -> Self {
        Self {
            name: name.to_string(),
            plugin_id: plugin_id.to_string(),
            settings: Map::new(),
            interval,
            last_refresh: None,
        }
    }

    pub fn with_settings(mut self, settings: Map<String, Value>) -> Self {
        self.settings = settings;
        self
    }

    /// Completion time of the last successful render
    pub fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh
    }

    /// Only the scheduler records refreshes
    pub(crate) fn stamp(&mut self, at: Instant) {
        self.last_refresh = Some(at);
    }
}

impl From<&PluginInstanceConfig> for PluginInstance {
    fn from(cfg: &PluginInstanceConfig) -> Self {
        PluginInstance::new(&cfg.name, &cfg.plugin_id, Duration::from_secs(cfg.interval_secs))
            .with_settings(cfg.settings.clone())
    }
}

/// Ordered plugin instances with a cursor. The cursor is `None` until
/// something has been shown, otherwise it indexes `plugins`.
#[derive(Debug, Clone)]
pub struct Playlist {
    pub name: String,
    plugins: Vec<PluginInstance>,
    current_index: Option<usize>,
}

impl Playlist {
    pub fn new(name: &str, plugins: Vec<PluginInstance>) -> Self {
        Self { name: name.to_string(), plugins, current_index: None }
    }

    pub fn plugins(&self) -> &[PluginInstance] {
        &self.plugins
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    /// Plugin under the cursor; `None` when unset or out of range
    pub fn current_plugin(&self) -> Option<&PluginInstance> {
        self.current_index.and_then(|i| self.plugins.get(i))
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.plugins.iter().position(|p| p.name == name)
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginInstance> {
        self.plugins.iter().find(|p| p.name == name)
    }

    pub(crate) fn plugin_mut(&mut self, name: &str) -> Option<&mut PluginInstance> {
        self.plugins.iter_mut().find(|p| p.name == name)
    }

    /// Index the cursor would move to: first entry from an unset cursor,
    /// otherwise the next one, wrapping.
    pub fn successor_index(&self) -> Option<usize> {
        if self.plugins.is_empty() {
            return None;
        }
        Some(match self.current_index {
            None => 0,
            Some(i) => (i + 1) % self.plugins.len(),
        })
    }

    /// Move the cursor forward one step and return the new current plugin
    pub fn advance_cyclic(&mut self) -> Option<&PluginInstance> {
        let next = self.successor_index()?;
        self.current_index = Some(next);
        self.plugins.get(next)
    }

    /// Point the cursor at `index`; refused when out of range
    pub fn set_current_index(&mut self, index: usize) -> bool {
        if index < self.plugins.len() {
            self.current_index = Some(index);
            true
        } else {
            warn!("playlist {}: index {} out of range ({} plugins)", self.name, index, self.plugins.len());
            false
        }
    }

    pub fn add_plugin(&mut self, plugin: PluginInstance) -> bool {
        if self.find(&plugin.name).is_some() {
            return false;
        }
        self.plugins.push(plugin);
        true
    }

    /// Remove by name. The cursor keeps pointing at the same plugin where
    /// possible and falls back one slot when its plugin goes.
    pub fn remove_plugin(&mut self, name: &str) -> Option<PluginInstance> {
        let idx = self.find(name)?;
        let removed = self.plugins.remove(idx);
        self.current_index = match self.current_index {
            _ if self.plugins.is_empty() => None,
            Some(c) if c > idx => Some(c - 1),
            Some(c) if c == idx => Some(c.checked_sub(1).unwrap_or(self.plugins.len() - 1)),
            other => other,
        };
        debug!("playlist {}: removed {}", self.name, name);
        Some(removed)
    }

    #[cfg(test)]
    pub(crate) fn force_index(&mut self, index: Option<usize>) {
        self.current_index = index;
    }
}

impl From<&PlaylistConfig> for Playlist {
    fn from(cfg: &PlaylistConfig) -> Self {
        Playlist::new(&cfg.name, cfg.plugins.iter().map(PluginInstance::from).collect())
    }
}

/// All playlists plus the name of the active one
#[derive(Debug, Clone, Default)]
pub struct PlaylistManager {
    playlists: Vec<Playlist>,
    active: Option<String>,
}

impl PlaylistManager {
    pub fn new(playlists: Vec<Playlist>, active: Option<&str>) -> Self {
        Self { playlists, active: active.map(str::to_string) }
    }

    /// Build from config. Without an explicit active playlist the first
    /// one is used.
    pub fn from_config(cfg: &Config) -> Self {
        let playlists: Vec<Playlist> = cfg.playlists.iter().map(Playlist::from).collect();
        let active = cfg
            .active_playlist
            .clone()
            .or_else(|| playlists.first().map(|p| p.name.clone()));
        info!(
            "{} playlist(s) loaded, active: {}",
            playlists.len(),
            active.as_deref().unwrap_or("none")
        );
        Self { playlists, active }
    }

    pub fn shared(self) -> SharedPlaylists {
        Arc::new(Mutex::new(self))
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn set_active(&mut self, name: &str) -> bool {
        if self.get_playlist(name).is_none() {
            warn!("unknown playlist {}", name);
            return false;
        }
        self.active = Some(name.to_string());
        true
    }

    pub fn active_playlist(&self) -> Option<&Playlist> {
        self.get_playlist(self.active.as_deref()?)
    }

    pub fn active_playlist_mut(&mut self) -> Option<&mut Playlist> {
        let name = self.active.clone()?;
        self.get_playlist_mut(&name)
    }

    pub fn get_playlist(&self, name: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.name == name)
    }

    pub fn get_playlist_mut(&mut self, name: &str) -> Option<&mut Playlist> {
        self.playlists.iter_mut().find(|p| p.name == name)
    }

    pub fn playlist_names(&self) -> Vec<&str> {
        self.playlists.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn add_playlist(&mut self, playlist: Playlist) -> bool {
        if self.get_playlist(&playlist.name).is_some() {
            return false;
        }
        self.playlists.push(playlist);
        true
    }
}
