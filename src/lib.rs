/*
 *  lib.rs
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

//! Playlist driven refresh for slow e-paper panels.
//!
//! The binary wires these together in `main.rs`; tests and other front
//! ends can build the same graph by hand:
//!
//! `DeviceConfig` -> `DriverRegistry` -> `DisplayManager`,
//! `PlaylistManager` + `PluginRegistry` -> `RefreshScheduler`.

pub mod config;
pub mod display;
pub mod playlist;
pub mod plugins;
pub mod scheduler;
pub mod trigger;

pub use config::{Cli, Config, ConfigError, DeviceConfig};
pub use display::{DisplayManager, DriverRegistry, RenderSettings};
pub use playlist::{Playlist, PlaylistManager, PluginInstance, SharedPlaylists};
pub use plugins::{Plugin, PluginError, PluginRegistry};
pub use scheduler::{RefreshAction, RefreshError, RefreshPhase, RefreshScheduler};
pub use trigger::{Trigger, TriggerHandle};
