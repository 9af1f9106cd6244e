/*
 *  display/mod.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display subsystem - driver registry, frame pipeline, overlay
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

// Core trait definitions
pub mod traits;
pub mod error;
pub mod factory;

// Panel drivers; hardware access gated by the driver-* features
pub mod drivers;

// Raster helpers
pub mod canvas;
pub mod pipeline;
pub mod overlay;

// Display manager
pub mod manager;

// Re-exports for convenience
pub use traits::{DisplayDriver, DisplayCapabilities, ColorDepth};
pub use error::{DisplayError, DisplayFactoryError, OverlayError};
pub use factory::{BoxedDriver, DriverMatcher, DriverRegistry};
pub use manager::DisplayManager;
pub use overlay::OverlayPosition;
pub use pipeline::{FitPolicy, RenderSettings};
