/*
 *  display/traits.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Core trait definitions for display driver abstraction
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

use image::RgbImage;

use crate::display::error::DisplayError;
use crate::display::pipeline::RenderSettings;

/// Color capabilities of the panel families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorDepth {
    /// Black/white panels (1-bit per pixel)
    /// Used by: most Waveshare epdXinY models
    Monochrome,

    /// Fixed ink palette with the given number of colours
    /// Used by: Inky Impression (7 colour ACeP)
    Palette(u8),

    /// Full 24-bit RGB, used by the mock target
    Rgb,
}

/// Display capabilities and metadata
#[derive(Debug, Clone)]
pub struct DisplayCapabilities {
    /// Display width in pixels
    pub width: u32,

    /// Display height in pixels
    pub height: u32,

    /// Colour handling of the panel
    pub color_depth: ColorDepth,

    /// Typical full refresh duration in milliseconds
    pub refresh_ms: u64,
}

/// Minimal hardware abstraction - every panel driver implements this trait
///
/// `render` receives an image already oriented and sized for the panel.
/// Implementations may block for the whole (slow) refresh, must tolerate
/// being called repeatedly, and must not keep the image after returning.
pub trait DisplayDriver: Send {
    /// Short driver name for logs
    fn name(&self) -> &str;

    /// Returns the capabilities of this display
    fn capabilities(&self) -> &DisplayCapabilities;

    /// Returns the display dimensions as (width, height)
    fn dimensions(&self) -> (u32, u32) {
        let caps = self.capabilities();
        (caps.width, caps.height)
    }

    /// Push one frame to the panel
    fn render(&mut self, image: &RgbImage, settings: &RenderSettings) -> Result<(), DisplayError>;
}
