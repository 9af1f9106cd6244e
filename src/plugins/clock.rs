/*
 *  plugins/clock.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Large centred clock face
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

use chrono::Local;
use embedded_graphics::mono_font::{ascii::FONT_10X20, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use std::fmt::Write;

use crate::config::DeviceConfig;
use crate::display::canvas::ImageCanvas;
use crate::display::overlay::measure_text;
use crate::plugins::{optional_str, Plugin, PluginError, Settings};

const DEFAULT_FORMAT: &str = "%H:%M";
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

pub struct ClockPlugin;

/// strftime style formatting that reports bad specifiers instead of panicking
pub fn format_now(fmt: &str) -> Result<String, PluginError> {
    let mut out = String::new();
    write!(out, "{}", Local::now().format(fmt)).map_err(|_| PluginError::InvalidSetting {
        key: "format".to_string(),
        reason: format!("bad time format {:?}", fmt),
    })?;
    Ok(out)
}

/// Black text scaled up by whole pixels to fill most of a white canvas
pub fn render_text(text: &str, size: (u32, u32)) -> Result<RgbImage, PluginError> {
    let (width, height) = size;
    let extent = measure_text(text);
    let (tw, th) = (extent.width.max(1), extent.height.max(1));

    let mut glyphs = RgbImage::from_pixel(tw, th, WHITE);
    Text::with_baseline(text, Point::zero(), MonoTextStyle::new(&FONT_10X20, Rgb888::BLACK), Baseline::Top)
        .draw(&mut ImageCanvas::new(&mut glyphs))
        .map_err(|e| PluginError::Failed(format!("{:?}", e)))?;

    // 80% of the width, half the height
    let scale = (width * 4 / 5 / tw).min(height / 2 / th).max(1);
    let glyphs = imageops::resize(&glyphs, tw * scale, th * scale, FilterType::Nearest);

    let mut canvas = RgbImage::from_pixel(width, height, WHITE);
    let x = (i64::from(width) - i64::from(glyphs.width())) / 2;
    let y = (i64::from(height) - i64::from(glyphs.height())) / 2;
    imageops::overlay(&mut canvas, &glyphs, x, y);
    Ok(canvas)
}

impl Plugin for ClockPlugin {
    fn id(&self) -> &str {
        "clock"
    }

    fn generate_image(&self, settings: &Settings, config: &DeviceConfig) -> Result<DynamicImage, PluginError> {
        let text = format_now(optional_str(settings, "format").unwrap_or(DEFAULT_FORMAT))?;
        Ok(DynamicImage::ImageRgb8(render_text(&text, config.canvas_size())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Orientation};

    #[test]
    fn test_render_is_centred_and_large() {
        let img = render_text("12:34", (800, 480)).unwrap();
        assert_eq!(img.dimensions(), (800, 480));
        // corners untouched
        assert_eq!(img.get_pixel(0, 0), &WHITE);
        assert_eq!(img.get_pixel(799, 479), &WHITE);

        let dark: Vec<(u32, u32)> = img
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] < 128)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!dark.is_empty());
        let min_x = dark.iter().map(|d| d.0).min().unwrap();
        let max_x = dark.iter().map(|d| d.0).max().unwrap();
        assert!(max_x - min_x > 300, "text spans only {} px", max_x - min_x);
    }

    #[test]
    fn test_tiny_canvas_does_not_panic() {
        let img = render_text("12:34", (8, 8)).unwrap();
        assert_eq!(img.dimensions(), (8, 8));
    }

    #[test]
    fn test_bad_format_is_an_error() {
        assert!(format_now("%H:%M").is_ok());
        assert!(matches!(format_now("%Q"), Err(PluginError::InvalidSetting { .. })));
    }

    #[test]
    fn test_vertical_canvas() {
        let mut cfg = Config::default();
        cfg.display.orientation = Orientation::Vertical;
        let img = ClockPlugin
            .generate_image(&Settings::new(), &DeviceConfig::new(cfg, None))
            .unwrap();
        assert_eq!((img.width(), img.height()), (480, 800));
    }
}
