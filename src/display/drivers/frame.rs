/*
 *  display/drivers/frame.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Panel framing: palette quantisation and bit packing
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

use image::{Rgb, RgbImage};

use crate::display::error::DisplayError;

/// Ensure the frame matches the panel geometry before packing
pub fn check_size(image: &RgbImage, expected: (u32, u32)) -> Result<(), DisplayError> {
    let actual = image.dimensions();
    if actual != expected {
        return Err(DisplayError::FrameSizeMismatch { expected, actual });
    }
    Ok(())
}

/// Pack to 1 bit per pixel, rows padded to a whole byte, MSB first.
/// A set bit is a white pixel.
pub fn pack_mono(image: &RgbImage, threshold: u8) -> Vec<u8> {
    let (w, h) = image.dimensions();
    let stride = w.div_ceil(8) as usize;
    let mut bytes = vec![0u8; stride * h as usize];

    for (x, y, px) in image.enumerate_pixels() {
        let l = (px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114) / 1000;
        if l >= threshold as u32 {
            bytes[y as usize * stride + (x / 8) as usize] |= 0x80 >> (x % 8);
        }
    }
    bytes
}

/// Fixed ink palette, index order is the controller's colour code.
pub struct Palette(pub &'static [Rgb<u8>]);

/// Inky Impression 7 colour ACeP inks, approximate sRGB.
pub const ACEP7: Palette = Palette(&[
    Rgb([0, 0, 0]),       // black
    Rgb([255, 255, 255]), // white
    Rgb([0, 255, 0]),     // green
    Rgb([0, 0, 255]),     // blue
    Rgb([255, 0, 0]),     // red
    Rgb([255, 255, 0]),   // yellow
    Rgb([255, 140, 0]),   // orange
]);

impl Palette {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the nearest ink by squared RGB distance
    pub fn nearest(&self, px: &Rgb<u8>) -> u8 {
        let dist = |c: &Rgb<u8>| {
            (0..3)
                .map(|i| {
                    let d = px[i] as i32 - c[i] as i32;
                    d * d
                })
                .sum::<i32>()
        };
        self.0
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| dist(c))
            .map(|(i, _)| i as u8)
            .unwrap_or(0)
    }

    /// Quantise and pack 2 pixels per byte (high nibble first)
    pub fn pack_4bpp(&self, image: &RgbImage) -> Vec<u8> {
        let (w, h) = image.dimensions();
        let stride = w.div_ceil(2) as usize;
        let mut bytes = vec![0u8; stride * h as usize];

        for (x, y, px) in image.enumerate_pixels() {
            let code = self.nearest(px) & 0x0F;
            let idx = y as usize * stride + (x / 2) as usize;
            if x % 2 == 0 {
                bytes[idx] |= code << 4;
            } else {
                bytes[idx] |= code;
            }
        }
        bytes
    }
}
