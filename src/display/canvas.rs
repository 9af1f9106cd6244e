/*
 *  display/canvas.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  embedded-graphics draw target over an RGB raster
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

use core::convert::Infallible;
use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use image::{Rgb, RgbImage};

/// Lets embedded-graphics primitives and mono fonts draw straight into an
/// `image::RgbImage`. Out of bounds pixels are clipped.
pub struct ImageCanvas<'a> {
    img: &'a mut RgbImage,
}

impl<'a> ImageCanvas<'a> {
    pub fn new(img: &'a mut RgbImage) -> Self {
        Self { img }
    }

    #[inline]
    fn in_bounds(&self, p: Point) -> Option<(u32, u32)> {
        if p.x >= 0 && p.y >= 0 {
            let (x, y) = (p.x as u32, p.y as u32);
            if x < self.img.width() && y < self.img.height() {
                return Some((x, y));
            }
        }
        None
    }
}

#[inline]
pub fn to_rgb(c: Rgb888) -> Rgb<u8> {
    Rgb([c.r(), c.g(), c.b()])
}

impl OriginDimensions for ImageCanvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.img.width(), self.img.height())
    }
}

impl DrawTarget for ImageCanvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if let Some((x, y)) = self.in_bounds(p) {
                self.img.put_pixel(x, y, to_rgb(c));
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        // fast path for the filled boxes, clipped to the raster
        let area = area.intersection(&self.bounding_box());
        let Some(bottom_right) = area.bottom_right() else { return Ok(()) };
        let px = to_rgb(color);
        for y in area.top_left.y..=bottom_right.y {
            for x in area.top_left.x..=bottom_right.x {
                self.img.put_pixel(x as u32, y as u32, px);
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let px = to_rgb(color);
        self.img.pixels_mut().for_each(|p| *p = px);
        Ok(())
    }
}
