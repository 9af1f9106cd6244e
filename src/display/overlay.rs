/*
 *  display/overlay.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Status text boxes composited onto the last rendered image
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

use embedded_graphics::mono_font::{ascii::FONT_10X20, MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyleBuilder, Rectangle, RoundedRectangle};
use embedded_graphics::text::{Baseline, Text};
use image::RgbImage;

use crate::display::canvas::ImageCanvas;
use crate::display::error::OverlayError;

/// Space between text and box edge
pub const PADDING: u32 = 8;
/// Space between box and canvas edge
pub const INSET: u32 = 10;
const CORNER_RADIUS: u32 = 6;
const FONT: &MonoFont<'static> = &FONT_10X20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAnchor {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAnchor {
    Top,
    Bottom,
}

/// Where the status box sits. Parsed leniently: only "right" and "bottom"
/// are recognised, everything else anchors left / top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayPosition {
    pub horizontal: HAnchor,
    pub vertical: VAnchor,
}

impl OverlayPosition {
    pub fn new(horizontal: &str, vertical: &str) -> Self {
        Self {
            horizontal: if horizontal == "right" { HAnchor::Right } else { HAnchor::Left },
            vertical: if vertical == "bottom" { VAnchor::Bottom } else { VAnchor::Top },
        }
    }
}

impl Default for OverlayPosition {
    fn default() -> Self {
        Self { horizontal: HAnchor::Right, vertical: VAnchor::Bottom }
    }
}

impl From<(&str, &str)> for OverlayPosition {
    fn from((h, v): (&str, &str)) -> Self {
        Self::new(h, v)
    }
}

/// Text extent in pixels, estimated from the glyph cell when the layout
/// yields nothing measurable.
pub fn measure_text(text: &str) -> Size {
    let style = MonoTextStyle::new(FONT, Rgb888::WHITE);
    let measured = Text::with_baseline(text, Point::zero(), style, Baseline::Top)
        .bounding_box()
        .size;
    if measured.width > 0 && measured.height > 0 {
        return measured;
    }
    let cell = FONT.character_size;
    Size::new(cell.width * text.chars().count() as u32, cell.height)
}

/// Box covering the text plus padding, anchored inside the canvas.
/// Corners are inclusive, so the box spans `size + 1` pixels per axis.
pub fn overlay_box(canvas: (u32, u32), text: Size, position: OverlayPosition) -> Rectangle {
    let box_w = text.width + PADDING * 2;
    let box_h = text.height + PADDING * 2;
    let x = match position.horizontal {
        HAnchor::Right => canvas.0 as i32 - box_w as i32 - INSET as i32,
        HAnchor::Left => INSET as i32,
    };
    let y = match position.vertical {
        VAnchor::Bottom => canvas.1 as i32 - box_h as i32 - INSET as i32,
        VAnchor::Top => INSET as i32,
    };
    Rectangle::new(Point::new(x, y), Size::new(box_w + 1, box_h + 1))
}

/// Draw the status box and text onto `base`
pub fn compose_overlay(mut base: RgbImage, text: &str, position: OverlayPosition) -> Result<RgbImage, OverlayError> {
    let (width, height) = base.dimensions();
    if width == 0 || height == 0 {
        return Err(OverlayError::DoesNotFit { width, height });
    }

    let text_size = measure_text(text);
    let area = overlay_box((width, height), text_size, position);

    let box_style = PrimitiveStyleBuilder::new()
        .fill_color(Rgb888::BLACK)
        .stroke_color(Rgb888::WHITE)
        .stroke_width(1)
        .build();
    let text_style = MonoTextStyle::new(FONT, Rgb888::WHITE);

    let mut canvas = ImageCanvas::new(&mut base);
    RoundedRectangle::with_equal_corners(area, Size::new(CORNER_RADIUS, CORNER_RADIUS))
        .into_styled(box_style)
        .draw(&mut canvas)
        .map_err(|e| OverlayError::Drawing(format!("{:?}", e)))?;
    Text::with_baseline(
        text,
        area.top_left + Point::new(PADDING as i32, PADDING as i32),
        text_style,
        Baseline::Top,
    )
    .draw(&mut canvas)
    .map_err(|e| OverlayError::Drawing(format!("{:?}", e)))?;

    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_position_parsing_falls_back() {
        assert_eq!(OverlayPosition::new("right", "bottom"), OverlayPosition::default());
        let p = OverlayPosition::from(("centre", "middle"));
        assert_eq!(p.horizontal, HAnchor::Left);
        assert_eq!(p.vertical, VAnchor::Top);
    }

    #[test]
    fn test_measure_uses_glyph_cells() {
        let size = measure_text("Updating...");
        assert_eq!(size, Size::new(110, 20));
        // nothing to lay out, estimate from the char count
        assert_eq!(measure_text(""), Size::new(0, 20));
    }

    #[test]
    fn test_box_anchors() {
        let text = Size::new(100, 20);
        let br = overlay_box((800, 480), text, OverlayPosition::new("right", "bottom"));
        assert_eq!(br.top_left, Point::new(800 - 116 - 10, 480 - 36 - 10));
        let tl = overlay_box((800, 480), text, OverlayPosition::new("x", "y"));
        assert_eq!(tl.top_left, Point::new(10, 10));
        assert_eq!(tl.size, Size::new(117, 37));
    }

    #[test]
    fn test_compose_only_touches_box() {
        let base = RgbImage::from_pixel(200, 100, Rgb([200, 200, 200]));
        let position = OverlayPosition::default();
        let out = compose_overlay(base.clone(), "busy", position).unwrap();
        let area = overlay_box((200, 100), measure_text("busy"), position);

        let mut changed_inside = false;
        for (x, y, px) in out.enumerate_pixels() {
            if area.contains(Point::new(x as i32, y as i32)) {
                changed_inside |= px != base.get_pixel(x, y);
            } else {
                assert_eq!(px, base.get_pixel(x, y), "pixel {},{} outside the box changed", x, y);
            }
        }
        assert!(changed_inside);
    }

    #[test]
    fn test_zero_canvas_errors() {
        assert!(compose_overlay(RgbImage::new(0, 0), "x", OverlayPosition::default()).is_err());
    }
}
