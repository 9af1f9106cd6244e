/*
 *  display/pipeline.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Deterministic image transforms between plugin output and panel
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

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

use crate::config::{Enhancement, Orientation};

/// Per-image settings list handed through to the driver untouched.
///
/// The pipeline itself only looks at the fit policy:
/// - `keep-width`: crop to the panel aspect anchored at the top-left
/// - `pad` / `fit`: letterbox onto white instead of cropping
/// - anything else: centre crop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderSettings(Vec<String>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitPolicy {
    CenterCrop,
    KeepWidth,
    Pad,
}

impl RenderSettings {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(items.into_iter().map(Into::into).collect())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, setting: &str) -> bool {
        self.0.iter().any(|s| s == setting)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fit_policy(&self) -> FitPolicy {
        if self.contains("pad") || self.contains("fit") {
            FitPolicy::Pad
        } else if self.contains("keep-width") {
            FitPolicy::KeepWidth
        } else {
            FitPolicy::CenterCrop
        }
    }
}

/// Vertical panels are driven rotated a quarter turn counter-clockwise.
pub fn change_orientation(image: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Horizontal => image,
        Orientation::Vertical => image.rotate270(),
    }
}

/// Bring `image` to exactly `size`, honouring the settings' fit policy.
pub fn resize_image(image: DynamicImage, size: (u32, u32), settings: &RenderSettings) -> DynamicImage {
    let (target_w, target_h) = (size.0.max(1), size.1.max(1));
    let (img_w, img_h) = image.dimensions();
    if (img_w, img_h) == (target_w, target_h) {
        return image;
    }

    match settings.fit_policy() {
        FitPolicy::Pad => {
            let scaled = image.resize(target_w, target_h, FilterType::Lanczos3);
            let mut canvas = DynamicImage::ImageRgb8(RgbImage::from_pixel(
                target_w,
                target_h,
                Rgb([255, 255, 255]),
            ));
            let x = (target_w - scaled.width()) / 2;
            let y = (target_h - scaled.height()) / 2;
            imageops::overlay(&mut canvas, &scaled, x as i64, y as i64);
            canvas
        }
        policy => {
            let img_ratio = img_w as f64 / img_h as f64;
            let target_ratio = target_w as f64 / target_h as f64;
            let centred = policy == FitPolicy::CenterCrop;

            let (mut x, mut y, mut w, mut h) = (0, 0, img_w, img_h);
            if img_ratio > target_ratio {
                w = ((img_h as f64 * target_ratio) as u32).clamp(1, img_w);
                if centred {
                    x = (img_w - w) / 2;
                }
            } else {
                h = ((img_w as f64 / target_ratio) as u32).clamp(1, img_h);
                if centred {
                    y = (img_h - h) / 2;
                }
            }
            image
                .crop_imm(x, y, w, h)
                .resize_exact(target_w, target_h, FilterType::Lanczos3)
        }
    }
}

/// ITU-R 601-2 luma, the same weights the grayscale conversions use.
#[inline]
fn luma(p: &Rgb<u8>) -> f32 {
    (p[0] as f32 * 299.0 + p[1] as f32 * 587.0 + p[2] as f32 * 114.0) / 1000.0
}

/// `degenerate + factor * (image - degenerate)`, per channel.
fn blend(degenerate: &RgbImage, image: &RgbImage, factor: f32) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let d = degenerate.get_pixel(x, y);
        let s = image.get_pixel(x, y);
        Rgb(std::array::from_fn(|c| {
            let v = d[c] as f32 + factor * (s[c] as f32 - d[c] as f32);
            v.round().clamp(0.0, 255.0) as u8
        }))
    })
}

fn grayscale(image: &RgbImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let l = luma(image.get_pixel(x, y)).round() as u8;
        Rgb([l, l, l])
    })
}

/// 3x3 smoothing (centre weight 5), border pixels kept as-is.
fn smooth(image: &RgbImage) -> RgbImage {
    const KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];
    const SUM: f32 = 13.0;
    let (w, h) = image.dimensions();
    let mut out = image.clone();
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut acc = [0f32; 3];
            for (k, weight) in KERNEL.iter().enumerate() {
                let px = image.get_pixel(x + (k as u32 % 3) - 1, y + (k as u32 / 3) - 1);
                for c in 0..3 {
                    acc[c] += px[c] as f32 * weight;
                }
            }
            out.put_pixel(x, y, Rgb(acc.map(|v| (v / SUM).round().clamp(0.0, 255.0) as u8)));
        }
    }
    out
}

pub fn adjust_brightness(image: &RgbImage, factor: f32) -> RgbImage {
    let black = RgbImage::new(image.width(), image.height());
    blend(&black, image, factor)
}

pub fn adjust_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let count = (image.width() as u64 * image.height() as u64).max(1);
    let mean = (image.pixels().map(|p| luma(p) as u64).sum::<u64>() as f32 / count as f32 + 0.5) as u8;
    let gray = RgbImage::from_pixel(image.width(), image.height(), Rgb([mean, mean, mean]));
    blend(&gray, image, factor)
}

pub fn adjust_saturation(image: &RgbImage, factor: f32) -> RgbImage {
    blend(&grayscale(image), image, factor)
}

pub fn adjust_sharpness(image: &RgbImage, factor: f32) -> RgbImage {
    blend(&smooth(image), image, factor)
}

/// Apply the configured enhancement chain; identity factors are skipped.
pub fn apply_image_enhancement(image: RgbImage, settings: &Enhancement) -> RgbImage {
    if settings.is_identity() {
        return image;
    }
    let mut image = image;
    if settings.brightness != 1.0 {
        image = adjust_brightness(&image, settings.brightness);
    }
    if settings.contrast != 1.0 {
        image = adjust_contrast(&image, settings.contrast);
    }
    if settings.saturation != 1.0 {
        image = adjust_saturation(&image, settings.saturation);
    }
    if settings.sharpness != 1.0 {
        image = adjust_sharpness(&image, settings.sharpness);
    }
    image
}

/// Panel side parameters for one pass of the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct FrameSpec {
    pub resolution: (u32, u32),
    pub orientation: Orientation,
    pub inverted: bool,
    pub enhancement: Enhancement,
}

/// Orientation, resize, 180° inversion, enhancement. In that order.
pub fn prepare_frame(image: DynamicImage, spec: &FrameSpec, settings: &RenderSettings) -> RgbImage {
    let image = change_orientation(image, spec.orientation);
    let image = resize_image(image, spec.resolution, settings);
    let image = if spec.inverted { image.rotate180() } else { image };
    apply_image_enhancement(image.to_rgb8(), &spec.enhancement)
}
