/*
 *  display/manager.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display manager - owns the panel driver, the frame pipeline and the
 *  status overlay path
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

use image::{DynamicImage, ImageFormat, RgbImage};
use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::config::{DeviceConfig, Enhancement};
use crate::display::error::{DisplayError, DisplayFactoryError, OverlayError};
use crate::display::factory::{BoxedDriver, DriverRegistry};
use crate::display::overlay::{compose_overlay, OverlayPosition};
use crate::display::pipeline::{prepare_frame, resize_image, FrameSpec, RenderSettings};

/// Display manager
///
/// The driver is chosen once at construction and sits behind a mutex, so
/// scheduled renders and status overlays can never reach the panel at the
/// same time.
pub struct DisplayManager {
    driver: Mutex<Option<BoxedDriver>>,
    config: Arc<DeviceConfig>,
}

impl DisplayManager {
    /// Resolve the configured display type through `registry`
    pub fn new(config: Arc<DeviceConfig>, registry: &DriverRegistry) -> Result<Self, DisplayFactoryError> {
        let driver = registry.create(&config.display())?;
        Ok(Self::with_driver(config, driver))
    }

    pub fn with_driver(config: Arc<DeviceConfig>, driver: BoxedDriver) -> Self {
        let caps = driver.capabilities();
        info!(
            "Display manager ready: {} {}x{} ({:?})",
            driver.name(),
            caps.width,
            caps.height,
            caps.color_depth
        );
        Self { driver: Mutex::new(Some(driver)), config }
    }

    pub fn config(&self) -> &Arc<DeviceConfig> {
        &self.config
    }

    pub fn driver_name(&self) -> Option<String> {
        self.lock_driver().ok()?.as_ref().map(|d| d.name().to_string())
    }

    /// Release the driver. Later renders fail with `NoDriver`.
    pub fn shutdown(&self) {
        match self.lock_driver() {
            Ok(mut guard) => {
                if let Some(driver) = guard.take() {
                    info!("Display driver {} released", driver.name());
                }
            }
            Err(e) => warn!("Display shutdown: {}", e),
        }
    }

    fn lock_driver(&self) -> Result<MutexGuard<'_, Option<BoxedDriver>>, DisplayError> {
        self.driver
            .lock()
            .map_err(|_| DisplayError::Driver("driver lock poisoned".to_string()))
    }

    fn frame_spec(&self) -> FrameSpec {
        FrameSpec {
            resolution: self.config.resolution(),
            orientation: self.config.orientation(),
            inverted: self.config.inverted(),
            enhancement: self.config.enhancement(),
        }
    }

    fn dispatch(&self, frame: &RgbImage, settings: &RenderSettings) -> Result<(), DisplayError> {
        let mut guard = self.lock_driver()?;
        let driver = guard.as_mut().ok_or(DisplayError::NoDriver)?;
        driver.render(frame, settings)
    }

    /// Snapshot, transform and push `image` to the panel.
    ///
    /// The snapshot holds the image exactly as the plugin produced it; the
    /// panel receives the oriented, resized and enhanced frame.
    pub fn display_image(&self, image: &DynamicImage, settings: &RenderSettings) -> Result<(), DisplayError> {
        if self.lock_driver()?.is_none() {
            return Err(DisplayError::NoDriver);
        }
        let started = Instant::now();

        let snapshot = self.config.current_image_path();
        save_snapshot(image, &snapshot)?;
        debug!("Snapshot written to {}", snapshot.display());

        let frame = prepare_frame(image.clone(), &self.frame_spec(), settings);
        self.dispatch(&frame, settings)?;

        info!(
            "Display updated ({}x{}) in {} ms",
            frame.width(),
            frame.height(),
            started.elapsed().as_millis()
        );
        Ok(())
    }

    /// Composite a status box onto the last snapshot and push it straight
    /// to the driver.
    ///
    /// The box is drawn in the viewer's frame; orientation and inversion
    /// are applied afterwards so anchors hold on any mounting.
    pub fn try_display_overlay(&self, text: &str, position: OverlayPosition) -> Result<(), OverlayError> {
        let base = self.overlay_base()?;
        let composed = compose_overlay(base, text, position)?;
        let spec = FrameSpec { enhancement: Enhancement::default(), ..self.frame_spec() };
        let frame = prepare_frame(DynamicImage::ImageRgb8(composed), &spec, &RenderSettings::empty());
        self.dispatch(&frame, &RenderSettings::empty())?;
        debug!("Overlay \"{}\" shown", text);
        Ok(())
    }

    /// Best effort status message. Failures are logged, never returned.
    pub fn display_overlay(&self, text: &str, position: (&str, &str)) {
        if let Err(e) = self.try_display_overlay(text, OverlayPosition::from(position)) {
            error!("Overlay \"{}\" not shown: {}", text, e);
        }
    }

    /// Last snapshot fitted to the canvas, or a white canvas when nothing
    /// has been rendered yet.
    fn overlay_base(&self) -> Result<RgbImage, OverlayError> {
        let path = self.config.current_image_path();
        let (width, height) = self.config.canvas_size();
        if !path.exists() {
            debug!("No snapshot at {}, overlay on blank canvas", path.display());
            return Ok(RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255])));
        }

        let snapshot = image::open(&path)?;
        Ok(resize_image(snapshot, (width, height), &RenderSettings::empty()).to_rgb8())
    }
}

fn save_snapshot(image: &DynamicImage, path: &Path) -> Result<(), DisplayError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
