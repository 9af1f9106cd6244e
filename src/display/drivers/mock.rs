/*
 *  display/drivers/mock.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Mock display driver for development and testing without hardware
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
use log::info;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::DisplayConfig;
use crate::display::error::DisplayError;
use crate::display::pipeline::RenderSettings;
use crate::display::traits::{ColorDepth, DisplayCapabilities, DisplayDriver};

/// Mock display driver
///
/// Accepts frames like a panel would, optionally writing each one to
/// `<output_dir>/latest.png` so development builds can be watched from a
/// browser or image viewer. All activity is recorded in a shared state that
/// tests can inspect.
#[derive(Debug, Clone)]
pub struct MockDriver {
    capabilities: DisplayCapabilities,
    output_dir: Option<PathBuf>,
    state: Arc<Mutex<MockDriverState>>,
}

/// Internal state for the mock driver (shared for inspection in tests)
#[derive(Debug, Default)]
pub struct MockDriverState {
    /// Number of completed render() calls
    pub render_count: usize,

    /// Settings passed with the last frame
    pub last_settings: Option<RenderSettings>,

    /// Last frame received
    pub last_frame: Option<RgbImage>,

    /// Simulate failures (for error testing)
    pub simulate_render_failure: bool,
}

impl MockDriver {
    pub fn new(config: &DisplayConfig) -> Result<Self, DisplayError> {
        std::fs::create_dir_all(&config.mock_output_dir)?;
        info!("Mock display writing frames to {}", config.mock_output_dir.display());
        let mut driver = Self::in_memory(config.width, config.height);
        driver.output_dir = Some(config.mock_output_dir.clone());
        Ok(driver)
    }

    /// Mock that keeps frames in memory only
    pub fn in_memory(width: u32, height: u32) -> Self {
        Self {
            capabilities: DisplayCapabilities {
                width,
                height,
                color_depth: ColorDepth::Rgb,
                refresh_ms: 0,
            },
            output_dir: None,
            state: Arc::new(Mutex::new(MockDriverState::default())),
        }
    }

    /// Get reference to state for inspection in tests
    pub fn state(&self) -> Arc<Mutex<MockDriverState>> {
        Arc::clone(&self.state)
    }

    pub fn render_count(&self) -> usize {
        self.state.lock().map(|s| s.render_count).unwrap_or_default()
    }
}

impl DisplayDriver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn render(&mut self, image: &RgbImage, settings: &RenderSettings) -> Result<(), DisplayError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| DisplayError::Driver("mock state poisoned".to_string()))?;

        if state.simulate_render_failure {
            return Err(DisplayError::Driver("Simulated render failure".to_string()));
        }

        if let Some(dir) = self.output_dir.as_ref() {
            image.save(dir.join("latest.png"))?;
        }

        state.render_count += 1;
        state.last_settings = Some(settings.clone());
        state.last_frame = Some(image.clone());
        Ok(())
    }
}
