/*
 *  display/drivers/waveshare.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Waveshare epdXinY black/white panels (UC8179 style controllers)
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
use log::{debug, info};
use std::time::{Duration, Instant};

use crate::display::drivers::bus::{BusyLevel, PanelBus, PinDefaults};
use crate::display::drivers::frame::{check_size, pack_mono};
use crate::display::error::DisplayError;
use crate::display::pipeline::RenderSettings;
use crate::display::traits::{ColorDepth, DisplayCapabilities, DisplayDriver};

const PANEL_SETTING: u8 = 0x00;
const POWER_SETTING: u8 = 0x01;
const POWER_OFF: u8 = 0x02;
const POWER_ON: u8 = 0x04;
const DEEP_SLEEP: u8 = 0x07;
const OLD_DATA: u8 = 0x10;
const DISPLAY_REFRESH: u8 = 0x12;
const NEW_DATA: u8 = 0x13;
const DUAL_SPI: u8 = 0x15;
const VCOM_DATA_INTERVAL: u8 = 0x50;
const TCON_SETTING: u8 = 0x60;
const RESOLUTION: u8 = 0x61;

/// Waveshare e-Paper HAT wiring, BUSY low while working
pub const WAVESHARE_PINS: PinDefaults = PinDefaults { dc: 25, rst: 17, busy: 24, busy_level: BusyLevel::Low };

const REFRESH_TIMEOUT: Duration = Duration::from_secs(20);
const SHORT_TIMEOUT: Duration = Duration::from_secs(5);
const MONO_THRESHOLD: u8 = 128;

pub struct WaveshareDriver<B: PanelBus> {
    bus: B,
    model: String,
    capabilities: DisplayCapabilities,
}

impl<B: PanelBus> WaveshareDriver<B> {
    pub fn new(bus: B, model: &str, width: u32, height: u32) -> Self {
        Self {
            bus,
            model: model.to_string(),
            capabilities: DisplayCapabilities {
                width,
                height,
                color_depth: ColorDepth::Monochrome,
                refresh_ms: 4_000,
            },
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        let (w, h) = (self.capabilities.width, self.capabilities.height);
        self.bus.reset()?;
        self.bus.command_with(POWER_SETTING, &[0x07, 0x07, 0x3F, 0x3F])?;
        self.bus.command(POWER_ON)?;
        self.bus.wait_idle(SHORT_TIMEOUT)?;
        // KW mode, OTP LUT
        self.bus.command_with(PANEL_SETTING, &[0x1F])?;
        self.bus.command_with(RESOLUTION, &[(w >> 8) as u8, w as u8, (h >> 8) as u8, h as u8])?;
        self.bus.command_with(DUAL_SPI, &[0x00])?;
        self.bus.command_with(VCOM_DATA_INTERVAL, &[0x10, 0x07])?;
        self.bus.command_with(TCON_SETTING, &[0x22])?;
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        self.bus.command(POWER_OFF)?;
        self.bus.wait_idle(SHORT_TIMEOUT)?;
        self.bus.command_with(DEEP_SLEEP, &[0xA5])
    }
}

impl<B: PanelBus> DisplayDriver for WaveshareDriver<B> {
    fn name(&self) -> &str {
        "waveshare"
    }

    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn render(&mut self, image: &RgbImage, settings: &RenderSettings) -> Result<(), DisplayError> {
        check_size(image, self.dimensions())?;
        let started = Instant::now();

        // controller wants 1 = black in the new data RAM
        let white_set = pack_mono(image, MONO_THRESHOLD);
        let frame: Vec<u8> = white_set.iter().map(|b| !b).collect();
        debug!("{} frame packed ({} bytes, settings {:?})", self.model, frame.len(), settings.as_slice());

        self.init()?;
        // old data RAM cleared so the full refresh has no ghost reference
        self.bus.command_with(OLD_DATA, &vec![0x00; frame.len()])?;
        self.bus.command_with(NEW_DATA, &frame)?;
        self.bus.command(DISPLAY_REFRESH)?;
        self.bus.wait_idle(REFRESH_TIMEOUT)?;
        self.sleep()?;

        info!("{} refresh complete in {} ms", self.model, started.elapsed().as_millis());
        Ok(())
    }
}

#[cfg(feature = "driver-waveshare")]
pub fn open(config: &crate::config::DisplayConfig) -> Result<WaveshareDriver<crate::display::drivers::bus::EpdBus>, DisplayError> {
    let bus = crate::display::drivers::bus::EpdBus::open(&config.bus, WAVESHARE_PINS)?;
    Ok(WaveshareDriver::new(bus, &config.display_type, config.width, config.height))
}
