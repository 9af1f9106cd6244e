/*
 *  display/drivers/inky.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Pimoroni Inky Impression (7 colour ACeP, UC8159 controller)
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
use crate::display::drivers::frame::{check_size, ACEP7};
use crate::display::error::DisplayError;
use crate::display::pipeline::RenderSettings;
use crate::display::traits::{ColorDepth, DisplayCapabilities, DisplayDriver};

// UC8159 command set
const PSR: u8 = 0x00;
const PWR: u8 = 0x01;
const POF: u8 = 0x02;
const PFS: u8 = 0x03;
const PON: u8 = 0x04;
const BTST: u8 = 0x06;
const DTM1: u8 = 0x10;
const DRF: u8 = 0x12;
const PLL: u8 = 0x30;
const TSE: u8 = 0x40;
const CDI: u8 = 0x50;
const TCON: u8 = 0x60;
const TRES: u8 = 0x61;
const PWS: u8 = 0xE3;

/// Inky HAT wiring, BUSY is active low
pub const INKY_PINS: PinDefaults = PinDefaults { dc: 22, rst: 27, busy: 17, busy_level: BusyLevel::Low };

/// ACeP full refresh takes ~30 s; give the controller headroom
const REFRESH_TIMEOUT: Duration = Duration::from_secs(45);
const SHORT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct InkyDriver<B: PanelBus> {
    bus: B,
    capabilities: DisplayCapabilities,
}

impl<B: PanelBus> InkyDriver<B> {
    pub fn new(bus: B, width: u32, height: u32) -> Self {
        Self {
            bus,
            capabilities: DisplayCapabilities {
                width,
                height,
                color_depth: ColorDepth::Palette(ACEP7.len() as u8),
                refresh_ms: 30_000,
            },
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Resolution select bits of PSR, 600x448 panels use 0b11, 640x400 0b10
    fn resolution_bits(&self) -> u8 {
        match (self.capabilities.width, self.capabilities.height) {
            (640, 400) => 0b10,
            _ => 0b11,
        }
    }

    fn setup(&mut self) -> Result<(), DisplayError> {
        let (w, h) = (self.capabilities.width, self.capabilities.height);
        self.bus.reset()?;
        self.bus.wait_idle(SHORT_TIMEOUT)?;

        self.bus.command_with(TRES, &[(w >> 8) as u8, w as u8, (h >> 8) as u8, h as u8])?;
        self.bus.command_with(PSR, &[(self.resolution_bits() << 6) | 0x2F, 0x08])?;
        self.bus.command_with(PWR, &[0x37, 0x00, 0x23, 0x23])?;
        self.bus.command_with(PLL, &[0x3C])?;
        self.bus.command_with(TSE, &[0x00])?;
        // border white, data interval
        self.bus.command_with(CDI, &[0x37])?;
        self.bus.command_with(TCON, &[0x22])?;
        self.bus.command_with(PWS, &[0xAA])?;
        self.bus.command_with(PFS, &[0x00])?;
        self.bus.command_with(BTST, &[0xC7, 0xC7, 0x1D])?;
        Ok(())
    }

    fn update(&mut self, frame: &[u8]) -> Result<(), DisplayError> {
        self.setup()?;
        self.bus.command_with(DTM1, frame)?;

        self.bus.command(PON)?;
        self.bus.wait_idle(SHORT_TIMEOUT)?;
        self.bus.command(DRF)?;
        self.bus.wait_idle(REFRESH_TIMEOUT)?;
        self.bus.command(POF)?;
        self.bus.wait_idle(SHORT_TIMEOUT)?;
        Ok(())
    }
}

impl<B: PanelBus> DisplayDriver for InkyDriver<B> {
    fn name(&self) -> &str {
        "inky"
    }

    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn render(&mut self, image: &RgbImage, settings: &RenderSettings) -> Result<(), DisplayError> {
        check_size(image, self.dimensions())?;
        let started = Instant::now();
        let frame = ACEP7.pack_4bpp(image);
        debug!("inky frame packed ({} bytes, settings {:?})", frame.len(), settings.as_slice());

        self.update(&frame)?;
        info!("Inky refresh complete in {} ms", started.elapsed().as_millis());
        Ok(())
    }
}

#[cfg(feature = "driver-inky")]
pub fn open(config: &crate::config::DisplayConfig) -> Result<InkyDriver<crate::display::drivers::bus::EpdBus>, DisplayError> {
    let bus = crate::display::drivers::bus::EpdBus::open(&config.bus, INKY_PINS)?;
    Ok(InkyDriver::new(bus, config.width, config.height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::drivers::bus::recording::{BusOp, RecordingBus};
    use image::Rgb;

    #[test]
    fn test_render_sequence() {
        let mut driver = InkyDriver::new(RecordingBus::default(), 600, 448);
        let img = RgbImage::from_pixel(600, 448, Rgb([255, 255, 255]));
        driver.render(&img, &RenderSettings::empty()).unwrap();

        let bus = driver.bus();
        assert_eq!(bus.ops[0], BusOp::Reset);
        assert_eq!(bus.data_after(TRES), Some(&[0x02, 0x58, 0x01, 0xC0][..]));
        let cmds = bus.commands();
        let pos = |c| cmds.iter().position(|&x| x == c).unwrap();
        assert!(pos(DTM1) < pos(PON) && pos(PON) < pos(DRF) && pos(DRF) < pos(POF));

        // all white => code 1 in both nibbles
        let frame = bus.data_after(DTM1).unwrap();
        assert_eq!(frame.len(), 300 * 448);
        assert!(frame.iter().all(|&b| b == 0x11));
    }

    #[test]
    fn test_rejects_wrong_size() {
        let mut driver = InkyDriver::new(RecordingBus::default(), 600, 448);
        let img = RgbImage::new(800, 480);
        assert!(driver.render(&img, &RenderSettings::empty()).is_err());
        assert!(driver.bus().ops.is_empty());
    }

    #[test]
    fn test_busy_timeout_surfaces() {
        let bus = RecordingBus { fail_busy: true, ..Default::default() };
        let mut driver = InkyDriver::new(bus, 600, 448);
        let img = RgbImage::new(600, 448);
        assert!(matches!(
            driver.render(&img, &RenderSettings::empty()),
            Err(DisplayError::BusyTimeout(_))
        ));
    }
}
