/*
 *  display/drivers/bus.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Command/data transport shared by the SPI e-paper controllers
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

use std::time::Duration;

use crate::display::error::DisplayError;

/// Level the BUSY line reads while the controller is working
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyLevel {
    Low,
    High,
}

/// Minimal controller transport. Hardware goes through `EpdBus`; tests
/// substitute a recorder.
pub trait PanelBus: Send {
    /// Pulse RST
    fn reset(&mut self) -> Result<(), DisplayError>;

    /// Send a command byte (DC low)
    fn command(&mut self, cmd: u8) -> Result<(), DisplayError>;

    /// Send data bytes (DC high)
    fn data(&mut self, data: &[u8]) -> Result<(), DisplayError>;

    /// Block until BUSY clears or `timeout` elapses
    fn wait_idle(&mut self, timeout: Duration) -> Result<(), DisplayError>;

    fn command_with(&mut self, cmd: u8, data: &[u8]) -> Result<(), DisplayError> {
        self.command(cmd)?;
        self.data(data)
    }
}

/// HAT pin assignment (BCM) per panel family
#[derive(Debug, Clone, Copy)]
pub struct PinDefaults {
    pub dc: u32,
    pub rst: u32,
    pub busy: u32,
    pub busy_level: BusyLevel,
}

#[cfg(any(feature = "driver-inky", feature = "driver-waveshare"))]
pub use hw::EpdBus;

#[cfg(any(feature = "driver-inky", feature = "driver-waveshare"))]
mod hw {
    use super::*;
    use crate::config::BusConfig;
    use embedded_hal::spi::SpiDevice;
    use linux_embedded_hal::gpio_cdev::{Chip, LineHandle, LineRequestFlags};
    use linux_embedded_hal::SpidevDevice;
    use log::{debug, info};
    use std::thread::sleep;
    use std::time::Instant;

    /// spidev rejects transfers above its default bufsiz
    const SPI_CHUNK: usize = 4096;

    pub struct EpdBus {
        spi: SpidevDevice,
        dc: LineHandle,
        rst: LineHandle,
        busy: LineHandle,
        busy_level: BusyLevel,
    }

    fn gpio_err(e: impl std::fmt::Debug) -> DisplayError {
        DisplayError::GpioError(format!("{:?}", e))
    }

    fn spi_err(e: impl std::fmt::Debug) -> DisplayError {
        DisplayError::SpiError(format!("{:?}", e))
    }

    impl EpdBus {
        /// Open the SPI device and request DC/RST/BUSY lines
        pub fn open(cfg: &BusConfig, defaults: PinDefaults) -> Result<Self, DisplayError> {
            let dc_pin = cfg.dc_pin.unwrap_or(defaults.dc);
            let rst_pin = cfg.rst_pin.unwrap_or(defaults.rst);
            let busy_pin = cfg.busy_pin.unwrap_or(defaults.busy);
            info!(
                "Opening e-paper bus {} (DC {}, RST {}, BUSY {}) on {}",
                cfg.spi, dc_pin, rst_pin, busy_pin, cfg.gpio_chip
            );

            let spi = SpidevDevice::open(&cfg.spi).map_err(|e| {
                DisplayError::InitializationFailed(format!("{}: {:?}", cfg.spi, e))
            })?;
            let mut chip = Chip::new(&cfg.gpio_chip).map_err(|e| {
                DisplayError::InitializationFailed(format!("{}: {:?}", cfg.gpio_chip, e))
            })?;

            let mut output = |pin: u32, initial: u8| -> Result<LineHandle, DisplayError> {
                chip.get_line(pin)
                    .and_then(|l| l.request(LineRequestFlags::OUTPUT, initial, "inkplay"))
                    .map_err(gpio_err)
            };
            let dc = output(dc_pin, 0)?;
            let rst = output(rst_pin, 1)?;
            let busy = chip
                .get_line(busy_pin)
                .and_then(|l| l.request(LineRequestFlags::INPUT, 0, "inkplay"))
                .map_err(gpio_err)?;

            Ok(Self { spi, dc, rst, busy, busy_level: defaults.busy_level })
        }

        fn is_busy(&self) -> Result<bool, DisplayError> {
            let v = self.busy.get_value().map_err(gpio_err)?;
            Ok(match self.busy_level {
                BusyLevel::Low => v == 0,
                BusyLevel::High => v == 1,
            })
        }
    }

    impl PanelBus for EpdBus {
        fn reset(&mut self) -> Result<(), DisplayError> {
            self.rst.set_value(0).map_err(gpio_err)?;
            sleep(Duration::from_millis(100));
            self.rst.set_value(1).map_err(gpio_err)?;
            sleep(Duration::from_millis(100));
            Ok(())
        }

        fn command(&mut self, cmd: u8) -> Result<(), DisplayError> {
            self.dc.set_value(0).map_err(gpio_err)?;
            self.spi.write(&[cmd]).map_err(spi_err)
        }

        fn data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
            self.dc.set_value(1).map_err(gpio_err)?;
            for chunk in data.chunks(SPI_CHUNK) {
                self.spi.write(chunk).map_err(spi_err)?;
            }
            Ok(())
        }

        fn wait_idle(&mut self, timeout: Duration) -> Result<(), DisplayError> {
            let start = Instant::now();
            while self.is_busy()? {
                if start.elapsed() > timeout {
                    return Err(DisplayError::BusyTimeout(timeout.as_millis() as u64));
                }
                sleep(Duration::from_millis(10));
            }
            debug!("panel idle after {} ms", start.elapsed().as_millis());
            Ok(())
        }
    }
}
