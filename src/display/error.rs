/*
 *  display/error.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Unified error types for display subsystem
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

use thiserror::Error;

/// Unified error type for all display operations
#[derive(Debug, Error)]
pub enum DisplayError {
    /// `display_image` called on a manager without a driver
    #[error("No valid display instance initialized")]
    NoDriver,

    /// Hardware initialization failed
    #[error("Display initialization failed: {0}")]
    InitializationFailed(String),

    /// SPI communication error
    #[error("SPI communication error: {0}")]
    SpiError(String),

    /// GPIO line error
    #[error("GPIO error: {0}")]
    GpioError(String),

    /// Frame does not match the panel geometry
    #[error("Frame size mismatch: expected {expected:?}, got {actual:?}")]
    FrameSizeMismatch { expected: (u32, u32), actual: (u32, u32) },

    /// Panel kept BUSY asserted past the allowed wait
    #[error("Panel busy timeout after {0} ms")]
    BusyTimeout(u64),

    /// Image encode/decode failure (snapshot or frame dump)
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Filesystem failure (snapshot, mock output)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Driver rejected or failed the render
    #[error("Driver error: {0}")]
    Driver(String),
}

/// Factory error types
#[derive(Debug, Error)]
pub enum DisplayFactoryError {
    /// No registered driver matches the configured display type
    #[error("Unsupported display type: {0}")]
    Unsupported(String),

    /// Display driver construction failed
    #[error("Driver initialization failed: {0}")]
    DriverInitFailed(#[from] DisplayError),
}

/// Failure inside the status overlay path. Never escapes `display_overlay`.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("Failed to load snapshot: {0}")]
    Snapshot(#[from] image::ImageError),

    #[error("Overlay does not fit a {width}x{height} canvas")]
    DoesNotFit { width: u32, height: u32 },

    #[error("Drawing error: {0}")]
    Drawing(String),

    #[error("Overlay dispatch failed: {0}")]
    Dispatch(#[from] DisplayError),
}
