//! Library to recover relative infrared intensity data from
//! FLIR TG165/TG167 screen captures.
//!
//! These spot thermometers render their sensor data through a
//! false-color palette, burn a crosshair over it and only then
//! let a screenshot be taken; the actual sensor values never
//! leave the device. This crate inverts the rendering as far
//! as it can be inverted:
//!
//! 1. [Segment](locator::Locator) the capture into the OSD
//! text strip and the IR rendering, identify the device model
//! from the crosshair geometry, and locate the center spot.
//!
//! 2. [Recover](thermal::Thermal) the relative intensity of
//! every pixel by classifying the palette and mapping colors
//! back to their intensity ranges, replacing the crosshair
//! pixels by interpolation, and reading the spot temperature
//! and emissivity off the OSD text.
//!
//! # Usage
//!
//! ```rust,no_run
//! # fn run() -> irshot::Result<()> {
//! use std::{fs::File, io::BufReader};
//! use irshot::{Bitmap, Locator, Thermal};
//! use irshot::thermal::{Interpolation, Quantization};
//!
//! let bitmap = Bitmap::load(BufReader::new(
//!     File::open("capture.bmp").unwrap(),
//! ))?;
//! let mut locator = Locator::locate(&bitmap)?;
//! locator.process()?;
//!
//! let mut thermal = Thermal::create(&mut locator)?;
//! thermal.read_osd()?;
//! thermal.reconstruct(
//!     Interpolation::SquareLarge,
//!     Quantization::MedianLow,
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! The recovered values are *relative*: a pixel's intensity
//! says how its temperature compares to the rest of the frame,
//! anchored only by the OSD spot reading. Palette runs are
//! four intensities wide, so every recovered point also
//! carries the [uncertainty](thermal::ThermalPoint) of its
//! color.

pub mod bitmap;
pub mod canvas;
pub mod error;
pub mod locator;
pub mod ocr;
pub mod palette;
pub mod thermal;

#[cfg(feature = "cli")]
pub mod cli;

pub use crate::bitmap::Bitmap;
pub use crate::canvas::Canvas;
pub use crate::error::{Reason, Result, Source, Trace};
pub use crate::locator::Locator;
pub use crate::thermal::Thermal;
