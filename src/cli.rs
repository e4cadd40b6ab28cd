//! Helpers to parse CLI arguments and drive the recovery
//! pipeline in the accompanying binaries.
//!
//! APIs here shouldn't be considered stable / used as a
//! library.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{bail, Context, Result};
pub use clap::{App, Arg};
pub use inflector::Inflector;
use serde_derive::*;

use crate::bitmap::Bitmap;
use crate::error::Reason;
use crate::locator::{
    DeviceModel, Locator, CROSSHAIR_BORDER_COLOR, CROSSHAIR_FILL_COLOR,
};
use crate::palette::PaletteId;
use crate::thermal::{Interpolation, Quantization, Thermal, ThermalImage};

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

pub fn interpolation_from_name(name: &str) -> Result<Interpolation> {
    Ok(match name {
        "zero" => Interpolation::Zero,
        "min" => Interpolation::Min,
        "med" => Interpolation::Med,
        "max" => Interpolation::Max,
        "square-small" => Interpolation::SquareSmall,
        "square-large" => Interpolation::SquareLarge,
        "square-weight" => Interpolation::SquareWeight,
        _ => bail!("unknown interpolation mode: {}", name),
    })
}

pub fn quantization_from_name(name: &str) -> Result<Quantization> {
    Ok(match name {
        "exact" => Quantization::Exact,
        "floor" => Quantization::Floor,
        "ceiling" => Quantization::Ceiling,
        "median-low" => Quantization::MedianLow,
        "median-high" => Quantization::MedianHigh,
        _ => bail!("unknown quantization mode: {}", name),
    })
}

pub fn palette_from_name(name: &str) -> Result<PaletteId> {
    Ok(match name {
        "iron" => PaletteId::Iron,
        "grayscale" => PaletteId::Grayscale,
        "rainbow" => PaletteId::Rainbow,
        _ => bail!("unknown palette: {}", name),
    })
}

pub fn model_name(model: DeviceModel) -> &'static str {
    match model {
        DeviceModel::Unknown => "unknown",
        DeviceModel::Tg165 => "tg165",
        DeviceModel::Tg167 => "tg167",
    }
}

pub fn palette_name(palette: PaletteId) -> &'static str {
    match palette {
        PaletteId::Iron => "iron",
        PaletteId::Grayscale => "grayscale",
        PaletteId::Rainbow => "rainbow",
    }
}

/// Knobs of one recovery run, shared by every input.
#[derive(Debug, Clone, Copy)]
pub struct RecoverOptions {
    pub interpolation: Interpolation,
    pub quantization: Quantization,
    pub palette: PaletteId,
    pub redraw: bool,
}

/// What one capture yielded.
#[derive(Debug, Serialize)]
pub struct Report {
    pub path: String,
    pub model: &'static str,
    pub palette: &'static str,
    /// Spot temperature in tenths of a degree celsius.
    pub temperature: Option<i16>,
    /// Emissivity in hundredths.
    pub emissivity: Option<u8>,
    /// Recovered relative intensities, min/median/max.
    pub intensity: [u8; 3],
    pub output: Option<String>,
}

fn intensity_summary(image: &ThermalImage) -> [u8; 3] {
    let mut values = Vec::with_capacity(image.width() as usize * image.height() as usize);
    for y in 0..image.height() {
        for x in 0..image.width() {
            if let Ok(point) = image.get(x, y) {
                values.push(point.value);
            }
        }
    }
    values.sort_unstable();
    match values.as_slice() {
        [] => [0; 3],
        all => [all[0], all[all.len() / 2], all[all.len() - 1]],
    }
}

/// Runs the full pipeline on one capture file, optionally
/// writing the recolored result to `output`.
///
/// A capture without a recognizable crosshair is still
/// processed; its whole IR area counts as image data and the
/// model is reported as unknown. Likewise an unreadable OSD
/// ("OL" overload readouts, glyph noise) only leaves the
/// temperature and emissivity fields absent.
pub fn recover_path(path: &Path, output: Option<&Path>, options: RecoverOptions) -> Result<Report> {
    let file =
        File::open(path).with_context(|| format!("could not open {}", path.display()))?;
    let bitmap = Bitmap::load(BufReader::new(file))
        .with_context(|| format!("could not parse {}", path.display()))?;

    let mut locator = Locator::locate(&bitmap)?;
    match locator.process() {
        Ok(()) => {}
        Err(e) if e.reason() == Reason::Image && locator.model() == DeviceModel::Unknown => {}
        Err(e) => return Err(e).context("crosshair scan failed"),
    }

    let mut thermal = Thermal::create(&mut locator)?;
    thermal.read_osd().ok();
    thermal
        .reconstruct(options.interpolation, options.quantization)
        .with_context(|| format!("could not reconstruct {}", path.display()))?;
    let intensity = thermal.image().map(intensity_summary).unwrap_or([0; 3]);

    if let Some(out) = output {
        let mut canvas = thermal.export(options.palette)?;
        if options.redraw {
            thermal.redraw_crosshair(&mut canvas, CROSSHAIR_BORDER_COLOR, CROSSHAIR_FILL_COLOR)?;
        }
        let mut recolored = Bitmap::rgb565(canvas.width(), canvas.height())?;
        recolored.merge(&canvas, 0, 0)?;
        let target = File::create(out)
            .with_context(|| format!("could not create {}", out.display()))?;
        recolored.store(BufWriter::new(target))?;
    }

    Ok(Report {
        path: path.display().to_string(),
        model: model_name(thermal.model()),
        palette: thermal.palette().map(palette_name).unwrap_or("unknown"),
        temperature: thermal.temperature(),
        emissivity: thermal.emissivity(),
        intensity,
        output: output.map(|p| p.display().to_string()),
    })
}
