//! Recovery of relative IR intensity data from a segmented
//! capture.
//!
//! The camera throws the sensor values away when it renders
//! them through a palette; what survives is the rendering, the
//! OSD readouts and a crosshair burned over the data. This
//! module inverts that: it reads the spot temperature and
//! emissivity off the text strip, classifies the palette, maps
//! every rendered pixel back to its intensity range, and
//! replaces the crosshair pixels with interpolated values.
//!
//! Each recovered point carries an uncertainty: the number of
//! intensities its color could have come from. Palette runs are
//! 4 wide, so honest recovery is coarse; replaced pixels get
//! uncertainty 1 because their value is synthetic anyway.

use std::convert::TryFrom;

use lazy_static::lazy_static;
use ndarray::Array2;
use regex::Regex;

use crate::canvas::Canvas;
use crate::error::{fail, Reason, Result, Source, Trace};
use crate::locator::{
    DeviceModel, Locator, PixelKind, EMISSIVITY_DIGITS, EMISSIVITY_PITCH, EMISSIVITY_X,
    EMISSIVITY_Y, TEMPERATURE_DIGITS, TEMPERATURE_PITCH, TEMPERATURE_X, TEMPERATURE_Y, TEXT_HEIGHT,
    TEXT_WIDTH,
};
use crate::ocr::{self, Font};
use crate::palette::{
    determine_palette, find_by_color, find_by_value, PaletteCache, PaletteId, IGNORE_MISSES,
};

lazy_static! {
    /// OSD temperature readout, e.g. ` 98.6F` or `-12.5C`.
    static ref TEMPERATURE_RE: Regex = Regex::new(r"^\s*(-?\d+)\.(\d)([CF])\s*$").unwrap();
    /// OSD emissivity readout, e.g. `E:0.95`.
    static ref EMISSIVITY_RE: Regex = Regex::new(r"^\s*E:0\.(\d{2})\s*$").unwrap();
}

/// How a palette run collapses to a single intensity value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantization {
    /// Requires every matched run to have width 1; anything
    /// wider is an error. Only meaningful for raw data.
    Exact,
    /// The lowest intensity of the run.
    Floor,
    /// The highest intensity of the run.
    Ceiling,
    /// The middle of the run, rounding down.
    MedianLow,
    /// The middle of the run, rounding up.
    MedianHigh,
}

/// How crosshair and invalid pixels get replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Replace with intensity zero.
    Zero,
    /// Replace with the lowest intensity seen in the image.
    Min,
    /// Replace with the average intensity of the image.
    Med,
    /// Replace with the highest intensity seen in the image.
    Max,
    /// Average of the eligible neighbors within radius 2.
    SquareSmall,
    /// Average of the eligible neighbors within radius 6.
    SquareLarge,
    /// Average within radius 2, with the radius-1 neighbors
    /// weighted four times.
    SquareWeight,
}

/// One recovered intensity point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThermalPoint {
    /// Relative intensity, 0..=255.
    pub value: u8,
    /// How many intensities the source color covered.
    pub uncertainty: u8,
}

/// The recovered relative intensity image.
#[derive(Debug, Clone)]
pub struct ThermalImage {
    points: Array2<ThermalPoint>,
    mode: Quantization,
}

impl ThermalImage {
    pub fn width(&self) -> u16 {
        self.points.ncols() as u16
    }

    pub fn height(&self) -> u16 {
        self.points.nrows() as u16
    }

    pub fn mode(&self) -> Quantization {
        self.mode
    }

    /// Bounds-checked point access.
    pub fn get(&self, x: u16, y: u16) -> Result<ThermalPoint> {
        self.points
            .get((y as usize, x as usize))
            .copied()
            .ok_or_else(|| Trace::new(Reason::OutOfRange, Source::Thermal))
    }

    fn at(&self, x: u16, y: u16) -> ThermalPoint {
        self.points[(y as usize, x as usize)]
    }
}

/// Per-pixel classification carried through reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaskState {
    /// Ordinary rendered intensity data.
    Image,
    /// Burned-in crosshair graphic.
    Crosshair,
    /// Color matched no palette run; replaced in pass two.
    Invalid,
}

/// The center spot rectangle, in IR coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spot {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

/// Recovery context: the segmented capture fragments, the
/// crosshair mask, and whatever has been recovered so far.
#[derive(Debug, Clone)]
pub struct Thermal {
    visible: Option<Canvas>,
    text: Option<Canvas>,
    image: Option<ThermalImage>,
    mask: Array2<MaskState>,
    model: DeviceModel,
    spot: Option<Spot>,
    palette: Option<PaletteId>,
    temperature: Option<i16>,
    emissivity: Option<u8>,
}

impl Thermal {
    /// Builds a recovery context from a processed locator,
    /// moving the capture fragments out of it. The crosshair
    /// mask is derived here, while the locator still knows the
    /// geometry.
    pub fn create(locator: &mut Locator) -> Result<Self> {
        let (width, height) = {
            let ir = locator.ir().map_err(|e| e.delegated(Source::Thermal))?;
            (ir.width(), ir.height())
        };

        let mut mask = Array2::from_elem((height as usize, width as usize), MaskState::Image);
        for y in 0..height {
            for x in 0..width {
                let kind = locator
                    .classify(x, y)
                    .map_err(|e| e.delegated(Source::Thermal))?;
                mask[(y as usize, x as usize)] = match kind {
                    PixelKind::Image => MaskState::Image,
                    PixelKind::Crosshair => MaskState::Crosshair,
                    PixelKind::Bounds => return fail(Reason::Inconsistent, Source::Thermal),
                };
            }
        }

        let spot = locator.crosshair().map(|c| Spot {
            x: c.aperture_x,
            y: c.aperture_y,
            width: c.aperture_width,
            height: c.aperture_height,
        });
        let model = locator.model();
        let (text, visible) = locator
            .take_buffers()
            .map_err(|e| e.delegated(Source::Thermal))?;

        Ok(Thermal {
            visible: Some(visible),
            text: Some(text),
            image: None,
            mask,
            model,
            spot,
            palette: None,
            temperature: None,
            emissivity: None,
        })
    }

    pub fn model(&self) -> DeviceModel {
        self.model
    }

    pub fn spot(&self) -> Option<Spot> {
        self.spot
    }

    /// The palette the capture was rendered with, once
    /// [`reconstruct`](Self::reconstruct) has run.
    pub fn palette(&self) -> Option<PaletteId> {
        self.palette
    }

    /// Spot temperature in tenths of a degree celsius, once
    /// [`read_osd`](Self::read_osd) has run.
    pub fn temperature(&self) -> Option<i16> {
        self.temperature
    }

    /// Emissivity in hundredths (0.95 reads as 95), once
    /// [`read_osd`](Self::read_osd) has run.
    pub fn emissivity(&self) -> Option<u8> {
        self.emissivity
    }

    pub fn image(&self) -> Option<&ThermalImage> {
        self.image.as_ref()
    }

    /// Moves the recovered image out, leaving the context ready
    /// for another [`reconstruct`](Self::reconstruct) run.
    pub fn take_image(&mut self) -> Option<ThermalImage> {
        self.image.take()
    }

    /// Reads the temperature and emissivity off the OSD text
    /// strip.
    ///
    /// A fahrenheit readout is converted to tenths of a degree
    /// celsius, rounding half up. The emissivity must be of the
    /// form `E:0.dd` with a value between 0.01 and 0.99.
    pub fn read_osd(&mut self) -> Result<()> {
        let text = match &self.text {
            Some(text) => text,
            None => return fail(Reason::NullInput, Source::Thermal),
        };
        if text.width() != TEXT_WIDTH || text.height() != TEXT_HEIGHT {
            return fail(Reason::OutOfRange, Source::Thermal);
        }

        let temperature = ocr::read_string(
            Font::Large,
            text,
            TEMPERATURE_X,
            TEMPERATURE_Y,
            TEMPERATURE_PITCH,
            TEMPERATURE_DIGITS,
            0,
        )
        .map_err(|e| e.delegated(Source::Thermal))?;
        let emissivity = ocr::read_string(
            Font::Small,
            text,
            EMISSIVITY_X,
            EMISSIVITY_Y,
            EMISSIVITY_PITCH,
            EMISSIVITY_DIGITS,
            0,
        )
        .map_err(|e| e.delegated(Source::Thermal))?;

        let caps = match TEMPERATURE_RE.captures(&temperature) {
            Some(caps) => caps,
            None => return fail(Reason::Image, Source::Thermal),
        };
        let integer: i32 = caps[1].parse().map_err(|_| Trace::new(Reason::Image, Source::Thermal))?;
        let mut fraction: i32 =
            caps[2].parse().map_err(|_| Trace::new(Reason::Image, Source::Thermal))?;
        if integer < 0 {
            fraction = -fraction;
        }
        let tenths = match &caps[3] {
            "C" => integer * 10 + fraction,
            "F" => {
                // Scale by 5/9 in integer tenths, rounding the
                // remainder half up.
                let scaled = ((integer - 32) * 10 + fraction) * 5;
                let scaled = if scaled % 9 >= 5 { scaled + 8 } else { scaled };
                scaled / 9
            }
            _ => return fail(Reason::Image, Source::Thermal),
        };
        let tenths = i16::try_from(tenths)
            .map_err(|_| Trace::new(Reason::OutOfRange, Source::Thermal))?;

        let caps = match EMISSIVITY_RE.captures(&emissivity) {
            Some(caps) => caps,
            None => return fail(Reason::Image, Source::Thermal),
        };
        let hundredths: u8 =
            caps[1].parse().map_err(|_| Trace::new(Reason::Image, Source::Thermal))?;
        if hundredths == 0 || hundredths > 99 {
            return fail(Reason::Image, Source::Thermal);
        }

        self.temperature = Some(tenths);
        self.emissivity = Some(hundredths);
        Ok(())
    }

    /// Recovers the relative intensity image from the rendered
    /// IR fragment.
    ///
    /// Pass one classifies the palette, converts every
    /// unmasked pixel and gathers the image statistics; pixels
    /// whose color matches no palette run are marked invalid.
    /// Pass two replaces crosshair and invalid pixels according
    /// to `interpolation`. Running this twice without tearing
    /// the context down first fails with
    /// [`Reason::DoubleInit`].
    pub fn reconstruct(
        &mut self,
        interpolation: Interpolation,
        quantization: Quantization,
    ) -> Result<()> {
        let visible = match &self.visible {
            Some(visible) => visible,
            None => return fail(Reason::NullInput, Source::Thermal),
        };
        if self.image.is_some() {
            return fail(Reason::DoubleInit, Source::Thermal);
        }

        let palette = determine_palette(visible, IGNORE_MISSES)
            .map_err(|e| e.delegated(Source::Thermal))?;
        self.palette = Some(palette);

        let width = visible.width();
        let height = visible.height();
        let mut points =
            Array2::from_elem((height as usize, width as usize), ThermalPoint::default());

        let mut skipped: u32 = 0;
        let mut sum: u32 = 0;
        let mut count: u32 = 0;
        let mut min = u8::MAX;
        let mut max = u8::MIN;
        let mut start_y: Option<u16> = None;
        let mut cache = PaletteCache::new();

        for y in 0..height {
            for x in 0..width {
                let idx = (y as usize, x as usize);
                match self.mask[idx] {
                    MaskState::Image => {
                        let entry = match find_by_color(visible.at(x, y), palette, &mut cache) {
                            Ok(entry) => entry,
                            Err(e) if e.reason() == Reason::Image => {
                                self.mask[idx] = MaskState::Invalid;
                                start_y.get_or_insert(y);
                                skipped += 1;
                                continue;
                            }
                            Err(e) => return Err(e.delegated(Source::Thermal)),
                        };
                        if entry.width < 1 {
                            return fail(Reason::Image, Source::Thermal);
                        }

                        sum += entry.base as u32;
                        count += 1;
                        min = min.min(entry.base);
                        max = max.max(entry.base);

                        let value = match quantization {
                            Quantization::Exact => {
                                if entry.width != 1 {
                                    return fail(Reason::Image, Source::Thermal);
                                }
                                entry.base
                            }
                            Quantization::Floor => entry.base,
                            Quantization::Ceiling => entry.base + (entry.width - 1),
                            Quantization::MedianLow => entry.base + (entry.width - 1) / 2,
                            Quantization::MedianHigh => entry.base + entry.width / 2,
                        };
                        points[idx] = ThermalPoint {
                            value,
                            uncertainty: entry.width,
                        };
                    }
                    MaskState::Crosshair => {
                        start_y.get_or_insert(y);
                        if interpolation == Interpolation::Zero {
                            points[idx] = ThermalPoint {
                                value: 0,
                                uncertainty: 1,
                            };
                        } else {
                            skipped += 1;
                        }
                    }
                    MaskState::Invalid => {
                        return fail(Reason::Inconsistent, Source::Thermal);
                    }
                }
            }
        }

        // An image without a single convertible pixel has no
        // statistics to interpolate from.
        if min > max {
            return fail(Reason::Inconsistent, Source::Thermal);
        }

        if skipped == 0 {
            self.image = Some(ThermalImage {
                points,
                mode: quantization,
            });
            return Ok(());
        }

        let start_y = match start_y {
            Some(y) if count > 0 => y,
            _ => return fail(Reason::Inconsistent, Source::Thermal),
        };
        let average = (sum / count) as u8;

        for y in start_y..height {
            for x in 0..width {
                let idx = (y as usize, x as usize);
                let mask = self.mask[idx];
                if mask == MaskState::Image {
                    continue;
                }
                // Zero interpolation already filled the
                // crosshair in pass one.
                if mask == MaskState::Crosshair && interpolation == Interpolation::Zero {
                    continue;
                }
                if mask == MaskState::Invalid {
                    self.mask[idx] = MaskState::Image;
                }
                skipped = match skipped.checked_sub(1) {
                    Some(s) => s,
                    None => return fail(Reason::Inconsistent, Source::Thermal),
                };

                let value = match interpolation {
                    Interpolation::Zero => 0,
                    Interpolation::Min => min,
                    Interpolation::Max => max,
                    Interpolation::Med => average,
                    Interpolation::SquareSmall
                    | Interpolation::SquareLarge
                    | Interpolation::SquareWeight => {
                        self.neighborhood_average(&points, x, y, interpolation)?
                    }
                };
                points[idx] = ThermalPoint {
                    value,
                    uncertainty: 1,
                };
            }
        }

        if skipped != 0 {
            return fail(Reason::Inconsistent, Source::Thermal);
        }
        self.image = Some(ThermalImage {
            points,
            mode: quantization,
        });
        Ok(())
    }

    /// Average of the already-converted neighbors around
    /// `(x, y)`. Only unmasked pixels count; a pixel with no
    /// eligible neighbor at all cannot be interpolated.
    fn neighborhood_average(
        &self,
        points: &Array2<ThermalPoint>,
        x: u16,
        y: u16,
        interpolation: Interpolation,
    ) -> Result<u8> {
        let radius: i32 = if interpolation == Interpolation::SquareLarge {
            6
        } else {
            2
        };
        let (height, width) = self.mask.dim();

        let mut sum: u32 = 0;
        let mut count: u32 = 0;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                    continue;
                }
                let idx = (ny as usize, nx as usize);
                if self.mask[idx] != MaskState::Image {
                    continue;
                }
                let weight = if interpolation == Interpolation::SquareWeight
                    && dx.abs() <= 1
                    && dy.abs() <= 1
                {
                    4
                } else {
                    1
                };
                sum += points[idx].value as u32 * weight;
                count += weight;
            }
        }

        if count == 0 {
            return fail(Reason::Image, Source::Thermal);
        }
        Ok((sum / count) as u8)
    }

    /// Renders the recovered image back to colors through
    /// `palette`.
    pub fn export(&self, palette: PaletteId) -> Result<Canvas> {
        let image = match &self.image {
            Some(image) => image,
            None => return fail(Reason::NullInput, Source::Thermal),
        };

        let mut cache = PaletteCache::new();
        let mut canvas = Canvas::new(image.width(), image.height())
            .map_err(|e| e.delegated(Source::Thermal))?;
        for y in 0..image.height() {
            for x in 0..image.width() {
                let entry = find_by_value(image.at(x, y).value, palette, &mut cache)
                    .map_err(|e| e.delegated(Source::Thermal))?;
                if entry.width < 1 {
                    return fail(Reason::Image, Source::Thermal);
                }
                *canvas.at_mut(x, y) = entry.color;
            }
        }
        Ok(canvas)
    }

    /// Paints a two-color crosshair onto an exported canvas
    /// using the mask.
    ///
    /// Each run of crosshair pixels gets a border pixel at both
    /// ends and fill in between, first along rows and then
    /// along columns; the column pass only adds borders so the
    /// row fill survives.
    pub fn redraw_crosshair(&self, canvas: &mut Canvas, border: u16, fill: u16) -> Result<()> {
        let (height, width) = self.mask.dim();
        if canvas.width() as usize != width || canvas.height() as usize != height {
            return fail(Reason::OutOfRange, Source::Thermal);
        }

        #[derive(PartialEq)]
        enum Run {
            Idle,
            Border,
            Fill,
        }

        for y in 0..height as u16 {
            let mut state = Run::Idle;
            let mut length = 0u16;
            for x in 0..width as u16 {
                match self.mask[(y as usize, x as usize)] {
                    MaskState::Image => {
                        if state == Run::Fill && length > 1 {
                            // The run just ended; its final
                            // pixel becomes the closing border.
                            *canvas.at_mut(x - 1, y) = border;
                        }
                        state = Run::Idle;
                        length = 0;
                    }
                    MaskState::Crosshair => {
                        if state == Run::Idle {
                            *canvas.at_mut(x, y) = border;
                            state = Run::Border;
                        } else {
                            *canvas.at_mut(x, y) = fill;
                            state = Run::Fill;
                        }
                        length += 1;
                    }
                    MaskState::Invalid => {
                        return fail(Reason::Inconsistent, Source::Thermal);
                    }
                }
            }
        }

        for x in 0..width as u16 {
            let mut state = Run::Idle;
            let mut length = 0u16;
            for y in 0..height as u16 {
                match self.mask[(y as usize, x as usize)] {
                    MaskState::Image => {
                        if state == Run::Fill && length > 1 {
                            *canvas.at_mut(x, y - 1) = border;
                        }
                        state = Run::Idle;
                        length = 0;
                    }
                    MaskState::Crosshair => {
                        if state == Run::Idle {
                            *canvas.at_mut(x, y) = border;
                            state = Run::Border;
                        } else {
                            // Fill was painted in the row pass.
                            state = Run::Fill;
                        }
                        length += 1;
                    }
                    MaskState::Invalid => {
                        return fail(Reason::Inconsistent, Source::Thermal);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::Bitmap;
    use crate::locator::{
        self, paint_center_row, screenshot_with_center_row, CROSSHAIR_FILL_COLOR, IR_X, IR_Y,
        SCREEN_HEIGHT, SCREEN_WIDTH, TEXT_X, TEXT_Y,
    };
    use crate::ocr::paint_glyph;
    use crate::palette::PaletteId;

    fn tg165() -> &'static locator::ModelGeometry {
        DeviceModel::Tg165.geometry().unwrap()
    }

    /// Screenshot whose IR area is a flat grayscale color with
    /// a TG165 center-row sequence at (30, 40); the eye pixels
    /// also carry a valid grayscale color.
    fn grayscale_screenshot(background: u16) -> Bitmap {
        let mut canvas =
            Canvas::from_fn(SCREEN_WIDTH, SCREEN_HEIGHT, |_, _| background).unwrap();
        paint_center_row(&mut canvas, tg165(), IR_X + 30, IR_Y + 40);
        // Overwrite the eye with image-valued pixels.
        for x in 0..tg165().eye_width {
            canvas
                .set(IR_X + 30 + 9 + x, IR_Y + 40 + tg165().target_row, background)
                .unwrap();
        }
        let mut bitmap = Bitmap::rgb565(SCREEN_WIDTH, SCREEN_HEIGHT).unwrap();
        bitmap.merge(&canvas, 0, 0).unwrap();
        bitmap
    }

    fn thermal_from(bitmap: &Bitmap) -> Thermal {
        let mut locator = Locator::locate(bitmap).unwrap();
        locator.process().unwrap();
        Thermal::create(&mut locator).unwrap()
    }

    fn paint_osd(canvas: &mut Canvas, temperature: &str, emissivity: &str) {
        for (cell, glyph) in temperature.chars().enumerate() {
            paint_glyph(
                canvas,
                Font::Large,
                TEXT_X + cell as u16 * Font::Large.cell_width(),
                TEXT_Y,
                glyph,
            );
        }
        for (cell, glyph) in emissivity.chars().enumerate() {
            paint_glyph(
                canvas,
                Font::Small,
                TEXT_X + EMISSIVITY_X + cell as u16 * Font::Small.cell_width(),
                TEXT_Y + EMISSIVITY_Y,
                glyph,
            );
        }
    }

    fn osd_screenshot(temperature: &str, emissivity: &str) -> Bitmap {
        let mut canvas = Canvas::from_fn(SCREEN_WIDTH, SCREEN_HEIGHT, |_, _| 0x0842).unwrap();
        paint_center_row(&mut canvas, tg165(), IR_X + 30, IR_Y + 40);
        paint_osd(&mut canvas, temperature, emissivity);
        let mut bitmap = Bitmap::rgb565(SCREEN_WIDTH, SCREEN_HEIGHT).unwrap();
        bitmap.merge(&canvas, 0, 0).unwrap();
        bitmap
    }

    #[test]
    fn reads_celsius_osd() {
        let bitmap = osd_screenshot("100.0C", "E:0.95");
        let mut thermal = thermal_from(&bitmap);
        thermal.read_osd().unwrap();
        assert_eq!(thermal.temperature(), Some(1000));
        assert_eq!(thermal.emissivity(), Some(95));
    }

    #[test]
    fn converts_fahrenheit_osd() {
        let bitmap = osd_screenshot(" 98.6F", "E:0.87");
        let mut thermal = thermal_from(&bitmap);
        thermal.read_osd().unwrap();
        assert_eq!(thermal.temperature(), Some(370));
        assert_eq!(thermal.emissivity(), Some(87));
    }

    #[test]
    fn rejects_overload_readout() {
        // The device shows `OL` when the sensor saturates.
        let bitmap = osd_screenshot("    OL", "E:0.95");
        let mut thermal = thermal_from(&bitmap);
        let err = thermal.read_osd().unwrap_err();
        assert_eq!(err.reason(), Reason::Image);
    }

    #[test]
    fn create_moves_the_fragments() {
        let bitmap = screenshot_with_center_row(tg165(), 30, 40);
        let mut locator = Locator::locate(&bitmap).unwrap();
        locator.process().unwrap();
        let thermal = Thermal::create(&mut locator).unwrap();

        assert_eq!(thermal.model(), DeviceModel::Tg165);
        assert_eq!(
            thermal.spot(),
            Some(Spot {
                x: 39,
                y: 49,
                width: 5,
                height: 5
            })
        );
        assert_eq!(locator.ir().unwrap_err().reason(), Reason::NullInput);
        let err = Thermal::create(&mut locator).unwrap_err();
        assert_eq!(err.reason(), Reason::Delegated);
        assert_eq!(err.first().map(|f| f.reason), Some(Reason::NullInput));
    }

    #[test]
    fn zero_reconstruction_is_single_pass() {
        // Grayscale 0x8410 renders intensity run 0x80..0x84.
        let bitmap = grayscale_screenshot(0x8410);
        let mut thermal = thermal_from(&bitmap);
        thermal
            .reconstruct(Interpolation::Zero, Quantization::Floor)
            .unwrap();

        let image = thermal.image().unwrap();
        // A crosshair arm pixel is zero-filled.
        assert_eq!(
            image.get(36, 46).unwrap(),
            ThermalPoint {
                value: 0,
                uncertainty: 1
            }
        );
        // An ordinary pixel quantizes to the run base.
        assert_eq!(
            image.get(0, 0).unwrap(),
            ThermalPoint {
                value: 0x80,
                uncertainty: 4
            }
        );
    }

    #[test]
    fn square_interpolation_fills_from_neighbors() {
        let bitmap = grayscale_screenshot(0x8410);
        let mut thermal = thermal_from(&bitmap);
        thermal
            .reconstruct(Interpolation::SquareSmall, Quantization::Floor)
            .unwrap();

        // Every replaced pixel averages neighbors that all hold
        // the same value, so the crosshair disappears into it.
        let image = thermal.image().unwrap();
        for y in 0..image.height() {
            for x in 0..image.width() {
                assert_eq!(image.get(x, y).unwrap().value, 0x80);
            }
        }
        assert_eq!(image.get(36, 46).unwrap().uncertainty, 1);
        assert_eq!(image.get(0, 0).unwrap().uncertainty, 4);
    }

    #[test]
    fn neighborhood_average_takes_exact_floor_means() {
        // A single obscured center with three distinct eligible
        // neighbors: one in the inner ring, one at radius 2 and
        // one only reachable at radius 6.
        let mut mask = Array2::from_elem((9, 9), MaskState::Crosshair);
        let mut points = Array2::from_elem((9, 9), ThermalPoint::default());
        for &(x, y, value) in &[(4u16, 3u16, 10u8), (2, 6, 21), (8, 8, 60)] {
            mask[(y as usize, x as usize)] = MaskState::Image;
            points[(y as usize, x as usize)] = ThermalPoint {
                value,
                uncertainty: 4,
            };
        }
        let thermal = Thermal {
            visible: None,
            text: None,
            image: None,
            mask,
            model: DeviceModel::Unknown,
            spot: None,
            palette: None,
            temperature: None,
            emissivity: None,
        };

        // (10 + 21) / 2, floored.
        assert_eq!(
            thermal
                .neighborhood_average(&points, 4, 4, Interpolation::SquareSmall)
                .unwrap(),
            15
        );
        // The corner neighbor joins at radius 6: (10 + 21 + 60) / 3.
        assert_eq!(
            thermal
                .neighborhood_average(&points, 4, 4, Interpolation::SquareLarge)
                .unwrap(),
            30
        );
        // The inner-ring neighbor counts four times: (40 + 21) / 5.
        assert_eq!(
            thermal
                .neighborhood_average(&points, 4, 4, Interpolation::SquareWeight)
                .unwrap(),
            12
        );
    }

    #[test]
    fn median_quantization_splits_the_run() {
        let bitmap = grayscale_screenshot(0x8410);

        let mut low = thermal_from(&bitmap);
        low.reconstruct(Interpolation::Zero, Quantization::MedianLow)
            .unwrap();
        assert_eq!(low.image().unwrap().get(0, 0).unwrap().value, 0x81);

        let mut high = thermal_from(&bitmap);
        high.reconstruct(Interpolation::Zero, Quantization::MedianHigh)
            .unwrap();
        assert_eq!(high.image().unwrap().get(0, 0).unwrap().value, 0x82);

        let mut ceiling = thermal_from(&bitmap);
        ceiling
            .reconstruct(Interpolation::Zero, Quantization::Ceiling)
            .unwrap();
        assert_eq!(ceiling.image().unwrap().get(0, 0).unwrap().value, 0x83);
    }

    #[test]
    fn exact_quantization_rejects_wide_runs() {
        let bitmap = grayscale_screenshot(0x8410);
        let mut thermal = thermal_from(&bitmap);
        let err = thermal
            .reconstruct(Interpolation::Zero, Quantization::Exact)
            .unwrap_err();
        assert_eq!(err.reason(), Reason::Image);
    }

    #[test]
    fn reconstruct_twice_is_refused() {
        let bitmap = grayscale_screenshot(0x8410);
        let mut thermal = thermal_from(&bitmap);
        thermal
            .reconstruct(Interpolation::Min, Quantization::Floor)
            .unwrap();
        let err = thermal
            .reconstruct(Interpolation::Min, Quantization::Floor)
            .unwrap_err();
        assert_eq!(err.reason(), Reason::DoubleInit);

        let first = thermal.take_image().unwrap();
        thermal
            .reconstruct(Interpolation::Min, Quantization::Floor)
            .unwrap();
        let second = thermal.image().unwrap();
        assert_eq!(first.get(0, 0).unwrap(), second.get(0, 0).unwrap());
    }

    #[test]
    fn invalid_colors_are_interpolated_away() {
        // The default eye color matches no palette, so those
        // pixels go through the invalid path of pass two.
        let bitmap = screenshot_with_center_row(tg165(), 30, 40);
        let mut canvas = bitmap.edit(0, 0, SCREEN_WIDTH, SCREEN_HEIGHT).unwrap();
        // Repaint everything except the center row sequence in
        // grayscale so the palette wins cleanly.
        for y in 0..SCREEN_HEIGHT {
            for x in 0..SCREEN_WIDTH {
                if canvas.at(x, y) == 0x0842 && y != IR_Y + 40 + tg165().target_row {
                    canvas.set(x, y, 0x8410).unwrap();
                }
            }
        }
        let mut patched = Bitmap::rgb565(SCREEN_WIDTH, SCREEN_HEIGHT).unwrap();
        patched.merge(&canvas, 0, 0).unwrap();

        let mut thermal = thermal_from(&patched);
        thermal
            .reconstruct(Interpolation::Med, Quantization::Floor)
            .unwrap();
        let image = thermal.image().unwrap();
        // An eye pixel was invalid and took the global average,
        // which a flat image pins to the background base.
        assert_eq!(
            image.get(39, 51).unwrap(),
            ThermalPoint {
                value: 0x80,
                uncertainty: 1
            }
        );
    }

    #[test]
    fn export_round_trips_flat_images() {
        let bitmap = grayscale_screenshot(0x8410);
        let mut thermal = thermal_from(&bitmap);
        thermal
            .reconstruct(Interpolation::Min, Quantization::Floor)
            .unwrap();
        let exported = thermal.export(PaletteId::Grayscale).unwrap();
        // Min interpolation wrote the background base into the
        // crosshair, so the whole export is flat.
        for y in 0..exported.height() {
            for x in 0..exported.width() {
                assert_eq!(exported.at(x, y), 0x8410);
            }
        }
    }

    #[test]
    fn redrawn_crosshair_has_bordered_runs() {
        let bitmap = grayscale_screenshot(0x8410);
        let mut thermal = thermal_from(&bitmap);
        thermal
            .reconstruct(Interpolation::Min, Quantization::Floor)
            .unwrap();
        let mut canvas = thermal.export(PaletteId::Grayscale).unwrap();
        let border = 0x0000;
        thermal
            .redraw_crosshair(&mut canvas, border, CROSSHAIR_FILL_COLOR)
            .unwrap();

        // Arm run at row 46 spans columns 36..=46.
        assert_eq!(canvas.at(36, 46), border);
        assert_eq!(canvas.at(40, 46), CROSSHAIR_FILL_COLOR);
        assert_eq!(canvas.at(46, 46), border);
        // Column 36 run ends at row 56; its last pixel closes
        // with a border too.
        assert_eq!(canvas.at(36, 56), border);
        // Pixels outside the crosshair keep their export color.
        assert_eq!(canvas.at(30, 40), 0x8410);
        assert_eq!(canvas.at(0, 0), 0x8410);
    }

    #[test]
    fn redraw_rejects_mismatched_canvas() {
        let bitmap = grayscale_screenshot(0x8410);
        let thermal = thermal_from(&bitmap);
        let mut canvas = Canvas::new(10, 10).unwrap();
        let err = thermal
            .redraw_crosshair(&mut canvas, 0, CROSSHAIR_FILL_COLOR)
            .unwrap_err();
        assert_eq!(err.reason(), Reason::OutOfRange);
    }
}
