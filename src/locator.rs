//! Screenshot segmentation and crosshair detection.
//!
//! A capture is always 174×220: an OSD text strip on top and
//! the IR rendering below. The firmware burns a black-and-white
//! crosshair into the IR area, and its horizontal center row
//! has a rigid pixel sequence
//! (border, fill, border, eye, border, fill, border) whose fill
//! and eye widths differ between the TG165 and TG167. Finding
//! that sequence identifies the device model and anchors the
//! crosshair rectangle; the crosshair pixels are dead for
//! intensity recovery and get masked out downstream.

use crate::bitmap::Bitmap;
use crate::canvas::{rgb888, Canvas};
use crate::error::{fail, Reason, Result, Source, Trace};

/// Black crosshair outline color.
pub const CROSSHAIR_BORDER_COLOR: u16 = rgb888(0x00, 0x00, 0x00);
/// White crosshair fill color.
pub const CROSSHAIR_FILL_COLOR: u16 = rgb888(0xff, 0xff, 0xff);

/// Expected full screenshot dimensions.
pub const SCREEN_WIDTH: u16 = 174;
pub const SCREEN_HEIGHT: u16 = 220;

/// OSD text strip, relative to the screenshot.
pub const TEXT_X: u16 = 2;
pub const TEXT_Y: u16 = 1;
pub const TEXT_WIDTH: u16 = 170;
pub const TEXT_HEIGHT: u16 = 23;

/// Temperature readout, relative to the text strip.
pub const TEMPERATURE_X: u16 = 0;
pub const TEMPERATURE_Y: u16 = 0;
pub const TEMPERATURE_DIGITS: u16 = 6;
pub const TEMPERATURE_PITCH: u16 = 0;

/// Emissivity readout, relative to the text strip.
pub const EMISSIVITY_X: u16 = 110;
pub const EMISSIVITY_Y: u16 = 3;
pub const EMISSIVITY_DIGITS: u16 = 6;
pub const EMISSIVITY_PITCH: u16 = 0;

/// IR rendering, relative to the screenshot.
pub const IR_X: u16 = 12;
pub const IR_Y: u16 = 25;
pub const IR_WIDTH: u16 = 150;
pub const IR_HEIGHT: u16 = 175;

/// Border pixels in a complete center-row sequence.
pub const BORDER_TOTAL: u16 = 4;

/// Per-model crosshair metrics and the rectangles its arms
/// cover, relative to the crosshair origin.
#[derive(Debug, Clone, Copy)]
pub struct ModelGeometry {
    pub crosshair_height: u16,
    pub fill_width: u16,
    pub eye_width: u16,
    pub eye_height: u16,
    pub eye_offset_x: u16,
    pub eye_offset_y: u16,
    /// Row of the center sequence, relative to the origin.
    pub target_row: u16,
    arms: &'static [Rect],
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: u16,
    y: u16,
    width: u16,
    height: u16,
}

impl Rect {
    fn contains(&self, x: u16, y: u16) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

const fn r(x: u16, y: u16, width: u16, height: u16) -> Rect {
    Rect {
        x,
        y,
        width,
        height,
    }
}

static TG165: ModelGeometry = ModelGeometry {
    crosshair_height: 23,
    fill_width: 7,
    eye_width: 5,
    eye_height: 5,
    eye_offset_x: 9,
    eye_offset_y: 9,
    target_row: 11,
    arms: &[
        r(6, 6, 11, 3),
        r(0, 10, 6, 3),
        r(17, 10, 6, 3),
        r(10, 17, 3, 6),
        r(6, 9, 3, 8),
        r(14, 9, 3, 8),
        r(10, 0, 3, 6),
        r(9, 14, 5, 3),
    ],
};

static TG167: ModelGeometry = ModelGeometry {
    crosshair_height: 47,
    fill_width: 14,
    eye_width: 17,
    eye_height: 17,
    eye_offset_x: 16,
    eye_offset_y: 15,
    target_row: 23,
    arms: &[
        r(13, 12, 23, 3),
        r(13, 32, 23, 3),
        r(0, 22, 13, 3),
        r(36, 22, 13, 3),
        r(23, 35, 3, 12),
        r(13, 15, 3, 17),
        r(33, 15, 3, 17),
        r(23, 0, 3, 12),
    ],
};

/// The camera model a capture came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceModel {
    /// No crosshair sequence was found; the whole IR area is
    /// treated as plain image data.
    Unknown,
    Tg165,
    Tg167,
}

impl DeviceModel {
    pub fn geometry(self) -> Option<&'static ModelGeometry> {
        match self {
            DeviceModel::Unknown => None,
            DeviceModel::Tg165 => Some(&TG165),
            DeviceModel::Tg167 => Some(&TG167),
        }
    }
}

impl ModelGeometry {
    /// Full crosshair width: four border columns plus two fill
    /// runs around the eye.
    pub fn crosshair_width(&self) -> u16 {
        BORDER_TOTAL + self.eye_width + 2 * self.fill_width
    }
}

/// The located crosshair rectangle and its aperture, in IR
/// canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crosshair {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub aperture_x: u16,
    pub aperture_y: u16,
    pub aperture_width: u16,
    pub aperture_height: u16,
}

/// What a given IR pixel position is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelKind {
    /// Outside the IR canvas.
    Bounds,
    /// Ordinary rendered intensity data.
    Image,
    /// Part of the burned-in crosshair graphic.
    Crosshair,
}

/// Center-row sequence matcher. One state per run of the
/// border/fill/border/eye/border/fill/border pattern; any pixel
/// that breaks the expected run resets the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Start,
    Border1,
    Fill1,
    Border2,
    Eye,
    Border3,
    Fill2,
    Border4,
}

#[derive(Debug, Clone, Copy)]
struct Scanner {
    state: ScanState,
    border: u16,
    fill: u16,
    eye: u16,
}

impl Scanner {
    fn new() -> Self {
        Scanner {
            state: ScanState::Start,
            border: 0,
            fill: 0,
            eye: 0,
        }
    }

    fn reset(&mut self, state: ScanState) {
        self.state = state;
        self.border = if state == ScanState::Border1 { 1 } else { 0 };
        self.fill = 0;
        self.eye = 0;
    }

    /// Advances the matcher by one pixel.
    fn step(&mut self, pixel: u16) {
        use ScanState::*;
        if pixel == CROSSHAIR_BORDER_COLOR {
            if self.state == Fill1
                && self.border == 1
                && (self.fill == TG165.fill_width || self.fill == TG167.fill_width)
            {
                self.state = Border2;
                self.border += 1;
            } else if self.state == Eye
                && self.border == 2
                && (self.eye == TG165.eye_width || self.eye == TG167.eye_width)
            {
                self.state = Border3;
                self.border += 1;
            } else if self.state == Fill2
                && self.border == 3
                && (self.fill == TG165.fill_width * 2 || self.fill == TG167.fill_width * 2)
            {
                self.state = Border4;
                self.border += 1;
            } else {
                // A border pixel always restarts a candidate.
                self.reset(Border1);
            }
        } else if pixel == CROSSHAIR_FILL_COLOR {
            if self.state == Border1 && self.border == 1 {
                self.state = Fill1;
                self.fill += 1;
            } else if self.state == Border3 && self.border == 3 {
                self.state = Fill2;
                self.fill += 1;
            } else if self.state == Fill1 || self.state == Fill2 {
                self.fill += 1;
            } else {
                self.reset(Start);
            }
        } else if self.state == Border2 && self.border == 2 {
            self.state = Eye;
            self.eye = 1;
        } else if self.state == Eye {
            self.eye += 1;
        } else {
            self.reset(Start);
        }
    }

    /// The model whose complete sequence just ended, if any.
    fn matched(&self) -> Option<DeviceModel> {
        if self.border != BORDER_TOTAL {
            return None;
        }
        if self.fill == TG165.fill_width * 2 && self.eye == TG165.eye_width {
            Some(DeviceModel::Tg165)
        } else if self.fill == TG167.fill_width * 2 && self.eye == TG167.eye_width {
            Some(DeviceModel::Tg167)
        } else {
            None
        }
    }
}

/// Cuts a screenshot into its text and IR fragments and, after
/// [`Locator::process`], knows the device model and crosshair
/// position.
#[derive(Debug, Clone)]
pub struct Locator {
    text: Option<Canvas>,
    ir: Option<Canvas>,
    model: DeviceModel,
    crosshair: Option<Crosshair>,
}

impl Locator {
    /// Validates the screenshot dimensions and extracts the
    /// text and IR regions.
    pub fn locate(screenshot: &Bitmap) -> Result<Self> {
        if screenshot.width() != SCREEN_WIDTH || screenshot.height() != SCREEN_HEIGHT {
            return fail(Reason::Image, Source::Locator);
        }

        let full = screenshot
            .edit(0, 0, SCREEN_WIDTH, SCREEN_HEIGHT)
            .map_err(|e| e.delegated(Source::Locator))?;
        let text = full
            .crop(TEXT_X, TEXT_Y, TEXT_WIDTH, TEXT_HEIGHT)
            .map_err(|e| e.delegated(Source::Locator))?;
        let ir = full
            .crop(IR_X, IR_Y, IR_WIDTH, IR_HEIGHT)
            .map_err(|e| e.delegated(Source::Locator))?;

        Ok(Locator {
            text: Some(text),
            ir: Some(ir),
            model: DeviceModel::Unknown,
            crosshair: None,
        })
    }

    /// Scans the IR fragment for the crosshair center sequence.
    ///
    /// On success the model and crosshair geometry are set. If
    /// no sequence matches, the model stays [`Unknown`] and the
    /// scan fails with [`Reason::Image`]; callers that accept
    /// crosshair-free captures can treat that case as valid.
    ///
    /// [`Unknown`]: DeviceModel::Unknown
    pub fn process(&mut self) -> Result<()> {
        let ir = match &self.ir {
            Some(ir) => ir,
            None => return fail(Reason::NullInput, Source::Locator),
        };

        // Pre-filter thresholds: the sparser model bounds what a
        // candidate row must contain at minimum.
        let expected_fill = 2 * TG165.fill_width.min(TG167.fill_width);

        for y in 0..ir.height() {
            let mut border = 0u16;
            let mut fill = 0u16;
            let mut candidate = false;
            for x in 0..ir.width() {
                let pixel = ir.at(x, y);
                if pixel == CROSSHAIR_BORDER_COLOR {
                    border += 1;
                } else if pixel == CROSSHAIR_FILL_COLOR {
                    fill += 1;
                }
                if border >= BORDER_TOTAL && fill >= expected_fill {
                    candidate = true;
                    break;
                }
            }
            if !candidate {
                continue;
            }

            // Candidate row: run the sequence matcher over it.
            let mut scanner = Scanner::new();
            for x in 0..ir.width() {
                scanner.step(ir.at(x, y));
                let model = match scanner.matched() {
                    Some(model) => model,
                    None => continue,
                };
                let geometry = match model.geometry() {
                    Some(g) => g,
                    None => return fail(Reason::Inconsistent, Source::Locator),
                };

                let width = geometry.crosshair_width();
                // The sequence ends at `x`, so its origin lies a
                // full crosshair width back and a target row up.
                // A truncated crosshair can put the origin off
                // canvas; such a match is not usable.
                let origin_x = match (x + 1).checked_sub(width) {
                    Some(v) => v,
                    None => continue,
                };
                let origin_y = match y.checked_sub(geometry.target_row) {
                    Some(v) => v,
                    None => continue,
                };

                self.model = model;
                self.crosshair = Some(Crosshair {
                    x: origin_x,
                    y: origin_y,
                    width,
                    height: geometry.crosshair_height,
                    aperture_x: origin_x + geometry.eye_offset_x,
                    aperture_y: origin_y + geometry.eye_offset_y,
                    aperture_width: geometry.eye_width,
                    aperture_height: geometry.eye_height,
                });
                return Ok(());
            }
        }

        self.model = DeviceModel::Unknown;
        fail(Reason::Image, Source::Locator)
    }

    pub fn model(&self) -> DeviceModel {
        self.model
    }

    pub fn crosshair(&self) -> Option<Crosshair> {
        self.crosshair
    }

    /// Borrow of the OSD text fragment.
    pub fn text(&self) -> Result<&Canvas> {
        self.text
            .as_ref()
            .ok_or_else(|| Trace::new(Reason::NullInput, Source::Locator))
    }

    /// Borrow of the IR fragment.
    pub fn ir(&self) -> Result<&Canvas> {
        self.ir
            .as_ref()
            .ok_or_else(|| Trace::new(Reason::NullInput, Source::Locator))
    }

    /// Moves the text and IR fragments out of the locator.
    /// Afterwards any fragment access fails with
    /// [`Reason::NullInput`].
    pub fn take_buffers(&mut self) -> Result<(Canvas, Canvas)> {
        match (self.text.take(), self.ir.take()) {
            (Some(text), Some(ir)) => Ok((text, ir)),
            _ => fail(Reason::NullInput, Source::Locator),
        }
    }

    /// Classifies a position in the IR fragment.
    ///
    /// For an unknown model the whole canvas counts as image
    /// data; crosshair arms only exist once a model is known.
    pub fn classify(&self, x: u16, y: u16) -> Result<PixelKind> {
        let ir = self.ir()?;
        if x >= ir.width() || y >= ir.height() {
            return Ok(PixelKind::Bounds);
        }

        let geometry = match self.model.geometry() {
            Some(g) => g,
            None => return Ok(PixelKind::Image),
        };
        let crosshair = match self.crosshair {
            Some(c) => c,
            None => return fail(Reason::Inconsistent, Source::Locator),
        };

        if x < crosshair.x
            || y < crosshair.y
            || x >= crosshair.x + crosshair.width
            || y >= crosshair.y + crosshair.height
        {
            return Ok(PixelKind::Image);
        }
        let local_x = x - crosshair.x;
        let local_y = y - crosshair.y;
        if geometry.arms.iter().any(|arm| arm.contains(local_x, local_y)) {
            Ok(PixelKind::Crosshair)
        } else {
            Ok(PixelKind::Image)
        }
    }
}

/// Paints the center-row sequence for `geometry` with its
/// origin pixel at `(x, y)` of the canvas; test fixture shared
/// with the thermal pipeline tests.
#[cfg(test)]
pub(crate) fn paint_center_row(canvas: &mut Canvas, geometry: &ModelGeometry, x: u16, y: u16) {
    let row = y + geometry.target_row;
    let mut cursor = x;
    let mut run = |canvas: &mut Canvas, color: u16, count: u16| {
        for _ in 0..count {
            canvas.set(cursor, row, color).unwrap();
            cursor += 1;
        }
    };
    run(canvas, CROSSHAIR_BORDER_COLOR, 1);
    run(canvas, CROSSHAIR_FILL_COLOR, geometry.fill_width);
    run(canvas, CROSSHAIR_BORDER_COLOR, 1);
    run(canvas, 0x0842, geometry.eye_width);
    run(canvas, CROSSHAIR_BORDER_COLOR, 1);
    run(canvas, CROSSHAIR_FILL_COLOR, geometry.fill_width);
    run(canvas, CROSSHAIR_BORDER_COLOR, 1);
}

/// Builds a full synthetic screenshot whose IR area holds the
/// center-row sequence with the crosshair origin at `(x, y)` in
/// IR coordinates; everything else is a flat non-reserved color.
#[cfg(test)]
pub(crate) fn screenshot_with_center_row(geometry: &ModelGeometry, x: u16, y: u16) -> Bitmap {
    let mut canvas = Canvas::from_fn(SCREEN_WIDTH, SCREEN_HEIGHT, |_, _| 0x0842).unwrap();
    paint_center_row(&mut canvas, geometry, IR_X + x, IR_Y + y);
    let mut bitmap = Bitmap::rgb565(SCREEN_WIDTH, SCREEN_HEIGHT).unwrap();
    bitmap.merge(&canvas, 0, 0).unwrap();
    bitmap
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanner_matches_both_models() {
        for (geometry, model) in [(&TG165, DeviceModel::Tg165), (&TG167, DeviceModel::Tg167)].iter()
        {
            // Pattern starts at column 1; the flanking columns
            // hold plain image pixels.
            let mut row =
                Canvas::from_fn(geometry.crosshair_width() + 2, geometry.target_row + 1, |_, _| {
                    0x0842
                })
                .unwrap();
            paint_center_row(&mut row, geometry, 1, 0);

            let mut scanner = Scanner::new();
            let mut found = None;
            for x in 0..row.width() {
                scanner.step(row.at(x, geometry.target_row));
                if let Some(m) = scanner.matched() {
                    found = Some((m, x));
                    break;
                }
            }
            let (m, x) = found.expect("sequence must match");
            assert_eq!(m, *model);
            assert_eq!(x, geometry.crosshair_width());
        }
    }

    #[test]
    fn scanner_resets_on_broken_fill() {
        let mut scanner = Scanner::new();
        scanner.step(CROSSHAIR_BORDER_COLOR);
        scanner.step(CROSSHAIR_FILL_COLOR);
        scanner.step(CROSSHAIR_FILL_COLOR);
        // Interrupted fill run: a non-reserved pixel resets.
        scanner.step(0x0842);
        assert_eq!(scanner.state, ScanState::Start);
        assert_eq!(scanner.border, 0);
        assert_eq!(scanner.fill, 0);
    }

    #[test]
    fn locate_rejects_wrong_dimensions() {
        let bitmap = Bitmap::rgb565(160, 120).unwrap();
        let err = Locator::locate(&bitmap).unwrap_err();
        assert_eq!(err.reason(), Reason::Image);
    }

    #[test]
    fn process_finds_tg165_geometry() {
        let bitmap = screenshot_with_center_row(&TG165, 30, 40);
        let mut locator = Locator::locate(&bitmap).unwrap();
        locator.process().unwrap();

        assert_eq!(locator.model(), DeviceModel::Tg165);
        let crosshair = locator.crosshair().unwrap();
        assert_eq!((crosshair.x, crosshair.y), (30, 40));
        assert_eq!((crosshair.width, crosshair.height), (23, 23));
        assert_eq!((crosshair.aperture_x, crosshair.aperture_y), (39, 49));
        assert_eq!(
            (crosshair.aperture_width, crosshair.aperture_height),
            (5, 5)
        );
    }

    #[test]
    fn process_finds_tg167_geometry() {
        let bitmap = screenshot_with_center_row(&TG167, 50, 60);
        let mut locator = Locator::locate(&bitmap).unwrap();
        locator.process().unwrap();

        assert_eq!(locator.model(), DeviceModel::Tg167);
        let crosshair = locator.crosshair().unwrap();
        assert_eq!((crosshair.x, crosshair.y), (50, 60));
        assert_eq!((crosshair.width, crosshair.height), (49, 47));
        assert_eq!((crosshair.aperture_x, crosshair.aperture_y), (66, 75));
        assert_eq!(
            (crosshair.aperture_width, crosshair.aperture_height),
            (17, 17)
        );
    }

    #[test]
    fn process_without_pattern_is_unknown() {
        let bitmap = Bitmap::rgb565(SCREEN_WIDTH, SCREEN_HEIGHT).unwrap();
        let mut locator = Locator::locate(&bitmap).unwrap();
        let err = locator.process().unwrap_err();
        assert_eq!(err.reason(), Reason::Image);
        assert_eq!(locator.model(), DeviceModel::Unknown);
        // Unknown model: everything in bounds is image data.
        assert_eq!(locator.classify(0, 0).unwrap(), PixelKind::Image);
    }

    #[test]
    fn classify_against_arm_rectangles() {
        let bitmap = screenshot_with_center_row(&TG165, 30, 40);
        let mut locator = Locator::locate(&bitmap).unwrap();
        locator.process().unwrap();

        // Inside the first arm rectangle (6,6,11,3).
        assert_eq!(locator.classify(36, 46).unwrap(), PixelKind::Crosshair);
        // Inside the bounding box but between arms.
        assert_eq!(locator.classify(30, 40).unwrap(), PixelKind::Image);
        // Outside the bounding box.
        assert_eq!(locator.classify(0, 0).unwrap(), PixelKind::Image);
        // Outside the canvas.
        assert_eq!(locator.classify(IR_WIDTH, 0).unwrap(), PixelKind::Bounds);
    }

    #[test]
    fn take_buffers_empties_the_locator() {
        let bitmap = Bitmap::rgb565(SCREEN_WIDTH, SCREEN_HEIGHT).unwrap();
        let mut locator = Locator::locate(&bitmap).unwrap();
        let (text, ir) = locator.take_buffers().unwrap();
        assert_eq!((text.width(), text.height()), (TEXT_WIDTH, TEXT_HEIGHT));
        assert_eq!((ir.width(), ir.height()), (IR_WIDTH, IR_HEIGHT));
        assert_eq!(locator.ir().unwrap_err().reason(), Reason::NullInput);
        assert_eq!(
            locator.take_buffers().unwrap_err().reason(),
            Reason::NullInput
        );
    }
}
