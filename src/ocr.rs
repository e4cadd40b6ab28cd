//! Glyph reader for the camera's on-screen display text.
//!
//! The OSD renderer uses two fixed bitmap fonts. Instead of
//! general character recognition, each font carries eight
//! probe points inside the glyph cell; the 8-bit signature of
//! "is this probe pixel white" uniquely identifies every glyph
//! the firmware can draw. Probe offsets and signature tables
//! were measured off device captures.

use crate::canvas::{rgb888, Canvas};
use crate::error::{fail, Reason, Result, Source};

const PROBE_COLOR: u16 = rgb888(0xff, 0xff, 0xff);

/// The two OSD font sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    /// 18×23 cells; temperature readout.
    Large,
    /// 10×12 cells; emissivity readout.
    Small,
}

struct FontSpec {
    width: u16,
    height: u16,
    probes: [(u16, u16); 8],
    glyphs: &'static [(u8, char)],
}

const LARGE: FontSpec = FontSpec {
    width: 18,
    height: 23,
    probes: [
        (10, 1),
        (16, 1),
        (3, 4),
        (15, 4),
        (12, 7),
        (8, 11),
        (16, 14),
        (8, 18),
    ],
    glyphs: &[
        (0x41, '0'),
        (0x11, '1'),
        (0x8d, '2'),
        (0x35, '3'),
        (0x51, '4'),
        (0x01, '5'),
        (0x69, '6'),
        (0xbb, '7'),
        (0x7d, '8'),
        (0x25, '9'),
        (0x00, ' '),
        (0x28, 'C'),
        (0x30, 'F'),
        (0x80, '.'),
        (0x84, 'L'),
        (0x20, '-'),
        (0xcc, 'O'),
    ],
};

const SMALL: FontSpec = FontSpec {
    width: 10,
    height: 12,
    probes: [
        (3, 1),
        (5, 2),
        (1, 4),
        (6, 5),
        (4, 8),
        (7, 8),
        (5, 10),
        (7, 10),
    ],
    glyphs: &[
        (0x25, '0'),
        (0x52, '1'),
        (0xd0, '2'),
        (0x89, '3'),
        (0xb2, '4'),
        (0x29, '5'),
        (0x6d, '6'),
        (0x19, '7'),
        (0x21, '8'),
        (0xc0, '9'),
        (0x00, ' '),
        (0x40, '.'),
        (0x12, ':'),
        (0xc9, 'E'),
    ],
};

impl Font {
    fn spec(self) -> &'static FontSpec {
        match self {
            Font::Large => &LARGE,
            Font::Small => &SMALL,
        }
    }

    /// Glyph cell width, the natural string pitch.
    pub fn cell_width(self) -> u16 {
        self.spec().width
    }
}

/// Reads the glyph whose cell origin is at `(x, y)`.
///
/// Fails with [`Reason::Unrecognized`] when the probe
/// signature matches no known glyph, and [`Reason::Image`]
/// when the cell does not fit inside the canvas.
pub fn read_char(font: Font, canvas: &Canvas, x: u16, y: u16) -> Result<char> {
    let spec = font.spec();
    if x as u32 + spec.width as u32 > canvas.width() as u32
        || y as u32 + spec.height as u32 > canvas.height() as u32
    {
        return fail(Reason::Image, Source::Ocr);
    }

    let mut signature = 0u8;
    for (bit, &(px, py)) in spec.probes.iter().enumerate() {
        if canvas.at(x + px, y + py) == PROBE_COLOR {
            signature |= 1 << bit;
        }
    }

    spec.glyphs
        .iter()
        .find(|&&(sig, _)| sig == signature)
        .map(|&(_, glyph)| glyph)
        .ok_or_else(|| crate::error::Trace::new(Reason::Unrecognized, Source::Ocr))
}

/// Reads `length` glyph cells starting at `(x, y)`, advancing
/// `cell_width + pitch` pixels per cell.
///
/// Unrecognized glyphs are skipped (not substituted) until
/// `max_unknown` of them have been dropped; one more fails the
/// whole read with [`Reason::Unrecognized`].
pub fn read_string(
    font: Font,
    canvas: &Canvas,
    x: u16,
    y: u16,
    pitch: u16,
    length: u16,
    max_unknown: u16,
) -> Result<String> {
    let spec = font.spec();
    let step = (spec.width + pitch) as u32;
    if length == 0
        || step * length as u32 + x as u32 > canvas.width() as u32 + pitch as u32
        || y as u32 + spec.height as u32 > canvas.height() as u32
    {
        return fail(Reason::OutOfRange, Source::Ocr);
    }

    let mut out = String::with_capacity(length as usize);
    let mut budget = max_unknown;
    for cell in 0..length as u32 {
        match read_char(font, canvas, (step * cell) as u16 + x, y) {
            Ok(glyph) => out.push(glyph),
            Err(e) if e.reason() == Reason::Unrecognized => {
                if budget == 0 {
                    return Err(e);
                }
                budget -= 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

/// Paints one glyph cell so its probe signature matches; test
/// fixture shared with the thermal pipeline tests.
#[cfg(test)]
pub(crate) fn paint_glyph(canvas: &mut Canvas, font: Font, x: u16, y: u16, glyph: char) {
    let spec = font.spec();
    let signature = spec
        .glyphs
        .iter()
        .find(|&&(_, g)| g == glyph)
        .map(|&(sig, _)| sig)
        .expect("glyph must be in the font");
    for (bit, &(px, py)) in spec.probes.iter().enumerate() {
        let color = if signature & (1 << bit) != 0 {
            PROBE_COLOR
        } else {
            0
        };
        canvas.set(x + px, y + py, color).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_painted_digits() {
        let mut canvas = Canvas::new(200, 30).unwrap();
        for (cell, glyph) in "0123456789".chars().enumerate() {
            paint_glyph(&mut canvas, Font::Large, cell as u16 * 18, 0, glyph);
        }
        let text = read_string(Font::Large, &canvas, 0, 0, 0, 10, 0).unwrap();
        assert_eq!(text, "0123456789");
    }

    #[test]
    fn reads_small_font_tokens() {
        let mut canvas = Canvas::new(80, 12).unwrap();
        for (cell, glyph) in "E:0.95".chars().enumerate() {
            paint_glyph(&mut canvas, Font::Small, cell as u16 * 10, 0, glyph);
        }
        let text = read_string(Font::Small, &canvas, 0, 0, 0, 6, 0).unwrap();
        assert_eq!(text, "E:0.95");
    }

    #[test]
    fn unknown_glyphs_are_skipped_within_budget() {
        let mut canvas = Canvas::new(60, 23).unwrap();
        paint_glyph(&mut canvas, Font::Large, 0, 0, '4');
        // Second cell: a signature no glyph owns (lone bit 1).
        canvas.set(18 + 16, 1, PROBE_COLOR).unwrap();
        paint_glyph(&mut canvas, Font::Large, 36, 0, '2');

        let text = read_string(Font::Large, &canvas, 0, 0, 0, 3, 1).unwrap();
        assert_eq!(text, "42");

        let err = read_string(Font::Large, &canvas, 0, 0, 0, 3, 0).unwrap_err();
        assert_eq!(err.reason(), Reason::Unrecognized);
    }

    #[test]
    fn cell_outside_canvas() {
        let canvas = Canvas::new(20, 20).unwrap();
        let err = read_char(Font::Large, &canvas, 5, 0).unwrap_err();
        assert_eq!(err.reason(), Reason::Image);
    }
}
