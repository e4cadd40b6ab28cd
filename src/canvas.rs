//! Rectangular RGB565 pixel buffer backed by [`Array2`].
//!
//! Every region the pipeline works on (full screenshot, OSD
//! text strip, IR image) is a `Canvas`. Coordinates are
//! `(x, y)` with the origin at the top-left; storage is
//! row-major `(row, col)`.

use ndarray::Array2;

use crate::error::{fail, Reason, Result, Source, Trace};

/// Packs 5/6/5-bit channel values into an RGB565 color.
pub const fn rgb565(r: u16, g: u16, b: u16) -> u16 {
    ((r & 0x1f) << 11) | ((g & 0x3f) << 5) | (b & 0x1f)
}

/// Packs 8-bit channel values into an RGB565 color.
pub const fn rgb888(r: u16, g: u16, b: u16) -> u16 {
    ((r & 0xf8) << 8) | ((g & 0xfc) << 3) | ((b & 0xf8) >> 3)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    pixels: Array2<u16>,
}

impl Canvas {
    /// Creates a zero-filled canvas. Zero dimensions are
    /// rejected.
    pub fn new(width: u16, height: u16) -> Result<Self> {
        if width == 0 || height == 0 {
            return fail(Reason::OutOfRange, Source::Canvas);
        }
        Ok(Canvas {
            pixels: Array2::zeros((height as usize, width as usize)),
        })
    }

    /// Builds a canvas by evaluating `f(x, y)` per pixel.
    pub fn from_fn<F: FnMut(u16, u16) -> u16>(width: u16, height: u16, mut f: F) -> Result<Self> {
        if width == 0 || height == 0 {
            return fail(Reason::OutOfRange, Source::Canvas);
        }
        Ok(Canvas {
            pixels: Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
                f(col as u16, row as u16)
            }),
        })
    }

    pub fn width(&self) -> u16 {
        self.pixels.ncols() as u16
    }

    pub fn height(&self) -> u16 {
        self.pixels.nrows() as u16
    }

    /// Bounds-checked read.
    pub fn get(&self, x: u16, y: u16) -> Result<u16> {
        self.pixels
            .get((y as usize, x as usize))
            .copied()
            .ok_or_else(|| Trace::new(Reason::OutOfRange, Source::Canvas))
    }

    /// Bounds-checked write.
    pub fn set(&mut self, x: u16, y: u16, pixel: u16) -> Result<()> {
        match self.pixels.get_mut((y as usize, x as usize)) {
            Some(p) => {
                *p = pixel;
                Ok(())
            }
            None => fail(Reason::OutOfRange, Source::Canvas),
        }
    }

    /// Unchecked read for scan loops that already validated
    /// their bounds.
    pub(crate) fn at(&self, x: u16, y: u16) -> u16 {
        self.pixels[(y as usize, x as usize)]
    }

    pub(crate) fn at_mut(&mut self, x: u16, y: u16) -> &mut u16 {
        &mut self.pixels[(y as usize, x as usize)]
    }

    /// Copies out a rectangle as a new canvas. The rectangle
    /// must lie fully inside this canvas.
    pub fn crop(&self, x: u16, y: u16, width: u16, height: u16) -> Result<Canvas> {
        if width == 0
            || height == 0
            || x as u32 + width as u32 > self.width() as u32
            || y as u32 + height as u32 > self.height() as u32
        {
            return fail(Reason::OutOfRange, Source::Canvas);
        }
        let mut target = Canvas::new(width, height)?;
        for row in 0..height {
            for col in 0..width {
                *target.at_mut(col, row) = self.at(x + col, y + row);
            }
        }
        Ok(target)
    }

    /// Copies a `width`×`height` region from `source` at
    /// `(source_x, source_y)` onto this canvas at
    /// `(target_x, target_y)`. Pixels falling outside either
    /// canvas are skipped rather than rejected; offsets may
    /// be negative.
    pub fn blit(
        &mut self,
        source: &Canvas,
        source_x: i16,
        source_y: i16,
        target_x: i16,
        target_y: i16,
        width: u16,
        height: u16,
    ) -> Result<()> {
        if width == 0 || height == 0 {
            return fail(Reason::OutOfRange, Source::Canvas);
        }
        for row in 0..height as i32 {
            for col in 0..width as i32 {
                let sx = col + source_x as i32;
                let sy = row + source_y as i32;
                let tx = col + target_x as i32;
                let ty = row + target_y as i32;
                if sx >= 0
                    && sy >= 0
                    && tx >= 0
                    && ty >= 0
                    && sx < source.width() as i32
                    && sy < source.height() as i32
                    && tx < self.width() as i32
                    && ty < self.height() as i32
                {
                    *self.at_mut(tx as u16, ty as u16) = source.at(sx as u16, sy as u16);
                }
            }
        }
        Ok(())
    }
}
