//! Container codec for the BMP dialect the supported cameras
//! emit over their PC link.
//!
//! The dialect is narrow: a `BM` file header, a plain
//! BITMAPINFOHEADER, and either 16-bit RGB565 pixels behind a
//! BITFIELDS mask block, or uncompressed 24/32-bit pixels.
//! Validation happens field by field *before* any geometry is
//! trusted, and the three failure classes stay distinct: I/O
//! errors ([`Reason::Io`]), malformed containers
//! ([`Reason::Malformed`]) and bad geometry
//! ([`Reason::OutOfRange`]).

use std::io::{Read, Write};

use byteordered::ByteOrdered;
use ndarray::Array2;

use crate::canvas::Canvas;
use crate::error::{fail, Reason, Result, Source, Trace};

/// Upper bound on pixel count, to bound allocation driven by
/// hostile headers.
pub const MAX_PIXELS: u32 = 1 << 24;

const HEADER_MAGIC: u16 = 0x4d42;
const HEADER_SIZE: u32 = 14;
const DIB_SIZE: u32 = 40;
const MASK_SIZE: u32 = 12;

const COMPRESSION_RGB: u32 = 0;
const COMPRESSION_BITFIELDS: u32 = 3;

const MASK_RGB565_RED: u32 = 0xf800;
const MASK_RGB565_GREEN: u32 = 0x07e0;
const MASK_RGB565_BLUE: u32 = 0x001f;

/// Pixel storage, tagged by format. Every access converts
/// through RGB565, the working format of the pipeline.
#[derive(Debug, Clone)]
pub enum PixelData {
    Rgb565(Array2<u16>),
    Rgb888(Array2<[u8; 3]>),
    Rgba8888(Array2<u32>),
}

impl PixelData {
    fn dim(&self) -> (usize, usize) {
        match self {
            PixelData::Rgb565(px) => px.dim(),
            PixelData::Rgb888(px) => px.dim(),
            PixelData::Rgba8888(px) => px.dim(),
        }
    }

    fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelData::Rgb565(_) => 2,
            PixelData::Rgb888(_) => 3,
            PixelData::Rgba8888(_) => 4,
        }
    }

    fn get565(&self, x: u16, y: u16) -> u16 {
        let idx = (y as usize, x as usize);
        match self {
            PixelData::Rgb565(px) => px[idx],
            PixelData::Rgb888(px) => {
                let [r, g, b] = px[idx];
                crate::canvas::rgb888(r as u16, g as u16, b as u16)
            }
            PixelData::Rgba8888(px) => {
                let v = px[idx];
                crate::canvas::rgb888(
                    ((v >> 16) & 0xff) as u16,
                    ((v >> 8) & 0xff) as u16,
                    (v & 0xff) as u16,
                )
            }
        }
    }

    fn set565(&mut self, x: u16, y: u16, color: u16) {
        let idx = (y as usize, x as usize);
        match self {
            PixelData::Rgb565(px) => px[idx] = color,
            PixelData::Rgb888(px) => px[idx] = expand565(color),
            PixelData::Rgba8888(px) => {
                let [r, g, b] = expand565(color);
                px[idx] = 0xff00_0000 | ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
            }
        }
    }
}

/// Expands an RGB565 color to 8-bit channels, replicating the
/// top bits into the low bits so full white stays full white.
fn expand565(color: u16) -> [u8; 3] {
    let r = ((color >> 11) & 0x1f) as u8;
    let g = ((color >> 5) & 0x3f) as u8;
    let b = (color & 0x1f) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

/// A decoded bitmap: dimensions plus format-tagged pixels.
#[derive(Debug, Clone)]
pub struct Bitmap {
    pixels: PixelData,
}

impl Bitmap {
    /// New zero-filled 16-bit RGB565 bitmap.
    pub fn rgb565(width: u16, height: u16) -> Result<Self> {
        Self::with_pixels(width, height, |w, h| {
            PixelData::Rgb565(Array2::zeros((h, w)))
        })
    }

    /// New zero-filled 24-bit RGB888 bitmap.
    pub fn rgb888(width: u16, height: u16) -> Result<Self> {
        Self::with_pixels(width, height, |w, h| {
            PixelData::Rgb888(Array2::from_elem((h, w), [0u8; 3]))
        })
    }

    /// New 32-bit RGBA8888 bitmap, opaque black.
    pub fn rgba8888(width: u16, height: u16) -> Result<Self> {
        Self::with_pixels(width, height, |w, h| {
            PixelData::Rgba8888(Array2::from_elem((h, w), 0xff00_0000))
        })
    }

    fn with_pixels<F: FnOnce(usize, usize) -> PixelData>(
        width: u16,
        height: u16,
        build: F,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return fail(Reason::OutOfRange, Source::Bitmap);
        }
        if width as u32 * height as u32 > MAX_PIXELS {
            return fail(Reason::Alloc, Source::Bitmap);
        }
        Ok(Bitmap {
            pixels: build(width as usize, height as usize),
        })
    }

    pub fn width(&self) -> u16 {
        self.pixels.dim().1 as u16
    }

    pub fn height(&self) -> u16 {
        self.pixels.dim().0 as u16
    }

    pub fn pixel_data(&self) -> &PixelData {
        &self.pixels
    }

    /// Parses a bitmap from a reader.
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let mut r = ByteOrdered::le(reader);

        let magic = r.read_u16().map_err(io_err)?;
        let _file_size = r.read_u32().map_err(io_err)?;
        let reserved = r.read_u32().map_err(io_err)?;
        let payload_offset = r.read_u32().map_err(io_err)?;
        if magic != HEADER_MAGIC || reserved != 0 {
            return fail(Reason::Malformed, Source::Bitmap);
        }

        let dib_size = r.read_u32().map_err(io_err)?;
        let width = r.read_i32().map_err(io_err)?;
        let height = r.read_i32().map_err(io_err)?;
        let planes = r.read_u16().map_err(io_err)?;
        let bit_count = r.read_u16().map_err(io_err)?;
        let compression = r.read_u32().map_err(io_err)?;
        let _size_image = r.read_u32().map_err(io_err)?;
        let _hor_ppm = r.read_i32().map_err(io_err)?;
        let _ver_ppm = r.read_i32().map_err(io_err)?;
        let colors_used = r.read_u32().map_err(io_err)?;
        let _colors_important = r.read_u32().map_err(io_err)?;

        if dib_size < DIB_SIZE || planes != 1 || colors_used != 0 {
            return fail(Reason::Malformed, Source::Bitmap);
        }
        // Trailing DIB extension bytes are tolerated and skipped.
        skip(&mut r, dib_size - DIB_SIZE)?;
        let mut consumed = HEADER_SIZE + dib_size;

        let pixels = match (bit_count, compression) {
            (16, COMPRESSION_BITFIELDS) => {
                let red = r.read_u32().map_err(io_err)?;
                let green = r.read_u32().map_err(io_err)?;
                let blue = r.read_u32().map_err(io_err)?;
                if red != MASK_RGB565_RED || green != MASK_RGB565_GREEN || blue != MASK_RGB565_BLUE
                {
                    return fail(Reason::Malformed, Source::Bitmap);
                }
                consumed += MASK_SIZE;
                PixelData::Rgb565(Array2::zeros((0, 0)))
            }
            (24, COMPRESSION_RGB) => PixelData::Rgb888(Array2::from_elem((0, 0), [0u8; 3])),
            (32, COMPRESSION_RGB) => PixelData::Rgba8888(Array2::zeros((0, 0))),
            _ => return fail(Reason::Malformed, Source::Bitmap),
        };

        // Geometry only gets trusted after the format checks.
        let top_down = height < 0;
        let abs_height = height.checked_abs().map(|h| h as u32);
        let (width, height) = match (width, abs_height) {
            (w, Some(h)) if w > 0 && h > 0 && (w as u32) <= u16::MAX as u32 && h <= u16::MAX as u32 => {
                (w as u32, h)
            }
            _ => return fail(Reason::OutOfRange, Source::Bitmap),
        };
        if width * height > MAX_PIXELS {
            return fail(Reason::Alloc, Source::Bitmap);
        }
        if payload_offset < consumed {
            return fail(Reason::Malformed, Source::Bitmap);
        }
        skip(&mut r, payload_offset - consumed)?;

        let mut bitmap = Bitmap::with_pixels(width as u16, height as u16, |w, h| match pixels {
            PixelData::Rgb565(_) => PixelData::Rgb565(Array2::zeros((h, w))),
            PixelData::Rgb888(_) => PixelData::Rgb888(Array2::from_elem((h, w), [0u8; 3])),
            PixelData::Rgba8888(_) => PixelData::Rgba8888(Array2::zeros((h, w))),
        })?;

        let bpp = bitmap.pixels.bytes_per_pixel();
        let padding = stride(width, bpp) - width * bpp;
        for row in 0..height {
            // Positive heights store rows bottom-up.
            let y = if top_down { row } else { height - 1 - row } as u16;
            for x in 0..width as u16 {
                let color = match bitmap.pixels {
                    PixelData::Rgb565(_) => r.read_u16().map_err(io_err)?,
                    PixelData::Rgb888(_) => {
                        let b = r.read_u8().map_err(io_err)?;
                        let g = r.read_u8().map_err(io_err)?;
                        let red = r.read_u8().map_err(io_err)?;
                        crate::canvas::rgb888(red as u16, g as u16, b as u16)
                    }
                    PixelData::Rgba8888(_) => {
                        let v = r.read_u32().map_err(io_err)?;
                        crate::canvas::rgb888(
                            ((v >> 16) & 0xff) as u16,
                            ((v >> 8) & 0xff) as u16,
                            (v & 0xff) as u16,
                        )
                    }
                };
                bitmap.pixels.set565(x, y, color);
            }
            skip(&mut r, padding)?;
        }
        Ok(bitmap)
    }

    /// Writes the bitmap out in its native format, rows
    /// bottom-up as the cameras expect.
    pub fn store<W: Write>(&self, writer: W) -> Result<()> {
        let mut w = ByteOrdered::le(writer);

        let width = self.width() as u32;
        let height = self.height() as u32;
        let bpp = self.pixels.bytes_per_pixel();
        let row_bytes = stride(width, bpp);
        let is565 = matches!(self.pixels, PixelData::Rgb565(_));
        let payload_offset = HEADER_SIZE + DIB_SIZE + if is565 { MASK_SIZE } else { 0 };
        let file_size = payload_offset + row_bytes * height;

        w.write_u16(HEADER_MAGIC).map_err(io_err)?;
        w.write_u32(file_size).map_err(io_err)?;
        w.write_u32(0).map_err(io_err)?;
        w.write_u32(payload_offset).map_err(io_err)?;

        w.write_u32(DIB_SIZE).map_err(io_err)?;
        w.write_i32(width as i32).map_err(io_err)?;
        w.write_i32(height as i32).map_err(io_err)?;
        w.write_u16(1).map_err(io_err)?;
        w.write_u16(bpp as u16 * 8).map_err(io_err)?;
        w.write_u32(if is565 {
            COMPRESSION_BITFIELDS
        } else {
            COMPRESSION_RGB
        })
        .map_err(io_err)?;
        w.write_u32(row_bytes * height).map_err(io_err)?;
        w.write_i32(0).map_err(io_err)?;
        w.write_i32(0).map_err(io_err)?;
        w.write_u32(0).map_err(io_err)?;
        w.write_u32(0).map_err(io_err)?;

        if is565 {
            w.write_u32(MASK_RGB565_RED).map_err(io_err)?;
            w.write_u32(MASK_RGB565_GREEN).map_err(io_err)?;
            w.write_u32(MASK_RGB565_BLUE).map_err(io_err)?;
        }

        let padding = row_bytes - width * bpp;
        for row in (0..height as u16).rev() {
            for x in 0..width as u16 {
                match &self.pixels {
                    PixelData::Rgb565(px) => {
                        w.write_u16(px[(row as usize, x as usize)]).map_err(io_err)?
                    }
                    PixelData::Rgb888(px) => {
                        let [r, g, b] = px[(row as usize, x as usize)];
                        w.write_u8(b).map_err(io_err)?;
                        w.write_u8(g).map_err(io_err)?;
                        w.write_u8(r).map_err(io_err)?;
                    }
                    PixelData::Rgba8888(px) => {
                        w.write_u32(px[(row as usize, x as usize)]).map_err(io_err)?
                    }
                }
            }
            for _ in 0..padding {
                w.write_u8(0).map_err(io_err)?;
            }
        }
        Ok(())
    }

    /// Crops a region out of the bitmap into a working canvas,
    /// converting to RGB565.
    pub fn edit(&self, x: u16, y: u16, width: u16, height: u16) -> Result<Canvas> {
        if width == 0
            || height == 0
            || x as u32 + width as u32 > self.width() as u32
            || y as u32 + height as u32 > self.height() as u32
        {
            return fail(Reason::OutOfRange, Source::Bitmap);
        }
        Canvas::from_fn(width, height, |col, row| {
            self.pixels.get565(x + col, y + row)
        })
        .map_err(|e| e.delegated(Source::Bitmap))
    }

    /// Composites a canvas into the bitmap at `(x, y)`.
    pub fn merge(&mut self, canvas: &Canvas, x: u16, y: u16) -> Result<()> {
        if x as u32 + canvas.width() as u32 > self.width() as u32
            || y as u32 + canvas.height() as u32 > self.height() as u32
        {
            return fail(Reason::OutOfRange, Source::Bitmap);
        }
        for row in 0..canvas.height() {
            for col in 0..canvas.width() {
                self.pixels.set565(x + col, y + row, canvas.at(col, row));
            }
        }
        Ok(())
    }
}

fn stride(width: u32, bytes_per_pixel: u32) -> u32 {
    (width * bytes_per_pixel + 3) & !3
}

fn skip<R: Read, E: byteordered::Endian>(r: &mut ByteOrdered<R, E>, count: u32) -> Result<()> {
    for _ in 0..count {
        r.read_u8().map_err(io_err)?;
    }
    Ok(())
}

fn io_err(_: std::io::Error) -> Trace {
    Trace::new(Reason::Io, Source::Bitmap)
}
