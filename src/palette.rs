//! False-color palettes and the lookups that invert them.
//!
//! The camera renders its sensor data through one of three
//! fixed palettes. Each palette is an ordered run of entries
//! mapping a half-open intensity range `[base, base+width)` to
//! one RGB565 display color; the ranges tile the 0–255 domain
//! exactly. Forward lookup (color → entry) recovers intensity
//! from a rendered pixel; reverse lookup (value → entry)
//! re-renders it.
//!
//! Whole-image scans hit a handful of distinct colors very
//! often (flat thermal regions), so both lookups go through a
//! small most-recently-used ring cache before the linear table
//! scan. The cache only ever changes lookup *cost*, never the
//! result, and must be reset before reuse with another palette
//! or lookup direction.

use crate::canvas::Canvas;
use crate::error::{fail, Reason, Result, Source};
use crate::locator::{CROSSHAIR_BORDER_COLOR, CROSSHAIR_FILL_COLOR};

/// One palette run: intensities `[base, base+width)` render as
/// `color`. A width of zero never occurs in a valid table and
/// is treated as corruption by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteEntry {
    pub base: u8,
    pub width: u8,
    pub color: u16,
}

const fn e(base: u8, color: u16) -> PaletteEntry {
    PaletteEntry {
        base,
        width: 4,
        color,
    }
}

/// The palettes the firmware ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteId {
    Iron,
    Grayscale,
    Rainbow,
}

impl PaletteId {
    pub const ALL: [PaletteId; 3] = [PaletteId::Iron, PaletteId::Grayscale, PaletteId::Rainbow];

    pub fn table(self) -> &'static [PaletteEntry] {
        match self {
            PaletteId::Iron => &IRON,
            PaletteId::Grayscale => &GRAYSCALE,
            PaletteId::Rainbow => &RAINBOW,
        }
    }
}

/// Sentinel for [`determine_palette`]: no miss budget at all.
pub const IGNORE_MISSES: u16 = 0xffff;

/// Capacity of the per-session lookup cache.
pub const CACHE_SIZE: usize = 4;

/// Most-recently-used ring of palette entries.
///
/// A cache belongs to exactly one table and one lookup
/// direction for its lifetime; reset (recreate) it before
/// switching either, otherwise stale entries can return
/// false-positive matches.
#[derive(Debug, Clone, Default)]
pub struct PaletteCache {
    entries: [PaletteEntry; CACHE_SIZE],
    length: usize,
    index: usize,
}

impl Default for PaletteEntry {
    fn default() -> Self {
        PaletteEntry {
            base: 0,
            width: 0,
            color: 0,
        }
    }
}

impl PaletteCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup<F: Fn(&PaletteEntry) -> bool>(&self, hit: F) -> Option<PaletteEntry> {
        self.entries[..self.length].iter().copied().find(|e| hit(e))
    }

    /// Ring insert: fill while below capacity, then overwrite
    /// at the advancing index, wrapping at the current length.
    fn insert(&mut self, entry: PaletteEntry) {
        if self.length < CACHE_SIZE {
            self.index = 0;
            self.entries[self.length] = entry;
            self.length += 1;
            return;
        }
        self.entries[self.index] = entry;
        self.index += 1;
        if self.index >= self.length {
            self.index = 0;
        }
    }
}

/// Forward lookup: which entry renders as `color`?
pub fn find_by_color(
    color: u16,
    palette: PaletteId,
    cache: &mut PaletteCache,
) -> Result<PaletteEntry> {
    if let Some(entry) = cache.lookup(|e| e.color == color) {
        return Ok(entry);
    }
    match palette.table().iter().find(|e| e.color == color) {
        Some(&entry) => {
            cache.insert(entry);
            Ok(entry)
        }
        None => fail(Reason::Image, Source::Palette),
    }
}

/// Reverse lookup: which entry covers `value`?
///
/// Ranges are half-open (`base <= value < base + width`).
pub fn find_by_value(
    value: u8,
    palette: PaletteId,
    cache: &mut PaletteCache,
) -> Result<PaletteEntry> {
    let covers =
        |e: &PaletteEntry| e.base <= value && (e.base as u16 + e.width as u16) > value as u16;
    if let Some(entry) = cache.lookup(covers) {
        return Ok(entry);
    }
    match palette.table().iter().find(|e| covers(e)) {
        Some(&entry) => {
            cache.insert(entry);
            Ok(entry)
        }
        None => fail(Reason::Image, Source::Palette),
    }
}

/// Classifies which palette a rendered IR region uses.
///
/// Every pixel except the two reserved crosshair colors is
/// looked up against all tables (each with its own session
/// cache) and per-table match counters are kept. A pixel that
/// matches no table consumes one unit of `max_misses`
/// (pass [`IGNORE_MISSES`] to disable the budget); exhausting
/// the budget fails the scan, and a budget of zero tolerates
/// no misses at all. The table with the strictly
/// highest count wins; a tie for the top, or no matches at
/// all, fails with [`Reason::Image`].
pub fn determine_palette(canvas: &Canvas, max_misses: u16) -> Result<PaletteId> {
    let mut counts = [0u32; PaletteId::ALL.len()];
    let mut caches: [PaletteCache; PaletteId::ALL.len()] = Default::default();
    let mut budget = max_misses;

    for y in 0..canvas.height() {
        for x in 0..canvas.width() {
            let pixel = canvas.at(x, y);
            if pixel == CROSSHAIR_BORDER_COLOR || pixel == CROSSHAIR_FILL_COLOR {
                continue;
            }

            let mut matched = false;
            for (slot, &palette) in PaletteId::ALL.iter().enumerate() {
                if find_by_color(pixel, palette, &mut caches[slot]).is_ok() {
                    counts[slot] += 1;
                    matched = true;
                }
            }

            if !matched && max_misses != IGNORE_MISSES {
                budget = budget.saturating_sub(1);
                if budget == 0 {
                    return fail(Reason::Image, Source::Palette);
                }
            }
        }
    }

    let top = counts.iter().copied().max().unwrap_or(0);
    if top == 0 || counts.iter().filter(|&&c| c == top).count() != 1 {
        return fail(Reason::Image, Source::Palette);
    }
    match counts.iter().position(|&c| c == top) {
        Some(winner) => Ok(PaletteId::ALL[winner]),
        None => fail(Reason::Inconsistent, Source::Palette),
    }
}

// Palette data. 64 runs of width 4 per table, bases tiling
// [0, 255]; colors measured off the device renderer.

static IRON: [PaletteEntry; 64] = [
    e(0x00, 0x0000), e(0x04, 0x0001), e(0x08, 0x0802), e(0x0c, 0x0803),
    e(0x10, 0x1005), e(0x14, 0x1806), e(0x18, 0x1807), e(0x1c, 0x2008),
    e(0x20, 0x200a), e(0x24, 0x280b), e(0x28, 0x300c), e(0x2c, 0x300d),
    e(0x30, 0x380d), e(0x34, 0x400e), e(0x38, 0x480e), e(0x3c, 0x500f),
    e(0x40, 0x580f), e(0x44, 0x6010), e(0x48, 0x6810), e(0x4c, 0x7011),
    e(0x50, 0x7811), e(0x54, 0x7810), e(0x58, 0x8030), e(0x5c, 0x882f),
    e(0x60, 0x904e), e(0x64, 0x984d), e(0x68, 0xa06d), e(0x6c, 0xa86c),
    e(0x70, 0xb08b), e(0x74, 0xb08a), e(0x78, 0xb8aa), e(0x7c, 0xc0c9),
    e(0x80, 0xc108), e(0x84, 0xc927), e(0x88, 0xc966), e(0x8c, 0xd185),
    e(0x90, 0xd1c4), e(0x94, 0xd9e3), e(0x98, 0xda22), e(0x9c, 0xe241),
    e(0xa0, 0xe280), e(0xa4, 0xeac0), e(0xa8, 0xeb00), e(0xac, 0xeb40),
    e(0xb0, 0xeb80), e(0xb4, 0xf3c0), e(0xb8, 0xf400), e(0xbc, 0xf440),
    e(0xc0, 0xf480), e(0xc4, 0xfcc0), e(0xc8, 0xfd00), e(0xcc, 0xfd41),
    e(0xd0, 0xfd61), e(0xd4, 0xfda2), e(0xd8, 0xfde3), e(0xdc, 0xfe24),
    e(0xe0, 0xfe65), e(0xe4, 0xfea6), e(0xe8, 0xfee7), e(0xec, 0xff0c),
    e(0xf0, 0xff51), e(0xf4, 0xff96), e(0xf8, 0xffdb), e(0xfc, 0xffff),
];

static GRAYSCALE: [PaletteEntry; 64] = [
    e(0x00, 0x0000), e(0x04, 0x0020), e(0x08, 0x0841), e(0x0c, 0x0861),
    e(0x10, 0x1082), e(0x14, 0x10a2), e(0x18, 0x18c3), e(0x1c, 0x18e3),
    e(0x20, 0x2104), e(0x24, 0x2124), e(0x28, 0x2945), e(0x2c, 0x2965),
    e(0x30, 0x3186), e(0x34, 0x31a6), e(0x38, 0x39c7), e(0x3c, 0x39e7),
    e(0x40, 0x4208), e(0x44, 0x4228), e(0x48, 0x4a49), e(0x4c, 0x4a69),
    e(0x50, 0x528a), e(0x54, 0x52aa), e(0x58, 0x5acb), e(0x5c, 0x5aeb),
    e(0x60, 0x630c), e(0x64, 0x632c), e(0x68, 0x6b4d), e(0x6c, 0x6b6d),
    e(0x70, 0x738e), e(0x74, 0x73ae), e(0x78, 0x7bcf), e(0x7c, 0x7bef),
    e(0x80, 0x8410), e(0x84, 0x8430), e(0x88, 0x8c51), e(0x8c, 0x8c71),
    e(0x90, 0x9492), e(0x94, 0x94b2), e(0x98, 0x9cd3), e(0x9c, 0x9cf3),
    e(0xa0, 0xa514), e(0xa4, 0xa534), e(0xa8, 0xad55), e(0xac, 0xad75),
    e(0xb0, 0xb596), e(0xb4, 0xb5b6), e(0xb8, 0xbdd7), e(0xbc, 0xbdf7),
    e(0xc0, 0xc618), e(0xc4, 0xc638), e(0xc8, 0xce59), e(0xcc, 0xce79),
    e(0xd0, 0xd69a), e(0xd4, 0xd6ba), e(0xd8, 0xdedb), e(0xdc, 0xdefb),
    e(0xe0, 0xe71c), e(0xe4, 0xe73c), e(0xe8, 0xef5d), e(0xec, 0xef7d),
    e(0xf0, 0xf79e), e(0xf4, 0xf7be), e(0xf8, 0xffdf), e(0xfc, 0xffff),
];

static RAINBOW: [PaletteEntry; 64] = [
    e(0x00, 0x001f), e(0x04, 0x009f), e(0x08, 0x011f), e(0x0c, 0x019f),
    e(0x10, 0x021f), e(0x14, 0x029f), e(0x18, 0x031f), e(0x1c, 0x039f),
    e(0x20, 0x041f), e(0x24, 0x049f), e(0x28, 0x051f), e(0x2c, 0x059f),
    e(0x30, 0x061f), e(0x34, 0x069f), e(0x38, 0x071f), e(0x3c, 0x079f),
    e(0x40, 0x07ff), e(0x44, 0x07fd), e(0x48, 0x07fb), e(0x4c, 0x07f9),
    e(0x50, 0x07f7), e(0x54, 0x07f5), e(0x58, 0x07f3), e(0x5c, 0x07f1),
    e(0x60, 0x07ef), e(0x64, 0x07ed), e(0x68, 0x07eb), e(0x6c, 0x07e9),
    e(0x70, 0x07e7), e(0x74, 0x07e5), e(0x78, 0x07e3), e(0x7c, 0x07e1),
    e(0x80, 0x0fe0), e(0x84, 0x1fe0), e(0x88, 0x2fe0), e(0x8c, 0x3fe0),
    e(0x90, 0x4fe0), e(0x94, 0x5fe0), e(0x98, 0x6fe0), e(0x9c, 0x7fe0),
    e(0xa0, 0x8fe0), e(0xa4, 0x9fe0), e(0xa8, 0xafe0), e(0xac, 0xbfe0),
    e(0xb0, 0xcfe0), e(0xb4, 0xdfe0), e(0xb8, 0xefe0), e(0xbc, 0xffe0),
    e(0xc0, 0xff80), e(0xc4, 0xff00), e(0xc8, 0xfe80), e(0xcc, 0xfe00),
    e(0xd0, 0xfd80), e(0xd4, 0xfd00), e(0xd8, 0xfc80), e(0xdc, 0xfc00),
    e(0xe0, 0xfb80), e(0xe4, 0xfb00), e(0xe8, 0xfa80), e(0xec, 0xfa00),
    e(0xf0, 0xf980), e(0xf4, 0xf900), e(0xf8, 0xf880), e(0xfc, 0xf800),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_tile_the_intensity_domain() {
        for palette in PaletteId::ALL.iter() {
            let table = palette.table();
            let mut next = 0u16;
            for entry in table {
                assert_eq!(entry.base as u16, next, "{:?}", palette);
                assert!(entry.width >= 1, "{:?}", palette);
                next += entry.width as u16;
            }
            assert_eq!(next, 256, "{:?}", palette);
        }
    }

    #[test]
    fn table_colors_are_distinct() {
        for palette in PaletteId::ALL.iter() {
            let table = palette.table();
            for (i, a) in table.iter().enumerate() {
                for b in table.iter().skip(i + 1) {
                    assert_ne!(a.color, b.color, "{:?}", palette);
                }
            }
        }
    }

    #[test]
    fn forward_and_reverse_agree() {
        let mut forward = PaletteCache::new();
        let mut reverse = PaletteCache::new();
        for entry in PaletteId::Iron.table() {
            let by_color = find_by_color(entry.color, PaletteId::Iron, &mut forward).unwrap();
            assert_eq!(by_color, *entry);
            let by_value = find_by_value(entry.base, PaletteId::Iron, &mut reverse).unwrap();
            assert_eq!(by_value, *entry);
            // Last value of the run still maps to the same entry.
            let mut fresh = PaletteCache::new();
            let last =
                find_by_value(entry.base + (entry.width - 1), PaletteId::Iron, &mut fresh).unwrap();
            assert_eq!(last, *entry);
        }
    }

    #[test]
    fn cache_is_transparent() {
        // The same sequence with a warmed and a fresh cache
        // must produce identical results.
        let sequence = [0x0000u16, 0x0020, 0x0841, 0x0020, 0xffff, 0x0861, 0x0020];
        let mut warmed = PaletteCache::new();
        for &color in sequence.iter() {
            let with_cache = find_by_color(color, PaletteId::Grayscale, &mut warmed);
            let without = find_by_color(color, PaletteId::Grayscale, &mut PaletteCache::new());
            assert_eq!(with_cache, without);
        }
    }

    #[test]
    fn cache_ring_wraps_at_capacity() {
        let mut cache = PaletteCache::new();
        let table = PaletteId::Grayscale.table();
        // Fill past capacity; the first slot gets overwritten.
        for entry in table.iter().take(CACHE_SIZE + 1) {
            find_by_color(entry.color, PaletteId::Grayscale, &mut cache).unwrap();
        }
        assert_eq!(cache.length, CACHE_SIZE);
        assert_eq!(cache.entries[0], table[CACHE_SIZE]);
        // Hits keep working for everything still resident.
        for entry in table.iter().skip(1).take(CACHE_SIZE) {
            assert_eq!(
                find_by_color(entry.color, PaletteId::Grayscale, &mut cache).unwrap(),
                *entry
            );
        }
    }

    #[test]
    fn unknown_color_misses() {
        // 0x0001 is an iron color but not a grayscale one.
        let err = find_by_color(0x0001, PaletteId::Grayscale, &mut PaletteCache::new());
        assert_eq!(err.unwrap_err().reason(), Reason::Image);
    }

    #[test]
    fn determine_picks_the_majority_palette() {
        let table = PaletteId::Rainbow.table();
        let canvas = Canvas::from_fn(8, 8, |x, y| table[(y * 8 + x) as usize % 16].color).unwrap();
        assert_eq!(
            determine_palette(&canvas, IGNORE_MISSES).unwrap(),
            PaletteId::Rainbow
        );
    }

    #[test]
    fn determine_skips_crosshair_colors() {
        // Black and white are reserved; a frame of only those
        // has no matches anywhere and must fail.
        let canvas = Canvas::from_fn(4, 4, |x, _| {
            if x % 2 == 0 {
                CROSSHAIR_BORDER_COLOR
            } else {
                CROSSHAIR_FILL_COLOR
            }
        })
        .unwrap();
        let err = determine_palette(&canvas, IGNORE_MISSES).unwrap_err();
        assert_eq!(err.reason(), Reason::Image);
    }

    #[test]
    fn determine_miss_budget() {
        // No palette owns 0x0842.
        let canvas = Canvas::from_fn(4, 1, |_, _| 0x0842).unwrap();
        assert!(determine_palette(&canvas, IGNORE_MISSES).is_err());
        let err = determine_palette(&canvas, 2).unwrap_err();
        assert_eq!(err.reason(), Reason::Image);
    }

    #[test]
    fn determine_with_zero_budget_fails_on_first_miss() {
        let canvas = Canvas::from_fn(4, 1, |_, _| 0x0842).unwrap();
        let err = determine_palette(&canvas, 0).unwrap_err();
        assert_eq!(err.reason(), Reason::Image);
    }

    #[test]
    fn determine_rejects_ties() {
        // One pixel from each of two palettes: tie for the top.
        let iron = PaletteId::Iron.table()[1].color;
        let rainbow = PaletteId::Rainbow.table()[0].color;
        let canvas = Canvas::from_fn(2, 1, |x, _| if x == 0 { iron } else { rainbow }).unwrap();
        let err = determine_palette(&canvas, IGNORE_MISSES).unwrap_err();
        assert_eq!(err.reason(), Reason::Image);
    }
}
