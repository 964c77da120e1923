//! Full-width row strips covering a raster.
//!
//! The engine reads and writes one strip at a time, which bounds peak
//! memory to `strip_rows x cols x bands`. Window passes additionally read
//! `padding` rows above and below each strip (clamped to the raster).

use imgcalc_core::PixelRect;

/// One strip of output rows plus the padded input rows needed to compute it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strip {
    /// First output row
    pub row: usize,
    /// Number of output rows
    pub rows: usize,
    /// First input row to read (padding included)
    pub read_row: usize,
    /// Number of input rows to read (padding included)
    pub read_rows: usize,
}

impl Strip {
    /// Output rectangle of this strip
    pub fn rect(&self, cols: usize) -> PixelRect {
        PixelRect::new(self.row, 0, self.rows, cols)
    }

    /// Padded input rectangle of this strip
    pub fn read_rect(&self, cols: usize) -> PixelRect {
        PixelRect::new(self.read_row, 0, self.read_rows, cols)
    }
}

/// Iterator over the strips of a raster, top to bottom
#[derive(Debug, Clone)]
pub struct StripIterator {
    total_rows: usize,
    strip_rows: usize,
    padding: usize,
    current: usize,
}

impl StripIterator {
    pub fn new(total_rows: usize, strip_rows: usize, padding: usize) -> Self {
        Self {
            total_rows,
            strip_rows: strip_rows.max(1),
            padding,
            current: 0,
        }
    }

    /// Number of strips the iterator yields in total
    pub fn count_strips(&self) -> usize {
        self.total_rows.div_ceil(self.strip_rows)
    }
}

impl Iterator for StripIterator {
    type Item = Strip;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.total_rows {
            return None;
        }
        let row = self.current;
        let rows = self.strip_rows.min(self.total_rows - row);
        let read_row = row.saturating_sub(self.padding);
        let read_end = (row + rows + self.padding).min(self.total_rows);
        self.current += rows;
        Some(Strip {
            row,
            rows,
            read_row,
            read_rows: read_end - read_row,
        })
    }
}
