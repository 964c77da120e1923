//! Square neighbourhood windows.
//!
//! A window of size `k` (odd) is centred on the output pixel and holds
//! `k x k` values per band. Positions outside the raster take the value of
//! the nearest edge pixel (clamp-to-edge), so every window is complete.

use crate::stack::InputStack;
use imgcalc_core::{Error, Result};

/// Validate a window size: odd and at least 1
pub fn check_window_size(size: usize) -> Result<()> {
    if size == 0 || size % 2 == 0 {
        return Err(Error::WindowSize(size));
    }
    Ok(())
}

/// Read-only view of one window, band-major.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    values: &'a [f64],
    size: usize,
    bands: usize,
}

impl<'a> Window<'a> {
    /// Wrap band-major values (`bands * size * size`)
    pub fn from_slice(values: &'a [f64], size: usize, bands: usize) -> Result<Self> {
        check_window_size(size)?;
        if values.len() != bands * size * size {
            return Err(Error::invalid_param(
                "values",
                values.len(),
                format!("expected {} values for {} bands of {}x{}", bands * size * size, bands, size, size),
            ));
        }
        Ok(Self { values, size, bands })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Half width: `size / 2`
    pub fn radius(&self) -> usize {
        self.size / 2
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Value at window-local (wr, wc)
    #[inline]
    pub fn get(&self, band: usize, wr: usize, wc: usize) -> f64 {
        self.values[(band * self.size + wr) * self.size + wc]
    }

    /// Value at offset (dr, dc) from the centre
    #[inline]
    pub fn at(&self, band: usize, dr: isize, dc: isize) -> f64 {
        let r = self.radius() as isize;
        self.get(band, (r + dr) as usize, (r + dc) as usize)
    }

    #[inline]
    pub fn center(&self, band: usize) -> f64 {
        let r = self.radius();
        self.get(band, r, r)
    }

    /// Centre values of every band
    pub fn center_into(&self, out: &mut [f64]) {
        for (band, v) in out.iter_mut().enumerate().take(self.bands) {
            *v = self.center(band);
        }
    }

    /// All `size * size` values of one band, row-major
    #[inline]
    pub fn band(&self, band: usize) -> &'a [f64] {
        let n = self.size * self.size;
        &self.values[band * n..(band + 1) * n]
    }
}

/// Reusable buffer the engine fills for each output pixel
#[derive(Debug)]
pub(crate) struct WindowBuffer {
    values: Vec<f64>,
    size: usize,
    bands: usize,
}

impl WindowBuffer {
    pub(crate) fn new(size: usize, bands: usize) -> Self {
        Self {
            values: vec![0.0; bands * size * size],
            size,
            bands,
        }
    }

    /// Fill the window centred on global (row, col).
    ///
    /// `stack` holds global rows `[read_row, read_row + read_rows)` of a
    /// raster `rows x cols`; the clamped window rows always fall inside it.
    pub(crate) fn fill(&mut self, stack: &InputStack<'_>, read_row: usize, row: usize, col: usize) {
        let rows = stack.rows() as isize;
        let cols = stack.cols() as isize;
        let radius = (self.size / 2) as isize;
        let mut idx = 0;
        for band in 0..self.bands {
            for dr in -radius..=radius {
                let gr = (row as isize + dr).clamp(0, rows - 1) as usize;
                let lr = gr - read_row;
                for dc in -radius..=radius {
                    let gc = (col as isize + dc).clamp(0, cols - 1) as usize;
                    self.values[idx] = stack.value(band, lr, gc);
                    idx += 1;
                }
            }
        }
    }

    pub(crate) fn view(&self) -> Window<'_> {
        Window {
            values: &self.values,
            size: self.size,
            bands: self.bands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_size_validation() {
        assert!(check_window_size(1).is_ok());
        assert!(check_window_size(5).is_ok());
        assert!(matches!(check_window_size(4), Err(Error::WindowSize(4))));
        assert!(check_window_size(0).is_err());
    }

    #[test]
    fn test_window_accessors() {
        let values: Vec<f64> = (0..18).map(|v| v as f64).collect();
        let w = Window::from_slice(&values, 3, 2).unwrap();
        assert_eq!(w.radius(), 1);
        assert_eq!(w.center(0), 4.0);
        assert_eq!(w.center(1), 13.0);
        assert_eq!(w.at(0, -1, -1), 0.0);
        assert_eq!(w.at(1, 1, 1), 17.0);
        assert_eq!(w.band(1).len(), 9);
        let mut c = [0.0; 2];
        w.center_into(&mut c);
        assert_eq!(c, [4.0, 13.0]);
    }

    #[test]
    fn test_window_length_checked() {
        let values = vec![0.0; 8];
        assert!(Window::from_slice(&values, 3, 1).is_err());
    }
}
