//! Moving window statistics
//!
//! Computes a statistic within a window centred on each pixel, for every
//! band independently. Supports: Mean, StdDev, Min, Max, Range, Sum,
//! Count, Median, Percentile. Windows clamp to the raster edge.

use imgcalc_core::{Error, MemRaster, RasterSource, Result};
use imgcalc_engine::{ImageCalc, NoDataPolicy, Window, WindowCalculator};

/// Available window statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowStatistic {
    /// Arithmetic mean
    Mean,
    /// Standard deviation (population)
    StdDev,
    Min,
    Max,
    /// Range (max - min)
    Range,
    Sum,
    /// Count of valid values
    Count,
    Median,
    /// Percentile (0-100)
    Percentile(f64),
}

impl WindowStatistic {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "stddev" | "std" => Ok(Self::StdDev),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "range" => Ok(Self::Range),
            "sum" => Ok(Self::Sum),
            "count" => Ok(Self::Count),
            "median" => Ok(Self::Median),
            other => other
                .strip_prefix('p')
                .and_then(|p| p.parse::<f64>().ok())
                .map(Self::Percentile)
                .ok_or_else(|| Error::invalid_param("statistic", name, "unknown statistic")),
        }
    }
}

/// Parameters for window statistics
#[derive(Debug, Clone)]
pub struct WindowStatsParams {
    /// Window radius (window size = 2*radius + 1)
    pub radius: usize,
    pub statistic: WindowStatistic,
    /// Use a circular footprint instead of the full square
    pub circular: bool,
    /// Values equal to this are ignored, and all-no-data centres give 0
    pub nodata: Option<f64>,
}

impl Default for WindowStatsParams {
    fn default() -> Self {
        Self {
            radius: 1,
            statistic: WindowStatistic::Mean,
            circular: false,
            nodata: None,
        }
    }
}

/// Window statistics calculator, one output band per input band
#[derive(Debug, Clone)]
pub struct WindowStats {
    bands: usize,
    statistic: WindowStatistic,
    /// Window-local (row, col) of the footprint
    footprint: Vec<(usize, usize)>,
    nodata: NoDataPolicy,
    values: Vec<f64>,
}

impl WindowStats {
    pub fn new(bands: usize, params: &WindowStatsParams) -> Result<Self> {
        if params.radius == 0 {
            return Err(Error::invalid_param("radius", 0, "window radius must be > 0"));
        }
        if let WindowStatistic::Percentile(p) = params.statistic
            && !(0.0..=100.0).contains(&p)
        {
            return Err(Error::invalid_param("percentile", p, "must be between 0 and 100"));
        }
        let r = params.radius as isize;
        let r_sq = r * r;
        let mut footprint = Vec::new();
        for dr in -r..=r {
            for dc in -r..=r {
                if !params.circular || dr * dr + dc * dc <= r_sq {
                    footprint.push(((dr + r) as usize, (dc + r) as usize));
                }
            }
        }
        Ok(Self {
            bands,
            statistic: params.statistic,
            values: Vec::with_capacity(footprint.len()),
            footprint,
            nodata: NoDataPolicy::from_option(params.nodata),
        })
    }

    pub fn window_size(&self) -> usize {
        self.footprint.iter().map(|&(r, _)| r).max().unwrap_or(0) + 1
    }
}

impl WindowCalculator for WindowStats {
    fn num_out_bands(&self) -> usize {
        self.bands
    }

    fn nodata(&self) -> NoDataPolicy {
        self.nodata
    }

    fn check_bands(&self, num_bands: usize) -> Result<()> {
        if num_bands != self.bands {
            return Err(Error::OutputBands {
                expected: num_bands,
                actual: self.bands,
            });
        }
        Ok(())
    }

    fn calc_window(&mut self, window: &Window<'_>, out: &mut [f64]) -> Result<()> {
        for (band, o) in out.iter_mut().enumerate() {
            self.values.clear();
            for &(wr, wc) in &self.footprint {
                let v = window.get(band, wr, wc);
                if !v.is_nan() && !self.nodata.is_nodata(v) {
                    self.values.push(v);
                }
            }
            *o = if self.values.is_empty() {
                0.0
            } else {
                compute_statistic(&mut self.values, &self.statistic)
            };
        }
        Ok(())
    }
}

fn compute_statistic(values: &mut [f64], stat: &WindowStatistic) -> f64 {
    let n = values.len() as f64;

    match stat {
        WindowStatistic::Mean => values.iter().sum::<f64>() / n,
        WindowStatistic::StdDev => {
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
            var.sqrt()
        }
        WindowStatistic::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
        WindowStatistic::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        WindowStatistic::Range => {
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            max - min
        }
        WindowStatistic::Sum => values.iter().sum::<f64>(),
        WindowStatistic::Count => n,
        WindowStatistic::Median => {
            values.sort_by(|a, b| a.total_cmp(b));
            let mid = values.len() / 2;
            if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            }
        }
        WindowStatistic::Percentile(p) => {
            values.sort_by(|a, b| a.total_cmp(b));
            let idx = (p / 100.0 * (values.len() - 1) as f64).round() as usize;
            values[idx.min(values.len() - 1)]
        }
    }
}

/// Compute window statistics on every band of a raster
pub fn window_statistics(raster: &dyn RasterSource, params: &WindowStatsParams) -> Result<MemRaster> {
    let mut calc = WindowStats::new(raster.band_count(), params)?;
    let size = 2 * params.radius + 1;
    ImageCalc::default().calc_window_to_memory(&[raster], size, &mut calc)
}
