//! Single-pass image engine.
//!
//! Every pass walks the inputs in full-width strips of `strip_rows` rows,
//! top to bottom, and visits the pixels of a strip row-major. Output blocks
//! are written as soon as a strip is done.

use crate::calculator::{
    Accumulator, ConditionalWindowCalculator, NoDataPolicy, PairedAccumulator, PixelCalculator,
    WindowCalculator,
};
use crate::progress::{CancelToken, NoProgress, Progress};
use crate::stack::InputStack;
use crate::strips::StripIterator;
use crate::window::{Window, WindowBuffer, check_window_size};
use imgcalc_core::{Error, MemRaster, OutputSpec, RasterBlock, RasterSink, RasterSource, Result};
use std::sync::Arc;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct CalcConfig {
    /// Rows per strip; bounds peak memory
    pub strip_rows: usize,
}

impl Default for CalcConfig {
    fn default() -> Self {
        Self { strip_rows: 256 }
    }
}

/// Drives calculators over one raster or a co-registered stack.
#[derive(Clone)]
pub struct ImageCalc {
    config: CalcConfig,
    progress: Arc<dyn Progress>,
    cancel: CancelToken,
}

impl Default for ImageCalc {
    fn default() -> Self {
        Self::new(CalcConfig::default())
    }
}

impl ImageCalc {
    pub fn new(config: CalcConfig) -> Self {
        Self {
            config,
            progress: Arc::new(NoProgress),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &CalcConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn progress(&self) -> &Arc<dyn Progress> {
        &self.progress
    }

    /// Run a per-pixel calculator and write every pixel of `output`
    pub fn calc_image<C>(
        &self,
        inputs: &[&dyn RasterSource],
        calc: &mut C,
        output: &mut dyn RasterSink,
    ) -> Result<()>
    where
        C: PixelCalculator + ?Sized,
    {
        let mut stack = InputStack::new(inputs)?;
        let n_out = calc.num_out_bands();
        check_output(&stack, n_out, output)?;
        calc.check_bands(stack.total_bands())?;
        let policy = calc.nodata();

        let cols = stack.cols();
        let mut sample = vec![0.0; stack.total_bands()];
        let mut out = vec![0.0; n_out];
        let mut out_block = RasterBlock::empty();

        self.progress.begin("pixel pass", stack.rows() as u64);
        for strip in StripIterator::new(stack.rows(), self.config.strip_rows, 0) {
            self.cancel.check()?;
            tracing::debug!(row = strip.row, rows = strip.rows, "pixel strip");
            let rect = strip.rect(cols);
            stack.read(rect)?;
            out_block.reshape(n_out, rect);
            for r in 0..rect.rows {
                for c in 0..cols {
                    stack.sample_into(r, c, &mut sample);
                    out.fill(0.0);
                    if !policy.all_nodata(&sample) {
                        calc.calc_pixel(&sample, &mut out).inspect_err(|e| {
                            tracing::error!(row = rect.row + r, col = c, error = %e, "pixel calculation failed")
                        })?;
                    }
                    out_block.set_pixel(r, c, &out);
                }
            }
            output.write_block(&out_block)?;
            self.progress.advance(strip.rows as u64);
        }
        output.finish()?;
        self.progress.finish();
        Ok(())
    }

    /// Run a window calculator of size `win_size` (odd) over every pixel
    pub fn calc_window<C>(
        &self,
        inputs: &[&dyn RasterSource],
        win_size: usize,
        calc: &mut C,
        output: &mut dyn RasterSink,
    ) -> Result<()>
    where
        C: WindowCalculator + ?Sized,
    {
        let total = total_bands(inputs);
        calc.check_bands(total)?;
        let n_out = calc.num_out_bands();
        let policy = calc.nodata();
        self.window_pass(inputs, win_size, n_out, policy, output, |window, out| {
            calc.calc_window(window, out)?;
            Ok(true)
        })
    }

    /// Run a conditional window calculator. Pixels it declines keep the
    /// input centre values.
    pub fn calc_window_conditional<C>(
        &self,
        inputs: &[&dyn RasterSource],
        win_size: usize,
        calc: &mut C,
        output: &mut dyn RasterSink,
    ) -> Result<()>
    where
        C: ConditionalWindowCalculator + ?Sized,
    {
        let n_out = calc.num_out_bands();
        let total = total_bands(inputs);
        if n_out != total {
            return Err(Error::OutputBands {
                expected: total,
                actual: n_out,
            });
        }
        calc.check_bands(total)?;
        let policy = calc.nodata();
        self.window_pass(inputs, win_size, n_out, policy, output, |window, out| {
            calc.calc_window(window, out)
        })
    }

    /// Shared loop of the window passes.
    ///
    /// `run` fills `out` and returns whether it should be written. When it
    /// returns `false` the centre values are written instead.
    fn window_pass<F>(
        &self,
        inputs: &[&dyn RasterSource],
        win_size: usize,
        n_out: usize,
        policy: NoDataPolicy,
        output: &mut dyn RasterSink,
        mut run: F,
    ) -> Result<()>
    where
        F: FnMut(&Window<'_>, &mut [f64]) -> Result<bool>,
    {
        check_window_size(win_size)?;
        let mut stack = InputStack::new(inputs)?;
        check_output(&stack, n_out, output)?;

        let (rows, cols) = (stack.rows(), stack.cols());
        let bands = stack.total_bands();
        let mut buffer = WindowBuffer::new(win_size, bands);
        let mut centre = vec![0.0; bands];
        let mut out = vec![0.0; n_out];
        let mut out_block = RasterBlock::empty();

        self.progress.begin("window pass", rows as u64);
        for strip in StripIterator::new(rows, self.config.strip_rows, win_size / 2) {
            self.cancel.check()?;
            tracing::debug!(row = strip.row, rows = strip.rows, read_row = strip.read_row, "window strip");
            stack.read(strip.read_rect(cols))?;
            out_block.reshape(n_out, strip.rect(cols));
            for r in 0..strip.rows {
                let row = strip.row + r;
                let local = row - strip.read_row;
                for c in 0..cols {
                    stack.sample_into(local, c, &mut centre);
                    out.fill(0.0);
                    if !policy.all_nodata(&centre) {
                        buffer.fill(&stack, strip.read_row, row, c);
                        let write = run(&buffer.view(), &mut out).inspect_err(|e| {
                            tracing::error!(row, col = c, error = %e, "window calculation failed")
                        })?;
                        if !write {
                            out.copy_from_slice(&centre[..n_out]);
                        }
                    }
                    out_block.set_pixel(r, c, &out);
                }
            }
            output.write_block(&out_block)?;
            self.progress.advance(strip.rows as u64);
        }
        output.finish()?;
        self.progress.finish();
        Ok(())
    }

    /// [`Self::calc_image`] into a new in-memory raster on the grid of the first input
    pub fn calc_image_to_memory<C>(&self, inputs: &[&dyn RasterSource], calc: &mut C) -> Result<MemRaster>
    where
        C: PixelCalculator + ?Sized,
    {
        let mut output = memory_output(inputs, calc.num_out_bands())?;
        self.calc_image(inputs, calc, &mut output)?;
        Ok(output)
    }

    /// [`Self::calc_window`] into a new in-memory raster
    pub fn calc_window_to_memory<C>(
        &self,
        inputs: &[&dyn RasterSource],
        win_size: usize,
        calc: &mut C,
    ) -> Result<MemRaster>
    where
        C: WindowCalculator + ?Sized,
    {
        let mut output = memory_output(inputs, calc.num_out_bands())?;
        self.calc_window(inputs, win_size, calc, &mut output)?;
        Ok(output)
    }

    /// [`Self::calc_window_conditional`] into a new in-memory raster
    pub fn calc_window_conditional_to_memory<C>(
        &self,
        inputs: &[&dyn RasterSource],
        win_size: usize,
        calc: &mut C,
    ) -> Result<MemRaster>
    where
        C: ConditionalWindowCalculator + ?Sized,
    {
        let mut output = memory_output(inputs, calc.num_out_bands())?;
        self.calc_window_conditional(inputs, win_size, calc, &mut output)?;
        Ok(output)
    }

    /// Feed every pixel to `acc` and return its finalised values.
    ///
    /// The accumulator is reset first. All-no-data pixels are skipped.
    pub fn accumulate<A>(&self, inputs: &[&dyn RasterSource], acc: &mut A) -> Result<Vec<f64>>
    where
        A: Accumulator + ?Sized,
    {
        let mut stack = InputStack::new(inputs)?;
        acc.check_bands(stack.total_bands())?;
        acc.reset();
        let policy = acc.nodata();
        let cols = stack.cols();
        let mut sample = vec![0.0; stack.total_bands()];

        self.progress.begin("accumulate", stack.rows() as u64);
        for strip in StripIterator::new(stack.rows(), self.config.strip_rows, 0) {
            self.cancel.check()?;
            tracing::debug!(row = strip.row, rows = strip.rows, "accumulate strip");
            stack.read(strip.rect(cols))?;
            for r in 0..strip.rows {
                for c in 0..cols {
                    stack.sample_into(r, c, &mut sample);
                    if policy.all_nodata(&sample) {
                        continue;
                    }
                    acc.accumulate(&sample)?;
                }
            }
            self.progress.advance(strip.rows as u64);
        }
        self.progress.finish();
        acc.finalize()
    }

    /// Feed co-located pixels of `a` and `b` to `acc`.
    ///
    /// A pixel is skipped when either side is entirely no-data.
    pub fn accumulate_pair<A>(
        &self,
        a: &dyn RasterSource,
        b: &dyn RasterSource,
        acc: &mut A,
    ) -> Result<Vec<f64>>
    where
        A: PairedAccumulator + ?Sized,
    {
        let first = [a];
        let second = [b];
        let mut stack_a = InputStack::new(&first)?;
        let mut stack_b = InputStack::new(&second)?;
        if (stack_a.rows(), stack_a.cols()) != (stack_b.rows(), stack_b.cols()) {
            return Err(Error::SizeMismatch {
                er: stack_a.rows(),
                ec: stack_a.cols(),
                ar: stack_b.rows(),
                ac: stack_b.cols(),
            });
        }
        acc.check_bands(stack_a.total_bands(), stack_b.total_bands())?;
        acc.reset();
        let policy = acc.nodata();
        let cols = stack_a.cols();
        let mut sample_a = vec![0.0; stack_a.total_bands()];
        let mut sample_b = vec![0.0; stack_b.total_bands()];

        self.progress.begin("accumulate pair", stack_a.rows() as u64);
        for strip in StripIterator::new(stack_a.rows(), self.config.strip_rows, 0) {
            self.cancel.check()?;
            let rect = strip.rect(cols);
            stack_a.read(rect)?;
            stack_b.read(rect)?;
            for r in 0..strip.rows {
                for c in 0..cols {
                    stack_a.sample_into(r, c, &mut sample_a);
                    stack_b.sample_into(r, c, &mut sample_b);
                    if policy.all_nodata(&sample_a) || policy.all_nodata(&sample_b) {
                        continue;
                    }
                    acc.accumulate_pair(&sample_a, &sample_b)?;
                }
            }
            self.progress.advance(strip.rows as u64);
        }
        self.progress.finish();
        acc.finalize()
    }
}

fn memory_output(inputs: &[&dyn RasterSource], bands: usize) -> Result<MemRaster> {
    let first = inputs
        .first()
        .ok_or_else(|| Error::invalid_param("inputs", 0, "at least one input dataset is required"))?;
    OutputSpec::new(bands).create_memory(*first)
}

fn total_bands(inputs: &[&dyn RasterSource]) -> usize {
    inputs.iter().map(|s| s.band_count()).sum()
}

fn check_output(stack: &InputStack<'_>, n_out: usize, output: &dyn RasterSink) -> Result<()> {
    if output.band_count() != n_out {
        return Err(Error::OutputBands {
            expected: n_out,
            actual: output.band_count(),
        });
    }
    let (rows, cols) = output.size();
    if (rows, cols) != (stack.rows(), stack.cols()) {
        return Err(Error::SizeMismatch {
            er: stack.rows(),
            ec: stack.cols(),
            ar: rows,
            ac: cols,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sum;

    impl PixelCalculator for Sum {
        fn num_out_bands(&self) -> usize {
            1
        }
        fn nodata(&self) -> NoDataPolicy {
            NoDataPolicy::enabled(-1.0)
        }
        fn calc_pixel(&mut self, sample: &[f64], out: &mut [f64]) -> Result<()> {
            out[0] = sample.iter().sum();
            Ok(())
        }
    }

    struct WindowMean;

    impl WindowCalculator for WindowMean {
        fn num_out_bands(&self) -> usize {
            1
        }
        fn calc_window(&mut self, window: &Window<'_>, out: &mut [f64]) -> Result<()> {
            let band = window.band(0);
            out[0] = band.iter().sum::<f64>() / band.len() as f64;
            Ok(())
        }
    }

    struct KeepUnlessOdd;

    impl ConditionalWindowCalculator for KeepUnlessOdd {
        fn num_out_bands(&self) -> usize {
            1
        }
        fn calc_window(&mut self, window: &Window<'_>, out: &mut [f64]) -> Result<bool> {
            out[0] = 100.0;
            Ok(window.center(0) as i64 % 2 == 1)
        }
    }

    struct Count(f64);

    impl Accumulator for Count {
        fn reset(&mut self) {
            self.0 = 0.0;
        }
        fn nodata(&self) -> NoDataPolicy {
            NoDataPolicy::enabled(0.0)
        }
        fn accumulate(&mut self, _sample: &[f64]) -> Result<()> {
            self.0 += 1.0;
            Ok(())
        }
        fn finalize(&mut self) -> Result<Vec<f64>> {
            Ok(vec![self.0])
        }
    }

    fn ramp(rows: usize, cols: usize) -> MemRaster {
        let data: Vec<f64> = (0..rows * cols).map(|v| v as f64).collect();
        MemRaster::from_vec(1, rows, cols, data).unwrap()
    }

    #[test]
    fn test_pixel_pass_multi_dataset() {
        let a = MemRaster::filled(2, 5, 4, 1.0);
        let b = MemRaster::filled(1, 5, 4, 3.0);
        let mut out = MemRaster::new(1, 5, 4);
        let engine = ImageCalc::new(CalcConfig { strip_rows: 2 });
        engine.calc_image(&[&a, &b], &mut Sum, &mut out).unwrap();
        assert!(out.data().iter().all(|&v| (v - 5.0).abs() < 1e-10));
    }

    #[test]
    fn test_nodata_short_circuit_is_zero() {
        let mut a = MemRaster::filled(2, 3, 3, 2.0);
        a.set_pixel(1, 1, &[-1.0, -1.0]);
        a.set_pixel(0, 0, &[-1.0, 4.0]);
        let mut out = MemRaster::new(1, 3, 3);
        ImageCalc::default().calc_image(&[&a], &mut Sum, &mut out).unwrap();
        assert_eq!(out.get(0, 1, 1).unwrap(), 0.0);
        assert!((out.get(0, 0, 0).unwrap() - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_output_band_mismatch() {
        let a = MemRaster::new(1, 3, 3);
        let mut out = MemRaster::new(2, 3, 3);
        let err = ImageCalc::default().calc_image(&[&a], &mut Sum, &mut out).unwrap_err();
        assert!(matches!(err, Error::OutputBands { expected: 1, actual: 2 }));
    }

    #[test]
    fn test_window_strips_match_single_strip() {
        let src = ramp(9, 7);
        let mut one = MemRaster::new(1, 9, 7);
        let mut many = MemRaster::new(1, 9, 7);
        ImageCalc::new(CalcConfig { strip_rows: 100 })
            .calc_window(&[&src], 5, &mut WindowMean, &mut one)
            .unwrap();
        ImageCalc::new(CalcConfig { strip_rows: 2 })
            .calc_window(&[&src], 5, &mut WindowMean, &mut many)
            .unwrap();
        for (a, b) in one.data().iter().zip(many.data().iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_window_clamps_to_edge() {
        let src = ramp(3, 3);
        let mut out = MemRaster::new(1, 3, 3);
        ImageCalc::default()
            .calc_window(&[&src], 3, &mut WindowMean, &mut out)
            .unwrap();
        // corner window: [0,0,1; 0,0,1; 3,3,4]
        let expected = (0.0 + 0.0 + 1.0 + 0.0 + 0.0 + 1.0 + 3.0 + 3.0 + 4.0) / 9.0;
        assert!((out.get(0, 0, 0).unwrap() - expected).abs() < 1e-10);
        assert!((out.get(0, 1, 1).unwrap() - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_even_window_rejected() {
        let src = ramp(3, 3);
        let mut out = MemRaster::new(1, 3, 3);
        let err = ImageCalc::default()
            .calc_window(&[&src], 4, &mut WindowMean, &mut out)
            .unwrap_err();
        assert!(matches!(err, Error::WindowSize(4)));
    }

    #[test]
    fn test_conditional_keeps_centre() {
        let src = ramp(2, 2);
        let mut out = MemRaster::new(1, 2, 2);
        ImageCalc::default()
            .calc_window_conditional(&[&src], 3, &mut KeepUnlessOdd, &mut out)
            .unwrap();
        assert_eq!(out.get(0, 0, 0).unwrap(), 0.0);
        assert_eq!(out.get(0, 0, 1).unwrap(), 100.0);
        assert_eq!(out.get(0, 1, 0).unwrap(), 2.0);
        assert_eq!(out.get(0, 1, 1).unwrap(), 100.0);
    }

    #[test]
    fn test_accumulate_skips_nodata() {
        let mut src = MemRaster::filled(1, 4, 4, 1.0);
        src.set(0, 2, 2, 0.0).unwrap();
        let mut acc = Count(99.0);
        let result = ImageCalc::default().accumulate(&[&src], &mut acc).unwrap();
        assert_eq!(result, vec![15.0]);
    }

    #[test]
    fn test_cancelled_before_pass() {
        let src = ramp(3, 3);
        let mut out = MemRaster::new(1, 3, 3);
        let cancel = CancelToken::new();
        cancel.cancel();
        let engine = ImageCalc::default().with_cancel(cancel);
        assert!(matches!(
            engine.calc_image(&[&src], &mut Sum, &mut out),
            Err(Error::Cancelled)
        ));
    }
}
