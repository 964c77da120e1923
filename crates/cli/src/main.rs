//! imgcalc CLI - windowed image computation for remote sensing

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use imgcalc_algorithms::classification::{
    ClusterCentre, InitMethod, IsodataParams, KmeansParams, NearestCentreClassifier, isodata, kmeans, load_centres,
    save_centres,
};
use imgcalc_algorithms::imagery::{
    BandMath, BandMathParams, LinearFit, LinearFitParams, MaskParams, SamplePointsParams, mask, sample_points,
};
use imgcalc_algorithms::morphology::{
    StructuringElement, black_hat, closing, dilate, erode, gradient, opening, top_hat,
};
use imgcalc_algorithms::segmentation::{ClumpParams, DistanceParams, clump, distance};
use imgcalc_algorithms::statistics::{
    WindowStatistic, WindowStatsParams, correlation_matrix, mahalanobis_global, mahalanobis_window,
    window_statistics,
};
use imgcalc_algorithms::unmixing::{EndmemberMatrix, LinearUnmixer, UnmixMethod, UnmixParams};
use imgcalc_core::io::{read_geotiff, read_matrix, write_geotiff, write_matrix};
use imgcalc_core::vector::{AttributeValue, Feature, FeatureCollection, VectorLayer};
use imgcalc_core::{DataType, MemRaster, OutputSpec, RasterSource};
use imgcalc_engine::{ImageCalc, PixelCalculator, ProcessingMode, Progress};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "imgcalc")]
#[command(author, version, about = "Windowed image computation for remote sensing", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Evaluate band math expressions over one or more co-registered rasters
    Bandmath {
        /// Output file
        output: PathBuf,
        /// Input rasters; bands are numbered b1..bN across all inputs in order
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
        /// Expression, one per output band
        #[arg(short, long, required = true)]
        expr: Vec<String>,
        /// Named variable bound to a 1-based band, e.g. nir=4
        #[arg(long = "var")]
        variables: Vec<String>,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Replace pixels selected by a single-band mask
    Mask {
        input: PathBuf,
        mask: PathBuf,
        output: PathBuf,
        /// Mask values that select a pixel
        #[arg(long, default_values_t = vec![0.0])]
        mask_value: Vec<f64>,
        /// Value written to every band of a masked pixel
        #[arg(long, default_value = "0")]
        out_value: f64,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Per-pixel linear regression of the band stack against x values
    Fit {
        input: PathBuf,
        output: PathBuf,
        /// Text file with one x value per band
        #[arg(short, long)]
        x_values: PathBuf,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Moving window statistics on every band
    Stats {
        input: PathBuf,
        output: PathBuf,
        /// mean, stddev, min, max, range, sum, count, median, or p<percentile>
        #[arg(short, long, default_value = "mean")]
        statistic: String,
        #[arg(short, long, default_value = "1")]
        radius: usize,
        /// Circular footprint instead of the full square
        #[arg(long)]
        circular: bool,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Mahalanobis distance, global or within a moving window
    Mahalanobis {
        input: PathBuf,
        output: PathBuf,
        /// Odd window size; the global distribution is used when omitted
        #[arg(short, long)]
        window: Option<usize>,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Correlation matrix between every pair of bands
    Correlation {
        input: PathBuf,
        /// Output matrix text file
        output: PathBuf,
        #[arg(long)]
        nodata: Option<f64>,
        /// Run band pairs sequentially
        #[arg(long)]
        sequential: bool,
    },
    /// Mathematical morphology
    Morphology {
        #[command(subcommand)]
        algorithm: MorphologyCommands,
    },
    /// K-means clustering; writes the centres and optionally the classified image
    Kmeans {
        input: PathBuf,
        /// Output centre matrix file
        centres: PathBuf,
        #[command(flatten)]
        cluster: ClusterArgs,
        #[arg(long, default_value = "5")]
        clusters: usize,
        #[arg(long, default_value = "100")]
        max_iterations: usize,
    },
    /// ISODATA clustering; writes the centres and optionally the classified image
    Isodata {
        input: PathBuf,
        /// Output centre matrix file
        centres: PathBuf,
        #[command(flatten)]
        cluster: ClusterArgs,
        #[arg(long, default_value = "5")]
        clusters: usize,
        #[arg(long, default_value = "2")]
        min_clusters: usize,
        #[arg(long, default_value = "10")]
        max_clusters: usize,
        #[arg(long, default_value = "50")]
        max_iterations: usize,
        #[arg(long, default_value = "10")]
        min_features: usize,
        #[arg(long, default_value = "10.0")]
        max_std_dev: f64,
        #[arg(long, default_value = "5.0")]
        min_distance: f64,
        #[arg(long, default_value = "0")]
        start_iteration: usize,
        #[arg(long, default_value = "40")]
        end_iteration: usize,
    },
    /// Label every pixel with its nearest saved cluster centre
    Classify {
        input: PathBuf,
        /// Centre matrix file
        centres: PathBuf,
        output: PathBuf,
        #[arg(long)]
        nodata: Option<f64>,
    },
    /// Linear spectral unmixing
    Unmix {
        input: PathBuf,
        /// Endmember matrix file, one endmember per row
        endmembers: PathBuf,
        output: PathBuf,
        /// unconstrained, sum-to-one, nnls, or exhaustive
        #[arg(short, long, default_value = "unconstrained")]
        method: String,
        /// Weight of the sum-to-one row
        #[arg(long, default_value = "1.0")]
        weight: f64,
        /// Fraction step of the exhaustive search
        #[arg(long, default_value = "0.01")]
        step: f64,
        #[arg(long, default_value = "1.0")]
        gain: f64,
        #[arg(long, default_value = "0.0")]
        offset: f64,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Label 4-connected regions of equal value
    Clump {
        input: PathBuf,
        output: PathBuf,
        /// Zero-based band to clump
        #[arg(short, long, default_value = "0")]
        band: usize,
        #[arg(long)]
        nodata: Option<f64>,
        /// Renumber clumps to 1..n
        #[arg(long)]
        relabel: bool,
        #[arg(long)]
        max_passes: Option<usize>,
    },
    /// Distance to the nearest non-zero pixel
    Distance {
        input: PathBuf,
        output: PathBuf,
        #[arg(short, long, default_value = "0")]
        band: usize,
        #[arg(long)]
        nodata: Option<f64>,
        #[arg(long)]
        max_distance: Option<f64>,
        /// Value of pixels beyond the maximum distance
        #[arg(long, default_value = "-1")]
        fill: f64,
    },
    /// Sample pixel values under points and write them as CSV
    Sample {
        input: PathBuf,
        /// Text file with one "x y" coordinate pair per line
        points: PathBuf,
        /// Output CSV file
        output: PathBuf,
        /// Attribute name prefix
        #[arg(long, default_value = "b")]
        prefix: String,
    },
}

#[derive(Subcommand)]
enum MorphologyCommands {
    /// Erosion (minimum filter)
    Erode(MorphologyArgs),
    /// Dilation (maximum filter)
    Dilate(MorphologyArgs),
    /// Opening (erosion then dilation)
    Opening(MorphologyArgs),
    /// Closing (dilation then erosion)
    Closing(MorphologyArgs),
    /// Gradient (dilation minus erosion)
    Gradient(MorphologyArgs),
    /// Top-hat (input minus opening)
    TopHat(MorphologyArgs),
    /// Black-hat (closing minus input)
    BlackHat(MorphologyArgs),
}

#[derive(Args)]
struct MorphologyArgs {
    input: PathBuf,
    output: PathBuf,
    /// Element shape: square, cross, or disk
    #[arg(short, long, default_value = "square")]
    shape: String,
    #[arg(short, long, default_value = "1")]
    radius: usize,
}

#[derive(Args)]
struct OutputArgs {
    /// No-data value of the input
    #[arg(long)]
    nodata: Option<f64>,
    /// Output sample type: u8, u16, i16, i32, u32, f32, f64
    #[arg(long, default_value = "f32")]
    data_type: String,
}

#[derive(Args)]
struct ClusterArgs {
    /// Also write the classified image here
    #[arg(long)]
    classified: Option<PathBuf>,
    /// random, diagonal_full, diagonal_stddev, diagonal_full_attach,
    /// diagonal_stddev_attach, or kmeans++
    #[arg(long, default_value = "kmeans++")]
    init: String,
    #[arg(long, default_value = "0.001")]
    degree_of_change: f64,
    /// Use every n-th valid pixel
    #[arg(long, default_value = "1")]
    subsample: usize,
    #[arg(long)]
    nodata: Option<f64>,
    #[arg(long, default_value = "42")]
    seed: u64,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Engine progress shown as an indicatif bar
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} rows") {
            bar.set_style(style.progress_chars("=> "));
        }
        Arc::new(Self { bar })
    }
}

impl Progress for BarProgress {
    fn begin(&self, label: &str, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_message(label.to_string());
    }

    fn advance(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn read_raster(path: &Path) -> Result<MemRaster> {
    let pb = spinner("Reading raster...");
    let raster = read_geotiff(path).with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {} x {} bands", raster.cols(), raster.rows(), raster.bands());
    Ok(raster)
}

fn with_nodata(mut raster: MemRaster, nodata: Option<f64>) -> MemRaster {
    if nodata.is_some() {
        raster.set_nodata(nodata);
    }
    raster
}

fn parse_data_type(name: &str) -> Result<DataType> {
    DataType::parse(name).with_context(|| format!("Unknown data type: {}", name))
}

fn write_result(raster: &MemRaster, path: &Path, data_type: DataType) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path, data_type).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

/// Stream a pixel calculator straight into a GeoTIFF
fn run_to_file<C: PixelCalculator>(
    inputs: &[&dyn RasterSource],
    calc: &mut C,
    output: &Path,
    data_type: DataType,
    band_names: Option<Vec<String>>,
) -> Result<()> {
    let mut spec = OutputSpec::geotiff(calc.num_out_bands(), output).with_data_type(data_type);
    if let Some(names) = band_names {
        spec = spec.with_band_names(names);
    }
    let first = inputs.first().context("No input rasters")?;
    let mut sink = spec.create_sink(*first).context("Failed to create output")?;
    ImageCalc::default()
        .with_progress(BarProgress::new())
        .calc_image(inputs, calc, sink.as_mut())
        .context("Calculation failed")?;
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn parse_variables(specs: &[String]) -> Result<Vec<(String, usize)>> {
    specs
        .iter()
        .map(|spec| {
            let (name, band) = spec
                .split_once('=')
                .with_context(|| format!("Variable must be 'name=band', got: {}", spec))?;
            let band: usize = band.trim().parse().with_context(|| format!("Invalid band in {}", spec))?;
            anyhow::ensure!(band >= 1, "Bands are numbered from 1: {}", spec);
            Ok((name.trim().to_string(), band - 1))
        })
        .collect()
}

fn parse_unmix_method(name: &str, weight: f64, step: f64) -> Result<UnmixMethod> {
    match name.to_lowercase().as_str() {
        "unconstrained" | "ls" => Ok(UnmixMethod::Unconstrained),
        "sum-to-one" | "sum" => Ok(UnmixMethod::SumToOne { weight }),
        "nnls" | "non-negative" => Ok(UnmixMethod::NonNegative { weight }),
        "exhaustive" => Ok(UnmixMethod::Exhaustive { step }),
        _ => anyhow::bail!(
            "Unknown method: {}. Use unconstrained, sum-to-one, nnls, or exhaustive.",
            name
        ),
    }
}

fn write_classified(raster: &MemRaster, centres: &[ClusterCentre], path: &Path, nodata: Option<f64>) -> Result<()> {
    let mut calc = NearestCentreClassifier::new(centres.to_vec(), nodata)?;
    run_to_file(&[raster], &mut calc, path, DataType::U16, Some(vec!["class".into()]))
}

fn read_points(path: &Path) -> Result<FeatureCollection> {
    let coords = read_matrix(path).with_context(|| format!("Failed to read points {}", path.display()))?;
    anyhow::ensure!(coords.ncols() >= 2, "Point file needs x and y columns");
    let mut layer = FeatureCollection::new();
    for row in coords.rows() {
        let point = geo_types::Point::new(row[0], row[1]);
        layer.push(Feature::new(geo_types::Geometry::Point(point)));
    }
    Ok(layer)
}

fn write_samples_csv(layer: &FeatureCollection, fields: &[String], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).context("Failed to create CSV")?;
    let mut header = vec!["x".to_string(), "y".to_string()];
    header.extend(fields.iter().cloned());
    wtr.write_record(&header)?;
    for fid in 0..layer.feature_count() {
        let (x, y) = match layer.geometry(fid)? {
            Some(geo_types::Geometry::Point(p)) => (p.x(), p.y()),
            _ => continue,
        };
        let mut record = vec![x.to_string(), y.to_string()];
        for f in fields {
            record.push(match layer.field(fid, f)? {
                Some(AttributeValue::Float(v)) => v.to_string(),
                _ => String::new(),
            });
        }
        wtr.write_record(&record)?;
    }
    wtr.flush().context("Failed to write CSV")?;
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_raster(&input)?;
            let gt = raster.transform();
            println!("File: {}", input.display());
            println!(
                "Dimensions: {} x {} x {} bands",
                raster.cols(),
                raster.rows(),
                raster.bands()
            );
            println!("Pixel size: {}", gt.pixel_size());
            println!("Origin: ({:.6}, {:.6})", gt.origin_x, gt.origin_y);
            for band in 0..raster.bands() {
                let nodata = RasterSource::nodata(&raster, band);
                let valid: Vec<f64> = raster
                    .band(band)
                    .iter()
                    .copied()
                    .filter(|v| !v.is_nan() && Some(*v) != nodata)
                    .collect();
                let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
                let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let mean = valid.iter().sum::<f64>() / valid.len().max(1) as f64;
                println!("\nBand {} ({}):", band + 1, raster.band_names()[band]);
                if let Some(nd) = nodata {
                    println!("  NoData: {}", nd);
                }
                println!("  Min: {:.4}  Max: {:.4}  Mean: {:.4}", min, max, mean);
                println!("  Valid cells: {}", valid.len());
            }
        }

        // ── Imagery ──────────────────────────────────────────────────
        Commands::Bandmath {
            output,
            input,
            expr,
            variables,
            out,
        } => {
            let rasters = input
                .iter()
                .map(|p| read_raster(p).map(|r| with_nodata(r, out.nodata)))
                .collect::<Result<Vec<_>>>()?;
            let params = BandMathParams {
                expressions: expr,
                variables: parse_variables(&variables)?,
                nodata: out.nodata,
            };
            let mut calc = BandMath::new(&params).context("Invalid expression")?;
            let inputs: Vec<&dyn RasterSource> = rasters.iter().map(|r| r as &dyn RasterSource).collect();
            let start = Instant::now();
            run_to_file(&inputs, &mut calc, &output, parse_data_type(&out.data_type)?, None)?;
            done("Band math", &output, start.elapsed());
        }

        Commands::Mask {
            input,
            mask: mask_path,
            output,
            mask_value,
            out_value,
            out,
        } => {
            let image = read_raster(&input)?;
            let mask_raster = read_raster(&mask_path)?;
            let params = MaskParams {
                mask_values: mask_value,
                out_value,
                nodata: out.nodata,
            };
            let start = Instant::now();
            let result = mask(&image, &mask_raster, params).context("Failed to apply mask")?;
            let elapsed = start.elapsed();
            write_result(&result, &output, parse_data_type(&out.data_type)?)?;
            done("Masked image", &output, elapsed);
        }

        Commands::Fit {
            input,
            output,
            x_values,
            out,
        } => {
            let raster = read_raster(&input)?;
            let mut params = LinearFitParams::from_file(&x_values).context("Failed to read x values")?;
            params.nodata = out.nodata;
            let mut calc = LinearFit::new(&params)?;
            let start = Instant::now();
            let names = vec!["slope".to_string(), "intercept".to_string(), "r2".to_string()];
            run_to_file(&[&raster], &mut calc, &output, parse_data_type(&out.data_type)?, Some(names))?;
            done("Linear fit", &output, start.elapsed());
        }

        // ── Statistics ───────────────────────────────────────────────
        Commands::Stats {
            input,
            output,
            statistic,
            radius,
            circular,
            out,
        } => {
            let raster = read_raster(&input)?;
            let params = WindowStatsParams {
                radius,
                statistic: WindowStatistic::parse(&statistic)?,
                circular,
                nodata: out.nodata,
            };
            let start = Instant::now();
            let result = window_statistics(&raster, &params).context("Failed to compute window statistics")?;
            let elapsed = start.elapsed();
            write_result(&result, &output, parse_data_type(&out.data_type)?)?;
            done("Window statistics", &output, elapsed);
        }

        Commands::Mahalanobis {
            input,
            output,
            window,
            out,
        } => {
            let raster = read_raster(&input)?;
            let start = Instant::now();
            let result = match window {
                Some(size) => mahalanobis_window(&raster, size, out.nodata),
                None => mahalanobis_global(&raster, out.nodata),
            }
            .context("Failed to compute Mahalanobis distance")?;
            let elapsed = start.elapsed();
            write_result(&result, &output, parse_data_type(&out.data_type)?)?;
            done("Mahalanobis distance", &output, elapsed);
        }

        Commands::Correlation {
            input,
            output,
            nodata,
            sequential,
        } => {
            let raster = read_raster(&input)?;
            let mode = if sequential {
                ProcessingMode::Sequential
            } else {
                ProcessingMode::Parallel
            };
            let start = Instant::now();
            let matrix = correlation_matrix(&raster, nodata, mode).context("Failed to compute correlation")?;
            write_matrix(&output, &matrix).context("Failed to write matrix")?;
            done("Correlation matrix", &output, start.elapsed());
        }

        // ── Morphology ───────────────────────────────────────────────
        Commands::Morphology { algorithm } => {
            let (name, args) = match &algorithm {
                MorphologyCommands::Erode(a) => ("Erosion", a),
                MorphologyCommands::Dilate(a) => ("Dilation", a),
                MorphologyCommands::Opening(a) => ("Opening", a),
                MorphologyCommands::Closing(a) => ("Closing", a),
                MorphologyCommands::Gradient(a) => ("Gradient", a),
                MorphologyCommands::TopHat(a) => ("Top-hat", a),
                MorphologyCommands::BlackHat(a) => ("Black-hat", a),
            };
            let se = StructuringElement::parse(&format!("{}:{}", args.shape, args.radius))
                .context("Invalid structuring element")?;
            let raster = read_raster(&args.input)?;
            let pb = spinner(&format!("{}...", name));
            let start = Instant::now();
            let result = match &algorithm {
                MorphologyCommands::Erode(_) => erode(&raster, &se),
                MorphologyCommands::Dilate(_) => dilate(&raster, &se),
                MorphologyCommands::Opening(_) => opening(&raster, &se),
                MorphologyCommands::Closing(_) => closing(&raster, &se),
                MorphologyCommands::Gradient(_) => gradient(&raster, &se),
                MorphologyCommands::TopHat(_) => top_hat(&raster, &se),
                MorphologyCommands::BlackHat(_) => black_hat(&raster, &se),
            }
            .with_context(|| format!("Failed to compute {}", name.to_lowercase()))?;
            let elapsed = start.elapsed();
            pb.finish_and_clear();
            write_result(&result, &args.output, DataType::F32)?;
            done(name, &args.output, elapsed);
        }

        // ── Classification ───────────────────────────────────────────
        Commands::Kmeans {
            input,
            centres,
            cluster,
            clusters,
            max_iterations,
        } => {
            let raster = read_raster(&input)?;
            let params = KmeansParams {
                num_clusters: clusters,
                max_iterations,
                degree_of_change: cluster.degree_of_change,
                init: InitMethod::parse(&cluster.init)?,
                subsample: cluster.subsample,
                nodata: cluster.nodata,
                seed: cluster.seed,
            };
            let pb = spinner("Clustering...");
            let start = Instant::now();
            let result = kmeans(&raster, &params).context("K-means failed")?;
            pb.finish_and_clear();
            save_centres(&centres, &result.centres).context("Failed to write centres")?;
            if let Some(path) = &cluster.classified {
                write_classified(&raster, &result.centres, path, cluster.nodata)?;
            }
            println!(
                "{} clusters after {} iterations (converged: {})",
                result.centres.len(),
                result.iterations,
                result.converged
            );
            done("Cluster centres", &centres, start.elapsed());
        }

        Commands::Isodata {
            input,
            centres,
            cluster,
            clusters,
            min_clusters,
            max_clusters,
            max_iterations,
            min_features,
            max_std_dev,
            min_distance,
            start_iteration,
            end_iteration,
        } => {
            let raster = read_raster(&input)?;
            let params = IsodataParams {
                num_clusters: clusters,
                min_num_clusters: min_clusters,
                max_num_clusters: max_clusters,
                max_iterations,
                degree_of_change: cluster.degree_of_change,
                min_num_features: min_features,
                max_std_dev,
                min_dist_between_clusters: min_distance,
                start_iteration,
                end_iteration,
                init: InitMethod::parse(&cluster.init)?,
                subsample: cluster.subsample,
                nodata: cluster.nodata,
                seed: cluster.seed,
            };
            let pb = spinner("Clustering...");
            let start = Instant::now();
            let result = isodata(&raster, &params).context("ISODATA failed")?;
            pb.finish_and_clear();
            let plain = result.plain_centres();
            save_centres(&centres, &plain).context("Failed to write centres")?;
            if let Some(path) = &cluster.classified {
                write_classified(&raster, &plain, path, cluster.nodata)?;
            }
            println!(
                "{} clusters after {} iterations (converged: {})",
                plain.len(),
                result.iterations,
                result.converged
            );
            done("Cluster centres", &centres, start.elapsed());
        }

        Commands::Classify {
            input,
            centres,
            output,
            nodata,
        } => {
            let raster = read_raster(&input)?;
            let centres = load_centres(&centres).context("Failed to read centres")?;
            let start = Instant::now();
            write_classified(&raster, &centres, &output, nodata)?;
            done("Classification", &output, start.elapsed());
        }

        // ── Unmixing ─────────────────────────────────────────────────
        Commands::Unmix {
            input,
            endmembers,
            output,
            method,
            weight,
            step,
            gain,
            offset,
            out,
        } => {
            let raster = read_raster(&input)?;
            let em = Arc::new(EndmemberMatrix::load(&endmembers).context("Failed to read endmembers")?);
            let params = UnmixParams {
                method: parse_unmix_method(&method, weight, step)?,
                gain,
                offset,
                nodata: out.nodata,
            };
            let mut calc = LinearUnmixer::new(em, &params).context("Invalid endmembers")?;
            let names = calc.band_names();
            let start = Instant::now();
            run_to_file(&[&raster], &mut calc, &output, parse_data_type(&out.data_type)?, Some(names))?;
            done("Fractions", &output, start.elapsed());
        }

        // ── Segmentation ─────────────────────────────────────────────
        Commands::Clump {
            input,
            output,
            band,
            nodata,
            relabel,
            max_passes,
        } => {
            let raster = read_raster(&input)?;
            let params = ClumpParams {
                band,
                nodata,
                relabel,
                max_passes,
            };
            let pb = spinner("Clumping...");
            let start = Instant::now();
            let result = clump(&raster, &params).context("Clumping failed")?;
            let elapsed = start.elapsed();
            pb.finish_and_clear();
            println!("{} clumps in {} passes", result.num_clumps, result.passes);
            write_result(&result.labels, &output, DataType::U32)?;
            done("Clumps", &output, elapsed);
        }

        Commands::Distance {
            input,
            output,
            band,
            nodata,
            max_distance,
            fill,
        } => {
            let raster = read_raster(&input)?;
            let params = DistanceParams {
                band,
                nodata,
                max_distance,
                fill_value: fill,
            };
            let pb = spinner("Growing distances...");
            let start = Instant::now();
            let result = distance(&raster, &params).context("Distance transform failed")?;
            let elapsed = start.elapsed();
            pb.finish_and_clear();
            write_result(&result, &output, DataType::F32)?;
            done("Distance", &output, elapsed);
        }

        Commands::Sample {
            input,
            points,
            output,
            prefix,
        } => {
            let raster = read_raster(&input)?;
            let mut layer = read_points(&points)?;
            let params = SamplePointsParams {
                prefix: prefix.clone(),
                bands: None,
            };
            let start = Instant::now();
            let sampled = sample_points(&raster, &mut layer, &params).context("Sampling failed")?;
            let fields: Vec<String> = (1..=raster.bands()).map(|b| format!("{}{}", prefix, b)).collect();
            write_samples_csv(&layer, &fields, &output)?;
            println!("{} of {} points sampled", sampled, layer.feature_count());
            done("Samples", &output, start.elapsed());
        }
    }

    Ok(())
}
