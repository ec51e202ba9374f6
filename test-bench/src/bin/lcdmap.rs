//! LCD brightness mapping tool.
//!
//! Subcommands:
//! - `measure`: Scan a display with the gantry and save the brightness map
//! - `visualize`: Render a saved brightness map as a PNG heatmap
//! - `compensate`: Build a compensation mask from a full-screen measurement

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lcdmap_bench::{FixedCorners, PromptCornerPicker};
use lcdmap_hardware::marlin::{
    MarlinLink, ScanConfig, ScanStrategy, Scanner, Sensor, DEFAULT_BAUD, DEFAULT_PORT,
};
use lcdmap_shared::image_proc::{normalize, AngularOrderMatcher, CornerMatcher, DespikeConfig, OriginDistanceMatcher};
use lcdmap_shared::{
    compensate, render_heatmap, CompensationConfig, CornerPicker, Dimensions, HeatmapConfig, Measurement,
};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MatcherKind {
    /// Pair corners by distance from the origin
    OriginDistance,
    /// Pair corners by angle around their centroid
    AngularOrder,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "LCD brightness mapping and compensation", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Take a display measurement and save it to a JSON file
    Measure {
        /// Output measurement file
        output: PathBuf,

        #[arg(long, default_value = DEFAULT_PORT, help = "Serial port of the gantry controller")]
        port: String,

        #[arg(long, default_value_t = DEFAULT_BAUD, help = "Serial baud rate")]
        baud: u32,

        #[arg(long, help = "Screen size in millimetres (WxH)")]
        size: Dimensions<f64>,

        #[arg(long, help = "Number of samples horizontally and vertically (COLSxROWS)")]
        resolution: Dimensions<usize>,

        #[arg(long, default_value = "TSL2561", help = "Sensor used for the measurement")]
        sensor: Sensor,

        #[arg(long, default_value = "3000", help = "Feedrate in mm/min")]
        feedrate: f64,

        #[arg(long, help = "Stream samples while sweeping each row")]
        fast: bool,

        #[arg(long, default_value = "25", help = "Attempts per row before a fast scan gives up")]
        max_row_attempts: usize,
    },

    /// Render a measurement as a PNG heatmap
    Visualize {
        /// Input measurement file
        input: PathBuf,

        /// Output PNG file
        output: PathBuf,

        #[arg(long, default_value = "Display measurement", help = "Plot title")]
        title: String,

        #[arg(long, default_value = "0", help = "Values at or below this are left out")]
        threshold: f64,

        #[arg(long, default_value = "16", help = "Pixels per sample")]
        cell_size: u32,
    },

    /// Build a compensation mask from a full-screen measurement
    Compensate {
        /// Output mask PNG
        output: PathBuf,

        #[arg(long, help = "The full-screen measurement JSON file")]
        measurement: PathBuf,

        #[arg(long, help = "The minimal brightness to compensate for")]
        min: f64,

        #[arg(long, help = "The maximal brightness to compensate for (observed maximum if unset)")]
        max: Option<f64>,

        #[arg(long, help = "Amount of brightness to compensate by (0-255)")]
        by: u8,

        #[arg(long, default_value = "50", help = "The value considered as out of screen")]
        cutoff: f64,

        #[arg(long, help = "The screen resolution in pixels (WxH)")]
        screen: Dimensions<usize>,

        #[arg(long, help = "Locate the screen manually")]
        manual: bool,

        #[arg(long, help = "Screen corners as x,y;x,y;x,y;x,y instead of prompting")]
        corners: Option<FixedCorners>,

        #[arg(long, value_enum, default_value = "origin-distance", help = "How corners are paired with the screen")]
        matcher: MatcherKind,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match args.command {
        Command::Measure {
            output,
            port,
            baud,
            size,
            resolution,
            sensor,
            feedrate,
            fast,
            max_row_attempts,
        } => {
            let config = ScanConfig {
                size_mm: size.to_array(),
                resolution: resolution.to_array(),
                feedrate,
                strategy: if fast { ScanStrategy::Fast } else { ScanStrategy::Conservative },
                max_row_attempts,
            };
            cmd_measure(&output, &port, baud, sensor, config).context("acquisition failed")
        }
        Command::Visualize {
            input,
            output,
            title,
            threshold,
            cell_size,
        } => cmd_visualize(&input, &output, title, threshold, cell_size),
        Command::Compensate {
            output,
            measurement,
            min,
            max,
            by,
            cutoff,
            screen,
            manual,
            corners,
            matcher,
        } => {
            let mut config = CompensationConfig::new(screen, min, by);
            config.max_brightness = max;
            config.manual = manual;
            config.boundary.cutoff = cutoff;
            cmd_compensate(&measurement, &output, &config, corners, matcher).context("calibration failed")
        }
    }
}

fn cmd_measure(output: &Path, port: &str, baud: u32, sensor: Sensor, config: ScanConfig) -> Result<()> {
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = interrupted.clone();
        ctrlc::set_handler(move || {
            warn!("Interrupt received, parking the head");
            flag.store(true, Ordering::SeqCst);
        })
        .context("installing Ctrl-C handler")?;
    }

    let mut link = MarlinLink::connect(port, baud)?;
    link.wait_for_boot()?;

    info!(
        "Scanning {}x{} mm at {}x{} samples with {sensor} ({:?})",
        config.size_mm[0], config.size_mm[1], config.resolution[0], config.resolution[1], config.strategy
    );
    let mut scanner = Scanner::new(sensor, config).with_interrupt(interrupted);
    let measurement = scanner.run(&mut link)?;

    measurement
        .save_to_file(output)
        .with_context(|| format!("writing {}", output.display()))?;
    info!("Measurement saved to {}", output.display());
    Ok(())
}

fn cmd_visualize(input: &Path, output: &Path, title: String, threshold: f64, cell_size: u32) -> Result<()> {
    let measurement =
        Measurement::load_from_file(input).with_context(|| format!("reading {}", input.display()))?;
    let grid = normalize(&measurement.to_array().view(), &DespikeConfig::default(), threshold)?;

    let config = HeatmapConfig {
        cell_size,
        title: Some(title),
    };
    render_heatmap(&grid.view(), output, &config)?;
    info!("Heatmap written to {}", output.display());
    Ok(())
}

fn cmd_compensate(
    measurement_path: &Path,
    output: &Path,
    config: &CompensationConfig,
    corners: Option<FixedCorners>,
    matcher: MatcherKind,
) -> Result<()> {
    let measurement = Measurement::load_from_file(measurement_path)
        .with_context(|| format!("reading {}", measurement_path.display()))?;

    let mut picker: Box<dyn CornerPicker> = match corners {
        Some(fixed) => Box::new(fixed),
        None => Box::new(PromptCornerPicker::new()?),
    };
    let matcher: &dyn CornerMatcher = match matcher {
        MatcherKind::OriginDistance => &OriginDistanceMatcher,
        MatcherKind::AngularOrder => &AngularOrderMatcher,
    };

    let mask = compensate(&measurement, config, picker.as_mut(), matcher)?;
    mask.save_png(output)
        .with_context(|| format!("writing {}", output.display()))?;
    info!("{}x{} mask written to {}", mask.width(), mask.height(), output.display());
    Ok(())
}
