use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use collembola_size::config::{AnalysisConfig, Background, Calibration};
use collembola_size::pipeline::BatchRunner;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment sample images, measure specimens and write the report
    Analyze(AnalyzeArgs),
    /// Regenerate the workbook and charts from an archived corpus
    Report(ReportArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Image file names, in sample order
    #[arg(long, num_args = 1..)]
    images: Option<Vec<String>>,

    /// Directory holding the images
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Directory for tables, workbook, charts and run report
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Directory for annotated masks
    #[arg(long)]
    analyzed_dir: Option<PathBuf>,

    /// Pixels spanning the known distance
    #[arg(long)]
    scale: Option<f64>,

    /// Known distance in mm
    #[arg(long)]
    known_distance: Option<f64>,

    /// Small-specimen cutoff in µm
    #[arg(long)]
    threshold: Option<f64>,

    /// Skip juvenile/adult clustering
    #[arg(long, default_value_t = false)]
    no_juveniles: bool,

    /// Keep per-image CSV tables
    #[arg(long, default_value_t = false)]
    keep_image_tables: bool,

    /// Archive the corpus as Parquet
    #[arg(long, default_value_t = false)]
    parquet: bool,

    /// Do not render PNG charts
    #[arg(long, default_value_t = false)]
    no_charts: bool,

    /// Specimens are darker than the background
    #[arg(long, default_value_t = false)]
    light_background: bool,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Parquet corpus written by `analyze --parquet`
    #[arg(long)]
    corpus: PathBuf,

    /// Directory for the workbook and charts
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Small-specimen cutoff in µm
    #[arg(long, default_value_t = collembola_size::config::DEFAULT_SIZE_THRESHOLD_UM)]
    threshold: f64,

    /// Do not render PNG charts
    #[arg(long, default_value_t = false)]
    no_charts: bool,
}

impl AnalyzeArgs {
    fn into_config(self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => AnalysisConfig::default(),
        };

        if let Some(images) = self.images {
            config.sample_images = images;
        }
        if let Some(dir) = self.input_dir {
            config.input_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(dir) = self.analyzed_dir {
            config.analyzed_dir = dir;
        }
        if self.scale.is_some() || self.known_distance.is_some() {
            config.calibration = Calibration::new(
                self.scale.unwrap_or(config.calibration.scale_px),
                self.known_distance
                    .unwrap_or(config.calibration.known_distance_mm),
            )
            .context("invalid calibration")?;
        }
        if let Some(threshold) = self.threshold {
            config.size_threshold_um = threshold;
        }
        if self.no_juveniles {
            config.distinguish_juveniles = false;
        }
        if self.keep_image_tables {
            config.retain_image_tables = true;
        }
        if self.parquet {
            config.archive_parquet = true;
        }
        if self.no_charts {
            config.render_charts = false;
        }
        if self.light_background {
            config.segmentation.background = Background::Light;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Analyze(args) => {
            let config = args.into_config()?;
            let outcome = BatchRunner::from_config(&config)
                .run(&config)
                .context("analysis failed")?;

            let summary = outcome.summary;
            println!("Specimens measured: {}", summary.count);
            println!("Mean Feret's diameter: {:.3} μm", summary.mean);
            if let Some(std) = summary.standard_deviation {
                println!("Standard deviation: {std:.3} μm");
            }
            println!("Range: {:.3} - {:.3} μm", summary.min, summary.max);
            println!(
                "{}: {:.1}",
                summary.threshold_label(),
                summary.percent_under_threshold
            );
            println!("Workbook: {}", outcome.artifacts.workbook.display());
            if !outcome.report.failed().is_empty() {
                println!("Skipped images: {}", outcome.report.failed().len());
            }
        }
        Command::Report(args) => {
            let report = BatchRunner::report_from_archive(
                &args.corpus,
                &args.output_dir,
                args.threshold,
                !args.no_charts,
            )
            .with_context(|| format!("reporting from {}", args.corpus.display()))?;
            println!("Workbook: {}", report.artifacts.workbook.display());
        }
    }

    Ok(())
}
