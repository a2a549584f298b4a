// main.rs

mod dump;
mod enrichr;
mod error;
mod matrix;
mod normalize;
mod output;
mod pca;
mod plot;

use anyhow::{anyhow, Result};
use clap::Parser;
use log::{info, warn};
use std::fs;
use std::path::Path;
use std::time::Instant;

use crate::error::PipelineError;
use crate::matrix::{FeatureMatrix, LabelTable};
use crate::normalize::normalize;
use crate::plot::ProjectionSeries;

fn main() -> Result<()> {
    let total_time_start = Instant::now();
    let cli_args = cli::CliArgs::parse();

    // Initialize logger
    let log_level = cli_args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: Invalid log level '{}' provided. Defaulting to Info.",
                cli_args.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_micros()
        .init();

    info!("Starting rnaseq_pca with args: {:?}", cli_args);

    // Configure the worker pool; an explicit --jobs value bounds parallel
    // external tool invocations.
    let num_threads = cli_args.jobs.unwrap_or_else(num_cpus::get);
    info!("Using up to {} parallel jobs.", num_threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;

    match &cli_args.command {
        cli::Command::Dump {
            sra_dir,
            out_dir,
            qc_dir,
        } => {
            let config = dump::DumpConfig {
                sra_dir: sra_dir.clone(),
                out_dir: out_dir.clone(),
                qc_dir: qc_dir.clone(),
            };
            let summary = dump::run_batch(&config)?;
            info!(
                "Dump finished: {} converted ({} failures), {} QC reports ({} failures).",
                summary.converted,
                summary.convert_failures,
                summary.qc_passed,
                summary.qc_failures
            );
        }
        cli::Command::Pca(args) => run_pca(args)?,
        cli::Command::Enrich(args) => run_enrich(args)?,
    }

    info!(
        "rnaseq_pca finished successfully in {:.2?}.",
        total_time_start.elapsed()
    );
    Ok(())
}

fn run_pca(args: &cli::PcaArgs) -> Result<()> {
    // --- 1. Load matrix and labels ---
    info!("Reading feature matrix from {}", args.matrix.display());
    let matrix = FeatureMatrix::from_tsv(&args.matrix)?;
    info!(
        "Loaded {} samples x {} features.",
        matrix.n_samples(),
        matrix.n_features()
    );
    let labels = match &args.labels {
        Some(path) => {
            info!("Reading label table from {}", path.display());
            let labels = LabelTable::from_tsv(path)?;
            // Fail on id mismatch before any computation happens.
            Some(labels.align(&matrix.sample_ids)?)
        }
        None => None,
    };

    // --- 2. Normalize ---
    let normalized = normalize(&matrix, args.standardize, args.log_transform);
    if !normalized.excluded.is_empty() {
        warn!(
            "{} sample(s) excluded after the log transform left them non-finite: {}",
            normalized.excluded.len(),
            normalized.excluded.join(", ")
        );
    }
    let labels = match labels {
        Some(labels) => Some(labels.align(&normalized.matrix.sample_ids)?),
        None => None,
    };

    // --- 3. Reduce ---
    info!("Running PCA...");
    let result = pca::reduce(&normalized.matrix.values)?;
    info!(
        "PCA computation complete. Resulted in {} principal components.",
        result.variance_explained.len()
    );

    // --- 4. Write tabular outputs ---
    if let Some(parent) = Path::new(&args.output_prefix).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                anyhow!(
                    "Failed to create output directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
            info!("Created output directory: {}", parent.display());
        }
    }
    output::write_projected(
        &args.output_prefix,
        &normalized.matrix.sample_ids,
        &result.projected,
    )?;
    output::write_variance(&args.output_prefix, &result.variance_explained)?;
    output::write_loadings(
        &args.output_prefix,
        &normalized.matrix.feature_names,
        &result.loadings,
    )?;
    output::write_top_loadings(
        &args.output_prefix,
        &result,
        &normalized.matrix.feature_names,
        args.top_loadings,
    )?;

    // --- 5. Build and write chart series ---
    let variance_series = plot::build_variance_series(&result.variance_explained);
    let projection_series = build_projection(args, &labels, &normalized, &result)?;
    output::write_series(
        &args.output_prefix,
        &variance_series,
        projection_series.as_ref(),
    )?;

    Ok(())
}

/// Builds the 3-axis projection series when a coloring attribute and enough
/// components are available; otherwise logs why and omits it.
fn build_projection(
    args: &cli::PcaArgs,
    labels: &Option<LabelTable>,
    normalized: &normalize::NormalizedMatrix,
    result: &pca::PcaResult,
) -> Result<Option<ProjectionSeries>> {
    let labels = match labels {
        Some(labels) => labels,
        None => {
            info!("No label table given; omitting the projection series.");
            return Ok(None);
        }
    };
    let color_name = match &args.color_by {
        Some(name) => name.clone(),
        None => labels.columns[0].clone(),
    };
    let color_values = labels.column(&color_name)?;

    match plot::build_projection_series(
        &result.projected,
        &result.variance_explained,
        &normalized.matrix.sample_ids,
        &color_name,
        &color_values,
    ) {
        Ok(series) => Ok(Some(series)),
        Err(PipelineError::InsufficientComponents { needed, available }) => {
            warn!(
                "Only {} principal component(s) computed, {} needed for the 3D projection; omitting it.",
                available, needed
            );
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn run_enrich(args: &cli::EnrichArgs) -> Result<()> {
    let content = fs::read_to_string(&args.genes).map_err(|e| {
        anyhow!("cannot read gene list file {}: {}", args.genes.display(), e)
    })?;
    let genes: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();
    if genes.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "gene list file {} contains no genes",
            args.genes.display()
        ))
        .into());
    }
    info!("Submitting {} gene(s) to {}", genes.len(), args.base_url);

    let client = enrichr::EnrichrClient::with_base_url(&args.base_url);
    match &args.library {
        Some(library) => {
            let scores = client.term_scores(&genes, &args.description, library)?;
            info!("Received {} enriched term(s) for {}.", scores.len(), library);
            println!("Term\tCombinedScore");
            for (term, score) in scores {
                println!("{}\t{:.4}", term, score);
            }
        }
        None => {
            let link = client.link(&genes, &args.description)?;
            println!("{}", link);
        }
    }
    Ok(())
}

mod cli {
    use clap::{Args, Parser, Subcommand};
    use std::path::PathBuf;

    use crate::enrichr::DEFAULT_BASE_URL;
    use crate::normalize::Standardize;

    #[derive(Parser, Debug)]
    #[command(author, version, about = "RNA-seq expression PCA toolkit.", long_about = None, propagate_version = true)]
    pub(crate) struct CliArgs {
        /// Log level (Error, Warn, Info, Debug, Trace).
        #[arg(long, default_value = "Info", global = true)]
        pub(crate) log_level: String,

        /// Maximum parallel jobs for batch external-tool invocations.
        #[arg(short = 'j', long, global = true)]
        pub(crate) jobs: Option<usize>,

        #[command(subcommand)]
        pub(crate) command: Command,
    }

    #[derive(Subcommand, Debug)]
    pub(crate) enum Command {
        /// Convert SRA archives to FASTQ and run quality control.
        Dump {
            /// Directory containing .sra files.
            #[arg(short = 's', long = "sra-dir", required = true)]
            sra_dir: PathBuf,

            /// Output directory for .fastq files.
            #[arg(short = 'o', long = "out-dir", default_value = "fastq")]
            out_dir: PathBuf,

            /// Output directory for QC reports.
            #[arg(long = "qc-dir", default_value = "fastqc_output")]
            qc_dir: PathBuf,
        },
        /// Run PCA over an expression matrix and emit tables + chart series.
        Pca(PcaArgs),
        /// Query the Enrichr service with a gene list.
        Enrich(EnrichArgs),
    }

    #[derive(Args, Debug)]
    pub(crate) struct PcaArgs {
        /// Expression matrix TSV (samples x features).
        #[arg(short = 'm', long, required = true)]
        pub(crate) matrix: PathBuf,

        /// Sample label TSV sharing the matrix's sample ids.
        #[arg(short = 'l', long)]
        pub(crate) labels: Option<PathBuf>,

        /// Prefix for output files.
        #[arg(short = 'o', long = "out", required = true)]
        pub(crate) output_prefix: String,

        /// Standardization applied before the decomposition.
        #[arg(long, value_enum, default_value = "per-feature")]
        pub(crate) standardize: Standardize,

        /// Apply log10(x + 1) before standardization.
        #[arg(long)]
        pub(crate) log_transform: bool,

        /// How many top-|weight| loadings to keep per component.
        #[arg(long, default_value_t = 10)]
        pub(crate) top_loadings: usize,

        /// Label column used to color the 3D projection (default: first column).
        #[arg(short = 'c', long)]
        pub(crate) color_by: Option<String>,
    }

    #[derive(Args, Debug)]
    pub(crate) struct EnrichArgs {
        /// File with one gene symbol per line.
        #[arg(short = 'g', long, required = true)]
        pub(crate) genes: PathBuf,

        /// Description attached to the submitted list.
        #[arg(short = 'd', long, default_value = "")]
        pub(crate) description: String,

        /// Gene-set library to fetch results for; without it only the
        /// enrichment page link is printed.
        #[arg(long)]
        pub(crate) library: Option<String>,

        #[arg(long, default_value = DEFAULT_BASE_URL)]
        pub(crate) base_url: String,
    }
}
