use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use field_eval::build_info;
use field_eval::compare::Tolerance;
use field_eval::evaluator::{evaluate_predictions, EvaluationOptions};
use field_eval::loader::{load_ground_truth, load_predictions};
use field_eval::metrics::EvaluationMetrics;
use field_eval::report::{
    console_summary, write_diffs, write_report, write_summary_json, RunSummary,
};
use field_eval::template;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    version,
    about = "Evaluate extracted document fields against a ground-truth spreadsheet."
)]
struct Args {
    #[arg(short, long, help = "Path to the ground-truth table (xlsx/xls/csv)")]
    ground_truth: Option<PathBuf>,

    #[arg(short, long, help = "Path to the predictions (json/jsonl/csv/xlsx/xls)")]
    predictions: Option<PathBuf>,

    #[arg(
        short,
        long,
        default_value = "Field",
        help = "Name of the document id column in both files"
    )]
    id_column: String,

    #[arg(
        short = 't',
        long,
        default_value_t = 1e-6,
        help = "Numeric tolerance used when both values parse as numbers"
    )]
    numeric_tolerance: f64,

    #[arg(long, help = "Scale the tolerance by the ground-truth magnitude")]
    relative_tolerance: bool,

    #[arg(
        short,
        long,
        default_value = "evaluation_report.csv",
        help = "Where to write the per-field report CSV"
    )]
    report: PathBuf,

    #[arg(
        short,
        long,
        default_value = "differences.csv",
        help = "Where to write per-document differences (with --verbose)"
    )]
    diffs: PathBuf,

    #[arg(short, long, help = "Write per-document diffs for suspicious comparisons")]
    verbose: bool,

    #[arg(long, help = "Also write a JSON run summary with input digests")]
    summary_json: Option<PathBuf>,

    #[arg(long, help = "Print build metadata and exit")]
    info: bool,

    #[arg(long, help = "Print an empty extraction record and exit")]
    template: bool,
}

impl Args {
    fn options(&self) -> EvaluationOptions {
        let tolerance = if self.relative_tolerance {
            Tolerance::relative(self.numeric_tolerance)
        } else {
            Tolerance::absolute(self.numeric_tolerance)
        };
        EvaluationOptions {
            tolerance,
            collect_diffs: self.verbose,
        }
    }
}

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "evaluation failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    if args.info {
        println!("{}", build_info::build_info_json());
        return Ok(());
    }

    if args.template {
        println!("{}", template::record_template());
        return Ok(());
    }

    let ground_truth_path = args
        .ground_truth
        .as_deref()
        .context("--ground-truth is required unless --info or --template is specified")?;
    let predictions_path = args
        .predictions
        .as_deref()
        .context("--predictions is required unless --info or --template is specified")?;

    let ground_truth = load_ground_truth(ground_truth_path, &args.id_column).with_context(|| {
        format!(
            "failed to load ground truth from {}",
            ground_truth_path.display()
        )
    })?;
    let predictions = load_predictions(predictions_path, &args.id_column).with_context(|| {
        format!(
            "failed to load predictions from {}",
            predictions_path.display()
        )
    })?;

    let options = args.options();
    let metrics = evaluate_predictions(&ground_truth, &predictions, &options);

    emit_outputs(&args, &metrics)?;

    if let Some(path) = &args.summary_json {
        let summary = RunSummary::new(ground_truth_path, predictions_path, &options, &metrics)
            .context("failed to hash input files")?;
        write_summary_json(path, &summary)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    for line in console_summary(&metrics) {
        println!("{line}");
    }
    Ok(())
}

fn emit_outputs(args: &Args, metrics: &EvaluationMetrics) -> Result<()> {
    write_report(&args.report, metrics)
        .with_context(|| format!("failed to write {}", args.report.display()))?;
    println!("Report written to: {}", args.report.display());

    if args.verbose {
        let written = write_diffs(&args.diffs, &metrics.diffs)
            .with_context(|| format!("failed to write {}", args.diffs.display()))?;
        if written {
            println!("Differences written to: {}", args.diffs.display());
        }
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
