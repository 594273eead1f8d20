//! rfmseg: customer segmentation CLI using K-Means clustering on RFM features
//!
//! This is the main entrypoint that orchestrates data loading, segmentation,
//! export, reporting and prediction.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use rfmseg::{data, report, segment_customers, Args, Segmentation};
use std::io::Write;
use std::time::Instant;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    if args.verbose {
        println!("rfmseg - Customer Segmentation using K-Means");
        println!("============================================\n");
    }

    // Check if in prediction mode
    if let Some(rfm_values) = args.parse_rfm_values()? {
        run_prediction_mode(&args, rfm_values)?;
    } else {
        run_full_pipeline(&args)?;
    }

    Ok(())
}

/// `RUST_LOG` wins over the verbosity flag when set
fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .parse_default_env()
        .init();
}

fn load_and_segment(args: &Args) -> Result<Segmentation> {
    let config = args.pipeline_config()?;
    let df = data::load_csv(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    info!("Loaded {} rows from {}", df.height(), args.input.display());

    let segmentation = segment_customers(&df, &config)
        .with_context(|| format!("error processing {}", args.input.display()))?;
    Ok(segmentation)
}

/// Run prediction mode for a single customer
fn run_prediction_mode(args: &Args, rfm_values: [f64; 3]) -> Result<()> {
    println!("=== Prediction Mode ===");
    println!(
        "Input RFM values: R={}, F={}, M={}",
        rfm_values[0], rfm_values[1], rfm_values[2]
    );

    let start_time = Instant::now();
    let segmentation = load_and_segment(args)?;
    let (cluster, segment) = segmentation.predict(&rfm_values)?;
    let elapsed = start_time.elapsed();

    println!("\n✓ Predicted Segment: {} (cluster {})", segment, cluster);
    println!("  Processing time: {:.2}s", elapsed.as_secs_f64());

    // Show cluster context
    let model = &segmentation.model;
    let cluster_sizes = model.cluster_sizes();
    let total_customers = segmentation.n_customers();
    let cluster_percentage = (cluster_sizes[cluster] as f64 / total_customers as f64) * 100.0;

    println!("\nCluster {} details:", cluster);
    println!(
        "  Size: {} customers ({:.1}% of total)",
        cluster_sizes[cluster], cluster_percentage
    );
    println!(
        "  Centroid (normalized): R={:.2}, F={:.2}, M={:.2}",
        model.centroids[[cluster, 0]],
        model.centroids[[cluster, 1]],
        model.centroids[[cluster, 2]]
    );

    Ok(())
}

/// Run full segmentation pipeline and export the results
fn run_full_pipeline(args: &Args) -> Result<()> {
    println!("=== Full Segmentation Pipeline ===\n");

    let start_time = Instant::now();
    let mut segmentation = load_and_segment(args)?;

    println!(
        "✓ Segmented {} customers ({})",
        segmentation.n_customers(),
        segmentation.shape
    );
    if args.verbose {
        println!("  Processing time: {:.2}s", start_time.elapsed().as_secs_f64());
        println!("  Inertia: {:.2}", segmentation.model.inertia);
    }

    data::write_csv(&mut segmentation.table, &args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    if let Some(stats_path) = &args.stats_output {
        data::write_csv(&mut segmentation.statistics, stats_path)
            .with_context(|| format!("failed to write {}", stats_path.display()))?;
    }

    report::print_segmentation_report(&segmentation);

    let total_time = start_time.elapsed();
    println!("=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", total_time.as_secs_f64());
    println!("Segmented data saved to: {}", args.output.display());
    if let Some(stats_path) = &args.stats_output {
        println!("Segment statistics saved to: {}", stats_path.display());
    }

    Ok(())
}
