//! Command-line interface definitions and argument parsing

use crate::config::PipelineConfig;
use crate::error::{Result, SegmentError};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use std::path::PathBuf;

/// Customer segmentation CLI using K-Means clustering on RFM data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "data.csv")]
    pub input: PathBuf,

    /// Output path for the segmented table (CSV)
    #[arg(short, long, default_value = "customer_segments.csv")]
    pub output: PathBuf,

    /// Optional output path for the per-segment statistics (CSV)
    #[arg(long)]
    pub stats_output: Option<PathBuf>,

    /// JSON file with pipeline configuration; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long)]
    pub clusters: Option<usize>,

    /// Random seed for centroid initialisation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Segment labels in cluster id order, comma-separated
    /// Example: --labels "Bronze,Silver,Gold"
    #[arg(long)]
    pub labels: Option<String>,

    /// Maximum iterations for K-Means algorithm
    #[arg(long)]
    pub max_iters: Option<u64>,

    /// Tolerance for K-Means convergence
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Reference date for recency on transaction logs (RFC 3339 or YYYY-MM-DD).
    /// Defaults to now.
    #[arg(long)]
    pub reference_date: Option<String>,

    /// Prediction mode: provide R,F,M values as comma-separated string
    /// Example: --predict "30,10,500.0" for Recency=30, Frequency=10, Monetary=500.0
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Configuration file (or defaults) with command-line overrides applied
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(clusters) = self.clusters {
            config.n_clusters = clusters;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(max_iters) = self.max_iters {
            config.max_iters = max_iters;
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance = tolerance;
        }
        if let Some(labels) = &self.labels {
            config.segment_labels = labels
                .split(',')
                .map(|label| label.trim().to_string())
                .collect();
        }
        if let Some(raw) = &self.reference_date {
            config.reference_date = Some(parse_reference_date(raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse RFM values from the predict string
    /// Expected format: "recency,frequency,monetary"
    pub fn parse_rfm_values(&self) -> Result<Option<[f64; 3]>> {
        let Some(predict_str) = &self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').collect();
        if parts.len() != 3 {
            return Err(SegmentError::config(
                "predict values must be in format 'recency,frequency,monetary'",
            ));
        }

        let mut values = [0.0; 3];
        for (value, (part, name)) in values
            .iter_mut()
            .zip(parts.iter().zip(["recency", "frequency", "monetary"]))
        {
            *value = part
                .trim()
                .parse()
                .map_err(|_| SegmentError::config(format!("invalid {} value: {}", name, part)))?;
        }

        Ok(Some(values))
    }
}

fn parse_reference_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| SegmentError::config(format!("invalid reference date: {}", raw)))
}
