//! End-to-end segmentation: resolve, build, scale, cluster, label, aggregate

use crate::config::PipelineConfig;
use crate::data::{build_features, InputShape, RfmData};
use crate::error::{Result, SegmentError};
use crate::model::{fit_kmeans, KMeansModel, KMeansParams};
use crate::scaler::StandardScaler;
use crate::segment::SegmentLabeler;
use crate::stats::segment_statistics;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use polars::prelude::*;

pub const CLUSTER: &str = "cluster";
pub const SEGMENT: &str = "segment";

/// Everything one pipeline run produces. Owned by the caller; nothing is kept.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Input rows (or aggregated customers) with `cluster` and `segment` appended
    pub table: DataFrame,
    /// Mean and median of each RFM feature per segment
    pub statistics: DataFrame,
    /// Raw RFM values, row-aligned with `table`
    pub raw_features: ndarray::Array2<f64>,
    pub scaler: StandardScaler,
    pub model: KMeansModel,
    pub labeler: SegmentLabeler,
    pub shape: InputShape,
    /// Instant recency was measured from for transaction logs
    pub reference: DateTime<Utc>,
}

impl Segmentation {
    pub fn n_customers(&self) -> usize {
        self.table.height()
    }

    /// Assign raw `[recency, frequency, monetary]` values to a fitted segment
    pub fn predict(&self, rfm: &[f64; 3]) -> Result<(usize, &str)> {
        let scaled = self.scaler.transform_row(rfm)?;
        let cluster = self.model.predict(&scaled.view())?;
        Ok((cluster, self.labeler.label(cluster)?))
    }
}

/// Segment the customers of one dataset.
///
/// Every stage either succeeds or the whole run fails; there is no partial
/// result.
pub fn segment_customers(df: &DataFrame, config: &PipelineConfig) -> Result<Segmentation> {
    config.validate()?;
    let labeler = SegmentLabeler::new(config.segment_labels.iter().cloned())?;
    let reference = config.reference_date.unwrap_or_else(Utc::now);

    info!(
        "Segmenting {} rows into {} clusters (seed {})",
        df.height(),
        config.n_clusters,
        config.seed
    );

    let RfmData {
        table,
        raw_features,
        shape,
    } = build_features(df, &config.synonyms, reference)?;
    debug!("Built {} feature rows from {}", raw_features.nrows(), shape);

    if raw_features.nrows() < config.n_clusters {
        return Err(SegmentError::InsufficientData {
            rows: raw_features.nrows(),
            required: config.n_clusters,
        });
    }

    let (scaler, scaled) = StandardScaler::fit_transform(&raw_features)?;

    let params = KMeansParams {
        n_clusters: config.n_clusters,
        seed: config.seed,
        max_iters: config.max_iters,
        tolerance: config.tolerance,
        n_runs: config.n_runs,
    };
    let model = fit_kmeans(&scaled, &params)?;

    let table = append_segments(table, &model, &labeler)?;
    let statistics = segment_statistics(&table)?;
    info!(
        "Segmentation complete: {} customers, {} segments populated",
        table.height(),
        statistics.height()
    );

    Ok(Segmentation {
        table,
        statistics,
        raw_features,
        scaler,
        model,
        labeler,
        shape,
        reference,
    })
}

/// Append `cluster` and `segment` as the last two columns
fn append_segments(
    mut table: DataFrame,
    model: &KMeansModel,
    labeler: &SegmentLabeler,
) -> Result<DataFrame> {
    for name in [CLUSTER, SEGMENT] {
        if table.get_column_names().contains(&name) {
            warn!("Input already has a '{}' column; replacing it", name);
            table = table.drop(name)?;
        }
    }

    let clusters: Vec<i64> = model.labels.iter().map(|&cluster| cluster as i64).collect();
    let segments = labeler.label_all(&model.labels)?;

    table.with_column(Series::new(CLUSTER, clusters))?;
    table.with_column(Series::new(SEGMENT, segments))?;
    Ok(table)
}
