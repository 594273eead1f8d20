//! Error taxonomy for the segmentation pipeline

use crate::columns::RfmRole;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Every failure is terminal for the dataset being processed.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error(
        "could not detect required RFM columns (missing: {}); found columns: {available:?}",
        format_roles(.missing)
    )]
    UnresolvedColumns {
        available: Vec<String>,
        missing: Vec<RfmRole>,
    },

    #[error("cannot build feature from column '{column}': {reason}")]
    FeatureConstruction { column: String, reason: String },

    #[error("number of data points ({rows}) must be at least the number of clusters ({required})")]
    InsufficientData { rows: usize, required: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cluster id {cluster} is outside the label vocabulary of {n_clusters} segments")]
    UnknownCluster { cluster: usize, n_clusters: usize },

    #[error("clustering failed: {0}")]
    Clustering(String),

    #[error("data frame error: {0}")]
    Polars(#[from] PolarsError),

    #[error("matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SegmentError {
    pub fn feature<C: Into<String>, R: Into<String>>(column: C, reason: R) -> Self {
        SegmentError::FeatureConstruction {
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        SegmentError::InvalidConfig(msg.into())
    }
}

fn format_roles(roles: &[RfmRole]) -> String {
    roles
        .iter()
        .map(|role| role.canonical_name())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, SegmentError>;
