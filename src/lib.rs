//! rfmseg: customer segmentation from RFM features using K-Means clustering
//!
//! The pipeline detects recency, frequency and monetary columns (or derives
//! them from a raw transaction log), standardizes them, clusters customers with
//! seeded K-Means, names each cluster from a fixed label vocabulary and
//! reports mean and median RFM values per segment.

pub mod cli;
pub mod columns;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod scaler;
pub mod segment;
pub mod stats;

// Re-export public items for easier access
pub use cli::Args;
pub use columns::{detect_columns, resolve_columns, ColumnMapping, RfmRole};
pub use config::{PipelineConfig, SynonymTable};
pub use data::{build_features, InputShape, RfmData};
pub use error::{Result, SegmentError};
pub use model::{fit_kmeans, KMeansModel, KMeansParams};
pub use pipeline::{segment_customers, Segmentation, CLUSTER, SEGMENT};
pub use scaler::StandardScaler;
pub use segment::SegmentLabeler;
pub use stats::segment_statistics;
