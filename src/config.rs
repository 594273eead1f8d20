//! Pipeline configuration and the versioned column synonym table

use crate::error::{Result, SegmentError};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Current revision of the built-in synonym table.
pub const SYNONYM_TABLE_VERSION: u32 = 1;

pub const DEFAULT_CLUSTERS: usize = 4;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_MAX_ITERS: u64 = 300;
pub const DEFAULT_TOLERANCE: f64 = 1e-4;
pub const DEFAULT_RUNS: usize = 10;

pub const DEFAULT_SEGMENT_LABELS: [&str; DEFAULT_CLUSTERS] =
    ["Low-Value", "Medium-Value", "High-Value", "Premium"];

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Candidate column names for every semantic role, matched case-insensitively.
///
/// The first three lists cover pre-aggregated RFM tables; the rest describe a
/// raw transaction log that has to be grouped per customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SynonymTable {
    pub version: u32,
    pub recency: Vec<String>,
    pub frequency: Vec<String>,
    pub monetary: Vec<String>,
    pub customer_id: Vec<String>,
    pub transaction_id: Vec<String>,
    pub amount: Vec<String>,
    pub quantity: Vec<String>,
    pub unit_price: Vec<String>,
    pub timestamp: Vec<String>,
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self {
            version: SYNONYM_TABLE_VERSION,
            recency: strings(&["recency", "days_since_last", "recency_days", "r_score"]),
            frequency: strings(&["frequency", "purchase_count", "orders", "f_score"]),
            monetary: strings(&["monetary", "total_spend", "revenue", "m_score", "amount"]),
            customer_id: strings(&["customer_id", "customerid", "customer", "client_id", "user_id"]),
            transaction_id: strings(&[
                "transaction_id",
                "invoice_no",
                "invoiceno",
                "invoice",
                "order_id",
            ]),
            amount: strings(&[
                "transaction_amount",
                "amount",
                "total_amount",
                "totalamount",
                "sales",
                "line_total",
            ]),
            quantity: strings(&["quantity", "qty"]),
            unit_price: strings(&["unit_price", "unitprice", "price"]),
            timestamp: strings(&[
                "last_purchase_date",
                "invoice_date",
                "invoicedate",
                "transaction_date",
                "order_date",
                "purchase_date",
                "timestamp",
                "date",
            ]),
        }
    }
}

impl SynonymTable {
    pub fn validate(&self) -> Result<()> {
        for (role, candidates) in [
            ("recency", &self.recency),
            ("frequency", &self.frequency),
            ("monetary", &self.monetary),
        ] {
            if candidates.is_empty() {
                return Err(SegmentError::config(format!(
                    "synonym list for '{}' must not be empty",
                    role
                )));
            }
        }
        Ok(())
    }
}

/// Parameters of one pipeline run. Nothing here outlives the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Number of clusters (k)
    pub n_clusters: usize,
    /// Seed for the clustering RNG
    pub seed: u64,
    /// Iteration cap for a single K-Means run
    pub max_iters: u64,
    /// Convergence tolerance on centroid movement
    pub tolerance: f64,
    /// Number of seeded restarts; the lowest-inertia run is kept
    pub n_runs: usize,
    /// Ordered label vocabulary, one label per cluster id
    pub segment_labels: Vec<String>,
    pub synonyms: SynonymTable,
    /// Reference instant for recency on transaction logs; `None` means now
    pub reference_date: Option<DateTime<Utc>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            n_clusters: DEFAULT_CLUSTERS,
            seed: DEFAULT_SEED,
            max_iters: DEFAULT_MAX_ITERS,
            tolerance: DEFAULT_TOLERANCE,
            n_runs: DEFAULT_RUNS,
            segment_labels: strings(&DEFAULT_SEGMENT_LABELS),
            synonyms: SynonymTable::default(),
            reference_date: None,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON configuration file; absent keys keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        debug!("Loading pipeline configuration from {:?}", path.as_ref());
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_clusters == 0 {
            return Err(SegmentError::config("number of clusters must be at least 1"));
        }
        if self.segment_labels.len() != self.n_clusters {
            return Err(SegmentError::config(format!(
                "{} segment labels given for {} clusters",
                self.segment_labels.len(),
                self.n_clusters
            )));
        }
        let mut seen = HashSet::new();
        for label in &self.segment_labels {
            if label.trim().is_empty() {
                return Err(SegmentError::config("segment labels must not be blank"));
            }
            if !seen.insert(label.as_str()) {
                return Err(SegmentError::config(format!(
                    "duplicate segment label '{}'",
                    label
                )));
            }
        }
        if self.max_iters == 0 {
            return Err(SegmentError::config("max_iters must be at least 1"));
        }
        if self.n_runs == 0 {
            return Err(SegmentError::config("n_runs must be at least 1"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(SegmentError::config(format!(
                "tolerance must be a positive number, got {}",
                self.tolerance
            )));
        }
        self.synonyms.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.n_clusters, 4);
        assert_eq!(config.seed, 42);
        assert_eq!(
            config.segment_labels,
            vec!["Low-Value", "Medium-Value", "High-Value", "Premium"]
        );
        assert_eq!(config.synonyms.version, SYNONYM_TABLE_VERSION);
    }

    #[test]
    fn test_label_count_must_match_clusters() {
        let config = PipelineConfig {
            n_clusters: 3,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SegmentError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let config = PipelineConfig {
            n_clusters: 2,
            segment_labels: vec!["Gold".to_string(), "Gold".to_string()],
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_tolerance_rejected() {
        let config = PipelineConfig {
            tolerance: 0.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"n_clusters": 3, "seed": 7, "segment_labels": ["Bronze", "Silver", "Gold"]}}"#
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.n_clusters, 3);
        assert_eq!(config.seed, 7);
        assert_eq!(config.max_iters, DEFAULT_MAX_ITERS);
        assert_eq!(config.synonyms, SynonymTable::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"clusters": 4}}"#).unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(file.path()),
            Err(SegmentError::Json(_))
        ));
    }

    #[test]
    fn test_reference_date_parses_from_json() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"reference_date": "2011-12-09T00:00:00Z"}"#).unwrap();
        let expected = DateTime::parse_from_rfc3339("2011-12-09T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(config.reference_date, Some(expected));
    }
}
