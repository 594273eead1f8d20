//! Positional mapping from cluster ids to business segment names

use crate::error::{Result, SegmentError};
use ndarray::Array1;
use std::collections::HashSet;

/// Maps cluster id `i` to the `i`-th label of an ordered vocabulary.
///
/// The mapping never looks at centroids: cluster 0 always receives the first
/// label whether or not its customers are the least valuable ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentLabeler {
    labels: Vec<String>,
}

impl SegmentLabeler {
    pub fn new<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Result<Self> {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(SegmentError::config("segment label vocabulary is empty"));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = labels.iter().find(|label| !seen.insert(label.as_str())) {
            return Err(SegmentError::config(format!(
                "duplicate segment label '{}'",
                duplicate
            )));
        }
        Ok(Self { labels })
    }

    pub fn n_segments(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, cluster: usize) -> Result<&str> {
        self.labels
            .get(cluster)
            .map(String::as_str)
            .ok_or(SegmentError::UnknownCluster {
                cluster,
                n_clusters: self.labels.len(),
            })
    }

    /// Label every row of a cluster assignment, in row order
    pub fn label_all(&self, clusters: &Array1<usize>) -> Result<Vec<&str>> {
        clusters.iter().map(|&cluster| self.label(cluster)).collect()
    }
}
