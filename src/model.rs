//! K-Means clustering model implementation

use crate::error::{Result, SegmentError};
use linfa::prelude::*;
use linfa_clustering::{KMeans, KMeansError};
use linfa_nn::distance::L2Dist;
use log::debug;
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Knobs of one K-Means fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansParams {
    pub n_clusters: usize,
    pub seed: u64,
    pub max_iters: u64,
    pub tolerance: f64,
    pub n_runs: usize,
}

/// Fitted cluster centres and the assignment of the training rows
#[derive(Debug, Clone)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignments for training data
    pub labels: Array1<usize>,
    /// Cluster centroids in normalized space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
}

impl KMeansModel {
    /// Predict cluster for a point in normalized space
    pub fn predict(&self, features: &ArrayView1<f64>) -> Result<usize> {
        if features.len() != self.centroids.ncols() {
            return Err(SegmentError::feature(
                "features",
                format!(
                    "feature vector must have exactly {} dimensions",
                    self.centroids.ncols()
                ),
            ));
        }

        // Find nearest centroid
        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;

        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = squared_distance(features, &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }

        Ok(closest_cluster)
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }
}

/// Fit K-Means on standardized features.
///
/// linfa runs `n_runs` k-means++ restarts bounded by `max_iters` and
/// `tolerance`, keeping the restart with the lowest inertia. Reaching the cap
/// is not an error. linfa's update folds the previous centroid into each
/// cluster, so the winning centroids are then refined with plain Lloyd
/// updates until every centroid is the mean of its members. All randomness
/// derives from `params.seed`, so identical input always yields identical
/// labels.
///
/// # Arguments
/// * `features` - Standardized feature matrix (n_customers, n_features)
/// * `params` - Cluster count, seed and convergence bounds
///
/// # Returns
/// * Fitted `KMeansModel` with training assignments and inertia
pub fn fit_kmeans(features: &Array2<f64>, params: &KMeansParams) -> Result<KMeansModel> {
    if params.n_clusters == 0 {
        return Err(SegmentError::config("number of clusters must be at least 1"));
    }

    if features.nrows() < params.n_clusters {
        return Err(SegmentError::InsufficientData {
            rows: features.nrows(),
            required: params.n_clusters,
        });
    }

    // Dummy targets for unsupervised learning
    let targets: Array1<usize> = Array1::zeros(features.nrows());
    let dataset = Dataset::new(features.clone(), targets);

    let rng = StdRng::seed_from_u64(params.seed);
    let fitted = KMeans::params_with(params.n_clusters, rng, L2Dist)
        .n_runs(params.n_runs.max(1))
        .max_n_iterations(params.max_iters)
        .tolerance(params.tolerance)
        .fit(&dataset)
        .map_err(|e: KMeansError| SegmentError::Clustering(e.to_string()))?;

    let (centroids, labels, iterations) =
        refine_to_member_means(features, fitted.centroids().clone(), params.max_iters);
    let inertia = compute_inertia(features, &labels, &centroids);
    debug!(
        "K-Means fitted: k={}, seed={}, inertia={:.4}, {} refinement updates",
        params.n_clusters, params.seed, inertia, iterations
    );

    Ok(KMeansModel {
        n_clusters: params.n_clusters,
        labels,
        centroids,
        inertia,
    })
}

/// Lloyd updates from `centroids` until the assignment is stable or
/// `max_iters` updates were made. The returned centroids are always the
/// means of the returned assignment.
fn refine_to_member_means(
    features: &Array2<f64>,
    mut centroids: Array2<f64>,
    max_iters: u64,
) -> (Array2<f64>, Array1<usize>, u64) {
    let mut labels = assign_clusters(features, &centroids);
    let mut iterations = 0;

    while iterations < max_iters {
        centroids = member_means(features, &labels, &centroids);
        iterations += 1;

        let next = assign_clusters(features, &centroids);
        if next == labels {
            return (centroids, labels, iterations);
        }
        labels = next;
    }

    let centroids = member_means(features, &labels, &centroids);
    (centroids, labels, iterations)
}

/// Mean of each cluster's members; an empty cluster keeps its old centroid
fn member_means(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    previous: &Array2<f64>,
) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(previous.raw_dim());
    let mut counts = vec![0usize; previous.nrows()];

    for (point, &cluster) in features.outer_iter().zip(labels.iter()) {
        let mut sum = sums.row_mut(cluster);
        sum += &point;
        counts[cluster] += 1;
    }

    for (cluster, &count) in counts.iter().enumerate() {
        if count == 0 {
            sums.row_mut(cluster).assign(&previous.row(cluster));
        } else {
            sums.row_mut(cluster).mapv_inplace(|total| total / count as f64);
        }
    }
    sums
}

/// Nearest-centroid assignment; ties go to the lower cluster id
fn assign_clusters(features: &Array2<f64>, centroids: &Array2<f64>) -> Array1<usize> {
    features
        .outer_iter()
        .map(|point| {
            let mut best = (0, f64::INFINITY);
            for (cluster_idx, centroid) in centroids.outer_iter().enumerate() {
                let distance = squared_distance(&point, &centroid);
                if distance < best.1 {
                    best = (cluster_idx, distance);
                }
            }
            best.0
        })
        .collect()
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;

    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            inertia += squared_distance(&features.row(i), &centroids.row(cluster));
        }
    }

    inertia
}

fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
