//! Console reporting of a finished segmentation

use crate::pipeline::Segmentation;
use std::fmt;

/// Segment sizes, centroids and per-segment statistics of one run
pub struct SegmentationReport<'a>(pub &'a Segmentation);

impl fmt::Display for SegmentationReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segmentation = self.0;
        let model = &segmentation.model;
        let total = segmentation.n_customers().max(1);

        writeln!(f, "=== Segment Statistics ===")?;
        writeln!(f, "Input layout: {}", segmentation.shape)?;
        writeln!(f, "Number of clusters: {}", model.n_clusters)?;
        writeln!(f, "Total customers: {}", segmentation.n_customers())?;
        writeln!(
            f,
            "Within-cluster sum of squares (Inertia): {:.2}",
            model.inertia
        )?;

        writeln!(f, "\nSegment sizes:")?;
        for (cluster, &size) in model.cluster_sizes().iter().enumerate() {
            let label = segmentation.labeler.label(cluster).unwrap_or("?");
            let percentage = (size as f64 / total as f64) * 100.0;
            writeln!(
                f,
                "  Cluster {} ({}): {} customers ({:.1}%)",
                cluster, label, size, percentage
            )?;
        }

        writeln!(f, "\nCluster centroids (normalized):")?;
        writeln!(f, "  Cluster | Recency | Frequency | Monetary")?;
        writeln!(f, "  --------|---------|-----------|----------")?;
        for (i, centroid_row) in model.centroids.outer_iter().enumerate() {
            writeln!(
                f,
                "  {:7} | {:7.2} | {:9.2} | {:8.2}",
                i, centroid_row[0], centroid_row[1], centroid_row[2]
            )?;
        }

        writeln!(f, "\nPer-segment RFM statistics:")?;
        writeln!(f, "{}", segmentation.statistics)
    }
}

pub fn format_segmentation_report(segmentation: &Segmentation) -> String {
    SegmentationReport(segmentation).to_string()
}

pub fn print_segmentation_report(segmentation: &Segmentation) {
    println!("\n{}", SegmentationReport(segmentation));
}
