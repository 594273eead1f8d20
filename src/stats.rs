//! Per-segment descriptive statistics over the RFM features

use crate::columns::RfmRole;
use crate::error::{Result, SegmentError};
use crate::pipeline::{CLUSTER, SEGMENT};
use log::debug;
use polars::prelude::*;

/// Mean and median of recency, frequency and monetary per segment.
///
/// Expects a segmented table carrying the canonical feature columns plus
/// `cluster` and `segment`. The result has one row per non-empty segment,
/// ordered by cluster id, with the columns `segment`, `recency_mean`,
/// `recency_median`, `frequency_mean`, `frequency_median`, `monetary_mean`
/// and `monetary_median`.
pub fn segment_statistics(table: &DataFrame) -> Result<DataFrame> {
    let present = table.get_column_names();
    let required = RfmRole::ALL
        .iter()
        .map(|role| role.canonical_name())
        .chain([CLUSTER, SEGMENT]);
    for name in required {
        if !present.contains(&name) {
            return Err(SegmentError::feature(
                name,
                "column is missing from the segmented table",
            ));
        }
    }

    let mut aggregations = Vec::with_capacity(RfmRole::ALL.len() * 2);
    for role in RfmRole::ALL {
        let name = role.canonical_name();
        let values = col(name).cast(DataType::Float64);
        aggregations.push(values.clone().mean().alias(&format!("{}_mean", name)));
        aggregations.push(values.median().alias(&format!("{}_median", name)));
    }

    // Segment names follow cluster ids one to one, so grouping on both keeps
    // the segment grouping and lets the output follow vocabulary order.
    let stats = table
        .clone()
        .lazy()
        .group_by([col(CLUSTER), col(SEGMENT)])
        .agg(aggregations)
        .sort([CLUSTER], SortMultipleOptions::default())
        .drop([CLUSTER])
        .collect()?;

    debug!("Computed statistics for {} segments", stats.height());
    Ok(stats)
}
