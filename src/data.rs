//! Data loading and RFM feature construction using Polars

use crate::columns::{
    resolve_columns, resolve_transaction_columns, AmountSource, ColumnMapping, RfmRole,
    TransactionColumns, FREQUENCY, MONETARY, RECENCY,
};
use crate::config::SynonymTable;
use crate::error::{Result, SegmentError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::{debug, info};
use ndarray::Array2;
use polars::prelude::*;
use std::fmt;
use std::fs::File;
use std::path::Path;

// Scratch columns of the per-transaction frame before grouping
const DAYS_SINCE: &str = "_days_since";
const AMOUNT: &str = "_amount";
const TRANSACTION_ID: &str = "_transaction_id";

const DATETIME_FORMATS: [&str; 7] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Which of the two supported input layouts a table was read as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    /// One row per customer with recency, frequency and monetary columns
    Aggregated,
    /// One row per transaction, grouped by customer to derive RFM
    TransactionLog,
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputShape::Aggregated => f.write_str("pre-aggregated RFM table"),
            InputShape::TransactionLog => f.write_str("transaction log"),
        }
    }
}

/// RFM features together with the table they were derived from
#[derive(Debug, Clone)]
pub struct RfmData {
    /// Base table the `cluster` and `segment` columns get appended to.
    /// Carries the canonical `recency`, `frequency` and `monetary` columns.
    pub table: DataFrame,
    /// Raw RFM values before normalization (n_customers, 3)
    pub raw_features: Array2<f64>,
    pub shape: InputShape,
}

impl RfmData {
    pub fn n_customers(&self) -> usize {
        self.raw_features.nrows()
    }
}

/// Read a CSV file with a header row into a DataFrame
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let path = path.as_ref();
    debug!("Reading CSV from {:?}", path);
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    debug!("Read {} rows x {} columns", df.height(), df.width());
    Ok(df)
}

/// Write a DataFrame as CSV with a header row
pub fn write_csv<P: AsRef<Path>>(df: &mut DataFrame, path: P) -> Result<()> {
    let mut file = File::create(path.as_ref())?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    debug!("Wrote {} rows to {:?}", df.height(), path.as_ref());
    Ok(())
}

/// Build RFM features from either input layout.
///
/// Direct RFM columns take precedence. When they cannot all be found, the table
/// is treated as a transaction log if its customer, amount and timestamp
/// columns resolve; otherwise the RFM resolution error is returned.
///
/// # Arguments
/// * `df` - Input table
/// * `synonyms` - Candidate column names per role
/// * `reference` - Instant recency is measured from (transaction logs only)
pub fn build_features(
    df: &DataFrame,
    synonyms: &SynonymTable,
    reference: DateTime<Utc>,
) -> Result<RfmData> {
    let columns = df.get_column_names();

    match resolve_columns(&columns, synonyms) {
        Ok(mapping) => {
            info!(
                "RFM columns detected: recency='{}', frequency='{}', monetary='{}'",
                mapping.recency, mapping.frequency, mapping.monetary
            );
            from_rfm_columns(df, &mapping)
        }
        Err(unresolved) => match resolve_transaction_columns(&columns, synonyms) {
            Some(log) => {
                info!(
                    "No direct RFM columns; aggregating transactions per '{}'",
                    log.customer_id
                );
                from_transactions(df, &log, reference)
            }
            None => Err(unresolved),
        },
    }
}

fn from_rfm_columns(df: &DataFrame, mapping: &ColumnMapping) -> Result<RfmData> {
    let existing = df.get_column_names();
    let mut table = df.clone();
    let mut features = Vec::with_capacity(RfmRole::ALL.len());

    for role in RfmRole::ALL {
        let source = mapping.column(role);
        let canonical = role.canonical_name();
        let series = df.column(source)?;
        let values = numeric_values(series)?;

        if source != canonical {
            if existing.contains(&canonical) {
                return Err(SegmentError::feature(
                    canonical,
                    format!(
                        "column name is already taken, cannot rename resolved column '{}' to it",
                        source
                    ),
                ));
            }
            table.rename(source, canonical)?;
        }
        if !series.dtype().is_numeric() {
            table.replace(canonical, Series::new(canonical, values.clone()))?;
        }
        features.push(values);
    }

    let raw_features = to_matrix(&features[0], &features[1], &features[2])?;
    Ok(RfmData {
        table,
        raw_features,
        shape: InputShape::Aggregated,
    })
}

fn from_transactions(
    df: &DataFrame,
    log: &TransactionColumns,
    reference: DateTime<Utc>,
) -> Result<RfmData> {
    let customers = df.column(&log.customer_id)?;
    if let Some(row) = first_null(customers) {
        return Err(missing_value(&log.customer_id, row));
    }

    let days = days_since(df.column(&log.timestamp)?, reference)?;
    let amounts: Vec<f64> = match &log.amount {
        AmountSource::Column(name) => numeric_values(df.column(name)?)?,
        AmountSource::QuantityTimesPrice {
            quantity,
            unit_price,
        } => {
            let quantities = numeric_values(df.column(quantity)?)?;
            let prices = numeric_values(df.column(unit_price)?)?;
            quantities
                .iter()
                .zip(prices.iter())
                .map(|(q, p)| q * p)
                .collect()
        }
    };

    let mut columns = vec![
        customers.clone(),
        Series::new(DAYS_SINCE, days),
        Series::new(AMOUNT, amounts),
    ];
    let frequency = match &log.transaction_id {
        Some(name) => {
            let mut ids = df.column(name)?.clone();
            if let Some(row) = first_null(&ids) {
                return Err(missing_value(name, row));
            }
            ids.rename(TRANSACTION_ID);
            columns.push(ids);
            col(TRANSACTION_ID).n_unique()
        }
        None => col(AMOUNT).count(),
    };

    let table = DataFrame::new(columns)?
        .lazy()
        .group_by_stable([col(&log.customer_id)])
        .agg([
            // Recency: days since the most recent purchase
            col(DAYS_SINCE).min().alias(RECENCY),
            // Frequency: number of distinct transactions
            frequency.cast(DataType::Int64).alias(FREQUENCY),
            // Monetary: total spending
            col(AMOUNT).sum().alias(MONETARY),
        ])
        .collect()?;

    debug!(
        "Aggregated {} transactions into {} customers",
        df.height(),
        table.height()
    );

    let recency = column_values(&table, RECENCY)?;
    let frequency = column_values(&table, FREQUENCY)?;
    let monetary = column_values(&table, MONETARY)?;
    let raw_features = to_matrix(&recency, &frequency, &monetary)?;

    Ok(RfmData {
        table,
        raw_features,
        shape: InputShape::TransactionLog,
    })
}

/// Values of a resolved column as `f64`, parsing text columns.
fn numeric_values(series: &Series) -> Result<Vec<f64>> {
    let column = series.name();
    let values: Vec<f64> = match series.dtype() {
        DataType::String => {
            let parsed = series
                .str()?
                .into_iter()
                .enumerate()
                .map(|(row, value)| {
                    let raw = value.ok_or_else(|| missing_value(column, row))?;
                    raw.trim().parse::<f64>().map_err(|_| {
                        SegmentError::feature(
                            column,
                            format!("value '{}' at row {} is not a number", raw, row),
                        )
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            parsed
        }
        dtype if dtype.is_numeric() => {
            let cast = series.cast(&DataType::Float64)?;
            let converted = cast
                .f64()?
                .into_iter()
                .enumerate()
                .map(|(row, value)| value.ok_or_else(|| missing_value(column, row)))
                .collect::<Result<Vec<f64>>>()?;
            converted
        }
        dtype => {
            return Err(SegmentError::feature(
                column,
                format!("expected a numeric column, found {}", dtype),
            ))
        }
    };

    if let Some(row) = values.iter().position(|v| !v.is_finite()) {
        return Err(SegmentError::feature(
            column,
            format!("value at row {} is not a finite number", row),
        ));
    }
    Ok(values)
}

/// Whole days between each timestamp and the reference instant
fn days_since(series: &Series, reference: DateTime<Utc>) -> Result<Vec<i64>> {
    let column = series.name();
    let text = match series.dtype() {
        DataType::String => series.clone(),
        _ => series.cast(&DataType::String)?,
    };

    let days = text
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            let raw = value.ok_or_else(|| missing_value(column, row))?;
            let timestamp = parse_timestamp(raw).ok_or_else(|| {
                SegmentError::feature(
                    column,
                    format!("value '{}' at row {} is not a recognised date", raw, row),
                )
            })?;
            if timestamp > reference {
                return Err(SegmentError::feature(
                    column,
                    format!(
                        "value '{}' at row {} is later than the reference date {}",
                        raw,
                        row,
                        reference.to_rfc3339()
                    ),
                ));
            }
            Ok((reference - timestamp).num_days())
        })
        .collect::<Result<Vec<i64>>>()?;
    Ok(days)
}

/// Parse a timestamp in one of the accepted layouts; naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Utc));
    }
    if let Some(naive) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(naive.and_utc());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn first_null(series: &Series) -> Option<usize> {
    if series.null_count() == 0 {
        return None;
    }
    series.is_null().into_iter().position(|is_null| is_null == Some(true))
}

fn missing_value(column: &str, row: usize) -> SegmentError {
    SegmentError::feature(column, format!("missing value at row {}", row))
}

fn column_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let values = df
        .column(name)?
        .cast(&DataType::Float64)?
        .f64()?
        .into_no_null_iter()
        .collect();
    Ok(values)
}

/// Interleave the three feature columns into an (n, 3) matrix
fn to_matrix(recency: &[f64], frequency: &[f64], monetary: &[f64]) -> Result<Array2<f64>> {
    let n_samples = recency.len();
    let mut raw_data = Vec::with_capacity(n_samples * 3);
    for i in 0..n_samples {
        raw_data.extend_from_slice(&[recency[i], frequency[i], monetary[i]]);
    }
    Ok(Array2::from_shape_vec((n_samples, 3), raw_data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn reference() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2011-12-09T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn transactions() -> DataFrame {
        DataFrame::new(vec![
            Series::new("customer_id", &[1i64, 2, 1, 1]),
            Series::new("transaction_id", &[100i64, 200, 101, 101]),
            Series::new("transaction_amount", &[10.0, 100.0, 5.5, 4.5]),
            Series::new(
                "last_purchase_date",
                &["2011-12-01", "2011-11-09", "2011-12-08 12:00:00", "2011-12-08T12:00:00"],
            ),
        ])
        .unwrap()
    }

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "customer_id,Recency,Orders,Revenue,country").unwrap();
        writeln!(file, "CUST_0001,10,3,120.5,US").unwrap();
        writeln!(file, "CUST_0002,200,1,15.0,UK").unwrap();
        writeln!(file, "CUST_0003,35,8,980.25,DE").unwrap();
        file
    }

    #[test]
    fn test_aggregated_table_from_csv() {
        let file = create_test_csv();
        let df = load_csv(file.path()).unwrap();
        let rfm = build_features(&df, &SynonymTable::default(), reference()).unwrap();

        assert_eq!(rfm.shape, InputShape::Aggregated);
        assert_eq!(rfm.raw_features.shape(), &[3, 3]);
        assert_eq!(rfm.raw_features.row(2).to_vec(), vec![35.0, 8.0, 980.25]);
        assert_eq!(
            rfm.table.get_column_names(),
            vec!["customer_id", "recency", "frequency", "monetary", "country"]
        );
    }

    #[test]
    fn test_string_numbers_are_parsed() {
        let df = DataFrame::new(vec![
            Series::new("recency", &["1", " 2 ", "3"]),
            Series::new("frequency", &[1i64, 2, 3]),
            Series::new("monetary", &[1.5, 2.5, 3.5]),
        ])
        .unwrap();

        let rfm = build_features(&df, &SynonymTable::default(), reference()).unwrap();
        assert_eq!(rfm.raw_features.column(0).to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(rfm.table.column("recency").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn test_unparseable_value_names_column() {
        let df = DataFrame::new(vec![
            Series::new("recency", &[1i64, 2]),
            Series::new("frequency", &[1i64, 2]),
            Series::new("total_spend", &["12.0", "lots"]),
        ])
        .unwrap();

        match build_features(&df, &SynonymTable::default(), reference()) {
            Err(SegmentError::FeatureConstruction { column, reason }) => {
                assert_eq!(column, "total_spend");
                assert!(reason.contains("'lots'"));
                assert!(reason.contains("row 1"));
            }
            other => panic!("expected FeatureConstruction, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_dtype_rejected() {
        let df = DataFrame::new(vec![
            Series::new("recency", &[true, false]),
            Series::new("frequency", &[1i64, 2]),
            Series::new("monetary", &[1.0, 2.0]),
        ])
        .unwrap();

        let err = build_features(&df, &SynonymTable::default(), reference()).unwrap_err();
        assert!(matches!(
            err,
            SegmentError::FeatureConstruction { ref column, .. } if column == "recency"
        ));
    }

    #[test]
    fn test_missing_value_rejected() {
        let df = DataFrame::new(vec![
            Series::new("recency", &[Some(1i64), None]),
            Series::new("frequency", &[1i64, 2]),
            Series::new("monetary", &[1.0, 2.0]),
        ])
        .unwrap();

        let err = build_features(&df, &SynonymTable::default(), reference()).unwrap_err();
        assert!(err.to_string().contains("missing value at row 1"));
    }

    #[test]
    fn test_canonical_name_clash_rejected() {
        let df = DataFrame::new(vec![
            Series::new("r_score", &[1i64, 2]),
            Series::new("recency", &["old", "new"]),
            Series::new("orders", &[1i64, 2]),
            Series::new("revenue", &[1.0, 2.0]),
        ])
        .unwrap();

        let err = build_features(&df, &SynonymTable::default(), reference()).unwrap_err();
        assert!(matches!(
            err,
            SegmentError::FeatureConstruction { ref column, .. } if column == "recency"
        ));
    }

    #[test]
    fn test_transaction_log_aggregation() {
        let rfm = build_features(&transactions(), &SynonymTable::default(), reference()).unwrap();

        assert_eq!(rfm.shape, InputShape::TransactionLog);
        assert_eq!(rfm.n_customers(), 2);
        assert_eq!(
            rfm.table.get_column_names(),
            vec!["customer_id", "recency", "frequency", "monetary"]
        );

        let ids: Vec<i64> = rfm
            .table
            .column("customer_id")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(ids, vec![1, 2]);

        assert_eq!(rfm.raw_features.row(0).to_vec(), vec![0.0, 2.0, 20.0]);
        assert_eq!(rfm.raw_features.row(1).to_vec(), vec![30.0, 1.0, 100.0]);
    }

    #[test]
    fn test_transaction_log_with_plain_amount_column() {
        let df = DataFrame::new(vec![
            Series::new("customer_id", &["a", "b", "a", "c", "b"]),
            Series::new("transaction_id", &["t1", "t2", "t3", "t4", "t5"]),
            Series::new("amount", &[12.5, 40.0, 7.5, 3.0, 10.0]),
            Series::new(
                "date",
                &["2011-12-01", "2011-11-29", "2011-12-07", "2011-10-10", "2011-12-08"],
            ),
        ])
        .unwrap();

        let rfm = build_features(&df, &SynonymTable::default(), reference()).unwrap();
        assert_eq!(rfm.shape, InputShape::TransactionLog);
        assert_eq!(rfm.raw_features.row(0).to_vec(), vec![2.0, 2.0, 20.0]);
        assert_eq!(rfm.raw_features.row(1).to_vec(), vec![1.0, 2.0, 50.0]);
        assert_eq!(rfm.raw_features.row(2).to_vec(), vec![60.0, 1.0, 3.0]);
    }

    #[test]
    fn test_transaction_log_without_ids_counts_rows() {
        let df = transactions().drop("transaction_id").unwrap();
        let rfm = build_features(&df, &SynonymTable::default(), reference()).unwrap();
        assert_eq!(rfm.raw_features.column(1).to_vec(), vec![3.0, 1.0]);
    }

    #[test]
    fn test_transaction_log_quantity_times_price() {
        let df = DataFrame::new(vec![
            Series::new("InvoiceNo", &["536365", "536365", "536367"]),
            Series::new("Quantity", &[6i64, 2, 8]),
            Series::new(
                "InvoiceDate",
                &["12/1/2010 8:26", "12/1/2010 8:26", "12/1/2010 8:34"],
            ),
            Series::new("UnitPrice", &[2.5, 3.0, 2.75]),
            Series::new("CustomerID", &[17850i64, 17850, 13047]),
        ])
        .unwrap();

        let rfm = build_features(&df, &SynonymTable::default(), reference()).unwrap();
        assert_eq!(rfm.raw_features.row(0).to_vec(), vec![372.0, 1.0, 21.0]);
        assert_eq!(rfm.raw_features.row(1).to_vec(), vec![372.0, 1.0, 22.0]);
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let early = DateTime::parse_from_rfc3339("2011-12-05T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let err = build_features(&transactions(), &SynonymTable::default(), early).unwrap_err();
        assert!(matches!(
            err,
            SegmentError::FeatureConstruction { ref column, .. } if column == "last_purchase_date"
        ));
    }

    #[test]
    fn test_unparseable_date_rejected() {
        let mut df = transactions();
        df.replace(
            "last_purchase_date",
            Series::new("last_purchase_date", &["2011-12-01", "yesterday", "2011-12-02", "2011-12-03"]),
        )
        .unwrap();

        let err = build_features(&df, &SynonymTable::default(), reference()).unwrap_err();
        assert!(err.to_string().contains("'yesterday'"));
    }

    #[test]
    fn test_unresolvable_table_reports_rfm_roles() {
        let df = DataFrame::new(vec![
            Series::new("customer_id", &[1i64]),
            Series::new("country", &["US"]),
        ])
        .unwrap();

        assert!(matches!(
            build_features(&df, &SynonymTable::default(), reference()),
            Err(SegmentError::UnresolvedColumns { .. })
        ));
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        let expected = NaiveDate::from_ymd_opt(2010, 12, 1)
            .unwrap()
            .and_hms_opt(8, 26, 0)
            .unwrap()
            .and_utc();

        for raw in [
            "2010-12-01T08:26:00Z",
            "2010-12-01T08:26:00",
            "2010-12-01 08:26:00",
            "2010-12-01 08:26",
            "12/1/2010 8:26",
        ] {
            assert_eq!(parse_timestamp(raw), Some(expected), "layout {}", raw);
        }
        assert!(parse_timestamp("2010-12-01").is_some());
        assert!(parse_timestamp("01.12.2010").is_some());
        assert!(parse_timestamp("not a date").is_none());
    }

    #[test]
    fn test_write_csv_round_trip() {
        let mut df = DataFrame::new(vec![
            Series::new("segment", &["Premium", "Low-Value"]),
            Series::new("cluster", &[3i64, 0]),
        ])
        .unwrap();
        let file = NamedTempFile::new().unwrap();

        write_csv(&mut df, file.path()).unwrap();
        let read_back = load_csv(file.path()).unwrap();
        assert_eq!(read_back.shape(), (2, 2));
        assert_eq!(read_back.get_column_names(), vec!["segment", "cluster"]);
    }
}
