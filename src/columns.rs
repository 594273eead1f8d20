//! Column auto-detection: maps arbitrary column names onto the RFM roles

use crate::config::SynonymTable;
use crate::error::{Result, SegmentError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const RECENCY: &str = "recency";
pub const FREQUENCY: &str = "frequency";
pub const MONETARY: &str = "monetary";

/// The three semantic roles of an RFM feature vector, in feature order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RfmRole {
    Recency,
    Frequency,
    Monetary,
}

impl RfmRole {
    pub const ALL: [RfmRole; 3] = [RfmRole::Recency, RfmRole::Frequency, RfmRole::Monetary];

    /// Column name used for the role in every table the pipeline produces
    pub fn canonical_name(self) -> &'static str {
        match self {
            RfmRole::Recency => RECENCY,
            RfmRole::Frequency => FREQUENCY,
            RfmRole::Monetary => MONETARY,
        }
    }

    fn candidates(self, synonyms: &SynonymTable) -> &[String] {
        match self {
            RfmRole::Recency => &synonyms.recency,
            RfmRole::Frequency => &synonyms.frequency,
            RfmRole::Monetary => &synonyms.monetary,
        }
    }
}

impl fmt::Display for RfmRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Partial role mapping, anywhere from zero to three entries.
pub type DetectedColumns = BTreeMap<RfmRole, String>;

/// Complete mapping from each role to the actual input column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub recency: String,
    pub frequency: String,
    pub monetary: String,
}

impl ColumnMapping {
    pub fn column(&self, role: RfmRole) -> &str {
        match role {
            RfmRole::Recency => &self.recency,
            RfmRole::Frequency => &self.frequency,
            RfmRole::Monetary => &self.monetary,
        }
    }
}

/// How a transaction log yields the total spend of one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountSource {
    Column(String),
    QuantityTimesPrice { quantity: String, unit_price: String },
}

/// Columns of a raw per-transaction log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionColumns {
    pub customer_id: String,
    /// Without it every row counts as one transaction
    pub transaction_id: Option<String>,
    pub amount: AmountSource,
    pub timestamp: String,
}

/// First column, in table order, whose name equals one of the candidates
/// ignoring case.
fn find_column<S: AsRef<str>>(columns: &[S], candidates: &[String]) -> Option<String> {
    let lowered: Vec<String> = candidates.iter().map(|c| c.to_lowercase()).collect();
    columns
        .iter()
        .map(AsRef::as_ref)
        .find(|name| lowered.contains(&name.to_lowercase()))
        .map(str::to_string)
}

pub fn detect_columns<S: AsRef<str>>(columns: &[S], synonyms: &SynonymTable) -> DetectedColumns {
    RfmRole::ALL
        .iter()
        .filter_map(|&role| find_column(columns, role.candidates(synonyms)).map(|name| (role, name)))
        .collect()
}

/// Resolve all three roles or report which ones are missing.
pub fn resolve_columns<S: AsRef<str>>(
    columns: &[S],
    synonyms: &SynonymTable,
) -> Result<ColumnMapping> {
    let mut detected = detect_columns(columns, synonyms);
    debug!("Detected RFM columns: {:?}", detected);

    let missing: Vec<RfmRole> = RfmRole::ALL
        .iter()
        .copied()
        .filter(|role| !detected.contains_key(role))
        .collect();

    match (
        detected.remove(&RfmRole::Recency),
        detected.remove(&RfmRole::Frequency),
        detected.remove(&RfmRole::Monetary),
    ) {
        (Some(recency), Some(frequency), Some(monetary)) => Ok(ColumnMapping {
            recency,
            frequency,
            monetary,
        }),
        _ => Err(SegmentError::UnresolvedColumns {
            available: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            missing,
        }),
    }
}

pub fn resolve_transaction_columns<S: AsRef<str>>(
    columns: &[S],
    synonyms: &SynonymTable,
) -> Option<TransactionColumns> {
    let customer_id = find_column(columns, &synonyms.customer_id)?;
    let timestamp = find_column(columns, &synonyms.timestamp)?;
    let amount = match find_column(columns, &synonyms.amount) {
        Some(column) => AmountSource::Column(column),
        None => AmountSource::QuantityTimesPrice {
            quantity: find_column(columns, &synonyms.quantity)?,
            unit_price: find_column(columns, &synonyms.unit_price)?,
        },
    };
    let transaction_id = find_column(columns, &synonyms.transaction_id);

    let resolved = TransactionColumns {
        customer_id,
        transaction_id,
        amount,
        timestamp,
    };
    debug!("Detected transaction log columns: {:?}", resolved);
    Some(resolved)
}
