//! Topic catalog loading.
//!
//! The plant description arrives as a semicolon-delimited CSV export, one row
//! per MQTT topic. The loader maps columns by header name, so extra or
//! reordered columns are fine, and collects per-row failures instead of
//! stopping at the first bad row: one mangled line must not take down the
//! rest of a large catalog.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::topic::{TopicParseError, TopicPath};
use crate::units::{normalize_unit, parse_limits, Limits};
use crate::value::DataType;

/// Read/write direction of a catalog row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Read,
    Write,
}

impl std::str::FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ" => Ok(Self::Read),
            "WRITE" => Ok(Self::Write),
            _ => Err(()),
        }
    }
}

/// One validated plant-description row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub floor: String,
    pub subsystem: String,
    pub variable: String,
    pub topic: TopicPath,
    pub raw_topic: String,
    pub published: bool,
    pub subscribed: bool,
    pub direction: Direction,
    pub data_type: DataType,
    pub unit: String,
    pub range: Option<Limits>,
    pub limits: Option<Limits>,
    pub state: String,
    pub notes: String,
}

/// Why a row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedReason {
    #[error("direction column is empty")]
    MissingDirection,

    #[error("unknown direction {0:?}")]
    UnknownDirection(String),

    #[error(transparent)]
    BadTopic(#[from] TopicParseError),

    #[error("non-numeric limits {value:?} on a {declared} item")]
    BadLimits { value: String, declared: &'static str },

    #[error("unknown unit {0:?}")]
    UnknownUnit(String),
}

/// A row that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("catalog line {line}: {reason}")]
pub struct MalformedRecord {
    /// 1-based line in the source file.
    pub line: u64,
    pub reason: MalformedReason,
}

/// Result of a catalog load: the usable records plus the rejects.
#[derive(Debug, Clone)]
pub struct CatalogLoad {
    pub records: Vec<TopicRecord>,
    pub malformed: Vec<MalformedRecord>,
}

/// A catalog that cannot be loaded at all.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("cannot open catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse catalog: {0}")]
    Csv(#[from] csv::Error),

    #[error("catalog is missing required columns: {}", columns.join(", "))]
    MissingColumns { columns: Vec<String> },
}

const REQUIRED_COLUMNS: [&str; 8] = [
    "floor",
    "subsystem",
    "variable",
    "topic_and_item",
    "signal",
    "rw",
    "limits",
    "unit",
];

/// Column positions resolved from the header row.
struct ColumnMap {
    floor: usize,
    subsystem: usize,
    variable: usize,
    topic_and_item: usize,
    signal: usize,
    rw: usize,
    limits: usize,
    unit: usize,
    publication: Option<usize>,
    subscription: Option<usize>,
    range: Option<usize>,
    state: Option<usize>,
    notes: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, CatalogError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|name| find(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CatalogError::MissingColumns { columns: missing });
        }

        let require = |name: &str| find(name).expect("presence checked above");
        Ok(Self {
            floor: require("floor"),
            subsystem: require("subsystem"),
            variable: require("variable"),
            topic_and_item: require("topic_and_item"),
            signal: require("signal"),
            rw: require("rw"),
            limits: require("limits"),
            unit: require("unit"),
            publication: find("publication"),
            subscription: find("subscription"),
            range: find("range"),
            state: find("state"),
            notes: find("notes"),
        })
    }
}

/// Load a catalog from a file path.
pub fn load_path(path: impl AsRef<Path>) -> Result<CatalogLoad, CatalogError> {
    load_reader(File::open(path)?)
}

/// Load a catalog from any reader.
pub fn load_reader<R: Read>(reader: R) -> Result<CatalogLoad, CatalogError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(reader);

    let columns = ColumnMap::from_headers(csv_reader.headers()?)?;

    let mut records = Vec::new();
    let mut malformed = Vec::new();
    for (index, row) in csv_reader.records().enumerate() {
        let row = row?;
        // Header occupies line 1.
        let line = index as u64 + 2;
        match parse_row(&columns, &row) {
            Ok(record) => records.push(record),
            Err(reason) => {
                debug!(line, %reason, "rejecting catalog row");
                malformed.push(MalformedRecord { line, reason });
            }
        }
    }

    Ok(CatalogLoad { records, malformed })
}

fn parse_row(
    columns: &ColumnMap,
    row: &csv::StringRecord,
) -> Result<TopicRecord, MalformedReason> {
    let field = |index: usize| row.get(index).unwrap_or("").trim();
    let optional = |index: Option<usize>| index.map(|i| field(i)).unwrap_or("");

    let raw_direction = field(columns.rw);
    if raw_direction.is_empty() {
        return Err(MalformedReason::MissingDirection);
    }
    let direction: Direction = raw_direction
        .parse()
        .map_err(|_| MalformedReason::UnknownDirection(raw_direction.to_string()))?;

    let raw_topic = field(columns.topic_and_item);
    let topic = TopicPath::parse(raw_topic)?;

    let raw_unit = field(columns.unit);
    let unit = normalize_unit(raw_unit)
        .ok_or_else(|| MalformedReason::UnknownUnit(raw_unit.to_string()))?;

    let raw_range = optional(columns.range);
    let data_type = resolve_data_type(field(columns.signal), raw_range);

    let limits = parse_numeric_column(field(columns.limits), &data_type, "limits")?;
    let range = match columns.range {
        Some(index) => parse_numeric_column(field(index), &data_type, "range")?,
        None => None,
    };

    Ok(TopicRecord {
        floor: crate::topic::normalize_floor(field(columns.floor)),
        subsystem: field(columns.subsystem).to_string(),
        variable: field(columns.variable).to_string(),
        topic,
        raw_topic: raw_topic.to_string(),
        published: truthy(optional(columns.publication)),
        subscribed: truthy(optional(columns.subscription)),
        direction,
        data_type,
        unit: unit.to_string(),
        range,
        limits,
        state: optional(columns.state).to_string(),
        notes: optional(columns.notes).to_string(),
    })
}

/// Numeric columns must parse for numeric items; for boolean, enum and text
/// items an unknown spelling just means no declared bounds.
fn parse_numeric_column(
    raw: &str,
    data_type: &DataType,
    declared: &'static str,
) -> Result<Option<Limits>, MalformedReason> {
    match parse_limits(raw) {
        Ok(limits) => Ok(limits),
        Err(_) if !data_type.is_numeric() => {
            debug!(value = raw, column = declared, "ignoring unparsable bounds on non-numeric item");
            Ok(None)
        }
        Err(err) => Err(MalformedReason::BadLimits {
            value: err.value,
            declared: data_type.type_name(),
        }),
    }
}

/// Resolve the declared data type from the vendor's signal class.
///
/// Analog signals are floats; everything without a recognised class marker is
/// a digital on/off point, which is by far the most common row kind.
fn resolve_data_type(signal: &str, range: &str) -> DataType {
    let class = signal.to_ascii_uppercase();
    if class.contains("ANALOG") {
        DataType::Float
    } else if class.contains("ENTERO") || class.contains("INTEGER") {
        DataType::Integer
    } else if class.contains("MULTIESTADO") || class.contains("ENUM") {
        DataType::Enum {
            options: enum_options(range),
        }
    } else if class.contains("TEXTO") || class.contains("STRING") || class.contains("ASCII") {
        DataType::Text
    } else {
        DataType::Boolean
    }
}

/// Enumeration options come from the range column when it lists states.
fn enum_options(range: &str) -> Vec<String> {
    let options: Vec<String> = range
        .split(',')
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .collect();
    if options.len() > 1 { options } else { Vec::new() }
}

fn truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "si" | "sí" | "yes" | "true" | "1" | "x"
    )
}
