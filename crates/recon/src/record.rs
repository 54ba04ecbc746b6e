// Record model: raw caller-loaded tables in, schema-checked typed records out.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::config::{ColumnType, ReconConfig};
use crate::error::ReconError;
use crate::model::Side;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A rectangular table of cell text, as produced by whatever loaded it.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Build from string slices. Handy for fixtures.
    pub fn from_rows(columns: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Empty cell, configured null marker, or an unparseable typed cell.
    Missing,
    Text(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
}

pub(crate) static MISSING: Value = Value::Missing;

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Normalized-value equality. Text folds case when `case_insensitive`.
    pub fn equivalent(&self, other: &Value, case_insensitive: bool) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) if case_insensitive => {
                a.to_lowercase() == b.to_lowercase()
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => Ok(()),
            Self::Text(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Missing => serializer.serialize_none(),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Integer(n) => serializer.serialize_i64(*n),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
        }
    }
}

/// Split off accounting parentheses: `(123.45)` → `(true, "123.45")`.
fn split_negative(trimmed: &str) -> (bool, &str) {
    if trimmed.starts_with('(') && trimmed.ends_with(')') && trimmed.len() >= 2 {
        (true, &trimmed[1..trimmed.len() - 1])
    } else {
        (false, trimmed)
    }
}

fn strip_decorations(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect()
}

/// Parse a numeric cell:
/// - Strip `$`, commas, whitespace
/// - Handle `(123.45)` → `-123.45`
/// - Returns None if non-numeric characters remain after stripping
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (is_negative, inner) = split_negative(trimmed);
    let cleaned = strip_decorations(inner);
    if cleaned.is_empty() {
        return None;
    }

    for (i, c) in cleaned.chars().enumerate() {
        match c {
            '0'..='9' | '.' => {}
            '-' | '+' if i == 0 && !is_negative => {}
            _ => return None,
        }
    }

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if is_negative { -value } else { value })
}

/// Integral numbers only; `78.0` is accepted, `78.5` is not. Parsed exactly
/// as `i64`: out-of-range values are rejected, never rounded or clamped.
pub fn parse_integer(s: &str) -> Option<i64> {
    let (is_negative, inner) = split_negative(s.trim());
    let cleaned = strip_decorations(inner);
    if is_negative && cleaned.starts_with(|c: char| c == '-' || c == '+') {
        return None;
    }

    let whole = match cleaned.split_once('.') {
        Some((whole, fraction)) if fraction.chars().all(|c| c == '0') => whole,
        Some(_) => return None,
        None => cleaned.as_str(),
    };

    let value: i64 = whole.parse().ok()?;
    if is_negative {
        value.checked_neg()
    } else {
        Some(value)
    }
}

/// Normalize one cell. Identical rules for both sides.
pub fn normalize_cell(raw: &str, column_type: ColumnType, config: &ReconConfig) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() || config.null_markers.iter().any(|m| m == trimmed) {
        return Value::Missing;
    }

    let parsed = match column_type {
        ColumnType::Text => Some(Value::Text(trimmed.to_string())),
        ColumnType::Integer => parse_integer(trimmed).map(Value::Integer),
        ColumnType::Float => parse_number(trimmed).map(Value::Float),
        ColumnType::Date => config
            .date_formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
            .map(Value::Date),
    };

    parsed.unwrap_or(Value::Missing)
}

/// Normalized key text: trimmed, case-folded when configured. `None` when the
/// cell is missing.
pub fn normalize_key(raw: &str, config: &ReconConfig) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || config.null_markers.iter().any(|m| m == trimmed) {
        return None;
    }
    Some(if config.case_insensitive {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    })
}

// ---------------------------------------------------------------------------
// Schema + Records
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Schema {
    columns: Vec<String>,
    types: Vec<ColumnType>,
    index: HashMap<String, usize>,
}

impl Schema {
    fn build(side: Side, columns: &[String], config: &ReconConfig) -> Result<Self, ReconError> {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(ReconError::Dataset {
                    side,
                    message: format!("duplicate column '{name}'"),
                });
            }
        }

        if !index.contains_key(&config.key) {
            return Err(ReconError::Schema {
                side,
                column: config.key.clone(),
                role: "key",
            });
        }

        let types = columns.iter().map(|c| config.column_type(c)).collect();
        Ok(Self {
            columns: columns.to_vec(),
            types,
            index,
        })
    }
}

/// One normalized row. Values are addressed by column name through the
/// shared schema.
#[derive(Debug, Clone)]
pub struct Record {
    pub side: Side,
    /// 0-based position among the dataset's data rows.
    pub row: usize,
    pub key: Option<String>,
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.schema.index.get(column).map(|&i| &self.values[i])
    }

    /// Value of `column`, or the missing sentinel when the schema lacks it.
    pub fn value(&self, column: &str) -> &Value {
        self.get(column).unwrap_or(&MISSING)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Human label: the key, or the 1-based row when there is none.
    pub fn label(&self) -> String {
        match self.key {
            Some(ref key) => key.clone(),
            None => format!("{} row {}", self.side, self.row + 1),
        }
    }
}

struct FieldsView<'a>(&'a Record);

impl Serialize for FieldsView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.values.len()))?;
        for (column, value) in self.0.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Record", 4)?;
        s.serialize_field("side", &self.side)?;
        s.serialize_field("row", &self.row)?;
        s.serialize_field("key", &self.key)?;
        s.serialize_field("fields", &FieldsView(self))?;
        s.end()
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedDataset {
    pub side: Side,
    pub schema: Arc<Schema>,
    pub records: Vec<Record>,
}

impl NormalizedDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Check the schema once and normalize every row of `dataset`.
pub fn normalize_dataset(
    dataset: &Dataset,
    side: Side,
    config: &ReconConfig,
) -> Result<NormalizedDataset, ReconError> {
    let schema = Arc::new(Schema::build(side, &dataset.columns, config)?);
    let key_idx = schema.index[&config.key];

    let mut records = Vec::with_capacity(dataset.rows.len());
    for (row, cells) in dataset.rows.iter().enumerate() {
        if cells.len() != schema.columns.len() {
            return Err(ReconError::Dataset {
                side,
                message: format!(
                    "row {} has {} cells, header has {}",
                    row + 1,
                    cells.len(),
                    schema.columns.len()
                ),
            });
        }

        let values = cells
            .iter()
            .zip(schema.types.iter())
            .map(|(raw, ty)| normalize_cell(raw, *ty, config))
            .collect();

        records.push(Record {
            side,
            row,
            key: normalize_key(&cells[key_idx], config),
            schema: Arc::clone(&schema),
            values,
        });
    }

    Ok(NormalizedDataset {
        side,
        schema,
        records,
    })
}
