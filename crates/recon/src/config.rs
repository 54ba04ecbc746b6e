use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ReconError;
use crate::model::Side;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Key column used for exact reconciliation. Must exist in both datasets.
    pub key: String,
    /// Columns compared for matched pairs. Empty = every column shared by
    /// both datasets except the key.
    #[serde(default)]
    pub compare: Vec<String>,
    #[serde(default)]
    pub case_insensitive: bool,
    /// Cell values (after trimming) that normalize to the missing sentinel.
    /// The empty string is always missing.
    #[serde(default = "default_null_markers")]
    pub null_markers: Vec<String>,
    /// chrono formats tried in order for `date` columns.
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
    #[serde(default)]
    pub inputs: Option<InputConfig>,
    /// Declared column types. Unlisted columns are text.
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnType>,
    #[serde(default)]
    pub fuzzy: FuzzyConfig,
    #[serde(default)]
    pub survivorship: SurvivorshipConfig,
}

fn default_name() -> String {
    "reconciliation".into()
}

fn default_null_markers() -> Vec<String> {
    ["null", "NULL", "N/A", "NA"].iter().map(|s| s.to_string()).collect()
}

fn default_date_formats() -> Vec<String> {
    vec!["%Y-%m-%d".into()]
}

/// Dataset locations, resolved by the caller. The engine never reads them.
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    Text,
    Integer,
    Float,
    Date,
}

// ---------------------------------------------------------------------------
// Fuzzy matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct FuzzyConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Composite fields combined into one similarity score.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Per-field weights. Fields without an entry weigh 1.0.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_ambiguity_margin")]
    pub ambiguity_margin: f64,
    #[serde(default)]
    pub boost: Option<BoostConfig>,
}

fn default_threshold() -> f64 {
    0.86
}

fn default_ambiguity_margin() -> f64 {
    0.02
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fields: Vec::new(),
            weights: BTreeMap::new(),
            threshold: default_threshold(),
            ambiguity_margin: default_ambiguity_margin(),
            boost: None,
        }
    }
}

/// Score bonus applied when `column` holds the same value on both sides.
#[derive(Debug, Clone, Deserialize)]
pub struct BoostConfig {
    pub column: String,
    pub amount: f64,
}

impl FuzzyConfig {
    pub fn weight(&self, field: &str) -> f64 {
        self.weights.get(field).copied().unwrap_or(1.0)
    }

    /// Checks the matcher's own preconditions. Independent of `enabled`.
    pub fn check(&self) -> Result<(), ReconError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ReconError::Configuration(format!(
                "fuzzy threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.ambiguity_margin) {
            return Err(ReconError::Configuration(format!(
                "fuzzy ambiguity_margin must be within [0, 1], got {}",
                self.ambiguity_margin
            )));
        }
        if self.fields.is_empty() {
            return Err(ReconError::Configuration(
                "fuzzy matching requires at least one composite field".into(),
            ));
        }
        for (field, weight) in &self.weights {
            if !self.fields.contains(field) {
                return Err(ReconError::Configuration(format!(
                    "fuzzy weight given for '{field}', which is not a composite field"
                )));
            }
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(ReconError::Configuration(format!(
                    "fuzzy weight for '{field}' must be positive, got {weight}"
                )));
            }
        }
        if let Some(ref boost) = self.boost {
            if !(0.0..=1.0).contains(&boost.amount) {
                return Err(ReconError::Configuration(format!(
                    "fuzzy boost amount must be within [0, 1], got {}",
                    boost.amount
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Survivorship
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SurvivorshipConfig {
    #[serde(default = "default_priority")]
    pub priority: Vec<Side>,
    /// Columns carried into merged records. Empty = the compare columns.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Per-column priority orders that replace `priority` for that column.
    #[serde(default)]
    pub overrides: BTreeMap<String, Vec<Side>>,
}

fn default_priority() -> Vec<Side> {
    vec![Side::Target, Side::Source]
}

impl Default for SurvivorshipConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            columns: Vec::new(),
            overrides: BTreeMap::new(),
        }
    }
}

/// Turn a configured side list into a total order.
///
/// An empty list falls back to `[target, source]`; a list naming one side
/// gets the other appended. Naming a side twice is contradictory.
pub fn resolve_priority(order: &[Side], context: &str) -> Result<[Side; 2], ReconError> {
    match order {
        [] => Ok([Side::Target, Side::Source]),
        [only] => Ok([*only, only.other()]),
        [first, second] if first != second => Ok([*first, *second]),
        _ => Err(ReconError::Configuration(format!(
            "{context}: priority order {} is contradictory; name each side at most once",
            order.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(" > ")
        ))),
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Minimal config keyed on `key`, everything else at defaults.
    pub fn for_key(key: impl Into<String>) -> Self {
        Self {
            name: default_name(),
            key: key.into(),
            compare: Vec::new(),
            case_insensitive: false,
            null_markers: default_null_markers(),
            date_formats: default_date_formats(),
            inputs: None,
            columns: BTreeMap::new(),
            fuzzy: FuzzyConfig::default(),
            survivorship: SurvivorshipConfig::default(),
        }
    }

    pub fn column_type(&self, column: &str) -> ColumnType {
        self.columns.get(column).copied().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.key.trim().is_empty() {
            return Err(ReconError::Configuration("key column name is empty".into()));
        }

        if self.date_formats.is_empty() {
            return Err(ReconError::Configuration(
                "date_formats must list at least one format".into(),
            ));
        }

        if self.fuzzy.enabled {
            self.fuzzy.check()?;
        }

        resolve_priority(&self.survivorship.priority, "survivorship")?;
        for (column, order) in &self.survivorship.overrides {
            resolve_priority(order, &format!("survivorship override '{column}'"))?;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
