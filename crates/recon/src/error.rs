use std::fmt;

use crate::model::Side;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Invalid configuration (threshold range, empty composite fields,
    /// contradictory priority order, ...). Raised before any matching.
    Configuration(String),
    /// A required column is missing from one side. Raised before any comparison.
    Schema { side: Side, column: String, role: &'static str },
    /// Malformed input table (duplicate header, ragged row).
    Dataset { side: Side, message: String },
}

impl ReconError {
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::ConfigParse(_))
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::Schema { side, column, role } => {
                write!(f, "schema error: {side} dataset is missing {role} column '{column}'")
            }
            Self::Dataset { side, message } => write!(f, "{side} dataset: {message}"),
        }
    }
}

impl std::error::Error for ReconError {}
