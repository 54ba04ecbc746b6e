//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract — scripts rely on them.
//!
//! # Exit Codes
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Reconciled: every record paired, every compared field equal |
//! | 1    | Differences: field mismatches or one-sided records        |
//! | 2    | Usage error (bad args, no input paths)                    |
//! | 3    | Ambiguous fuzzy matches held for manual review            |
//! | 4    | Schema error (key or required column missing)             |
//! | 5    | Invalid configuration                                     |
//! | 6    | IO or parse error reading inputs / writing outputs        |
//!
//! Differences take precedence over ambiguity, like `diff(1)`.
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use recmerge_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - reconciliation completed with nothing to report.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Reconciliation outcome (1, 3)
// =============================================================================

/// Datasets differ (mismatched fields, source-only or target-only records).
/// Like `diff(1)`, exit 1 means "inputs differ."
pub const EXIT_RECON_DIFFERENCES: u8 = 1;

/// Ambiguous fuzzy matches need manual review. Only reported when there are
/// no differences.
pub const EXIT_RECON_AMBIGUOUS: u8 = 3;

// =============================================================================
// Failures (4-6)
// =============================================================================

/// Key column or a compare / fuzzy / merge column is missing from a dataset.
pub const EXIT_RECON_SCHEMA: u8 = 4;

/// Config file failed to parse or validate.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 5;

/// Cannot read an input, parse a CSV, or write an output.
pub const EXIT_RECON_IO: u8 = 6;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::Schema { .. } => EXIT_RECON_SCHEMA,
        ReconError::ConfigParse(_) | ReconError::Configuration(_) => EXIT_RECON_INVALID_CONFIG,
        ReconError::Dataset { .. } => EXIT_RECON_IO,
    }
}
