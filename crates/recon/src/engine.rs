use crate::config::ReconConfig;
use crate::error::ReconError;
use crate::fuzzy::fuzzy_match;
use crate::merge::{merge, SurvivorshipPolicy};
use crate::model::{ReconMeta, ReconResult, Side};
use crate::reconcile::{reconcile, CompareOptions};
use crate::record::{normalize_dataset, Dataset};
use crate::summary::summarize;

/// Run reconciliation per config. Returns pairing, merge and summary.
///
/// Every fatal check runs before any comparison; on error nothing partial
/// is returned.
pub fn run(config: &ReconConfig, source: &Dataset, target: &Dataset) -> Result<ReconResult, ReconError> {
    config.validate()?;

    require(source, Side::Source, &config.key, "key")?;
    require(target, Side::Target, &config.key, "key")?;

    let compare = CompareOptions {
        key_column: config.key.clone(),
        columns: compare_columns(config, source, target),
        case_insensitive: config.case_insensitive,
    };
    for column in &compare.columns {
        require(source, Side::Source, column, "compare")?;
        require(target, Side::Target, column, "compare")?;
    }

    if config.fuzzy.enabled {
        for field in &config.fuzzy.fields {
            require(source, Side::Source, field, "fuzzy field")?;
            require(target, Side::Target, field, "fuzzy field")?;
        }
        if let Some(ref boost) = config.fuzzy.boost {
            require(source, Side::Source, &boost.column, "fuzzy boost")?;
            require(target, Side::Target, &boost.column, "fuzzy boost")?;
        }
    }

    let policy = SurvivorshipPolicy::from_config(config, &all_columns(source, target))?;
    for column in &policy.columns {
        if !source.has_column(column) && !target.has_column(column) {
            return Err(ReconError::Schema {
                side: Side::Source,
                column: column.clone(),
                role: "merge",
            });
        }
    }
    for column in policy.overrides.keys() {
        if !policy.columns.contains(column) {
            return Err(ReconError::Configuration(format!(
                "survivorship override '{column}' names a column that is not merged"
            )));
        }
    }

    let source = normalize_dataset(source, Side::Source, config)?;
    let target = normalize_dataset(target, Side::Target, config)?;
    log::debug!(
        "'{}': {} source / {} target records, comparing {:?}",
        config.name,
        source.len(),
        target.len(),
        compare.columns
    );

    let mut pairing = reconcile(&source, &target, &compare);

    if config.fuzzy.enabled {
        let (unmatched_source, unmatched_target) = pairing.take_unmatched();
        let fuzzy_entries = fuzzy_match(unmatched_source, unmatched_target, &config.fuzzy, &compare)?;
        pairing.entries.extend(fuzzy_entries);
    }

    let merged = merge(&pairing, &policy);
    let summary = summarize(&pairing, &merged);

    Ok(ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            key_column: config.key.clone(),
        },
        summary,
        pairing,
        merge: merged,
    })
}

/// Configured compare columns without the key, or every column both
/// datasets share, in source order.
fn compare_columns(config: &ReconConfig, source: &Dataset, target: &Dataset) -> Vec<String> {
    let candidates: Vec<&String> = if config.compare.is_empty() {
        source.columns.iter().filter(|c| target.has_column(c)).collect()
    } else {
        config.compare.iter().collect()
    };

    let mut columns: Vec<String> = Vec::with_capacity(candidates.len());
    for column in candidates {
        if *column != config.key && !columns.contains(column) {
            columns.push(column.clone());
        }
    }
    columns
}

/// Every column of either dataset, source header order first.
fn all_columns(source: &Dataset, target: &Dataset) -> Vec<String> {
    let mut columns = source.columns.clone();
    for column in &target.columns {
        if !columns.contains(column) {
            columns.push(column.clone());
        }
    }
    columns
}

fn require(dataset: &Dataset, side: Side, column: &str, role: &'static str) -> Result<(), ReconError> {
    if dataset.has_column(column) {
        Ok(())
    } else {
        Err(ReconError::Schema {
            side,
            column: column.to_string(),
            role,
        })
    }
}
