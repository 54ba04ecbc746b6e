use std::collections::BTreeMap;

use crate::config::{resolve_priority, ReconConfig};
use crate::error::ReconError;
use crate::model::{
    FieldConflict, MergeOutput, MergedField, MergedRecord, PairStatus, PairingEntry,
    PairingResult, Provenance, RecordOrigin, ReviewItem, Side,
};
use crate::record::{Record, Value, MISSING};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Resolved survivorship rules: total priority orders and the merge columns.
#[derive(Debug, Clone)]
pub struct SurvivorshipPolicy {
    pub priority: [Side; 2],
    pub overrides: BTreeMap<String, [Side; 2]>,
    pub columns: Vec<String>,
    pub case_insensitive: bool,
}

impl SurvivorshipPolicy {
    /// Merge columns default to `default_columns` (the engine passes every
    /// column of either dataset). The key column is merged separately and
    /// never listed.
    pub fn from_config(config: &ReconConfig, default_columns: &[String]) -> Result<Self, ReconError> {
        let survivorship = &config.survivorship;
        let priority = resolve_priority(&survivorship.priority, "survivorship")?;

        let mut overrides = BTreeMap::new();
        for (column, order) in &survivorship.overrides {
            let order = resolve_priority(order, &format!("survivorship override '{column}'"))?;
            overrides.insert(column.clone(), order);
        }

        let requested = if survivorship.columns.is_empty() {
            default_columns
        } else {
            survivorship.columns.as_slice()
        };
        let mut columns: Vec<String> = Vec::with_capacity(requested.len());
        for column in requested {
            if *column != config.key && !columns.contains(column) {
                columns.push(column.clone());
            }
        }

        Ok(Self {
            priority,
            overrides,
            columns,
            case_insensitive: config.case_insensitive,
        })
    }

    pub fn priority_for(&self, column: &str) -> [Side; 2] {
        self.overrides.get(column).copied().unwrap_or(self.priority)
    }
}

// ---------------------------------------------------------------------------
// Field survival
// ---------------------------------------------------------------------------

struct Survivor<'a> {
    value: &'a Value,
    provenance: Provenance,
    /// Set when both sides carried differing values.
    conflict_from: Option<Side>,
}

fn pick<'a>(side: Side, source: &'a Value, target: &'a Value) -> &'a Value {
    match side {
        Side::Source => source,
        Side::Target => target,
    }
}

/// First non-missing value in priority order.
fn survive<'a>(
    source: &'a Value,
    target: &'a Value,
    priority: [Side; 2],
    case_insensitive: bool,
) -> Survivor<'a> {
    let first = pick(priority[0], source, target);
    let second = pick(priority[1], source, target);

    match (first.is_missing(), second.is_missing()) {
        (true, true) => Survivor {
            value: first,
            provenance: Provenance::None,
            conflict_from: None,
        },
        (false, false) if first.equivalent(second, case_insensitive) => Survivor {
            value: first,
            provenance: Provenance::BothEqual,
            conflict_from: None,
        },
        (false, false) => Survivor {
            value: first,
            provenance: priority[0].into(),
            conflict_from: Some(priority[0]),
        },
        (false, true) => Survivor {
            value: first,
            provenance: priority[0].into(),
            conflict_from: None,
        },
        (true, false) => Survivor {
            value: second,
            provenance: priority[1].into(),
            conflict_from: None,
        },
    }
}

fn merged_key(source: Option<&Record>, target: Option<&Record>, priority: [Side; 2]) -> Option<String> {
    priority.iter().find_map(|side| {
        let record = match side {
            Side::Source => source,
            Side::Target => target,
        };
        record.and_then(|r| r.key.clone())
    })
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Build one merged record per non-ambiguous pairing entry.
///
/// Ambiguous entries are held back in `manual_review`.
pub fn merge(pairing: &PairingResult, policy: &SurvivorshipPolicy) -> MergeOutput {
    let mut records = Vec::with_capacity(pairing.entries.len());
    let mut conflicts = Vec::new();
    let mut manual_review = Vec::new();

    for entry in &pairing.entries {
        if entry.status == PairStatus::Ambiguous {
            manual_review.push(ReviewItem {
                source_key: entry.key.clone(),
                source_row: entry.source.as_ref().map_or(0, |r| r.row),
                best_score: entry.score,
                candidates: entry.candidates.clone(),
            });
            continue;
        }

        records.push(merge_entry(entry, policy, &mut conflicts));
    }

    log::debug!(
        "merge: {} records, {} conflicts, {} held for review",
        records.len(),
        conflicts.len(),
        manual_review.len()
    );

    MergeOutput {
        columns: policy.columns.clone(),
        records,
        conflicts,
        manual_review,
    }
}

fn merge_entry(
    entry: &PairingEntry,
    policy: &SurvivorshipPolicy,
    conflicts: &mut Vec<FieldConflict>,
) -> MergedRecord {
    let source = entry.source.as_ref();
    let target = entry.target.as_ref();
    let origin = match (source, target) {
        (Some(_), Some(_)) => RecordOrigin::Both,
        (Some(_), None) => RecordOrigin::SourceOnly,
        _ => RecordOrigin::TargetOnly,
    };
    let key = merged_key(source, target, policy.priority);

    let mut fields = Vec::with_capacity(policy.columns.len());
    for column in &policy.columns {
        let priority = policy.priority_for(column);
        let s = source.map_or(&MISSING, |r| r.value(column));
        let t = target.map_or(&MISSING, |r| r.value(column));
        let survivor = survive(s, t, priority, policy.case_insensitive);

        if let Some(chosen_from) = survivor.conflict_from {
            conflicts.push(FieldConflict {
                key: key.clone(),
                column: column.clone(),
                source: s.clone(),
                target: t.clone(),
                chosen: survivor.value.clone(),
                chosen_from,
                priority,
            });
        }

        fields.push(MergedField {
            column: column.clone(),
            value: survivor.value.clone(),
            provenance: survivor.provenance,
        });
    }

    MergedRecord {
        key,
        origin,
        status: entry.status,
        fields,
    }
}
