use std::collections::BTreeMap;

use crate::model::{DuplicateKey, FieldComparison, PairStatus, PairingEntry, PairingResult, Side, SideCounts};
use crate::record::{NormalizedDataset, Record};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub key_column: String,
    pub columns: Vec<String>,
    pub case_insensitive: bool,
}

impl CompareOptions {
    /// Compare every configured column by normalized-value equality.
    pub fn compare(&self, source: &Record, target: &Record) -> Vec<FieldComparison> {
        self.columns
            .iter()
            .map(|column| {
                let s = source.value(column);
                let t = target.value(column);
                FieldComparison {
                    column: column.clone(),
                    source: s.clone(),
                    target: t.clone(),
                    equal: s.equivalent(t, self.case_insensitive),
                }
            })
            .collect()
    }

    pub fn matched_pair(
        &self,
        status: PairStatus,
        source: &Record,
        target: &Record,
        score: Option<f64>,
    ) -> PairingEntry {
        PairingEntry {
            status,
            key: source.key.clone().or_else(|| target.key.clone()),
            source: Some(source.clone()),
            target: Some(target.clone()),
            comparisons: self.compare(source, target),
            score,
            candidates: Vec::new(),
            duplicate: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Exact reconciliation
// ---------------------------------------------------------------------------

/// Join two normalized datasets on their key.
///
/// Keys are walked in ascending order. A key present on both sides pairs the
/// first record per side in row order; later records under the same key are
/// emitted one-sided with `duplicate = true` and reported in `duplicates`.
/// Records with no key are appended one-sided, source rows first.
pub fn reconcile(
    source: &NormalizedDataset,
    target: &NormalizedDataset,
    options: &CompareOptions,
) -> PairingResult {
    let mut missing_keys = SideCounts::default();
    let (source_map, source_keyless) = index_by_key(source, &mut missing_keys);
    let (target_map, target_keyless) = index_by_key(target, &mut missing_keys);

    let mut entries = Vec::with_capacity(source.len().max(target.len()));
    let mut duplicates = Vec::new();

    for (key, source_rows) in &source_map {
        note_duplicates(Side::Source, key, source_rows, &mut duplicates);

        match target_map.get(key) {
            Some(target_rows) => {
                entries.push(options.matched_pair(
                    PairStatus::MatchedExact,
                    source_rows[0],
                    target_rows[0],
                    None,
                ));
                push_extras(&source_rows[1..], &mut entries);
                push_extras(&target_rows[1..], &mut entries);
            }
            None => {
                entries.push(PairingEntry::one_sided(source_rows[0].clone(), false));
                push_extras(&source_rows[1..], &mut entries);
            }
        }
    }

    for (key, target_rows) in &target_map {
        note_duplicates(Side::Target, key, target_rows, &mut duplicates);

        if !source_map.contains_key(key) {
            entries.push(PairingEntry::one_sided(target_rows[0].clone(), false));
            push_extras(&target_rows[1..], &mut entries);
        }
    }

    for record in source_keyless.into_iter().chain(target_keyless) {
        entries.push(PairingEntry::one_sided(record.clone(), false));
    }

    for dup in &duplicates {
        let paired = source_map.contains_key(dup.key.as_str()) && target_map.contains_key(dup.key.as_str());
        log::warn!("{}", duplicate_message(dup, paired));
    }

    log::debug!(
        "exact: {} matched, {} keyless rows (source {}, target {})",
        entries.iter().filter(|e| e.status == PairStatus::MatchedExact).count(),
        missing_keys.source + missing_keys.target,
        missing_keys.source,
        missing_keys.target,
    );

    PairingResult {
        key_column: options.key_column.clone(),
        compare_columns: options.columns.clone(),
        source_records: source.len(),
        target_records: target.len(),
        entries,
        duplicates,
        missing_keys,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn index_by_key<'a>(
    dataset: &'a NormalizedDataset,
    missing_keys: &mut SideCounts,
) -> (BTreeMap<&'a str, Vec<&'a Record>>, Vec<&'a Record>) {
    let mut map: BTreeMap<&str, Vec<&Record>> = BTreeMap::new();
    let mut keyless = Vec::new();

    for record in &dataset.records {
        match record.key.as_deref() {
            Some(key) => map.entry(key).or_default().push(record),
            None => {
                missing_keys.bump(dataset.side);
                keyless.push(record);
            }
        }
    }

    (map, keyless)
}

fn note_duplicates(side: Side, key: &str, rows: &[&Record], out: &mut Vec<DuplicateKey>) {
    if rows.len() > 1 {
        out.push(DuplicateKey {
            side,
            key: key.to_string(),
            count: rows.len(),
        });
    }
}

fn duplicate_message(dup: &DuplicateKey, paired: bool) -> String {
    if paired {
        format!(
            "{} key {:?} appears {} times; pairing the first occurrence",
            dup.side, dup.key, dup.count
        )
    } else {
        format!(
            "{} key {:?} appears {} times with no {} counterpart; every row stays {}_only",
            dup.side,
            dup.key,
            dup.count,
            dup.side.other(),
            dup.side
        )
    }
}

fn push_extras(extras: &[&Record], entries: &mut Vec<PairingEntry>) {
    for record in extras {
        entries.push(PairingEntry::one_sided((*record).clone(), true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnType, ReconConfig};
    use crate::record::{normalize_dataset, Dataset, Value};

    const COLUMNS: [&str; 4] = ["student_id", "score", "status", "department"];

    fn config() -> ReconConfig {
        let mut config = ReconConfig::for_key("student_id");
        config.columns.insert("score".into(), ColumnType::Integer);
        config
    }

    fn options() -> CompareOptions {
        CompareOptions {
            key_column: "student_id".into(),
            columns: vec!["score".into(), "status".into(), "department".into()],
            case_insensitive: false,
        }
    }

    fn run(source: &[&[&str]], target: &[&[&str]]) -> PairingResult {
        let config = config();
        let s = normalize_dataset(&Dataset::from_rows(&COLUMNS, source), Side::Source, &config).unwrap();
        let t = normalize_dataset(&Dataset::from_rows(&COLUMNS, target), Side::Target, &config).unwrap();
        reconcile(&s, &t, &options())
    }

    #[test]
    fn status_mismatch_is_still_matched_exact() {
        let out = run(
            &[&["STU001", "78", "open", "Computer Science"]],
            &[&["STU001", "78", "closed", "Computer Science"]],
        );
        assert_eq!(out.entries.len(), 1);
        let entry = &out.entries[0];
        assert_eq!(entry.status, PairStatus::MatchedExact);
        assert!(entry.has_mismatches());
        assert_eq!(entry.mismatched_columns().collect::<Vec<_>>(), vec!["status"]);
    }

    #[test]
    fn numeric_normalization_before_compare() {
        let out = run(
            &[&["STU001", "78", "open", "CS"]],
            &[&["STU001", " 78.0 ", "open", "CS "]],
        );
        assert!(!out.entries[0].has_mismatches());
    }

    #[test]
    fn one_sided_keys() {
        let out = run(
            &[&["STU001", "78", "open", "CS"], &["STU002", "80", "open", "CS"]],
            &[&["STU001", "78", "open", "CS"], &["STU025", "74", "open", "Bio"]],
        );
        assert_eq!(out.count(PairStatus::MatchedExact), 1);
        assert_eq!(out.count(PairStatus::SourceOnly), 1);
        assert_eq!(out.count(PairStatus::TargetOnly), 1);
        let target_only = out
            .entries
            .iter()
            .find(|e| e.status == PairStatus::TargetOnly)
            .unwrap();
        assert_eq!(target_only.key.as_deref(), Some("STU025"));
        assert!(target_only.source.is_none());
    }

    #[test]
    fn keys_walked_in_order() {
        let out = run(
            &[&["STU003", "1", "", ""], &["STU001", "1", "", ""]],
            &[&["STU002", "1", "", ""]],
        );
        let keys: Vec<_> = out.entries.iter().map(|e| e.key.as_deref().unwrap()).collect();
        assert_eq!(keys, vec!["STU001", "STU003", "STU002"]);
    }

    #[test]
    fn duplicates_pair_first_occurrence() {
        let out = run(
            &[
                &["STU003", "91", "open", "Physics"],
                &["STU003", "50", "closed", "Physics"],
            ],
            &[&["STU003", "91", "open", "Physics"]],
        );
        assert_eq!(out.entries.len(), 2);
        let matched = &out.entries[0];
        assert_eq!(matched.status, PairStatus::MatchedExact);
        assert_eq!(matched.source.as_ref().unwrap().row, 0);
        assert!(!matched.has_mismatches());

        let extra = &out.entries[1];
        assert_eq!(extra.status, PairStatus::SourceOnly);
        assert!(extra.duplicate);
        assert_eq!(extra.source.as_ref().unwrap().value("score"), &Value::Integer(50));

        assert_eq!(out.duplicates.len(), 1);
        assert_eq!(out.duplicates[0].side, Side::Source);
        assert_eq!(out.duplicates[0].count, 2);
    }

    #[test]
    fn target_duplicates_without_source() {
        let out = run(&[], &[&["STU009", "1", "", ""], &["STU009", "2", "", ""]]);
        assert_eq!(out.count(PairStatus::TargetOnly), 2);
        assert_eq!(out.entries.iter().filter(|e| e.duplicate).count(), 1);
        assert_eq!(out.duplicates[0].side, Side::Target);
    }

    #[test]
    fn duplicate_message_by_case() {
        let out = run(
            &[&["STU003", "1", "", ""], &["STU003", "2", "", ""]],
            &[&["STU009", "1", "", ""], &["STU009", "2", "", ""], &["STU003", "1", "", ""]],
        );
        assert_eq!(out.duplicates.len(), 2);

        let paired = duplicate_message(&out.duplicates[0], true);
        assert_eq!(paired, "source key \"STU003\" appears 2 times; pairing the first occurrence");

        let unpaired = duplicate_message(&out.duplicates[1], false);
        assert_eq!(
            unpaired,
            "target key \"STU009\" appears 2 times with no source counterpart; every row stays target_only"
        );
    }

    #[test]
    fn case_insensitive_keys_pair_exactly() {
        let mut config = config();
        config.case_insensitive = true;
        let s = normalize_dataset(
            &Dataset::from_rows(&COLUMNS, &[&["stu001", "78", "Open", "CS"]]),
            Side::Source,
            &config,
        )
        .unwrap();
        let t = normalize_dataset(
            &Dataset::from_rows(&COLUMNS, &[&[" STU001", "78", "open", "cs"]]),
            Side::Target,
            &config,
        )
        .unwrap();
        let options = CompareOptions { case_insensitive: true, ..options() };
        let out = reconcile(&s, &t, &options);

        assert_eq!(out.entries.len(), 1);
        let entry = &out.entries[0];
        assert_eq!(entry.status, PairStatus::MatchedExact);
        assert_eq!(entry.key.as_deref(), Some("stu001"));
        assert!(!entry.has_mismatches());
    }

    #[test]
    fn keyless_rows_kept_one_sided() {
        let out = run(
            &[&["", "60", "open", "History"]],
            &[&["null", "60", "open", "History"]],
        );
        assert_eq!(out.entries.len(), 2);
        assert_eq!(out.entries[0].status, PairStatus::SourceOnly);
        assert_eq!(out.entries[1].status, PairStatus::TargetOnly);
        assert!(out.entries.iter().all(|e| e.key.is_none() && !e.duplicate));
        assert_eq!(out.missing_keys.source, 1);
        assert_eq!(out.missing_keys.target, 1);
    }

    #[test]
    fn take_unmatched_leaves_duplicates() {
        let mut out = run(
            &[&["STU003", "1", "", ""], &["STU003", "2", "", ""], &["STU004", "1", "", ""]],
            &[&["STU003", "1", "", ""], &["STU005", "1", "", ""]],
        );
        let (source, target) = out.take_unmatched();
        assert_eq!(source.len(), 1);
        assert_eq!(source[0].key.as_deref(), Some("STU004"));
        assert_eq!(target.len(), 1);
        assert_eq!(target[0].key.as_deref(), Some("STU005"));
        assert_eq!(out.entries.len(), 2);
        assert!(out.entries.iter().any(|e| e.duplicate));
    }

    #[test]
    fn self_reconcile_is_clean() {
        let rows: &[&[&str]] = &[
            &["STU001", "78", "open", "CS"],
            &["STU002", "85", "closed", "Maths"],
            &["STU003", "", "open", ""],
        ];
        let out = run(rows, rows);
        assert_eq!(out.count(PairStatus::MatchedExact), 3);
        assert!(out.entries.iter().all(|e| !e.has_mismatches()));
    }
}
