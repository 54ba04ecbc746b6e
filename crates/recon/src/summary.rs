use std::collections::BTreeMap;

use crate::model::{
    MergeOutput, PairStatus, PairingResult, ProvenanceCounts, ReconWarning, SideCounts,
    SummaryReport,
};

/// Aggregate pairing and merge outputs into run-level counts and warnings.
pub fn summarize(pairing: &PairingResult, merge: &MergeOutput) -> SummaryReport {
    let mut report = SummaryReport {
        source_records: pairing.source_records,
        target_records: pairing.target_records,
        matched: 0,
        matched_exact: 0,
        matched_fuzzy: 0,
        source_only: 0,
        target_only: 0,
        ambiguous: 0,
        pairs_with_mismatches: 0,
        mismatches_by_column: BTreeMap::new(),
        duplicate_keys: SideCounts::default(),
        missing_key_rows: pairing.missing_keys.clone(),
        merged_records: merge.records.len(),
        field_conflicts: merge.conflicts.len(),
        wins_by_column: BTreeMap::new(),
        warnings: Vec::new(),
    };

    for dup in &pairing.duplicates {
        report.warnings.push(ReconWarning::DuplicateKey {
            side: dup.side,
            key: dup.key.clone(),
            count: dup.count,
        });
    }

    for entry in &pairing.entries {
        match entry.status {
            PairStatus::MatchedExact => report.matched_exact += 1,
            PairStatus::MatchedFuzzy => report.matched_fuzzy += 1,
            PairStatus::SourceOnly => report.source_only += 1,
            PairStatus::TargetOnly => report.target_only += 1,
            PairStatus::Ambiguous => {
                report.ambiguous += 1;
                report.warnings.push(ReconWarning::AmbiguousMatch {
                    source_key: entry.key.clone(),
                    source_row: entry.source.as_ref().map_or(0, |r| r.row),
                    candidates: entry.candidates.len(),
                });
            }
        }

        if entry.duplicate {
            if let Some(record) = entry.source.as_ref().or(entry.target.as_ref()) {
                report.duplicate_keys.bump(record.side);
            }
        }

        if entry.has_mismatches() {
            report.pairs_with_mismatches += 1;
            for column in entry.mismatched_columns() {
                *report.mismatches_by_column.entry(column.to_string()).or_default() += 1;
            }
        }

        for record in entry.source.iter().chain(entry.target.iter()) {
            if record.key.is_none() {
                report.warnings.push(ReconWarning::MissingKey {
                    side: record.side,
                    row: record.row,
                });
            }
        }
    }
    report.matched = report.matched_exact + report.matched_fuzzy;

    for column in &merge.columns {
        report.wins_by_column.insert(column.clone(), ProvenanceCounts::default());
    }
    for record in &merge.records {
        for field in &record.fields {
            report
                .wins_by_column
                .entry(field.column.clone())
                .or_default()
                .bump(field.provenance);
        }
    }

    report
}
