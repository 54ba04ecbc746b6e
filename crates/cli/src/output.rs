//! Output files: reconciliation, merged, conflicts and review CSVs plus the
//! JSON summary.

use std::path::{Path, PathBuf};

use recmerge_recon::model::{ReconMeta, SummaryReport};
use recmerge_recon::{ReconResult, Side};
use serde::Serialize;

use crate::exit_codes::EXIT_RECON_IO;
use crate::CliError;

pub const RECONCILIATION_CSV: &str = "reconciliation.csv";
pub const MERGED_CSV: &str = "merged.csv";
pub const CONFLICTS_CSV: &str = "conflicts.csv";
pub const REVIEW_CSV: &str = "review.csv";
pub const SUMMARY_JSON: &str = "summary.json";

fn io_err(msg: impl Into<String>) -> CliError {
    CliError { code: EXIT_RECON_IO, message: msg.into(), hint: None }
}

/// Full engine result stamped with the wall-clock run time.
#[derive(Serialize)]
pub struct RunReport<'a> {
    pub run_at: String,
    #[serde(flatten)]
    pub result: &'a ReconResult,
}

#[derive(Serialize)]
struct SummaryFile<'a> {
    run_at: &'a str,
    meta: &'a ReconMeta,
    summary: &'a SummaryReport,
}

fn score_text(score: Option<f64>) -> String {
    score.map(|s| format!("{s:.4}")).unwrap_or_default()
}

fn priority_text(priority: &[Side; 2]) -> String {
    format!("{}>{}", priority[0], priority[1])
}

// ============================================================================
// CSV formatting
// ============================================================================

/// One row per pairing entry, with both sides' values for every compare column.
pub fn format_reconciliation_csv(result: &ReconResult) -> Result<Vec<u8>, CliError> {
    let pairing = &result.pairing;
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

    let mut header: Vec<String> = [
        "record_key", "status", "duplicate", "mismatch_columns", "score", "source_row", "target_row",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for column in &pairing.compare_columns {
        header.push(format!("source_{column}"));
        header.push(format!("target_{column}"));
    }
    writer.write_record(&header).map_err(|e| io_err(e.to_string()))?;

    for entry in &pairing.entries {
        let mut row = vec![
            entry.key.clone().unwrap_or_default(),
            entry.status.as_str().to_string(),
            entry.duplicate.to_string(),
            entry.mismatched_columns().collect::<Vec<_>>().join("|"),
            score_text(entry.score),
            entry.source.as_ref().map(|r| (r.row + 1).to_string()).unwrap_or_default(),
            entry.target.as_ref().map(|r| (r.row + 1).to_string()).unwrap_or_default(),
        ];
        for column in &pairing.compare_columns {
            row.push(entry.source.as_ref().map(|r| r.value(column).to_string()).unwrap_or_default());
            row.push(entry.target.as_ref().map(|r| r.value(column).to_string()).unwrap_or_default());
        }
        writer.write_record(&row).map_err(|e| io_err(e.to_string()))?;
    }

    writer.into_inner().map_err(|e| io_err(e.to_string()))
}

/// Survivorship output: key, origin, merged values, then per-column provenance.
pub fn format_merged_csv(result: &ReconResult) -> Result<Vec<u8>, CliError> {
    let merge = &result.merge;
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

    let mut header = vec![
        result.meta.key_column.clone(),
        "record_origin".to_string(),
        "match_status".to_string(),
    ];
    header.extend(merge.columns.iter().cloned());
    header.extend(merge.columns.iter().map(|c| format!("source_of_{c}")));
    writer.write_record(&header).map_err(|e| io_err(e.to_string()))?;

    for record in &merge.records {
        let mut row = vec![
            record.key.clone().unwrap_or_default(),
            record.origin.as_str().to_string(),
            record.status.as_str().to_string(),
        ];
        row.extend(record.fields.iter().map(|f| f.value.to_string()));
        row.extend(record.fields.iter().map(|f| f.provenance.as_str().to_string()));
        writer.write_record(&row).map_err(|e| io_err(e.to_string()))?;
    }

    writer.into_inner().map_err(|e| io_err(e.to_string()))
}

pub fn format_conflicts_csv(result: &ReconResult) -> Result<Vec<u8>, CliError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

    writer.write_record(&[
        "record_key", "column", "source_value", "target_value",
        "chosen_value", "chosen_from", "priority",
    ]).map_err(|e| io_err(e.to_string()))?;

    for c in &result.merge.conflicts {
        writer.write_record(&[
            c.key.clone().unwrap_or_default(),
            c.column.clone(),
            c.source.to_string(),
            c.target.to_string(),
            c.chosen.to_string(),
            c.chosen_from.to_string(),
            priority_text(&c.priority),
        ]).map_err(|e| io_err(e.to_string()))?;
    }

    writer.into_inner().map_err(|e| io_err(e.to_string()))
}

/// Ambiguous fuzzy matches with their close candidates.
pub fn format_review_csv(result: &ReconResult) -> Result<Vec<u8>, CliError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

    writer.write_record(&[
        "source_key", "source_row", "best_score",
        "candidate_count", "candidate_keys", "candidate_scores",
    ]).map_err(|e| io_err(e.to_string()))?;

    for item in &result.merge.manual_review {
        let keys: Vec<String> = item
            .candidates
            .iter()
            .map(|c| c.target_key.clone().unwrap_or_else(|| format!("target row {}", c.target_row + 1)))
            .collect();
        let scores: Vec<String> = item.candidates.iter().map(|c| format!("{:.4}", c.score)).collect();
        writer.write_record(&[
            item.source_key.clone().unwrap_or_default(),
            (item.source_row + 1).to_string(),
            score_text(item.best_score),
            item.candidates.len().to_string(),
            keys.join("|"),
            scores.join("|"),
        ]).map_err(|e| io_err(e.to_string()))?;
    }

    writer.into_inner().map_err(|e| io_err(e.to_string()))
}

// ============================================================================
// Writing
// ============================================================================

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    std::fs::write(path, bytes).map_err(|e| io_err(format!("{}: {}", path.display(), e)))
}

/// Write every output file into `out_dir`, creating it if needed. Returns the
/// paths written, in a stable order.
pub fn write_outputs(out_dir: &Path, result: &ReconResult, run_at: &str) -> Result<Vec<PathBuf>, CliError> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| io_err(format!("cannot create {}: {e}", out_dir.display())))?;

    let files = [
        (RECONCILIATION_CSV, format_reconciliation_csv(result)?),
        (MERGED_CSV, format_merged_csv(result)?),
        (CONFLICTS_CSV, format_conflicts_csv(result)?),
        (REVIEW_CSV, format_review_csv(result)?),
    ];

    let mut written = Vec::with_capacity(files.len() + 1);
    for (name, bytes) in &files {
        let path = out_dir.join(name);
        write_file(&path, bytes)?;
        written.push(path);
    }

    let summary = SummaryFile { run_at, meta: &result.meta, summary: &result.summary };
    let mut json = serde_json::to_string_pretty(&summary)
        .map_err(|e| io_err(format!("JSON serialization error: {e}")))?;
    json.push('\n');
    let path = out_dir.join(SUMMARY_JSON);
    write_file(&path, json.as_bytes())?;
    written.push(path);

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recmerge_recon::{run, Dataset, ReconConfig};

    fn sample() -> ReconResult {
        let mut config = ReconConfig::for_key("student_id");
        config.compare = vec!["status".into(), "department".into()];
        let columns = ["student_id", "status", "department"];
        let source = Dataset::from_rows(&columns, &[&["STU001", "open", "CS"], &["STU060", "closed", "Art, Design"]]);
        let target = Dataset::from_rows(&columns, &[&["STU001", "closed", "CS"], &["STU025", "open", ""]]);
        run(&config, &source, &target).unwrap()
    }

    fn lines(bytes: Vec<u8>) -> Vec<String> {
        String::from_utf8(bytes).unwrap().lines().map(String::from).collect()
    }

    #[test]
    fn reconciliation_rows() {
        let out = lines(format_reconciliation_csv(&sample()).unwrap());
        assert_eq!(
            out[0],
            "record_key,status,duplicate,mismatch_columns,score,source_row,target_row,\
             source_status,target_status,source_department,target_department"
        );
        assert_eq!(out[1], "STU001,matched_exact,false,status,,1,1,open,closed,CS,CS");
        assert_eq!(out[2], "STU060,source_only,false,,,2,,closed,,\"Art, Design\",");
        assert_eq!(out[3], "STU025,target_only,false,,,,2,,open,,");
    }

    #[test]
    fn merged_rows_carry_provenance() {
        let out = lines(format_merged_csv(&sample()).unwrap());
        assert_eq!(
            out[0],
            "student_id,record_origin,match_status,status,department,source_of_status,source_of_department"
        );
        assert_eq!(out[1], "STU001,both,matched_exact,closed,CS,target,both_equal");
        assert_eq!(out[3], "STU025,target_only,target_only,open,,target,none");
    }

    #[test]
    fn conflicts_rows() {
        let out = lines(format_conflicts_csv(&sample()).unwrap());
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], "STU001,status,open,closed,closed,target,target>source");
    }

    #[test]
    fn review_header_only_without_ambiguity() {
        let out = lines(format_review_csv(&sample()).unwrap());
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("source_key,source_row,best_score"));
    }

    #[test]
    fn write_outputs_creates_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("nested/out");
        let written = write_outputs(&out_dir, &sample(), "2026-01-01T00:00:00+00:00").unwrap();
        assert_eq!(written.len(), 5);
        for path in &written {
            assert!(path.exists(), "{} missing", path.display());
        }

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out_dir.join(SUMMARY_JSON)).unwrap()).unwrap();
        assert_eq!(summary["run_at"], "2026-01-01T00:00:00+00:00");
        assert_eq!(summary["summary"]["matched_exact"], 1);
        assert_eq!(summary["meta"]["key_column"], "student_id");
    }

    #[test]
    fn run_report_flattens_result() {
        let result = sample();
        let report = RunReport { run_at: "now".into(), result: &result };
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["run_at"], "now");
        assert!(json["pairing"]["entries"].is_array());
        assert!(json["merge"]["records"].is_array());
    }
}
