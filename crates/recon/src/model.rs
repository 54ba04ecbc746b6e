use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::{Record, Value};

// ---------------------------------------------------------------------------
// Sides
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Target,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Self::Source => Self::Target,
            Self::Target => Self::Source,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    SourceOnly,
    TargetOnly,
    MatchedExact,
    MatchedFuzzy,
    Ambiguous,
}

impl PairStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceOnly => "source_only",
            Self::TargetOnly => "target_only",
            Self::MatchedExact => "matched_exact",
            Self::MatchedFuzzy => "matched_fuzzy",
            Self::Ambiguous => "ambiguous",
        }
    }
}

impl std::fmt::Display for PairStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One compared column of a matched pair.
#[derive(Debug, Clone, Serialize)]
pub struct FieldComparison {
    pub column: String,
    pub source: Value,
    pub target: Value,
    pub equal: bool,
}

/// A fuzzy candidate withheld from auto-assignment.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub target_key: Option<String>,
    pub target_row: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairingEntry {
    pub status: PairStatus,
    pub key: Option<String>,
    pub source: Option<Record>,
    pub target: Option<Record>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub comparisons: Vec<FieldComparison>,
    /// Fuzzy similarity: the pair score for `matched_fuzzy`, the best score
    /// for `ambiguous` and for records left unmatched by the fuzzy stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<Candidate>,
    /// Emitted one-sided because an earlier row holds the same key.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

impl PairingEntry {
    pub fn one_sided(record: Record, duplicate: bool) -> Self {
        let (status, source, target) = match record.side {
            Side::Source => (PairStatus::SourceOnly, Some(record), None),
            Side::Target => (PairStatus::TargetOnly, None, Some(record)),
        };
        let key = source.as_ref().or(target.as_ref()).and_then(|r| r.key.clone());
        Self {
            status,
            key,
            source,
            target,
            comparisons: Vec::new(),
            score: None,
            candidates: Vec::new(),
            duplicate,
        }
    }

    pub fn has_mismatches(&self) -> bool {
        self.comparisons.iter().any(|c| !c.equal)
    }

    pub fn mismatched_columns(&self) -> impl Iterator<Item = &str> {
        self.comparisons.iter().filter(|c| !c.equal).map(|c| c.column.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateKey {
    pub side: Side,
    pub key: String,
    /// Rows sharing the key, the paired first occurrence included.
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SideCounts {
    pub source: usize,
    pub target: usize,
}

impl SideCounts {
    pub fn bump(&mut self, side: Side) {
        match side {
            Side::Source => self.source += 1,
            Side::Target => self.target += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PairingResult {
    pub key_column: String,
    pub compare_columns: Vec<String>,
    pub source_records: usize,
    pub target_records: usize,
    pub entries: Vec<PairingEntry>,
    pub duplicates: Vec<DuplicateKey>,
    pub missing_keys: SideCounts,
}

impl PairingResult {
    /// Remove the one-sided entries that are still open to fuzzy matching,
    /// returning their records in entry order. Duplicate extras stay put:
    /// their key already matched exactly.
    pub fn take_unmatched(&mut self) -> (Vec<Record>, Vec<Record>) {
        let mut source = Vec::new();
        let mut target = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());

        for entry in self.entries.drain(..) {
            match entry.status {
                PairStatus::SourceOnly if !entry.duplicate => source.extend(entry.source),
                PairStatus::TargetOnly if !entry.duplicate => target.extend(entry.target),
                _ => kept.push(entry),
            }
        }

        self.entries = kept;
        (source, target)
    }

    pub fn count(&self, status: PairStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Source,
    Target,
    BothEqual,
    /// Both sides missing.
    None,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
            Self::BothEqual => "both_equal",
            Self::None => "none",
        }
    }
}

impl From<Side> for Provenance {
    fn from(side: Side) -> Self {
        match side {
            Side::Source => Self::Source,
            Side::Target => Self::Target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    Both,
    SourceOnly,
    TargetOnly,
}

impl RecordOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Both => "both",
            Self::SourceOnly => "source_only",
            Self::TargetOnly => "target_only",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MergedField {
    pub column: String,
    pub value: Value,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergedRecord {
    pub key: Option<String>,
    pub origin: RecordOrigin,
    pub status: PairStatus,
    pub fields: Vec<MergedField>,
}

impl MergedRecord {
    pub fn field(&self, column: &str) -> Option<&MergedField> {
        self.fields.iter().find(|f| f.column == column)
    }
}

/// Both sides carried a value and they disagreed.
#[derive(Debug, Clone, Serialize)]
pub struct FieldConflict {
    pub key: Option<String>,
    pub column: String,
    pub source: Value,
    pub target: Value,
    pub chosen: Value,
    pub chosen_from: Side,
    pub priority: [Side; 2],
}

/// An ambiguous fuzzy match held back for manual resolution.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewItem {
    pub source_key: Option<String>,
    pub source_row: usize,
    pub best_score: Option<f64>,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeOutput {
    pub columns: Vec<String>,
    pub records: Vec<MergedRecord>,
    pub conflicts: Vec<FieldConflict>,
    pub manual_review: Vec<ReviewItem>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconWarning {
    DuplicateKey { side: Side, key: String, count: usize },
    AmbiguousMatch { source_key: Option<String>, source_row: usize, candidates: usize },
    MissingKey { side: Side, row: usize },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProvenanceCounts {
    pub source: usize,
    pub target: usize,
    pub both_equal: usize,
    pub none: usize,
}

impl ProvenanceCounts {
    pub fn bump(&mut self, provenance: Provenance) {
        match provenance {
            Provenance::Source => self.source += 1,
            Provenance::Target => self.target += 1,
            Provenance::BothEqual => self.both_equal += 1,
            Provenance::None => self.none += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub source_records: usize,
    pub target_records: usize,
    pub matched: usize,
    pub matched_exact: usize,
    pub matched_fuzzy: usize,
    pub source_only: usize,
    pub target_only: usize,
    pub ambiguous: usize,
    pub pairs_with_mismatches: usize,
    pub mismatches_by_column: BTreeMap<String, usize>,
    /// Extra rows emitted one-sided because their key was already taken.
    pub duplicate_keys: SideCounts,
    pub missing_key_rows: SideCounts,
    pub merged_records: usize,
    pub field_conflicts: usize,
    pub wins_by_column: BTreeMap<String, ProvenanceCounts>,
    pub warnings: Vec<ReconWarning>,
}

impl SummaryReport {
    /// Anything short of a clean one-to-one, all-fields-equal reconciliation.
    pub fn has_differences(&self) -> bool {
        self.pairs_with_mismatches > 0 || self.source_only > 0 || self.target_only > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub engine_version: String,
    pub key_column: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: SummaryReport,
    pub pairing: PairingResult,
    pub merge: MergeOutput,
}
