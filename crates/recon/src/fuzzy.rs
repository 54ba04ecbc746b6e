// Fuzzy matching of records left over by the exact key join.
//
// Scoring is a weighted mean of per-field Indel similarities. Assignment is
// greedy over a full score matrix; sources with a near-tie for their best
// candidate are withheld as ambiguous before any assignment happens.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use rapidfuzz::distance::indel;

use crate::config::FuzzyConfig;
use crate::error::ReconError;
use crate::model::{Candidate, PairStatus, PairingEntry};
use crate::reconcile::CompareOptions;
use crate::record::{Record, Value};

/// Absorbs float noise when comparing a score gap to the margin.
const EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Lower-cased, whitespace-collapsed text of a value; `None` when missing.
fn field_text(value: &Value) -> Option<String> {
    if value.is_missing() {
        return None;
    }
    let text = value.to_string().to_lowercase();
    Some(text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Normalized Indel similarity in [0, 1]. Two empty strings score 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    indel::normalized_similarity(a.chars(), b.chars())
}

/// Composite similarity of one source/target pair.
///
/// Fields missing on both sides are skipped; a field missing on one side
/// scores 0. The boost applies when the boost column holds the same
/// non-missing value on both sides. The result is capped at 1.0.
pub fn pair_score(
    source: &Record,
    target: &Record,
    settings: &FuzzyConfig,
    case_insensitive: bool,
) -> f64 {
    let mut total = 0.0;
    let mut weight_sum = 0.0;

    for field in &settings.fields {
        let weight = settings.weight(field);
        match (field_text(source.value(field)), field_text(target.value(field))) {
            (None, None) => continue,
            (Some(a), Some(b)) => total += weight * similarity(&a, &b),
            _ => {}
        }
        weight_sum += weight;
    }

    if weight_sum == 0.0 {
        return 0.0;
    }

    let mut score = total / weight_sum;
    if let Some(ref boost) = settings.boost {
        let s = source.value(&boost.column);
        if !s.is_missing() && s.equivalent(target.value(&boost.column), case_insensitive) {
            score += boost.amount;
        }
    }
    score.min(1.0)
}

// ---------------------------------------------------------------------------
// Matrix + Assignment
// ---------------------------------------------------------------------------

/// Dense source × target score matrix.
#[derive(Debug, Clone)]
pub struct ScoreMatrix {
    sources: usize,
    targets: usize,
    scores: Vec<f64>,
}

impl ScoreMatrix {
    pub fn build(sources: usize, targets: usize, mut score: impl FnMut(usize, usize) -> f64) -> Self {
        let mut scores = Vec::with_capacity(sources * targets);
        for i in 0..sources {
            for j in 0..targets {
                scores.push(score(i, j));
            }
        }
        Self {
            sources,
            targets,
            scores,
        }
    }

    pub fn get(&self, source: usize, target: usize) -> f64 {
        self.scores[source * self.targets + target]
    }

    fn row(&self, source: usize) -> &[f64] {
        &self.scores[source * self.targets..(source + 1) * self.targets]
    }

    fn best_for_source(&self, source: usize) -> Option<f64> {
        self.row(source).iter().copied().max_by(f64::total_cmp)
    }

    fn best_for_target(&self, target: usize) -> Option<f64> {
        (0..self.sources).map(|i| self.get(i, target)).max_by(f64::total_cmp)
    }
}

#[derive(Debug, Default)]
pub struct Assignment {
    /// `(source, target, score)` in assignment order.
    pub pairs: Vec<(usize, usize, f64)>,
    /// Withheld sources with their close candidates, best first.
    pub ambiguous: Vec<(usize, Vec<(usize, f64)>)>,
}

/// Resolve a score matrix into pairs.
///
/// Indices double as tie-break order: on equal scores the lower source index
/// wins, then the lower target index. Callers sort their records first.
pub fn assign(matrix: &ScoreMatrix, threshold: f64, margin: f64) -> Assignment {
    let mut out = Assignment::default();
    let mut withheld = vec![false; matrix.sources];

    for i in 0..matrix.sources {
        let mut ranked: Vec<(usize, f64)> = matrix.row(i).iter().copied().enumerate().collect();
        ranked.sort_by_key(|&(j, s)| (Reverse(OrderedFloat(s)), j));

        let (best, second) = match ranked.as_slice() {
            [(_, best), (_, second), ..] => (*best, *second),
            _ => continue,
        };
        if best < threshold || best - second > margin + EPSILON {
            continue;
        }

        let close = ranked
            .into_iter()
            .take_while(|&(_, s)| best - s <= margin + EPSILON)
            .collect();
        withheld[i] = true;
        out.ambiguous.push((i, close));
    }

    let mut triples: Vec<(usize, usize, f64)> = Vec::new();
    for i in (0..matrix.sources).filter(|&i| !withheld[i]) {
        for (j, &s) in matrix.row(i).iter().enumerate() {
            if s >= threshold {
                triples.push((i, j, s));
            }
        }
    }
    triples.sort_by_key(|&(i, j, s)| (Reverse(OrderedFloat(s)), i, j));

    let mut source_used = vec![false; matrix.sources];
    let mut target_used = vec![false; matrix.targets];
    for (i, j, s) in triples {
        if source_used[i] || target_used[j] {
            continue;
        }
        source_used[i] = true;
        target_used[j] = true;
        out.pairs.push((i, j, s));
    }

    out
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Keyed records in key order, then keyless records in row order.
fn sort_records(records: &mut [Record]) {
    records.sort_by(|a, b| {
        (a.key.is_none(), a.key.as_deref(), a.row).cmp(&(b.key.is_none(), b.key.as_deref(), b.row))
    });
}

/// Pair the records the exact join left unmatched.
///
/// Returns one entry per input record (matched pairs count once): matched
/// pairs in assignment order, then ambiguous sources, then whatever stayed
/// unmatched on either side.
pub fn fuzzy_match(
    mut source: Vec<Record>,
    mut target: Vec<Record>,
    settings: &FuzzyConfig,
    compare: &CompareOptions,
) -> Result<Vec<PairingEntry>, ReconError> {
    settings.check()?;

    sort_records(&mut source);
    sort_records(&mut target);

    let matrix = ScoreMatrix::build(source.len(), target.len(), |i, j| {
        pair_score(&source[i], &target[j], settings, compare.case_insensitive)
    });
    let assignment = assign(&matrix, settings.threshold, settings.ambiguity_margin);

    let mut source_done = vec![false; source.len()];
    let mut target_done = vec![false; target.len()];
    let mut entries = Vec::with_capacity(source.len() + target.len());

    for &(i, j, score) in &assignment.pairs {
        source_done[i] = true;
        target_done[j] = true;
        log::debug!(
            "fuzzy: {} ~ {} ({score:.3})",
            source[i].label(),
            target[j].label()
        );
        entries.push(compare.matched_pair(PairStatus::MatchedFuzzy, &source[i], &target[j], Some(score)));
    }

    for (i, close) in &assignment.ambiguous {
        let record = &source[*i];
        source_done[*i] = true;
        log::warn!(
            "ambiguous fuzzy match for {}: {} candidates within margin {}",
            record.label(),
            close.len(),
            settings.ambiguity_margin
        );
        entries.push(PairingEntry {
            status: PairStatus::Ambiguous,
            key: record.key.clone(),
            source: Some(record.clone()),
            target: None,
            comparisons: Vec::new(),
            score: close.first().map(|&(_, s)| s),
            candidates: close
                .iter()
                .map(|&(j, score)| Candidate {
                    target_key: target[j].key.clone(),
                    target_row: target[j].row,
                    score,
                })
                .collect(),
            duplicate: false,
        });
    }

    for (i, record) in source.into_iter().enumerate() {
        if !source_done[i] {
            let mut entry = PairingEntry::one_sided(record, false);
            entry.score = matrix.best_for_source(i);
            entries.push(entry);
        }
    }
    for (j, record) in target.into_iter().enumerate() {
        if !target_done[j] {
            let mut entry = PairingEntry::one_sided(record, false);
            entry.score = matrix.best_for_target(j);
            entries.push(entry);
        }
    }

    log::debug!(
        "fuzzy: {} matched, {} ambiguous",
        assignment.pairs.len(),
        assignment.ambiguous.len()
    );

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoostConfig, ReconConfig};
    use crate::model::Side;
    use crate::record::{normalize_dataset, Dataset};

    const COLUMNS: [&str; 5] = ["student_id", "first_name", "last_name", "department", "status"];

    fn settings() -> FuzzyConfig {
        FuzzyConfig {
            enabled: true,
            fields: vec!["first_name".into(), "last_name".into()],
            ..FuzzyConfig::default()
        }
    }

    fn compare() -> CompareOptions {
        CompareOptions {
            key_column: "student_id".into(),
            columns: vec!["first_name".into(), "last_name".into(), "status".into()],
            case_insensitive: false,
        }
    }

    fn records(side: Side, rows: &[&[&str]]) -> Vec<Record> {
        let config = ReconConfig::for_key("student_id");
        normalize_dataset(&Dataset::from_rows(&COLUMNS, rows), side, &config)
            .unwrap()
            .records
    }

    fn matrix(rows: &[&[f64]]) -> ScoreMatrix {
        let targets = rows.first().map_or(0, |r| r.len());
        ScoreMatrix::build(rows.len(), targets, |i, j| rows[i][j])
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(similarity("hopperton", "hopperton"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        let s = similarity("hopperton", "hoperton");
        assert!(s > 0.9 && s < 1.0);
    }

    #[test]
    fn one_character_typo_matches_at_default_threshold() {
        let source = records(Side::Source, &[&["STU030", "Grace", "Hopperton", "Maths", "open"]]);
        let target = records(Side::Target, &[&["STU031", "Grace", "Hoperton", "Maths", "open"]]);
        let entries = fuzzy_match(source, target, &settings(), &compare()).unwrap();

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.status, PairStatus::MatchedFuzzy);
        assert_eq!(entry.key.as_deref(), Some("STU030"));
        assert!(entry.score.unwrap() >= 0.86);
        assert_eq!(entry.mismatched_columns().collect::<Vec<_>>(), vec!["last_name"]);
    }

    #[test]
    fn normalization_ignores_case_and_spacing() {
        let source = records(Side::Source, &[&["A1", "  Mary  Ann ", "SMITH", "", ""]]);
        let target = records(Side::Target, &[&["B1", "mary ann", "smith", "", ""]]);
        assert_eq!(pair_score(&source[0], &target[0], &settings(), false), 1.0);
    }

    #[test]
    fn missing_fields_skipped_or_zeroed() {
        let source = records(Side::Source, &[&["A1", "Grace", "", "", ""]]);
        let both_missing = records(Side::Target, &[&["B1", "Grace", "", "", ""]]);
        let one_missing = records(Side::Target, &[&["B2", "Grace", "Hopper", "", ""]]);
        assert_eq!(pair_score(&source[0], &both_missing[0], &settings(), false), 1.0);
        assert_eq!(pair_score(&source[0], &one_missing[0], &settings(), false), 0.5);
    }

    #[test]
    fn weights_shift_the_mean() {
        let mut weighted = settings();
        weighted.weights.insert("last_name".into(), 3.0);
        let source = records(Side::Source, &[&["A1", "Grace", "Hopper", "", ""]]);
        let target = records(Side::Target, &[&["B1", "Xyz", "Hopper", "", ""]]);
        let plain = pair_score(&source[0], &target[0], &settings(), false);
        let heavy = pair_score(&source[0], &target[0], &weighted, false);
        assert!(heavy > plain);
    }

    #[test]
    fn boost_applies_on_equal_column_and_caps() {
        let mut boosted = settings();
        boosted.boost = Some(BoostConfig {
            column: "department".into(),
            amount: 0.06,
        });
        let source = records(Side::Source, &[&["A1", "Grace", "Hopperton", "Maths", ""]]);
        let same = records(Side::Target, &[&["B1", "Grace", "Hoperton", "Maths", ""]]);
        let other = records(Side::Target, &[&["B2", "Grace", "Hoperton", "Physics", ""]]);
        let exact = records(Side::Target, &[&["B3", "Grace", "Hopperton", "Maths", ""]]);

        let base = pair_score(&source[0], &other[0], &boosted, false);
        let with = pair_score(&source[0], &same[0], &boosted, false);
        assert!((with - (base + 0.06).min(1.0)).abs() < 1e-12);
        assert_eq!(pair_score(&source[0], &exact[0], &boosted, false), 1.0);
    }

    #[test]
    fn near_tie_is_ambiguous() {
        let out = assign(&matrix(&[&[0.90, 0.89]]), 0.86, 0.02);
        assert!(out.pairs.is_empty());
        assert_eq!(out.ambiguous.len(), 1);
        let (source, close) = &out.ambiguous[0];
        assert_eq!(*source, 0);
        assert_eq!(close.iter().map(|&(j, _)| j).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn clear_winner_is_not_ambiguous() {
        let out = assign(&matrix(&[&[0.95, 0.90]]), 0.86, 0.02);
        assert!(out.ambiguous.is_empty());
        assert_eq!(out.pairs, vec![(0, 0, 0.95)]);
    }

    #[test]
    fn ambiguity_needs_best_above_threshold() {
        let out = assign(&matrix(&[&[0.80, 0.79]]), 0.86, 0.02);
        assert!(out.ambiguous.is_empty());
        assert!(out.pairs.is_empty());
    }

    #[test]
    fn single_candidate_never_ambiguous() {
        let out = assign(&matrix(&[&[0.90]]), 0.86, 0.02);
        assert_eq!(out.pairs, vec![(0, 0, 0.90)]);
    }

    #[test]
    fn greedy_takes_highest_first() {
        let out = assign(&matrix(&[&[0.90, 0.88], &[0.95, 0.10]]), 0.86, 0.01);
        assert!(out.ambiguous.is_empty());
        assert_eq!(out.pairs, vec![(1, 0, 0.95), (0, 1, 0.88)]);
    }

    #[test]
    fn ties_break_on_index() {
        let out = assign(&matrix(&[&[0.95, 0.10], &[0.95, 0.10]]), 0.86, 0.02);
        assert_eq!(out.pairs, vec![(0, 0, 0.95)]);
    }

    #[test]
    fn ambiguous_source_leaves_targets_open() {
        let out = assign(&matrix(&[&[0.90, 0.89], &[0.10, 0.92]]), 0.86, 0.02);
        assert_eq!(out.ambiguous.len(), 1);
        assert_eq!(out.pairs, vec![(1, 1, 0.92)]);
    }

    #[test]
    fn ambiguous_entry_lists_candidates() {
        let source = records(Side::Source, &[&["STU050", "Jordan", "Lee", "", ""]]);
        let target = records(
            Side::Target,
            &[&["STU052", "Jordan", "Lee", "", ""], &["STU051", "Jordan", "Lee", "", ""]],
        );
        let entries = fuzzy_match(source, target, &settings(), &compare()).unwrap();

        let ambiguous = &entries[0];
        assert_eq!(ambiguous.status, PairStatus::Ambiguous);
        assert!(ambiguous.target.is_none());
        let keys: Vec<_> = ambiguous
            .candidates
            .iter()
            .map(|c| c.target_key.as_deref().unwrap())
            .collect();
        assert_eq!(keys, vec!["STU051", "STU052"]);
        assert_eq!(entries.iter().filter(|e| e.status == PairStatus::TargetOnly).count(), 2);
    }

    #[test]
    fn unmatched_records_carry_best_score() {
        let source = records(Side::Source, &[&["STU060", "Zed", "Quincy", "", ""]]);
        let target = records(Side::Target, &[&["STU025", "Elena", "Rossi", "", ""]]);
        let entries = fuzzy_match(source, target, &settings(), &compare()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, PairStatus::SourceOnly);
        assert_eq!(entries[1].status, PairStatus::TargetOnly);
        assert!(entries[0].score.unwrap() < 0.86);
    }

    #[test]
    fn keyless_source_takes_target_key() {
        let source = records(Side::Source, &[&["", "Ivan", "Petrov", "", ""]]);
        let target = records(Side::Target, &[&["STU040", "Ivan", "Petrov", "", ""]]);
        let entries = fuzzy_match(source, target, &settings(), &compare()).unwrap();
        assert_eq!(entries[0].status, PairStatus::MatchedFuzzy);
        assert_eq!(entries[0].key.as_deref(), Some("STU040"));
    }

    #[test]
    fn empty_sides() {
        let target = records(Side::Target, &[&["STU040", "Ivan", "Petrov", "", ""]]);
        let entries = fuzzy_match(Vec::new(), target, &settings(), &compare()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, PairStatus::TargetOnly);
        assert_eq!(entries[0].score, None);
    }

    #[test]
    fn rejects_bad_settings() {
        let mut bad = settings();
        bad.threshold = 1.5;
        let err = fuzzy_match(Vec::new(), Vec::new(), &bad, &compare()).unwrap_err();
        assert!(err.is_configuration());

        let mut no_fields = settings();
        no_fields.fields.clear();
        let err = fuzzy_match(Vec::new(), Vec::new(), &no_fields, &compare()).unwrap_err();
        assert!(err.to_string().contains("composite field"));
    }
}
