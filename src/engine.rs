//! Grade aggregation: weighted averages, per-group breakdowns,
//! descriptive statistics and band classification.
//!
//! Everything here is a pure function over a borrowed snapshot of
//! records. Records whose score or weight is missing are skipped, and an
//! undefined aggregate is reported as `None` rather than zero.

use std::collections::BTreeMap;

use crate::models::{
    Band, GradeRecord, Graded, Statistics, SubjectSummary, TermAverage, WeightShare, TERMS,
};

pub const PASS_MARK: f64 = 10.0;
pub const EXCELLENCE_MARK: f64 = 16.0;
pub const STRONG_THRESHOLD: f64 = 16.0;
pub const FAIR_THRESHOLD: f64 = 12.0;

/// Best-effort numeric read of a stored field.
///
/// Accepts surrounding whitespace and a decimal comma. Empty, unparsable
/// and non-finite input all map to `None`.
pub fn parse_optional_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: f64 = trimmed.replace(',', ".").parse().ok()?;
    value.is_finite().then_some(value)
}

fn usable<R: Graded>(record: &R) -> Option<(f64, f64)> {
    let score = record.score().filter(|v| v.is_finite())?;
    let weight = record.weight().filter(|v| v.is_finite())?;
    Some((score, weight))
}

pub fn weighted_average<'a, R, I>(records: I) -> Option<f64>
where
    R: Graded + 'a,
    I: IntoIterator<Item = &'a R>,
{
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    let mut included = 0usize;

    for record in records {
        let Some((score, weight)) = usable(record) else {
            continue;
        };
        weighted_sum += score * weight;
        total_weight += weight;
        included += 1;
    }

    if included == 0 || total_weight == 0.0 {
        return None;
    }
    Some(weighted_sum / total_weight)
}

/// Weighted average per key. Every key seen in the input is present in
/// the result, mapped to `None` when its average is undefined.
pub fn group_average<'a, R, I, K, F>(records: I, key_fn: F) -> BTreeMap<K, Option<f64>>
where
    R: Graded + 'a,
    I: IntoIterator<Item = &'a R>,
    K: Ord,
    F: Fn(&R) -> K,
{
    let mut groups: BTreeMap<K, Vec<&'a R>> = BTreeMap::new();
    for record in records {
        groups.entry(key_fn(record)).or_default().push(record);
    }

    groups
        .into_iter()
        .map(|(key, members)| (key, weighted_average(members)))
        .collect()
}

fn compute_median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[(n / 2) - 1] + sorted[n / 2]) / 2.0
    }
}

/// Unweighted statistics over every record with a usable score.
/// Placeholder rows are left out.
pub fn descriptive_statistics<'a, R, I>(records: I) -> Option<Statistics>
where
    R: Graded + 'a,
    I: IntoIterator<Item = &'a R>,
{
    let mut scores: Vec<f64> = records
        .into_iter()
        .filter(|record| !record.is_placeholder())
        .filter_map(|record| record.score())
        .filter(|score| score.is_finite())
        .collect();

    if scores.is_empty() {
        return None;
    }
    scores.sort_by(|a, b| a.total_cmp(b));

    let count = scores.len();
    let n = count as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let std_dev = (count >= 2).then(|| {
        let squared: f64 = scores.iter().map(|score| (score - mean).powi(2)).sum();
        (squared / (n - 1.0)).sqrt()
    });
    let passed = scores.iter().filter(|score| **score >= PASS_MARK).count();
    let excellent = scores.iter().filter(|score| **score >= EXCELLENCE_MARK).count();

    Some(Statistics {
        count,
        mean,
        median: compute_median(&scores),
        min: scores[0],
        max: scores[count - 1],
        std_dev,
        pass_rate: passed as f64 / n,
        excellence_rate: excellent as f64 / n,
    })
}

pub fn classify(average: Option<f64>) -> Band {
    match average {
        None => Band::Unknown,
        Some(value) if value >= STRONG_THRESHOLD => Band::Strong,
        Some(value) if value >= FAIR_THRESHOLD => Band::Fair,
        Some(_) => Band::Weak,
    }
}

/// Average for each term in [`TERMS`], in term order.
pub fn term_trend(records: &[GradeRecord]) -> Vec<TermAverage> {
    TERMS
        .iter()
        .map(|term| {
            let average =
                weighted_average(records.iter().filter(|record| record.term == *term));
            TermAverage {
                term: term.to_string(),
                average,
                band: classify(average),
            }
        })
        .collect()
}

pub fn subject_breakdown(records: &[GradeRecord]) -> Vec<SubjectSummary> {
    let mut by_subject: BTreeMap<&str, Vec<&GradeRecord>> = BTreeMap::new();
    for record in records.iter().filter(|record| !record.is_placeholder()) {
        by_subject
            .entry(record.subject.as_str())
            .or_default()
            .push(record);
    }

    by_subject
        .into_iter()
        .map(|(subject, members)| SubjectSummary {
            subject: subject.to_string(),
            grade_count: members.len(),
            total_weight: members
                .iter()
                .filter_map(|record| usable(*record))
                .map(|(_, weight)| weight)
                .sum(),
            average: weighted_average(members),
        })
        .collect()
}

/// Each subject's share of the total weight. Subjects whose weights do
/// not add up to something positive are dropped.
pub fn weight_shares(records: &[GradeRecord]) -> Vec<WeightShare> {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for record in records.iter().filter(|record| !record.is_placeholder()) {
        if let Some((_, weight)) = usable(record) {
            *totals.entry(record.subject.as_str()).or_insert(0.0) += weight;
        }
    }
    totals.retain(|_, total| *total > 0.0);

    let grand_total: f64 = totals.values().sum();
    totals
        .into_iter()
        .map(|(subject, total_weight)| WeightShare {
            subject: subject.to_string(),
            total_weight,
            share: total_weight / grand_total,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grade(subject: &str, score: f64, weight: f64) -> GradeRecord {
        GradeRecord {
            id: crate::models::new_id(),
            student: "Avery Lee".to_string(),
            subject: subject.to_string(),
            score: Some(score),
            weight: Some(weight),
            term: "1".to_string(),
            date: None,
            comment: None,
        }
    }

    fn in_term(mut record: GradeRecord, term: &str) -> GradeRecord {
        record.term = term.to_string();
        record
    }

    fn sample() -> Vec<GradeRecord> {
        vec![
            grade("Math", 14.0, 1.0),
            grade("Math", 18.0, 2.0),
            grade("French", 10.0, 1.0),
        ]
    }

    #[test]
    fn parses_numbers_leniently() {
        assert_eq!(parse_optional_number(" 12.5 "), Some(12.5));
        assert_eq!(parse_optional_number("12,5"), Some(12.5));
        assert_eq!(parse_optional_number(""), None);
        assert_eq!(parse_optional_number("abc"), None);
        assert_eq!(parse_optional_number("NaN"), None);
        assert_eq!(parse_optional_number("inf"), None);
    }

    #[test]
    fn weighted_average_of_mixed_subjects() {
        let records = sample();
        let average = weighted_average(&records).unwrap();
        assert!((average - 15.0).abs() < 1e-9);
        assert_eq!(classify(Some(average)), Band::Fair);
    }

    #[test]
    fn empty_and_zero_weight_have_no_average() {
        let none: Vec<GradeRecord> = Vec::new();
        assert_eq!(weighted_average(&none), None);
        assert_eq!(weighted_average(&[grade("Math", 15.0, 0.0)]), None);
    }

    #[test]
    fn unusable_records_are_skipped() {
        let mut missing_score = grade("Math", 0.0, 3.0);
        missing_score.score = None;
        let mut missing_weight = grade("Math", 2.0, 1.0);
        missing_weight.weight = None;
        let records = vec![missing_score, missing_weight, grade("Math", 12.0, 1.0)];
        assert_eq!(weighted_average(&records), Some(12.0));
    }

    #[test]
    fn groups_by_subject() {
        let records = sample();
        let averages = group_average(&records, |record: &GradeRecord| record.subject.clone());
        assert_eq!(averages.len(), 2);
        let math = averages["Math"].unwrap();
        assert!((math - 50.0 / 3.0).abs() < 1e-9);
        assert_eq!(averages["French"], Some(10.0));
    }

    #[test]
    fn groups_keep_keys_without_an_average() {
        let records = vec![grade("Math", 14.0, 1.0), grade("Art", 9.0, 0.0)];
        let averages = group_average(&records, |record: &GradeRecord| record.subject.clone());
        assert_eq!(averages.len(), 2);
        assert_eq!(averages["Art"], None);
    }

    #[test]
    fn classify_boundaries() {
        assert_eq!(classify(Some(16.0)), Band::Strong);
        assert_eq!(classify(Some(15.99)), Band::Fair);
        assert_eq!(classify(Some(12.0)), Band::Fair);
        assert_eq!(classify(Some(11.99)), Band::Weak);
        assert_eq!(classify(None), Band::Unknown);
        assert_eq!(Band::Strong.colour(), "green");
    }

    #[test]
    fn statistics_of_nothing_is_empty() {
        let none: Vec<GradeRecord> = Vec::new();
        assert_eq!(descriptive_statistics(&none), None);
    }

    #[test]
    fn statistics_of_single_score() {
        let stats = descriptive_statistics(&[grade("Math", 13.0, 0.0)]).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.mean, 13.0);
        assert_eq!(stats.min, 13.0);
        assert_eq!(stats.max, 13.0);
        assert_eq!(stats.median, 13.0);
        assert_eq!(stats.std_dev, None);
    }

    #[test]
    fn statistics_over_several_scores() {
        let records = vec![
            grade("Math", 8.0, 1.0),
            grade("Math", 12.0, 1.0),
            grade("French", 16.0, 1.0),
            grade("French", 18.0, 1.0),
            GradeRecord::placeholder("Avery Lee"),
        ];
        let stats = descriptive_statistics(&records).unwrap();
        assert_eq!(stats.count, 4);
        assert!((stats.mean - 13.5).abs() < 1e-9);
        assert!((stats.median - 14.0).abs() < 1e-9);
        assert_eq!(stats.min, 8.0);
        assert_eq!(stats.max, 18.0);
        // sample variance: (30.25 + 2.25 + 6.25 + 20.25) / 3
        let expected = (59.0_f64 / 3.0).sqrt();
        assert!((stats.std_dev.unwrap() - expected).abs() < 1e-9);
        assert_eq!(stats.pass_rate, 0.75);
        assert_eq!(stats.excellence_rate, 0.5);
    }

    #[test]
    fn subjectless_graded_row_is_not_a_placeholder() {
        let records = vec![
            grade("", 15.0, 2.0),
            grade("Math", 9.0, 2.0),
            GradeRecord::placeholder("Avery Lee"),
        ];
        assert_eq!(weighted_average(&records), Some(12.0));

        let stats = descriptive_statistics(&records).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, 12.0);

        let breakdown = subject_breakdown(&records);
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].subject, "");
        assert_eq!(breakdown[0].average, Some(15.0));
        assert_eq!(weight_shares(&records).len(), 2);
    }

    #[test]
    fn term_trend_covers_every_term() {
        let records = vec![
            in_term(grade("Math", 12.0, 1.0), "1"),
            in_term(grade("Math", 17.0, 1.0), "3"),
        ];
        let trend = term_trend(&records);
        assert_eq!(trend.len(), 3);
        assert_eq!(trend[0].average, Some(12.0));
        assert_eq!(trend[1].average, None);
        assert_eq!(trend[1].band, Band::Unknown);
        assert_eq!(trend[2].band, Band::Strong);
    }

    #[test]
    fn subject_breakdown_skips_placeholders() {
        let mut records = sample();
        records.push(GradeRecord::placeholder("Avery Lee"));
        let breakdown = subject_breakdown(&records);
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].subject, "French");
        assert_eq!(breakdown[1].grade_count, 2);
        assert_eq!(breakdown[1].total_weight, 3.0);
    }

    #[test]
    fn weight_shares_drop_empty_subjects() {
        let mut records = sample();
        records.push(grade("Art", 15.0, 0.0));
        let shares = weight_shares(&records);
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].subject, "French");
        assert!((shares[0].share - 0.25).abs() < 1e-9);
        assert!((shares[1].share - 0.75).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn average_stays_within_score_range(
            grades in prop::collection::vec((0.0f64..=20.0, 0.1f64..10.0), 1..40)
        ) {
            let records: Vec<GradeRecord> =
                grades.iter().map(|(s, w)| grade("Math", *s, *w)).collect();
            let average = weighted_average(&records).unwrap();
            let min = grades.iter().map(|(s, _)| *s).fold(f64::INFINITY, f64::min);
            let max = grades.iter().map(|(s, _)| *s).fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(average >= min - 1e-9);
            prop_assert!(average <= max + 1e-9);
        }

        #[test]
        fn average_ignores_record_order(
            grades in prop::collection::vec((0.0f64..=20.0, 0.0f64..10.0), 0..40),
            shift in 0usize..40
        ) {
            let records: Vec<GradeRecord> =
                grades.iter().map(|(s, w)| grade("Math", *s, *w)).collect();
            let mut reordered = records.clone();
            reordered.reverse();
            if !reordered.is_empty() {
                let len = reordered.len();
                reordered.rotate_left(shift % len);
            }
            match (weighted_average(&records), weighted_average(&reordered)) {
                (Some(a), Some(b)) => prop_assert!((a - b).abs() < 1e-9),
                (a, b) => prop_assert_eq!(a, b),
            }
        }
    }
}
