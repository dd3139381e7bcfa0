use std::fmt::Write;

use crate::engine;
use crate::models::GradeRecord;

fn format_average(average: Option<f64>) -> String {
    match average {
        Some(value) => format!("{value:.2}"),
        None => "n/a".to_string(),
    }
}

/// Markdown summary of one student's grades. `records` is expected to be
/// already filtered to that student.
pub fn build_report(student: &str, records: &[GradeRecord]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Grade Report: {student}");
    let _ = writeln!(output);

    let overall = engine::weighted_average(records);
    let _ = writeln!(
        output,
        "Overall average: {} ({})",
        format_average(overall),
        engine::classify(overall)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Term Averages");

    for term in engine::term_trend(records) {
        let _ = writeln!(
            output,
            "- Term {}: {} ({})",
            term.term,
            format_average(term.average),
            term.band
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subjects");

    let subjects = engine::subject_breakdown(records);
    if subjects.is_empty() {
        let _ = writeln!(output, "No grades recorded yet.");
    } else {
        let _ = writeln!(output, "| Subject | Average | Grades | Total weight |");
        let _ = writeln!(output, "|---|---|---|---|");
        for subject in subjects.iter() {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {:.1} |",
                subject.subject,
                format_average(subject.average),
                subject.grade_count,
                subject.total_weight
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Statistics");

    match engine::descriptive_statistics(records) {
        None => {
            let _ = writeln!(output, "No scores to summarize.");
        }
        Some(stats) => {
            let _ = writeln!(output, "- Grades: {}", stats.count);
            let _ = writeln!(output, "- Mean: {:.2}", stats.mean);
            let _ = writeln!(output, "- Median: {:.2}", stats.median);
            let _ = writeln!(output, "- Range: {:.2} to {:.2}", stats.min, stats.max);
            let _ = writeln!(output, "- Standard deviation: {}", format_average(stats.std_dev));
            let _ = writeln!(output, "- Pass rate: {:.0}%", stats.pass_rate * 100.0);
            let _ = writeln!(output, "- Excellence rate: {:.0}%", stats.excellence_rate * 100.0);
        }
    }

    let shares = engine::weight_shares(records);
    if !shares.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Weight Distribution");
        for share in shares.iter() {
            let _ = writeln!(
                output,
                "- {}: {:.1} ({:.0}%)",
                share.subject,
                share.total_weight,
                share.share * 100.0
            );
        }
    }

    output
}
