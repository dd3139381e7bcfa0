use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod engine;
mod error;
mod gradebook;
mod models;
mod report;
mod store;

use gradebook::{Filter, Gradebook, ImportMode, NewGrade};
use models::GradeRecord;
use store::GradeStore;

#[derive(Parser)]
#[command(name = "gradetrack")]
#[command(about = "Record student grades and compute weighted averages", long_about = None)]
struct Cli {
    /// CSV file holding the grade collection
    #[arg(long, global = true, env = "GRADETRACK_DATA", default_value = "notes.csv")]
    data: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    student: Option<String>,
    #[arg(long)]
    subject: Option<String>,
    #[arg(long, value_parser = ["1", "2", "3"])]
    term: Option<String>,
}

impl From<FilterArgs> for Filter {
    fn from(args: FilterArgs) -> Self {
        Filter {
            student: args.student,
            subject: args.subject,
            term: args.term,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum GroupBy {
    Term,
    Subject,
    Student,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DataFormat {
    Csv,
    Json,
}

impl DataFormat {
    fn detect(explicit: Option<DataFormat>, path: &Path) -> DataFormat {
        explicit.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DataFormat::Json,
            _ => DataFormat::Csv,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record a grade
    Add {
        #[arg(long)]
        student: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        score: f64,
        #[arg(long, default_value_t = 1.0)]
        weight: f64,
        #[arg(long, default_value = "1", value_parser = ["1", "2", "3"])]
        term: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Register a student who has no grades yet
    AddStudent { name: String },
    /// Delete a grade by id
    Delete { id: String },
    /// Delete every grade
    Reset {
        #[arg(long)]
        confirm: bool,
    },
    /// List grades
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// List known students
    Students,
    /// Weighted average, overall or per group
    Average {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, value_enum)]
        by: Option<GroupBy>,
        #[arg(long)]
        json: bool,
    },
    /// Descriptive statistics over scores
    Stats {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        json: bool,
    },
    /// Import grades from a CSV or JSON file
    Import {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = ImportMode::Append)]
        mode: ImportMode,
        #[arg(long, value_enum)]
        format: Option<DataFormat>,
    },
    /// Export grades to a CSV or JSON file
    Export {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_enum)]
        format: Option<DataFormat>,
        #[arg(long)]
        student: Option<String>,
    },
    /// Generate a markdown report for one student
    Report {
        #[arg(long)]
        student: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Load sample grades
    Seed,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn format_number(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |value| format!("{value:.2}"))
}

fn print_records(records: &[GradeRecord]) {
    for record in records {
        println!(
            "{}  {:<20} {:<16} {:>6} x{:<4} T{}",
            record.id,
            record.student,
            if record.subject.is_empty() { "-" } else { record.subject.as_str() },
            record.score.map_or_else(|| "?".to_string(), |s| format!("{s:.2}")),
            record.weight.map_or_else(|| "?".to_string(), |w| format!("{w}")),
            record.term
        );
    }
}

fn seed(book: &mut Gradebook) -> anyhow::Result<usize> {
    let samples = [
        ("Avery Lee", "Math", 14.0, 1.0, "1"),
        ("Avery Lee", "Math", 18.0, 2.0, "1"),
        ("Avery Lee", "French", 10.0, 1.0, "1"),
        ("Avery Lee", "History", 12.5, 1.5, "2"),
        ("Jules Moreno", "Math", 9.0, 2.0, "1"),
        ("Jules Moreno", "Physics", 11.5, 1.0, "2"),
        ("Kiara Patel", "Math", 17.0, 2.0, "2"),
        ("Kiara Patel", "French", 15.5, 1.0, "3"),
    ];

    for (student, subject, score, weight, term) in samples {
        book.add_grade(NewGrade {
            student: student.to_string(),
            subject: subject.to_string(),
            score,
            weight,
            term: term.to_string(),
            date: None,
            comment: None,
        })?;
    }
    Ok(samples.len())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let store = GradeStore::new(&cli.data);
    let mut book = Gradebook::new(
        store
            .load()
            .with_context(|| format!("failed to load grades from {}", store.path().display()))?,
    );

    match cli.command {
        Commands::Add {
            student,
            subject,
            score,
            weight,
            term,
            date,
            comment,
        } => {
            let record = book.add_grade(NewGrade {
                student,
                subject,
                score,
                weight,
                term,
                date,
                comment,
            })?;
            println!(
                "Added {} for {}: {} (weight {}) [{}].",
                record.subject,
                record.student,
                format_number(record.score),
                format_number(record.weight),
                record.id
            );
            store.save(book.records())?;
        }
        Commands::AddStudent { name } => {
            let record = book.add_student(&name)?;
            println!("Student '{}' created.", record.student);
            store.save(book.records())?;
        }
        Commands::Delete { id } => {
            let removed = book.delete(&id)?;
            tracing::info!(id = %removed.id, "grade deleted");
            println!("Deleted {} grade for {}.", removed.subject, removed.student);
            store.save(book.records())?;
        }
        Commands::Reset { confirm } => {
            if !confirm {
                bail!("refusing to delete every grade without --confirm");
            }
            let removed = book.reset();
            store.save(book.records())?;
            println!("Removed {removed} records.");
        }
        Commands::List { filter } => {
            let records = book.filter(&filter.into());
            if records.is_empty() {
                println!("No grades found.");
                return Ok(());
            }
            print_records(&records);
        }
        Commands::Students => {
            for name in book.students() {
                let subjects = book.subjects(&name);
                if subjects.is_empty() {
                    println!("{name}");
                } else {
                    println!("{name}: {}", subjects.join(", "));
                }
            }
        }
        Commands::Average { filter, by, json } => {
            let records = book.filter(&filter.into());
            match by {
                None => {
                    let average = engine::weighted_average(&records);
                    let band = engine::classify(average);
                    if json {
                        let value = serde_json::json!({ "average": average, "band": band });
                        println!("{}", serde_json::to_string_pretty(&value)?);
                    } else {
                        println!("Average {} ({}, {})", format_number(average), band, band.colour());
                    }
                }
                Some(group) => {
                    let averages = engine::group_average(&records, |record: &GradeRecord| {
                        match group {
                            GroupBy::Term => record.term.clone(),
                            GroupBy::Subject => record.subject.clone(),
                            GroupBy::Student => record.student.clone(),
                        }
                    });
                    if json {
                        println!("{}", serde_json::to_string_pretty(&averages)?);
                    } else {
                        for (key, average) in averages.iter() {
                            let label = if key.is_empty() { "-" } else { key.as_str() };
                            println!(
                                "- {}: {} ({})",
                                label,
                                format_number(*average),
                                engine::classify(*average)
                            );
                        }
                    }
                }
            }
        }
        Commands::Stats { filter, json } => {
            let records = book.filter(&filter.into());
            let stats = engine::descriptive_statistics(&records);
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }
            match stats {
                None => println!("No scores to summarize."),
                Some(stats) => {
                    println!("count            {}", stats.count);
                    println!("mean             {:.2}", stats.mean);
                    println!("median           {:.2}", stats.median);
                    println!("min / max        {:.2} / {:.2}", stats.min, stats.max);
                    println!("std deviation    {}", format_number(stats.std_dev));
                    println!("pass rate        {:.0}%", stats.pass_rate * 100.0);
                    println!("excellence rate  {:.0}%", stats.excellence_rate * 100.0);
                }
            }
        }
        Commands::Import { file, mode, format } => {
            let incoming = match DataFormat::detect(format, &file) {
                DataFormat::Csv => store::read_csv(&file)?,
                DataFormat::Json => store::read_json(&file)?,
            };
            let added = book.import(incoming, mode);
            store.save(&book.into_records())?;
            tracing::info!(added, file = %file.display(), "import finished");
            println!("Imported {added} grades from {}.", file.display());
        }
        Commands::Export {
            out,
            format,
            student,
        } => {
            let records = book.filter(&Filter {
                student,
                ..Filter::default()
            });
            match DataFormat::detect(format, &out) {
                DataFormat::Csv => store::write_csv(&out, &records)?,
                DataFormat::Json => store::write_json(&out, &records)?,
            }
            println!("Exported {} grades to {}.", records.len(), out.display());
        }
        Commands::Report { student, out } => {
            let records = book.filter(&Filter {
                student: Some(student.clone()),
                ..Filter::default()
            });
            if records.is_empty() {
                bail!("no records for student {student:?}");
            }
            let report = report::build_report(&student, &records);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Seed => {
            let inserted = seed(&mut book)?;
            store.save(&book.into_records())?;
            println!("Seed data inserted ({inserted} grades).");
        }
    }

    Ok(())
}
