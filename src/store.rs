use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::parse_optional_number;
use crate::error::GradeError;
use crate::models::{new_id, GradeRecord, TERMS};

pub const COLUMNS: [&str; 8] = [
    "id", "student", "subject", "score", "weight", "term", "date", "comment",
];

/// CSV file holding the whole grade collection. Every save rewrites the
/// file; the last writer wins.
#[derive(Debug, Clone)]
pub struct GradeStore {
    path: PathBuf,
}

impl GradeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<Vec<GradeRecord>> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "no grade file yet, starting empty");
            return Ok(Vec::new());
        }
        let records = read_csv(&self.path)?;
        tracing::debug!(count = records.len(), "grades loaded");
        Ok(records)
    }

    pub fn save(&self, records: &[GradeRecord]) -> anyhow::Result<()> {
        let mut tmp: OsString = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let written = write_csv(&tmp, records).and_then(|()| {
            std::fs::rename(&tmp, &self.path)
                .with_context(|| format!("failed to replace {}", self.path.display()))
        });
        if let Err(err) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }
        tracing::debug!(count = records.len(), path = %self.path.display(), "grades saved");
        Ok(())
    }
}

#[derive(Deserialize)]
struct CsvRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "Eleve")]
    student: Option<String>,
    #[serde(default, alias = "Matiere")]
    subject: Option<String>,
    #[serde(default, alias = "Note")]
    score: Option<String>,
    #[serde(default, alias = "Coefficient")]
    weight: Option<String>,
    #[serde(default, alias = "Trimestre")]
    term: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    comment: Option<String>,
}

impl CsvRow {
    fn into_record(self) -> GradeRecord {
        GradeRecord {
            id: non_blank(self.id).unwrap_or_else(new_id),
            student: non_blank(self.student).unwrap_or_default(),
            subject: non_blank(self.subject).unwrap_or_default(),
            score: self.score.as_deref().and_then(parse_optional_number),
            weight: self.weight.as_deref().and_then(parse_optional_number),
            term: non_blank(self.term)
                .map(|term| normalize_term(&term))
                .unwrap_or_else(|| TERMS[0].to_string()),
            date: self.date.as_deref().and_then(parse_date),
            comment: non_blank(self.comment),
        }
    }
}

#[derive(Serialize)]
struct CsvOut<'a> {
    id: &'a str,
    student: &'a str,
    subject: &'a str,
    score: Option<f64>,
    weight: Option<f64>,
    term: &'a str,
    date: Option<NaiveDate>,
    comment: Option<&'a str>,
}

impl<'a> From<&'a GradeRecord> for CsvOut<'a> {
    fn from(record: &'a GradeRecord) -> Self {
        Self {
            id: &record.id,
            student: &record.student,
            subject: &record.subject,
            score: record.score,
            weight: record.weight,
            term: &record.term,
            date: record.date,
            comment: record.comment.as_deref(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Spreadsheets tend to rewrite "1" as "1.0".
fn normalize_term(term: &str) -> String {
    match term.strip_suffix(".0") {
        Some(whole) if TERMS.contains(&whole) => whole.to_string(),
        _ => term.to_string(),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(err) => {
            tracing::warn!(value = trimmed, error = %err, "ignoring unreadable date");
            None
        }
    }
}

pub fn read_csv(path: &Path) -> anyhow::Result<Vec<GradeRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut records = Vec::new();
    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("bad row {} in {}", line + 2, path.display()))?;
        records.push(row.into_record());
    }
    Ok(records)
}

pub fn write_csv(path: &Path, records: &[GradeRecord]) -> anyhow::Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    writer.write_record(COLUMNS)?;
    for record in records {
        writer.serialize(CsvOut::from(record))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json(path: &Path, records: &[GradeRecord]) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, records)?;
    Ok(())
}

pub fn read_json(path: &Path) -> anyhow::Result<Vec<GradeRecord>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let value: Value = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(records_from_json(value)?)
}

/// Builds records from a JSON array, reading numeric fields through
/// [`parse_optional_number`] when they arrive as text. Array elements that
/// are not objects are skipped.
pub fn records_from_json(value: Value) -> Result<Vec<GradeRecord>, GradeError> {
    let items = match value {
        Value::Array(items) => items,
        other => return Err(GradeError::NotACollection(json_kind(&other))),
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(fields) = item else {
            tracing::warn!(index, "skipping non-object entry");
            continue;
        };
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| fields.get(*key))
                .and_then(json_text)
        };
        let number = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| fields.get(*key))
                .and_then(json_number)
        };

        let row = CsvRow {
            id: text(&["id"]),
            student: text(&["student", "Eleve"]),
            subject: text(&["subject", "Matiere"]),
            score: None,
            weight: None,
            term: text(&["term", "Trimestre"]),
            date: text(&["date"]),
            comment: text(&["comment"]),
        };
        let mut record = row.into_record();
        record.score = number(&["score", "Note"]);
        record.weight = number(&["weight", "Coefficient"]);
        records.push(record);
    }
    Ok(records)
}

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_optional_number(s),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(student: &str, subject: &str, score: f64, weight: f64) -> GradeRecord {
        GradeRecord {
            id: new_id(),
            student: student.to_string(),
            subject: subject.to_string(),
            score: Some(score),
            weight: Some(weight),
            term: "2".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 1, 28),
            comment: Some("oral, chapter 3".to_string()),
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = GradeStore::new(dir.path().join("notes.csv"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = GradeStore::new(dir.path().join("notes.csv"));
        let records = vec![
            record("Avery Lee", "Math", 14.5, 2.0),
            GradeRecord::placeholder("Jules Moreno"),
        ];

        store.save(&records).unwrap();
        assert!(!dir.path().join("notes.csv.tmp").exists());
        assert_eq!(store.load().unwrap(), records);
    }

    #[test]
    fn failed_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("notes.csv");
        std::fs::create_dir(&target).unwrap();
        let store = GradeStore::new(&target);

        assert!(store.save(&[record("Avery Lee", "Math", 14.5, 2.0)]).is_err());
        assert!(!dir.path().join("notes.csv.tmp").exists());
        assert!(target.is_dir());
    }

    #[test]
    fn empty_collection_still_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = GradeStore::new(dir.path().join("notes.csv"));
        store.save(&[]).unwrap();
        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.trim(), COLUMNS.join(","));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn reads_legacy_headers_and_bad_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.csv");
        std::fs::write(
            &path,
            "id,Eleve,Matiere,Note,Coefficient,Trimestre\n\
             ,Avery Lee,Math,14.0,1.0,1.0\n\
             abc,Avery Lee,French,absent,2,2\n",
        )
        .unwrap();

        let records = read_csv(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[0].id.is_empty());
        assert_eq!(records[0].score, Some(14.0));
        assert_eq!(records[0].term, "1");
        assert_eq!(records[1].id, "abc");
        assert_eq!(records[1].score, None);
        assert_eq!(records[1].weight, Some(2.0));
        assert_eq!(records[1].date, None);
    }

    #[test]
    fn json_export_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grades.json");
        let records = vec![record("Avery Lee", "Math", 14.5, 2.0)];
        write_json(&path, &records).unwrap();
        assert_eq!(read_json(&path).unwrap(), records);
    }

    #[test]
    fn json_accepts_text_numbers() {
        let value = json!([
            {"id": "g1", "student": "Kiara Patel", "subject": "Math", "score": "12,5", "weight": 2, "term": "3"},
            {"Eleve": "Kiara Patel", "Matiere": "Art", "Note": "n/a", "Coefficient": "1"},
            "not a record"
        ]);
        let records = records_from_json(value).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].score, Some(12.5));
        assert_eq!(records[0].weight, Some(2.0));
        assert_eq!(records[1].subject, "Art");
        assert_eq!(records[1].score, None);
        assert_eq!(records[1].term, "1");
    }

    #[test]
    fn json_object_is_not_a_collection() {
        let err = records_from_json(json!({"student": "Avery"})).unwrap_err();
        assert_eq!(err, GradeError::NotACollection("an object"));
        assert_eq!(
            records_from_json(Value::Null).unwrap_err(),
            GradeError::NotACollection("null")
        );
    }
}
