use std::collections::HashSet;

use chrono::NaiveDate;
use clap::ValueEnum;

use crate::error::GradeError;
use crate::models::{new_id, GradeRecord, MAX_SCORE, TERMS};

#[derive(Debug, Clone)]
pub struct NewGrade {
    pub student: String,
    pub subject: String,
    pub score: f64,
    pub weight: f64,
    pub term: String,
    pub date: Option<NaiveDate>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImportMode {
    /// Keep current grades and add rows whose id is not yet known
    Append,
    /// Discard current grades
    Replace,
}

#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub student: Option<String>,
    pub subject: Option<String>,
    pub term: Option<String>,
}

impl Filter {
    pub fn matches(&self, record: &GradeRecord) -> bool {
        self.student.as_deref().map_or(true, |s| record.student == s)
            && self.subject.as_deref().map_or(true, |s| record.subject == s)
            && self.term.as_deref().map_or(true, |t| record.term == t)
    }
}

/// In-memory grade collection. Loaded from and saved back to a
/// [`crate::store::GradeStore`] by the caller.
#[derive(Debug, Default)]
pub struct Gradebook {
    records: Vec<GradeRecord>,
}

impl Gradebook {
    /// Takes a loaded collection as-is, except that a repeated id is
    /// replaced with a fresh one so every row stays addressable.
    pub fn new(mut records: Vec<GradeRecord>) -> Self {
        let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
        for record in records.iter_mut() {
            if !seen.insert(record.id.clone()) {
                let fresh = new_id();
                tracing::warn!(old = %record.id, new = %fresh, "re-issuing duplicate id");
                record.id = fresh.clone();
                seen.insert(fresh);
            }
        }
        Self { records }
    }

    pub fn records(&self) -> &[GradeRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<GradeRecord> {
        self.records
    }

    pub fn add_grade(&mut self, grade: NewGrade) -> Result<&GradeRecord, GradeError> {
        let student = grade.student.trim();
        if student.is_empty() {
            return Err(GradeError::InvalidStudent);
        }
        let subject = grade.subject.trim();
        if subject.is_empty() {
            return Err(GradeError::InvalidSubject);
        }
        check_number("score", grade.score)?;
        if grade.score > MAX_SCORE {
            return Err(GradeError::ScoreOutOfRange(grade.score));
        }
        check_number("weight", grade.weight)?;
        if !TERMS.contains(&grade.term.as_str()) {
            return Err(GradeError::InvalidTerm(grade.term));
        }

        let record = GradeRecord {
            id: new_id(),
            student: student.to_string(),
            subject: subject.to_string(),
            score: Some(grade.score),
            weight: Some(grade.weight),
            term: grade.term,
            date: grade.date,
            comment: grade.comment.filter(|c| !c.trim().is_empty()),
        };
        tracing::debug!(id = %record.id, student = %record.student, "grade added");
        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    /// Registers a student before any grade exists by appending a
    /// placeholder row.
    pub fn add_student(&mut self, name: &str) -> Result<&GradeRecord, GradeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GradeError::InvalidStudent);
        }
        if self.records.iter().any(|record| record.student.trim() == name) {
            return Err(GradeError::StudentExists(name.to_string()));
        }
        self.records.push(GradeRecord::placeholder(name));
        Ok(&self.records[self.records.len() - 1])
    }

    pub fn delete(&mut self, id: &str) -> Result<GradeRecord, GradeError> {
        let position = self
            .records
            .iter()
            .position(|record| record.id == id)
            .ok_or_else(|| GradeError::NotFound(id.to_string()))?;
        Ok(self.records.remove(position))
    }

    pub fn reset(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    /// Returns how many incoming records were added. Within the batch,
    /// the first row carrying a given id wins.
    pub fn import(&mut self, incoming: Vec<GradeRecord>, mode: ImportMode) -> usize {
        if mode == ImportMode::Replace {
            self.records.clear();
        }

        let mut known: HashSet<String> =
            self.records.iter().map(|record| record.id.clone()).collect();
        let mut added = 0usize;
        for record in incoming {
            if !known.insert(record.id.clone()) {
                tracing::debug!(id = %record.id, "skipping duplicate id on import");
                continue;
            }
            self.records.push(record);
            added += 1;
        }
        added
    }

    pub fn students(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .iter()
            .map(|record| record.student.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn subjects(&self, student: &str) -> Vec<String> {
        let mut subjects: Vec<String> = self
            .records
            .iter()
            .filter(|record| record.student == student && !record.subject.trim().is_empty())
            .map(|record| record.subject.clone())
            .collect();
        subjects.sort();
        subjects.dedup();
        subjects
    }

    pub fn filter(&self, filter: &Filter) -> Vec<GradeRecord> {
        self.records
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect()
    }
}

fn check_number(field: &'static str, value: f64) -> Result<(), GradeError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(GradeError::InvalidNumber { field, value })
    }
}
