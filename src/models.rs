use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// Terms a grade can be recorded against.
pub const TERMS: [&str; 3] = ["1", "2", "3"];

pub const MAX_SCORE: f64 = 20.0;

/// Read access the aggregation engine needs from a record.
pub trait Graded {
    fn score(&self) -> Option<f64>;
    fn weight(&self) -> Option<f64>;

    /// Rows that stand in for a student with no grades yet.
    fn is_placeholder(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeRecord {
    pub id: String,
    pub student: String,
    pub subject: String,
    pub score: Option<f64>,
    pub weight: Option<f64>,
    pub term: String,
    pub date: Option<NaiveDate>,
    pub comment: Option<String>,
}

impl GradeRecord {
    /// Empty-subject, zero-weight row recorded when a student is created.
    pub fn placeholder(student: &str) -> Self {
        Self {
            id: new_id(),
            student: student.to_string(),
            subject: String::new(),
            score: Some(0.0),
            weight: Some(0.0),
            term: TERMS[0].to_string(),
            date: None,
            comment: None,
        }
    }
}

impl Graded for GradeRecord {
    fn score(&self) -> Option<f64> {
        self.score
    }

    fn weight(&self) -> Option<f64> {
        self.weight
    }

    fn is_placeholder(&self) -> bool {
        self.subject.trim().is_empty() && self.weight.map_or(true, |w| w == 0.0)
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Unknown,
    Weak,
    Fair,
    Strong,
}

impl Band {
    /// Display colour used when rendering an average.
    pub fn colour(self) -> &'static str {
        match self {
            Band::Unknown => "gray",
            Band::Weak => "red",
            Band::Fair => "orange",
            Band::Strong => "green",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Band::Unknown => "unknown",
            Band::Weak => "weak",
            Band::Fair => "fair",
            Band::Strong => "strong",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; `None` below two scores.
    pub std_dev: Option<f64>,
    pub pass_rate: f64,
    pub excellence_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermAverage {
    pub term: String,
    pub average: Option<f64>,
    pub band: Band,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectSummary {
    pub subject: String,
    pub average: Option<f64>,
    pub grade_count: usize,
    pub total_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightShare {
    pub subject: String,
    pub total_weight: f64,
    pub share: f64,
}
