use crate::encoding::{self, DisciplineMark};
use crate::table::{Cell, Table};
use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    #[default]
    Disabled,
    /// Compare the first `n` cells of a new row against every existing row.
    Prefix(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter all fields.")]
    MissingFields { fields: Vec<&'static str> },
    #[error("Obtained marks are greater than total marks.")]
    MarksExceedTotal,
    #[error("Marks cannot be negative.")]
    NegativeMarks,
    #[error("{year}-{month}-{day} is not a valid date.")]
    InvalidDate { year: i64, month: i64, day: i64 },
    #[error("Class \"{0}\" must be a class and a section, e.g. \"5 A\".")]
    MalformedClass(String),
    #[error("\"{value}\" is not a valid value for {field}.")]
    InvalidMark { field: &'static str, value: String },
    #[error("No student \"{student}\" found in class {class}.")]
    UnknownStudent { class: String, student: String },
    #[error("No teacher recorded for {subject} in class {class}.")]
    UnknownSubject { class: String, subject: String },
    #[error("Same details already exist. Try updating date or update details using the update records tab.")]
    Duplicate,
}

impl ValidationError {
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::MissingFields { fields } => Some(serde_json::json!({ "fields": fields })),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdmissionForm {
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub day: Option<i64>,
    pub class: String,
    pub incharge: Option<String>,
    pub student_name: String,
    pub guardian_name: String,
    pub relation: String,
    pub gender: String,
    pub age: Option<f64>,
    pub fee: Option<f64>,
}

/// One student's attendance, conduct and (optional) class test for a day.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyForm {
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub day: Option<i64>,
    pub class: String,
    pub incharge: Option<String>,
    /// `student_guardian` key of an enrolled student.
    pub student: String,
    pub present: serde_json::Value,
    pub on_time: serde_json::Value,
    pub proper_uniform: serde_json::Value,
    pub punished: serde_json::Value,
    pub subject: String,
    pub subject_teacher: Option<String>,
    pub total_marks: Option<f64>,
    pub obtained_marks: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExamForm {
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub day: Option<i64>,
    pub class: String,
    pub incharge: Option<String>,
    pub student: String,
    pub subject: String,
    pub subject_teacher: Option<String>,
    pub total_marks: Option<f64>,
    pub obtained_marks: Option<f64>,
}

#[derive(Default)]
struct Missing(Vec<&'static str>);

impl Missing {
    fn text(&mut self, field: &'static str, value: &str) {
        if value.trim().is_empty() {
            self.0.push(field);
        }
    }

    fn present<T>(&mut self, field: &'static str, value: Option<T>) {
        if value.is_none() {
            self.0.push(field);
        }
    }

    fn nonzero(&mut self, field: &'static str, value: Option<f64>) {
        if value.map_or(true, |v| v == 0.0) {
            self.0.push(field);
        }
    }

    fn mark(&mut self, field: &'static str, value: &serde_json::Value) {
        let blank = match value {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.trim().is_empty(),
            _ => false,
        };
        if blank {
            self.0.push(field);
        }
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingFields { fields: self.0 })
        }
    }
}

fn check_date(year: Option<i64>, month: Option<i64>, day: Option<i64>) -> Result<(), ValidationError> {
    let (year, month, day) = (year.unwrap_or(0), month.unwrap_or(0), day.unwrap_or(0));
    let valid = match (i32::try_from(year), u32::try_from(month), u32::try_from(day)) {
        (Ok(y), Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(y, m, d).is_some(),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidDate { year, month, day })
    }
}

fn check_marks(total: Option<f64>, obtained: Option<f64>) -> Result<(), ValidationError> {
    let (total, obtained) = (total.unwrap_or(0.0), obtained.unwrap_or(0.0));
    if obtained > total {
        return Err(ValidationError::MarksExceedTotal);
    }
    if total < 0.0 || obtained < 0.0 {
        return Err(ValidationError::NegativeMarks);
    }
    Ok(())
}

/// Splits "5 A" into class and section.
pub fn split_class(value: &str) -> Result<(String, String), ValidationError> {
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(class), Some(section), None) => Ok((class.to_string(), section.to_string())),
        _ => Err(ValidationError::MalformedClass(value.to_string())),
    }
}

/// Parses a discipline value from a form. `present` has no "absent" option.
pub fn parse_mark(field: &'static str, raw: &serde_json::Value) -> Result<DisciplineMark, ValidationError> {
    let invalid = || ValidationError::InvalidMark {
        field,
        value: match raw {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    };
    let mark = DisciplineMark::parse(raw).ok_or_else(invalid)?;
    if field == "present" && mark == DisciplineMark::Unknown {
        return Err(invalid());
    }
    Ok(mark)
}

pub fn validate_admission(form: &AdmissionForm) -> Result<(), ValidationError> {
    let mut missing = Missing::default();
    missing.present("year", form.year);
    missing.present("month", form.month);
    missing.present("day", form.day);
    missing.text("class", &form.class);
    missing.text("studentName", &form.student_name);
    missing.text("guardianName", &form.guardian_name);
    missing.text("relation", &form.relation);
    missing.text("gender", &form.gender);
    missing.nonzero("age", form.age);
    missing.nonzero("fee", form.fee);
    missing.finish()?;

    split_class(&form.class)?;
    check_date(form.year, form.month, form.day)?;
    for (field, value) in [("age", form.age), ("fee", form.fee)] {
        if let Some(v) = value.filter(|v| *v < 0.0) {
            return Err(ValidationError::InvalidMark {
                field,
                value: v.to_string(),
            });
        }
    }
    Ok(())
}

pub fn validate_daily(form: &DailyForm) -> Result<(), ValidationError> {
    let mut missing = Missing::default();
    missing.present("year", form.year);
    missing.present("month", form.month);
    missing.present("day", form.day);
    missing.text("class", &form.class);
    missing.text("student", &form.student);
    missing.mark("present", &form.present);
    missing.mark("onTime", &form.on_time);
    missing.mark("properUniform", &form.proper_uniform);
    missing.mark("punished", &form.punished);
    missing.text("subject", &form.subject);
    missing.finish()?;

    check_marks(form.total_marks, form.obtained_marks)?;
    split_class(&form.class)?;
    check_date(form.year, form.month, form.day)?;
    parse_mark("present", &form.present)?;
    parse_mark("on_time", &form.on_time)?;
    parse_mark("proper_uniform", &form.proper_uniform)?;
    parse_mark("punished", &form.punished)?;
    Ok(())
}

pub fn validate_exam(form: &ExamForm) -> Result<(), ValidationError> {
    let mut missing = Missing::default();
    missing.present("year", form.year);
    missing.present("month", form.month);
    missing.present("day", form.day);
    missing.text("class", &form.class);
    missing.text("student", &form.student);
    missing.text("subject", &form.subject);
    missing.nonzero("totalMarks", form.total_marks);
    missing.nonzero("obtainedMarks", form.obtained_marks);
    missing.finish()?;

    check_marks(form.total_marks, form.obtained_marks)?;
    split_class(&form.class)?;
    check_date(form.year, form.month, form.day)
}

/// Rejects `row` when its first `n` cells equal the first `n` columns of an
/// existing row. Blank matches blank.
pub fn check_duplicate(
    existing: &Table,
    headers: &[&str],
    row: &[serde_json::Value],
    policy: DuplicatePolicy,
) -> Result<(), ValidationError> {
    let DuplicatePolicy::Prefix(n) = policy else {
        return Ok(());
    };
    let width = n.min(row.len()).min(headers.len());
    if width == 0 {
        return Ok(());
    }
    let candidate: Vec<Cell> = headers[..width]
        .iter()
        .zip(row)
        .map(|(col, v)| {
            if encoding::is_discipline_column(col) {
                encoding::encode(v).map(Cell::Float).unwrap_or(Cell::Null)
            } else {
                Cell::from_json(v)
            }
        })
        .collect();
    let same = |a: &Cell, b: &Cell| (a.is_null() && b.is_null()) || a.loosely_eq(b);
    let exists = existing.rows().any(|r| {
        headers[..width]
            .iter()
            .zip(&candidate)
            .all(|(col, want)| same(r.get(col), want))
    });
    if exists {
        Err(ValidationError::Duplicate)
    } else {
        Ok(())
    }
}
