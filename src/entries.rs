//! Row builders and the write path for the three entry forms.

use crate::error::DashboardError;
use crate::session::Session;
use crate::store::{EXAM_HEADERS, MAIN_HEADERS};
use crate::table::{cols, round2, Cell, Table};
use crate::validate::{
    self, check_duplicate, parse_mark, split_class, AdmissionForm, DailyForm, DuplicatePolicy,
    ExamForm, ValidationError,
};
use serde::Serialize;
use serde_json::{json, Value};

pub fn student_guardian_key(student: &str, relation: &str, guardian: &str) -> String {
    format!("{} {} {}", student.trim(), relation.trim(), guardian.trim())
}

/// obtained / total x 100 to two places; blank when no test was taken.
pub fn percentage(total: f64, obtained: f64) -> Value {
    if total > 0.0 {
        json!(round2(obtained / total * 100.0))
    } else {
        json!("")
    }
}

fn blank() -> Value {
    json!("")
}

fn number(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        json!(v as i64)
    } else {
        json!(v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetails {
    pub student_name: String,
    pub guardian_name: String,
    pub relation: String,
    pub gender: String,
}

fn text_of(cell: &Cell) -> String {
    cell.key_text()
}

/// Most recent incharge recorded for `class`.
pub fn class_incharge(main: &Table, class: &str) -> Option<String> {
    main.last_value_where(cols::CLASS_WITH_SECTION, &Cell::text(class), cols::INCHARGE)
        .map(text_of)
}

/// Latest recorded details of the student keyed by `student_guardian`.
pub fn student_details(main: &Table, class: &str, student: &str) -> Option<StudentDetails> {
    let class = Cell::text(class);
    let student = Cell::text(student);
    let row = main
        .rows()
        .filter(|r| {
            r.get(cols::CLASS_WITH_SECTION).loosely_eq(&class)
                && r.get(cols::STUDENT_GUARDIAN).loosely_eq(&student)
        })
        .last()?;
    Some(StudentDetails {
        student_name: text_of(row.get(cols::STUDENT_NAME)),
        guardian_name: text_of(row.get(cols::GUARDIAN_NAME)),
        relation: text_of(row.get(cols::RELATION)),
        gender: text_of(row.get(cols::GENDER)),
    })
}

/// Latest teacher recorded for `subject` in `class`.
pub fn subject_teacher(main: &Table, class: &str, subject: &str) -> Option<String> {
    let class = Cell::text(class);
    let subject = Cell::text(subject);
    main.rows()
        .filter(|r| {
            r.get(cols::CLASS_WITH_SECTION).loosely_eq(&class)
                && r.get(cols::SUBJECT).loosely_eq(&subject)
        })
        .map(|r| r.get(cols::SUBJECT_TEACHER))
        .filter(|c| !c.is_null())
        .last()
        .map(text_of)
}

fn given(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn year_month_day(year: Option<i64>, month: Option<i64>, day: Option<i64>) -> [Value; 3] {
    [
        json!(year.unwrap_or(0)),
        json!(month.unwrap_or(0)),
        json!(day.unwrap_or(0)),
    ]
}

/// Main-sheet row opening a student's record; discipline and test cells
/// are blank.
pub fn admission_main_row(form: &AdmissionForm, incharge: &str) -> Result<Vec<Value>, ValidationError> {
    let (class, section) = split_class(&form.class)?;
    let key = student_guardian_key(&form.student_name, &form.relation, &form.guardian_name);
    let mut row: Vec<Value> = year_month_day(form.year, form.month, form.day).to_vec();
    row.extend([
        json!(class),
        json!(section),
        json!(incharge),
        json!(form.student_name.trim()),
        json!(form.guardian_name.trim()),
        json!(form.relation.trim()),
        json!(form.gender.trim()),
    ]);
    row.extend(std::iter::repeat_with(blank).take(10));
    row.push(json!(form.class.trim()));
    row.push(json!(key));
    debug_assert_eq!(row.len(), MAIN_HEADERS.len());
    Ok(row)
}

/// Fee row recorded at admission; the admission fee counts as paid.
pub fn admission_financial_row(form: &AdmissionForm) -> Vec<Value> {
    let key = student_guardian_key(&form.student_name, &form.relation, &form.guardian_name);
    vec![
        json!(form.year.unwrap_or(0)),
        json!(form.month.unwrap_or(0)),
        json!(key),
        json!(form.class.trim()),
        json!("yes"),
        number(form.fee.unwrap_or(0.0)),
    ]
}

pub fn daily_row(
    form: &DailyForm,
    incharge: &str,
    student: &StudentDetails,
    teacher: &str,
) -> Result<Vec<Value>, ValidationError> {
    let (class, section) = split_class(&form.class)?;
    let total = form.total_marks.unwrap_or(0.0);
    let obtained = form.obtained_marks.unwrap_or(0.0);
    let mut row: Vec<Value> = year_month_day(form.year, form.month, form.day).to_vec();
    row.extend([
        json!(class),
        json!(section),
        json!(incharge),
        json!(student.student_name),
        json!(student.guardian_name),
        json!(student.relation),
        json!(student.gender),
        json!(parse_mark("present", &form.present)?.sheet_text()),
        json!(parse_mark("on_time", &form.on_time)?.sheet_text()),
        json!(parse_mark("proper_uniform", &form.proper_uniform)?.sheet_text()),
        json!(parse_mark("punished", &form.punished)?.sheet_text()),
        blank(),
        json!(form.subject.trim()),
        json!(teacher),
        number(total),
        number(obtained),
        percentage(total, obtained),
        json!(form.class.trim()),
        json!(form.student.trim()),
    ]);
    debug_assert_eq!(row.len(), MAIN_HEADERS.len());
    Ok(row)
}

pub fn exam_row(
    form: &ExamForm,
    incharge: &str,
    student: &StudentDetails,
    teacher: &str,
) -> Result<Vec<Value>, ValidationError> {
    let (class, section) = split_class(&form.class)?;
    let total = form.total_marks.unwrap_or(0.0);
    let obtained = form.obtained_marks.unwrap_or(0.0);
    let mut row: Vec<Value> = year_month_day(form.year, form.month, form.day).to_vec();
    row.extend([
        json!(class),
        json!(section),
        json!(incharge),
        json!(student.student_name),
        json!(student.guardian_name),
        json!(student.relation),
        json!(student.gender),
        blank(),
        json!(form.subject.trim()),
        json!(teacher),
        number(total),
        number(obtained),
        percentage(total, obtained),
        json!(form.class.trim()),
        json!(form.student.trim()),
    ]);
    debug_assert_eq!(row.len(), EXAM_HEADERS.len());
    Ok(row)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryReceipt {
    pub sheet: String,
    pub message: &'static str,
    pub row: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AdmissionOutcome {
    Both,
    MainOnly,
    FinancialOnly,
    None,
}

impl AdmissionOutcome {
    fn classify(main_ok: bool, financial_ok: bool) -> Self {
        match (main_ok, financial_ok) {
            (true, true) => Self::Both,
            (true, false) => Self::MainOnly,
            (false, true) => Self::FinancialOnly,
            (false, false) => Self::None,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Both => "Both records added.",
            Self::MainOnly => "1st record added only.",
            Self::FinancialOnly => "2nd record added only.",
            Self::None => "An error occurred. Please refresh the page and try again.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReceipt {
    pub outcome: AdmissionOutcome,
    pub message: &'static str,
    pub student: String,
    /// Store failure behind a `none` outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Class context the daily and exam forms need: the incharge, enrolled
/// students and subjects taught.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassContext {
    pub class: String,
    pub incharge: Option<String>,
    pub students: Vec<String>,
    pub subjects: Vec<SubjectTeacher>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectTeacher {
    pub subject: String,
    pub teacher: Option<String>,
}

pub fn classes(main: &Table) -> Vec<String> {
    main.unique(cols::CLASS_WITH_SECTION)
        .iter()
        .map(Cell::key_text)
        .collect()
}

pub fn class_context(main: &Table, class: &str) -> ClassContext {
    let wanted = Cell::text(class);
    let students = main
        .unique_where(cols::STUDENT_GUARDIAN, |r| {
            r.get(cols::CLASS_WITH_SECTION).loosely_eq(&wanted)
        })
        .iter()
        .map(Cell::key_text)
        .collect();
    let subjects = main
        .unique_where(cols::SUBJECT, |r| r.get(cols::CLASS_WITH_SECTION).loosely_eq(&wanted))
        .iter()
        .map(|s| {
            let subject = s.key_text();
            SubjectTeacher {
                teacher: subject_teacher(main, class, &subject),
                subject,
            }
        })
        .collect();
    ClassContext {
        class: class.to_string(),
        incharge: class_incharge(main, class),
        students,
        subjects,
    }
}

fn lookup_student(main: &Table, class: &str, student: &str) -> Result<StudentDetails, ValidationError> {
    student_details(main, class, student).ok_or_else(|| ValidationError::UnknownStudent {
        class: class.to_string(),
        student: student.to_string(),
    })
}

fn lookup_teacher(
    main: &Table,
    class: &str,
    subject: &str,
    given_teacher: &Option<String>,
) -> Result<String, ValidationError> {
    given(given_teacher)
        .or_else(|| subject_teacher(main, class, subject))
        .ok_or_else(|| ValidationError::UnknownSubject {
            class: class.to_string(),
            subject: subject.to_string(),
        })
}

pub fn submit_daily(
    session: &mut Session,
    form: &DailyForm,
    policy: DuplicatePolicy,
) -> Result<EntryReceipt, DashboardError> {
    validate::validate_daily(form)?;
    let sheet = session.sheets().main.clone();
    let main = session.table(&sheet)?;
    let class = form.class.trim();
    let student = lookup_student(&main, class, form.student.trim())?;
    let teacher = lookup_teacher(&main, class, form.subject.trim(), &form.subject_teacher)?;
    let incharge = given(&form.incharge)
        .or_else(|| class_incharge(&main, class))
        .unwrap_or_default();
    let row = daily_row(form, &incharge, &student, &teacher)?;
    check_duplicate(&main, &MAIN_HEADERS, &row, policy)?;
    session.append(&sheet, &row)?;
    Ok(EntryReceipt {
        sheet,
        message: "Record added.",
        row,
    })
}

pub fn submit_exam(
    session: &mut Session,
    form: &ExamForm,
    policy: DuplicatePolicy,
) -> Result<EntryReceipt, DashboardError> {
    validate::validate_exam(form)?;
    let main_sheet = session.sheets().main.clone();
    let sheet = session.sheets().exams.clone();
    let main = session.table(&main_sheet)?;
    let class = form.class.trim();
    let student = lookup_student(&main, class, form.student.trim())?;
    let teacher = lookup_teacher(&main, class, form.subject.trim(), &form.subject_teacher)?;
    let incharge = given(&form.incharge)
        .or_else(|| class_incharge(&main, class))
        .unwrap_or_default();
    let row = exam_row(form, &incharge, &student, &teacher)?;
    if policy != DuplicatePolicy::Disabled {
        let exams = session.table(&sheet)?;
        check_duplicate(&exams, &EXAM_HEADERS, &row, policy)?;
    }
    session.append(&sheet, &row)?;
    Ok(EntryReceipt {
        sheet,
        message: "Record added.",
        row,
    })
}

/// Appends the main and the financial row independently. Partial writes
/// are outcomes, not errors; a double failure is the `none` outcome.
pub fn submit_admission(
    session: &mut Session,
    form: &AdmissionForm,
    policy: DuplicatePolicy,
) -> Result<AdmissionReceipt, DashboardError> {
    validate::validate_admission(form)?;
    let main_sheet = session.sheets().main.clone();
    let financial_sheet = session.sheets().financial.clone();
    let class = form.class.trim();

    let incharge = match given(&form.incharge) {
        Some(name) => name,
        None => {
            let main = session.table(&main_sheet)?;
            class_incharge(&main, class).unwrap_or_default()
        }
    };
    let main_row = admission_main_row(form, &incharge)?;
    if policy != DuplicatePolicy::Disabled {
        let main = session.table(&main_sheet)?;
        check_duplicate(&main, &MAIN_HEADERS, &main_row, policy)?;
    }
    let financial_row = admission_financial_row(form);

    let main_result = session.append(&main_sheet, &main_row);
    let financial_result = session.append(&financial_sheet, &financial_row);
    let outcome = AdmissionOutcome::classify(main_result.is_ok(), financial_result.is_ok());
    let error = match (main_result, financial_result) {
        (Err(e), Err(_)) => {
            tracing::warn!(error = %e, "admission not recorded");
            Some(e.to_string())
        }
        _ => {
            tracing::info!(?outcome, "admission recorded");
            None
        }
    };
    Ok(AdmissionReceipt {
        outcome,
        message: outcome.message(),
        student: student_guardian_key(&form.student_name, &form.relation, &form.guardian_name),
        error,
    })
}
