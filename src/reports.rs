//! Chart models for the dashboard, finance and discipline views.

use crate::aggregate::{self, AggregationResult, Query, TimeWindow, WindowError};
use crate::error::DashboardError;
use crate::session::Session;
use crate::table::{cols, Cell, Table};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub title: String,
    pub labels: Vec<String>,
    pub values: Vec<Option<f64>>,
    pub empty: bool,
}

impl Chart {
    pub fn from_result(title: impl Into<String>, result: &AggregationResult) -> Self {
        Self {
            title: title.into(),
            labels: result.groups.iter().map(|g| g.label()).collect(),
            values: result.groups.iter().map(|g| g.value).collect(),
            empty: result.is_empty(),
        }
    }

    pub fn empty(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            labels: Vec::new(),
            values: Vec::new(),
            empty: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DisciplineScope {
    #[default]
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct YearMonth {
    pub year: i64,
    pub month: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardRequest {
    pub year: i64,
    pub month: i64,
    pub day: i64,
    #[serde(default)]
    pub class: Option<String>,
    /// `student_guardian` key.
    #[serde(default)]
    pub student: Option<String>,
    #[serde(default)]
    pub as_of: Option<YearMonth>,
    #[serde(default)]
    pub discipline_scope: DisciplineScope,
}

impl DashboardRequest {
    pub fn day_window(&self) -> Result<TimeWindow, WindowError> {
        TimeWindow::new(self.year, Some(self.month), Some(self.day))
    }

    fn finance_window(&self) -> Result<TimeWindow, WindowError> {
        let ym = self.as_of.unwrap_or(YearMonth {
            year: self.year,
            month: self.month,
        });
        TimeWindow::new(ym.year, Some(ym.month), None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinanceSummary {
    pub period: String,
    pub total_students: usize,
    pub total_fee: f64,
    pub collected_fee: f64,
    pub remaining_fee: f64,
    pub empty: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisciplineReport {
    pub class: Option<String>,
    pub student: Option<String>,
    pub scope: DisciplineScope,
    pub parameters: Chart,
    pub composite: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardModel {
    pub window: TimeWindow,
    pub class: Option<String>,
    pub finance: FinanceSummary,
    pub class_counts: Chart,
    pub class_attendance: Chart,
    pub class_tests: Chart,
    pub attendance_by_day: Chart,
    pub tests_by_day: Chart,
    pub tests_per_teacher: Chart,
    pub test_result_per_teacher: Chart,
    pub classes_per_teacher: Chart,
    pub discipline: DisciplineReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

/// Finance totals for one year-month. Total students counts distinct
/// student + class pairs billed in that year.
pub fn finance_summary(financial: &Table, window: TimeWindow) -> FinanceSummary {
    let month = Query::new(window);
    let year = Query::new(window.year_window())
        .group_by(&[cols::STUDENT_GUARDIAN, cols::CLASS_WITH_SECTION]);
    let total_students = aggregate::size(financial, &year).groups.len();
    let collected = aggregate::sum_where(financial, &month, cols::FEE, cols::PAID, &Cell::text("yes"));
    let remaining = aggregate::sum_where(financial, &month, cols::FEE, cols::PAID, &Cell::text("no"));
    let total = aggregate::sum(financial, &month, cols::FEE);
    FinanceSummary {
        period: window.label(),
        total_students,
        total_fee: total.scalar().unwrap_or(0.0),
        collected_fee: collected.scalar().unwrap_or(0.0),
        remaining_fee: remaining.scalar().unwrap_or(0.0),
        empty: collected.is_empty(),
    }
}

/// Selected class, or the first class on record when none was asked for.
fn resolve_class(main: &Table, requested: Option<&str>) -> Option<String> {
    match requested.map(str::trim).filter(|s| !s.is_empty()) {
        Some(c) => Some(c.to_string()),
        None => main
            .unique(cols::CLASS_WITH_SECTION)
            .first()
            .map(Cell::key_text),
    }
}

fn resolve_student(main: &Table, class: &str, requested: Option<&str>) -> Option<String> {
    match requested.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Some(s.to_string()),
        None => {
            let wanted = Cell::text(class);
            main.unique_where(cols::STUDENT_GUARDIAN, |r| {
                r.get(cols::CLASS_WITH_SECTION).loosely_eq(&wanted)
            })
            .first()
            .map(Cell::key_text)
        }
    }
}

pub fn discipline_report(
    main: &Table,
    window: TimeWindow,
    class: Option<&str>,
    student: Option<&str>,
    scope: DisciplineScope,
) -> DisciplineReport {
    let class = resolve_class(main, class);
    let student = class
        .as_deref()
        .and_then(|c| resolve_student(main, c, student));
    let scoped = match scope {
        DisciplineScope::Month => window.month_window(),
        DisciplineScope::Year => window.year_window(),
    };
    let title = format!("Discipline ({})", scoped.label());
    let (parameters, composite) = match (&class, &student) {
        (Some(c), Some(s)) => {
            let q = Query::new(scoped)
                .filter(cols::CLASS_WITH_SECTION, Cell::text(c))
                .filter(cols::STUDENT_GUARDIAN, Cell::text(s));
            let profile = aggregate::discipline_profile(main, &q);
            (Chart::from_result(title, &profile.parameters), profile.composite)
        }
        _ => (Chart::empty(title), None),
    };
    DisciplineReport {
        class,
        student,
        scope,
        parameters,
        composite,
    }
}

pub fn build_dashboard(
    main: &Table,
    financial: &Table,
    req: &DashboardRequest,
) -> Result<DashboardModel, WindowError> {
    let day = req.day_window()?;
    let month = day.month_window();
    let year = day.year_window();
    let finance = finance_summary(financial, req.finance_window()?);

    let by_class = Query::new(day).group_by(&[cols::CLASS_WITH_SECTION]);
    let class_counts = Chart::from_result(
        format!("Students per class ({})", day.label()),
        &aggregate::size(main, &by_class),
    );
    let class_attendance = Chart::from_result(
        format!("Attendance % per class ({})", day.label()),
        &aggregate::mean_ratio(main, &by_class, cols::PRESENT),
    );
    let class_tests = Chart::from_result(
        format!("Test % per class ({})", day.label()),
        &aggregate::mean(main, &by_class, cols::PERCENTAGE),
    );

    // School-wide student count on the reference day.
    let school_students =
        aggregate::distinct_count(main, &Query::new(day), cols::STUDENT_GUARDIAN).scalar();
    let per_teacher_year = Query::new(year).group_by(&[cols::SUBJECT_TEACHER]);
    let classes_per_teacher = Chart::from_result(
        format!("Classes per teacher ({})", year.label()),
        &aggregate::normalize_by_scalar(
            &aggregate::count(main, &per_teacher_year, cols::SUBJECT),
            school_students,
        ),
    );

    let class = resolve_class(main, req.class.as_deref());
    let (attendance_by_day, tests_by_day, tests_per_teacher, test_result_per_teacher) =
        match class.as_deref() {
            Some(c) => {
                let in_month = Query::new(month).filter(cols::CLASS_WITH_SECTION, Cell::text(c));
                let per_day = in_month.clone().group_by(&[cols::DAY]);
                let per_teacher = in_month.group_by(&[cols::SUBJECT_TEACHER]);
                let class_students = aggregate::distinct_count(
                    main,
                    &Query::new(day).filter(cols::CLASS_WITH_SECTION, Cell::text(c)),
                    cols::STUDENT_GUARDIAN,
                )
                .scalar();
                (
                    Chart::from_result(
                        format!("Attendance % of {} ({})", c, month.label()),
                        &aggregate::mean_ratio(main, &per_day, cols::PRESENT),
                    ),
                    Chart::from_result(
                        format!("Test % of {} ({})", c, month.label()),
                        &aggregate::mean(main, &per_day, cols::PERCENTAGE),
                    ),
                    Chart::from_result(
                        format!("Tests per teacher in {} ({})", c, month.label()),
                        &aggregate::normalize_by_scalar(
                            &aggregate::count(main, &per_teacher, cols::SUBJECT),
                            class_students,
                        ),
                    ),
                    Chart::from_result(
                        format!("Test % per teacher in {} ({})", c, month.label()),
                        &aggregate::mean(main, &per_teacher, cols::PERCENTAGE),
                    ),
                )
            }
            None => (
                Chart::empty("Attendance % per day"),
                Chart::empty("Test % per day"),
                Chart::empty("Tests per teacher"),
                Chart::empty("Test % per teacher"),
            ),
        };

    let discipline = discipline_report(
        main,
        day,
        class.as_deref(),
        req.student.as_deref(),
        req.discipline_scope,
    );

    Ok(DashboardModel {
        window: day,
        class,
        finance,
        class_counts,
        class_attendance,
        class_tests,
        attendance_by_day,
        tests_by_day,
        tests_per_teacher,
        test_result_per_teacher,
        classes_per_teacher,
        discipline,
        store_error: None,
    })
}

/// Fetches `sheet`, degrading to an empty table on a read failure.
fn table_or_empty(session: &mut Session, sheet: &str, errors: &mut Vec<String>) -> Rc<Table> {
    match session.table(sheet) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(sheet, error = %e, "report built without sheet");
            errors.push(e.to_string());
            Rc::new(Table::default())
        }
    }
}

fn joined(errors: Vec<String>) -> Option<String> {
    if errors.is_empty() {
        None
    } else {
        Some(errors.join("; "))
    }
}

pub fn dashboard(session: &mut Session, req: &DashboardRequest) -> Result<DashboardModel, DashboardError> {
    let mut errors = Vec::new();
    let main_sheet = session.sheets().main.clone();
    let financial_sheet = session.sheets().financial.clone();
    let main = table_or_empty(session, &main_sheet, &mut errors);
    let financial = table_or_empty(session, &financial_sheet, &mut errors);
    let mut model = build_dashboard(&main, &financial, req)?;
    model.store_error = joined(errors);
    Ok(model)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinanceModel {
    #[serde(flatten)]
    pub summary: FinanceSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

pub fn finance(session: &mut Session, year: i64, month: i64) -> Result<FinanceModel, DashboardError> {
    let window = TimeWindow::new(year, Some(month), None)?;
    let mut errors = Vec::new();
    let sheet = session.sheets().financial.clone();
    let financial = table_or_empty(session, &sheet, &mut errors);
    Ok(FinanceModel {
        summary: finance_summary(&financial, window),
        store_error: joined(errors),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisciplineModel {
    #[serde(flatten)]
    pub report: DisciplineReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

pub fn discipline(
    session: &mut Session,
    window: TimeWindow,
    class: Option<&str>,
    student: Option<&str>,
    scope: DisciplineScope,
) -> DisciplineModel {
    let mut errors = Vec::new();
    let sheet = session.sheets().main.clone();
    let main = table_or_empty(session, &sheet, &mut errors);
    DisciplineModel {
        report: discipline_report(&main, window, class, student, scope),
        store_error: joined(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RawRow;
    use serde_json::json;

    #[allow(clippy::too_many_arguments)]
    fn entry(
        day: i64,
        class: &str,
        student: &str,
        present: &str,
        punished: &str,
        subject: &str,
        teacher: &str,
        marks: (i64, i64),
    ) -> RawRow {
        vec![
            ("year", json!(2024)),
            ("month", json!(4)),
            ("day", json!(day)),
            ("present", json!(present)),
            ("on_time", json!("yes")),
            ("proper_uniform", json!("yes")),
            ("punished", json!(punished)),
            ("subject", json!(subject)),
            ("subject_teacher", json!(teacher)),
            ("total_marks", json!(marks.0)),
            ("obtained_marks", json!(marks.1)),
            ("class_with_section", json!(class)),
            ("student_guardian", json!(student)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn fee(year: i64, month: i64, student: &str, class: &str, paid: &str, amount: i64) -> RawRow {
        vec![
            ("year", json!(year)),
            ("month", json!(month)),
            ("student_guardian", json!(student)),
            ("class_with_section", json!(class)),
            ("paid", json!(paid)),
            ("fee", json!(amount)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn main_table() -> Table {
        Table::materialize(&[
            entry(3, "5 A", "Ali", "yes", "no", "Math", "Raza", (50, 40)),
            entry(3, "5 A", "Sara", "no", "yes", "Math", "Raza", (50, 30)),
            entry(3, "6 B", "Omar", "yes", "no", "Urdu", "Hina", (20, 20)),
            entry(4, "5 A", "Ali", "yes", "no", "Science", "Hina", (10, 5)),
        ])
    }

    fn request() -> DashboardRequest {
        serde_json::from_value(json!({
            "year": 2024, "month": 4, "day": 3,
            "class": "5 A", "student": "Ali"
        }))
        .expect("request")
    }

    #[test]
    fn class_charts_on_the_day() {
        let model = build_dashboard(&main_table(), &Table::default(), &request()).expect("model");
        assert_eq!(model.class_counts.labels, vec!["5 A", "6 B"]);
        assert_eq!(model.class_counts.values, vec![Some(2.0), Some(1.0)]);
        assert_eq!(model.class_attendance.values, vec![Some(50.0), Some(100.0)]);
        assert_eq!(model.class_tests.values, vec![Some(70.0), Some(100.0)]);
        assert!(model.finance.empty);
        assert!(model.store_error.is_none());
    }

    #[test]
    fn selected_class_over_the_month() {
        let model = build_dashboard(&main_table(), &Table::default(), &request()).expect("model");
        assert_eq!(model.attendance_by_day.labels, vec!["3", "4"]);
        assert_eq!(model.attendance_by_day.values, vec![Some(50.0), Some(100.0)]);
        assert_eq!(model.tests_by_day.values, vec![Some(70.0), Some(50.0)]);
        // 5 A has two students on the 3rd.
        assert_eq!(model.tests_per_teacher.labels, vec!["Hina", "Raza"]);
        assert_eq!(model.tests_per_teacher.values, vec![Some(0.5), Some(1.0)]);
        assert_eq!(model.test_result_per_teacher.values, vec![Some(50.0), Some(70.0)]);
        // Three students school-wide on the 3rd.
        assert_eq!(model.classes_per_teacher.labels, vec!["Hina", "Raza"]);
        assert_eq!(model.classes_per_teacher.values, vec![Some(2.0 / 3.0), Some(2.0 / 3.0)]);
    }

    #[test]
    fn student_discipline_for_month_and_year() {
        let model = build_dashboard(&main_table(), &Table::default(), &request()).expect("model");
        let d = &model.discipline;
        assert_eq!(d.student.as_deref(), Some("Ali"));
        assert_eq!(
            d.parameters.labels,
            vec!["present", "on_time", "proper_uniform", "punished"]
        );
        assert_eq!(
            d.parameters.values,
            vec![Some(100.0), Some(100.0), Some(100.0), Some(0.0)]
        );
        assert_eq!(d.composite, Some(100.0));

        let sara = discipline_report(
            &main_table(),
            TimeWindow::new(2024, None, None).expect("window"),
            Some("5 A"),
            Some("Sara"),
            DisciplineScope::Year,
        );
        assert_eq!(sara.composite, Some(50.0));
    }

    #[test]
    fn empty_day_gives_empty_charts() {
        let mut req = request();
        req.day = 28;
        let model = build_dashboard(&main_table(), &Table::default(), &req).expect("model");
        assert!(model.class_counts.empty);
        assert!(model.class_attendance.labels.is_empty());
        assert_eq!(model.tests_per_teacher.values, vec![None, None]);
    }

    #[test]
    fn finance_partitions_fee_by_paid_status() {
        let financial = Table::materialize(&[
            fee(2024, 4, "Ali", "5 A", "yes", 3000),
            fee(2024, 4, "Sara", "5 A", "no", 2500),
            fee(2024, 4, "Omar", "6 B", "yes", 2000),
            fee(2024, 3, "Ali", "5 A", "yes", 3000),
            fee(2024, 1, "Zain", "6 B", "no", 1000),
        ]);
        let window = TimeWindow::new(2024, Some(4), None).expect("window");
        let summary = finance_summary(&financial, window);
        assert_eq!(summary.total_students, 4);
        assert_eq!(summary.collected_fee, 5000.0);
        assert_eq!(summary.remaining_fee, 2500.0);
        assert_eq!(summary.collected_fee + summary.remaining_fee, summary.total_fee);
        assert!(!summary.empty);
    }

    #[test]
    fn invalid_request_window_is_rejected() {
        let mut req = request();
        req.month = 13;
        assert_eq!(
            build_dashboard(&main_table(), &Table::default(), &req),
            Err(WindowError::Month(13))
        );
    }

    #[test]
    fn missing_sheets_degrade_to_empty_reports() {
        use crate::config::SheetNames;
        use crate::store::memory::MemoryStore;
        use crate::store::MAIN_HEADERS;

        let sheets = SheetNames::default();
        // Only the main sheet exists; the financial sheet cannot be read.
        let store = MemoryStore::new(&[(sheets.main.as_str(), &MAIN_HEADERS[..])]);
        let mut session = Session::new(Box::new(store), sheets.clone());

        let fin = finance(&mut session, 2024, 4).expect("finance");
        assert!(fin.summary.empty);
        assert!(fin
            .store_error
            .as_deref()
            .is_some_and(|e| e.contains("financial-dataset")));

        let dash = dashboard(&mut session, &request()).expect("dashboard");
        assert!(dash.finance.empty);
        assert!(dash.store_error.is_some());

        let bare = MemoryStore::new(&[]);
        let mut session = Session::new(Box::new(bare), sheets);
        let window = TimeWindow::new(2024, None, None).expect("window");
        let d = discipline(&mut session, window, Some("5 A"), Some("Ali"), DisciplineScope::Year);
        assert!(d.report.parameters.empty);
        assert_eq!(d.report.composite, None);
        assert!(d.store_error.as_deref().is_some_and(|e| e.contains("full-dataset")));
    }

    #[test]
    fn chart_serializes_with_empty_flag() {
        let v = serde_json::to_value(Chart::empty("x")).expect("json");
        assert_eq!(v, json!({ "title": "x", "labels": [], "values": [], "empty": true }));
    }
}
