use crate::table::{cols, Cell, Row, Table};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("month must be between 1 and 12, got {0}")]
    Month(i64),
    #[error("day must be between 1 and 31, got {0}")]
    Day(i64),
    #[error("a day needs a month")]
    DayWithoutMonth,
}

/// Calendar window a report covers. Coarser windows select every value of
/// the omitted units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "granularity", rename_all = "camelCase")]
pub enum TimeWindow {
    Year { year: i64 },
    YearMonth { year: i64, month: i64 },
    YearMonthDay { year: i64, month: i64, day: i64 },
}

impl TimeWindow {
    pub fn new(year: i64, month: Option<i64>, day: Option<i64>) -> Result<Self, WindowError> {
        match (month, day) {
            (None, None) => Ok(Self::Year { year }),
            (None, Some(_)) => Err(WindowError::DayWithoutMonth),
            (Some(m), _) if !(1..=12).contains(&m) => Err(WindowError::Month(m)),
            (Some(_), Some(d)) if !(1..=31).contains(&d) => Err(WindowError::Day(d)),
            (Some(month), None) => Ok(Self::YearMonth { year, month }),
            (Some(month), Some(day)) => Ok(Self::YearMonthDay { year, month, day }),
        }
    }

    pub fn year(&self) -> i64 {
        match *self {
            Self::Year { year } | Self::YearMonth { year, .. } | Self::YearMonthDay { year, .. } => {
                year
            }
        }
    }

    /// Same year and month, without the day.
    pub fn month_window(&self) -> Self {
        match *self {
            Self::YearMonthDay { year, month, .. } => Self::YearMonth { year, month },
            other => other,
        }
    }

    pub fn year_window(&self) -> Self {
        Self::Year { year: self.year() }
    }

    pub fn contains(&self, row: &Row<'_>) -> bool {
        let unit = |col: &str, want: i64| row.get(col).as_i64() == Some(want);
        match *self {
            Self::Year { year } => unit(cols::YEAR, year),
            Self::YearMonth { year, month } => unit(cols::YEAR, year) && unit(cols::MONTH, month),
            Self::YearMonthDay { year, month, day } => {
                unit(cols::YEAR, year) && unit(cols::MONTH, month) && unit(cols::DAY, day)
            }
        }
    }

    /// Day-month-year label used in chart titles.
    pub fn label(&self) -> String {
        match *self {
            Self::Year { year } => format!("{}", year),
            Self::YearMonth { year, month } => format!("{}-{}", month, year),
            Self::YearMonthDay { year, month, day } => format!("{}-{}-{}", day, month, year),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Query<'a> {
    pub window: TimeWindow,
    pub filters: Vec<(&'a str, Cell)>,
    pub group_by: Vec<&'a str>,
}

impl<'a> Query<'a> {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            filters: Vec::new(),
            group_by: Vec::new(),
        }
    }

    pub fn filter(mut self, column: &'a str, value: Cell) -> Self {
        self.filters.push((column, value));
        self
    }

    pub fn group_by(mut self, columns: &[&'a str]) -> Self {
        self.group_by = columns.to_vec();
        self
    }

    fn matches(&self, row: &Row<'_>) -> bool {
        self.window.contains(row)
            && self
                .filters
                .iter()
                .all(|(col, want)| row.get(col).loosely_eq(want))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: Vec<Cell>,
    pub value: Option<f64>,
}

impl Group {
    pub fn label(&self) -> String {
        self.key
            .iter()
            .map(Cell::key_text)
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    pub key_columns: Vec<String>,
    pub groups: Vec<Group>,
}

impl AggregationResult {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, key: &[Cell]) -> Option<f64> {
        self.groups
            .iter()
            .find(|g| same_key(&g.key, key))
            .and_then(|g| g.value)
    }

    /// Value of an ungrouped aggregation; `None` when the window was empty.
    pub fn scalar(&self) -> Option<f64> {
        match self.groups.as_slice() {
            [only] if only.key.is_empty() => only.value,
            _ => None,
        }
    }
}

fn same_key(a: &[Cell], b: &[Cell]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.total_cmp(y) == Ordering::Equal)
}

#[derive(Debug, Clone)]
struct GroupKey(Vec<Cell>);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(&other.0) {
            let o = a.total_cmp(b);
            if o != Ordering::Equal {
                return o;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

/// Rows matching `q` bucketed by the grouping key, in ascending key order.
/// Rows with a null in any key column are dropped.
fn grouped<'t>(table: &'t Table, q: &Query<'_>) -> Vec<(Vec<Cell>, Vec<Row<'t>>)> {
    let mut buckets: BTreeMap<GroupKey, Vec<Row<'t>>> = BTreeMap::new();
    for row in table.rows() {
        if !q.matches(&row) {
            continue;
        }
        let key: Vec<Cell> = q.group_by.iter().map(|c| row.get(c).clone()).collect();
        if key.iter().any(Cell::is_null) {
            continue;
        }
        buckets.entry(GroupKey(key)).or_default().push(row);
    }
    buckets.into_iter().map(|(k, rows)| (k.0, rows)).collect()
}

fn aggregate_with<F>(table: &Table, q: &Query<'_>, f: F) -> AggregationResult
where
    F: Fn(&[Row<'_>]) -> Option<f64>,
{
    let groups = grouped(table, q)
        .into_iter()
        .map(|(key, rows)| Group {
            value: f(&rows),
            key,
        })
        .collect();
    AggregationResult {
        key_columns: q.group_by.iter().map(|s| s.to_string()).collect(),
        groups,
    }
}

fn sum_and_count(rows: &[Row<'_>], metric: &str) -> (f64, usize) {
    rows.iter()
        .filter_map(|r| r.get(metric).as_f64())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1))
}

fn mean_of(rows: &[Row<'_>], metric: &str) -> Option<f64> {
    let (sum, n) = sum_and_count(rows, metric);
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Rows per group whose `metric` cell is non-null.
pub fn count(table: &Table, q: &Query<'_>, metric: &str) -> AggregationResult {
    aggregate_with(table, q, |rows| {
        Some(rows.iter().filter(|r| !r.get(metric).is_null()).count() as f64)
    })
}

/// Rows per group, nulls included.
pub fn size(table: &Table, q: &Query<'_>) -> AggregationResult {
    aggregate_with(table, q, |rows| Some(rows.len() as f64))
}

/// Mean of the numeric cells of `metric`; null cells are excluded, not
/// counted as zero.
pub fn mean(table: &Table, q: &Query<'_>, metric: &str) -> AggregationResult {
    aggregate_with(table, q, |rows| mean_of(rows, metric))
}

/// Mean of a 0/1-encoded column expressed as a percentage.
pub fn mean_ratio(table: &Table, q: &Query<'_>, metric: &str) -> AggregationResult {
    aggregate_with(table, q, |rows| mean_of(rows, metric).map(|m| m * 100.0))
}

pub fn sum(table: &Table, q: &Query<'_>, metric: &str) -> AggregationResult {
    aggregate_with(table, q, |rows| Some(sum_and_count(rows, metric).0))
}

/// `sum` restricted to rows where `column` equals `value`, e.g. fee where
/// paid is "yes".
pub fn sum_where(
    table: &Table,
    q: &Query<'_>,
    metric: &str,
    column: &str,
    value: &Cell,
) -> AggregationResult {
    aggregate_with(table, q, |rows| {
        Some(
            rows.iter()
                .filter(|r| r.get(column).loosely_eq(value))
                .filter_map(|r| r.get(metric).as_f64())
                .sum(),
        )
    })
}

pub fn distinct_count(table: &Table, q: &Query<'_>, metric: &str) -> AggregationResult {
    aggregate_with(table, q, |rows| {
        let mut seen = std::collections::HashSet::new();
        for r in rows {
            let c = r.get(metric);
            if !c.is_null() {
                seen.insert(c.key_text());
            }
        }
        Some(seen.len() as f64)
    })
}

fn divide(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

/// Divides every group by one denominator. A zero or missing denominator
/// leaves every value undefined.
pub fn normalize_by_scalar(numerator: &AggregationResult, denominator: Option<f64>) -> AggregationResult {
    AggregationResult {
        key_columns: numerator.key_columns.clone(),
        groups: numerator
            .groups
            .iter()
            .map(|g| Group {
                key: g.key.clone(),
                value: divide(g.value, denominator),
            })
            .collect(),
    }
}

/// Mean x 100 of each listed column over all rows matching `q`, one group
/// per column. Grouping in `q` is ignored.
pub fn column_means(table: &Table, q: &Query<'_>, columns: &[&str]) -> AggregationResult {
    let rows: Vec<Row<'_>> = table.rows().filter(|r| q.matches(r)).collect();
    let groups = if rows.is_empty() {
        Vec::new()
    } else {
        columns
            .iter()
            .map(|c| Group {
                key: vec![Cell::text(c)],
                value: mean_of(&rows, c).map(|m| m * 100.0),
            })
            .collect()
    };
    AggregationResult {
        key_columns: vec!["parameter".to_string()],
        groups,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisciplineProfile {
    pub parameters: AggregationResult,
    /// Average of present, on time, proper uniform and not-punished, 0-100.
    pub composite: Option<f64>,
}

pub const DISCIPLINE_PARAMETERS: [&str; 4] = [
    cols::PRESENT,
    cols::ON_TIME,
    cols::PROPER_UNIFORM,
    cols::PUNISHED,
];

/// Per-parameter discipline percentages plus a composite score. The
/// composite averages each row with all four marks recorded; the punished
/// mark counts against it.
pub fn discipline_profile(table: &Table, q: &Query<'_>) -> DisciplineProfile {
    let parameters = column_means(table, q, &DISCIPLINE_PARAMETERS);
    let row_scores: Vec<f64> = table
        .rows()
        .filter(|r| q.matches(r))
        .filter_map(|r| {
            let marks = DISCIPLINE_PARAMETERS
                .iter()
                .map(|&p| {
                    let v = r.get(p).as_f64()?;
                    Some(if p == cols::PUNISHED { 1.0 - v } else { v })
                })
                .collect::<Option<Vec<f64>>>()?;
            Some(marks.iter().sum::<f64>() / marks.len() as f64)
        })
        .collect();
    let composite = if row_scores.is_empty() {
        None
    } else {
        Some(row_scores.iter().sum::<f64>() / row_scores.len() as f64 * 100.0)
    };
    DisciplineProfile {
        parameters,
        composite,
    }
}
