use crate::encoding;
use crate::store::RawRow;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub mod cols {
    pub const YEAR: &str = "year";
    pub const MONTH: &str = "month";
    pub const DAY: &str = "day";
    pub const INCHARGE: &str = "incharge";
    pub const STUDENT_NAME: &str = "student_name";
    pub const GUARDIAN_NAME: &str = "guardian_name";
    pub const RELATION: &str = "relation";
    pub const GENDER: &str = "gender";
    pub const PRESENT: &str = "present";
    pub const ON_TIME: &str = "on_time";
    pub const PROPER_UNIFORM: &str = "proper_uniform";
    pub const PUNISHED: &str = "punished";
    pub const SUBJECT: &str = "subject";
    pub const SUBJECT_TEACHER: &str = "subject_teacher";
    pub const TOTAL_MARKS: &str = "total_marks";
    pub const OBTAINED_MARKS: &str = "obtained_marks";
    pub const PERCENTAGE: &str = "percentage";
    pub const CLASS_WITH_SECTION: &str = "class_with_section";
    pub const STUDENT_GUARDIAN: &str = "student_guardian";
    pub const PAID: &str = "paid";
    pub const FEE: &str = "fee";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

static NULL_CELL: Cell = Cell::Null;

impl Cell {
    pub fn from_json(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Cell::Null,
            serde_json::Value::Bool(b) => Cell::Int(i64::from(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Cell::Int(i),
                None => n.as_f64().map(Cell::Float).unwrap_or(Cell::Null),
            },
            serde_json::Value::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    Cell::Null
                } else {
                    Cell::Text(t.to_string())
                }
            }
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn text(s: &str) -> Self {
        Cell::Text(s.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Null => None,
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        }
    }

    /// Whole-number view; fractional values are rejected.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            _ => self
                .as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64),
        }
    }

    /// Display form used for labels and loose equality. Integral floats
    /// render without a fraction so `3.0` and `3` label the same group.
    pub fn key_text(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) if f.is_finite() && f.fract() == 0.0 => format!("{}", *f as i64),
            Cell::Float(f) => f.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }

    /// Equality used by filters: numeric when both sides are numeric,
    /// textual otherwise. Null never matches.
    pub fn loosely_eq(&self, other: &Cell) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self.key_text() == other.key_text(),
        }
    }

    /// Numeric text ranks with the numbers so grouping agrees with
    /// `loosely_eq`.
    fn rank(&self) -> u8 {
        match self {
            Cell::Null => 0,
            c if c.as_f64().is_some() => 1,
            _ => 2,
        }
    }

    /// Total order for group keys: null, then numbers (including numeric
    /// text), then text.
    pub fn total_cmp(&self, other: &Cell) -> Ordering {
        match (self.rank(), other.rank()) {
            (1, 1) => {
                let a = self.as_f64().unwrap_or(0.0);
                let b = other.as_f64().unwrap_or(0.0);
                a.total_cmp(&b)
            }
            (2, 2) => self.key_text().cmp(&other.key_text()),
            (ra, rb) => ra.cmp(&rb),
        }
    }
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    pub fn get(&self, column: &str) -> &'a Cell {
        self.table
            .index
            .get(column)
            .and_then(|&i| self.cells.get(i))
            .unwrap_or(&NULL_CELL)
    }
}

impl Table {
    /// Builds a rectangular table from fetched records.
    ///
    /// Columns are the union of record keys in first-seen order. Discipline
    /// columns are label-encoded; `percentage` is recomputed from the marks
    /// wherever a positive total is present.
    pub fn materialize(raw: &[RawRow]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for record in raw {
            for (key, _) in record {
                if !index.contains_key(key) {
                    index.insert(key.clone(), columns.len());
                    columns.push(key.clone());
                }
            }
        }

        let total_idx = index.get(cols::TOTAL_MARKS).copied();
        let obtained_idx = index.get(cols::OBTAINED_MARKS).copied();
        if total_idx.is_some() && obtained_idx.is_some() && !index.contains_key(cols::PERCENTAGE) {
            index.insert(cols::PERCENTAGE.to_string(), columns.len());
            columns.push(cols::PERCENTAGE.to_string());
        }
        let pct_idx = index.get(cols::PERCENTAGE).copied();

        let mut rows = Vec::with_capacity(raw.len());
        for record in raw {
            let mut cells = vec![Cell::Null; columns.len()];
            for (key, value) in record {
                let i = index[key];
                cells[i] = if encoding::is_discipline_column(key) {
                    encoding::encode(value).map(Cell::Float).unwrap_or(Cell::Null)
                } else {
                    Cell::from_json(value)
                };
            }
            if let (Some(ti), Some(oi), Some(pi)) = (total_idx, obtained_idx, pct_idx) {
                let total = cells[ti].as_f64();
                let obtained = cells[oi].as_f64();
                if let (Some(t), Some(o)) = (total, obtained) {
                    if t > 0.0 {
                        cells[pi] = Cell::Float(round2(o / t * 100.0));
                    }
                }
            }
            rows.push(cells);
        }

        Self {
            columns,
            index,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        self.rows.iter().map(move |cells| Row {
            table: self,
            cells,
        })
    }

    /// Distinct non-null values of `column` over rows accepted by `keep`,
    /// in first-seen order.
    pub fn unique_where<F>(&self, column: &str, keep: F) -> Vec<Cell>
    where
        F: Fn(&Row<'_>) -> bool,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for row in self.rows() {
            if !keep(&row) {
                continue;
            }
            let cell = row.get(column);
            if cell.is_null() {
                continue;
            }
            if seen.insert(cell.key_text()) {
                out.push(cell.clone());
            }
        }
        out
    }

    pub fn unique(&self, column: &str) -> Vec<Cell> {
        self.unique_where(column, |_| true)
    }

    /// Most recent non-null `target_col` among rows where `filter_col`
    /// equals `value`.
    pub fn last_value_where(&self, filter_col: &str, value: &Cell, target_col: &str) -> Option<&Cell> {
        self.rows()
            .filter(|row| row.get(filter_col).loosely_eq(value))
            .map(|row| row.get(target_col))
            .filter(|c| !c.is_null())
            .last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(pairs: &[(&str, serde_json::Value)]) -> RawRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn materialize_fills_missing_columns_with_null() {
        let t = Table::materialize(&[
            raw(&[("year", json!(2024)), ("class_with_section", json!("5 A"))]),
            raw(&[("year", json!(2024)), ("incharge", json!("Amina"))]),
        ]);
        assert_eq!(t.columns, vec!["year", "class_with_section", "incharge"]);
        let rows: Vec<_> = t.rows().collect();
        assert!(rows[0].get("incharge").is_null());
        assert!(rows[1].get("class_with_section").is_null());
        assert!(rows[1].get("no_such_column").is_null());
    }

    #[test]
    fn materialize_encodes_discipline_columns_only() {
        let t = Table::materialize(&[raw(&[
            ("present", json!("yes")),
            ("punished", json!("absent")),
            ("on_time", json!("late")),
            ("gender", json!("no")),
        ])]);
        let row = t.rows().next().expect("row");
        assert_eq!(row.get("present"), &Cell::Float(1.0));
        assert_eq!(row.get("punished"), &Cell::Float(0.0));
        assert!(row.get("on_time").is_null());
        assert_eq!(row.get("gender"), &Cell::text("no"));
    }

    #[test]
    fn percentage_is_recomputed_from_marks() {
        let t = Table::materialize(&[
            raw(&[
                ("total_marks", json!(50)),
                ("obtained_marks", json!(45)),
                ("percentage", json!(12)),
            ]),
            raw(&[
                ("total_marks", json!("")),
                ("obtained_marks", json!("")),
                ("percentage", json!("")),
            ]),
        ]);
        let rows: Vec<_> = t.rows().collect();
        assert_eq!(rows[0].get("percentage"), &Cell::Float(90.0));
        assert!(rows[1].get("percentage").is_null());
    }

    #[test]
    fn percentage_column_is_added_when_marks_exist() {
        let t = Table::materialize(&[raw(&[
            ("total_marks", json!(30)),
            ("obtained_marks", json!(10)),
        ])]);
        assert!(t.index.contains_key("percentage"));
        let row = t.rows().next().expect("row");
        assert_eq!(row.get("percentage"), &Cell::Float(33.33));
    }

    #[test]
    fn materialize_is_idempotent() {
        let input = vec![
            raw(&[("year", json!(2024)), ("present", json!(1)), ("fee", json!(3000.5))]),
            raw(&[("day", json!(3)), ("present", json!("no"))]),
        ];
        assert_eq!(Table::materialize(&input), Table::materialize(&input));
    }

    #[test]
    fn lookups_return_latest_values() {
        let t = Table::materialize(&[
            raw(&[("class_with_section", json!("5 A")), ("incharge", json!("Old"))]),
            raw(&[("class_with_section", json!("6 B")), ("incharge", json!("Other"))]),
            raw(&[("class_with_section", json!("5 A")), ("incharge", json!("New"))]),
            raw(&[("class_with_section", json!("5 A")), ("incharge", json!(""))]),
        ]);
        let class = Cell::text("5 A");
        assert_eq!(
            t.last_value_where("class_with_section", &class, "incharge"),
            Some(&Cell::text("New"))
        );
        assert_eq!(
            t.unique("class_with_section"),
            vec![Cell::text("5 A"), Cell::text("6 B")]
        );
    }

    #[test]
    fn cell_ordering_and_equality_are_numeric_aware() {
        assert!(Cell::Int(3).loosely_eq(&Cell::Float(3.0)));
        assert!(Cell::Int(3).loosely_eq(&Cell::text("3")));
        assert!(!Cell::Null.loosely_eq(&Cell::Null));
        assert_eq!(Cell::Int(2).total_cmp(&Cell::Int(10)), Ordering::Less);
        assert_eq!(Cell::Int(99).total_cmp(&Cell::text("a")), Ordering::Less);
        assert_eq!(Cell::Float(4.0).key_text(), "4");
        assert_eq!(Cell::text("2024").as_i64(), Some(2024));
        assert_eq!(Cell::Float(2.5).as_i64(), None);
    }
}
