use rusqlite::{Connection, DatabaseName};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One fetched record: header name paired with the stored cell. Cells the
/// sheet never had for this row are simply absent.
pub type RawRow = Vec<(String, serde_json::Value)>;

pub const MAIN_HEADERS: [&str; 22] = [
    "year",
    "month",
    "day",
    "class",
    "section",
    "incharge",
    "student_name",
    "guardian_name",
    "relation",
    "gender",
    "present",
    "on_time",
    "proper_uniform",
    "punished",
    "reserved",
    "subject",
    "subject_teacher",
    "total_marks",
    "obtained_marks",
    "percentage",
    "class_with_section",
    "student_guardian",
];

pub const FINANCIAL_HEADERS: [&str; 6] = [
    "year",
    "month",
    "student_guardian",
    "class_with_section",
    "paid",
    "fee",
];

pub const EXAM_HEADERS: [&str; 18] = [
    "year",
    "month",
    "day",
    "class",
    "section",
    "incharge",
    "student_name",
    "guardian_name",
    "relation",
    "gender",
    "reserved",
    "subject",
    "subject_teacher",
    "total_marks",
    "obtained_marks",
    "percentage",
    "class_with_section",
    "student_guardian",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown sheet: {0}")]
    UnknownSheet(String),
    #[error("row has {width} cells but sheet {sheet} has {max} columns")]
    RowTooWide {
        sheet: String,
        width: usize,
        max: usize,
    },
    #[error("sheet {sheet} row {row} is unreadable: {message}")]
    Corrupt {
        sheet: String,
        row: i64,
        message: String,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Sheet-shaped record store. Reads return every row of a sheet; writes
/// append one positional row at a time.
pub trait RecordStore {
    /// Identity of the backing source, used to key cached tables.
    fn source_id(&self) -> String;
    fn fetch_all_records(&self, sheet: &str) -> Result<Vec<RawRow>, StoreError>;
    fn append_row(&self, sheet: &str, cells: &[serde_json::Value]) -> Result<(), StoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for std::rc::Rc<S> {
    fn source_id(&self) -> String {
        (**self).source_id()
    }

    fn fetch_all_records(&self, sheet: &str) -> Result<Vec<RawRow>, StoreError> {
        (**self).fetch_all_records(sheet)
    }

    fn append_row(&self, sheet: &str, cells: &[serde_json::Value]) -> Result<(), StoreError> {
        (**self).append_row(sheet, cells)
    }
}

pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: &Path, sheets: &[(&str, &[&str])]) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sheet_headers(
                sheet TEXT NOT NULL,
                idx INTEGER NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY(sheet, idx)
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sheet_rows(
                sheet TEXT NOT NULL,
                row_no INTEGER NOT NULL,
                cells TEXT NOT NULL,
                PRIMARY KEY(sheet, row_no)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sheet_rows_sheet ON sheet_rows(sheet)",
            [],
        )?;

        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        for (name, headers) in sheets {
            store.ensure_sheet(name, headers)?;
        }
        tracing::info!(path = %path.display(), sheets = sheets.len(), "record store opened");
        Ok(store)
    }

    /// Creates the header row for `sheet` unless one already exists. An
    /// existing header is kept as is, even if it differs.
    fn ensure_sheet(&self, sheet: &str, headers: &[&str]) -> anyhow::Result<()> {
        let existing = self.headers(sheet)?;
        if !existing.is_empty() {
            if existing.iter().map(String::as_str).ne(headers.iter().copied()) {
                tracing::warn!(sheet, "existing sheet header differs from expected layout");
            }
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        for (idx, name) in headers.iter().enumerate() {
            tx.execute(
                "INSERT INTO sheet_headers(sheet, idx, name) VALUES(?, ?, ?)",
                (sheet, idx as i64, name),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn headers(&self, sheet: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sheet_headers WHERE sheet = ? ORDER BY idx")?;
        let names = stmt
            .query_map([sheet], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

impl RecordStore for SqliteStore {
    fn source_id(&self) -> String {
        format!("sqlite:{}", self.path.to_string_lossy())
    }

    fn fetch_all_records(&self, sheet: &str) -> Result<Vec<RawRow>, StoreError> {
        let headers = self.headers(sheet)?;
        if headers.is_empty() {
            return Err(StoreError::UnknownSheet(sheet.to_string()));
        }
        let mut stmt = self
            .conn
            .prepare("SELECT row_no, cells FROM sheet_rows WHERE sheet = ? ORDER BY row_no")?;
        let raw = stmt
            .query_map([sheet], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(raw.len());
        for (row_no, text) in raw {
            let cells: Vec<serde_json::Value> =
                serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
                    sheet: sheet.to_string(),
                    row: row_no,
                    message: e.to_string(),
                })?;
            out.push(pair_with_headers(&headers, cells));
        }
        tracing::debug!(sheet, rows = out.len(), "fetched sheet");
        Ok(out)
    }

    fn append_row(&self, sheet: &str, cells: &[serde_json::Value]) -> Result<(), StoreError> {
        let headers = self.headers(sheet)?;
        if headers.is_empty() {
            return Err(StoreError::UnknownSheet(sheet.to_string()));
        }
        check_width(sheet, cells.len(), headers.len())?;
        if self.conn.is_readonly(DatabaseName::Main)? {
            return Err(StoreError::Unavailable(format!(
                "{} is read-only",
                self.path.display()
            )));
        }
        let next: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(row_no), 0) + 1 FROM sheet_rows WHERE sheet = ?",
            [sheet],
            |r| r.get(0),
        )?;
        let text = serde_json::Value::Array(cells.to_vec()).to_string();
        self.conn.execute(
            "INSERT INTO sheet_rows(sheet, row_no, cells) VALUES(?, ?, ?)",
            (sheet, next, text),
        )?;
        Ok(())
    }
}

fn check_width(sheet: &str, width: usize, max: usize) -> Result<(), StoreError> {
    if width > max {
        return Err(StoreError::RowTooWide {
            sheet: sheet.to_string(),
            width,
            max,
        });
    }
    Ok(())
}

fn pair_with_headers(headers: &[String], cells: Vec<serde_json::Value>) -> RawRow {
    headers.iter().cloned().zip(cells).collect()
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_db(prefix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir.join("school.sqlite3")
    }

    #[test]
    fn sqlite_store_round_trips_rows_in_append_order() {
        let path = temp_db("schoold-store-order");
        let store =
            SqliteStore::open(&path, &[("financial-dataset", &FINANCIAL_HEADERS)]).expect("open");
        store
            .append_row(
                "financial-dataset",
                &[json!(2024), json!(4), json!("Ali son of Umar"), json!("5 A"), json!("yes"), json!(3000)],
            )
            .expect("append 1");
        store
            .append_row("financial-dataset", &[json!(2024), json!(5)])
            .expect("append 2");

        let rows = store.fetch_all_records("financial-dataset").expect("fetch");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][4], ("paid".to_string(), json!("yes")));
        assert_eq!(rows[1].len(), 2, "narrow rows omit trailing keys");
        let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn sqlite_store_keeps_rows_across_reopen() {
        let path = temp_db("schoold-store-reopen");
        {
            let store = SqliteStore::open(&path, &[("full-dataset", &MAIN_HEADERS)]).expect("open");
            store
                .append_row("full-dataset", &[json!(2024), json!(4), json!(3)])
                .expect("append");
        }
        let store = SqliteStore::open(&path, &[("full-dataset", &MAIN_HEADERS)]).expect("reopen");
        assert_eq!(store.fetch_all_records("full-dataset").expect("fetch").len(), 1);
        let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn append_rejects_unknown_sheet_and_wide_rows() {
        let store = MemoryStore::new(&[("financial-dataset", &FINANCIAL_HEADERS)]);
        assert!(matches!(
            store.append_row("nope", &[json!(1)]),
            Err(StoreError::UnknownSheet(_))
        ));
        let wide = vec![json!(0); 7];
        assert!(matches!(
            store.append_row("financial-dataset", &wide),
            Err(StoreError::RowTooWide { width: 7, max: 6, .. })
        ));
    }

    #[test]
    fn memory_store_failure_switch_only_affects_named_sheet() {
        let store = MemoryStore::new(&[
            ("full-dataset", &MAIN_HEADERS),
            ("financial-dataset", &FINANCIAL_HEADERS),
        ]);
        store.fail_appends_to("financial-dataset");
        assert!(store.append_row("full-dataset", &[json!(2024)]).is_ok());
        assert!(store.append_row("financial-dataset", &[json!(2024)]).is_err());
        assert_eq!(store.row_count("full-dataset"), 1);
        assert_eq!(store.row_count("financial-dataset"), 0);
    }
}
