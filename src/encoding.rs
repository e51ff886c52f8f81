use serde::{Deserialize, Serialize};

/// Columns of the main dataset that carry a discipline mark.
pub const DISCIPLINE_COLUMNS: [&str; 4] = ["present", "on_time", "proper_uniform", "punished"];

/// Tri-state discipline value as entered on the daily form.
///
/// `Unknown` is what the form records as "absent" (the student was not in
/// school, so uniform/punctuality could not be observed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisciplineMark {
    Present,
    Absent,
    Unknown,
}

impl DisciplineMark {
    pub fn parse_str(raw: &str) -> Option<Self> {
        let t = raw.trim();
        if t.eq_ignore_ascii_case("yes") {
            return Some(Self::Present);
        }
        if t.eq_ignore_ascii_case("no") {
            return Some(Self::Absent);
        }
        if t.eq_ignore_ascii_case("absent") {
            return Some(Self::Unknown);
        }
        t.parse::<f64>().ok().and_then(Self::from_number)
    }

    pub fn from_number(v: f64) -> Option<Self> {
        if v == 1.0 {
            Some(Self::Present)
        } else if v == 0.0 {
            Some(Self::Absent)
        } else if v == -1.0 {
            Some(Self::Unknown)
        } else {
            None
        }
    }

    pub fn parse(raw: &serde_json::Value) -> Option<Self> {
        match raw {
            serde_json::Value::String(s) => Self::parse_str(s),
            serde_json::Value::Number(n) => n.as_f64().and_then(Self::from_number),
            _ => None,
        }
    }

    /// Numeric value used by every aggregation.
    ///
    /// Absent and Unknown both encode to 0; downstream means cannot tell
    /// "no" apart from "absent". The stored sheets already rely on this.
    pub fn encoded(self) -> f64 {
        match self {
            Self::Present => 1.0,
            Self::Absent | Self::Unknown => 0.0,
        }
    }

    /// Cell text written to the sheet for this mark.
    pub fn sheet_text(self) -> &'static str {
        match self {
            Self::Present => "yes",
            Self::Absent => "no",
            Self::Unknown => "absent",
        }
    }
}

pub fn encode(raw: &serde_json::Value) -> Option<f64> {
    DisciplineMark::parse(raw).map(DisciplineMark::encoded)
}

pub fn is_discipline_column(name: &str) -> bool {
    DISCIPLINE_COLUMNS.contains(&name)
}
