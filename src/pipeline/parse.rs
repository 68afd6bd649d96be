//! Response parsing: untrusted model text → typed timesheet entries.
//!
//! The model is asked for a bare JSON array, but replies routinely arrive
//! wrapped in prose ("Here you go: [...] Thanks.") or code fences. Parsing
//! is therefore two-staged:
//!
//! 1. **Strict**: the whole trimmed reply decodes as JSON.
//! 2. **Recovery**: scan for `[`, find the matching `]` while respecting
//!    string literals and escapes, and decode that slice. Candidates are
//!    tried left to right; the first that decodes as an array wins.
//!
//! The outcome is returned as a value, never thrown, so the engine can
//! count recovered batches separately from clean ones.
//!
//! Recovery is best-effort: a reply holding two arrays yields only the
//! first, and a truncated array (no closing bracket) is not repaired.

use crate::output::TimesheetEntry;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// What a reply turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The reply was exactly a JSON array.
    Parsed(Vec<TimesheetEntry>),
    /// An array was found inside surrounding text.
    Recovered(Vec<TimesheetEntry>),
    /// Nothing usable.
    Failed(ParseFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseFailure {
    /// Valid JSON, but an object/string/number instead of an array.
    NotAnArray,
    /// No balanced `[...]` anywhere in the text.
    NoArrayFound,
    /// Bracketed candidates existed but none decoded; carries the last error.
    Malformed(String),
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseFailure::NotAnArray => write!(f, "response is not a JSON array"),
            ParseFailure::NoArrayFound => write!(f, "no JSON array found in response"),
            ParseFailure::Malformed(e) => write!(f, "malformed JSON array: {e}"),
        }
    }
}

impl ParseOutcome {
    /// Entries carried by a successful outcome; empty on failure.
    pub fn into_entries(self) -> Vec<TimesheetEntry> {
        match self {
            ParseOutcome::Parsed(e) | ParseOutcome::Recovered(e) => e,
            ParseOutcome::Failed(_) => Vec::new(),
        }
    }
}

/// Parse a model reply into timesheet entries.
pub fn parse_entries(text: &str) -> ParseOutcome {
    let trimmed = text.trim();

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => return ParseOutcome::Parsed(entries_from_values(&items)),
        Ok(_) => return ParseOutcome::Failed(ParseFailure::NotAnArray),
        Err(_) => {}
    }

    let mut last_error: Option<String> = None;
    for (start, _) in trimmed.match_indices('[') {
        let Some(end) = matching_bracket(trimmed, start) else {
            continue;
        };
        match serde_json::from_str::<Value>(&trimmed[start..=end]) {
            Ok(Value::Array(items)) => {
                return ParseOutcome::Recovered(entries_from_values(&items));
            }
            Ok(_) => {}
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    match last_error {
        Some(e) => ParseOutcome::Failed(ParseFailure::Malformed(e)),
        None => ParseOutcome::Failed(ParseFailure::NoArrayFound),
    }
}

/// Byte index of the `]` closing the `[` at `start`, skipping brackets that
/// appear inside JSON string literals.
fn matching_bracket(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '[' if !in_string => depth += 1,
            ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn entries_from_values(items: &[Value]) -> Vec<TimesheetEntry> {
    items
        .iter()
        .filter_map(Value::as_object)
        .map(entry_from_object)
        .collect()
}

fn entry_from_object(obj: &Map<String, Value>) -> TimesheetEntry {
    TimesheetEntry {
        employee_name: text_field(obj, "employee_name"),
        date: normalise_date(&text_field(obj, "date")),
        hours: number_field(obj, "hours"),
        submission_status: text_field(obj, "submission_status"),
        week: text_field(obj, "week"),
        total_hours: number_field(obj, "total_hours"),
        source_file: String::new(),
    }
}

fn text_field(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

static RE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").unwrap());

/// Numbers may come back as `8`, `8.0`, `"8"` or `"8.5 hrs"`.
fn number_field(obj: &Map<String, Value>, key: &str) -> f64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => RE_NUMBER
            .find(s)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

static RE_ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").unwrap());
static RE_US_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").unwrap());

/// Bring `2025-06-09` and `6/9/2025` to `06/09/2025`; leave anything else as-is.
fn normalise_date(raw: &str) -> String {
    if let Some(c) = RE_ISO_DATE.captures(raw) {
        return format!("{:0>2}/{:0>2}/{}", &c[2], &c[3], &c[1]);
    }
    if let Some(c) = RE_US_DATE.captures(raw) {
        return format!("{:0>2}/{:0>2}/{}", &c[1], &c[2], &c[3]);
    }
    raw.to_string()
}
