//! CSV import/export for the local item list.
//!
//! The format is a single header line followed by one item per line. Fields
//! are never quoted; commas inside `id` and `text` are written as `~`
//! instead. Backslash escapes the rest: `\\`, `\~`, `\n` and `\r`, so any
//! text survives a round trip and every row stays on one line.

use std::fs;
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::types::{from_unix, Importance, TodoItem};

pub const HEADER: &str = "id,text,importance,deadline,isDone,dateCreated,dateEdited";

const FIELDS: usize = 7;

/// Encode a single item as a CSV row (no trailing newline).
pub fn encode_row(item: &TodoItem) -> String {
    let importance = if item.importance.is_default() {
        ""
    } else {
        item.importance.as_str()
    };
    format!(
        "{},{},{},{},{},{},{}",
        escape(&item.id),
        escape(&item.text),
        importance,
        item.deadline.map(|d| d.timestamp().to_string()).unwrap_or_default(),
        item.is_done,
        item.date_created.timestamp(),
        item.date_edited.map(|d| d.timestamp().to_string()).unwrap_or_default(),
    )
}

/// Parse a single CSV row produced by `encode_row`.
pub fn parse_row(row: &str) -> Result<TodoItem> {
    let values: Vec<&str> = row.split(',').collect();
    if values.len() != FIELDS {
        return Err(SyncError::InvalidFormat(format!(
            "expected {FIELDS} fields, found {}: {row:?}",
            values.len()
        )));
    }

    let importance = match values[2].trim() {
        "" => Importance::Basic,
        s => s.parse()?,
    };
    let is_done = match values[4].trim() {
        "true" => true,
        "false" => false,
        other => return Err(SyncError::InvalidFormat(format!("bad isDone value {other:?}"))),
    };
    let date_created = from_unix(parse_secs(values[5])?)?;

    let item = TodoItem {
        id: unescape(values[0].trim())?,
        text: unescape(values[1])?,
        importance,
        deadline: parse_optional_time(values[3])?,
        is_done,
        date_created,
        date_edited: parse_optional_time(values[6])?,
    };
    item.validate()?;
    Ok(item)
}

fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '~' => out.push_str("\\~"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ',' => out.push('~'),
            c => out.push(c),
        }
    }
    out
}

fn unescape(field: &str) -> Result<String> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        match c {
            '~' => out.push(','),
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some(c @ ('\\' | '~')) => out.push(c),
                other => {
                    return Err(SyncError::InvalidFormat(format!(
                        "bad escape \\{} in {field:?}",
                        other.map(String::from).unwrap_or_default()
                    )))
                }
            },
            c => out.push(c),
        }
    }
    Ok(out)
}

fn parse_secs(s: &str) -> Result<i64> {
    s.trim()
        .parse()
        .map_err(|_| SyncError::InvalidFormat(format!("bad timestamp {s:?}")))
}

fn parse_optional_time(s: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    if s.trim().is_empty() {
        return Ok(None);
    }
    from_unix(parse_secs(s)?).map(Some)
}

/// Encode a whole list, header included.
pub fn encode(items: &[TodoItem]) -> String {
    let mut out = String::from(HEADER);
    for item in items {
        out.push('\n');
        out.push_str(&encode_row(item));
    }
    out.push('\n');
    out
}

/// Decode a whole document. The header must match exactly; blank lines are
/// skipped.
pub fn decode(text: &str) -> Result<Vec<TodoItem>> {
    let mut lines = text.lines();
    let header = lines
        .next()
        .ok_or_else(|| SyncError::InvalidFormat("empty CSV document".to_string()))?;
    if header.trim() != HEADER {
        return Err(SyncError::InvalidFormat(format!("unexpected CSV header {header:?}")));
    }
    lines
        .filter(|line| !line.trim().is_empty())
        .map(parse_row)
        .collect()
}

pub fn write_file(path: impl AsRef<Path>, items: &[TodoItem]) -> Result<()> {
    fs::write(path, encode(items))?;
    Ok(())
}

pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<TodoItem>> {
    decode(&fs::read_to_string(path)?)
}
