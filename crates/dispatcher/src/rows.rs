//! Recipient row parsing.
//!
//! Two input shapes are supported:
//! - pasted text, one `address[,message]` per line
//! - a spreadsheet exported as CSV, with a header row naming the columns
//!
//! Both preserve input order and never fail: unusable lines are skipped.

use std::collections::BTreeMap;

use wabulk_common::types::RecipientRow;

/// Column whose value doubles as the row's own message.
const MESSAGE_COLUMN: &str = "message";

/// Parse pasted `address[,message]` lines.
pub fn parse_pasted(text: &str) -> Vec<RecipientRow> {
    text.lines()
        .filter_map(|line| {
            let (address, message) = match line.split_once(',') {
                Some((address, message)) => (address, Some(message.trim())),
                None => (line, None),
            };

            let address = normalize_address(address);
            if address.is_empty() {
                return None;
            }

            let mut row = RecipientRow::new(address);
            if let Some(message) = message.filter(|m| !m.is_empty()) {
                row.template_override = Some(message.to_string());
            }
            Some(row)
        })
        .collect()
}

/// Parse a CSV export whose first record is a header.
///
/// The first column is the recipient address; every other column becomes a
/// named field for placeholders. Quoted fields may contain commas, `""`
/// escapes and line breaks.
pub fn parse_delimited(text: &str) -> Vec<RecipientRow> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = split_records(text).into_iter();

    let Some(header) = records.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = header.into_iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for (record_no, cells) in records.enumerate() {
        let address = cells.first().map(|c| normalize_address(c)).unwrap_or_default();
        if address.is_empty() {
            tracing::debug!(record = record_no + 1, "Skipping row without address");
            continue;
        }

        let mut fields = BTreeMap::new();
        for (name, value) in headers.iter().zip(cells.iter()).skip(1) {
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                continue;
            }
            fields.insert(name.clone(), value.to_string());
        }

        let template_override = fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(MESSAGE_COLUMN))
            .map(|(_, v)| v.clone());

        rows.push(RecipientRow {
            address,
            template_override,
            extra_fields: fields,
        });
    }

    rows
}

/// Strip formatting from a phone number.
///
/// Spaces, dashes, dots, parentheses and a leading `+` are removed. Chat ids
/// that already carry a `@` suffix (`...@c.us`, `...@g.us`) are only trimmed.
pub fn normalize_address(raw: &str) -> String {
    let raw = raw.trim().trim_matches('"').trim();
    if raw.contains('@') {
        return raw.to_string();
    }
    raw.trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect()
}

/// Split CSV text into records of cells.
///
/// Line breaks end a record only outside quotes. Blank lines are dropped.
fn split_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    cell.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if cell.trim().is_empty() => {
                cell.clear();
                in_quotes = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            ',' if !in_quotes => record.push(std::mem::take(&mut cell)),
            '\n' | '\r' if !in_quotes => {
                record.push(std::mem::take(&mut cell));
                push_record(&mut records, std::mem::take(&mut record));
            }
            _ => cell.push(c),
        }
    }
    record.push(cell);
    push_record(&mut records, record);
    records
}

fn push_record(records: &mut Vec<Vec<String>>, record: Vec<String>) {
    let blank = record.len() == 1 && record[0].trim().is_empty();
    if !blank {
        records.push(record);
    }
}
