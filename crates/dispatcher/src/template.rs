//! `{field}` placeholder substitution for bulk message templates.

use wabulk_common::types::RecipientRow;

/// Replace every `{key}` in `template` with `row.extra_fields[key]`.
///
/// Keys are matched case-sensitively and missing keys render as an empty
/// string. Substituted values are not scanned again. Braces that do not form a
/// `{key}` pair (an unclosed `{`, a stray `}`, or an empty `{}`) are copied
/// through unchanged.
pub fn render_template(template: &str, row: &RecipientRow) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        match after.find(['{', '}']) {
            Some(close) if after.as_bytes()[close] == b'}' && close > 0 => {
                let key = &after[..close];
                if let Some(value) = row.extra_fields.get(key) {
                    out.push_str(value);
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
