//! IRCv3 message tag escaping utilities.

use std::collections::HashMap;
use std::fmt::{Result as FmtResult, Write};

/// Escape a tag value for serialization.
///
/// Escapes special characters according to the IRCv3 message-tags spec.
pub fn escape_tag_value(f: &mut dyn Write, value: &str) -> FmtResult {
    for c in value.chars() {
        match c {
            ';' => f.write_str("\\:")?,
            ' ' => f.write_str("\\s")?,
            '\\' => f.write_str("\\\\")?,
            '\r' => f.write_str("\\r")?,
            '\n' => f.write_str("\\n")?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

/// Unescape a tag value from wire format.
///
/// Reverses the escaping applied by [`escape_tag_value`]. A trailing lone
/// backslash is dropped rather than treated as an error.
pub fn unescape_tag_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut iter = value.chars();
    while let Some(c) = iter.next() {
        let r = if c == '\\' {
            match iter.next() {
                Some(':') => ';',
                Some('s') => ' ',
                Some('\\') => '\\',
                Some('r') => '\r',
                Some('n') => '\n',
                Some(c) => c,
                None => break,
            }
        } else {
            c
        };
        unescaped.push(r);
    }
    unescaped
}

/// Parse a raw tag block (without the leading `@`) into a map.
///
/// Keys without a value map to the empty string. Later duplicates win.
pub fn parse_tags(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter(|s| !s.is_empty())
        .map(|tag| match tag.split_once('=') {
            Some((k, v)) => (k.to_owned(), unescape_tag_value(v)),
            None => (tag.to_owned(), String::new()),
        })
        .collect()
}

/// Format a tag map into a raw tag block (without the leading `@`).
///
/// Keys are emitted in sorted order so the output is deterministic.
pub fn format_tags(tags: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = tags.keys().collect();
    keys.sort();

    let mut out = String::new();
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        out.push_str(key);
        let value = &tags[key];
        if !value.is_empty() {
            out.push('=');
            // Writing into a String cannot fail.
            let _ = escape_tag_value(&mut out, value);
        }
    }
    out
}
