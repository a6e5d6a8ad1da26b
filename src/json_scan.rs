//! Allocation-free field extraction over JSON text spans
//!
//! Provider catalogs run to tens of thousands of objects, so responses are
//! never parsed into a tree. [`for_each_object`] walks a top-level array once
//! and hands out each object as a borrowed span; the `extract_*` functions
//! then pull single fields out of that span on demand.
//!
//! Every function is best-effort: absence and malformed content both come
//! back as `None`, never as a panic or an error.

use std::str::Chars;

/// Position of `"key"` when it appears as a key of the span's own object.
///
/// Keys of nested objects and text inside string values do not match; use
/// [`extract_raw`] to narrow to a nested object first.
pub fn find_key(obj: &str, key: &str) -> Option<usize> {
    let bytes = obj.as_bytes();
    let key = key.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let start = i;
                let end = skip_string(bytes, i)?;
                if depth == 1 && &bytes[start + 1..end] == key {
                    // only a key when a ':' follows
                    let after = skip_ws(bytes, end + 1);
                    if bytes.get(after) == Some(&b':') {
                        return Some(start);
                    }
                }
                i = end + 1;
                continue;
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Integer field; accepts `42`, `-7` and the quoted forms `"42"`, `"-7"`.
pub fn extract_int(obj: &str, key: &str) -> Option<i64> {
    let bytes = obj.as_bytes();
    let mut pos = value_start(obj, key)?;

    // some providers quote numeric fields
    if bytes.get(pos) == Some(&b'"') {
        pos += 1;
    }

    let negative = bytes.get(pos) == Some(&b'-');
    if negative {
        pos += 1;
    }

    let mut value: i64 = 0;
    let mut any = false;
    while let Some(&b) = bytes.get(pos) {
        if !b.is_ascii_digit() {
            break;
        }
        value = value.checked_mul(10)?.checked_add(i64::from(b - b'0'))?;
        any = true;
        pos += 1;
    }

    if !any {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Boolean field; accepts `true`, `false`, `1` and `0`.
pub fn extract_bool(obj: &str, key: &str) -> Option<bool> {
    let pos = value_start(obj, key)?;
    let rest = &obj.as_bytes()[pos..];
    if rest.starts_with(b"true") || rest.starts_with(b"1") {
        Some(true)
    } else if rest.starts_with(b"false") || rest.starts_with(b"0") {
        Some(false)
    } else {
        None
    }
}

/// String field with JSON escapes decoded.
///
/// `\uXXXX` surrogate pairs are combined; a lone surrogate becomes U+FFFD. A
/// malformed escape is kept as its literal character.
pub fn extract_string(obj: &str, key: &str) -> Option<String> {
    let pos = value_start(obj, key)?;
    decode_string(&obj[pos..])
}

/// The exact `{...}` or `[...]` text of a nested value.
pub fn extract_raw<'a>(obj: &'a str, key: &str) -> Option<&'a str> {
    let pos = value_start(obj, key)?;
    let bytes = obj.as_bytes();
    if !matches!(bytes.get(pos), Some(b'{') | Some(b'[')) {
        return None;
    }

    let mut depth = 0usize;
    let mut i = pos;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = skip_string(bytes, i)?;
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&obj[pos..=i]);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Calls `f` with every top-level `{...}` span of a JSON array.
///
/// Returns `false` when the text does not start with `[` (after whitespace),
/// so "not an array" can be told apart from an empty array. Runs in one pass
/// and allocates nothing.
pub fn for_each_object<'a, F>(json: &'a str, mut f: F) -> bool
where
    F: FnMut(&'a str),
{
    let bytes = json.as_bytes();
    let open = skip_ws(bytes, 0);
    if bytes.get(open) != Some(&b'[') {
        return false;
    }

    let mut in_string = false;
    let mut escape = false;
    let mut depth = 0usize;
    let mut obj_start: Option<usize> = None;

    for (i, &c) in bytes.iter().enumerate().skip(open + 1) {
        if in_string {
            if escape {
                escape = false;
            } else if c == b'\\' {
                escape = true;
            } else if c == b'"' {
                in_string = false;
            }
            continue;
        }

        match c {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    obj_start = Some(i);
                }
                depth += 1;
            }
            b'[' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(start) = obj_start.take() {
                        f(&json[start..=i]);
                    }
                }
            }
            b']' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    true
}

/// Index of the first non-whitespace byte of the value stored under `key`.
fn value_start(obj: &str, key: &str) -> Option<usize> {
    let bytes = obj.as_bytes();
    let key_pos = find_key(obj, key)?;
    let key_end = key_pos + key.len() + 2;
    let colon = skip_ws(bytes, key_end);
    if bytes.get(colon) != Some(&b':') {
        return None;
    }
    let pos = skip_ws(bytes, colon + 1);
    if pos >= bytes.len() {
        return None;
    }
    Some(pos)
}

fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos).is_some_and(|b| b.is_ascii_whitespace()) {
        pos += 1;
    }
    pos
}

/// Index of the closing quote of the string opening at `start`.
fn skip_string(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Decodes the JSON string literal at the start of `text`.
fn decode_string(text: &str) -> Option<String> {
    let body = text.strip_prefix('"')?;
    let mut out = String::with_capacity(64);
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(out),
            '\\' => {
                let esc = chars.next()?;
                match esc {
                    '"' | '\\' | '/' => out.push(esc),
                    'b' => out.push('\u{08}'),
                    'f' => out.push('\u{0C}'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'u' => decode_unicode_escape(&mut chars, &mut out),
                    other => out.push(other),
                }
            }
            _ => out.push(c),
        }
    }

    // unterminated
    None
}

/// Handles the text after `\u`; `chars` is advanced past what was consumed.
fn decode_unicode_escape(chars: &mut Chars<'_>, out: &mut String) {
    let Some(unit) = peek_hex4(chars) else {
        out.push('u');
        return;
    };
    chars.nth(3);

    if (0xD800..=0xDBFF).contains(&unit) {
        let mut ahead = chars.clone();
        if ahead.next() == Some('\\') && ahead.next() == Some('u') {
            if let Some(low) = peek_hex4(&ahead) {
                if (0xDC00..=0xDFFF).contains(&low) {
                    let cp = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                    out.push(char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER));
                    // backslash, 'u', four hex digits
                    chars.nth(5);
                    return;
                }
            }
        }
        out.push(char::REPLACEMENT_CHARACTER);
        return;
    }

    // lone low surrogates fail here too
    out.push(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER));
}

fn peek_hex4(chars: &Chars<'_>) -> Option<u32> {
    let mut ahead = chars.clone();
    let mut value = 0u32;
    for _ in 0..4 {
        value = value * 16 + ahead.next()?.to_digit(16)?;
    }
    Some(value)
}

#[cfg(test)]
#[path = "json_scan_tests.rs"]
mod tests;
