//! Input preparation for provider XMLTV bodies
//!
//! Handles gzip-compressed feeds and repairs the two defects seen most often
//! in the wild: raw control characters and unescaped ampersands.

use std::borrow::Cow;
use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::FetchError;
use crate::transport::MAX_BODY_BYTES;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Inflates `bytes` when they carry the gzip magic number.
pub fn inflate_if_gzip(bytes: &[u8]) -> Result<Cow<'_, [u8]>, FetchError> {
    if !is_gzip(bytes) {
        return Ok(Cow::Borrowed(bytes));
    }

    let mut out = Vec::with_capacity(bytes.len().saturating_mul(4));
    GzDecoder::new(bytes)
        .take(MAX_BODY_BYTES + 1)
        .read_to_end(&mut out)
        .map_err(|e| FetchError::ShapeMismatch(format!("Invalid gzip XMLTV data: {}", e)))?;

    if out.len() as u64 > MAX_BODY_BYTES {
        return Err(FetchError::ShapeMismatch(format!(
            "Decompressed XMLTV exceeds {} bytes",
            MAX_BODY_BYTES
        )));
    }
    Ok(Cow::Owned(out))
}

/// Replaces control characters illegal in XML 1.0 with spaces and escapes
/// ampersands that do not start an entity. Borrows when nothing changes.
pub fn sanitize(bytes: &[u8]) -> Cow<'_, [u8]> {
    let first_bad = bytes
        .iter()
        .enumerate()
        .position(|(i, &b)| needs_fix(b) || (b == b'&' && !is_entity_start(&bytes[i..])));

    let Some(first_bad) = first_bad else {
        return Cow::Borrowed(bytes);
    };

    let mut out = Vec::with_capacity(bytes.len() + 64);
    out.extend_from_slice(&bytes[..first_bad]);
    for (i, &b) in bytes.iter().enumerate().skip(first_bad) {
        if b == b'&' && !is_entity_start(&bytes[i..]) {
            out.extend_from_slice(b"&amp;");
        } else if needs_fix(b) {
            out.push(b' ');
        } else {
            out.push(b);
        }
    }
    Cow::Owned(out)
}

fn needs_fix(b: u8) -> bool {
    // tab, LF and CR are the only legal C0 controls
    matches!(b, 0x00..=0x08 | 0x0B | 0x0C | 0x0E..=0x1F | 0x7F)
}

/// Whether `bytes` (starting at '&') look like `&name;` or `&#...;`.
fn is_entity_start(bytes: &[u8]) -> bool {
    if bytes.get(1) == Some(&b'#') {
        return true;
    }
    for (i, &b) in bytes.iter().enumerate().take(10).skip(1) {
        match b {
            b';' => return i > 1,
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => {}
            _ => return false,
        }
    }
    false
}
