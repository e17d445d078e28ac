//! Canonical JSON encoding for signed TUF metadata.
//!
//! Devices verify Targets signatures against the bytes produced here, so the
//! encoding has to match the Go canonical encoder used across the fleet
//! byte for byte:
//!
//! - object keys sorted by their UTF-8 bytes, no insignificant whitespace;
//! - integers written verbatim, floats in Go's shortest float64 form;
//! - strings escaped the way the Go encoder escapes them, including the HTML
//!   characters `<`, `>`, `&` and the line/paragraph separators U+2028/U+2029.
//!
//! Anything serializable goes through [`serde_json::Value`] first, so field
//! order in a Rust struct never leaks into the output.

use serde::Serialize;
use serde_json::{Number, Value};
use std::io::{self, Write};

/// Errors produced while canonicalizing a document.
#[derive(Debug, thiserror::Error)]
pub enum CanonicalError {
    #[error("value cannot be represented as JSON: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write canonical JSON: {0}")]
    Io(#[from] io::Error),
}

/// Serializes `value` into canonical JSON bytes.
pub fn to_canonical_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let value = serde_json::to_value(value)?;
    let mut out = Vec::with_capacity(256);
    write_value(&mut out, &value)?;
    Ok(out)
}

/// Writes an already-parsed JSON value in canonical form.
pub fn write_value<W: Write>(w: &mut W, value: &Value) -> io::Result<()> {
    match value {
        Value::Null => w.write_all(b"null"),
        Value::Bool(true) => w.write_all(b"true"),
        Value::Bool(false) => w.write_all(b"false"),
        Value::Number(n) => write_number(w, n),
        Value::String(s) => write_string(w, s),
        Value::Array(items) => {
            w.write_all(b"[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    w.write_all(b",")?;
                }
                write_value(w, item)?;
            }
            w.write_all(b"]")
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            w.write_all(b"{")?;
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    w.write_all(b",")?;
                }
                write_string(w, key)?;
                w.write_all(b":")?;
                write_value(w, item)?;
            }
            w.write_all(b"}")
        }
    }
}

/// Integers verbatim; floats as Go's `encoding/json` writes a float64.
fn write_number<W: Write>(w: &mut W, n: &Number) -> io::Result<()> {
    if n.is_i64() || n.is_u64() {
        return write!(w, "{n}");
    }
    let Some(f) = n.as_f64() else {
        return write!(w, "{n}");
    };
    let abs = f.abs();
    if abs != 0.0 && (abs < 1e-6 || abs >= 1e21) {
        // Shortest digits in exponent form, exponent always signed.
        let formatted = format!("{f:e}");
        match formatted.split_once('e') {
            Some((mantissa, exp)) if exp.starts_with('-') => write!(w, "{mantissa}e{exp}"),
            Some((mantissa, exp)) => write!(w, "{mantissa}e+{exp}"),
            None => w.write_all(formatted.as_bytes()),
        }
    } else {
        // Rust's float Display is the shortest round-trip decimal with no
        // exponent and no trailing `.0`, which is Go's 'f' format.
        write!(w, "{f}")
    }
}

const HEX: &[u8; 16] = b"0123456789abcdef";

fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_all(b"\"")?;
    let bytes = s.as_bytes();
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        let escape: Option<&[u8]> = match ch {
            '"' => Some(b"\\\""),
            '\\' => Some(b"\\\\"),
            '\n' => Some(b"\\n"),
            '\r' => Some(b"\\r"),
            '\t' => Some(b"\\t"),
            _ => None,
        };
        let needs_unicode_escape =
            ch < '\u{20}' || matches!(ch, '<' | '>' | '&' | '\u{2028}' | '\u{2029}');
        if escape.is_none() && !needs_unicode_escape {
            continue;
        }
        w.write_all(&bytes[start..i])?;
        match escape {
            Some(seq) => w.write_all(seq)?,
            None => {
                let code = ch as u32;
                let seq = [
                    b'\\',
                    b'u',
                    HEX[((code >> 12) & 0xf) as usize],
                    HEX[((code >> 8) & 0xf) as usize],
                    HEX[((code >> 4) & 0xf) as usize],
                    HEX[(code & 0xf) as usize],
                ];
                w.write_all(&seq)?;
            }
        }
        start = i + ch.len_utf8();
    }
    w.write_all(&bytes[start..])?;
    w.write_all(b"\"")
}
