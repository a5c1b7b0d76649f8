//! FITS header value literals: parsing and fixed-format serialization.

use core::str;

/// Width of the value field of a card (bytes 10..80).
pub const VALUE_FIELD_LEN: usize = 70;

/// A FITS header value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// FITS logical value (`T` or `F`).
    Logical(bool),
    /// FITS integer value.
    Integer(i64),
    /// FITS floating-point value.
    Float(f64),
    /// FITS character string (content between single quotes).
    String(String),
    /// A value already in FITS literal syntax, written as-is.
    ///
    /// Used for keywords carried over from the source container so their
    /// original formatting survives the conversion.
    Verbatim(String),
}

/// Split a value field at the ` /` comment separator.
fn split_comment(field: &[u8]) -> (&[u8], Option<&str>) {
    let len = field.len();
    let mut i = 0;
    while i + 1 < len {
        if field[i] == b' ' && field[i + 1] == b'/' {
            let mut comment_start = i + 2;
            if comment_start < len && field[comment_start] == b' ' {
                comment_start += 1;
            }
            let comment = str::from_utf8(&field[comment_start..])
                .ok()
                .map(|s| s.trim_end());
            return (&field[..i], comment.filter(|s| !s.is_empty()));
        }
        i += 1;
    }
    (field, None)
}

/// Parse a quoted FITS string starting at `field[0] == '\''`.
///
/// Doubled quotes inside the string are a literal quote. An unterminated
/// string is accepted as-is.
fn parse_string(field: &[u8]) -> (Value, Option<&str>) {
    let mut value = String::new();
    let mut i = 1;
    let len = field.len();

    while i < len {
        if field[i] == b'\'' {
            if i + 1 < len && field[i + 1] == b'\'' {
                value.push('\'');
                i += 2;
            } else {
                i += 1;
                break;
            }
        } else {
            value.push(field[i] as char);
            i += 1;
        }
    }

    let (_, comment) = split_comment(&field[i.min(len)..]);
    (Value::String(value.trim_end().to_string()), comment)
}

/// Parse a float string, handling FITS `D` exponent notation.
fn parse_float_str(s: &str) -> Option<f64> {
    // Rust accepts `inf`/`NaN`; FITS does not.
    if !s.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    let normalized = s.replace(['D', 'd'], "E");
    normalized.parse::<f64>().ok()
}

fn is_complex_literal(text: &str) -> bool {
    let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) else {
        return false;
    };
    let mut parts = inner.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(re), Some(im), None) => {
            parse_float_str(re.trim()).is_some() && parse_float_str(im.trim()).is_some()
        }
        _ => false,
    }
}

/// Parse the value field of a card (bytes 10..80).
///
/// Returns the parsed [`Value`] and an optional comment. Complex literals are
/// returned as [`Value::Verbatim`]. Returns `None` when the field is empty or
/// holds no recognizable literal.
pub fn parse_value(value_bytes: &[u8]) -> Option<(Value, Option<&str>)> {
    let start = value_bytes.iter().position(|&b| b != b' ')?;
    let value_bytes = &value_bytes[start..];

    if value_bytes[0] == b'\'' {
        return Some(parse_string(value_bytes));
    }

    let (val_part, comment) = split_comment(value_bytes);
    let val_text = str::from_utf8(val_part).ok()?.trim();
    if val_text.is_empty() {
        return None;
    }

    match val_text {
        "T" => return Some((Value::Logical(true), comment)),
        "F" => return Some((Value::Logical(false), comment)),
        _ => {}
    }

    if is_complex_literal(val_text) {
        return Some((Value::Verbatim(val_text.to_string()), comment));
    }

    if !val_text.contains(['.', 'E', 'e', 'D', 'd']) {
        if let Ok(n) = val_text.parse::<i64>() {
            return Some((Value::Integer(n), comment));
        }
    }

    parse_float_str(val_text).map(|f| (Value::Float(f), comment))
}

/// Returns `true` if `text` is a complete FITS literal (string, logical,
/// integer, float, or complex) with nothing trailing it.
pub fn is_fits_literal(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    if text.starts_with('\'') {
        return closing_quote(text.as_bytes()) == Some(text.len() - 1);
    }
    matches!(parse_value(text.as_bytes()), Some((_, None)))
}

/// Index of the quote closing a string literal that opens at byte 0.
fn closing_quote(bytes: &[u8]) -> Option<usize> {
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Number of value-field bytes `value` needs before any comment.
pub fn formatted_len(value: &Value) -> usize {
    match value {
        Value::Logical(_) | Value::Integer(_) | Value::Float(_) => 20,
        Value::String(s) => {
            let escaped = s.len() + s.bytes().filter(|&b| b == b'\'').count();
            escaped.max(8) + 2
        }
        Value::Verbatim(s) => {
            let s = s.trim();
            if s.starts_with('\'') {
                s.len()
            } else {
                s.len().max(20)
            }
        }
    }
}

/// Returns `true` if `value` does not fit the 70-byte value field and would
/// be truncated by [`format_value`].
pub fn value_overflows(value: &Value) -> bool {
    formatted_len(value) > VALUE_FIELD_LEN
}

/// Serialize a [`Value`] into the 70-byte value field of a card.
///
/// Numeric and logical values are right-justified in the first 20 bytes
/// (columns 11-30 of the card). String values start at byte 0 with a single
/// quote. Values too long for the field are truncated.
pub fn format_value(value: &Value) -> [u8; VALUE_FIELD_LEN] {
    let mut buf = [b' '; VALUE_FIELD_LEN];

    match value {
        Value::Logical(b) => {
            buf[19] = if *b { b'T' } else { b'F' };
        }
        Value::Integer(n) => {
            right_justify(n.to_string().as_bytes(), &mut buf[..20]);
        }
        Value::Float(f) => {
            right_justify(format_float(*f).as_bytes(), &mut buf[..20]);
        }
        Value::String(s) => {
            write_string(s, &mut buf);
        }
        Value::Verbatim(s) => {
            let s = s.trim();
            if s.starts_with('\'') && s.len() > VALUE_FIELD_LEN {
                // Re-quote so the cut literal still closes.
                write_string(&unquote(s), &mut buf);
            } else if s.starts_with('\'') || s.len() > 20 {
                let len = s.len().min(VALUE_FIELD_LEN);
                buf[..len].copy_from_slice(&s.as_bytes()[..len]);
            } else {
                right_justify(s.as_bytes(), &mut buf[..20]);
            }
        }
    }

    buf
}

/// Text of a quoted literal with doubled quotes collapsed.
fn unquote(literal: &str) -> String {
    let inner = match closing_quote(literal.as_bytes()) {
        Some(end) => &literal[1..end],
        None => literal.strip_prefix('\'').unwrap_or(literal),
    };
    inner.replace("''", "'").trim_end().to_string()
}

/// Right-justify `src` within `dest`, padding the left with spaces.
fn right_justify(src: &[u8], dest: &mut [u8]) {
    let len = src.len().min(dest.len());
    let start = dest.len() - len;
    dest.fill(b' ');
    dest[start..].copy_from_slice(&src[..len]);
}

/// Shortest `E` notation with up to 15 fractional digits that fits 20 bytes.
fn format_float(f: f64) -> String {
    if f == 0.0 {
        return String::from("0.0");
    }
    if f.fract() == 0.0 && f.abs() < 1e15 {
        return format!("{f:.1}");
    }
    let mut precision = 15usize;
    loop {
        let s = format!("{:.prec$E}", f, prec = precision);
        if s.len() <= 20 || precision == 0 {
            return s;
        }
        precision -= 1;
    }
}

fn write_string(s: &str, buf: &mut [u8; VALUE_FIELD_LEN]) {
    let last = VALUE_FIELD_LEN - 1;
    let mut pos = 0;
    buf[pos] = b'\'';
    pos += 1;

    for ch in s.bytes() {
        if ch == b'\'' {
            if pos + 2 > last {
                break;
            }
            buf[pos] = b'\'';
            buf[pos + 1] = b'\'';
            pos += 2;
        } else {
            if pos + 1 > last {
                break;
            }
            buf[pos] = ch;
            pos += 1;
        }
    }

    // Strings occupy at least 8 characters between the quotes.
    while pos < 9 {
        buf[pos] = b' ';
        pos += 1;
    }
    buf[pos] = b'\'';
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_field(s: &str) -> [u8; VALUE_FIELD_LEN] {
        let mut buf = [b' '; VALUE_FIELD_LEN];
        let len = s.len().min(VALUE_FIELD_LEN);
        buf[..len].copy_from_slice(&s.as_bytes()[..len]);
        buf
    }

    // ---- parsing ----

    #[test]
    fn parse_logical_with_comment() {
        let field = make_field("                   T / this is a flag");
        let (val, comment) = parse_value(&field).unwrap();
        assert_eq!(val, Value::Logical(true));
        assert_eq!(comment, Some("this is a flag"));
    }

    #[test]
    fn parse_integer_negative() {
        let field = make_field("                 -99");
        let (val, comment) = parse_value(&field).unwrap();
        assert_eq!(val, Value::Integer(-99));
        assert!(comment.is_none());
    }

    #[test]
    fn parse_float_d_exponent() {
        let field = make_field("              1.5D+3");
        let (val, _) = parse_value(&field).unwrap();
        assert_eq!(val, Value::Float(1500.0));
    }

    #[test]
    fn parse_string_with_embedded_quote() {
        let field = make_field("'O''Brien'           / observer");
        let (val, comment) = parse_value(&field).unwrap();
        assert_eq!(val, Value::String("O'Brien".into()));
        assert_eq!(comment, Some("observer"));
    }

    #[test]
    fn parse_complex_is_verbatim() {
        let field = make_field("(1.0, -2.5)");
        let (val, _) = parse_value(&field).unwrap();
        assert_eq!(val, Value::Verbatim("(1.0, -2.5)".into()));
    }

    #[test]
    fn parse_empty_field() {
        let field = make_field("");
        assert!(parse_value(&field).is_none());
    }

    // ---- literal detection ----

    #[test]
    fn literal_detection() {
        assert!(is_fits_literal("'M31'"));
        assert!(is_fits_literal("  42 "));
        assert!(is_fits_literal("-1.25E-3"));
        assert!(is_fits_literal("T"));
        assert!(is_fits_literal("(3, 4)"));
        assert!(!is_fits_literal("M31"));
        assert!(!is_fits_literal("'unterminated"));
        assert!(!is_fits_literal("'a' trailing"));
        assert!(!is_fits_literal(""));
        assert!(!is_fits_literal("12 / comment"));
    }

    // ---- formatting ----

    #[test]
    fn format_integer_right_justified() {
        let buf = format_value(&Value::Integer(16));
        assert_eq!(&buf[..20], b"                  16");
    }

    #[test]
    fn format_logical_column_30() {
        let buf = format_value(&Value::Logical(true));
        assert_eq!(buf[19], b'T');
        assert!(buf[..19].iter().all(|&b| b == b' '));
    }

    #[test]
    fn format_whole_float() {
        let buf = format_value(&Value::Float(32768.0));
        assert_eq!(&buf[..20], b"             32768.0");
    }

    #[test]
    fn format_fractional_float_parses_back() {
        let buf = format_value(&Value::Float(0.1234567));
        let (val, _) = parse_value(&buf).unwrap();
        match val {
            Value::Float(f) => assert!((f - 0.1234567).abs() < 1e-12),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn format_short_string_padded_to_eight() {
        let buf = format_value(&Value::String("M31".into()));
        assert_eq!(&buf[..10], b"'M31     '");
    }

    #[test]
    fn format_string_escapes_quote() {
        let buf = format_value(&Value::String("it's".into()));
        let (val, _) = parse_value(&buf).unwrap();
        assert_eq!(val, Value::String("it's".into()));
    }

    #[test]
    fn format_long_string_truncated_but_closed() {
        let long = "x".repeat(100);
        let value = Value::String(long);
        assert!(value_overflows(&value));
        let buf = format_value(&value);
        assert_eq!(buf[0], b'\'');
        assert_eq!(buf[VALUE_FIELD_LEN - 1], b'\'');
    }

    #[test]
    fn format_verbatim_numeric_and_string() {
        let buf = format_value(&Value::Verbatim("1.50".into()));
        assert_eq!(&buf[..20], b"                1.50");

        let buf = format_value(&Value::Verbatim("'Ha'".into()));
        assert_eq!(&buf[..4], b"'Ha'");
    }

    #[test]
    fn format_long_quoted_verbatim_stays_closed() {
        let literal = format!("'{}''s notes'", "A".repeat(80));
        let value = Value::Verbatim(literal);
        assert!(value_overflows(&value));
        let buf = format_value(&value);
        assert_eq!(buf[0], b'\'');
        assert_eq!(buf[VALUE_FIELD_LEN - 1], b'\'');
        match parse_value(&buf).unwrap().0 {
            Value::String(s) => {
                assert_eq!(s.len(), VALUE_FIELD_LEN - 2);
                assert!(s.bytes().all(|b| b == b'A'));
            }
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn overflow_limits() {
        assert!(!value_overflows(&Value::String("a".repeat(68))));
        assert!(value_overflows(&Value::String("a".repeat(69))));
        assert!(!value_overflows(&Value::Integer(i64::MIN)));
    }
}
