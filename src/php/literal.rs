//! Decoding and re-encoding of quoted string literals.

use super::lexer::is_ident_start;

/// Characters that start an escape sequence after a backslash in a
/// double-quoted string.
const DOUBLE_QUOTED_ESCAPES: &[u8] = b"ntrvef01234567xu\\$\"";

/// Returns the value of a single- or double-quoted string literal.
///
/// Double-quoted strings that interpolate variables or contain escape
/// sequences other than `\\`, `\$` and `\"` return `None`, since their value
/// cannot be known or safely re-encoded.
pub fn decode(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let (quote, body) = match (bytes.first(), bytes.last()) {
        (Some(b'\''), Some(b'\'')) if bytes.len() >= 2 => {
            (b'\'', &text[1..text.len() - 1])
        }
        (Some(b'"'), Some(b'"')) if bytes.len() >= 2 => {
            (b'"', &text[1..text.len() - 1])
        }
        _ => return None,
    };

    let mut value = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quote) {
            ('\\', b'\'') => match chars.peek() {
                Some(&next) if next == '\\' || next == '\'' => {
                    value.push(next);
                    chars.next();
                }
                _ => value.push('\\'),
            },
            ('\\', _) => match chars.peek() {
                Some(&next) if matches!(next, '\\' | '$' | '"') => {
                    value.push(next);
                    chars.next();
                }
                Some(next) if next.is_ascii()
                    && DOUBLE_QUOTED_ESCAPES.contains(&(*next as u8)) =>
                {
                    return None;
                }
                _ => value.push('\\'),
            },
            ('$', b'"') => match chars.peek() {
                Some(&next) if next == '{' || is_ident_start(next) => return None,
                _ => value.push('$'),
            },
            ('{', b'"') if chars.peek() == Some(&'$') => return None,
            _ => value.push(c),
        }
    }

    Some(value)
}

/// Encodes `value` as a literal using the same quote character as
/// `original`, and the same namespace separator style: `Foo\\Bar` if the
/// original doubled its backslashes, `Foo\Bar` otherwise.
pub fn encode(value: &str, original: &str) -> String {
    let double = original.starts_with('"');
    let body = original.get(1..original.len().saturating_sub(1)).unwrap_or("");
    let doubled = body.contains("\\\\");

    let mut text = String::with_capacity(value.len() + 8);
    text.push(if double { '"' } else { '\'' });

    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let next = chars.peek().copied();
                let must_double = match (double, next) {
                    // a trailing backslash would escape the closing quote
                    (_, None) => true,
                    (false, Some(next)) => next == '\'' || next == '\\',
                    (true, Some(next)) => {
                        next.is_ascii()
                            && DOUBLE_QUOTED_ESCAPES.contains(&(next as u8))
                    }
                };

                match doubled || must_double {
                    true => text.push_str("\\\\"),
                    false => text.push('\\'),
                }
            }
            '\'' if !double => text.push_str("\\'"),
            '"' if double => text.push_str("\\\""),
            '$' if double => text.push_str("\\$"),
            _ => text.push(c),
        }
    }

    text.push(if double { '"' } else { '\'' });
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_quoted_values() {
        assert_eq!(decode(r"'Foo\Bar'").as_deref(), Some(r"Foo\Bar"));
        assert_eq!(decode(r"'Foo\\Bar'").as_deref(), Some(r"Foo\Bar"));
        assert_eq!(decode(r"'it\'s'").as_deref(), Some("it's"));
        assert_eq!(decode("''").as_deref(), Some(""));
    }

    #[test]
    fn double_quoted_values() {
        assert_eq!(decode(r#""Foo\Bar""#).as_deref(), Some(r"Foo\Bar"));
        assert_eq!(decode(r#""Foo\\Bar""#).as_deref(), Some(r"Foo\Bar"));
        assert_eq!(decode(r#""costs \$5""#).as_deref(), Some("costs $5"));
        assert_eq!(decode(r#""a $b""#), None);
        assert_eq!(decode(r#""a {$b}""#), None);
        assert_eq!(decode(r#""Foo\name""#), None);
        assert_eq!(decode(r#""$ 5""#).as_deref(), Some("$ 5"));
    }

    #[test]
    fn encoding_keeps_the_original_style() {
        assert_eq!(encode(r"P\Foo\Bar", r"'Foo\Bar'"), r"'P\Foo\Bar'");
        assert_eq!(encode(r"P\Foo\Bar", r"'Foo\\Bar'"), r"'P\\Foo\\Bar'");
        assert_eq!(encode(r"P\Foo\Bar", r#""Foo\Bar""#), r#""P\Foo\Bar""#);
        assert_eq!(encode(r"P\Foo\Bar", r#""Foo\\Bar""#), r#""P\\Foo\\Bar""#);
    }

    #[test]
    fn encoding_avoids_accidental_escapes() {
        // `\n` would become a newline inside double quotes
        assert_eq!(encode(r"P\nette\Foo", r#""Foo""#), r#""P\\nette\Foo""#);
        // a trailing separator must not escape the closing quote
        assert_eq!(encode(r"P\Foo\", "'Foo'"), r"'P\Foo\\'");
        assert_eq!(encode(r"P\Foo\", r#""Foo""#), r#""P\Foo\\""#);
    }

    #[test]
    fn encoded_values_decode_back() {
        for original in [r"'A\B'", r"'A\\B'", r#""A\B""#, r#""A\\B""#] {
            let value = r"Vendor\nested\Thing\";
            let encoded = encode(value, original);
            assert_eq!(decode(&encoded).as_deref(), Some(value), "{encoded}");
        }
    }
}
