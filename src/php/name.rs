//! Qualified names and PHP's name resolution rules.

use std::borrow::Cow;

use super::lexer::{ident_len, is_ident_start};

pub const SEPARATOR: char = '\\';

/// The three symbol tables PHP resolves names against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolKind {
    /// Classes, interfaces, traits and enums share one table.
    ClassLike,
    Function,
    Constant,
}

impl SymbolKind {
    /// Class-like and function names are case-insensitive in PHP; constant
    /// names are not (apart from their namespace part, which we ignore).
    pub fn is_case_insensitive(self) -> bool {
        !matches!(self, SymbolKind::Constant)
    }

    /// Returns the lookup key for `name` in this table.
    pub fn normalize(self, name: &str) -> Cow<'_, str> {
        match self.is_case_insensitive() {
            true if name.bytes().any(|b| b.is_ascii_uppercase()) => {
                Cow::Owned(name.to_ascii_lowercase())
            }
            _ => Cow::Borrowed(name),
        }
    }

    pub fn eq(self, a: &str, b: &str) -> bool {
        match self.is_case_insensitive() {
            true => a.eq_ignore_ascii_case(b),
            false => a == b,
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolKind::ClassLike => write!(f, "class"),
            SymbolKind::Function => write!(f, "function"),
            SymbolKind::Constant => write!(f, "constant"),
        }
    }
}

/// Strips a leading separator from a fully-qualified name.
pub fn strip_leading(name: &str) -> &str {
    name.strip_prefix(SEPARATOR).unwrap_or(name)
}

/// Joins a namespace (possibly the global namespace) and a relative name.
pub fn join(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}{SEPARATOR}{name}"),
        _ => name.to_owned(),
    }
}

/// Splits `Foo\Bar\Baz` into `Foo` and `Some("Bar\Baz")`.
pub fn split_first(name: &str) -> (&str, Option<&str>) {
    match name.split_once(SEPARATOR) {
        Some((first, rest)) => (first, Some(rest)),
        None => (name, None),
    }
}

pub fn last_segment(name: &str) -> &str {
    name.rsplit_once(SEPARATOR).map_or(name, |(_, last)| last)
}

/// Returns the namespace part of a fully-qualified name, or `None` for a
/// global name.
pub fn namespace_of(name: &str) -> Option<&str> {
    name.rsplit_once(SEPARATOR).map(|(ns, _)| ns)
}

/// Returns `true` if `name` is `namespace` or lies somewhere beneath it,
/// comparing case-insensitively and on segment boundaries.
pub fn is_within(name: &str, namespace: &str) -> bool {
    let (name, namespace) = (strip_leading(name), strip_leading(namespace));
    if namespace.is_empty() {
        return true;
    }

    match name.get(..namespace.len()) {
        Some(head) if head.eq_ignore_ascii_case(namespace) => {
            name.len() == namespace.len()
                || name[namespace.len()..].starts_with(SEPARATOR)
        }
        _ => false,
    }
}

/// Iterates over the namespaces enclosing `namespace`, outermost first, and
/// ending with `namespace` itself: `Foo`, `Foo\Bar`, `Foo\Bar\Baz`.
pub fn ancestors(namespace: &str) -> impl Iterator<Item = &str> {
    namespace
        .match_indices(SEPARATOR)
        .map(|(idx, _)| &namespace[..idx])
        .chain(std::iter::once(namespace))
        .filter(|ns| !ns.is_empty())
}

/// Returns `true` if `text` is a syntactically valid qualified name, such as
/// `Foo\Bar` or `\Foo`. A single trailing separator is accepted when
/// `allow_trailing` is set, for namespace prefixes like `Foo\Bar\`.
pub fn is_valid_qualified(text: &str, allow_trailing: bool) -> bool {
    let text = strip_leading(text);
    let text = match allow_trailing {
        true => text.strip_suffix(SEPARATOR).unwrap_or(text),
        false => text,
    };

    text.split(SEPARATOR)
        .all(|segment| !segment.is_empty() && ident_len(segment) == segment.len())
}

/// Returns `true` if every segment of `name` starts with an uppercase ASCII
/// letter, the usual shape of a class name.
pub fn looks_like_class(name: &str) -> bool {
    strip_leading(name)
        .split(SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .all(|segment| {
            segment.starts_with(|c: char| c.is_ascii_uppercase())
                && segment.starts_with(is_ident_start)
        })
}

/// Reserved words that can never be a reference to a user symbol. Compared
/// against lowercased identifiers.
const KEYWORDS: &[&str] = &[
    "__halt_compiler", "abstract", "and", "array", "as", "break", "callable",
    "case", "catch", "class", "clone", "const", "continue", "declare",
    "default", "die", "do", "echo", "else", "elseif", "empty", "enddeclare",
    "endfor", "endforeach", "endif", "endswitch", "endwhile", "enum", "eval",
    "exit", "extends", "false", "final", "finally", "fn", "for", "foreach",
    "function", "global", "goto", "if", "implements", "include",
    "include_once", "instanceof", "insteadof", "interface", "isset", "list",
    "match", "namespace", "new", "null", "or", "parent", "print", "private",
    "protected", "public", "readonly", "require", "require_once", "return",
    "self", "static", "switch", "throw", "trait", "true", "try", "unset",
    "use", "var", "while", "xor", "yield",
];

/// Type names that are not class references when used in a type position.
const BUILTIN_TYPES: &[&str] = &[
    "array", "bool", "callable", "false", "float", "int", "iterable",
    "mixed", "never", "null", "object", "parent", "self", "static", "string",
    "true", "void",
];

pub fn is_keyword(lower: &str) -> bool {
    KEYWORDS.contains(&lower)
}

pub fn is_builtin_type(lower: &str) -> bool {
    BUILTIN_TYPES.contains(&lower)
}

/// `self`, `static` and `parent` refer to the enclosing class hierarchy.
pub fn is_relative_class(lower: &str) -> bool {
    matches!(lower, "self" | "static" | "parent")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_respects_case_rules() {
        assert_eq!(SymbolKind::ClassLike.normalize("Foo\\Bar"), "foo\\bar");
        assert_eq!(SymbolKind::Function.normalize("foo"), "foo");
        assert_eq!(SymbolKind::Constant.normalize("Foo\\BAR"), "Foo\\BAR");
        assert!(SymbolKind::ClassLike.eq("A\\b", "a\\B"));
        assert!(!SymbolKind::Constant.eq("A\\b", "a\\B"));
    }

    #[test]
    fn within_checks_segment_boundaries() {
        assert!(is_within("GuzzleHttp\\Psr7\\Request", "GuzzleHttp"));
        assert!(is_within("\\guzzlehttp\\Client", "GuzzleHttp"));
        assert!(is_within("GuzzleHttp", "GuzzleHttp"));
        assert!(!is_within("GuzzleHttpX\\Client", "GuzzleHttp"));
        assert!(!is_within("Guzzle", "GuzzleHttp"));
    }

    #[test]
    fn ancestors_are_outermost_first() {
        let found: Vec<_> = ancestors("A\\B\\C").collect();
        assert_eq!(found, ["A", "A\\B", "A\\B\\C"]);
        assert_eq!(ancestors("A").collect::<Vec<_>>(), ["A"]);
    }

    #[test]
    fn qualified_name_validation() {
        assert!(is_valid_qualified("Foo\\Bar", false));
        assert!(is_valid_qualified("\\Foo", false));
        assert!(!is_valid_qualified("Foo\\", false));
        assert!(is_valid_qualified("Foo\\", true));
        assert!(!is_valid_qualified("Foo\\\\Bar", false));
        assert!(!is_valid_qualified("Foo Bar", false));
        assert!(!is_valid_qualified("%s\\Bar", false));
        assert!(!is_valid_qualified("", true));
        assert!(!is_valid_qualified("\\", true));
        assert!(!is_valid_qualified("Foo\\\\", true));
        assert!(!is_valid_qualified("\\\\Foo", false));
    }

    #[test]
    fn splitting_and_joining() {
        assert_eq!(split_first("A\\B\\C"), ("A", Some("B\\C")));
        assert_eq!(split_first("A"), ("A", None));
        assert_eq!(last_segment("A\\B\\C"), "C");
        assert_eq!(namespace_of("A\\B\\C"), Some("A\\B"));
        assert_eq!(namespace_of("C"), None);
        assert_eq!(join(Some("A"), "B"), "A\\B");
        assert_eq!(join(None, "B"), "B");
    }

    #[test]
    fn class_shape() {
        assert!(looks_like_class("Foo\\Bar"));
        assert!(!looks_like_class("foo\\bar"));
    }
}
