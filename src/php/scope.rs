//! Import tables and PHP's compile-time name resolution.

use std::collections::HashMap;

use super::name::{self, SymbolKind, SEPARATOR};

/// The aliases introduced by the `use` statements of one namespace block.
///
/// Class and function aliases are case-insensitive; constant aliases are
/// not. Class aliases also cover namespace imports, since PHP resolves the
/// first segment of a qualified name against the class table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aliases {
    classes: HashMap<String, String>,
    functions: HashMap<String, String>,
    constants: HashMap<String, String>,
}

impl Aliases {
    pub fn insert(&mut self, kind: SymbolKind, alias: &str, target: String) {
        let key = kind.normalize(alias).into_owned();
        self.table_mut(kind).insert(key, target);
    }

    pub fn get(&self, kind: SymbolKind, alias: &str) -> Option<&str> {
        self.table(kind)
            .get(kind.normalize(alias).as_ref())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
            && self.functions.is_empty()
            && self.constants.is_empty()
    }

    /// Returns a copy of `self` with every target passed through `f`.
    pub fn map_targets<F>(&self, mut f: F) -> Aliases
    where
        F: FnMut(SymbolKind, &str) -> String,
    {
        let mut map = |kind: SymbolKind, table: &HashMap<String, String>| {
            table
                .iter()
                .map(|(alias, target)| (alias.clone(), f(kind, target)))
                .collect::<HashMap<_, _>>()
        };

        Aliases {
            classes: map(SymbolKind::ClassLike, &self.classes),
            functions: map(SymbolKind::Function, &self.functions),
            constants: map(SymbolKind::Constant, &self.constants),
        }
    }

    fn table(&self, kind: SymbolKind) -> &HashMap<String, String> {
        match kind {
            SymbolKind::ClassLike => &self.classes,
            SymbolKind::Function => &self.functions,
            SymbolKind::Constant => &self.constants,
        }
    }

    fn table_mut(&mut self, kind: SymbolKind) -> &mut HashMap<String, String> {
        match kind {
            SymbolKind::ClassLike => &mut self.classes,
            SymbolKind::Function => &mut self.functions,
            SymbolKind::Constant => &mut self.constants,
        }
    }
}

/// The result of resolving a name as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// The name denotes exactly one fully-qualified symbol.
    Exact(String),
    /// An unqualified function or constant name inside a namespace, which
    /// PHP resolves to `namespaced` if that exists at runtime and to
    /// `global` otherwise.
    Fallback { namespaced: String, global: String },
}

/// A namespace together with its imports.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub namespace: Option<&'a str>,
    pub aliases: &'a Aliases,
}

impl<'a> Scope<'a> {
    pub fn new(namespace: Option<&'a str>, aliases: &'a Aliases) -> Self {
        Self { namespace, aliases }
    }

    /// Resolves `text`, a name as it appears in source, to the symbol it
    /// denotes when used as a `kind`.
    pub fn resolve(&self, kind: SymbolKind, text: &str) -> Resolved {
        if let Some(rest) = text.strip_prefix(SEPARATOR) {
            return Resolved::Exact(rest.to_owned());
        }

        let (first, rest) = name::split_first(text);

        if let Some(rest) = rest {
            if first.eq_ignore_ascii_case("namespace") {
                return Resolved::Exact(name::join(self.namespace, rest));
            }

            return match self.aliases.get(SymbolKind::ClassLike, first) {
                Some(target) => Resolved::Exact(format!("{target}\\{rest}")),
                None => Resolved::Exact(name::join(self.namespace, text)),
            };
        }

        if let Some(target) = self.aliases.get(kind, text) {
            return Resolved::Exact(target.to_owned());
        }

        match (kind, self.namespace) {
            (SymbolKind::ClassLike, namespace) => {
                Resolved::Exact(name::join(namespace, text))
            }
            (_, None) => Resolved::Exact(text.to_owned()),
            (_, Some(namespace)) => Resolved::Fallback {
                namespaced: name::join(Some(namespace), text),
                global: text.to_owned(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> Aliases {
        let mut aliases = Aliases::default();
        aliases.insert(SymbolKind::ClassLike, "Client", "Guzzle\\Client".into());
        aliases.insert(SymbolKind::ClassLike, "Psr7", "Guzzle\\Psr7".into());
        aliases.insert(SymbolKind::Function, "Helper", "Guzzle\\helper".into());
        aliases.insert(SymbolKind::Constant, "MAX", "Guzzle\\MAX".into());
        aliases
    }

    #[test]
    fn fully_qualified_names_ignore_scope() {
        let aliases = aliases();
        let scope = Scope::new(Some("App"), &aliases);
        assert_eq!(
            scope.resolve(SymbolKind::ClassLike, "\\Client"),
            Resolved::Exact("Client".into())
        );
    }

    #[test]
    fn class_names_use_imports_then_namespace() {
        let aliases = aliases();
        let scope = Scope::new(Some("App"), &aliases);

        assert_eq!(
            scope.resolve(SymbolKind::ClassLike, "client"),
            Resolved::Exact("Guzzle\\Client".into())
        );
        assert_eq!(
            scope.resolve(SymbolKind::ClassLike, "Psr7\\Request"),
            Resolved::Exact("Guzzle\\Psr7\\Request".into())
        );
        assert_eq!(
            scope.resolve(SymbolKind::ClassLike, "Other"),
            Resolved::Exact("App\\Other".into())
        );
        assert_eq!(
            scope.resolve(SymbolKind::ClassLike, "namespace\\Other"),
            Resolved::Exact("App\\Other".into())
        );
    }

    #[test]
    fn functions_and_constants_fall_back_to_global() {
        let aliases = aliases();
        let scope = Scope::new(Some("App"), &aliases);

        assert_eq!(
            scope.resolve(SymbolKind::Function, "strlen"),
            Resolved::Fallback {
                namespaced: "App\\strlen".into(),
                global: "strlen".into(),
            }
        );
        assert_eq!(
            scope.resolve(SymbolKind::Function, "helper"),
            Resolved::Exact("Guzzle\\helper".into())
        );
        assert_eq!(
            scope.resolve(SymbolKind::Constant, "MAX"),
            Resolved::Exact("Guzzle\\MAX".into())
        );
        // constant aliases are case-sensitive
        assert!(matches!(
            scope.resolve(SymbolKind::Constant, "max"),
            Resolved::Fallback { .. }
        ));
    }

    #[test]
    fn global_scope_has_no_fallback() {
        let aliases = Aliases::default();
        let scope = Scope::new(None, &aliases);
        assert_eq!(
            scope.resolve(SymbolKind::Function, "foo"),
            Resolved::Exact("foo".into())
        );
        assert_eq!(
            scope.resolve(SymbolKind::ClassLike, "Foo\\Bar"),
            Resolved::Exact("Foo\\Bar".into())
        );
    }

    #[test]
    fn mapped_aliases() {
        let aliases = aliases().map_targets(|_, target| format!("P\\{target}"));
        assert_eq!(
            aliases.get(SymbolKind::ClassLike, "CLIENT"),
            Some("P\\Guzzle\\Client")
        );
    }
}
