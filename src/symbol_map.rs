//! The map from original to prefixed symbols.
//!
//! A [`SymbolMapBuilder`] collects declarations while files are scanned, and
//! is then frozen into a [`SymbolMap`], which is read-only and shared by the
//! rewriting workers.

use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    manifest::ExcludeSettings,
    package::PackageId,
    php::{
        name::{self, SymbolKind},
        outline::ClassLikeKind,
    },
    symbol::{StringInterner, Symbol},
};

/// Where a symbol was declared: a package, and the index of the file in its
/// sorted file list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin {
    pub package: PackageId,
    pub file: usize,
}

/// Names that are never prefixed.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    namespaces: Vec<String>,
    classes: HashSet<String>,
    functions: HashSet<String>,
    constants: HashSet<String>,
}

impl Exclusions {
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Returns `true` if `namespace` is, or lies under, an excluded
    /// namespace.
    pub fn excludes_namespace(&self, namespace: &str) -> bool {
        self.namespaces.iter().any(|ns| name::is_within(namespace, ns))
    }

    /// Returns `true` if the fully-qualified `name` of a `kind` symbol is
    /// excluded, either by name or by namespace.
    pub fn excludes(&self, kind: SymbolKind, name: &str) -> bool {
        let name = name::strip_leading(name);
        let listed = match kind {
            SymbolKind::ClassLike => &self.classes,
            SymbolKind::Function => &self.functions,
            SymbolKind::Constant => &self.constants,
        };

        listed.contains(key(kind, name).as_ref())
            || name::namespace_of(name)
                .is_some_and(|ns| self.excludes_namespace(ns))
    }
}

impl From<&ExcludeSettings> for Exclusions {
    fn from(settings: &ExcludeSettings) -> Self {
        let keys = |kind: SymbolKind, names: &[String]| -> HashSet<String> {
            names
                .iter()
                .map(|name| key(kind, name::strip_leading(name)).into_owned())
                .collect()
        };

        Exclusions {
            namespaces: settings
                .namespaces
                .iter()
                .map(|ns| name::strip_leading(ns).to_owned())
                .collect(),
            classes: keys(SymbolKind::ClassLike, &settings.classes),
            functions: keys(SymbolKind::Function, &settings.functions),
            constants: keys(SymbolKind::Constant, &settings.constants),
        }
    }
}

/// Returns the lookup key of a fully-qualified name: namespaces are always
/// case-insensitive, and so are class-like and function names.
fn key(kind: SymbolKind, name: &str) -> Cow<'_, str> {
    if kind.is_case_insensitive() {
        return kind.normalize(name);
    }

    match name.rsplit_once(name::SEPARATOR) {
        Some((ns, last)) if ns.bytes().any(|b| b.is_ascii_uppercase()) => {
            Cow::Owned(format!("{}\\{last}", ns.to_ascii_lowercase()))
        }
        _ => Cow::Borrowed(name),
    }
}

/// Two packages declaring the same symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub kind: SymbolKind,
    pub name: String,
    pub first: String,
    pub second: String,
}

#[derive(Debug, Error)]
#[error("{} symbol collision(s):{}", .0.len(), render_collisions(.0))]
pub struct CollisionError(pub Vec<Collision>);

fn render_collisions(collisions: &[Collision]) -> String {
    collisions
        .iter()
        .map(|c| {
            format!(
                "\n  {} `{}` is declared by both `{}` and `{}`",
                c.kind, c.name, c.first, c.second
            )
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    name: Symbol,
    target: Symbol,
    origin: Origin,
    class_kind: Option<ClassLikeKind>,
    excluded: bool,
}

/// A declared symbol, as seen through a [`SymbolMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declared<'m> {
    pub kind: SymbolKind,
    /// The name as first declared.
    pub name: &'m str,
    pub target: &'m str,
    pub origin: Origin,
    pub class_kind: Option<ClassLikeKind>,
}

/// What a fully-qualified name refers to, from the point of view of the
/// prefixing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'m> {
    /// The name is already under the prefix.
    Prefixed,
    /// A symbol some package declares.
    Declared(Declared<'m>),
    /// An excluded name, which stays as it is.
    Excluded,
    /// An undeclared global name, which belongs to the host runtime.
    Global,
    /// An undeclared name under a namespace some package owns, with the
    /// name it would have after prefixing.
    Owned(String),
    /// An undeclared name under a namespace no package owns.
    Foreign,
}

#[derive(Debug)]
pub struct SymbolMapBuilder {
    prefix: String,
    exclusions: Exclusions,
    package_names: Vec<String>,
    interner: StringInterner,
    entries: HashMap<(SymbolKind, Symbol), Entry>,
    /// Lowercased namespaces owned by some package.
    owned: HashSet<String>,
    collisions: Vec<Collision>,
}

impl SymbolMapBuilder {
    /// Creates an empty builder. `package_names` is indexed by
    /// [`PackageId`] and only used in diagnostics.
    pub fn new(
        prefix: &str,
        exclusions: Exclusions,
        package_names: Vec<String>,
    ) -> Self {
        Self {
            prefix: prefix.to_owned(),
            exclusions,
            package_names,
            interner: StringInterner::new(),
            entries: HashMap::new(),
            owned: HashSet::new(),
            collisions: Vec::new(),
        }
    }

    /// Marks `namespace` (and everything under it) as owned by a bundled
    /// package.
    pub fn record_namespace(&mut self, namespace: &str) {
        let namespace = name::strip_leading(namespace);
        if namespace.is_empty()
            || name::is_within(namespace, &self.prefix)
            || self.exclusions.excludes_namespace(namespace)
        {
            return;
        }

        self.owned.insert(namespace.to_ascii_lowercase());
    }

    /// Records a declaration of the fully-qualified `name`.
    pub fn record(
        &mut self,
        kind: SymbolKind,
        name: &str,
        class_kind: Option<ClassLikeKind>,
        origin: Origin,
    ) {
        let name = name::strip_leading(name);

        // already prefixed, e.g. when run over its own output
        if name::is_within(name, &self.prefix) {
            return;
        }

        let lookup = self.interner.intern(&key(kind, name));

        if let Some(existing) = self.entries.get(&(kind, lookup)) {
            let existing = *existing;
            if existing.origin.package == origin.package {
                warn!(
                    package = self.package_name(origin.package),
                    "{kind} `{name}` is declared more than once; keeping the \
                     first declaration"
                );
            } else {
                let first = self.resolve_symbol(existing.name);
                self.collisions.push(Collision {
                    kind,
                    name: first.to_owned(),
                    first: self.package_name(existing.origin.package).to_owned(),
                    second: self.package_name(origin.package).to_owned(),
                });
            }
            return;
        }

        let excluded = self.exclusions.excludes(kind, name);
        let target = match excluded {
            true => name.to_owned(),
            false => format!("{}\\{name}", self.prefix),
        };

        let entry = Entry {
            name: self.interner.intern(name),
            target: self.interner.intern(&target),
            origin,
            class_kind,
            excluded,
        };
        self.entries.insert((kind, lookup), entry);
    }

    /// Freezes the builder, failing if any two packages declared the same
    /// symbol.
    pub fn freeze(mut self) -> Result<SymbolMap, CollisionError> {
        if !self.collisions.is_empty() {
            self.collisions.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));
            return Err(CollisionError(self.collisions));
        }

        let mut namespaces = HashSet::new();
        for ns in &self.owned {
            namespaces.extend(name::ancestors(ns).map(str::to_owned));
        }

        let mut emitted = HashSet::new();
        for (&(kind, _), entry) in &self.entries {
            let target = self.resolve_symbol(entry.target);
            emitted.insert((kind, key(kind, target).into_owned()));
        }

        debug!(
            symbols = self.entries.len(),
            namespaces = self.owned.len(),
            "froze symbol map"
        );

        Ok(SymbolMap {
            prefix: self.prefix,
            exclusions: self.exclusions,
            interner: self.interner,
            entries: self.entries,
            owned: self.owned,
            namespaces,
            emitted,
        })
    }

    fn package_name(&self, id: PackageId) -> &str {
        self.package_names.get(id.0).map_or("?", String::as_str)
    }

    fn resolve_symbol(&self, symbol: Symbol) -> &str {
        self.interner.resolve(symbol).unwrap_or_default()
    }
}

/// The frozen map from original to prefixed symbols.
#[derive(Debug)]
pub struct SymbolMap {
    prefix: String,
    exclusions: Exclusions,
    interner: StringInterner,
    entries: HashMap<(SymbolKind, Symbol), Entry>,
    owned: HashSet<String>,
    /// Lowercased owned namespaces and all of their ancestors.
    namespaces: HashSet<String>,
    /// Lookup keys of every target name.
    emitted: HashSet<(SymbolKind, String)>,
}

impl SymbolMap {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn exclusions(&self) -> &Exclusions {
        &self.exclusions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a declared symbol by its original fully-qualified name.
    pub fn lookup(&self, kind: SymbolKind, name: &str) -> Option<Declared<'_>> {
        let name = name::strip_leading(name);
        let lookup = self.interner.get(&key(kind, name))?;
        let entry = self.entries.get(&(kind, lookup))?;
        Some(self.declared(kind, entry))
    }

    pub fn resolve(&self, kind: SymbolKind, name: &str) -> Resolution<'_> {
        let name = name::strip_leading(name);

        if name::is_within(name, &self.prefix) {
            return Resolution::Prefixed;
        }

        if let Some(lookup) = self.interner.get(&key(kind, name)) {
            if let Some(entry) = self.entries.get(&(kind, lookup)) {
                return match entry.excluded {
                    true => Resolution::Excluded,
                    false => Resolution::Declared(self.declared(kind, entry)),
                };
            }
        }

        if self.exclusions.excludes(kind, name) {
            return Resolution::Excluded;
        }

        match name::namespace_of(name) {
            None => Resolution::Global,
            Some(ns) if self.owns(ns) => {
                Resolution::Owned(format!("{}\\{name}", self.prefix))
            }
            Some(_) => Resolution::Foreign,
        }
    }

    /// Returns the name `name` has after prefixing, which is `name` itself
    /// if it is not moved.
    pub fn target<'n>(&self, kind: SymbolKind, name: &'n str) -> Cow<'n, str> {
        match self.resolve(kind, name) {
            Resolution::Declared(declared) => Cow::Owned(declared.target.to_owned()),
            Resolution::Owned(target) => Cow::Owned(target),
            _ => Cow::Borrowed(name::strip_leading(name)),
        }
    }

    /// Returns the name a namespace has after prefixing.
    pub fn map_namespace<'n>(&self, namespace: &'n str) -> Cow<'n, str> {
        let namespace = name::strip_leading(namespace);
        if name::is_within(namespace, &self.prefix)
            || self.exclusions.excludes_namespace(namespace)
            || !self.owns(namespace)
        {
            return Cow::Borrowed(namespace);
        }

        Cow::Owned(format!("{}\\{namespace}", self.prefix))
    }

    /// Returns `true` if `namespace` is, or lies under, a namespace owned by
    /// a bundled package.
    pub fn owns(&self, namespace: &str) -> bool {
        let namespace = name::strip_leading(namespace).to_ascii_lowercase();
        name::ancestors(&namespace).any(|ns| self.owned.contains(ns))
    }

    /// Returns `true` if `name` is a namespace some package declares, or
    /// one of its ancestors.
    pub fn is_namespace(&self, name: &str) -> bool {
        let name = name::strip_leading(name).to_ascii_lowercase();
        self.namespaces.contains(&name)
    }

    /// Returns `true` if some declared symbol ends up named `name`.
    pub fn is_emitted(&self, kind: SymbolKind, name: &str) -> bool {
        let name = name::strip_leading(name);
        self.emitted.contains(&(kind, key(kind, name).into_owned()))
    }

    /// Iterates over every declared class-like symbol, in no particular
    /// order.
    pub fn class_likes(&self) -> impl Iterator<Item = Declared<'_>> {
        self.entries
            .iter()
            .filter(|((kind, _), _)| *kind == SymbolKind::ClassLike)
            .map(|((kind, _), entry)| self.declared(*kind, entry))
    }

    fn declared(&self, kind: SymbolKind, entry: &Entry) -> Declared<'_> {
        Declared {
            kind,
            name: self.interner.resolve(entry.name).unwrap_or_default(),
            target: self.interner.resolve(entry.target).unwrap_or_default(),
            origin: entry.origin,
            class_kind: entry.class_kind,
        }
    }
}
