//! Small wrapper over [`string_interner`].

use string_interner::{self, backend, symbol};

/// The initial capacity of a [`StringInterner`].
///
/// A mid-sized vendor tree declares a few thousand symbols, and each of them
/// is interned twice (original and prefixed), plus its lookup key.
const INTERNER_CAPACITY: usize = 4096;

#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Symbol(symbol::SymbolU32);

#[derive(Debug)]
pub struct StringInterner(
    string_interner::StringInterner<backend::StringBackend<symbol::SymbolU32>>,
);

impl StringInterner {
    pub fn new() -> Self {
        StringInterner(string_interner::StringInterner::with_capacity(
            INTERNER_CAPACITY,
        ))
    }

    pub fn intern(&mut self, s: &str) -> Symbol {
        let raw_symbol = self.0.get_or_intern(s);
        Symbol(raw_symbol)
    }

    /// Returns the symbol for `s` if it has already been interned.
    pub fn get(&self, s: &str) -> Option<Symbol> {
        self.0.get(s).map(Symbol)
    }

    pub fn resolve(&self, sym: Symbol) -> Option<&str> {
        self.0.resolve(sym.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::StringInterner;

    #[test]
    fn interning_is_idempotent() {
        let mut interner = StringInterner::new();
        let a = interner.intern("GuzzleHttp\\Client");
        let b = interner.intern("GuzzleHttp\\Client");
        assert_eq!(a, b);
        assert_eq!(interner.len(), 1);
        assert_eq!(interner.resolve(a), Some("GuzzleHttp\\Client"));
    }

    #[test]
    fn get_does_not_intern() {
        let mut interner = StringInterner::new();
        assert!(interner.get("Foo").is_none());
        let foo = interner.intern("Foo");
        assert_eq!(interner.get("Foo"), Some(foo));
        assert!(interner.get("Bar").is_none());
    }
}
