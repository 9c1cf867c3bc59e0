//! Just enough of PHP to find and rewrite symbol names.

pub mod lexer;
pub mod literal;
pub mod name;
pub mod outline;
pub mod scope;
pub mod token;

pub use lexer::LexError;
pub use name::SymbolKind;
pub use outline::Outline;
