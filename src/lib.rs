//! Bundles third-party PHP packages under a unique namespace prefix, so
//! several copies of the same libraries can be loaded in one process.

pub mod autoload;
pub mod codegen;
pub mod manifest;
pub mod output;
pub mod package;
pub mod php;
pub mod pipeline;
pub mod rewrite;
pub mod source_file;
pub mod span;
pub mod symbol;
pub mod symbol_map;
pub mod verify;
