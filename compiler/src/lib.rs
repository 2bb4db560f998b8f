//! scg-compiler
//!
//! This crate implements the front end of the `.scg` schema compiler:
//!  1) A character-level tokenizer splitting files into top-level declarations,
//!  2) Regex grammar extractors for packages, typedefs, consts, enums,
//!     messages, services and streams (with a recursive type grammar),
//!  3) Per-file assembly (type qualification, external dependencies),
//!  4) Package merging and a resolver (binding, cycle detection, const
//!     re-validation, FNV-1a wire IDs),
//!  5) Error types (`ParseError`, `ScgError`) with source snippets.

pub mod error;
pub mod types;
pub mod utils;
pub mod tokenizer;
pub mod statements;
pub mod pattern;
pub mod type_parser;
pub mod literal;
pub mod parser;
pub mod file;
pub mod processor;
pub mod resolver;
pub mod config;
pub mod compiler;
pub mod traits;

pub use compiler::{compile, compile_source};
pub use config::CompileOptions;
pub use error::{ErrorKind, ParseError, ScgError};
pub use file::File;
pub use processor::{Package, Parse};
