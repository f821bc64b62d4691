//! Core of the Kestrel compiler front end.
//!
//! The pipeline is roughly:
//!
//!   source .ks
//!     -> lexer     (lexemes)
//!     -> parser    (arena tree, import requests)
//!     -> compiler  (imports resolved depth-first, per-module passes)
//!     -> combined tree (all modules, main last) -> combined passes
//!
//! Tools (the CLI and anything else) should depend on this crate rather
//! than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Locations, diagnostics and errors
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;
pub mod context;

// ---------------------------------------------------------------------
// Front end: lexing and parsing
// ---------------------------------------------------------------------

pub mod token;
pub mod lexer;
pub mod cursor;
pub mod ast;
pub mod parser;

// ---------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------

pub mod pass;
pub mod fold;
pub mod irgen;

// ---------------------------------------------------------------------
// Modules and orchestration
// ---------------------------------------------------------------------

pub mod module;
pub mod resolve;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{
    CompilationArtifact, Compiler, CompilerOptions, SEARCH_PATH_VAR, compile, compile_source,
};
pub use context::Context;
pub use diagnostic::{DEFAULT_MAX_ERRORS, Diagnostic, Severity};
pub use error::CoreError;
pub use resolve::{ImportResolver, default_library_root};
