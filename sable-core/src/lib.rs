//! Core of the Sable language toolchain.
//!
//! The pipeline is roughly:
//!
//!   source text
//!     -> stream / lexer   (tokens, driven by host recognizers)
//!     -> parser           (parse nodes, driven by host rule tables)
//!     -> typecheck        (typed expressions, scopes, lazy types)
//!     -> codegen          (bytecode blocks)
//!     -> vm               (program output)
//!
//! The concrete language (tokens, rules, type names and native functions)
//! is registered by a host through [`CompilerBuilder`]; [`stdlib::standard`]
//! is the standard host language used by the CLI.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod stream;
pub mod lexer;
pub mod rules;
pub mod ast;
pub mod parser;

// ---------------------------------------------------------------------
// Semantic layers: types, scopes, type checking, typed expressions
// ---------------------------------------------------------------------

pub mod lazy;
pub mod types;
pub mod scope;
pub mod hir;
pub mod typecheck;

// ---------------------------------------------------------------------
// Back-end: bytecode and the virtual machine
// ---------------------------------------------------------------------

pub mod bytecode;
pub mod codegen;
pub mod vm;

// ---------------------------------------------------------------------
// Host registration, builtins and the standard language
// ---------------------------------------------------------------------

pub mod builtins;
pub mod compiler;
pub mod stdlib;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use bytecode::{Opcode, Program};
pub use compiler::{Compiler, CompilerBuilder};
pub use error::{CompileError, CoreError, RuntimeError};
pub use stdlib::standard;
