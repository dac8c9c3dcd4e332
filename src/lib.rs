//! qvickbuild - a small, parallel build automation engine.
//!
//! # Overview
//!
//! A build is described declaratively as **fields** (named values) and
//! **tasks** (units of work keyed by one or more names):
//!
//! ```text
//! srcs = "*.c";
//! objs = srcs : "*.c" -> "*.o";
//!
//! "app" {
//!     depends = objs;
//!     run = "cc -o app [objs]";
//! }
//!
//! objs as obj {
//!     src = obj : "*.o" -> "*.c";
//!     depends = src;
//!     run = "cc -c -o [obj] [src]";
//! }
//! ```
//!
//! The engine resolves the requested task, walks its dependencies, skips
//! targets that are newer than everything they depend on, and executes
//! shell commands through a pseudoterminal - in parallel where the
//! configuration asks for it. Errors are aggregated per thread and
//! rendered with source-mapped excerpts.
//!
//! # Example
//!
//! ```no_run
//! use qvickbuild::{Driver, Setup};
//!
//! let code = Driver::new(Setup::default()).run();
//! std::process::exit(code);
//! ```

pub mod build;
pub mod cli;
pub mod driver;
pub mod errors;
pub mod eval;
pub mod filesystem;
pub mod frames;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod process;
pub mod tracking;
pub mod values;
pub mod wildcards;

// Re-export commonly used items
pub use cli::{Cli, EntryStatus, LogLevel};
pub use driver::{Driver, Engine, InputMethod, Setup};
pub use errors::{BuildError, BuildResult, Diagnostics, Halted};
pub use eval::{EvalContext, Interpreter, InterpreterOptions};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{Ast, AstExpr, Parser, Task};
pub use tracking::Reference;
pub use values::Value;

/// Convenience entry point: run a build described by `setup` and return
/// the process exit code.
pub fn run(setup: Setup) -> i32 {
    Driver::new(setup).run()
}
