//! Sparkling compiler and embedding API.
//!
//! The lexer, parser and bytecode generator for the Sparkling source
//! language, plus the [`ctx::Context`] façade that ties them to the
//! runtime's VM. Most embedders only need `Context`:
//!
//! ```
//! use sparklingc::{Context, Value};
//!
//! let mut ctx = Context::new();
//! let result = ctx.exec_string("return 2 + 3;").unwrap();
//! assert_eq!(result, Value::Int(5));
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod ctx;
pub mod lexer;
pub mod parser;

pub use codegen::{compile_expression, compile_program, CompileError};
pub use config::ContextConfig;
pub use ctx::Context;
pub use lexer::ParseError;
pub use parser::Parser;

// Re-export the runtime surface embedders interact with
pub use sparkling_runtime as runtime;
pub use sparkling_runtime::error::{ErrorKind, RuntimeError, SparkError};
pub use sparkling_runtime::value::{NativeFn, TypeTag, Value};
pub use sparkling_runtime::vm::Vm;
