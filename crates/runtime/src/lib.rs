//! Sparkling runtime core.
//!
//! The value and object model, the heap payload types (string, array,
//! hashmap), the format engine, the bytecode word format, the virtual
//! machine and the standard library. The parser, compiler and embedding
//! context live in the `sparkling-compiler` crate and reach back into
//! this one through the [`vm::Loader`] trait.
//!
//! Everything here is single-threaded: values are `Rc`-managed (`!Send`),
//! and one VM belongs to exactly one context.

pub mod array;
pub mod array_ops;
pub mod bytecode;
pub mod error;
pub mod format;
pub mod hashmap;
pub mod io;
pub mod map_ops;
pub mod math_ops;
pub mod stdlib;
pub mod string;
pub mod string_ops;
pub mod sys_ops;
pub mod value;
pub mod vm;

pub use array::SparkArray;
pub use bytecode::{Opcode, Program};
pub use error::{ErrorKind, RuntimeError, SparkError};
pub use hashmap::SparkHashMap;
pub use string::SparkString;
pub use value::{FuncKind, Function, NativeFn, ScriptFunc, TypeTag, UserInfo, Value};
pub use vm::{Loader, Vm};
