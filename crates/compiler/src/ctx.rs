//! The embedding context.
//!
//! A `Context` composes the parser, the compiler and one VM, owns every
//! bytecode program ever produced through it (the program chain), and
//! tracks the last error with its category. Function values returned by
//! the load entry points stay valid for the life of the context: they
//! hold a reference to their backing program, and the chain keeps every
//! program alive until teardown.
//!
//! The parser and compiler are reachable from the VM too, through the
//! [`Loader`] installed at construction, which is how the `compile`,
//! `exprtofn` and `require` natives work.

use crate::codegen::{compile_expression, compile_program};
use crate::config::ContextConfig;
use crate::parser::Parser;
use sparkling_runtime::bytecode::Program;
use sparkling_runtime::error::{ErrorKind, SparkError};
use sparkling_runtime::hashmap::SparkHashMap;
use sparkling_runtime::value::{NativeFn, TypeTag, Value};
use sparkling_runtime::vm::{top_level_func, Loader, Vm};
use sparkling_runtime::stdlib;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// The compilation service shared between the context and its VM.
///
/// Owns the program chain: compiled programs are appended and never
/// dropped before the context itself goes away.
struct SourceLoader {
    chain: Vec<Rc<Program>>,
}

impl SourceLoader {
    /// Retain a program in the chain and hand back its top-level
    /// function value.
    fn load_program(&mut self, program: Program) -> Result<Value, SparkError> {
        let program = Rc::new(program);
        let func = top_level_func(&program)
            .map_err(|e| SparkError::new(ErrorKind::Generic, format!("malformed bytecode: {}", e)))?;
        self.chain.push(program);
        Ok(func)
    }
}

impl Loader for SourceLoader {
    fn load_string(&mut self, src: &str) -> Result<Value, SparkError> {
        let stmts = Parser::new(src)
            .and_then(|mut p| p.parse_program())
            .map_err(|e| SparkError::new(ErrorKind::Syntax, e.to_string()))?;
        let program = compile_program(&stmts)
            .map_err(|e| SparkError::new(ErrorKind::Semantic, e.to_string()))?;
        self.load_program(program)
    }

    fn compile_expr(&mut self, src: &str) -> Result<Value, SparkError> {
        let expr = Parser::new(src)
            .and_then(|mut p| p.parse_expression())
            .map_err(|e| SparkError::new(ErrorKind::Syntax, e.to_string()))?;
        let program = compile_expression(&expr)
            .map_err(|e| SparkError::new(ErrorKind::Semantic, e.to_string()))?;
        self.load_program(program)
    }

    fn load_source_file(&mut self, path: &str) -> Result<Value, SparkError> {
        let src = std::fs::read_to_string(path).map_err(|e| {
            SparkError::new(
                ErrorKind::Generic,
                format!("I/O error: could not read source file '{}': {}", path, e),
            )
        })?;
        self.load_string(&src)
    }
}

pub struct Context {
    vm: Vm,
    loader: Rc<RefCell<SourceLoader>>,
    last_error: Option<SparkError>,
}

impl Context {
    pub fn new() -> Context {
        Self::with_config(ContextConfig::new())
    }

    pub fn with_config(config: ContextConfig) -> Context {
        let mut vm = Vm::with_call_depth(config.max_call_depth);
        if config.load_stdlib {
            stdlib::load(&mut vm);
        }

        let loader = Rc::new(RefCell::new(SourceLoader { chain: Vec::new() }));
        vm.set_loader(loader.clone());

        Context {
            vm,
            loader,
            last_error: None,
        }
    }

    fn finish<T>(&mut self, result: Result<T, SparkError>) -> Result<T, SparkError> {
        if let Err(e) = &result {
            debug!(kind = ?e.kind, message = %e.message, "context operation failed");
            self.last_error = Some(e.clone());
        }
        result
    }

    /// Parse and compile a source string; returns the function value of
    /// the compiled top level. The bytecode joins the program chain.
    pub fn load_string(&mut self, src: &str) -> Result<Value, SparkError> {
        self.last_error = None;
        debug!(bytes = src.len(), "loading source string");
        let result = self.loader.borrow_mut().load_string(src);
        self.finish(result)
    }

    /// Read a file and compile it; I/O failures are Generic errors.
    pub fn load_source_file(&mut self, path: &str) -> Result<Value, SparkError> {
        self.last_error = None;
        let result = self.loader.borrow_mut().load_source_file(path);
        self.finish(result)
    }

    /// Register a raw bytecode file in the chain without recompiling.
    ///
    /// The word count is the file size divided by the word size; a
    /// trailing partial word is ignored, not validated.
    pub fn load_object_file(&mut self, path: &str) -> Result<Value, SparkError> {
        self.last_error = None;
        let result = match std::fs::read(path) {
            Ok(bytes) => self
                .loader
                .borrow_mut()
                .load_program(Program::from_bytes(&bytes)),
            Err(e) => Err(SparkError::new(
                ErrorKind::Generic,
                format!("I/O error: could not read object file '{}': {}", path, e),
            )),
        };
        self.finish(result)
    }

    /// Compile a single expression into a function with an implicit
    /// return.
    pub fn compile_expr(&mut self, src: &str) -> Result<Value, SparkError> {
        self.last_error = None;
        let result = self.loader.borrow_mut().compile_expr(src);
        self.finish(result)
    }

    /// Load a string, then call it with no arguments.
    pub fn exec_string(&mut self, src: &str) -> Result<Value, SparkError> {
        let func = self.load_string(src)?;
        self.call_function(&func, &[])
    }

    /// Load a source file, then call it with no arguments.
    pub fn exec_source_file(&mut self, path: &str) -> Result<Value, SparkError> {
        let func = self.load_source_file(path)?;
        self.call_function(&func, &[])
    }

    /// Load an object file, then call it with no arguments.
    pub fn exec_object_file(&mut self, path: &str) -> Result<Value, SparkError> {
        let func = self.load_object_file(path)?;
        self.call_function(&func, &[])
    }

    /// Invoke a function value previously produced by this context (or
    /// any callable, including natives).
    pub fn call_function(&mut self, func: &Value, args: &[Value]) -> Result<Value, SparkError> {
        self.last_error = None;
        let result = self.vm.call_value(func, args).map_err(SparkError::from);
        self.finish(result)
    }

    /// The VM's globals (name -> value).
    pub fn globals(&self) -> Rc<SparkHashMap> {
        self.vm.globals().clone()
    }

    /// Category of the last error; `None` means no error.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.last_error.as_ref().map(|e| e.kind)
    }

    /// Message of the last error, whichever component raised it.
    pub fn error_msg(&self) -> Option<&str> {
        self.last_error.as_ref().map(|e| e.message.as_str())
    }

    /// Reset the error state; values previously returned stay valid.
    pub fn clear_error(&mut self) {
        self.last_error = None;
        self.vm.clear_error();
    }

    /// Set the VM's runtime error message through the format engine.
    pub fn runtime_error(&mut self, fmt: &str, args: &[Value]) {
        self.vm.set_error_msg(fmt, args);
    }

    /// Active frame names, innermost first.
    pub fn stack_trace(&self) -> Vec<String> {
        self.vm.stack_trace()
    }

    /// Register native functions, globally (empty libname) or inside a
    /// namespace map.
    pub fn add_lib_funcs(&mut self, libname: &str, fns: &[(&str, NativeFn)]) {
        self.vm.add_lib_funcs(libname, fns);
    }

    /// Register constant values, same routing as `add_lib_funcs`.
    pub fn add_lib_values(&mut self, libname: &str, vals: &[(&str, Value)]) {
        self.vm.add_lib_values(libname, vals);
    }

    /// Insert methods into the class dictionary of a type.
    pub fn load_methods(&mut self, tag: TypeTag, fns: &[(&str, NativeFn)]) {
        self.vm.load_methods(tag, fns);
    }

    /// Stash an opaque host value reachable from native callables.
    pub fn set_user_data(&mut self, data: Option<Rc<dyn Any>>) {
        self.vm.set_context_data(data);
    }

    pub fn user_data(&self) -> Option<Rc<dyn Any>> {
        self.vm.context_data()
    }

    /// Every program loaded through this context, newest first.
    pub fn programs(&self) -> Vec<Rc<Program>> {
        self.loader.borrow().chain.iter().rev().cloned().collect()
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_string_returns_function_and_retains_program() {
        let mut ctx = Context::new();
        let f = ctx.load_string("return 1;").unwrap();
        assert!(matches!(f, Value::Func(_)));
        assert_eq!(ctx.programs().len(), 1);

        ctx.load_string("return 2;").unwrap();
        assert_eq!(ctx.programs().len(), 2);
    }

    #[test]
    fn test_chain_is_newest_first() {
        let mut ctx = Context::new();
        ctx.load_string("return 1;").unwrap();
        let second = ctx.load_string("return 2;").unwrap();
        let newest = ctx.programs()[0].clone();
        let func = second.as_func().unwrap();
        match &func.kind {
            sparkling_runtime::value::FuncKind::Script(sf) => {
                assert!(Rc::ptr_eq(&sf.program, &newest));
            }
            _ => panic!("expected a script function"),
        }
    }

    #[test]
    fn test_error_state_reset_by_next_load() {
        let mut ctx = Context::new();
        assert!(ctx.exec_string("@@@").is_err());
        assert_eq!(ctx.error_kind(), Some(ErrorKind::Syntax));

        ctx.load_string("return 1;").unwrap();
        assert_eq!(ctx.error_kind(), None);
        assert_eq!(ctx.error_msg(), None);
    }

    #[test]
    fn test_without_stdlib_has_no_globals() {
        let mut ctx = Context::with_config(ContextConfig::new().without_stdlib());
        assert!(ctx.globals().get_strkey("printf").is_nil());
        // The language itself still works
        assert_eq!(ctx.exec_string("return 1 + 1;").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_call_depth_limit_is_configurable() {
        let mut ctx = Context::with_config(ContextConfig::new().with_max_call_depth(8));
        let err = ctx
            .exec_string("fn loop_forever() { return loop_forever(); } return loop_forever();")
            .unwrap_err();
        assert!(err.message.contains("depth limit"));
    }

    #[test]
    fn test_user_data_round_trip() {
        let mut ctx = Context::new();
        assert!(ctx.user_data().is_none());
        ctx.set_user_data(Some(Rc::new(42i64)));
        let data = ctx.user_data().unwrap();
        assert_eq!(data.downcast_ref::<i64>(), Some(&42));
    }
}
