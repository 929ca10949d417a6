//! Standard library loading and shared argument validation.
//!
//! Six libraries are registered at context creation: io, string, array,
//! hashmap, math and sysutil. The container libraries (string / array /
//! hashmap) are wired twice on purpose: into the class table so values
//! dispatch them as methods, and into the globals so they are callable as
//! plain functions.
//!
//! Every native follows the same validation pattern: check the argument
//! count, then the type of each argument, and report errors that name the
//! function, the argument position and the expected type.

use crate::array::SparkArray;
use crate::error::RuntimeError;
use crate::hashmap::SparkHashMap;
use crate::string::SparkString;
use crate::value::Value;
use crate::vm::Vm;
use std::rc::Rc;

/// Load the whole standard library into a VM.
pub fn load(vm: &mut Vm) {
    crate::io::load(vm);
    crate::string_ops::load(vm);
    crate::array_ops::load(vm);
    crate::map_ops::load(vm);
    crate::math_ops::load(vm);
    crate::sys_ops::load(vm);

    // Names shared by several container libraries: as free functions they
    // dispatch on the first argument, as methods each class has its own
    vm.add_lib_funcs(
        "",
        &[
            ("find", poly_find),
            ("foreach", poly_foreach),
            ("map", poly_map),
            ("filter", poly_filter),
        ],
    );
}

fn poly_type_error(fname: &str, args: &[Value]) -> RuntimeError {
    match args.first() {
        Some(v) => RuntimeError::new(format!(
            "{}: argument 1 must be a container, got {}",
            fname,
            v.type_name()
        )),
        None => RuntimeError::new(format!("{}: expected at least 1 argument, got 0", fname)),
    }
}

fn poly_find(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    match args.first() {
        Some(Value::String(_)) => crate::string_ops::native_find(vm, args),
        Some(Value::Array(_)) => crate::array_ops::native_find(vm, args),
        _ => Err(poly_type_error("find", args)),
    }
}

fn poly_foreach(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    match args.first() {
        Some(Value::Array(_)) => crate::array_ops::native_foreach(vm, args),
        Some(Value::HashMap(_)) => crate::map_ops::native_foreach(vm, args),
        _ => Err(poly_type_error("foreach", args)),
    }
}

fn poly_map(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    match args.first() {
        Some(Value::Array(_)) => crate::array_ops::native_map(vm, args),
        Some(Value::HashMap(_)) => crate::map_ops::native_map(vm, args),
        _ => Err(poly_type_error("map", args)),
    }
}

fn poly_filter(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    match args.first() {
        Some(Value::Array(_)) => crate::array_ops::native_filter(vm, args),
        Some(Value::HashMap(_)) => crate::map_ops::native_filter(vm, args),
        _ => Err(poly_type_error("filter", args)),
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

pub(crate) fn check_argc(fname: &str, args: &[Value], expected: usize) -> Result<(), RuntimeError> {
    if args.len() != expected {
        return Err(RuntimeError::new(format!(
            "{}: expected exactly {} argument{}, got {}",
            fname,
            expected,
            plural(expected),
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn check_argc_range(
    fname: &str,
    args: &[Value],
    min: usize,
    max: usize,
) -> Result<(), RuntimeError> {
    if args.len() < min || args.len() > max {
        return Err(RuntimeError::new(format!(
            "{}: expected {} to {} arguments, got {}",
            fname,
            min,
            max,
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn check_argc_min(fname: &str, args: &[Value], min: usize) -> Result<(), RuntimeError> {
    if args.len() < min {
        return Err(RuntimeError::new(format!(
            "{}: expected at least {} argument{}, got {}",
            fname,
            min,
            plural(min),
            args.len()
        )));
    }
    Ok(())
}

fn type_error(fname: &str, index: usize, expected: &str, got: &Value) -> RuntimeError {
    RuntimeError::new(format!(
        "{}: argument {} must be {}, got {}",
        fname,
        index + 1,
        expected,
        got.type_name()
    ))
}

pub(crate) fn arg_string(
    fname: &str,
    args: &[Value],
    index: usize,
) -> Result<Rc<SparkString>, RuntimeError> {
    match &args[index] {
        Value::String(s) => Ok(s.clone()),
        other => Err(type_error(fname, index, "a string", other)),
    }
}

pub(crate) fn arg_int(fname: &str, args: &[Value], index: usize) -> Result<i64, RuntimeError> {
    match &args[index] {
        Value::Int(i) => Ok(*i),
        other => Err(type_error(fname, index, "an integer", other)),
    }
}

pub(crate) fn arg_num(fname: &str, args: &[Value], index: usize) -> Result<f64, RuntimeError> {
    args[index]
        .as_float_lossy()
        .ok_or_else(|| type_error(fname, index, "a number", &args[index]))
}

pub(crate) fn arg_bool(fname: &str, args: &[Value], index: usize) -> Result<bool, RuntimeError> {
    match &args[index] {
        Value::Bool(b) => Ok(*b),
        other => Err(type_error(fname, index, "a boolean", other)),
    }
}

pub(crate) fn arg_array(
    fname: &str,
    args: &[Value],
    index: usize,
) -> Result<Rc<SparkArray>, RuntimeError> {
    match &args[index] {
        Value::Array(a) => Ok(a.clone()),
        other => Err(type_error(fname, index, "an array", other)),
    }
}

pub(crate) fn arg_hashmap(
    fname: &str,
    args: &[Value],
    index: usize,
) -> Result<Rc<SparkHashMap>, RuntimeError> {
    match &args[index] {
        Value::HashMap(m) => Ok(m.clone()),
        other => Err(type_error(fname, index, "a hashmap", other)),
    }
}

/// A callable argument, returned as the value so it can be passed back to
/// `Vm::call_value`.
pub(crate) fn arg_func(fname: &str, args: &[Value], index: usize) -> Result<Value, RuntimeError> {
    match &args[index] {
        Value::Func(_) => Ok(args[index].clone()),
        other => Err(type_error(fname, index, "a function", other)),
    }
}
