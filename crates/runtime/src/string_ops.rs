//! The string library.
//!
//! Registered both as methods on the string class (so `s.find(n)`
//! dispatches) and as global free functions. All operations are pure and
//! produce new strings; the receiver is always the first argument.

use crate::array::SparkArray;
use crate::error::RuntimeError;
use crate::format;
use crate::stdlib::{arg_int, arg_string, check_argc, check_argc_min, check_argc_range};
use crate::string::SparkString;
use crate::value::{NativeFn, TypeTag, Value};
use crate::vm::Vm;
use std::rc::Rc;

/// find(str, needle, [offset]) -> first byte index, or -1.
pub(crate) fn native_find(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc_range("find", args, 2, 3)?;
    let hay = arg_string("find", args, 0)?;
    let needle = arg_string("find", args, 1)?;
    let offset = if args.len() == 3 {
        arg_int("find", args, 2)?
    } else {
        0
    };
    Ok(Value::Int(hay.find(&needle, offset)?))
}

fn native_substr(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("substr", args, 3)?;
    let s = arg_string("substr", args, 0)?;
    let start = arg_int("substr", args, 1)?;
    let length = arg_int("substr", args, 2)?;
    Ok(Value::String(Rc::new(s.substr(start, length)?)))
}

fn native_substrto(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("substrto", args, 2)?;
    let s = arg_string("substrto", args, 0)?;
    let length = arg_int("substrto", args, 1)?;
    Ok(Value::String(Rc::new(s.substr_to(length)?)))
}

fn native_substrfrom(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("substrfrom", args, 2)?;
    let s = arg_string("substrfrom", args, 0)?;
    let start = arg_int("substrfrom", args, 1)?;
    Ok(Value::String(Rc::new(s.substr_from(start)?)))
}

/// split(str, sep) -> array of pieces, empty pieces included.
fn native_split(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("split", args, 2)?;
    let s = arg_string("split", args, 0)?;
    let sep = arg_string("split", args, 1)?;
    let pieces = s.split(&sep)?;
    Ok(Value::array(SparkArray::from_vec(
        pieces
            .into_iter()
            .map(|p| Value::String(Rc::new(p)))
            .collect(),
    )))
}

fn native_repeat(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("repeat", args, 2)?;
    let s = arg_string("repeat", args, 0)?;
    let n = arg_int("repeat", args, 1)?;
    Ok(Value::String(Rc::new(s.repeat(n)?)))
}

fn native_tolower(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("tolower", args, 1)?;
    let s = arg_string("tolower", args, 0)?;
    Ok(Value::String(Rc::new(s.to_lower())))
}

fn native_toupper(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("toupper", args, 1)?;
    let s = arg_string("toupper", args, 0)?;
    Ok(Value::String(Rc::new(s.to_upper())))
}

/// format(fmt, ...) -> the expanded string.
fn native_format(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc_min("format", args, 1)?;
    let fmt = arg_string("format", args, 0)?;
    let out = format::render(&fmt.to_str_lossy(), &args[1..]).map_err(RuntimeError::from)?;
    Ok(Value::String(Rc::new(SparkString::from_owned(
        out.into_bytes(),
    ))))
}

const METHODS: &[(&str, NativeFn)] = &[
    ("find", native_find),
    ("substr", native_substr),
    ("substrto", native_substrto),
    ("substrfrom", native_substrfrom),
    ("split", native_split),
    ("repeat", native_repeat),
    ("tolower", native_tolower),
    ("toupper", native_toupper),
    ("format", native_format),
];

// `find` is shared with the array library; its free-function form is the
// type-dispatching wrapper in stdlib.rs
const GLOBALS: &[(&str, NativeFn)] = &[
    ("substr", native_substr),
    ("substrto", native_substrto),
    ("substrfrom", native_substrfrom),
    ("split", native_split),
    ("repeat", native_repeat),
    ("tolower", native_tolower),
    ("toupper", native_toupper),
    ("format", native_format),
];

pub fn load(vm: &mut Vm) {
    vm.load_methods(TypeTag::String, METHODS);
    vm.add_lib_funcs("", GLOBALS);
}
