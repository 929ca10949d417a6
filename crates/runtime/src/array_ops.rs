//! The array library.
//!
//! In-place mutation (sort, insert, erase, push, ...) plus the
//! higher-order combinators (foreach, map, filter, reduce, any, all).
//! Callbacks receive `(value, index)` except `reduce`, which receives
//! `(accumulator, value)`, and `pfind`, which receives just the value.
//! Errors raised by user callbacks abort the operation and propagate with
//! the VM's error state set.
//!
//! No interior borrow is held across a callback; a callback that shrinks
//! the array under an iterating native surfaces as an index error rather
//! than undefined behavior.

use crate::array::SparkArray;
use crate::error::RuntimeError;
use crate::stdlib::{
    arg_array, arg_func, arg_int, arg_string, check_argc, check_argc_range,
};
use crate::string::SparkString;
use crate::value::{comparable, try_compare, NativeFn, TypeTag, Value};
use crate::vm::Vm;
use std::rc::Rc;

/// "a < b" under an optional user comparator.
///
/// A comparator must return a boolean; anything else aborts the caller.
fn less_than(
    vm: &mut Vm,
    cmp: Option<&Value>,
    a: &Value,
    b: &Value,
) -> Result<bool, RuntimeError> {
    match cmp {
        Some(f) => {
            let ret = vm.call_value(f, &[a.clone(), b.clone()])?;
            match ret {
                Value::Bool(lt) => Ok(lt),
                other => Err(RuntimeError::new(format!(
                    "comparator function must return a boolean, got {}",
                    other.type_name()
                ))),
            }
        }
        None => Ok(try_compare(a, b)?.is_lt()),
    }
}

fn sort_less(
    vm: &mut Vm,
    cmp: Option<&Value>,
    a: &Value,
    b: &Value,
) -> Result<bool, RuntimeError> {
    if cmp.is_none() && !comparable(a, b) {
        return Err(RuntimeError::new(format!(
            "attempt to sort uncomparable values of type {} and {}",
            a.type_name(),
            b.type_name()
        )));
    }
    less_than(vm, cmp, a, b)
}

/// Lomuto partition around the middle element.
fn partition(
    vm: &mut Vm,
    arr: &SparkArray,
    left: i64,
    right: i64,
    cmp: Option<&Value>,
) -> Result<i64, RuntimeError> {
    let mut store = left;
    let pivot_idx = left + (right - left) / 2;
    let pivot = arr.get(pivot_idx)?;
    arr.swap(pivot_idx, right)?;

    for i in left..right {
        let item = arr.get(i)?;
        if sort_less(vm, cmp, &item, &pivot)? {
            arr.swap(i, store)?;
            store += 1;
        }
    }

    arr.swap(store, right)?;
    Ok(store)
}

fn quicksort(
    vm: &mut Vm,
    arr: &SparkArray,
    left: i64,
    right: i64,
    cmp: Option<&Value>,
) -> Result<(), RuntimeError> {
    if left >= right {
        return Ok(());
    }
    let pivot = partition(vm, arr, left, right, cmp)?;
    quicksort(vm, arr, left, pivot - 1, cmp)?;
    quicksort(vm, arr, pivot + 1, right, cmp)
}

/// sort(arr, [cmp]): in-place quicksort; not stable.
fn native_sort(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc_range("sort", args, 1, 2)?;
    let arr = arg_array("sort", args, 0)?;
    let cmp = if args.len() == 2 {
        Some(arg_func("sort", args, 1)?)
    } else {
        None
    };
    quicksort(vm, &arr, 0, arr.count() as i64 - 1, cmp.as_ref())?;
    Ok(Value::Nil)
}

/// bsearch(arr, key, [cmp]) -> index of an element equal to key, or -1.
///
/// The array must be pre-sorted under the same ordering; an unsorted
/// array yields an arbitrary result but never probes out of bounds.
fn native_bsearch(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc_range("bsearch", args, 2, 3)?;
    let arr = arg_array("bsearch", args, 0)?;
    let key = args[1].clone();
    let cmp = if args.len() == 3 {
        Some(arg_func("bsearch", args, 2)?)
    } else {
        None
    };

    let mut lower = 0i64;
    let mut upper = arr.count() as i64;

    while lower < upper {
        let middle = lower + (upper - lower) / 2;
        let mid_val = arr.get(middle)?;
        if less_than(vm, cmp.as_ref(), &key, &mid_val)? {
            upper = middle;
        } else if less_than(vm, cmp.as_ref(), &mid_val, &key)? {
            lower = middle + 1;
        } else {
            // Neither less nor greater: equal under the ordering
            return Ok(Value::Int(middle));
        }
    }

    Ok(Value::Int(-1))
}

/// Validate a predicate's return value where a boolean is mandatory.
fn expect_bool(ret: Value) -> Result<bool, RuntimeError> {
    match ret {
        Value::Bool(b) => Ok(b),
        other => Err(RuntimeError::new(format!(
            "predicate must return a boolean, got {}",
            other.type_name()
        ))),
    }
}

/// foreach(arr, fn): fn(value, index); returning false stops the walk.
pub(crate) fn native_foreach(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("foreach", args, 2)?;
    let arr = arg_array("foreach", args, 0)?;
    let f = arg_func("foreach", args, 1)?;

    let n = arr.count() as i64;
    for i in 0..n {
        let item = arr.get(i)?;
        let ret = vm.call_value(&f, &[item, Value::Int(i)])?;
        match ret {
            Value::Bool(false) => break,
            Value::Bool(true) | Value::Nil => {}
            other => {
                return Err(RuntimeError::new(format!(
                    "callback function must return boolean or nil, got {}",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::Nil)
}

/// reduce(arr, initial, fn): fn(accumulator, value).
fn native_reduce(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("reduce", args, 3)?;
    let arr = arg_array("reduce", args, 0)?;
    let mut acc = args[1].clone();
    let f = arg_func("reduce", args, 2)?;

    let n = arr.count() as i64;
    for i in 0..n {
        let item = arr.get(i)?;
        acc = vm.call_value(&f, &[acc, item])?;
    }
    Ok(acc)
}

pub(crate) fn native_filter(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("filter", args, 2)?;
    let arr = arg_array("filter", args, 0)?;
    let f = arg_func("filter", args, 1)?;

    let out = SparkArray::new();
    let n = arr.count() as i64;
    for i in 0..n {
        let item = arr.get(i)?;
        let keep = expect_bool(vm.call_value(&f, &[item.clone(), Value::Int(i)])?)?;
        if keep {
            out.push(item);
        }
    }
    Ok(Value::array(out))
}

pub(crate) fn native_map(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("map", args, 2)?;
    let arr = arg_array("map", args, 0)?;
    let f = arg_func("map", args, 1)?;

    let out = SparkArray::new();
    let n = arr.count() as i64;
    for i in 0..n {
        let item = arr.get(i)?;
        out.push(vm.call_value(&f, &[item, Value::Int(i)])?);
    }
    Ok(Value::array(out))
}

fn any_all(vm: &mut Vm, args: &[Value], any: bool, fname: &str) -> Result<Value, RuntimeError> {
    check_argc(fname, args, 2)?;
    let arr = arg_array(fname, args, 0)?;
    let f = arg_func(fname, args, 1)?;

    let n = arr.count() as i64;
    for i in 0..n {
        let item = arr.get(i)?;
        let truth = expect_bool(vm.call_value(&f, &[item, Value::Int(i)])?)?;
        if any && truth {
            return Ok(Value::Bool(true));
        }
        if !any && !truth {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(!any))
}

fn native_any(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    any_all(vm, args, true, "any")
}

fn native_all(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    any_all(vm, args, false, "all")
}

/// find(arr, elem) -> first index holding an equal value, or -1.
pub(crate) fn native_find(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("find", args, 2)?;
    let arr = arg_array("find", args, 0)?;

    let n = arr.count() as i64;
    for i in 0..n {
        if arr.get(i)? == args[1] {
            return Ok(Value::Int(i));
        }
    }
    Ok(Value::Int(-1))
}

/// pfind(arr, pred) -> first index where pred(value) is true, or -1.
fn native_pfind(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("pfind", args, 2)?;
    let arr = arg_array("pfind", args, 0)?;
    let f = arg_func("pfind", args, 1)?;

    let n = arr.count() as i64;
    for i in 0..n {
        let item = arr.get(i)?;
        if expect_bool(vm.call_value(&f, &[item])?)? {
            return Ok(Value::Int(i));
        }
    }
    Ok(Value::Int(-1))
}

/// slice(arr, start, length) -> a new array copying the range.
fn native_slice(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("slice", args, 3)?;
    let arr = arg_array("slice", args, 0)?;
    let start = arg_int("slice", args, 1)?;
    let length = arg_int("slice", args, 2)?;
    let n = arr.count() as i64;

    if start < 0 || start > n {
        return Err(RuntimeError::new(format!(
            "starting index {} is out of bounds for array of length {}",
            start, n
        )));
    }
    if length < 0 {
        return Err(RuntimeError::new(format!("length was negative ({})", length)));
    }
    if start + length > n {
        return Err(RuntimeError::new(format!(
            "range [{}, {}) out of bounds for array of size {}",
            start,
            start + length,
            n
        )));
    }

    let out = SparkArray::new();
    for i in start..start + length {
        out.push(arr.get(i)?);
    }
    Ok(Value::array(out))
}

/// join(arr, delim) -> the string elements joined by delim.
fn native_join(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("join", args, 2)?;
    let arr = arg_array("join", args, 0)?;
    let delim = arg_string("join", args, 1)?;

    let mut buf: Vec<u8> = Vec::new();
    let n = arr.count() as i64;
    for i in 0..n {
        match arr.get(i)? {
            Value::String(s) => {
                if i > 0 {
                    buf.extend_from_slice(delim.as_bytes());
                }
                buf.extend_from_slice(s.as_bytes());
            }
            other => {
                return Err(RuntimeError::new(format!(
                    "join: array must contain strings only, element {} is {}",
                    i,
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::String(Rc::new(SparkString::from_owned(buf))))
}

/// insert(arr, value, index): shifts the tail right.
fn native_insert(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("insert", args, 3)?;
    let arr = arg_array("insert", args, 0)?;
    let index = arg_int("insert", args, 2)?;
    arr.insert(index, args[1].clone())?;
    Ok(Value::Nil)
}

/// inject(haystack, needle, [index]): splices needle in, at the end by default.
fn native_inject(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc_range("inject", args, 2, 3)?;
    let haystack = arg_array("inject", args, 0)?;
    let needle = arg_array("inject", args, 1)?;
    let index = if args.len() == 3 {
        arg_int("inject", args, 2)?
    } else {
        haystack.count() as i64
    };
    haystack.inject(index, needle.to_vec())?;
    Ok(Value::Nil)
}

fn native_erase(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("erase", args, 2)?;
    let arr = arg_array("erase", args, 0)?;
    let index = arg_int("erase", args, 1)?;
    arr.remove(index)?;
    Ok(Value::Nil)
}

/// concat(...) -> a new array with the elements of every argument.
fn native_concat(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let out = SparkArray::new();
    for (i, arg) in args.iter().enumerate() {
        match arg {
            Value::Array(a) => {
                for item in a.to_vec() {
                    out.push(item);
                }
            }
            other => {
                return Err(RuntimeError::new(format!(
                    "concat: arguments must be arrays (argument {} was {})",
                    i + 1,
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::array(out))
}

fn native_push(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("push", args, 2)?;
    let arr = arg_array("push", args, 0)?;
    arr.push(args[1].clone());
    Ok(Value::Nil)
}

/// pop(arr) -> the removed last element; error on an empty array.
fn native_pop(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("pop", args, 1)?;
    let arr = arg_array("pop", args, 0)?;
    arr.pop()
}

fn native_last(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("last", args, 1)?;
    let arr = arg_array("last", args, 0)?;
    let n = arr.count();
    if n == 0 {
        return Err(RuntimeError::new("cannot get last element of empty array"));
    }
    arr.get(n as i64 - 1)
}

fn native_swap(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("swap", args, 3)?;
    let arr = arg_array("swap", args, 0)?;
    let a = arg_int("swap", args, 1)?;
    let b = arg_int("swap", args, 2)?;
    arr.swap(a, b)?;
    Ok(Value::Nil)
}

fn native_reverse(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("reverse", args, 1)?;
    let arr = arg_array("reverse", args, 0)?;
    arr.reverse();
    Ok(Value::Nil)
}

const METHODS: &[(&str, NativeFn)] = &[
    ("sort", native_sort),
    ("find", native_find),
    ("pfind", native_pfind),
    ("bsearch", native_bsearch),
    ("any", native_any),
    ("all", native_all),
    ("slice", native_slice),
    ("join", native_join),
    ("foreach", native_foreach),
    ("reduce", native_reduce),
    ("filter", native_filter),
    ("map", native_map),
    ("insert", native_insert),
    ("inject", native_inject),
    ("erase", native_erase),
    ("concat", native_concat),
    ("push", native_push),
    ("pop", native_pop),
    ("last", native_last),
    ("swap", native_swap),
    ("reverse", native_reverse),
];

// find / foreach / filter / map are shared with other container
// libraries; their free-function forms are the type-dispatching wrappers
// in stdlib.rs
const GLOBALS: &[(&str, NativeFn)] = &[
    ("sort", native_sort),
    ("pfind", native_pfind),
    ("bsearch", native_bsearch),
    ("any", native_any),
    ("all", native_all),
    ("slice", native_slice),
    ("join", native_join),
    ("reduce", native_reduce),
    ("insert", native_insert),
    ("inject", native_inject),
    ("erase", native_erase),
    ("concat", native_concat),
    ("push", native_push),
    ("pop", native_pop),
    ("last", native_last),
    ("swap", native_swap),
    ("reverse", native_reverse),
];

pub fn load(vm: &mut Vm) {
    vm.load_methods(TypeTag::Array, METHODS);
    vm.add_lib_funcs("", GLOBALS);
}
