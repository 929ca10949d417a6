//! The hashmap library.
//!
//! Iterating natives walk the cursor protocol and snapshot the map's
//! generation counter first; a callback that mutates the map mid-walk is
//! detected and reported as a runtime error instead of corrupting the
//! cursor.

use crate::array::SparkArray;
use crate::error::RuntimeError;
use crate::hashmap::SparkHashMap;
use crate::stdlib::{arg_array, arg_func, arg_hashmap, check_argc};
use crate::value::{NativeFn, TypeTag, Value};
use crate::vm::Vm;

fn mutation_error(fname: &str) -> RuntimeError {
    RuntimeError::new(format!("{}: hashmap modified during iteration", fname))
}

/// foreach(map, fn): fn(value, key) over every entry.
pub(crate) fn native_foreach(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("foreach", args, 2)?;
    let map = arg_hashmap("foreach", args, 0)?;
    let f = arg_func("foreach", args, 1)?;

    let generation = map.generation();
    let mut cursor = 0;
    while let Some((next, key, value)) = map.next(cursor) {
        vm.call_value(&f, &[value, key])?;
        if map.generation() != generation {
            return Err(mutation_error("foreach"));
        }
        cursor = next;
    }
    Ok(Value::Nil)
}

/// map(map, fn) -> a new hashmap with fn(value, key) under each key.
pub(crate) fn native_map(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("map", args, 2)?;
    let map = arg_hashmap("map", args, 0)?;
    let f = arg_func("map", args, 1)?;

    let out = SparkHashMap::new();
    let generation = map.generation();
    let mut cursor = 0;
    while let Some((next, key, value)) = map.next(cursor) {
        let transformed = vm.call_value(&f, &[value, key.clone()])?;
        if map.generation() != generation {
            return Err(mutation_error("map"));
        }
        out.set(key, transformed)?;
        cursor = next;
    }
    Ok(Value::hashmap(out))
}

/// filter(map, pred) -> a new hashmap keeping entries where pred(value, key).
pub(crate) fn native_filter(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("filter", args, 2)?;
    let map = arg_hashmap("filter", args, 0)?;
    let f = arg_func("filter", args, 1)?;

    let out = SparkHashMap::new();
    let generation = map.generation();
    let mut cursor = 0;
    while let Some((next, key, value)) = map.next(cursor) {
        let ret = vm.call_value(&f, &[value.clone(), key.clone()])?;
        if map.generation() != generation {
            return Err(mutation_error("filter"));
        }
        match ret {
            Value::Bool(true) => out.set(key, value)?,
            Value::Bool(false) => {}
            other => {
                return Err(RuntimeError::new(format!(
                    "predicate must return a boolean, got {}",
                    other.type_name()
                )));
            }
        }
        cursor = next;
    }
    Ok(Value::hashmap(out))
}

fn keys_or_values(args: &[Value], fname: &str, want_values: bool) -> Result<Value, RuntimeError> {
    check_argc(fname, args, 1)?;
    let map = arg_hashmap(fname, args, 0)?;

    let out = SparkArray::new();
    let mut cursor = 0;
    while let Some((next, key, value)) = map.next(cursor) {
        out.push(if want_values { value } else { key });
        cursor = next;
    }
    Ok(Value::array(out))
}

fn native_keys(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    keys_or_values(args, "keys", false)
}

fn native_values(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    keys_or_values(args, "values", true)
}

/// combine(keys, values) -> a hashmap pairing the two arrays up.
fn native_combine(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("combine", args, 2)?;
    let keys = arg_array("combine", args, 0)?;
    let values = arg_array("combine", args, 1)?;

    let n = keys.count();
    if values.count() != n {
        return Err(RuntimeError::new(
            "combine: there must be exactly as many values as keys",
        ));
    }

    let out = SparkHashMap::new();
    for i in 0..n as i64 {
        out.set(keys.get(i)?, values.get(i)?)?;
    }
    Ok(Value::hashmap(out))
}

const METHODS: &[(&str, NativeFn)] = &[
    ("foreach", native_foreach),
    ("map", native_map),
    ("filter", native_filter),
    ("keys", native_keys),
    ("values", native_values),
];

pub fn load(vm: &mut Vm) {
    vm.load_methods(TypeTag::HashMap, METHODS);
    // foreach / map / filter free functions dispatch by type in stdlib.rs
    vm.add_lib_funcs(
        "",
        &[
            ("keys", native_keys),
            ("values", native_values),
            ("combine", native_combine),
        ],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Function;

    fn vm() -> Vm {
        let mut vm = Vm::new();
        load(&mut vm);
        vm
    }

    fn call(vm: &mut Vm, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let f = match vm.globals().get_strkey(name) {
            Value::Func(f) => Value::Func(f),
            _ => vm.lookup_method(&args[0], name)?,
        };
        vm.call_value(&f, args)
    }

    fn sample_map() -> Value {
        let m = SparkHashMap::new();
        m.set_strkey("a", Value::Int(1));
        m.set_strkey("b", Value::Int(2));
        m.set_strkey("c", Value::Int(3));
        Value::hashmap(m)
    }

    #[test]
    fn test_keys_and_values_agree() {
        let mut vm = vm();
        let m = sample_map();
        let keys = call(&mut vm, "keys", &[m.clone()]).unwrap();
        let values = call(&mut vm, "values", &[m.clone()]).unwrap();

        let keys = keys.as_array().unwrap().to_vec();
        let values = values.as_array().unwrap().to_vec();
        assert_eq!(keys.len(), 3);
        assert_eq!(values.len(), 3);

        let map = m.as_hashmap().unwrap();
        for (k, v) in keys.iter().zip(values.iter()) {
            assert_eq!(map.get(k).unwrap(), *v);
        }
    }

    fn double(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
        Ok(Value::Int(args[0].as_int().unwrap_or(0) * 2))
    }

    #[test]
    fn test_map_transforms_values_under_same_keys() {
        let mut vm = vm();
        let f = Value::func(Function::native("double", double));
        let out = call(&mut vm, "map", &[sample_map(), f]).unwrap();
        let out = out.as_hashmap().unwrap();
        assert_eq!(out.get_strkey("a"), Value::Int(2));
        assert_eq!(out.get_strkey("b"), Value::Int(4));
        assert_eq!(out.get_strkey("c"), Value::Int(6));
    }

    fn value_is_odd(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
        Ok(Value::Bool(args[0].as_int().unwrap_or(0) % 2 == 1))
    }

    #[test]
    fn test_filter_keeps_matching_entries() {
        let mut vm = vm();
        let f = Value::func(Function::native("odd", value_is_odd));
        let out = call(&mut vm, "filter", &[sample_map(), f]).unwrap();
        let out = out.as_hashmap().unwrap();
        assert_eq!(out.count(), 2);
        assert_eq!(out.get_strkey("a"), Value::Int(1));
        assert_eq!(out.get_strkey("c"), Value::Int(3));
    }

    #[test]
    fn test_foreach_visits_every_entry_once() {
        fn record(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
            let seen = vm.globals().get_strkey("seen");
            seen.as_array().unwrap().push(args[1].clone());
            Ok(Value::Nil)
        }

        let mut vm = vm();
        vm.add_lib_values("", &[("seen", Value::array(SparkArray::new()))]);
        vm.add_lib_funcs("", &[("record", record)]);

        let f = vm.globals().get_strkey("record");
        call(&mut vm, "foreach", &[sample_map(), f]).unwrap();

        let seen = vm.globals().get_strkey("seen");
        let mut keys: Vec<String> = seen
            .as_array()
            .unwrap()
            .to_vec()
            .iter()
            .map(|k| k.to_display_string())
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_mutation_during_foreach_is_detected() {
        fn poison(vm: &mut Vm, _args: &[Value]) -> Result<Value, RuntimeError> {
            let m = vm.globals().get_strkey("victim");
            m.as_hashmap().unwrap().set_strkey("new", Value::Int(9));
            Ok(Value::Nil)
        }

        let mut vm = vm();
        let m = sample_map();
        vm.add_lib_values("", &[("victim", m.clone())]);
        vm.add_lib_funcs("", &[("poison", poison)]);

        let f = vm.globals().get_strkey("poison");
        let err = call(&mut vm, "foreach", &[m, f]).unwrap_err();
        assert!(err.message.contains("modified during iteration"));
    }

    #[test]
    fn test_combine() {
        let mut vm = vm();
        let keys = Value::array(SparkArray::from_vec(vec![
            Value::string("x"),
            Value::string("y"),
        ]));
        let values = Value::array(SparkArray::from_vec(vec![Value::Int(1), Value::Int(2)]));

        let m = call(&mut vm, "combine", &[keys, values]).unwrap();
        let m = m.as_hashmap().unwrap();
        assert_eq!(m.get_strkey("x"), Value::Int(1));
        assert_eq!(m.get_strkey("y"), Value::Int(2));

        let err = call(
            &mut vm,
            "combine",
            &[
                Value::array(SparkArray::from_vec(vec![Value::string("x")])),
                Value::array(SparkArray::new()),
            ],
        )
        .unwrap_err();
        assert!(err.message.contains("as many values as keys"));
    }
}
