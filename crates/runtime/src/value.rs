//! The Sparkling value model.
//!
//! `Value` is a tagged union over the language's types. Heap payloads are
//! reference counted through `Rc`: cloning a value retains its payload,
//! dropping it releases, and dropping the last reference runs the payload
//! destructor, which releases contained values transitively. Reference
//! cycles through arrays and hashmaps are therefore never collected; the
//! embedder is responsible for breaking them.
//!
//! Equality is structural for strings and numeric across Int/Float;
//! arrays, hashmaps, functions and userinfo compare by identity.
//! Weak userinfo values are byte-copied raw pointers with no ownership.

use crate::array::SparkArray;
use crate::bytecode::Program;
use crate::error::RuntimeError;
use crate::hashmap::SparkHashMap;
use crate::string::SparkString;
use crate::vm::Vm;
use rustc_hash::FxHasher;
use std::any::Any;
use std::cmp::Ordering;
use std::hash::Hasher;
use std::rc::Rc;

/// Type tag of a value, also the key space of the class table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Nil = 0,
    Bool,
    Int,
    Float,
    String,
    Array,
    HashMap,
    Func,
    UserInfo,
    WeakUserInfo,
}

/// Human-readable type name used in diagnostics.
pub fn type_name(tag: TypeTag) -> &'static str {
    match tag {
        TypeTag::Nil => "nil",
        TypeTag::Bool => "bool",
        TypeTag::Int => "int",
        TypeTag::Float => "float",
        TypeTag::String => "string",
        TypeTag::Array => "array",
        TypeTag::HashMap => "hashmap",
        TypeTag::Func => "function",
        TypeTag::UserInfo => "userinfo",
        TypeTag::WeakUserInfo => "userinfo",
    }
}

/// Signature of a native callable.
///
/// `Ok(value)` fills the result slot (pre-initialized to nil by the VM);
/// `Err` is the nonzero status of the C-style ABI, and always carries the
/// runtime error message the VM records.
pub type NativeFn = fn(&mut Vm, &[Value]) -> Result<Value, RuntimeError>;

/// A function compiled from source: a code region inside a program.
#[derive(Debug, Clone)]
pub struct ScriptFunc {
    /// Backing bytecode; the Rc keeps it alive as long as the function is
    pub program: Rc<Program>,
    /// Word index of the first instruction of the body
    pub entry: usize,
    pub arity: u8,
    pub nregs: u8,
}

/// Either a bytecode closure or a native callable.
pub enum FuncKind {
    Script(ScriptFunc),
    Native(NativeFn),
}

/// A callable value. Equality and hash are by identity.
pub struct Function {
    pub name: String,
    pub kind: FuncKind,
}

impl Function {
    pub fn script(name: impl Into<String>, sf: ScriptFunc) -> Self {
        Function {
            name: name.into(),
            kind: FuncKind::Script(sf),
        }
    }

    pub fn native(name: impl Into<String>, f: NativeFn) -> Self {
        Function {
            name: name.into(),
            kind: FuncKind::Native(f),
        }
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            FuncKind::Script(_) => write!(f, "<function {}>", self.name),
            FuncKind::Native(_) => write!(f, "<native function {}>", self.name),
        }
    }
}

/// Opaque host-provided payload. Finalization is the payload's `Drop`.
/// Equality and hash are by identity.
pub struct UserInfo {
    data: Box<dyn Any>,
}

impl UserInfo {
    pub fn new(data: Box<dyn Any>) -> Self {
        UserInfo { data }
    }

    pub fn data(&self) -> &dyn Any {
        &*self.data
    }
}

impl std::fmt::Debug for UserInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<userinfo>")
    }
}

/// A Sparkling value.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<SparkString>),
    Array(Rc<SparkArray>),
    HashMap(Rc<SparkHashMap>),
    Func(Rc<Function>),
    UserInfo(Rc<UserInfo>),
    /// Non-owning raw pointer to host memory; byte-copied, never freed
    WeakUserInfo(*mut ()),
}

impl Value {
    pub fn string(text: impl Into<String>) -> Value {
        Value::String(Rc::new(SparkString::from_owned(text.into().into_bytes())))
    }

    pub fn array(a: SparkArray) -> Value {
        Value::Array(Rc::new(a))
    }

    pub fn hashmap(m: SparkHashMap) -> Value {
        Value::HashMap(Rc::new(m))
    }

    pub fn func(f: Function) -> Value {
        Value::Func(Rc::new(f))
    }

    pub fn userinfo(data: Box<dyn Any>) -> Value {
        Value::UserInfo(Rc::new(UserInfo::new(data)))
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Nil => TypeTag::Nil,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::String(_) => TypeTag::String,
            Value::Array(_) => TypeTag::Array,
            Value::HashMap(_) => TypeTag::HashMap,
            Value::Func(_) => TypeTag::Func,
            Value::UserInfo(_) => TypeTag::UserInfo,
            Value::WeakUserInfo(_) => TypeTag::WeakUserInfo,
        }
    }

    pub fn type_name(&self) -> &'static str {
        type_name(self.type_tag())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_num(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Numeric value widened to float; `None` for non-numbers.
    pub fn as_float_lossy(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&Rc<SparkString>> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Rc<SparkArray>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_hashmap(&self) -> Option<&Rc<SparkHashMap>> {
        match self {
            Value::HashMap(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&Rc<Function>> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    /// Render the value for `print` and diagnostics.
    ///
    /// Containers render recursively to a bounded depth so that cyclic
    /// structures terminate.
    pub fn to_display_string(&self) -> String {
        let mut out = String::new();
        self.render(&mut out, 0, false);
        out
    }

    fn render(&self, out: &mut String, depth: usize, quoted: bool) {
        const MAX_DEPTH: usize = 4;
        match self {
            Value::Nil => out.push_str("nil"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    out.push_str(&format!("{:.1}", f));
                } else {
                    out.push_str(&f.to_string());
                }
            }
            Value::String(s) => {
                if quoted {
                    out.push_str(&format!("{:?}", s.to_str_lossy()));
                } else {
                    out.push_str(&s.to_str_lossy());
                }
            }
            Value::Array(a) => {
                if depth >= MAX_DEPTH {
                    out.push_str("[...]");
                    return;
                }
                out.push('[');
                for (i, item) in a.to_vec().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.render(out, depth + 1, true);
                }
                out.push(']');
            }
            Value::HashMap(m) => {
                if depth >= MAX_DEPTH {
                    out.push_str("{...}");
                    return;
                }
                out.push('{');
                let mut cursor = 0;
                let mut first = true;
                while let Some((next, key, value)) = m.next(cursor) {
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    key.render(out, depth + 1, true);
                    out.push_str(": ");
                    value.render(out, depth + 1, true);
                    cursor = next;
                }
                out.push('}');
            }
            Value::Func(f) => out.push_str(&format!("<function {}>", f.name)),
            Value::UserInfo(_) => out.push_str("<userinfo>"),
            Value::WeakUserInfo(p) => out.push_str(&format!("<userinfo {:p}>", p)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            // Numeric equality cross-compares by numeric value
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::HashMap(a), Value::HashMap(b)) => Rc::ptr_eq(a, b),
            (Value::Func(a), Value::Func(b)) => Rc::ptr_eq(a, b),
            (Value::UserInfo(a), Value::UserInfo(b)) => Rc::ptr_eq(a, b),
            (Value::WeakUserInfo(a), Value::WeakUserInfo(b)) => a == b,
            _ => false,
        }
    }
}

/// Whether `compare` is defined for this pair of values.
///
/// Int and Float are mutually comparable; strings compare with strings.
pub fn comparable(a: &Value, b: &Value) -> bool {
    (a.is_num() && b.is_num()) || matches!((a, b), (Value::String(_), Value::String(_)))
}

/// Total order over comparable pairs; `None` otherwise.
///
/// NaN is ordered below every other float so that sorting an array with a
/// NaN in it terminates deterministically.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        _ if a.is_num() && b.is_num() => {
            let (x, y) = (a.as_float_lossy()?, b.as_float_lossy()?);
            Some(x.partial_cmp(&y).unwrap_or_else(|| match (x.is_nan(), y.is_nan()) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => Ordering::Equal,
            }))
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// `compare` with a typed error naming both operand types when the pair
/// is not ordered.
pub fn try_compare(a: &Value, b: &Value) -> Result<Ordering, RuntimeError> {
    compare(a, b).ok_or_else(|| {
        RuntimeError::new(format!(
            "cannot compare values of type {} and {}",
            a.type_name(),
            b.type_name()
        ))
    })
}

/// Deterministic (within a process run) hash of a hashable value.
///
/// Integral floats hash as the equal integer, so `1` and `1.0` collide as
/// keys, matching their equality. Arrays and hashmaps are not hashable.
pub fn hash_value(v: &Value) -> Result<u64, RuntimeError> {
    let mut h = FxHasher::default();
    match v {
        Value::Nil => h.write_u8(0),
        Value::Bool(b) => {
            h.write_u8(1);
            h.write_u8(*b as u8);
        }
        Value::Int(i) => {
            h.write_u8(2);
            h.write_i64(*i);
        }
        Value::Float(f) => {
            // An integral float must hash identically to the matching Int
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                h.write_u8(2);
                h.write_i64(*f as i64);
            } else {
                h.write_u8(3);
                h.write_u64(f.to_bits());
            }
        }
        Value::String(s) => return Ok(s.hash()),
        Value::Func(f) => {
            h.write_u8(4);
            h.write_usize(Rc::as_ptr(f) as usize);
        }
        Value::UserInfo(u) => {
            h.write_u8(5);
            h.write_usize(Rc::as_ptr(u) as usize);
        }
        Value::WeakUserInfo(p) => {
            h.write_u8(6);
            h.write_usize(*p as usize);
        }
        Value::Array(_) | Value::HashMap(_) => {
            return Err(RuntimeError::new(format!(
                "{} values are not hashable",
                v.type_name()
            )));
        }
    }
    Ok(h.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_cross_equality() {
        assert_eq!(Value::Int(3), Value::Float(3.0));
        assert_eq!(Value::Float(3.0), Value::Int(3));
        assert_ne!(Value::Int(3), Value::Float(3.5));
        assert_ne!(Value::Int(3), Value::Int(4));
    }

    #[test]
    fn test_nan_not_equal_to_itself() {
        assert_ne!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn test_identity_equality_for_containers() {
        let a = Value::array(SparkArray::new());
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, Value::array(SparkArray::new()));

        let m = Value::hashmap(SparkHashMap::new());
        assert_eq!(m, m.clone());
        assert_ne!(m, Value::hashmap(SparkHashMap::new()));
    }

    #[test]
    fn test_string_structural_equality() {
        assert_eq!(Value::string("abc"), Value::string("abc"));
        assert_ne!(Value::string("abc"), Value::string("abd"));
    }

    #[test]
    fn test_hash_agrees_with_equality() {
        let pairs = [
            (Value::Int(7), Value::Float(7.0)),
            (Value::string("key"), Value::string("key")),
            (Value::Nil, Value::Nil),
            (Value::Bool(true), Value::Bool(true)),
        ];
        for (a, b) in pairs {
            assert_eq!(a, b);
            assert_eq!(hash_value(&a).unwrap(), hash_value(&b).unwrap());
        }
    }

    #[test]
    fn test_containers_not_hashable() {
        assert!(hash_value(&Value::array(SparkArray::new())).is_err());
        assert!(hash_value(&Value::hashmap(SparkHashMap::new())).is_err());
    }

    #[test]
    fn test_compare_numeric_and_strings() {
        assert_eq!(compare(&Value::Int(1), &Value::Float(2.0)), Some(Ordering::Less));
        assert_eq!(compare(&Value::Float(2.0), &Value::Int(1)), Some(Ordering::Greater));
        assert_eq!(
            compare(&Value::string("abc"), &Value::string("abd")),
            Some(Ordering::Less)
        );
        assert_eq!(compare(&Value::Int(1), &Value::string("1")), None);
    }

    #[test]
    fn test_compare_antisymmetry() {
        let a = Value::Int(3);
        let b = Value::Float(5.5);
        assert_eq!(compare(&a, &b), Some(Ordering::Less));
        assert_eq!(compare(&b, &a), Some(Ordering::Greater));
    }

    #[test]
    fn test_try_compare_names_types() {
        let err = try_compare(&Value::Int(1), &Value::Bool(true)).unwrap_err();
        assert!(err.message.contains("int"));
        assert!(err.message.contains("bool"));
    }

    #[test]
    fn test_retain_release_is_observably_neutral() {
        let a = Value::array(SparkArray::new());
        let before = match &a {
            Value::Array(rc) => Rc::strong_count(rc),
            _ => unreachable!(),
        };
        {
            let _retained = a.clone();
        }
        let after = match &a {
            Value::Array(rc) => Rc::strong_count(rc),
            _ => unreachable!(),
        };
        assert_eq!(before, after);
    }

    #[test]
    fn test_userinfo_identity_and_finalization() {
        use std::cell::Cell;

        struct Payload {
            dropped: Rc<Cell<bool>>,
        }
        impl Drop for Payload {
            fn drop(&mut self) {
                self.dropped.set(true);
            }
        }

        let dropped = Rc::new(Cell::new(false));
        let u = Value::userinfo(Box::new(Payload {
            dropped: dropped.clone(),
        }));

        // Identity equality and hash
        let alias = u.clone();
        assert_eq!(u, alias);
        assert_eq!(hash_value(&u).unwrap(), hash_value(&alias).unwrap());
        assert_ne!(u, Value::userinfo(Box::new(0u8)));

        // The finalizer runs when the last strong reference drops
        drop(alias);
        assert!(!dropped.get());
        drop(u);
        assert!(dropped.get());
    }

    #[test]
    fn test_weak_userinfo_is_byte_copied() {
        let mut backing = 0u32;
        let p = &mut backing as *mut u32 as *mut ();
        let a = Value::WeakUserInfo(p);
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, Value::WeakUserInfo(std::ptr::null_mut()));
        assert_eq!(hash_value(&a).unwrap(), hash_value(&b).unwrap());
    }

    #[test]
    fn test_display_strings() {
        assert_eq!(Value::Nil.to_display_string(), "nil");
        assert_eq!(Value::Int(42).to_display_string(), "42");
        assert_eq!(Value::Float(2.0).to_display_string(), "2.0");
        assert_eq!(Value::string("hi").to_display_string(), "hi");
    }
}
