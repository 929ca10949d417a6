//! The sysutil library.
//!
//! OS and utility natives: environment and shell access, wall-clock and
//! civil time (through libc's gmtime_r / localtime_r / strftime), the
//! string-to-number conversions, runtime compilation hooks (`compile`,
//! `exprtofn`, `require`, routed through the loader the context installs),
//! and `backtrace`. The `call` native is registered as a method on
//! function values; the `String` / `Array` / `HashMap` / `Function`
//! constants expose the class method dictionaries themselves.

use crate::array::SparkArray;
use crate::error::RuntimeError;
use crate::hashmap::SparkHashMap;
use crate::stdlib::{
    arg_array, arg_bool, arg_func, arg_hashmap, arg_int, arg_string, check_argc,
    check_argc_range,
};
use crate::value::{NativeFn, TypeTag, Value};
use crate::vm::Vm;
use std::ffi::CString;
use std::time::{SystemTime, UNIX_EPOCH};

fn native_getenv(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("getenv", args, 1)?;
    let name = arg_string("getenv", args, 0)?;
    match std::env::var(name.to_str_lossy().as_ref()) {
        Ok(v) => Ok(Value::string(v)),
        Err(_) => Ok(Value::Nil),
    }
}

/// system(cmd) -> the shell's exit status.
fn native_system(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("system", args, 1)?;
    let cmd = arg_string("system", args, 0)?;
    let ccmd = CString::new(cmd.as_bytes())
        .map_err(|_| RuntimeError::new("system: command contains a NUL byte"))?;
    // SAFETY: libc::system copies the NUL-terminated command string
    let code = unsafe { libc::system(ccmd.as_ptr()) };
    Ok(Value::Int(code as i64))
}

fn native_assert(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("assert", args, 2)?;
    let cond = arg_bool("assert", args, 0)?;
    let msg = arg_string("assert", args, 1)?;
    if !cond {
        return Err(RuntimeError::new(format!(
            "assertion failed: {}",
            msg.to_str_lossy()
        )));
    }
    Ok(Value::Nil)
}

fn native_time(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("time", args, 0)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(Value::Int(now))
}

fn civil_tm(timestamp: i64, local: bool) -> libc::tm {
    let time = timestamp as libc::time_t;
    // SAFETY: zeroed tm is a valid out-param; the *_r functions fill it
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    unsafe {
        if local {
            libc::localtime_r(&time, &mut tm);
        } else {
            libc::gmtime_r(&time, &mut tm);
        }
    }
    tm
}

/// Break a Unix timestamp into the civil-time hashmap schema:
/// sec 0-60, min 0-59, hour 0-23, mday 1-31, month 0-11, year since
/// 1900, wday with Sunday = 0, yday 0-365, and boolean isdst.
fn time_map(timestamp: i64, local: bool) -> Value {
    let tm = civil_tm(timestamp, local);
    let map = SparkHashMap::new();
    map.set_strkey("sec", Value::Int(tm.tm_sec as i64));
    map.set_strkey("min", Value::Int(tm.tm_min as i64));
    map.set_strkey("hour", Value::Int(tm.tm_hour as i64));
    map.set_strkey("mday", Value::Int(tm.tm_mday as i64));
    map.set_strkey("month", Value::Int(tm.tm_mon as i64));
    map.set_strkey("year", Value::Int(tm.tm_year as i64));
    map.set_strkey("wday", Value::Int(tm.tm_wday as i64));
    map.set_strkey("yday", Value::Int(tm.tm_yday as i64));
    map.set_strkey("isdst", Value::Bool(tm.tm_isdst > 0));
    Value::hashmap(map)
}

fn native_utctime(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("utctime", args, 1)?;
    Ok(time_map(arg_int("utctime", args, 0)?, false))
}

fn native_localtime(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("localtime", args, 1)?;
    Ok(time_map(arg_int("localtime", args, 0)?, true))
}

fn tm_field(map: &SparkHashMap, key: &str) -> Result<libc::c_int, RuntimeError> {
    match map.get_strkey(key) {
        Value::Int(i) => Ok(i as libc::c_int),
        _ => Err(RuntimeError::new("time components should be integers")),
    }
}

const STRFTIME_BUFSIZE: usize = 0x100;

/// fmtdate(fmt, timemap) -> the strftime expansion of a civil-time map.
fn native_fmtdate(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("fmtdate", args, 2)?;
    let fmt = arg_string("fmtdate", args, 0)?;
    let map = arg_hashmap("fmtdate", args, 1)?;

    // SAFETY: zeroed tm has every platform-specific extra field cleared
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    tm.tm_sec = tm_field(&map, "sec")?;
    tm.tm_min = tm_field(&map, "min")?;
    tm.tm_hour = tm_field(&map, "hour")?;
    tm.tm_mday = tm_field(&map, "mday")?;
    tm.tm_mon = tm_field(&map, "month")?;
    tm.tm_year = tm_field(&map, "year")?;
    tm.tm_wday = tm_field(&map, "wday")?;
    tm.tm_yday = tm_field(&map, "yday")?;
    tm.tm_isdst = match map.get_strkey("isdst") {
        Value::Bool(b) => b as libc::c_int,
        _ => return Err(RuntimeError::new("isdst must be a boolean")),
    };

    let cfmt = CString::new(fmt.as_bytes())
        .map_err(|_| RuntimeError::new("fmtdate: format contains a NUL byte"))?;
    let mut buf = vec![0u8; STRFTIME_BUFSIZE];
    // SAFETY: buf outlives the call and its length is passed alongside
    let len = unsafe {
        libc::strftime(
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            cfmt.as_ptr(),
            &tm,
        )
    };
    buf.truncate(len);
    Ok(Value::String(std::rc::Rc::new(
        crate::string::SparkString::from_owned(buf),
    )))
}

fn native_difftime(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("difftime", args, 2)?;
    let later = arg_int("difftime", args, 0)?;
    let earlier = arg_int("difftime", args, 1)?;
    Ok(Value::Float(later as f64 - earlier as f64))
}

fn loader_of(vm: &Vm, fname: &str) -> Result<std::rc::Rc<std::cell::RefCell<dyn crate::vm::Loader>>, RuntimeError> {
    vm.loader().ok_or_else(|| {
        RuntimeError::new(format!("{}: no compiler is attached to this VM", fname))
    })
}

/// compile(src) -> the compiled function, or the error message string.
fn native_compile(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("compile", args, 1)?;
    let src = arg_string("compile", args, 0)?;
    let loader = loader_of(vm, "compile")?;
    let result = loader.borrow_mut().load_string(&src.to_str_lossy());
    Ok(match result {
        Ok(func) => func,
        Err(e) => Value::string(e.message),
    })
}

/// exprtofn(src) -> a function evaluating the expression, or the error
/// message string.
fn native_exprtofn(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("exprtofn", args, 1)?;
    let src = arg_string("exprtofn", args, 0)?;
    let loader = loader_of(vm, "exprtofn")?;
    let result = loader.borrow_mut().compile_expr(&src.to_str_lossy());
    Ok(match result {
        Ok(func) => func,
        Err(e) => Value::string(e.message),
    })
}

/// require(path): load a source file and execute its top level.
fn native_require(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("require", args, 1)?;
    let path = arg_string("require", args, 0)?;
    let loader = loader_of(vm, "require")?;
    let loaded = loader.borrow_mut().load_source_file(&path.to_str_lossy());
    match loaded {
        Ok(func) => vm.call_value(&func, &[]),
        Err(e) => Err(RuntimeError::new(e.message)),
    }
}

/// Longest-valid-prefix integer parse with strtol's base rules.
///
/// Returns 0 for input with no digits; this mirrors the underlying C
/// behavior on purpose and is documented rather than reported as an
/// error, so `tonumber` keeps its total contract.
pub(crate) fn strtol_like(text: &str, base: u32) -> i64 {
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }

    let negative = match bytes.get(i) {
        Some(b'-') => {
            i += 1;
            true
        }
        Some(b'+') => {
            i += 1;
            false
        }
        _ => false,
    };

    let mut base = base;
    if base == 0 {
        if bytes.get(i) == Some(&b'0') {
            match bytes.get(i + 1) {
                Some(b'x' | b'X') if bytes.get(i + 2).is_some_and(|b| b.is_ascii_hexdigit()) => {
                    base = 16;
                    i += 2;
                }
                _ => base = 8,
            }
        } else {
            base = 10;
        }
    } else if base == 16
        && bytes.get(i) == Some(&b'0')
        && matches!(bytes.get(i + 1), Some(b'x' | b'X'))
        && bytes.get(i + 2).is_some_and(|b| b.is_ascii_hexdigit())
    {
        i += 2;
    }

    let mut acc: i128 = 0;
    let mut saturated = false;
    while let Some(&b) = bytes.get(i) {
        let digit = match b {
            b'0'..=b'9' => (b - b'0') as u32,
            b'a'..=b'z' => (b - b'a') as u32 + 10,
            b'A'..=b'Z' => (b - b'A') as u32 + 10,
            _ => break,
        };
        if digit >= base {
            break;
        }
        if !saturated {
            acc = acc * base as i128 + digit as i128;
            if acc > i64::MAX as i128 + 1 {
                saturated = true;
            }
        }
        i += 1;
    }

    let signed = if negative { -acc } else { acc };
    if saturated || signed > i64::MAX as i128 {
        if negative { i64::MIN } else { i64::MAX }
    } else if signed < i64::MIN as i128 {
        i64::MIN
    } else {
        signed as i64
    }
}

/// Longest-valid-prefix float parse; 0.0 when no number leads the text.
pub(crate) fn strtod_like(text: &str) -> f64 {
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let start = i;

    if matches!(bytes.get(i), Some(b'-' | b'+')) {
        i += 1;
    }

    let int_digits = bytes[i..].iter().take_while(|b| b.is_ascii_digit()).count();
    i += int_digits;

    let mut frac_digits = 0;
    if bytes.get(i) == Some(&b'.') {
        frac_digits = bytes[i + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if int_digits > 0 || frac_digits > 0 {
            i += 1 + frac_digits;
        }
    }

    if int_digits == 0 && frac_digits == 0 {
        return 0.0;
    }

    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'-' | b'+')) {
            j += 1;
        }
        let exp_digits = bytes[j..].iter().take_while(|b| b.is_ascii_digit()).count();
        if exp_digits > 0 {
            i = j + exp_digits;
        }
    }

    text[start..i].parse().unwrap_or(0.0)
}

/// toint(str, [base]) with base 0 (auto-detect) or 2..36.
fn native_toint(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc_range("toint", args, 1, 2)?;
    let text = arg_string("toint", args, 0)?;
    let base = if args.len() == 2 {
        arg_int("toint", args, 1)?
    } else {
        0
    };

    if base == 1 || base < 0 || base > 36 {
        return Err(RuntimeError::new(
            "toint: base must be zero or between [2...36]",
        ));
    }

    Ok(Value::Int(strtol_like(
        &text.to_str_lossy(),
        base as u32,
    )))
}

fn native_tofloat(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("tofloat", args, 1)?;
    let text = arg_string("tofloat", args, 0)?;
    Ok(Value::Float(strtod_like(&text.to_str_lossy())))
}

/// tonumber(str) -> float when the text mentions '.', 'e' or 'E', else
/// an integer with auto-detected base.
fn native_tonumber(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("tonumber", args, 1)?;
    let text = arg_string("tonumber", args, 0)?;
    if text.as_bytes().iter().any(|b| matches!(b, b'.' | b'e' | b'E')) {
        native_tofloat(vm, &args[..1])
    } else {
        native_toint(vm, &args[..1])
    }
}

/// call(fn, args_array): a method on function values.
fn native_call(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("call", args, 2)?;
    let callee = arg_func("call", args, 0)?;
    let call_args = arg_array("call", args, 1)?;
    vm.call_value(&callee, &call_args.to_vec())
}

/// backtrace() -> frame names, innermost first, excluding its own frame.
fn native_backtrace(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("backtrace", args, 0)?;
    let trace = vm.stack_trace();
    Ok(Value::array(SparkArray::from_vec(
        trace.into_iter().skip(1).map(Value::string).collect(),
    )))
}

const FUNCS: &[(&str, NativeFn)] = &[
    ("getenv", native_getenv),
    ("system", native_system),
    ("assert", native_assert),
    ("time", native_time),
    ("utctime", native_utctime),
    ("localtime", native_localtime),
    ("fmtdate", native_fmtdate),
    ("difftime", native_difftime),
    ("compile", native_compile),
    ("exprtofn", native_exprtofn),
    ("toint", native_toint),
    ("tofloat", native_tofloat),
    ("tonumber", native_tonumber),
    ("require", native_require),
    ("backtrace", native_backtrace),
];

pub fn load(vm: &mut Vm) {
    vm.add_lib_funcs("", FUNCS);
    vm.load_methods(TypeTag::Func, &[("call", native_call)]);

    // Expose the class dictionaries themselves as constants
    let classes: Vec<(&str, Value)> = [
        ("String", TypeTag::String),
        ("Array", TypeTag::Array),
        ("HashMap", TypeTag::HashMap),
        ("Function", TypeTag::Func),
    ]
    .iter()
    .filter_map(|(name, tag)| {
        vm.class_of(*tag)
            .map(|class| (*name, Value::HashMap(class.clone())))
    })
    .collect();
    vm.add_lib_values("", &classes);
}
