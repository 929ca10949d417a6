//! The math library.
//!
//! Real functions over Int/Float values, the `range` constructors, and
//! the complex-number operations. Complex numbers are a hashmap
//! convention, not a type: numeric `re`/`im` entries (canonical form) or
//! `r`/`theta` (polar form). Every complex operation validates the shape
//! and produces a fresh hashmap in the same convention.

use crate::array::SparkArray;
use crate::error::RuntimeError;
use crate::hashmap::SparkHashMap;
use crate::stdlib::{arg_hashmap, arg_int, arg_num, check_argc, check_argc_min, check_argc_range};
use crate::value::{try_compare, NativeFn, Value};
use crate::vm::Vm;

macro_rules! float_fn {
    ($rust_name:ident, $name:literal, $f:expr) => {
        fn $rust_name(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
            check_argc($name, args, 1)?;
            let x = arg_num($name, args, 0)?;
            Ok(Value::Float(($f)(x)))
        }
    };
}

/// Float functions that truncate to an integer result.
macro_rules! intize_fn {
    ($rust_name:ident, $name:literal, $f:expr) => {
        fn $rust_name(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
            check_argc($name, args, 1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(*i)),
                _ => {
                    let x = arg_num($name, args, 0)?;
                    Ok(Value::Int(($f)(x) as i64))
                }
            }
        }
    };
}

float_fn!(native_sqrt, "sqrt", f64::sqrt);
float_fn!(native_cbrt, "cbrt", f64::cbrt);
float_fn!(native_exp, "exp", f64::exp);
float_fn!(native_exp2, "exp2", f64::exp2);
float_fn!(native_exp10, "exp10", |x: f64| 10f64.powf(x));
float_fn!(native_log, "log", f64::ln);
float_fn!(native_log2, "log2", f64::log2);
float_fn!(native_log10, "log10", f64::log10);
float_fn!(native_sin, "sin", f64::sin);
float_fn!(native_cos, "cos", f64::cos);
float_fn!(native_tan, "tan", f64::tan);
float_fn!(native_sinh, "sinh", f64::sinh);
float_fn!(native_cosh, "cosh", f64::cosh);
float_fn!(native_tanh, "tanh", f64::tanh);
float_fn!(native_asin, "asin", f64::asin);
float_fn!(native_acos, "acos", f64::acos);
float_fn!(native_atan, "atan", f64::atan);
float_fn!(native_deg2rad, "deg2rad", f64::to_radians);
float_fn!(native_rad2deg, "rad2deg", f64::to_degrees);

intize_fn!(native_floor, "floor", f64::floor);
intize_fn!(native_ceil, "ceil", f64::ceil);
// f64::round rounds half away from zero
intize_fn!(native_round, "round", f64::round);

fn native_abs(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("abs", args, 1)?;
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(RuntimeError::new(format!(
            "abs: argument 1 must be a number, got {}",
            other.type_name()
        ))),
    }
}

fn native_sgn(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("sgn", args, 1)?;
    let x = arg_num("sgn", args, 0)?;
    let s = if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    };
    Ok(Value::Int(s))
}

fn native_hypot(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("hypot", args, 2)?;
    let x = arg_num("hypot", args, 0)?;
    let y = arg_num("hypot", args, 1)?;
    Ok(Value::Float(x.hypot(y)))
}

fn native_atan2(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("atan2", args, 2)?;
    let y = arg_num("atan2", args, 0)?;
    let x = arg_num("atan2", args, 1)?;
    Ok(Value::Float(y.atan2(x)))
}

/// pow(base, exp): integer base with a non-negative integer exponent
/// stays integral (wrapping); everything else goes through float powf.
fn native_pow(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("pow", args, 2)?;
    match (&args[0], &args[1]) {
        (Value::Int(b), Value::Int(e)) if *e >= 0 => {
            let mut result = 1i64;
            let mut base = *b;
            let mut exp = *e as u64;
            while exp > 0 {
                if exp & 1 == 1 {
                    result = result.wrapping_mul(base);
                }
                base = base.wrapping_mul(base);
                exp >>= 1;
            }
            Ok(Value::Int(result))
        }
        _ => {
            let b = arg_num("pow", args, 0)?;
            let e = arg_num("pow", args, 1)?;
            Ok(Value::Float(b.powf(e)))
        }
    }
}

fn fold_extreme(fname: &str, args: &[Value], want_greater: bool) -> Result<Value, RuntimeError> {
    check_argc_min(fname, args, 1)?;
    let mut best = args[0].clone();
    for arg in &args[1..] {
        let ord = try_compare(arg, &best)?;
        if (want_greater && ord.is_gt()) || (!want_greater && ord.is_lt()) {
            best = arg.clone();
        }
    }
    Ok(best)
}

fn native_min(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    fold_extreme("min", args, false)
}

fn native_max(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    fold_extreme("max", args, true)
}

/// range(n) -> [0, n); range(a, b) -> [a, b); range(a, b, step) -> the
/// float sequence a, a+step, ... up to and including the last term <= b.
fn native_range(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc_range("range", args, 1, 3)?;

    let out = SparkArray::new();
    match args.len() {
        1 => {
            let n = arg_int("range", args, 0)?;
            for i in 0..n {
                out.push(Value::Int(i));
            }
        }
        2 => {
            let begin = arg_int("range", args, 0)?;
            let end = arg_int("range", args, 1)?;
            for i in begin..end {
                out.push(Value::Int(i));
            }
        }
        _ => {
            let begin = arg_num("range", args, 0)?;
            let end = arg_num("range", args, 1)?;
            let step = arg_num("range", args, 2)?;
            if step <= 0.0 {
                return Err(RuntimeError::new("range: step must be positive"));
            }
            let mut i = 0i64;
            let mut x = begin;
            while x <= end {
                out.push(Value::Float(x));
                i += 1;
                x = begin + step * i as f64;
            }
        }
    }
    Ok(Value::array(out))
}

fn native_random(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("random", args, 0)?;
    Ok(Value::Float(vm.random_float()))
}

fn native_seed(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("seed", args, 1)?;
    let s = arg_int("seed", args, 0)?;
    vm.seed_rng(s as u64);
    Ok(Value::Nil)
}

fn float_class(
    fname: &'static str,
    args: &[Value],
    f: fn(f64) -> bool,
) -> Result<Value, RuntimeError> {
    check_argc(fname, args, 1)?;
    let x = arg_num(fname, args, 0)?;
    Ok(Value::Bool(f(x)))
}

fn native_isfin(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    float_class("isfin", args, f64::is_finite)
}

fn native_isinf(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    float_class("isinf", args, f64::is_infinite)
}

fn native_isnan(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    float_class("isnan", args, f64::is_nan)
}

fn native_isfloat(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("isfloat", args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Float(_))))
}

fn native_isint(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("isint", args, 1)?;
    Ok(Value::Bool(matches!(args[0], Value::Int(_))))
}

fn native_fact(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("fact", args, 1)?;
    let n = arg_int("fact", args, 0)?;
    if n < 0 {
        return Err(RuntimeError::new("fact: argument must not be negative"));
    }
    let mut result = 1i64;
    for i in 2..=n {
        result = result.wrapping_mul(i);
    }
    Ok(Value::Int(result))
}

fn native_binom(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("binom", args, 2)?;
    let n = arg_int("binom", args, 0)?;
    let k = arg_int("binom", args, 1)?;
    if n < 0 || k < 0 || k > n {
        return Err(RuntimeError::new("binom: expected 0 <= k <= n"));
    }

    // Multiplicative formula; each intermediate division is exact
    let k = k.min(n - k);
    let mut result: i128 = 1;
    for i in 0..k {
        result = result * (n - i) as i128 / (i + 1) as i128;
    }
    Ok(Value::Int(result as i64))
}

/// Read a complex number out of its hashmap convention.
fn cplx_get(map: &SparkHashMap, polar: bool) -> Result<(f64, f64), RuntimeError> {
    let (first, second) = if polar { ("r", "theta") } else { ("re", "im") };
    match (
        map.get_strkey(first).as_float_lossy(),
        map.get_strkey(second).as_float_lossy(),
    ) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(RuntimeError::new(
            "keys 're' and 'im' or 'r' and 'theta' should correspond to numbers",
        )),
    }
}

fn cplx_make(a: f64, b: f64, polar: bool) -> Value {
    let (first, second) = if polar { ("r", "theta") } else { ("re", "im") };
    let map = SparkHashMap::new();
    map.set_strkey(first, Value::Float(a));
    map.set_strkey(second, Value::Float(b));
    Value::hashmap(map)
}

fn cplx_args(fname: &str, args: &[Value]) -> Result<(f64, f64, f64, f64), RuntimeError> {
    check_argc(fname, args, 2)?;
    let lhs = arg_hashmap(fname, args, 0)?;
    let rhs = arg_hashmap(fname, args, 1)?;
    let (re1, im1) = cplx_get(&lhs, false)?;
    let (re2, im2) = cplx_get(&rhs, false)?;
    Ok((re1, im1, re2, im2))
}

fn native_cplx_add(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let (re1, im1, re2, im2) = cplx_args("cplx_add", args)?;
    Ok(cplx_make(re1 + re2, im1 + im2, false))
}

fn native_cplx_sub(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let (re1, im1, re2, im2) = cplx_args("cplx_sub", args)?;
    Ok(cplx_make(re1 - re2, im1 - im2, false))
}

fn native_cplx_mul(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let (re1, im1, re2, im2) = cplx_args("cplx_mul", args)?;
    Ok(cplx_make(
        re1 * re2 - im1 * im2,
        re1 * im2 + re2 * im1,
        false,
    ))
}

fn native_cplx_div(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let (re1, im1, re2, im2) = cplx_args("cplx_div", args)?;
    let norm = re2 * re2 + im2 * im2;
    Ok(cplx_make(
        (re1 * re2 + im1 * im2) / norm,
        (re2 * im1 - re1 * im2) / norm,
        false,
    ))
}

fn cplx_unary(
    fname: &str,
    args: &[Value],
    f: fn(f64, f64) -> (f64, f64),
) -> Result<Value, RuntimeError> {
    check_argc(fname, args, 1)?;
    let map = arg_hashmap(fname, args, 0)?;
    let (re, im) = cplx_get(&map, false)?;
    let (re_out, im_out) = f(re, im);
    Ok(cplx_make(re_out, im_out, false))
}

fn native_cplx_sin(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    cplx_unary("cplx_sin", args, |re, im| {
        (re.sin() * im.cosh(), re.cos() * im.sinh())
    })
}

fn native_cplx_cos(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    cplx_unary("cplx_cos", args, |re, im| {
        (re.cos() * im.cosh(), -(re.sin() * im.sinh()))
    })
}

fn native_cplx_tan(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    cplx_unary("cplx_tan", args, |re, im| {
        // tan z = sin z / cos z, expanded over the canonical parts
        let (sr, si) = (re.sin() * im.cosh(), re.cos() * im.sinh());
        let (cr, ci) = (re.cos() * im.cosh(), -(re.sin() * im.sinh()));
        let norm = cr * cr + ci * ci;
        ((sr * cr + si * ci) / norm, (cr * si - sr * ci) / norm)
    })
}

fn native_cplx_conj(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    cplx_unary("cplx_conj", args, |re, im| (re, -im))
}

fn native_cplx_abs(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("cplx_abs", args, 1)?;
    let map = arg_hashmap("cplx_abs", args, 0)?;
    let (re, im) = cplx_get(&map, false)?;
    Ok(Value::Float(re.hypot(im)))
}

fn native_can2pol(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("can2pol", args, 1)?;
    let map = arg_hashmap("can2pol", args, 0)?;
    let (re, im) = cplx_get(&map, false)?;
    Ok(cplx_make(re.hypot(im), im.atan2(re), true))
}

fn native_pol2can(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    check_argc("pol2can", args, 1)?;
    let map = arg_hashmap("pol2can", args, 0)?;
    let (r, theta) = cplx_get(&map, true)?;
    Ok(cplx_make(r * theta.cos(), r * theta.sin(), false))
}

const FUNCS: &[(&str, NativeFn)] = &[
    ("abs", native_abs),
    ("min", native_min),
    ("max", native_max),
    ("range", native_range),
    ("floor", native_floor),
    ("ceil", native_ceil),
    ("round", native_round),
    ("sgn", native_sgn),
    ("hypot", native_hypot),
    ("sqrt", native_sqrt),
    ("cbrt", native_cbrt),
    ("pow", native_pow),
    ("exp", native_exp),
    ("exp2", native_exp2),
    ("exp10", native_exp10),
    ("log", native_log),
    ("log2", native_log2),
    ("log10", native_log10),
    ("sin", native_sin),
    ("cos", native_cos),
    ("tan", native_tan),
    ("sinh", native_sinh),
    ("cosh", native_cosh),
    ("tanh", native_tanh),
    ("asin", native_asin),
    ("acos", native_acos),
    ("atan", native_atan),
    ("atan2", native_atan2),
    ("deg2rad", native_deg2rad),
    ("rad2deg", native_rad2deg),
    ("random", native_random),
    ("seed", native_seed),
    ("isfin", native_isfin),
    ("isinf", native_isinf),
    ("isnan", native_isnan),
    ("isfloat", native_isfloat),
    ("isint", native_isint),
    ("fact", native_fact),
    ("binom", native_binom),
    ("cplx_add", native_cplx_add),
    ("cplx_sub", native_cplx_sub),
    ("cplx_mul", native_cplx_mul),
    ("cplx_div", native_cplx_div),
    ("cplx_sin", native_cplx_sin),
    ("cplx_cos", native_cplx_cos),
    ("cplx_tan", native_cplx_tan),
    ("cplx_conj", native_cplx_conj),
    ("cplx_abs", native_cplx_abs),
    ("can2pol", native_can2pol),
    ("pol2can", native_pol2can),
];

pub fn load(vm: &mut Vm) {
    vm.add_lib_funcs("", FUNCS);
    vm.add_lib_values(
        "",
        &[
            ("M_E", Value::Float(std::f64::consts::E)),
            ("M_PI", Value::Float(std::f64::consts::PI)),
            ("M_SQRT2", Value::Float(std::f64::consts::SQRT_2)),
            ("M_PHI", Value::Float((1.0 + 5f64.sqrt()) / 2.0)),
            ("M_INF", Value::Float(f64::INFINITY)),
            ("M_NAN", Value::Float(f64::NAN)),
        ],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm() -> Vm {
        let mut vm = Vm::new();
        load(&mut vm);
        vm
    }

    fn call(vm: &mut Vm, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let f = vm.globals().get_strkey(name);
        vm.call_value(&f, args)
    }

    fn as_floats(v: &Value) -> Vec<f64> {
        v.as_array()
            .unwrap()
            .to_vec()
            .iter()
            .map(|x| x.as_float_lossy().unwrap())
            .collect()
    }

    #[test]
    fn test_range_single_bound() {
        let mut vm = vm();
        let r = call(&mut vm, "range", &[Value::Int(4)]).unwrap();
        let items = r.as_array().unwrap().to_vec();
        assert_eq!(items, vec![Value::Int(0), Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_range_two_bounds() {
        let mut vm = vm();
        let r = call(&mut vm, "range", &[Value::Int(2), Value::Int(5)]).unwrap();
        let items = r.as_array().unwrap().to_vec();
        assert_eq!(items, vec![Value::Int(2), Value::Int(3), Value::Int(4)]);
    }

    #[test]
    fn test_range_stepped_includes_last_term() {
        let mut vm = vm();
        let r = call(
            &mut vm,
            "range",
            &[Value::Int(0), Value::Int(1), Value::Float(0.5)],
        )
        .unwrap();
        assert_eq!(as_floats(&r), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_min_max_fold() {
        let mut vm = vm();
        assert_eq!(
            call(&mut vm, "min", &[Value::Int(3), Value::Float(1.5), Value::Int(2)]).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            call(&mut vm, "max", &[Value::Int(3), Value::Float(1.5)]).unwrap(),
            Value::Int(3)
        );
        let err = call(&mut vm, "min", &[Value::Int(1), Value::Bool(true)]).unwrap_err();
        assert!(err.message.contains("cannot compare"));
    }

    #[test]
    fn test_intize_family() {
        let mut vm = vm();
        assert_eq!(call(&mut vm, "floor", &[Value::Float(1.7)]).unwrap(), Value::Int(1));
        assert_eq!(call(&mut vm, "ceil", &[Value::Float(1.2)]).unwrap(), Value::Int(2));
        assert_eq!(call(&mut vm, "round", &[Value::Float(2.5)]).unwrap(), Value::Int(3));
        assert_eq!(call(&mut vm, "round", &[Value::Float(-2.5)]).unwrap(), Value::Int(-3));
        assert_eq!(call(&mut vm, "floor", &[Value::Int(9)]).unwrap(), Value::Int(9));
    }

    #[test]
    fn test_pow_integer_and_float() {
        let mut vm = vm();
        assert_eq!(
            call(&mut vm, "pow", &[Value::Int(2), Value::Int(10)]).unwrap(),
            Value::Int(1024)
        );
        assert_eq!(
            call(&mut vm, "pow", &[Value::Int(2), Value::Int(-1)]).unwrap(),
            Value::Float(0.5)
        );
    }

    #[test]
    fn test_fact_and_binom() {
        let mut vm = vm();
        assert_eq!(call(&mut vm, "fact", &[Value::Int(5)]).unwrap(), Value::Int(120));
        assert_eq!(call(&mut vm, "fact", &[Value::Int(0)]).unwrap(), Value::Int(1));
        assert!(call(&mut vm, "fact", &[Value::Int(-1)]).is_err());

        assert_eq!(
            call(&mut vm, "binom", &[Value::Int(5), Value::Int(2)]).unwrap(),
            Value::Int(10)
        );
        assert!(call(&mut vm, "binom", &[Value::Int(2), Value::Int(5)]).is_err());
    }

    #[test]
    fn test_float_classification() {
        let mut vm = vm();
        assert_eq!(call(&mut vm, "isnan", &[Value::Float(f64::NAN)]).unwrap(), Value::Bool(true));
        assert_eq!(call(&mut vm, "isinf", &[Value::Float(f64::INFINITY)]).unwrap(), Value::Bool(true));
        assert_eq!(call(&mut vm, "isfin", &[Value::Int(1)]).unwrap(), Value::Bool(true));
        assert_eq!(call(&mut vm, "isfloat", &[Value::Int(1)]).unwrap(), Value::Bool(false));
        assert_eq!(call(&mut vm, "isint", &[Value::Int(1)]).unwrap(), Value::Bool(true));
    }

    fn cplx(re: f64, im: f64) -> Value {
        cplx_make(re, im, false)
    }

    fn parts(v: &Value) -> (f64, f64) {
        let m = v.as_hashmap().unwrap();
        (
            m.get_strkey("re").as_float_lossy().unwrap(),
            m.get_strkey("im").as_float_lossy().unwrap(),
        )
    }

    #[test]
    fn test_cplx_mul() {
        let mut vm = vm();
        let r = call(&mut vm, "cplx_mul", &[cplx(1.0, 2.0), cplx(3.0, 4.0)]).unwrap();
        assert_eq!(parts(&r), (-5.0, 10.0));
    }

    #[test]
    fn test_cplx_div_undoes_mul() {
        let mut vm = vm();
        let product = call(&mut vm, "cplx_mul", &[cplx(1.0, 2.0), cplx(3.0, 4.0)]).unwrap();
        let back = call(&mut vm, "cplx_div", &[product, cplx(3.0, 4.0)]).unwrap();
        let (re, im) = parts(&back);
        assert!((re - 1.0).abs() < 1e-9);
        assert!((im - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_can2pol_pol2can_round_trip() {
        let mut vm = vm();
        let polar = call(&mut vm, "can2pol", &[cplx(3.0, 4.0)]).unwrap();
        let r = polar.as_hashmap().unwrap().get_strkey("r").as_float_lossy().unwrap();
        assert!((r - 5.0).abs() < 1e-9);

        let back = call(&mut vm, "pol2can", &[polar]).unwrap();
        let (re, im) = parts(&back);
        assert!((re - 3.0).abs() < 1e-9);
        assert!((im - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_cplx_shape_validation() {
        let mut vm = vm();
        let bad = SparkHashMap::new();
        bad.set_strkey("re", Value::string("one"));
        bad.set_strkey("im", Value::Int(2));
        let err = call(&mut vm, "cplx_abs", &[Value::hashmap(bad)]).unwrap_err();
        assert!(err.message.contains("'re' and 'im'"));
    }

    #[test]
    fn test_integer_int_arguments_accepted_by_cplx() {
        let mut vm = vm();
        let m = SparkHashMap::new();
        m.set_strkey("re", Value::Int(3));
        m.set_strkey("im", Value::Int(4));
        let r = call(&mut vm, "cplx_abs", &[Value::hashmap(m)]).unwrap();
        assert_eq!(r, Value::Float(5.0));
    }

    #[test]
    fn test_constants() {
        let vm = vm();
        assert_eq!(
            vm.globals().get_strkey("M_PI"),
            Value::Float(std::f64::consts::PI)
        );
        let phi = vm.globals().get_strkey("M_PHI").as_float_lossy().unwrap();
        assert!((phi - 1.618_033_988_749_895).abs() < 1e-12);
    }

    #[test]
    fn test_abs_and_sgn() {
        let mut vm = vm();
        assert_eq!(call(&mut vm, "abs", &[Value::Int(-3)]).unwrap(), Value::Int(3));
        assert_eq!(call(&mut vm, "abs", &[Value::Float(-2.5)]).unwrap(), Value::Float(2.5));
        assert_eq!(call(&mut vm, "sgn", &[Value::Float(-0.5)]).unwrap(), Value::Int(-1));
        assert_eq!(call(&mut vm, "sgn", &[Value::Int(0)]).unwrap(), Value::Int(0));
    }
}
