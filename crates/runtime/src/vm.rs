//! The register-based virtual machine.
//!
//! One `Vm` owns the globals, the class table (type tag to method
//! dictionary), the latest runtime error message, and the frame-name stack
//! that backs `stack_trace`. Execution is reentrant: a native callable may
//! call back into `call_value`, which pushes a new frame on the host call
//! stack. The VM is single-threaded by construction (`Value` is `!Send`).
//!
//! Malformed bytecode (bad opcodes, out-of-range registers or jump
//! targets, truncated words) is reported as a runtime error; it never
//! corrupts memory.

use crate::array::SparkArray;
use crate::bytecode::{self, Opcode, Program};
use crate::error::{RuntimeError, SparkError};
use crate::format;
use crate::hashmap::SparkHashMap;
use crate::string::SparkString;
use crate::value::{FuncKind, Function, NativeFn, ScriptFunc, TypeTag, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Compilation services the context installs on the VM so that natives
/// like `compile` and `require` can reach the parser and compiler without
/// the runtime crate depending on them.
pub trait Loader {
    /// Parse + compile a source string; returns the top-level function.
    fn load_string(&mut self, src: &str) -> Result<Value, SparkError>;
    /// Compile a single expression into a function with an implicit return.
    fn compile_expr(&mut self, src: &str) -> Result<Value, SparkError>;
    /// Read a source file and compile it.
    fn load_source_file(&mut self, path: &str) -> Result<Value, SparkError>;
}

const DEFAULT_MAX_CALL_DEPTH: usize = 256;

pub struct Vm {
    globals: Rc<SparkHashMap>,
    classes: FxHashMap<TypeTag, Rc<SparkHashMap>>,
    error_msg: Option<String>,
    /// Names of the active call frames, outermost first
    frames: Vec<String>,
    loader: Option<Rc<RefCell<dyn Loader>>>,
    context_data: Option<Rc<dyn Any>>,
    max_call_depth: usize,
    rng: StdRng,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Vm {
        Self::with_call_depth(DEFAULT_MAX_CALL_DEPTH)
    }

    pub fn with_call_depth(max_call_depth: usize) -> Vm {
        let mut classes = FxHashMap::default();
        // Only object-like types carry a class; numbers and nil do not
        for tag in [TypeTag::String, TypeTag::Array, TypeTag::HashMap, TypeTag::Func] {
            classes.insert(tag, Rc::new(SparkHashMap::new()));
        }

        Vm {
            globals: Rc::new(SparkHashMap::new()),
            classes,
            error_msg: None,
            frames: Vec::new(),
            loader: None,
            context_data: None,
            max_call_depth,
            rng: StdRng::from_entropy(),
        }
    }

    /// Borrow the globals hashmap (name -> value).
    pub fn globals(&self) -> &Rc<SparkHashMap> {
        &self.globals
    }

    /// The whole class table (type tag -> method dictionary).
    pub fn classes(&self) -> &FxHashMap<TypeTag, Rc<SparkHashMap>> {
        &self.classes
    }

    /// The method dictionary for a type tag, if that type has a class.
    pub fn class_of(&self, tag: TypeTag) -> Option<&Rc<SparkHashMap>> {
        self.classes.get(&tag)
    }

    pub fn set_loader(&mut self, loader: Rc<RefCell<dyn Loader>>) {
        self.loader = Some(loader);
    }

    pub fn loader(&self) -> Option<Rc<RefCell<dyn Loader>>> {
        self.loader.clone()
    }

    /// Stash an opaque host pointer threaded to native callables.
    pub fn set_context_data(&mut self, data: Option<Rc<dyn Any>>) {
        self.context_data = data;
    }

    pub fn context_data(&self) -> Option<Rc<dyn Any>> {
        self.context_data.clone()
    }

    /// Latest runtime error message, if any.
    pub fn last_error_msg(&self) -> Option<&str> {
        self.error_msg.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error_msg = None;
    }

    /// Set the runtime error message through the format engine.
    pub fn set_error_msg(&mut self, fmt: &str, args: &[Value]) {
        let msg = match format::render(fmt, args) {
            Ok(m) => m,
            Err(e) => format!("{} (while formatting error message {:?})", e, fmt),
        };
        debug!(message = %msg, "runtime error set");
        self.error_msg = Some(msg);
    }

    /// Active frame names, innermost first.
    pub fn stack_trace(&self) -> Vec<String> {
        self.frames.iter().rev().cloned().collect()
    }

    /// math.random / math.seed state.
    pub fn random_float(&mut self) -> f64 {
        self.rng.gen_range(0.0..1.0)
    }

    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Execute a program's top-level code with no arguments.
    pub fn exec(&mut self, program: &Rc<Program>) -> Result<Value, RuntimeError> {
        let func = top_level_func(program)?;
        self.call_value(&func, &[])
    }

    /// Call a function value with the given arguments.
    ///
    /// Dispatches to a bytecode closure or a native callable; on error the
    /// runtime error message is recorded before propagating.
    pub fn call_value(&mut self, callee: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
        let result = self.dispatch_call(callee, args);
        if let Err(e) = &result {
            // Replace on each new error; re-recording while unwinding is
            // idempotent because the innermost error is stored first
            self.error_msg = Some(e.message.clone());
        }
        result
    }

    fn dispatch_call(&mut self, callee: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
        let func = match callee {
            Value::Func(f) => f.clone(),
            _ => {
                return Err(RuntimeError::new(format!(
                    "attempt to call a {} value",
                    callee.type_name()
                )));
            }
        };

        if self.frames.len() >= self.max_call_depth {
            return Err(RuntimeError::new("call stack depth limit exceeded"));
        }

        self.frames.push(func.name.clone());
        let result = match &func.kind {
            FuncKind::Script(sf) => self.run_frame(sf, args),
            FuncKind::Native(native) => native(self, args),
        };
        self.frames.pop();
        result
    }

    /// Look up a method for a receiver: an own entry when the receiver is
    /// a hashmap, then the class dictionary of its type.
    pub fn lookup_method(&self, recv: &Value, name: &str) -> Result<Value, RuntimeError> {
        if let Value::HashMap(m) = recv {
            let own = m.get_strkey(name);
            if !own.is_nil() {
                return Ok(own);
            }
        }

        if let Some(class) = self.classes.get(&recv.type_tag()) {
            let method = class.get_strkey(name);
            if !method.is_nil() {
                return Ok(method);
            }
        }

        Err(RuntimeError::new(format!(
            "{} values have no method '{}'",
            recv.type_name(),
            name
        )))
    }

    /// Register native functions: under their own names when `libname` is
    /// empty, else inside a namespace hashmap stored under `libname`.
    pub fn add_lib_funcs(&mut self, libname: &str, fns: &[(&str, NativeFn)]) {
        let target = self.lib_target(libname);
        for (name, f) in fns {
            target.set_strkey(name, Value::func(Function::native(*name, *f)));
        }
    }

    /// Register constant values, same routing as `add_lib_funcs`.
    pub fn add_lib_values(&mut self, libname: &str, vals: &[(&str, Value)]) {
        let target = self.lib_target(libname);
        for (name, v) in vals {
            target.set_strkey(name, v.clone());
        }
    }

    fn lib_target(&mut self, libname: &str) -> Rc<SparkHashMap> {
        if libname.is_empty() {
            return self.globals.clone();
        }

        match self.globals.get_strkey(libname) {
            Value::HashMap(ns) => ns,
            _ => {
                let ns = Rc::new(SparkHashMap::new());
                self.globals
                    .set_strkey(libname, Value::HashMap(ns.clone()));
                ns
            }
        }
    }

    /// Insert methods into the class dictionary of a type.
    pub fn load_methods(&mut self, tag: TypeTag, fns: &[(&str, NativeFn)]) {
        let class = self
            .classes
            .entry(tag)
            .or_insert_with(|| Rc::new(SparkHashMap::new()))
            .clone();
        for (name, f) in fns {
            class.set_strkey(name, Value::func(Function::native(*name, *f)));
        }
    }

    /// The bytecode dispatch loop for one frame.
    fn run_frame(&mut self, sf: &ScriptFunc, args: &[Value]) -> Result<Value, RuntimeError> {
        let program = sf.program.clone();
        let mut regs = vec![Value::Nil; sf.nregs as usize];

        // Missing arguments read as nil; extra arguments are dropped
        let ncopy = (sf.arity as usize).min(args.len()).min(regs.len());
        regs[..ncopy].clone_from_slice(&args[..ncopy]);

        let mut pc = sf.entry;

        loop {
            let word = program.word(pc)?;
            let (opbyte, a, b, c) = bytecode::unpack(word);
            let op = Opcode::from_u8(opbyte).ok_or_else(|| {
                RuntimeError::new(format!("illegal opcode {:#04x} at word {}", opbyte, pc))
            })?;
            pc += 1;

            match op {
                Opcode::LdNil => set_reg(&mut regs, a, Value::Nil)?,
                Opcode::LdBool => set_reg(&mut regs, a, Value::Bool(b != 0))?,
                Opcode::LdInt => {
                    let v = program.read_i64(pc)?;
                    pc += 2;
                    set_reg(&mut regs, a, Value::Int(v))?;
                }
                Opcode::LdFloat => {
                    let v = program.read_f64(pc)?;
                    pc += 2;
                    set_reg(&mut regs, a, Value::Float(v))?;
                }
                Opcode::LdStr => {
                    let (bytes, next) = program.read_str(pc)?;
                    pc = next;
                    set_reg(
                        &mut regs,
                        a,
                        Value::String(Rc::new(SparkString::from_owned(bytes))),
                    )?;
                }
                Opcode::Move => {
                    let v = reg(&regs, b)?.clone();
                    set_reg(&mut regs, a, v)?;
                }
                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
                    let x = reg(&regs, b)?;
                    let y = reg(&regs, c)?;
                    let v = arith(op, x, y)?;
                    set_reg(&mut regs, a, v)?;
                }
                Opcode::Neg => {
                    let v = match reg(&regs, b)? {
                        Value::Int(i) => Value::Int(i.wrapping_neg()),
                        Value::Float(f) => Value::Float(-f),
                        other => {
                            return Err(RuntimeError::new(format!(
                                "cannot negate a {} value",
                                other.type_name()
                            )));
                        }
                    };
                    set_reg(&mut regs, a, v)?;
                }
                Opcode::Not => {
                    let v = match reg(&regs, b)? {
                        Value::Bool(x) => Value::Bool(!x),
                        other => {
                            return Err(RuntimeError::new(format!(
                                "logical not requires a boolean, got {}",
                                other.type_name()
                            )));
                        }
                    };
                    set_reg(&mut regs, a, v)?;
                }
                Opcode::Concat => {
                    let v = match (reg(&regs, b)?, reg(&regs, c)?) {
                        (Value::String(x), Value::String(y)) => {
                            Value::String(Rc::new(x.concat(y)))
                        }
                        (x, y) => {
                            return Err(RuntimeError::new(format!(
                                "cannot concatenate {} and {} values",
                                x.type_name(),
                                y.type_name()
                            )));
                        }
                    };
                    set_reg(&mut regs, a, v)?;
                }
                Opcode::Eq => {
                    let v = Value::Bool(reg(&regs, b)? == reg(&regs, c)?);
                    set_reg(&mut regs, a, v)?;
                }
                Opcode::Ne => {
                    let v = Value::Bool(reg(&regs, b)? != reg(&regs, c)?);
                    set_reg(&mut regs, a, v)?;
                }
                Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                    let ord = crate::value::try_compare(reg(&regs, b)?, reg(&regs, c)?)?;
                    let truth = match op {
                        Opcode::Lt => ord.is_lt(),
                        Opcode::Le => ord.is_le(),
                        Opcode::Gt => ord.is_gt(),
                        _ => ord.is_ge(),
                    };
                    set_reg(&mut regs, a, Value::Bool(truth))?;
                }
                Opcode::Jmp => {
                    pc = jump_target(&program, pc)?;
                }
                Opcode::Jz | Opcode::Jnz => {
                    let cond = match reg(&regs, a)? {
                        Value::Bool(x) => *x,
                        other => {
                            return Err(RuntimeError::new(format!(
                                "condition must be a boolean, got {}",
                                other.type_name()
                            )));
                        }
                    };
                    let taken = if op == Opcode::Jz { !cond } else { cond };
                    if taken {
                        pc = jump_target(&program, pc)?;
                    } else {
                        pc += 1;
                    }
                }
                Opcode::Call => {
                    let callee = reg(&regs, b)?.clone();
                    let mut call_args = Vec::with_capacity(c as usize);
                    for i in 0..c as u16 {
                        let argreg = wide_reg(b as u16 + 1 + i)?;
                        call_args.push(reg(&regs, argreg)?.clone());
                    }
                    let result = self.call_value(&callee, &call_args)?;
                    set_reg(&mut regs, a, result)?;
                }
                Opcode::Ret => return Ok(reg(&regs, a)?.clone()),
                Opcode::RetNil => return Ok(Value::Nil),
                Opcode::GetGlobal => {
                    let name = string_reg(&regs, b, "global name")?;
                    let v = self.globals.get_strkey(&name);
                    set_reg(&mut regs, a, v)?;
                }
                Opcode::SetGlobal => {
                    let name = string_reg(&regs, a, "global name")?;
                    let v = reg(&regs, b)?.clone();
                    self.globals.set_strkey(&name, v);
                }
                Opcode::GetIndex => {
                    let v = get_index(reg(&regs, b)?, reg(&regs, c)?)?;
                    set_reg(&mut regs, a, v)?;
                }
                Opcode::SetIndex => {
                    set_index(reg(&regs, a)?, reg(&regs, b)?, reg(&regs, c)?)?;
                }
                Opcode::GetMethod => {
                    let name = string_reg(&regs, c, "method name")?;
                    let method = self.lookup_method(reg(&regs, b)?, &name)?;
                    set_reg(&mut regs, a, method)?;
                }
                Opcode::NewArr => {
                    let arr = SparkArray::new();
                    for i in 0..c as u16 {
                        let src = wide_reg(b as u16 + i)?;
                        arr.push(reg(&regs, src)?.clone());
                    }
                    set_reg(&mut regs, a, Value::array(arr))?;
                }
                Opcode::NewMap => {
                    let map = SparkHashMap::new();
                    for i in 0..c as u16 {
                        let kreg = wide_reg(b as u16 + i * 2)?;
                        let vreg = wide_reg(b as u16 + i * 2 + 1)?;
                        map.set(reg(&regs, kreg)?.clone(), reg(&regs, vreg)?.clone())?;
                    }
                    set_reg(&mut regs, a, Value::hashmap(map))?;
                }
                Opcode::FnDef => {
                    let region_len = program.word(pc)? as usize;
                    let meta = program.read_func_meta(pc + 1)?;
                    let func = Function::script(
                        meta.name.clone(),
                        ScriptFunc {
                            program: program.clone(),
                            entry: meta.code_start,
                            arity: meta.arity,
                            nregs: meta.nregs,
                        },
                    );
                    set_reg(&mut regs, a, Value::func(func))?;
                    pc = pc + 1 + region_len;
                }
            }
        }
    }
}

/// Wrap a program's top-level region (at word 0) as a function value.
pub fn top_level_func(program: &Rc<Program>) -> Result<Value, RuntimeError> {
    let meta = program.read_func_meta(0)?;
    Ok(Value::func(Function::script(
        meta.name.clone(),
        ScriptFunc {
            program: program.clone(),
            entry: meta.code_start,
            arity: meta.arity,
            nregs: meta.nregs,
        },
    )))
}

/// Narrow a computed register number back to the u8 operand space.
fn wide_reg(i: u16) -> Result<u8, RuntimeError> {
    u8::try_from(i).map_err(|_| RuntimeError::new(format!("register r{} out of range", i)))
}

fn reg(regs: &[Value], i: u8) -> Result<&Value, RuntimeError> {
    regs.get(i as usize)
        .ok_or_else(|| RuntimeError::new(format!("register r{} out of range", i)))
}

fn set_reg(regs: &mut [Value], i: u8, v: Value) -> Result<(), RuntimeError> {
    match regs.get_mut(i as usize) {
        Some(slot) => {
            *slot = v;
            Ok(())
        }
        None => Err(RuntimeError::new(format!("register r{} out of range", i))),
    }
}

fn string_reg(regs: &[Value], i: u8, what: &str) -> Result<String, RuntimeError> {
    match reg(regs, i)? {
        Value::String(s) => Ok(s.to_str_lossy().into_owned()),
        other => Err(RuntimeError::new(format!(
            "{} must be a string, got {}",
            what,
            other.type_name()
        ))),
    }
}

/// Resolve a relative jump: the extension word at `ext_at` is a signed
/// offset from the instruction after it.
fn jump_target(program: &Program, ext_at: usize) -> Result<usize, RuntimeError> {
    let rel = program.word(ext_at)? as i32;
    let base = ext_at as i64 + 1;
    let target = base + rel as i64;
    if target < 0 || target as usize > program.len() {
        return Err(RuntimeError::new(format!(
            "jump target {} out of range",
            target
        )));
    }
    Ok(target as usize)
}

/// Numeric binary operation; ints wrap, mixed operands promote to float.
fn arith(op: Opcode, x: &Value, y: &Value) -> Result<Value, RuntimeError> {
    match (x, y) {
        (Value::Int(a), Value::Int(b)) => {
            let v = match op {
                Opcode::Add => a.wrapping_add(*b),
                Opcode::Sub => a.wrapping_sub(*b),
                Opcode::Mul => a.wrapping_mul(*b),
                Opcode::Div => {
                    if *b == 0 {
                        return Err(RuntimeError::new("division by zero"));
                    }
                    a.wrapping_div(*b)
                }
                _ => {
                    if *b == 0 {
                        return Err(RuntimeError::new("modulo by zero"));
                    }
                    a.wrapping_rem(*b)
                }
            };
            Ok(Value::Int(v))
        }
        _ if x.is_num() && y.is_num() => {
            // Float division by zero follows IEEE-754 (inf / NaN), no error
            let (a, b) = (
                x.as_float_lossy().unwrap_or_default(),
                y.as_float_lossy().unwrap_or_default(),
            );
            let v = match op {
                Opcode::Add => a + b,
                Opcode::Sub => a - b,
                Opcode::Mul => a * b,
                Opcode::Div => a / b,
                _ => a % b,
            };
            Ok(Value::Float(v))
        }
        _ => Err(RuntimeError::new(format!(
            "arithmetic on {} and {} values",
            x.type_name(),
            y.type_name()
        ))),
    }
}

fn get_index(obj: &Value, key: &Value) -> Result<Value, RuntimeError> {
    match obj {
        Value::Array(arr) => match key {
            Value::Int(i) => arr.get(*i),
            other => Err(RuntimeError::new(format!(
                "array indices must be integers, got {}",
                other.type_name()
            ))),
        },
        Value::HashMap(map) => map.get(key),
        other => Err(RuntimeError::new(format!(
            "cannot index a {} value",
            other.type_name()
        ))),
    }
}

fn set_index(obj: &Value, key: &Value, value: &Value) -> Result<(), RuntimeError> {
    match obj {
        Value::Array(arr) => match key {
            Value::Int(i) => arr.set(*i, value.clone()),
            other => Err(RuntimeError::new(format!(
                "array indices must be integers, got {}",
                other.type_name()
            ))),
        },
        Value::HashMap(map) => map.set(key.clone(), value.clone()),
        other => Err(RuntimeError::new(format!(
            "cannot index a {} value",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{encode_func_meta, encode_i64, pack};

    /// Assemble a one-function program: top-level region with `nregs`
    /// registers and the given code words.
    fn assemble(nregs: u8, code: &[u32]) -> Rc<Program> {
        let mut words = encode_func_meta(0, nregs, "top-level");
        words.extend_from_slice(code);
        Rc::new(Program::new(words))
    }

    fn ld_int(reg: u8, v: i64) -> Vec<u32> {
        let mut w = vec![pack(Opcode::LdInt, reg, 0, 0)];
        w.extend_from_slice(&encode_i64(v));
        w
    }

    #[test]
    fn test_exec_add_returns_sum() {
        let mut code = ld_int(0, 2);
        code.extend(ld_int(1, 3));
        code.push(pack(Opcode::Add, 2, 0, 1));
        code.push(pack(Opcode::Ret, 2, 0, 0));

        let mut vm = Vm::new();
        let result = vm.exec(&assemble(3, &code)).unwrap();
        assert_eq!(result, Value::Int(5));
    }

    #[test]
    fn test_int_division_by_zero_is_runtime_error() {
        let mut code = ld_int(0, 1);
        code.extend(ld_int(1, 0));
        code.push(pack(Opcode::Div, 2, 0, 1));
        code.push(pack(Opcode::Ret, 2, 0, 0));

        let mut vm = Vm::new();
        let err = vm.exec(&assemble(3, &code)).unwrap_err();
        assert!(err.message.contains("division by zero"));
        assert_eq!(vm.last_error_msg(), Some("division by zero"));
    }

    #[test]
    fn test_float_division_by_zero_yields_infinity() {
        let mut code = vec![pack(Opcode::LdFloat, 0, 0, 0)];
        code.extend_from_slice(&bytecode::encode_f64(1.0));
        code.extend(ld_int(1, 0));
        code.push(pack(Opcode::Div, 2, 0, 1));
        code.push(pack(Opcode::Ret, 2, 0, 0));

        let mut vm = Vm::new();
        let result = vm.exec(&assemble(3, &code)).unwrap();
        assert_eq!(result, Value::Float(f64::INFINITY));
    }

    #[test]
    fn test_int_arithmetic_wraps() {
        let mut code = ld_int(0, i64::MAX);
        code.extend(ld_int(1, 1));
        code.push(pack(Opcode::Add, 2, 0, 1));
        code.push(pack(Opcode::Ret, 2, 0, 0));

        let mut vm = Vm::new();
        let result = vm.exec(&assemble(3, &code)).unwrap();
        assert_eq!(result, Value::Int(i64::MIN));
    }

    #[test]
    fn test_illegal_opcode_reported() {
        let mut vm = Vm::new();
        let err = vm.exec(&assemble(1, &[0xffff_ffff])).unwrap_err();
        assert!(err.message.contains("illegal opcode"));
    }

    #[test]
    fn test_register_out_of_range_reported() {
        let mut vm = Vm::new();
        let code = [pack(Opcode::LdNil, 9, 0, 0), pack(Opcode::RetNil, 0, 0, 0)];
        let err = vm.exec(&assemble(1, &code)).unwrap_err();
        assert!(err.message.contains("register"));
    }

    #[test]
    fn test_truncated_program_reported() {
        let mut vm = Vm::new();
        // LdInt claims two extension words but the stream ends
        let err = vm
            .exec(&assemble(1, &[pack(Opcode::LdInt, 0, 0, 0)]))
            .unwrap_err();
        assert_eq!(err.message, "truncated bytecode");
    }

    fn native_add_one(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
        match args.first() {
            Some(Value::Int(i)) => Ok(Value::Int(i + 1)),
            _ => Err(RuntimeError::new("add_one: expected an integer")),
        }
    }

    #[test]
    fn test_native_call_round_trip() {
        let mut vm = Vm::new();
        let f = Value::func(Function::native("add_one", native_add_one));
        assert_eq!(vm.call_value(&f, &[Value::Int(41)]).unwrap(), Value::Int(42));

        let err = vm.call_value(&f, &[Value::Nil]).unwrap_err();
        assert_eq!(err.message, "add_one: expected an integer");
        assert_eq!(vm.last_error_msg(), Some("add_one: expected an integer"));
    }

    #[test]
    fn test_calling_a_non_function_fails() {
        let mut vm = Vm::new();
        let err = vm.call_value(&Value::Int(1), &[]).unwrap_err();
        assert!(err.message.contains("call a int value"));
    }

    #[test]
    fn test_call_depth_limit() {
        // fn f() { return f(); } encoded by hand: look up own global name
        // and call it
        let mut vm = Vm::with_call_depth(16);
        fn recurse(vm: &mut Vm, _args: &[Value]) -> Result<Value, RuntimeError> {
            let me = vm.globals().get_strkey("recurse");
            vm.call_value(&me, &[])
        }
        vm.add_lib_funcs("", &[("recurse", recurse)]);
        let f = vm.globals().get_strkey("recurse");
        let err = vm.call_value(&f, &[]).unwrap_err();
        assert!(err.message.contains("depth limit"));
    }

    #[test]
    fn test_add_lib_funcs_global_and_namespaced() {
        let mut vm = Vm::new();
        vm.add_lib_funcs("", &[("f", native_add_one)]);
        vm.add_lib_funcs("mylib", &[("g", native_add_one)]);

        assert!(matches!(vm.globals().get_strkey("f"), Value::Func(_)));
        let ns = match vm.globals().get_strkey("mylib") {
            Value::HashMap(m) => m,
            other => panic!("expected namespace hashmap, got {:?}", other),
        };
        assert!(matches!(ns.get_strkey("g"), Value::Func(_)));
    }

    #[test]
    fn test_add_lib_values_constants() {
        let mut vm = Vm::new();
        vm.add_lib_values("", &[("ANSWER", Value::Int(42))]);
        assert_eq!(vm.globals().get_strkey("ANSWER"), Value::Int(42));
    }

    #[test]
    fn test_load_methods_and_dispatch() {
        let mut vm = Vm::new();
        vm.load_methods(TypeTag::String, &[("poke", native_add_one)]);

        let m = vm.lookup_method(&Value::string("s"), "poke").unwrap();
        assert!(matches!(m, Value::Func(_)));

        let err = vm.lookup_method(&Value::string("s"), "nope").unwrap_err();
        assert!(err.message.contains("no method 'nope'"));
    }

    #[test]
    fn test_hashmap_own_entry_shadows_class_method() {
        let mut vm = Vm::new();
        vm.load_methods(TypeTag::HashMap, &[("get_it", native_add_one)]);

        let map = SparkHashMap::new();
        map.set_strkey("get_it", Value::Int(7));
        let recv = Value::hashmap(map);

        assert_eq!(vm.lookup_method(&recv, "get_it").unwrap(), Value::Int(7));
    }

    #[test]
    fn test_set_error_msg_uses_format_engine() {
        let mut vm = Vm::new();
        vm.set_error_msg("bad argument %d: expected %s", &[Value::Int(2), Value::string("int")]);
        assert_eq!(
            vm.last_error_msg(),
            Some("bad argument 2: expected int")
        );
        vm.clear_error();
        assert_eq!(vm.last_error_msg(), None);
    }

    #[test]
    fn test_stack_trace_innermost_first() {
        fn outer(vm: &mut Vm, _args: &[Value]) -> Result<Value, RuntimeError> {
            let inner = vm.globals().get_strkey("inner");
            vm.call_value(&inner, &[])
        }
        fn inner(vm: &mut Vm, _args: &[Value]) -> Result<Value, RuntimeError> {
            let trace = vm.stack_trace();
            Ok(Value::array(SparkArray::from_vec(
                trace.into_iter().map(Value::string).collect(),
            )))
        }

        let mut vm = Vm::new();
        vm.add_lib_funcs("", &[("outer", outer), ("inner", inner)]);
        let f = vm.globals().get_strkey("outer");
        let result = vm.call_value(&f, &[]).unwrap();
        let arr = result.as_array().unwrap();
        assert_eq!(arr.get(0).unwrap(), Value::string("inner"));
        assert_eq!(arr.get(1).unwrap(), Value::string("outer"));
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let mut vm = Vm::new();
        vm.seed_rng(7);
        let a = vm.random_float();
        vm.seed_rng(7);
        let b = vm.random_float();
        assert_eq!(a, b);
    }
}
