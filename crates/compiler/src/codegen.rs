//! Bytecode generation.
//!
//! Single-pass AST walk with a per-function register frame. Registers
//! are allocated stack-wise: locals occupy the low registers for their
//! whole scope, expression temporaries come and go above them, and the
//! high-water mark becomes the function's register count. Calls require
//! the callee and its arguments in consecutive registers, so argument
//! expressions are compiled into their slots and moved only when needed.
//!
//! Functions do not capture enclosing locals: a nested function sees its
//! own parameters, its own locals and the globals.

use crate::ast::{BinOp, Expr, Stmt, UnOp};
use sparkling_runtime::bytecode::{self, encode_func_meta, pack, Opcode, Program};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("function '{0}' needs too many registers")]
    TooManyRegisters(String),

    #[error("function '{0}' has too many parameters")]
    TooManyParameters(String),

    #[error("call has too many arguments")]
    TooManyArguments,

    #[error("container literal has too many elements")]
    LiteralTooLong,

    #[error("'break' outside of a loop")]
    BreakOutsideLoop,

    #[error("'continue' outside of a loop")]
    ContinueOutsideLoop,
}

struct LoopFrame {
    /// Extension-word indices of pending break jumps
    break_jumps: Vec<usize>,
    /// Extension-word indices of pending continue jumps
    continue_jumps: Vec<usize>,
}

struct FuncGen {
    name: String,
    code: Vec<u32>,
    next_reg: u16,
    max_reg: u16,
    scopes: Vec<Vec<(String, u8)>>,
    loops: Vec<LoopFrame>,
}

impl FuncGen {
    fn new(name: &str) -> FuncGen {
        FuncGen {
            name: name.to_string(),
            code: Vec::new(),
            next_reg: 0,
            max_reg: 0,
            scopes: vec![Vec::new()],
            loops: Vec::new(),
        }
    }

    fn alloc(&mut self) -> Result<u8, CompileError> {
        // The register count itself must fit the meta word's u8 field
        if self.next_reg >= u8::MAX as u16 {
            return Err(CompileError::TooManyRegisters(self.name.clone()));
        }
        let reg = self.next_reg as u8;
        self.next_reg += 1;
        self.max_reg = self.max_reg.max(self.next_reg);
        Ok(reg)
    }

    fn mark(&self) -> u16 {
        self.next_reg
    }

    fn reset(&mut self, mark: u16) {
        self.next_reg = mark;
    }

    fn declare_local(&mut self, name: &str, reg: u8) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .push((name.to_string(), reg));
    }

    fn lookup_local(&self, name: &str) -> Option<u8> {
        for scope in self.scopes.iter().rev() {
            for (local, reg) in scope.iter().rev() {
                if local == name {
                    return Some(*reg);
                }
            }
        }
        None
    }

    fn emit(&mut self, op: Opcode, a: u8, b: u8, c: u8) {
        self.code.push(pack(op, a, b, c));
    }

    fn emit_ldint(&mut self, dst: u8, value: i64) {
        self.emit(Opcode::LdInt, dst, 0, 0);
        self.code.extend_from_slice(&bytecode::encode_i64(value));
    }

    fn emit_ldfloat(&mut self, dst: u8, value: f64) {
        self.emit(Opcode::LdFloat, dst, 0, 0);
        self.code.extend_from_slice(&bytecode::encode_f64(value));
    }

    fn emit_ldstr(&mut self, dst: u8, text: &str) {
        self.emit(Opcode::LdStr, dst, 0, 0);
        bytecode::encode_str(text.as_bytes(), &mut self.code);
    }

    /// Emit a forward jump; returns the extension-word index to patch.
    fn emit_jump(&mut self, op: Opcode, cond: u8) -> usize {
        self.emit(op, cond, 0, 0);
        self.code.push(0);
        self.code.len() - 1
    }

    /// Point a pending forward jump at the current position.
    fn patch_jump(&mut self, ext_idx: usize) {
        let rel = self.code.len() as i64 - (ext_idx as i64 + 1);
        self.code[ext_idx] = rel as i32 as u32;
    }

    /// Emit a jump whose target is already known (a backward edge).
    fn emit_jump_to(&mut self, op: Opcode, cond: u8, target: usize) {
        self.emit(op, cond, 0, 0);
        let rel = target as i64 - (self.code.len() as i64 + 1);
        self.code.push(rel as i32 as u32);
    }

    /// Compile an expression; the result lives in the returned register
    /// until the caller resets past its mark. A bare local variable
    /// compiles to its own register with no copy.
    fn expr(&mut self, e: &Expr) -> Result<u8, CompileError> {
        match e {
            Expr::Nil => {
                let dst = self.alloc()?;
                self.emit(Opcode::LdNil, dst, 0, 0);
                Ok(dst)
            }
            Expr::Bool(b) => {
                let dst = self.alloc()?;
                self.emit(Opcode::LdBool, dst, *b as u8, 0);
                Ok(dst)
            }
            Expr::Int(i) => {
                let dst = self.alloc()?;
                self.emit_ldint(dst, *i);
                Ok(dst)
            }
            Expr::Float(f) => {
                let dst = self.alloc()?;
                self.emit_ldfloat(dst, *f);
                Ok(dst)
            }
            Expr::Str(s) => {
                let dst = self.alloc()?;
                self.emit_ldstr(dst, s);
                Ok(dst)
            }
            Expr::Ident(name) => {
                if let Some(reg) = self.lookup_local(name) {
                    return Ok(reg);
                }
                let mark = self.mark();
                let name_reg = self.alloc()?;
                self.emit_ldstr(name_reg, name);
                self.reset(mark);
                let dst = self.alloc()?;
                self.emit(Opcode::GetGlobal, dst, name_reg, 0);
                Ok(dst)
            }
            Expr::Array(items) => {
                if items.len() > u8::MAX as usize {
                    return Err(CompileError::LiteralTooLong);
                }
                let mark = self.mark();
                let base = self.next_reg as u8;
                for item in items {
                    let slot = self.alloc()?;
                    self.expr_into(slot, item)?;
                }
                self.reset(mark);
                let dst = self.alloc()?;
                self.emit(Opcode::NewArr, dst, base, items.len() as u8);
                Ok(dst)
            }
            Expr::Map(entries) => {
                if entries.len() > u8::MAX as usize {
                    return Err(CompileError::LiteralTooLong);
                }
                let mark = self.mark();
                let base = self.next_reg as u8;
                for (key, value) in entries {
                    let kslot = self.alloc()?;
                    self.expr_into(kslot, key)?;
                    let vslot = self.alloc()?;
                    self.expr_into(vslot, value)?;
                }
                self.reset(mark);
                let dst = self.alloc()?;
                self.emit(Opcode::NewMap, dst, base, entries.len() as u8);
                Ok(dst)
            }
            Expr::FnLit { name, params, body } => {
                let fn_name = name.clone().unwrap_or_else(|| "anonymous".to_string());
                let region = compile_function(&fn_name, params, body)?;
                let dst = self.alloc()?;
                self.emit(Opcode::FnDef, dst, 0, 0);
                self.code.push(region.len() as u32);
                self.code.extend_from_slice(&region);
                Ok(dst)
            }
            Expr::Unary { op, operand } => {
                let mark = self.mark();
                let src = self.expr(operand)?;
                self.reset(mark);
                let dst = self.alloc()?;
                let opcode = match op {
                    UnOp::Neg => Opcode::Neg,
                    UnOp::Not => Opcode::Not,
                };
                self.emit(opcode, dst, src, 0);
                Ok(dst)
            }
            Expr::Binary { op, lhs, rhs } => {
                let mark = self.mark();
                let l = self.expr(lhs)?;
                let r = self.expr(rhs)?;
                self.reset(mark);
                let dst = self.alloc()?;
                let opcode = match op {
                    BinOp::Add => Opcode::Add,
                    BinOp::Sub => Opcode::Sub,
                    BinOp::Mul => Opcode::Mul,
                    BinOp::Div => Opcode::Div,
                    BinOp::Mod => Opcode::Mod,
                    BinOp::Concat => Opcode::Concat,
                    BinOp::Eq => Opcode::Eq,
                    BinOp::Ne => Opcode::Ne,
                    BinOp::Lt => Opcode::Lt,
                    BinOp::Le => Opcode::Le,
                    BinOp::Gt => Opcode::Gt,
                    BinOp::Ge => Opcode::Ge,
                };
                self.emit(opcode, dst, l, r);
                Ok(dst)
            }
            Expr::And(lhs, rhs) => {
                let dst = self.alloc()?;
                self.expr_into(dst, lhs)?;
                let skip = self.emit_jump(Opcode::Jz, dst);
                self.expr_into(dst, rhs)?;
                self.patch_jump(skip);
                Ok(dst)
            }
            Expr::Or(lhs, rhs) => {
                let dst = self.alloc()?;
                self.expr_into(dst, lhs)?;
                let skip = self.emit_jump(Opcode::Jnz, dst);
                self.expr_into(dst, rhs)?;
                self.patch_jump(skip);
                Ok(dst)
            }
            Expr::Call { callee, args } => {
                if args.len() > u8::MAX as usize {
                    return Err(CompileError::TooManyArguments);
                }
                let mark = self.mark();
                let base = self.alloc()?;
                let mut slots = Vec::with_capacity(args.len());
                for _ in args {
                    slots.push(self.alloc()?);
                }
                self.expr_into(base, callee)?;
                for (slot, arg) in slots.iter().zip(args) {
                    self.expr_into(*slot, arg)?;
                }
                self.reset(mark);
                let dst = self.alloc()?;
                self.emit(Opcode::Call, dst, base, args.len() as u8);
                Ok(dst)
            }
            Expr::MethodCall { recv, name, args } => {
                if args.len() + 1 > u8::MAX as usize {
                    return Err(CompileError::TooManyArguments);
                }
                let mark = self.mark();
                let base = self.alloc()?;
                let recv_slot = self.alloc()?;
                let mut slots = Vec::with_capacity(args.len());
                for _ in args {
                    slots.push(self.alloc()?);
                }

                self.expr_into(recv_slot, recv)?;
                let name_reg = self.alloc()?;
                self.emit_ldstr(name_reg, name);
                self.emit(Opcode::GetMethod, base, recv_slot, name_reg);
                // The receiver doubles as the first call argument
                for (slot, arg) in slots.iter().zip(args) {
                    self.expr_into(*slot, arg)?;
                }
                self.reset(mark);
                let dst = self.alloc()?;
                self.emit(Opcode::Call, dst, base, args.len() as u8 + 1);
                Ok(dst)
            }
            Expr::Index { obj, key } => {
                let mark = self.mark();
                let o = self.expr(obj)?;
                let k = self.expr(key)?;
                self.reset(mark);
                let dst = self.alloc()?;
                self.emit(Opcode::GetIndex, dst, o, k);
                Ok(dst)
            }
            Expr::Member { obj, name } => {
                let mark = self.mark();
                let o = self.expr(obj)?;
                let k = self.alloc()?;
                self.emit_ldstr(k, name);
                self.reset(mark);
                let dst = self.alloc()?;
                self.emit(Opcode::GetIndex, dst, o, k);
                Ok(dst)
            }
            Expr::Assign { target, value } => {
                let dst = self.alloc()?;
                self.expr_into(dst, value)?;
                self.store(target, dst)?;
                Ok(dst)
            }
        }
    }

    /// Compile an expression and leave the result in a specific register.
    fn expr_into(&mut self, dst: u8, e: &Expr) -> Result<(), CompileError> {
        let mark = self.mark();
        let src = self.expr(e)?;
        if src != dst {
            self.emit(Opcode::Move, dst, src, 0);
        }
        self.reset(mark);
        Ok(())
    }

    /// Store a value register into an assignment target.
    fn store(&mut self, target: &Expr, value: u8) -> Result<(), CompileError> {
        match target {
            Expr::Ident(name) => {
                if let Some(local) = self.lookup_local(name) {
                    self.emit(Opcode::Move, local, value, 0);
                } else {
                    let mark = self.mark();
                    let name_reg = self.alloc()?;
                    self.emit_ldstr(name_reg, name);
                    self.emit(Opcode::SetGlobal, name_reg, value, 0);
                    self.reset(mark);
                }
            }
            Expr::Index { obj, key } => {
                let mark = self.mark();
                let o = self.expr(obj)?;
                let k = self.expr(key)?;
                self.emit(Opcode::SetIndex, o, k, value);
                self.reset(mark);
            }
            Expr::Member { obj, name } => {
                let mark = self.mark();
                let o = self.expr(obj)?;
                let k = self.alloc()?;
                self.emit_ldstr(k, name);
                self.emit(Opcode::SetIndex, o, k, value);
                self.reset(mark);
            }
            // The parser only produces the three target forms above
            _ => unreachable!("invalid assignment target survived parsing"),
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expr(e) => {
                let mark = self.mark();
                self.expr(e)?;
                self.reset(mark);
            }
            Stmt::Let { name, init } => {
                let local = self.alloc()?;
                self.expr_into(local, init)?;
                self.declare_local(name, local);
            }
            Stmt::Return(value) => match value {
                Some(e) => {
                    let mark = self.mark();
                    let reg = self.expr(e)?;
                    self.emit(Opcode::Ret, reg, 0, 0);
                    self.reset(mark);
                }
                None => self.emit(Opcode::RetNil, 0, 0, 0),
            },
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let mark = self.mark();
                let c = self.expr(cond)?;
                let to_else = self.emit_jump(Opcode::Jz, c);
                self.reset(mark);

                self.scoped_block(then_branch)?;
                match else_branch {
                    Some(els) => {
                        let to_end = self.emit_jump(Opcode::Jmp, 0);
                        self.patch_jump(to_else);
                        self.scoped_block(els)?;
                        self.patch_jump(to_end);
                    }
                    None => self.patch_jump(to_else),
                }
            }
            Stmt::While { cond, body } => {
                let loop_start = self.code.len();
                let mark = self.mark();
                let c = self.expr(cond)?;
                let to_end = self.emit_jump(Opcode::Jz, c);
                self.reset(mark);

                self.loops.push(LoopFrame {
                    break_jumps: Vec::new(),
                    continue_jumps: Vec::new(),
                });
                self.scoped_block(body)?;
                self.emit_jump_to(Opcode::Jmp, 0, loop_start);

                let frame = self.loops.pop().expect("loop frame pushed above");
                for j in frame.break_jumps {
                    self.patch_jump(j);
                }
                self.patch_jump(to_end);
                for j in frame.continue_jumps {
                    self.patch_to(j, loop_start);
                }
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                // The initializer's locals are scoped to the loop
                self.scopes.push(Vec::new());
                let scope_mark = self.mark();

                if let Some(init) = init {
                    self.statement(init)?;
                }

                let cond_start = self.code.len();
                let to_end = match cond {
                    Some(c) => {
                        let mark = self.mark();
                        let reg = self.expr(c)?;
                        let j = self.emit_jump(Opcode::Jz, reg);
                        self.reset(mark);
                        Some(j)
                    }
                    None => None,
                };

                self.loops.push(LoopFrame {
                    break_jumps: Vec::new(),
                    continue_jumps: Vec::new(),
                });
                self.scoped_block(body)?;

                let step_start = self.code.len();
                if let Some(step) = step {
                    let mark = self.mark();
                    self.expr(step)?;
                    self.reset(mark);
                }
                self.emit_jump_to(Opcode::Jmp, 0, cond_start);

                let frame = self.loops.pop().expect("loop frame pushed above");
                for j in frame.break_jumps {
                    self.patch_jump(j);
                }
                if let Some(j) = to_end {
                    self.patch_jump(j);
                }
                for j in frame.continue_jumps {
                    self.patch_to(j, step_start);
                }

                self.scopes.pop();
                self.reset(scope_mark);
            }
            Stmt::Break => {
                let j = self.emit_jump(Opcode::Jmp, 0);
                self.loops
                    .last_mut()
                    .ok_or(CompileError::BreakOutsideLoop)?
                    .break_jumps
                    .push(j);
            }
            Stmt::Continue => {
                let j = self.emit_jump(Opcode::Jmp, 0);
                self.loops
                    .last_mut()
                    .ok_or(CompileError::ContinueOutsideLoop)?
                    .continue_jumps
                    .push(j);
            }
            Stmt::Block(stmts) => self.scoped_block(stmts)?,
            Stmt::FnDecl { name, params, body } => {
                let mark = self.mark();
                let f = self.expr(&Expr::FnLit {
                    name: Some(name.clone()),
                    params: params.clone(),
                    body: body.clone(),
                })?;
                let name_reg = self.alloc()?;
                self.emit_ldstr(name_reg, name);
                self.emit(Opcode::SetGlobal, name_reg, f, 0);
                self.reset(mark);
            }
        }
        Ok(())
    }

    /// Patch a pending jump to an arbitrary (usually backward) target.
    fn patch_to(&mut self, ext_idx: usize, target: usize) {
        let rel = target as i64 - (ext_idx as i64 + 1);
        self.code[ext_idx] = rel as i32 as u32;
    }

    fn scoped_block(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        self.scopes.push(Vec::new());
        let mark = self.mark();
        for stmt in stmts {
            self.statement(stmt)?;
        }
        self.scopes.pop();
        self.reset(mark);
        Ok(())
    }
}

/// Compile one function body into a region (meta + name + code).
fn compile_function(name: &str, params: &[String], body: &[Stmt]) -> Result<Vec<u32>, CompileError> {
    if params.len() > u8::MAX as usize {
        return Err(CompileError::TooManyParameters(name.to_string()));
    }

    let mut fg = FuncGen::new(name);
    for param in params {
        let reg = fg.alloc()?;
        fg.declare_local(param, reg);
    }

    for stmt in body {
        fg.statement(stmt)?;
    }
    // Fall off the end: return nil
    fg.emit(Opcode::RetNil, 0, 0, 0);

    let nregs = fg.max_reg.max(params.len() as u16);
    if nregs > u8::MAX as u16 + 1 {
        return Err(CompileError::TooManyRegisters(name.to_string()));
    }

    let mut region = encode_func_meta(params.len() as u8, nregs as u8, name);
    region.extend_from_slice(&fg.code);
    Ok(region)
}

/// Compile a whole translation unit; the top level is the function at
/// word 0 of the resulting program.
pub fn compile_program(stmts: &[Stmt]) -> Result<Program, CompileError> {
    compile_function("top-level", &[], stmts).map(Program::new)
}

/// Compile a single expression into a function that returns its value.
pub fn compile_expression(expr: &Expr) -> Result<Program, CompileError> {
    let body = [Stmt::Return(Some(expr.clone()))];
    compile_function("expression", &[], &body).map(Program::new)
}
