//! # Stack-Based Bytecode Virtual Machine
//!
//! This module implements the operand-stack machine described in `spec.md`
//! §4.4: fetch-decode-execute over a flat [`crate::image::Instr`] vector,
//! one frame per in-flight `CALL`, recursing directly into the host call
//! stack rather than maintaining an explicit return-address stack (no
//! tail-call optimization is required — `spec.md` §5).
//!
//! ## High-level model
//! - **Operand stack (`Frame::stack`)**: a tagged [`StackVal`] LIFO, capped
//!   at 512 entries per the per-frame budget in `spec.md` §4.4.
//! - **Frame-local scope (`Frame::locals`)**: the method's `VarList`, with
//!   `this` bound in it like any other name when a receiver is present.
//! - **Global scope (`Interpreter::globals`)**: process-wide, seeded at
//!   startup with one static singleton Variable per class (`spec.md` §3),
//!   visible to every frame ahead of its own locals (`spec.md` §4.3).
//! - **Constant cache (`Interpreter::const_cache`)**: `LOAD_CONST` results,
//!   keyed by pool index, so repeat loads return the same `Object`.
//!
//! Arithmetic, control flow, and object/array opcodes are split into
//! sibling modules the same way the interpreter loop itself stays a thin
//! dispatcher over them.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::error::ChipError;
use crate::image::{Instr, Method, Program};
use crate::object::{Object, ObjectRef, Scalar};
use crate::scope::VarList;

mod ops_arith;
mod ops_control;
mod ops_object;
pub mod syscall;

#[cfg(test)]
mod tests;

/// Operand-stack entry. The reference interpreter keeps two parallel
/// stacks (one of doubles, one of Object pointers); a single tagged stack
/// is the idiomatic equivalent `spec.md` §4.4 explicitly allows, and is
/// required here anyway since syscalls 1/2 push a raw double while every
/// other result-bearing opcode pushes an Object.
#[derive(Clone)]
pub enum StackVal {
    Num(f64),
    Obj(ObjectRef),
}

impl StackVal {
    pub fn as_num(&self) -> Result<f64, ChipError> {
        match self {
            StackVal::Num(n) => Ok(*n),
            StackVal::Obj(_) => Err(ChipError::VmInvariant(
                "expected a number, found an object reference".to_string(),
            )),
        }
    }

    pub fn as_obj(&self) -> Result<ObjectRef, ChipError> {
        match self {
            StackVal::Obj(o) => Ok(o.clone()),
            StackVal::Num(_) => Err(ChipError::VmInvariant(
                "expected an object reference, found a raw number".to_string(),
            )),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            StackVal::Num(n) => *n != 0.0,
            StackVal::Obj(o) => o.is_truthy(),
        }
    }
}

const OPERAND_STACK_CAPACITY: usize = 512;

/// Per-call state: the executing method, its program counter, its operand
/// stack, and its variable list. One `Frame` exists per `CALL` currently in
/// flight, the same shape as `eval`'s locals in the original.
pub struct Frame {
    method: Rc<Method>,
    pc: usize,
    stack: Vec<StackVal>,
    locals: VarList,
}

impl Frame {
    fn new(method: Rc<Method>, receiver: Option<ObjectRef>, args: Vec<StackVal>) -> Self {
        let mut locals = VarList::new();
        if let Some(this) = receiver {
            locals.set("this", this);
        }
        let mut stack = Vec::with_capacity(OPERAND_STACK_CAPACITY);
        stack.extend(args);
        Frame {
            method,
            pc: 0,
            stack,
            locals,
        }
    }

    pub(super) fn push(&mut self, v: StackVal) -> Result<(), ChipError> {
        if self.stack.len() >= OPERAND_STACK_CAPACITY {
            return Err(ChipError::VmInvariant(format!(
                "operand stack overflow past capacity {}",
                OPERAND_STACK_CAPACITY
            )));
        }
        self.stack.push(v);
        Ok(())
    }

    pub(super) fn pop(&mut self) -> Result<StackVal, ChipError> {
        self.stack
            .pop()
            .ok_or_else(|| ChipError::VmInvariant("operand stack underflow".to_string()))
    }

    pub(super) fn pop_num(&mut self) -> Result<f64, ChipError> {
        self.pop()?.as_num()
    }

    pub(super) fn pop_obj(&mut self) -> Result<ObjectRef, ChipError> {
        self.pop()?.as_obj()
    }
}

/// Process-wide interpreter context: the Program Table, the global scope,
/// the `LOAD_CONST` cache, and the empty-return singleton. Passed by
/// reference rather than kept in module statics so multiple images can be
/// run in one process, e.g. from tests (`spec.md` §9, "Global interpreter
/// state").
pub struct Interpreter {
    program: Program,
    globals: RefCell<VarList>,
    const_cache: RefCell<HashMap<u32, ObjectRef>>,
    pub(super) empty_return: ObjectRef,
    /// Unconsumed whitespace-delimited tokens left over from the last line
    /// read for syscall 0, matching `scanf("%s", ...)`'s behavior of
    /// leaving later tokens on the same line in the stream for the next
    /// read rather than discarding them (`spec.md` §4.6).
    pub(super) stdin_tokens: RefCell<VecDeque<String>>,
}

impl Interpreter {
    /// Seed the global scope with one static singleton Variable per class
    /// (`spec.md` §3), each eagerly carrying a bound Function per method,
    /// same as any other `NEW`-style instantiation (`intepreter.c`'s
    /// `main()` loop does exactly this right after `load_file`).
    pub fn new(program: Program) -> Result<Self, ChipError> {
        let interp = Interpreter {
            program,
            globals: RefCell::new(VarList::new()),
            const_cache: RefCell::new(HashMap::new()),
            empty_return: Object::new_number(0.0),
            stdin_tokens: RefCell::new(VecDeque::new()),
        };
        let class_names: Vec<String> = interp.program.classes.iter().map(|c| c.name.clone()).collect();
        for name in &class_names {
            let singleton = interp.instantiate(name)?;
            interp.globals.borrow_mut().set(name, singleton);
        }
        Ok(interp)
    }

    /// Build a `Variable` tagged with `class_name`, eagerly binding one
    /// `Function` field per method of that class (`spec.md` §4.5).
    pub(super) fn instantiate(&self, class_name: &str) -> Result<ObjectRef, ChipError> {
        let class = self
            .program
            .get_class(class_name)
            .ok_or_else(|| ChipError::UnknownClass(class_name.to_string()))?;
        let obj = Object::new_variable(class_name, Scalar::Num(0.0));
        let fields = obj.fields().expect("Variable always has a field list");
        for method in &class.methods {
            let func = Object::new_function(Rc::clone(method), Some(&obj));
            fields.borrow_mut().set(&method.name, func);
        }
        Ok(obj)
    }

    /// Entry point: resolve `Main.main` and run it with no receiver and no
    /// arguments (`spec.md` §6).
    pub fn run(&self) -> Result<(), ChipError> {
        let method = self
            .program
            .get_class("Main")
            .and_then(|c| c.get_method("main"))
            .cloned()
            .ok_or(ChipError::MissingEntryPoint)?;
        self.call_method(method, None, Vec::new())?;
        Ok(())
    }

    /// Run one method to completion: the recursive core `OP_CALL` invokes
    /// for every call, mirroring the original's direct-recursion `eval()`
    /// (`spec.md` §5: "a direct recursion into the dispatch loop").
    pub(super) fn call_method(
        &self,
        method: Rc<Method>,
        receiver: Option<ObjectRef>,
        args: Vec<StackVal>,
    ) -> Result<StackVal, ChipError> {
        let mut frame = Frame::new(method, receiver, args);

        while frame.pc < frame.method.code.len() {
            let mut advance = true;
            log::trace!(
                "pc={} opcode={} stack_depth={}",
                frame.pc,
                frame.method.code[frame.pc].name(),
                frame.stack.len()
            );

            match &frame.method.code[frame.pc] {
                Instr::LoadVar(name) => ops_control::load_var(self, &mut frame, name)?,
                Instr::StoreVar(name) => ops_control::store_var(self, &mut frame, name)?,
                Instr::LoadNumber(n) => frame.push(StackVal::Num(*n))?,
                Instr::LoadConst(idx, bytes) => ops_object::load_const(self, &mut frame, *idx, bytes)?,
                Instr::LoadMember(name) => ops_object::load_member(&mut frame, name)?,
                Instr::StoreMember(name) => ops_object::store_member(&mut frame, name)?,
                Instr::Pop => {
                    frame.pop()?;
                }
                Instr::CmpEq => ops_arith::cmp_eq(&mut frame)?,
                Instr::CmpGt => ops_arith::cmp_gt(&mut frame)?,
                Instr::CmpLt => ops_arith::cmp_lt(&mut frame)?,
                Instr::Add => ops_arith::add(&mut frame)?,
                Instr::Sub => ops_arith::sub(&mut frame)?,
                Instr::Mul => ops_arith::mul(&mut frame)?,
                Instr::Div => ops_arith::div(&mut frame)?,
                Instr::Mod => ops_arith::rem(&mut frame)?,
                Instr::Or => ops_arith::or(&mut frame)?,
                Instr::Call(argc) => {
                    let result = ops_control::call(self, &mut frame, *argc)?;
                    frame.push(result)?;
                }
                Instr::Syscall => {
                    let result = syscall::dispatch(self, &mut frame)?;
                    frame.push(result)?;
                }
                Instr::New(name) => {
                    let obj = self.instantiate(name)?;
                    frame.push(StackVal::Obj(obj))?;
                }
                Instr::NewArray(name) => ops_object::new_array(self, &mut frame, name)?,
                Instr::LoadArray => ops_object::load_array(&mut frame)?,
                Instr::StoreArray => ops_object::store_array(&mut frame)?,
                Instr::JmpIfTrue(target) => {
                    let a = frame.pop_num()?;
                    let b = frame.pop_num()?;
                    if a == b {
                        frame.pc = *target;
                        advance = false;
                    }
                }
                Instr::Jmp(target) => {
                    frame.pc = *target;
                    advance = false;
                }
                Instr::Ret => {
                    return frame.pop();
                }
            }

            if advance {
                frame.pc += 1;
            }
        }

        // A method whose last instruction isn't RET falls off the end;
        // treat it as an implicit return of the empty-return singleton.
        Ok(StackVal::Obj(self.empty_return.clone()))
    }
}

impl Instr {
    fn name(&self) -> &'static str {
        match self {
            Instr::LoadVar(_) => "LOAD_VAR",
            Instr::StoreVar(_) => "STORE_VAR",
            Instr::LoadNumber(_) => "LOAD_NUMBER",
            Instr::LoadConst(..) => "LOAD_CONST",
            Instr::LoadMember(_) => "LOAD_MEMBER",
            Instr::StoreMember(_) => "STORE_MEMBER",
            Instr::Pop => "POP",
            Instr::CmpEq => "CMPEQ",
            Instr::CmpGt => "CMPGT",
            Instr::CmpLt => "CMPLT",
            Instr::Add => "ADD",
            Instr::Sub => "SUB",
            Instr::Mul => "MUL",
            Instr::Div => "DIV",
            Instr::Mod => "MOD",
            Instr::Or => "OR",
            Instr::Call(_) => "CALL",
            Instr::Syscall => "SYSCALL",
            Instr::New(_) => "NEW",
            Instr::NewArray(_) => "NEWARRAY",
            Instr::LoadArray => "LOAD_ARRAY",
            Instr::StoreArray => "STORE_ARRAY",
            Instr::JmpIfTrue(_) => "JMPIFT",
            Instr::Jmp(_) => "JMP",
            Instr::Ret => "RET",
        }
    }
}
