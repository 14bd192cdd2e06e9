//! # Variable Access and Call Dispatch
//!
//! `LOAD_VAR`/`STORE_VAR` defer to [`crate::scope`] for the global-first
//! precedence rule (`spec.md` §4.3); `call` implements the `OP_CALL`
//! protocol in `spec.md` §4.4's "Call protocol" subsection: pop the
//! callee, pop `n` args in pop order, recurse into the callee's method
//! with its bound receiver, push the single result.

use std::rc::Rc;

use super::{Frame, Interpreter, StackVal};
use crate::error::ChipError;
use crate::scope;

pub(super) fn load_var(interp: &Interpreter, frame: &mut Frame, name: &str) -> Result<(), ChipError> {
    let v = scope::load_var(&interp.globals.borrow(), &frame.locals, name)?;
    frame.push(StackVal::Obj(v))
}

pub(super) fn store_var(interp: &Interpreter, frame: &mut Frame, name: &str) -> Result<(), ChipError> {
    let v = frame.pop_obj()?;
    scope::store_var(&mut interp.globals.borrow_mut(), &mut frame.locals, name, v);
    Ok(())
}

/// `CALL I`: pop the callee Function, pop `I` args (last pushed becomes
/// arg 0), invoke the callee's method with its bound receiver, return the
/// single result value.
pub(super) fn call(interp: &Interpreter, frame: &mut Frame, argc: u32) -> Result<StackVal, ChipError> {
    let callee = frame.pop_obj()?;
    let mut args = Vec::with_capacity(argc as usize);
    for _ in 0..argc {
        args.push(frame.pop()?);
    }
    // `args[0]` must be the last-pushed argument, which is exactly the
    // first one popped here, so no reversal is needed.
    let (method, bound) = callee
        .as_function()
        .ok_or(ChipError::CallTargetNotFunction)?;
    let method = Rc::clone(method);
    interp.call_method(method, bound, args)
}
