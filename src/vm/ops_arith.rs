//! # Arithmetic and Comparison Operations
//!
//! Every opcode here pops exactly two raw doubles and pushes one
//! (`spec.md` §4.4's stack-discipline note: these never touch an Object,
//! unlike `LOAD_VAR`/`CALL`/etc.). Pop order is fixed — the first value
//! popped is `a`, the second `b` — and every result is `b ∘ a`, matching
//! `intepreter.c`'s handlers pop-for-pop. `CMPGT`/`CMPLT`/`MOD`/`OR`
//! truncate both operands toward zero before operating; Rust's `as i64`
//! cast on an `f64` has the same truncation behavior as the original C
//! casts.

use super::Frame;
use crate::error::ChipError;
use crate::vm::StackVal;

fn pop_pair(frame: &mut Frame) -> Result<(f64, f64), ChipError> {
    let a = frame.pop_num()?;
    let b = frame.pop_num()?;
    Ok((a, b))
}

pub(super) fn add(frame: &mut Frame) -> Result<(), ChipError> {
    let (a, b) = pop_pair(frame)?;
    frame.push(StackVal::Num(b + a))
}

pub(super) fn sub(frame: &mut Frame) -> Result<(), ChipError> {
    let (a, b) = pop_pair(frame)?;
    frame.push(StackVal::Num(b - a))
}

pub(super) fn mul(frame: &mut Frame) -> Result<(), ChipError> {
    let (a, b) = pop_pair(frame)?;
    frame.push(StackVal::Num(b * a))
}

pub(super) fn div(frame: &mut Frame) -> Result<(), ChipError> {
    let (a, b) = pop_pair(frame)?;
    frame.push(StackVal::Num(b / a))
}

pub(super) fn rem(frame: &mut Frame) -> Result<(), ChipError> {
    let (a, b) = pop_pair(frame)?;
    frame.push(StackVal::Num(((b as i64) % (a as i64)) as f64))
}

pub(super) fn or(frame: &mut Frame) -> Result<(), ChipError> {
    let (a, b) = pop_pair(frame)?;
    let result = (b as i64 != 0) || (a as i64 != 0);
    frame.push(StackVal::Num(if result { 1.0 } else { 0.0 }))
}

pub(super) fn cmp_eq(frame: &mut Frame) -> Result<(), ChipError> {
    let (a, b) = pop_pair(frame)?;
    frame.push(StackVal::Num(if b == a { 1.0 } else { 0.0 }))
}

pub(super) fn cmp_gt(frame: &mut Frame) -> Result<(), ChipError> {
    let (a, b) = pop_pair(frame)?;
    frame.push(StackVal::Num(
        if (b as i64) > (a as i64) { 1.0 } else { 0.0 },
    ))
}

pub(super) fn cmp_lt(frame: &mut Frame) -> Result<(), ChipError> {
    let (a, b) = pop_pair(frame)?;
    frame.push(StackVal::Num(
        if (b as i64) < (a as i64) { 1.0 } else { 0.0 },
    ))
}
