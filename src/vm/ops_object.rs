//! # Constant, Member, and Array Operations
//!
//! `LOAD_CONST` materializes and caches the character-array representation
//! of a constant-pool string (`spec.md` §3, §9 — a representation
//! deliberately distinct from the `String` payload syscalls hand back;
//! the two are never unified here). `LOAD_MEMBER`/`STORE_MEMBER` read and
//! write an object's field list; `NEWARRAY`/`LOAD_ARRAY`/`STORE_ARRAY`
//! manage the Array shape's slot vector. Every pop order here is taken
//! verbatim from `intepreter.c`'s handlers, not inferred from the stack
//! notation in `spec.md`'s opcode table.

use super::{Frame, Interpreter, StackVal};
use crate::error::ChipError;
use crate::object::Object;

pub(super) fn load_const(
    interp: &Interpreter,
    frame: &mut Frame,
    idx: u32,
    bytes: &[u8],
) -> Result<(), ChipError> {
    if let Some(cached) = interp.const_cache.borrow().get(&idx) {
        return frame.push(StackVal::Obj(cached.clone()));
    }
    let slots: Vec<StackVal> = bytes.iter().map(|&b| StackVal::Num(b as f64)).collect();
    let arr = Object::new_array("char", slots);
    interp.const_cache.borrow_mut().insert(idx, arr.clone());
    frame.push(StackVal::Obj(arr))
}

/// `(obj -- v)`: pop the instance, look up `name` in its field list.
pub(super) fn load_member(frame: &mut Frame, name: &str) -> Result<(), ChipError> {
    let obj = frame.pop_obj()?;
    let fields = obj
        .fields()
        .ok_or_else(|| ChipError::MissingMember(name.to_string()))?;
    let v = fields
        .borrow()
        .get(name)
        .ok_or_else(|| ChipError::MissingMember(name.to_string()))?;
    frame.push(StackVal::Obj(v))
}

/// `(v, obj -- )`: pop order is `obj` first (it sits on top of the
/// stack), then `v` — the reverse of what the opcode's own `(v, obj -- )`
/// notation would suggest by position alone (`spec.md` §9's open
/// question on this).
pub(super) fn store_member(frame: &mut Frame, name: &str) -> Result<(), ChipError> {
    let obj = frame.pop_obj()?;
    let v = frame.pop_obj()?;
    let fields = obj
        .fields()
        .ok_or_else(|| ChipError::MissingMember(name.to_string()))?;
    fields.borrow_mut().set(name, v);
    Ok(())
}

/// `(size -- arr)`: size is a raw double, not an Object. Slots start out
/// holding the empty-return singleton (`spec.md` §4.4).
pub(super) fn new_array(interp: &Interpreter, frame: &mut Frame, element_class: &str) -> Result<(), ChipError> {
    let size = frame.pop_num()?;
    let count = size.floor().clamp(0.0, i32::MAX as f64) as usize;
    let slots = vec![StackVal::Obj(interp.empty_return.clone()); count];
    let arr = Object::new_array(element_class, slots);
    frame.push(StackVal::Obj(arr))
}

/// `(index, arr -- v)`: pop index (raw double) first, then the array.
pub(super) fn load_array(frame: &mut Frame) -> Result<(), ChipError> {
    let index = frame.pop_num()?;
    let arr = frame.pop_obj()?;
    let slots = arr
        .slots()
        .ok_or_else(|| ChipError::VmInvariant("LOAD_ARRAY target is not an Array".to_string()))?
        .borrow();
    let i = index as i64;
    let item = (i >= 0 && (i as usize) < slots.len())
        .then(|| slots[i as usize].clone())
        .ok_or(ChipError::ArrayIndexOutOfBounds {
            index: i,
            len: slots.len(),
        })?;
    drop(slots);
    frame.push(item)
}

/// `(index, arr, v -- )`: pop order is index, then array, then value
/// (confirmed by `intepreter.c`'s three sequential pops).
pub(super) fn store_array(frame: &mut Frame) -> Result<(), ChipError> {
    let index = frame.pop_num()?;
    let arr = frame.pop_obj()?;
    let value = frame.pop()?;
    let slots_cell = arr
        .slots()
        .ok_or_else(|| ChipError::VmInvariant("STORE_ARRAY target is not an Array".to_string()))?;
    let mut slots = slots_cell.borrow_mut();
    let i = index as i64;
    if i < 0 || (i as usize) >= slots.len() {
        return Err(ChipError::ArrayIndexOutOfBounds {
            index: i,
            len: slots.len(),
        });
    }
    slots[i as usize] = value;
    Ok(())
}
