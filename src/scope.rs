//! # Scope Tables
//!
//! `spec.md` §4.3 calls for a linear, insertion-ordered association list
//! rather than a hash map for variable storage — small scopes, and the
//! original's `VarList` is a plain singly-linked list scanned front to
//! back. `VarList` here is the same shape: a `Vec` scanned linearly,
//! first-match-wins on both lookup and insert-or-update.
//!
//! The scope *precedence* rule is the more consequential part of §4.3:
//! both `LOAD_VAR` and `STORE_VAR` check the global scope before the
//! current frame's local scope. For loads this is an ordinary "globals
//! shadow locals" rule; applied to stores too, it means a local variable
//! can never be created under a name that also exists globally — writes
//! silently land in the global slot instead. `spec.md` calls this out as
//! deliberate, not a bug to paper over, so `store_var`/`load_var` implement
//! it exactly as stated.

use crate::error::ChipError;
use crate::object::ObjectRef;

/// Insertion-ordered, linearly-scanned variable table.
#[derive(Default)]
pub struct VarList {
    entries: Vec<(String, ObjectRef)>,
}

impl VarList {
    pub fn new() -> Self {
        VarList {
            entries: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<ObjectRef> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Insert-or-update, first match wins: an existing entry is
    /// overwritten in place, a new name is appended.
    pub fn set(&mut self, name: &str, value: ObjectRef) {
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            self.entries.push((name.to_string(), value));
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }
}

/// `LOAD_VAR`: check globals first, then the current frame's locals.
/// Neither hit is an error escalation path of its own — the caller raises
/// [`ChipError::UnboundVariable`] if both miss.
pub fn load_var(globals: &VarList, locals: &VarList, name: &str) -> Result<ObjectRef, ChipError> {
    if let Some(v) = globals.get(name) {
        return Ok(v);
    }
    locals
        .get(name)
        .ok_or_else(|| ChipError::UnboundVariable(name.to_string()))
}

/// `STORE_VAR`: if `name` already exists globally, the write lands there
/// even while executing inside a method body — locals can never shadow an
/// existing global under the same name. Only when there is no global entry
/// does the store create or update a frame-local slot. This mirrors
/// `intepreter.c`'s `store_var`, which always probes the global list
/// first.
pub fn store_var(globals: &mut VarList, locals: &mut VarList, name: &str, value: ObjectRef) {
    if globals.contains(name) {
        globals.set(name, value);
    } else {
        locals.set(name, value);
    }
}
