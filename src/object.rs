//! # Object Model
//!
//! `spec.md` §3 names a single runtime type with three shapes: Variable,
//! Function, and Array. All three share one reference-counted handle so
//! the operand stack, scope tables, and array slots can hold any of them
//! uniformly. Rust's `Rc` satisfies the spec's reference-counting
//! requirement directly — no hand-written incref/decref, no need to model
//! `spec.md` §9's "cyclic object graphs" note as anything other than
//! ordinary `Rc`/`Weak` usage: a `Function` never outlives the frame that
//! bound it by more than the `Weak` back-reference allows, so the only
//! cycle the original's diagram admits (bound-function → owner →
//! bound-function) is broken here instead of leaked.
//!
//! ## Shapes
//! - `Variable`: a single mutable slot holding either a number or a string.
//! - `Function`: an immutable pointer to a `Method` plus the object it was
//!   read off of via `LOAD_MEMBER` (`None` for a bare global function).
//! - `Array`: a growable, index-addressed list of [`crate::vm::StackVal`].
//!
//! Field storage for Variable/Array "instances" created by `NEW` is a
//! [`crate::scope::VarList`]: fields spring into existence on first
//! `STORE_MEMBER`, matching `spec.md` §3 ("no fields are declared
//! statically").

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::image::Method;
use crate::scope::VarList;
use crate::vm::StackVal;

/// A single mutable value slot: either a number or a string, switching
/// representation freely on reassignment (`spec.md` §3: Variable has no
/// fixed type).
#[derive(Debug, Clone)]
pub enum Scalar {
    Num(f64),
    Str(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Num(n) => write!(f, "{}", n),
            Scalar::Str(s) => write!(f, "{}", s),
        }
    }
}

/// The one runtime object type, in its three shapes. Every shape carries a
/// non-null `name` tag (`spec.md` §3 invariant): the owning class for a
/// Variable, the element-class for an Array, the method name for a
/// Function (read off `method.name`, so it needs no field of its own).
pub enum Object {
    /// A scalar slot plus whatever fields `STORE_MEMBER` has attached to it
    /// (instances created by `NEW` are Variables with a field list).
    Variable {
        name: String,
        value: RefCell<Scalar>,
        fields: RefCell<VarList>,
    },
    /// A bound or unbound callable. `bound` is a `Weak` reference to the
    /// object this function was read off of via `LOAD_MEMBER`, so holding a
    /// `Function` never keeps its owner alive past the owner's own last
    /// strong reference — the cycle that would otherwise form is cut here.
    Function {
        method: Rc<Method>,
        bound: Option<Weak<Object>>,
    },
    /// A growable, index-addressed slot list, plus its own field list (an
    /// Array can also carry `STORE_MEMBER` fields, same as a Variable).
    Array {
        name: String,
        slots: RefCell<Vec<StackVal>>,
        fields: RefCell<VarList>,
    },
}

/// Shared handle to an [`Object`]. Every scope slot, array slot, and
/// operand-stack `Obj` variant holds one of these.
pub type ObjectRef = Rc<Object>;

impl Object {
    /// A bare Variable tagged with `class_name`, used both for `NEW` (before
    /// its methods are bound in) and for the built-in "String"/"Number"
    /// objects syscalls hand back.
    pub fn new_variable(class_name: impl Into<String>, value: Scalar) -> ObjectRef {
        Rc::new(Object::Variable {
            name: class_name.into(),
            value: RefCell::new(value),
            fields: RefCell::new(VarList::new()),
        })
    }

    pub fn new_number(n: f64) -> ObjectRef {
        Object::new_variable("Number", Scalar::Num(n))
    }

    pub fn new_string(s: impl Into<String>) -> ObjectRef {
        let s = s.into();
        let obj = Object::new_variable("String", Scalar::Str(s.clone()));
        if let Some(fields) = obj.fields() {
            fields
                .borrow_mut()
                .set("count", Object::new_number(s.len() as f64));
        }
        obj
    }

    /// Build a `Function`, eagerly binding `owner` as its back-reference —
    /// mirrors `intepreter.c`'s `new_object()`, which always constructs the
    /// bound pointer at creation time rather than lazily on first call.
    pub fn new_function(method: Rc<Method>, owner: Option<&ObjectRef>) -> ObjectRef {
        Rc::new(Object::Function {
            method,
            bound: owner.map(Rc::downgrade),
        })
    }

    /// `slots` is supplied pre-filled (with `empty_return` placeholders for
    /// `NEWARRAY`, or decoded character codes for a `LOAD_CONST` char
    /// array) — `Object` itself has no opinion on the fill value.
    pub fn new_array(element_class: impl Into<String>, slots: Vec<StackVal>) -> ObjectRef {
        let count = slots.len();
        let obj = Rc::new(Object::Array {
            name: element_class.into(),
            slots: RefCell::new(slots),
            fields: RefCell::new(VarList::new()),
        });
        if let Some(fields) = obj.fields() {
            fields
                .borrow_mut()
                .set("count", Object::new_number(count as f64));
        }
        obj
    }

    pub fn as_function(&self) -> Option<(&Rc<Method>, Option<ObjectRef>)> {
        match self {
            Object::Function { method, bound } => {
                Some((method, bound.as_ref().and_then(Weak::upgrade)))
            }
            _ => None,
        }
    }

    pub fn fields(&self) -> Option<&RefCell<VarList>> {
        match self {
            Object::Variable { fields, .. } => Some(fields),
            Object::Array { fields, .. } => Some(fields),
            Object::Function { .. } => None,
        }
    }

    pub fn as_scalar(&self) -> Option<std::cell::Ref<'_, Scalar>> {
        match self {
            Object::Variable { value, .. } => Some(value.borrow()),
            _ => None,
        }
    }

    pub fn set_scalar(&self, new_value: Scalar) {
        if let Object::Variable { value, .. } = self {
            *value.borrow_mut() = new_value;
        }
    }

    pub fn slots(&self) -> Option<&RefCell<Vec<StackVal>>> {
        match self {
            Object::Array { slots, .. } => Some(slots),
            _ => None,
        }
    }

    /// Truthiness used by `JMPIFT`/`OR`/comparison results: zero and the
    /// empty string are false, everything else (including arrays and
    /// functions) is true (`spec.md` §3).
    pub fn is_truthy(&self) -> bool {
        match self {
            Object::Variable { value, .. } => match &*value.borrow() {
                Scalar::Num(n) => *n != 0.0,
                Scalar::Str(s) => !s.is_empty(),
            },
            Object::Function { .. } | Object::Array { .. } => true,
        }
    }
}
