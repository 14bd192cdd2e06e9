//! # Error Taxonomy for the Chip Engine
//!
//! Two closed enums, matching the two lifetimes a complete image/VM split
//! produces:
//!
//! - [`LoadError`]: the image loader's failure modes (`spec.md` §4.1, §6).
//!   All of these happen before a single instruction has executed.
//! - [`ChipError`]: the interpreter's failure modes (`spec.md` §7). Every
//!   variant here is fatal by design — Chip bytecode has no `try`/catch, so
//!   there is no handler to route these to; `main` prints the `Display`
//!   message to stdout and exits 1.
//!
//! Both implement [`std::error::Error`] so they compose with `?` inside
//! functions that return `Result<_, LoadError>` or `Result<_, ChipError>`.

use std::fmt;

/// Failures while turning raw image bytes into a [`crate::image::ConstantPool`]
/// and [`crate::image::Program`].
#[derive(Debug, PartialEq, Eq)]
pub enum LoadError {
    /// The file could not be opened or read at all.
    Io(String),
    /// A fixed-size section (header, length prefix, instruction) ran past
    /// the end of the buffer.
    Truncated(&'static str),
    /// A constant-pool index embedded in the program section pointed past
    /// the end of the loaded pool.
    ConstantIndexOutOfRange(u32),
    /// The constants count declared in the header exceeds the 8192 cap.
    TooManyConstants(u32),
    /// A decoded opcode byte does not match any of the 25 instructions
    /// `spec.md` §6 defines.
    UnknownOpcode(u8),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(msg) => write!(f, "unable to load file: {}", msg),
            LoadError::Truncated(section) => {
                write!(f, "image truncated while reading {}", section)
            }
            LoadError::ConstantIndexOutOfRange(idx) => {
                write!(f, "constant index {} out of range", idx)
            }
            LoadError::TooManyConstants(count) => {
                write!(f, "constant count {} exceeds pool capacity of 8192", count)
            }
            LoadError::UnknownOpcode(op) => write!(f, "illegal instruction {}", op),
        }
    }
}

impl std::error::Error for LoadError {}

/// Failures raised by the running interpreter (`spec.md` §7).
///
/// Every variant is fatal: there is no bytecode-visible recovery path. The
/// dispatch loop in [`crate::vm`] stops at the first one and propagates it
/// to `main`, which prints `Display` and exits 1.
#[derive(Debug, PartialEq)]
pub enum ChipError {
    /// `NEW` named a class with no matching entry in the Program Table.
    UnknownClass(String),
    /// `LOAD_VAR`/`STORE_VAR` found no binding in the global or frame scope
    /// (the latter only for loads; stores always succeed per §4.3).
    UnboundVariable(String),
    /// `LOAD_MEMBER`/`STORE_MEMBER` targeted an object with no field list,
    /// or a field list with no entry under that name.
    MissingMember(String),
    /// `CALL` popped a callee that is not a `Function` object.
    CallTargetNotFunction,
    /// `SYSCALL` was invoked with an integer not in the closed table (§4.6).
    UnknownSyscall(i64),
    /// Entry point `Main.main` is absent (§6).
    MissingEntryPoint,
    /// An array index fell outside `[0, slots.len())`. The original C reads
    /// uninitialized memory here; `spec.md` §8 requires a safe
    /// implementation to detect and abort instead.
    ArrayIndexOutOfBounds { index: i64, len: usize },
    /// A syscall argument was not the type its slot in §4.6 requires.
    SyscallArgType { syscall: i64, expected: &'static str },
    /// Operand-stack or call-stack invariant broken: underflow, overflow
    /// past the 512-entry capacity bound, or a type mismatch between a raw
    /// double and an object reference that well-formed bytecode should
    /// never produce.
    VmInvariant(String),
}

impl fmt::Display for ChipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChipError::UnknownClass(name) => write!(f, "Error, class {} not defined", name),
            ChipError::UnboundVariable(name) => {
                write!(f, "unable to load variable {} as it is not found", name)
            }
            ChipError::MissingMember(name) => write!(f, "Unknown variable member {}", name),
            ChipError::CallTargetNotFunction => write!(f, "unknown function call"),
            ChipError::UnknownSyscall(n) => write!(f, "unknown syscall {}", n),
            ChipError::MissingEntryPoint => write!(f, "entry point method main not found"),
            ChipError::ArrayIndexOutOfBounds { index, len } => write!(
                f,
                "array index {} out of bounds for length {}",
                index, len
            ),
            ChipError::SyscallArgType { syscall, expected } => write!(
                f,
                "syscall {} expects argument of type {}",
                syscall, expected
            ),
            ChipError::VmInvariant(msg) => write!(f, "vm invariant violated: {}", msg),
        }
    }
}

impl std::error::Error for ChipError {}
