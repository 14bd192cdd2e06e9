//! # Chip Bytecode Image Loader & Program Table
//!
//! This module defines the **instruction set**, the **Program Table**
//! (classes and their methods), and a **binary parser** that turns a raw
//! byte slice into a [`ConstantPool`] and a [`Program`], matching the
//! two-pass layout in `spec.md` §4.1/§6.
//!
//! ## Binary layout (little-endian, unaligned)
//! ```text
//! offset 0:   magic[8]            (ignored)
//! offset 8:   program_length: u32
//! offset 12:  --- program section, decoded on the SECOND pass ---
//!              class_count: u32
//!              repeated class_count times:
//!                method_count: u16
//!                class_name_idx: u16
//!                repeated method_count times:
//!                  op_count: u16
//!                  method_name_idx: u16
//!                  repeated op_count times:
//!                    opcode: u8
//!                    operand: f64
//! offset 8+4+program_length+4:
//!              constant_count: u32   (decoded on the FIRST pass)
//!              repeated constant_count times:
//!                length: u32
//!                bytes[length]
//! ```
//!
//! The loader reads the constants section before the program section (the
//! program length lets it skip there directly), then seeks back to offset
//! 12 to decode the program with the constant pool already populated — so
//! every name-bearing instruction (`LOAD_VAR`, `NEW`, ...) can resolve its
//! constant-pool operand to an owned `String` immediately, and the pool
//! itself need not outlive `parse_image`.
//!
//! ## Opcode numbering
//! The concrete byte value for each opcode is its position in the ordered
//! list `spec.md` §6 gives as the binary contract: `LOAD_VAR, STORE_VAR,
//! POP, CMPEQ, CMPGT, CMPLT, ADD, SUB, MUL, DIV, MOD, OR, LOAD_NUMBER,
//! LOAD_CONST, LOAD_MEMBER, STORE_MEMBER, CALL, SYSCALL, NEW, NEWARRAY,
//! LOAD_ARRAY, STORE_ARRAY, JMPIFT, JMP, RET` — assigned consecutive values
//! 0 through 24 in that order.

use std::rc::Rc;

use crate::error::LoadError;

/// Upper bound on the number of interned constants per image (`spec.md` §3).
pub const CONSTANT_POOL_CAPACITY: usize = 8192;

/// Indexed table of byte-strings loaded from the image, read-only after
/// load. Out-of-range lookups are a fatal load error, never a runtime one:
/// every instruction operand that names a constant is resolved once, here,
/// while the pool is being built.
///
/// Entries are kept as raw `Vec<u8>`, not `String` (`spec.md` §3: "a table
/// of byte-strings"): a constant is not guaranteed to be valid UTF-8, and
/// `LOAD_CONST`'s char array plus syscalls 11/12 need the exact byte
/// sequence, not a UTF-8-lossy approximation with a different length.
pub struct ConstantPool {
    entries: Vec<Vec<u8>>,
}

impl ConstantPool {
    fn get_bytes(&self, index: u32) -> Result<&[u8], LoadError> {
        self.entries
            .get(index as usize)
            .map(|b| b.as_slice())
            .ok_or(LoadError::ConstantIndexOutOfRange(index))
    }

    /// Decode a constant as a name (class, method, or field identifier).
    /// Lossy: identifiers are expected to be plain text, unlike arbitrary
    /// `LOAD_CONST` payloads, which are read via [`Self::get_bytes`]
    /// instead so their bytes round-trip exactly.
    fn get_str(&self, index: u32) -> Result<String, LoadError> {
        Ok(String::from_utf8_lossy(self.get_bytes(index)?).into_owned())
    }

    /// Number of interned constants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One compiled method: a name and a flat vector of already-decoded
/// instructions. `code.len()` is bounded by the 16-bit `op_count` in the
/// image.
pub struct Method {
    pub name: String,
    pub code: Vec<Instr>,
}

/// One class: a name and its ordered methods. No fields are declared
/// statically — object fields spring into existence on first
/// `STORE_MEMBER` (`spec.md` §3).
///
/// Methods are `Rc`-shared so a bound [`crate::object::Object::Function`]
/// can hold its own handle to one without borrowing the `Program` it came
/// from (`spec.md` §3: "a Function's `method` pointer is valid for the
/// lifetime of the Function").
pub struct Class {
    pub name: String,
    pub methods: Vec<Rc<Method>>,
}

impl Class {
    /// Linear scan by name; first match wins (`spec.md` §4.2).
    pub fn get_method(&self, name: &str) -> Option<&Rc<Method>> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Ordered set of classes, as decoded from the program section.
pub struct Program {
    pub classes: Vec<Class>,
}

impl Program {
    /// Linear scan by name; first match wins (`spec.md` §4.2). No hashing:
    /// the tables are small and duplicate names are not forbidden.
    pub fn get_class(&self, name: &str) -> Option<&Class> {
        self.classes.iter().find(|c| c.name == name)
    }
}

/// A decoded instruction. Constant-pool name operands are resolved to owned
/// `String`s at load time (the pool is already populated by the time the
/// program section is decoded); integer operands (jump targets, argument
/// counts, array sizes) are truncated per `spec.md` §3: `⌊operand⌋` in
/// `[0, 2^31)`.
pub enum Instr {
    LoadVar(String),
    StoreVar(String),
    LoadNumber(f64),
    /// Resolved constant-pool index plus its raw byte payload, so the
    /// interpreter's `LOAD_CONST` cache can key on the index (`spec.md`
    /// §3: "cached by constant index") without re-touching the pool, and
    /// so the char array it builds holds the exact constant bytes rather
    /// than a UTF-8-lossy re-encoding of them.
    LoadConst(u32, Vec<u8>),
    LoadMember(String),
    StoreMember(String),
    Pop,
    CmpEq,
    CmpGt,
    CmpLt,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Or,
    /// Argument count.
    Call(u32),
    /// The syscall number is read off the operand stack at dispatch time,
    /// not from this instruction's own operand (`spec.md` §4.6, confirmed
    /// against `original_source/src/intepreter.c`'s `OP_SYSCALL` handler).
    Syscall,
    New(String),
    NewArray(String),
    LoadArray,
    StoreArray,
    /// Pre-resolved to a 0-based target instruction index: `spec.md` §4.4
    /// has the engine assign `PC = I - 1` so that the loop's trailing
    /// increment (skipped via `continue`, matching `intepreter.c`) lands
    /// exactly on the 1-based target `I`.
    JmpIfTrue(usize),
    Jmp(usize),
    Ret,
}

fn read_u32(data: &[u8], idx: &mut usize, what: &'static str) -> Result<u32, LoadError> {
    let slice = data
        .get(*idx..*idx + 4)
        .ok_or(LoadError::Truncated(what))?;
    let bytes: [u8; 4] = slice.try_into().unwrap();
    *idx += 4;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u16(data: &[u8], idx: &mut usize, what: &'static str) -> Result<u16, LoadError> {
    let slice = data
        .get(*idx..*idx + 2)
        .ok_or(LoadError::Truncated(what))?;
    let bytes: [u8; 2] = slice.try_into().unwrap();
    *idx += 2;
    Ok(u16::from_le_bytes(bytes))
}

fn read_f64(data: &[u8], idx: &mut usize, what: &'static str) -> Result<f64, LoadError> {
    let slice = data
        .get(*idx..*idx + 8)
        .ok_or(LoadError::Truncated(what))?;
    let bytes: [u8; 8] = slice.try_into().unwrap();
    *idx += 8;
    Ok(f64::from_le_bytes(bytes))
}

fn read_u8(data: &[u8], idx: &mut usize, what: &'static str) -> Result<u8, LoadError> {
    let b = *data.get(*idx).ok_or(LoadError::Truncated(what))?;
    *idx += 1;
    Ok(b)
}

/// Interpret an opcode's raw `f64` operand as the non-negative integer it
/// encodes: constant index, jump target, or argument count (`spec.md` §3:
/// `⌊operand⌋` clamped into `[0, 2^31)`).
fn operand_as_u32(operand: f64) -> u32 {
    operand.floor().clamp(0.0, (i32::MAX) as f64) as u32
}

/// Parse a Chip bytecode image into a [`ConstantPool`] and a [`Program`]
/// (`spec.md` §4.1).
///
/// The first pass reads the constants section (after skipping over the
/// not-yet-decoded program section using the length prefix at offset 8);
/// the second pass seeks back to offset 12 and decodes the program, with
/// every constant-pool-indexed operand resolved immediately since the pool
/// is already complete.
pub fn parse_image(data: &[u8]) -> Result<(ConstantPool, Program), LoadError> {
    if data.len() < 8 {
        return Err(LoadError::Truncated("magic header"));
    }
    // Magic is read but not validated (`spec.md` §4.1 step 1).
    let mut idx = 8;

    let program_length = read_u32(data, &mut idx, "program length")?;
    // Skip the not-yet-decoded program section plus its own trailing
    // 4-byte field, landing right at the constants count.
    idx = idx
        .checked_add(program_length as usize)
        .and_then(|v| v.checked_add(4))
        .ok_or(LoadError::Truncated("program section"))?;

    let constant_count = read_u32(data, &mut idx, "constant count")?;
    if constant_count as usize > CONSTANT_POOL_CAPACITY {
        return Err(LoadError::TooManyConstants(constant_count));
    }
    let mut entries = Vec::with_capacity(constant_count as usize);
    for _ in 0..constant_count {
        let len = read_u32(data, &mut idx, "constant length")? as usize;
        let bytes = data
            .get(idx..idx + len)
            .ok_or(LoadError::Truncated("constant bytes"))?;
        idx += len;
        entries.push(bytes.to_vec());
    }
    let pool = ConstantPool { entries };
    log::debug!(
        "chip image: {} byte(s), {} constant(s) loaded",
        data.len(),
        pool.len()
    );

    // Second pass: seek back to offset 12 (8-byte magic + 4-byte program
    // length) and decode the program section with the pool available.
    idx = 12;
    let class_count = read_u32(data, &mut idx, "class count")?;
    let mut classes = Vec::with_capacity(class_count as usize);
    for _ in 0..class_count {
        let method_count = read_u16(data, &mut idx, "method count")?;
        let class_name_idx = read_u16(data, &mut idx, "class name index")?;
        let class_name = pool.get_str(class_name_idx as u32)?;

        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            let op_count = read_u16(data, &mut idx, "op count")?;
            let method_name_idx = read_u16(data, &mut idx, "method name index")?;
            let method_name = pool.get_str(method_name_idx as u32)?;

            let mut code = Vec::with_capacity(op_count as usize);
            for _ in 0..op_count {
                let opcode = read_u8(data, &mut idx, "opcode")?;
                let operand = read_f64(data, &mut idx, "operand")?;
                code.push(decode_instr(opcode, operand, &pool)?);
            }
            methods.push(Rc::new(Method {
                name: method_name,
                code,
            }));
        }
        classes.push(Class {
            name: class_name,
            methods,
        });
    }
    log::debug!("chip image: {} class(es) decoded", classes.len());

    Ok((pool, Program { classes }))
}

fn decode_instr(opcode: u8, operand: f64, pool: &ConstantPool) -> Result<Instr, LoadError> {
    let const_name = |op: f64, pool: &ConstantPool| -> Result<String, LoadError> {
        pool.get_str(operand_as_u32(op))
    };
    Ok(match opcode {
        0 => Instr::LoadVar(const_name(operand, pool)?),
        1 => Instr::StoreVar(const_name(operand, pool)?),
        2 => Instr::Pop,
        3 => Instr::CmpEq,
        4 => Instr::CmpGt,
        5 => Instr::CmpLt,
        6 => Instr::Add,
        7 => Instr::Sub,
        8 => Instr::Mul,
        9 => Instr::Div,
        10 => Instr::Mod,
        11 => Instr::Or,
        12 => Instr::LoadNumber(operand),
        13 => {
            let idx = operand_as_u32(operand);
            Instr::LoadConst(idx, pool.get_bytes(idx)?.to_vec())
        }
        14 => Instr::LoadMember(const_name(operand, pool)?),
        15 => Instr::StoreMember(const_name(operand, pool)?),
        16 => Instr::Call(operand_as_u32(operand)),
        17 => Instr::Syscall,
        18 => Instr::New(const_name(operand, pool)?),
        19 => Instr::NewArray(const_name(operand, pool)?),
        20 => Instr::LoadArray,
        21 => Instr::StoreArray,
        22 => Instr::JmpIfTrue((operand_as_u32(operand) as usize).saturating_sub(1)),
        23 => Instr::Jmp((operand_as_u32(operand) as usize).saturating_sub(1)),
        24 => Instr::Ret,
        other => return Err(LoadError::UnknownOpcode(other)),
    })
}
