//! # Syscall Table
//!
//! The closed, integer-indexed gate into host I/O from `spec.md` §4.6: the
//! syscall number always arrives as the raw double on top of the operand
//! stack (pushed by a preceding `LOAD_NUMBER`), never from the `SYSCALL`
//! instruction's own operand. Socket plumbing (3-8) goes through `nix`,
//! the idiomatic raw-syscall crate for this kind of fd-level code (see
//! `emdash-udashboard`'s use of `nix` for OS-level primitives elsewhere in
//! the retrieval pack); syscall 9 uses `fastrand` in place of libc
//! `rand()`, matching `leocavalcante-vhp`'s use of the same crate.
//!
//! A fd is represented, same as in the original, as a bare `Number`
//! Object holding the raw OS file descriptor — there is no wrapper type,
//! so a fd handed back by syscall 3/5 can be round-tripped through
//! `STORE_VAR`/`LOAD_VAR` like any other value and passed into syscalls
//! 4/6/7/8 unchanged.

use std::io::{self, Read, Write};
use std::os::fd::{BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::time::Duration;

use nix::sys::socket::{
    accept, bind, listen, setsockopt, socket, sockopt::ReuseAddr, AddressFamily, Backlog,
    SockFlag, SockType, SockaddrIn,
};
use nix::unistd;

use super::{Frame, Interpreter, StackVal};
use crate::error::ChipError;
use crate::object::{Object, ObjectRef, Scalar};

const IO_BUFFER_SIZE: usize = 8192;

/// Accepts either a `String`-tagged Variable or a `LOAD_CONST` character
/// Array, reconstructing the byte string from its slots in the latter
/// case. `LOAD_CONST` is the only bytecode-level way to produce a string
/// literal at all, so syscalls that take a literal argument (0's prompt,
/// 4's ip, 7's data) must accept the Array shape alongside the Variable
/// one. Syscalls 11/12 do not go through this helper — see
/// `expect_string` below.
fn expect_displayable(obj: &ObjectRef, syscall: i64) -> Result<String, ChipError> {
    if let Some(Scalar::Str(s)) = obj.as_scalar().as_deref() {
        return Ok(s.clone());
    }
    if let Some(slots) = obj.slots() {
        let bytes: Vec<u8> = slots.borrow().iter().map(|v| match v {
            StackVal::Num(n) => *n as u8,
            StackVal::Obj(_) => 0,
        }).collect();
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }
    Err(ChipError::SyscallArgType {
        syscall,
        expected: "String",
    })
}

/// Strict string argument check for syscalls 11/12 (`strlen`/`char_at`).
/// Unlike [`expect_displayable`], a `LOAD_CONST` character Array is
/// rejected rather than silently reassembled: a raw char array has no
/// `data_string` of its own in the original, and treating the two shapes
/// as interchangeable here is a type error, not a convenience.
fn expect_string(obj: &ObjectRef, syscall: i64) -> Result<String, ChipError> {
    match obj.as_scalar().as_deref() {
        Some(Scalar::Str(s)) => Ok(s.clone()),
        _ => Err(ChipError::SyscallArgType {
            syscall,
            expected: "String",
        }),
    }
}

fn fd_of(obj: &ObjectRef, syscall: i64) -> Result<RawFd, ChipError> {
    match obj.as_scalar().as_deref() {
        Some(Scalar::Num(n)) => Ok(*n as RawFd),
        _ => Err(ChipError::SyscallArgType {
            syscall,
            expected: "Number (fd)",
        }),
    }
}

/// `SYSCALL`: pop the syscall number, dispatch, return the single pushed
/// result to the caller so the main loop can push it in turn.
pub(super) fn dispatch(interp: &Interpreter, frame: &mut Frame) -> Result<StackVal, ChipError> {
    let n = frame.pop_num()? as i64;
    match n {
        0 => read_line(interp, frame),
        1 => print_number(frame),
        2 => print_char(frame),
        3 => open_socket(),
        4 => bind_and_listen(frame),
        5 => accept_connection(frame),
        6 => read_fd(frame),
        7 => write_fd(frame),
        8 => close_fd(frame, interp),
        9 => Ok(StackVal::Obj(Object::new_number(fastrand::i64(0..=i32::MAX as i64) as f64))),
        10 => sleep_seconds(frame, interp),
        11 => strlen(frame),
        12 => char_at(frame),
        other => Err(ChipError::UnknownSyscall(other)),
    }
}

/// `scanf("%s", ...)`-equivalent tokenization: a line with multiple
/// whitespace-delimited tokens must not drop the tail after the first
/// syscall-0 call consumes its first token, so unconsumed tokens from a
/// previously-read line sit in `interp.stdin_tokens` until the next call.
fn read_line(interp: &Interpreter, frame: &mut Frame) -> Result<StackVal, ChipError> {
    let prompt = expect_displayable(&frame.pop_obj()?, 0)?;
    print!("{}", prompt);
    io::stdout().flush().ok();

    let mut tokens = interp.stdin_tokens.borrow_mut();
    while tokens.is_empty() {
        let mut line = String::new();
        if io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        tokens.extend(line.split_whitespace().map(|s| s.to_string()));
    }
    let token = tokens.pop_front().unwrap_or_default();
    Ok(StackVal::Obj(Object::new_string(token)))
}

fn print_number(frame: &mut Frame) -> Result<StackVal, ChipError> {
    let x = frame.pop_num()?;
    println!("{:.6}", x);
    Ok(StackVal::Num(0.0))
}

fn print_char(frame: &mut Frame) -> Result<StackVal, ChipError> {
    let c = frame.pop_num()?;
    let byte = c as i64 as u32 as u8;
    io::stdout().write_all(&[byte]).ok();
    io::stdout().flush().ok();
    Ok(StackVal::Num(0.0))
}

fn open_socket() -> Result<StackVal, ChipError> {
    match socket(AddressFamily::Inet, SockType::Stream, SockFlag::empty(), None) {
        Ok(owned) => {
            setsockopt(&owned, ReuseAddr, &true).ok();
            let fd = owned.into_raw_fd();
            Ok(StackVal::Obj(Object::new_number(fd as f64)))
        }
        Err(e) => {
            log::warn!("syscall 3 (socket) failed: {e}");
            Ok(StackVal::Obj(Object::new_number(-1.0)))
        }
    }
}

fn bind_and_listen(frame: &mut Frame) -> Result<StackVal, ChipError> {
    let fd_obj = frame.pop_obj()?;
    let ip_obj = frame.pop_obj()?;
    let port_obj = frame.pop_obj()?;
    let fd = fd_of(&fd_obj, 4)?;
    let ip = expect_displayable(&ip_obj, 4)?;
    let port = match port_obj.as_scalar().as_deref() {
        Some(Scalar::Num(n)) => *n as u16,
        _ => {
            return Err(ChipError::SyscallArgType {
                syscall: 4,
                expected: "Number (port)",
            })
        }
    };
    let success = match ip.parse() {
        Ok(addr) => {
            let sockaddr = SockaddrIn::from(std::net::SocketAddrV4::new(addr, port));
            let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
            bind(borrowed, &sockaddr).is_ok()
                && listen(&borrowed, Backlog::new(5).unwrap_or(Backlog::MAXCONN)).is_ok()
        }
        Err(_) => false,
    };
    if !success {
        log::warn!("syscall 4 (bind/listen) failed for {}:{}", ip, port);
    }
    Ok(StackVal::Obj(Object::new_number(if success {
        1.0
    } else {
        0.0
    })))
}

fn accept_connection(frame: &mut Frame) -> Result<StackVal, ChipError> {
    let fd_obj = frame.pop_obj()?;
    let fd = fd_of(&fd_obj, 5)?;
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    match accept(borrowed) {
        Ok(newfd) => Ok(StackVal::Obj(Object::new_number(newfd as f64))),
        Err(e) => {
            log::warn!("syscall 5 (accept) failed: {e}");
            Ok(StackVal::Obj(Object::new_number(-1.0)))
        }
    }
}

fn read_fd(frame: &mut Frame) -> Result<StackVal, ChipError> {
    let fd_obj = frame.pop_obj()?;
    let fd = fd_of(&fd_obj, 6)?;
    let mut buf = vec![0u8; IO_BUFFER_SIZE];
    let n = unistd::read(unsafe { BorrowedFd::borrow_raw(fd) }, &mut buf).unwrap_or_else(|e| {
        log::warn!("syscall 6 (read) failed: {e}");
        0
    });
    buf.truncate(n);
    let text = String::from_utf8_lossy(&buf).into_owned();
    Ok(StackVal::Obj(Object::new_string(text)))
}

fn write_fd(frame: &mut Frame) -> Result<StackVal, ChipError> {
    let fd_obj = frame.pop_obj()?;
    let data_obj = frame.pop_obj()?;
    let length_obj = frame.pop_obj()?;
    let fd = fd_of(&fd_obj, 7)?;
    let data = expect_displayable(&data_obj, 7)?;
    let length = match length_obj.as_scalar().as_deref() {
        Some(Scalar::Num(n)) => (*n as usize).min(data.len()),
        _ => {
            return Err(ChipError::SyscallArgType {
                syscall: 7,
                expected: "Number (length)",
            })
        }
    };
    let written = unistd::write(unsafe { BorrowedFd::borrow_raw(fd) }, &data.as_bytes()[..length])
        .unwrap_or_else(|e| {
            log::warn!("syscall 7 (write) failed: {e}");
            0
        });
    Ok(StackVal::Obj(Object::new_number(written as f64)))
}

fn close_fd(frame: &mut Frame, interp: &Interpreter) -> Result<StackVal, ChipError> {
    let fd_obj = frame.pop_obj()?;
    let fd = fd_of(&fd_obj, 8)?;
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    drop(owned);
    Ok(StackVal::Obj(interp.empty_return.clone()))
}

fn sleep_seconds(frame: &mut Frame, interp: &Interpreter) -> Result<StackVal, ChipError> {
    let sec = frame.pop_num()?;
    std::thread::sleep(Duration::from_secs(sec.max(0.0) as u64));
    Ok(StackVal::Obj(interp.empty_return.clone()))
}

fn strlen(frame: &mut Frame) -> Result<StackVal, ChipError> {
    let s = expect_string(&frame.pop_obj()?, 11)?;
    Ok(StackVal::Obj(Object::new_number(s.len() as f64)))
}

fn char_at(frame: &mut Frame) -> Result<StackVal, ChipError> {
    let s_obj = frame.pop_obj()?;
    let index_obj = frame.pop_obj()?;
    let s = expect_string(&s_obj, 12)?;
    let index = match index_obj.as_scalar().as_deref() {
        Some(Scalar::Num(n)) => *n as i64,
        _ => {
            return Err(ChipError::SyscallArgType {
                syscall: 12,
                expected: "Number (index)",
            })
        }
    };
    let byte = (index >= 0 && (index as usize) < s.len())
        .then(|| s.as_bytes()[index as usize])
        .ok_or(ChipError::ArrayIndexOutOfBounds {
            index,
            len: s.len(),
        })?;
    Ok(StackVal::Obj(Object::new_number(byte as f64)))
}
