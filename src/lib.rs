//! Chip bytecode execution engine: image loader, stack VM, and syscall
//! gate (`spec.md`). Exposed as a library as well as a binary so
//! integration tests can drive [`run_file`] and the individual modules
//! directly against in-memory images.

pub mod error;
pub mod image;
pub mod object;
pub mod scope;
pub mod vm;

use std::fs;

use vm::Interpreter;

/// Load a Chip bytecode image from `path` and run it to completion
/// (`spec.md` §4.1, §6): parse, seed the global scope, resolve and
/// invoke `Main.main`.
pub fn run_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    // SIGPIPE ignored process-wide so a write to a closed peer socket
    // (syscall 7) surfaces as a short write rather than killing the
    // process (`spec.md` §4.6).
    unsafe {
        nix::sys::signal::signal(nix::sys::signal::Signal::SIGPIPE, nix::sys::signal::SigHandler::SigIgn)?;
    }

    let bytes = fs::read(path).map_err(|e| error::LoadError::Io(e.to_string()))?;
    let (_pool, program) = image::parse_image(&bytes)?;
    log::debug!("loaded image {}", path);
    let interp = Interpreter::new(program)?;
    interp.run()?;
    Ok(())
}
