//! Chip bytecode engine entry point.
//!
//! `chip <image-file>`: exactly one positional argument, no flags
//! (`spec.md` §6). Exit 0 on a clean `Main.main` return, exit 1 with a
//! single-line message on any fatal load or interpreter error.
//!
//! The actual loader/VM wiring lives in the library target (`src/lib.rs`)
//! so `tests/` can drive it directly against in-memory images without
//! spawning this binary.

fn usage() -> &'static str {
    "usage: chip <image-file>"
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = match (args.next(), args.next()) {
        (Some(path), None) => path,
        _ => {
            println!("{}", usage());
            std::process::exit(1);
        }
    };

    if let Err(e) = chip::run_file(&path) {
        println!("{}", e);
        std::process::exit(1);
    }
}
