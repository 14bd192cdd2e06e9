//! End-to-end tests: hand-assemble a Chip image exactly to the binary
//! layout `spec.md` §4.1/§6 describes, then drive it through the real
//! loader and VM rather than constructing a `Program` in memory.

use chip::image::parse_image;
use chip::vm::{Interpreter, StackVal};

const OP_LOAD_VAR: u8 = 0;
const OP_STORE_VAR: u8 = 1;
const OP_ADD: u8 = 6;
const OP_LOAD_NUMBER: u8 = 12;
const OP_LOAD_CONST: u8 = 13;
const OP_LOAD_MEMBER: u8 = 14;
const OP_CALL: u8 = 16;
const OP_SYSCALL: u8 = 17;
const OP_NEWARRAY: u8 = 19;
const OP_LOAD_ARRAY: u8 = 20;
const OP_STORE_ARRAY: u8 = 21;
const OP_JMPIFT: u8 = 22;
const OP_JMP: u8 = 23;
const OP_RET: u8 = 24;

struct MethodDef {
    name_idx: u16,
    ops: Vec<(u8, f64)>,
}

struct ClassDef {
    name_idx: u16,
    methods: Vec<MethodDef>,
}

/// Hand-assemble an image byte-for-byte per `spec.md`'s binary contract:
/// magic(8), program_length:u32, program section, a 4-byte footer field
/// (unused by this engine), constant_count:u32, then length-prefixed
/// constant bytes.
fn assemble_image(constants: &[&str], classes: &[ClassDef]) -> Vec<u8> {
    let mut prog = Vec::new();
    prog.extend_from_slice(&(classes.len() as u32).to_le_bytes());
    for class in classes {
        prog.extend_from_slice(&(class.methods.len() as u16).to_le_bytes());
        prog.extend_from_slice(&class.name_idx.to_le_bytes());
        for method in &class.methods {
            prog.extend_from_slice(&(method.ops.len() as u16).to_le_bytes());
            prog.extend_from_slice(&method.name_idx.to_le_bytes());
            for (opcode, operand) in &method.ops {
                prog.push(*opcode);
                prog.extend_from_slice(&operand.to_le_bytes());
            }
        }
    }

    let mut image = Vec::new();
    image.extend_from_slice(b"CHIPIMG0");
    image.extend_from_slice(&(prog.len() as u32).to_le_bytes());
    image.extend_from_slice(&prog);
    image.extend_from_slice(&0u32.to_le_bytes()); // footer field, unread

    image.extend_from_slice(&(constants.len() as u32).to_le_bytes());
    for c in constants {
        image.extend_from_slice(&(c.len() as u32).to_le_bytes());
        image.extend_from_slice(c.as_bytes());
    }
    image
}

#[test]
fn arithmetic_entry_point() {
    // constants: 0="Main", 1="main"
    let image = assemble_image(
        &["Main", "main"],
        &[ClassDef {
            name_idx: 0,
            methods: vec![MethodDef {
                name_idx: 1,
                ops: vec![
                    (OP_LOAD_NUMBER, 2.0),
                    (OP_LOAD_NUMBER, 3.0),
                    (OP_ADD, 0.0),
                    (OP_RET, 0.0),
                ],
            }],
        }],
    );

    let (_pool, program) = parse_image(&image).expect("image decodes");
    let interp = Interpreter::new(program).expect("interpreter starts");
    interp.run().expect("Main.main runs to completion");
}

#[test]
fn method_dispatch_across_classes() {
    // constants: 0="Main", 1="main", 2="Worker", 3="work"
    let image = assemble_image(
        &["Main", "main", "Worker", "work"],
        &[
            ClassDef {
                name_idx: 0,
                methods: vec![MethodDef {
                    name_idx: 1,
                    ops: vec![
                        (OP_LOAD_VAR, 2.0),
                        (OP_LOAD_MEMBER, 3.0),
                        (OP_CALL, 0.0),
                        (OP_RET, 0.0),
                    ],
                }],
            },
            ClassDef {
                name_idx: 2,
                methods: vec![MethodDef {
                    name_idx: 3,
                    ops: vec![(OP_LOAD_NUMBER, 9.0), (OP_RET, 0.0)],
                }],
            },
        ],
    );

    let (_pool, program) = parse_image(&image).expect("image decodes");
    let interp = Interpreter::new(program).expect("interpreter starts");
    interp.run().expect("Main.main runs to completion");
}

#[test]
fn jump_skips_dead_branch() {
    // 1-based instruction numbers in the image: 1:LOAD_NUMBER 1,
    // 2:JMP 4, 3:LOAD_NUMBER 999, 4:RET. `spec.md` §4.4 has the loader
    // resolve jump targets to 1-based instruction numbers directly in
    // the operand.
    let image = assemble_image(
        &["Main", "main"],
        &[ClassDef {
            name_idx: 0,
            methods: vec![MethodDef {
                name_idx: 1,
                ops: vec![
                    (OP_LOAD_NUMBER, 1.0),
                    (OP_JMP, 4.0),
                    (OP_LOAD_NUMBER, 999.0),
                    (OP_RET, 0.0),
                ],
            }],
        }],
    );

    let (_pool, program) = parse_image(&image).expect("image decodes");
    let interp = Interpreter::new(program).expect("interpreter starts");
    interp.run().expect("Main.main runs to completion");
}

#[test]
fn conditional_branch_taken_on_equal_operands() {
    // JMPIFT pops two operands and branches only when they're equal
    // (`spec.md` §6): 1=2 is false here, so the branch falls through to
    // the dead LOAD_NUMBER before reaching RET.
    let image = assemble_image(
        &["Main", "main"],
        &[ClassDef {
            name_idx: 0,
            methods: vec![MethodDef {
                name_idx: 1,
                ops: vec![
                    (OP_LOAD_NUMBER, 1.0),
                    (OP_LOAD_NUMBER, 2.0),
                    (OP_JMPIFT, 5.0),
                    (OP_LOAD_NUMBER, 0.0),
                    (OP_RET, 0.0),
                ],
            }],
        }],
    );

    let (_pool, program) = parse_image(&image).expect("image decodes");
    let interp = Interpreter::new(program).expect("interpreter starts");
    interp.run().expect("Main.main runs to completion");
}

#[test]
fn store_var_on_class_name_round_trips_through_global() {
    // constants: 0="Main", 1="main", 2="Widget". STORE_VAR on a name that
    // also names a class must resolve to the global slot, never shadow it
    // with a frame-local (`spec.md` §4.3) — the precise identity check
    // lives in the colocated unit test (`src/vm/tests.rs`), which has
    // access to `Interpreter::globals`; here we only confirm the sequence
    // round-trips without raising a type or scope error.
    let image = assemble_image(
        &["Main", "main", "Widget"],
        &[
            ClassDef {
                name_idx: 0,
                methods: vec![MethodDef {
                    name_idx: 1,
                    ops: vec![
                        (OP_LOAD_VAR, 2.0),
                        (OP_STORE_VAR, 2.0),
                        (OP_LOAD_VAR, 2.0),
                        (OP_RET, 0.0),
                    ],
                }],
            },
            ClassDef {
                name_idx: 2,
                methods: vec![],
            },
        ],
    );

    let (_pool, program) = parse_image(&image).expect("image decodes");
    let interp = Interpreter::new(program).expect("interpreter starts");
    interp.run().expect("Main.main runs to completion");
}

#[test]
fn syscall_echoes_prompt_through_read_line() {
    // Exercises the SYSCALL dispatch path end to end; stdin is empty
    // under `cargo test`, so syscall 0 just returns the empty-string
    // token without blocking.
    let image = assemble_image(
        &["Main", "main", ""],
        &[ClassDef {
            name_idx: 0,
            methods: vec![MethodDef {
                name_idx: 1,
                ops: vec![
                    (OP_LOAD_CONST, 2.0),
                    (OP_LOAD_NUMBER, 0.0),
                    (OP_SYSCALL, 0.0),
                    (OP_RET, 0.0),
                ],
            }],
        }],
    );

    let (_pool, program) = parse_image(&image).expect("image decodes");
    let interp = Interpreter::new(program).expect("interpreter starts");
    interp.run().expect("Main.main runs to completion");
}

#[test]
fn array_round_trips_a_value_at_a_valid_index() {
    // constants: 0="Main", 1="main", 2="Number", 3="arr". STORE_VAR/LOAD_VAR
    // on "arr" keep the array reference around long enough to index it
    // twice (there is no DUP opcode).
    let image = assemble_image(
        &["Main", "main", "Number", "arr"],
        &[ClassDef {
            name_idx: 0,
            methods: vec![MethodDef {
                name_idx: 1,
                ops: vec![
                    (OP_LOAD_NUMBER, 3.0),
                    (OP_NEWARRAY, 2.0),
                    (OP_STORE_VAR, 3.0),
                    (OP_LOAD_NUMBER, 9.0),
                    (OP_LOAD_VAR, 3.0),
                    (OP_LOAD_NUMBER, 1.0),
                    (OP_STORE_ARRAY, 0.0),
                    (OP_LOAD_VAR, 3.0),
                    (OP_LOAD_NUMBER, 1.0),
                    (OP_LOAD_ARRAY, 0.0),
                    (OP_RET, 0.0),
                ],
            }],
        }],
    );

    let (_pool, program) = parse_image(&image).expect("image decodes");
    let interp = Interpreter::new(program).expect("interpreter starts");
    interp.run().expect("array store/load round trip should succeed");
}

#[test]
fn out_of_range_array_index_is_a_runtime_error_not_a_panic() {
    // constants: 0="Main", 1="main", 2="Number". A 2-slot array indexed at
    // 5 must raise ArrayIndexOutOfBounds, not read past the slot vector.
    let image = assemble_image(
        &["Main", "main", "Number"],
        &[ClassDef {
            name_idx: 0,
            methods: vec![MethodDef {
                name_idx: 1,
                ops: vec![
                    (OP_LOAD_NUMBER, 2.0),
                    (OP_NEWARRAY, 2.0),
                    (OP_LOAD_NUMBER, 5.0),
                    (OP_LOAD_ARRAY, 0.0),
                    (OP_RET, 0.0),
                ],
            }],
        }],
    );

    let (_pool, program) = parse_image(&image).expect("image decodes");
    let interp = Interpreter::new(program).expect("interpreter starts");
    assert!(interp.run().is_err());
}

#[test]
fn truncated_image_is_a_load_error() {
    let image = assemble_image(
        &["Main", "main"],
        &[ClassDef {
            name_idx: 0,
            methods: vec![MethodDef {
                name_idx: 1,
                ops: vec![(OP_RET, 0.0)],
            }],
        }],
    );
    let truncated = &image[..image.len() - 4];
    assert!(parse_image(truncated).is_err());
}

#[test]
fn stack_val_truthiness_matches_scalar_rules() {
    assert!(StackVal::Num(1.0).is_truthy());
    assert!(!StackVal::Num(0.0).is_truthy());
}
