use std::rc::Rc;

use pretty_assertions::assert_eq;

use crate::image::{Class, Instr, Method, Program};
use crate::object::Scalar;

use super::{Interpreter, StackVal};

fn single_method_program(class: &str, method: &str, code: Vec<Instr>) -> Program {
    Program {
        classes: vec![Class {
            name: class.to_string(),
            methods: vec![Rc::new(Method {
                name: method.to_string(),
                code,
            })],
        }],
    }
}

fn run_main(code: Vec<Instr>) -> StackVal {
    let program = single_method_program("Main", "main", code);
    let interp = Interpreter::new(program).expect("interpreter setup");
    let method = interp
        .program
        .get_class("Main")
        .and_then(|c| c.get_method("main"))
        .cloned()
        .unwrap();
    interp.call_method(method, None, Vec::new()).unwrap()
}

fn num(v: &StackVal) -> f64 {
    match v {
        StackVal::Num(n) => *n,
        StackVal::Obj(o) => match o.as_scalar().as_deref() {
            Some(Scalar::Num(n)) => *n,
            _ => panic!("expected a numeric result"),
        },
    }
}

#[test]
fn arithmetic_return() {
    let result = run_main(vec![
        Instr::LoadNumber(2.0),
        Instr::LoadNumber(3.0),
        Instr::Add,
        Instr::Ret,
    ]);
    assert_eq!(num(&result), 5.0);
}

#[test]
fn string_constant_length() {
    let result = run_main(vec![
        Instr::LoadConst(0, b"hello".to_vec()),
        Instr::LoadMember("count".to_string()),
        Instr::Ret,
    ]);
    assert_eq!(num(&result), 5.0);
}

#[test]
fn method_dispatch() {
    let program = Program {
        classes: vec![
            Class {
                name: "Main".to_string(),
                methods: vec![Rc::new(Method {
                    name: "main".to_string(),
                    code: vec![
                        Instr::LoadVar("C".to_string()),
                        Instr::LoadMember("f".to_string()),
                        Instr::Call(0),
                        Instr::Ret,
                    ],
                })],
            },
            Class {
                name: "C".to_string(),
                methods: vec![Rc::new(Method {
                    name: "f".to_string(),
                    code: vec![Instr::LoadNumber(7.0), Instr::Ret],
                })],
            },
        ],
    };
    let interp = Interpreter::new(program).unwrap();
    let result = interp.run();
    assert!(result.is_ok());

    let method = interp
        .program
        .get_class("Main")
        .and_then(|c| c.get_method("main"))
        .cloned()
        .unwrap();
    let result = interp.call_method(method, None, Vec::new()).unwrap();
    assert_eq!(num(&result), 7.0);
}

#[test]
fn jump_target_semantics() {
    // 1-based instruction numbers: 1:LOAD_NUMBER 1, 2:JMP 4, 3:LOAD_NUMBER
    // 999, 4:RET — parse_image would pre-resolve `JMP 4` to target index 3
    // (0-based); we do the same translation by hand here.
    let result = run_main(vec![
        Instr::LoadNumber(1.0),
        Instr::Jmp(3),
        Instr::LoadNumber(999.0),
        Instr::Ret,
    ]);
    assert_eq!(num(&result), 1.0);
}

#[test]
fn constant_caching_by_index() {
    // Two LOAD_CONST on the same pool index must hand back the identical
    // `Rc` both times, never two freshly-built char arrays (`spec.md` §3:
    // "cached by constant index").
    let mut frame = super::Frame::new(
        Rc::new(Method {
            name: "scratch".to_string(),
            code: Vec::new(),
        }),
        None,
        Vec::new(),
    );
    let program = single_method_program("Main", "main", Vec::new());
    let interp = Interpreter::new(program).unwrap();

    super::ops_object::load_const(&interp, &mut frame, 0, b"x").unwrap();
    super::ops_object::load_const(&interp, &mut frame, 0, b"x").unwrap();
    let second = frame.pop_obj().unwrap();
    let first = frame.pop_obj().unwrap();
    assert!(Rc::ptr_eq(&first, &second));
}

#[test]
fn scope_precedence_global_shadows_local_store() {
    // STORE_VAR on a name that also names a class must mutate the global
    // singleton, never create a frame-local (`spec.md` §4.3, §8).
    let program = Program {
        classes: vec![
            Class {
                name: "Main".to_string(),
                methods: vec![Rc::new(Method {
                    name: "main".to_string(),
                    code: vec![
                        Instr::New("Widget".to_string()),
                        Instr::StoreVar("Widget".to_string()),
                        Instr::LoadVar("Widget".to_string()),
                        Instr::Ret,
                    ],
                })],
            },
            Class {
                name: "Widget".to_string(),
                methods: vec![],
            },
        ],
    };
    let interp = Interpreter::new(program).unwrap();
    let original_global = interp.globals.borrow().get("Widget").unwrap();
    let method = interp
        .program
        .get_class("Main")
        .and_then(|c| c.get_method("main"))
        .cloned()
        .unwrap();
    let result = interp.call_method(method, None, Vec::new()).unwrap();
    let new_global = interp.globals.borrow().get("Widget").unwrap();
    assert!(!Rc::ptr_eq(&original_global, &new_global));
    match result {
        StackVal::Obj(o) => assert!(Rc::ptr_eq(&o, &new_global)),
        StackVal::Num(_) => panic!("expected an object"),
    }
}

#[test]
fn array_store_then_load_round_trips_a_valid_index() {
    let result = run_main(vec![
        Instr::LoadNumber(3.0),
        Instr::NewArray("Number".to_string()),
        Instr::StoreVar("arr".to_string()),
        Instr::LoadNumber(9.0),
        Instr::LoadVar("arr".to_string()),
        Instr::LoadNumber(1.0),
        Instr::StoreArray,
        Instr::LoadVar("arr".to_string()),
        Instr::LoadNumber(1.0),
        Instr::LoadArray,
        Instr::Ret,
    ]);
    assert_eq!(num(&result), 9.0);
}

#[test]
fn load_array_out_of_bounds_is_an_error_not_a_panic() {
    let program = single_method_program(
        "Main",
        "main",
        vec![
            Instr::LoadNumber(2.0),
            Instr::NewArray("Number".to_string()),
            Instr::LoadNumber(5.0),
            Instr::LoadArray,
            Instr::Ret,
        ],
    );
    let interp = Interpreter::new(program).expect("interpreter setup");
    let method = interp
        .program
        .get_class("Main")
        .and_then(|c| c.get_method("main"))
        .cloned()
        .unwrap();
    let result = interp.call_method(method, None, Vec::new());
    assert!(matches!(
        result,
        Err(crate::error::ChipError::ArrayIndexOutOfBounds { index: 5, len: 2 })
    ));
}

#[test]
fn store_array_out_of_bounds_is_an_error_not_a_panic() {
    let program = single_method_program(
        "Main",
        "main",
        vec![
            Instr::LoadNumber(2.0),
            Instr::NewArray("Number".to_string()),
            Instr::StoreVar("arr".to_string()),
            Instr::LoadNumber(1.0),
            Instr::LoadVar("arr".to_string()),
            Instr::LoadNumber(9.0),
            Instr::StoreArray,
            Instr::Ret,
        ],
    );
    let interp = Interpreter::new(program).expect("interpreter setup");
    let method = interp
        .program
        .get_class("Main")
        .and_then(|c| c.get_method("main"))
        .cloned()
        .unwrap();
    let result = interp.call_method(method, None, Vec::new());
    assert!(matches!(
        result,
        Err(crate::error::ChipError::ArrayIndexOutOfBounds { index: 9, len: 2 })
    ));
}

#[test]
fn empty_argument_call() {
    let program = Program {
        classes: vec![Class {
            name: "Main".to_string(),
            methods: vec![Rc::new(Method {
                name: "main".to_string(),
                code: vec![Instr::LoadVar("Main".to_string()), Instr::LoadMember("main".to_string())],
            })],
        }],
    };
    // OP_CALL 0 pops only the callee; constructing one here just exercises
    // the zero-arg path through `ops_control::call` directly.
    let interp = Interpreter::new(program).unwrap();
    let main_singleton = interp.globals.borrow().get("Main").unwrap();
    let callee = main_singleton
        .fields()
        .unwrap()
        .borrow()
        .get("main")
        .unwrap();
    let mut frame = super::Frame::new(
        Rc::new(Method {
            name: "scratch".to_string(),
            code: Vec::new(),
        }),
        None,
        Vec::new(),
    );
    frame.push(StackVal::Obj(callee)).unwrap();
    let result = super::ops_control::call(&interp, &mut frame, 0);
    assert!(result.is_ok());
}
