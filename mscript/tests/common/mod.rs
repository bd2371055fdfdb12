//! Shared helpers for integration tests.
// These utilities are consumed selectively by several test targets; keep
// them available without requiring every helper in every target.
#![allow(dead_code)]

use mscript::{Program, Runtime, Val, Vm};

pub const MAIN: &str = "tests.mscript";

/// Load a single source file as `tests.mscript`.
pub fn load(source: &str) -> Runtime {
    Runtime::from_sources(&[(MAIN, source)])
}

/// The loaded program, asserting the whole pipeline succeeded.
pub fn loaded_program(runtime: &Runtime) -> &Program {
    let program = runtime.program(MAIN).expect("program missing");
    if let Some(error) = program.error() {
        panic!("load failed: {}", error);
    }
    program
}

/// Run one function and read an int result from the stack.
pub fn run_i32(source: &str, function: &str, args: &[Val]) -> i32 {
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    vm.run(function, args).expect("run failed");
    vm.stack_i32(0)
}

/// Run one function and read a float result from the stack.
pub fn run_f32(source: &str, function: &str, args: &[Val]) -> f32 {
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    vm.run(function, args).expect("run failed");
    vm.stack_f32(0)
}

/// The first load error of a single-file runtime.
pub fn load_error(source: &str) -> mscript::Error {
    let runtime = load(source);
    runtime
        .program(MAIN)
        .expect("program missing")
        .error()
        .cloned()
        .expect("expected a load error")
}
