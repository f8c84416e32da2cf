//! Shared test helpers

use ghost_runtime::{Diagnostic, InterpretError, RuntimeError, Vm};
use std::cell::RefCell;
use std::rc::Rc;

/// Run `source` on a fresh VM, capturing `print` output
#[allow(dead_code)]
pub fn run(source: &str) -> Result<String, InterpretError> {
    let buffer: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let mut vm = Vm::new();
    vm.set_output_writer(buffer.clone());
    let result = vm.interpret(source);
    let output = String::from_utf8(buffer.borrow().clone()).expect("print output is UTF-8");
    result.map(|()| output)
}

/// Run `source`, expecting success; returns captured stdout
#[allow(dead_code)]
pub fn run_ok(source: &str) -> String {
    match run(source) {
        Ok(output) => output,
        Err(InterpretError::Compile(diagnostics)) => {
            panic!("expected success, got compile errors: {:?}", diagnostics)
        }
        Err(InterpretError::Runtime(error)) => {
            panic!("expected success, got runtime error: {}", error.message)
        }
    }
}

/// Run `source`, expecting a runtime error
#[allow(dead_code)]
pub fn run_err(source: &str) -> RuntimeError {
    match run(source) {
        Err(InterpretError::Runtime(error)) => error,
        Ok(output) => panic!("expected runtime error, got output: {:?}", output),
        Err(InterpretError::Compile(diagnostics)) => {
            panic!("expected runtime error, got compile errors: {:?}", diagnostics)
        }
    }
}

/// Compile `source`, expecting compile errors
#[allow(dead_code)]
pub fn compile_err(source: &str) -> Vec<Diagnostic> {
    match run(source) {
        Err(InterpretError::Compile(diagnostics)) => diagnostics,
        Ok(output) => panic!("expected compile errors, got output: {:?}", output),
        Err(InterpretError::Runtime(error)) => {
            panic!("expected compile errors, got runtime error: {}", error.message)
        }
    }
}
