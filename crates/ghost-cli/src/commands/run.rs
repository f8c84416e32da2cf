//! Run command - execute Ghost source files

use anyhow::{Context, Result};
use ghost_runtime::{InterpretError, Vm};
use std::fs;
use std::path::Path;

/// Execute a Ghost source file
///
/// Exit code 0 on success, 65 on compile errors, 70 on runtime errors.
pub fn run(path: &Path, json: bool) -> Result<u8> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read source file: {}", path.display()))?;

    let mut vm = Vm::new();
    match vm.interpret(&source) {
        Ok(()) => Ok(0),
        Err(InterpretError::Compile(diagnostics)) => {
            super::print_diagnostics(&diagnostics, json);
            Ok(65)
        }
        Err(InterpretError::Runtime(error)) => {
            super::print_runtime_error(&error);
            Ok(70)
        }
    }
}
