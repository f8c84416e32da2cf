//! Disasm command - compile a file and print its bytecode

use anyhow::{Context, Result};
use ghost_runtime::{disassemble, Obj, Value, Vm};
use std::fs;
use std::path::Path;

/// Compile a Ghost source file and print every function's bytecode
pub fn disasm(path: &Path, json: bool) -> Result<u8> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read source file: {}", path.display()))?;

    let mut vm = Vm::new();
    let script = match vm.compile(&source) {
        Ok(script) => script,
        Err(diagnostics) => {
            super::print_diagnostics(&diagnostics, json);
            return Ok(65);
        }
    };

    // Walk the function graph: every nested function sits in some chunk's
    // constant pool.
    let heap = vm.heap();
    let mut pending = vec![script];
    while let Some(r) = pending.pop() {
        let function = heap.function(r);
        let name = match function.name {
            Some(name) => heap.string(name).text.clone(),
            None => "<script>".to_string(),
        };
        print!("{}", disassemble(&function.chunk, &name, heap));
        println!();
        for constant in &function.chunk.constants {
            if let Value::Obj(nested) = constant {
                if matches!(heap.get(*nested), Obj::Function(_)) {
                    pending.push(*nested);
                }
            }
        }
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disasm_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "function add(a, b) {{ return a + b; }}").unwrap();
        let code = disasm(file.path(), false).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn test_disasm_compile_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "function {{").unwrap();
        let code = disasm(file.path(), false).unwrap();
        assert_eq!(code, 65);
    }
}
