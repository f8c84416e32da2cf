//! Interactive session
//!
//! One VM persists across lines, so globals defined earlier stay visible.
//! Errors are printed without ending the session.

use anyhow::Result;
use ghost_runtime::{InterpretError, Vm, VERSION};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;

pub fn repl() -> Result<u8> {
    println!("Ghost {} (Ctrl-D to exit)", VERSION);

    let mut vm = Vm::new();
    let mut editor = DefaultEditor::new()?;
    let history = history_path();
    if let Some(path) = &history {
        let _ = editor.load_history(path);
    }

    loop {
        match editor.readline("ghost> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);
                match vm.interpret(&line) {
                    Ok(()) => {}
                    Err(InterpretError::Compile(diagnostics)) => {
                        super::print_diagnostics(&diagnostics, false);
                    }
                    Err(InterpretError::Runtime(error)) => {
                        super::print_runtime_error(&error);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(error) => return Err(error.into()),
        }
    }

    if let Some(path) = &history {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = editor.save_history(path);
    }
    Ok(0)
}

fn history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("ghost").join("history.txt"))
}
