//! CLI commands

pub mod disasm;
pub mod repl;
pub mod run;

use ghost_runtime::{Diagnostic, RuntimeError};
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Pick a color mode, respecting NO_COLOR (https://no-color.org)
fn color_choice() -> ColorChoice {
    if std::env::var("NO_COLOR").is_ok() {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

/// Print compile diagnostics to stderr, colored or as JSON lines
pub fn print_diagnostics(diagnostics: &[Diagnostic], json: bool) {
    if json {
        for diagnostic in diagnostics {
            if let Ok(line) = diagnostic.to_json_string() {
                eprintln!("{}", line);
            }
        }
        return;
    }
    let mut stderr = StandardStream::stderr(color_choice());
    for diagnostic in diagnostics {
        let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
        let _ = writeln!(stderr, "{}", diagnostic);
    }
    let _ = stderr.reset();
}

/// Print a runtime error and its stack trace to stderr
pub fn print_runtime_error(error: &RuntimeError) {
    let mut stderr = StandardStream::stderr(color_choice());
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
    let _ = writeln!(stderr, "{}", error.message);
    let _ = stderr.reset();
    for line in &error.trace {
        eprintln!("{}", line);
    }
}
