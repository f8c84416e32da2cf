//! Ghost command-line interface
//!
//! `ghost run <file>` executes a script (plain `ghost <file>` works too),
//! `ghost repl` starts an interactive session, and `ghost disasm <file>`
//! dumps compiled bytecode. Exit codes: 0 on success, 65 for compile
//! errors, 70 for runtime errors, 74 for host I/O failures.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ghost", version, about = "The Ghost programming language")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Script file to execute (shorthand for `ghost run <file>`)
    file: Option<PathBuf>,

    /// Emit diagnostics as JSON, one object per line
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a script file
    Run {
        /// Script file to execute
        file: PathBuf,
    },
    /// Start an interactive session
    Repl,
    /// Compile a file and print its bytecode
    Disasm {
        /// Script file to compile
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Some(Command::Run { file }) => commands::run::run(&file, cli.json),
        Some(Command::Repl) => commands::repl::repl(),
        Some(Command::Disasm { file }) => commands::disasm::disasm(&file, cli.json),
        None => match cli.file {
            Some(file) => commands::run::run(&file, cli.json),
            None => commands::repl::repl(),
        },
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            eprintln!("ghost: {:#}", error);
            ExitCode::from(74)
        }
    }
}
