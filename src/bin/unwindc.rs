//! Scope script compiler driver.
//!
//! Lowers a scope script to IR and prints it, optionally checking the
//! output against the script's own CHECK directives.

use bumpalo::Bump;
use clap::Parser;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use unwindgen::core::CompilationSession;
use unwindgen::script::{compile_script, CompileOptions, TestRunner, TestSpec};

#[derive(Parser)]
#[command(name = "unwindc")]
#[command(about = "Lower scope scripts to IR with cleanups and landing pads.", long_about = None)]
struct Cli {
    /// Input script; reads stdin when omitted.
    input: Option<PathBuf>,

    /// Print the lowered module (default).
    #[arg(long)]
    print_ir: bool,

    /// Print compilation statistics.
    #[arg(long)]
    stats: bool,

    /// Disable normal-path cleanup emission in the backend.
    #[arg(long)]
    suppress_cleanups: bool,

    /// Run the script's RUN/CHECK directives instead of printing.
    #[arg(long)]
    check: bool,

    /// Raise the log level (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn read_input(input: Option<&PathBuf>) -> io::Result<(String, String)> {
    match input {
        Some(path) => Ok((
            fs::read_to_string(path)?,
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("module")
                .to_string(),
        )),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok((buffer, "stdin".to_string()))
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let (source, module_name) = match read_input(cli.input.as_ref()) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        let spec = TestSpec::parse(&source);
        let runner = TestRunner::new(cli.verbose > 0);
        return match runner.run_test(&spec) {
            Ok(()) => {
                println!("PASS");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("FAIL: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let options = CompileOptions {
        suppress_cleanups: cli.suppress_cleanups,
    };

    // The module borrows the arena; drop it before `session` and `arena`.
    let code = match compile_script(&session, &module_name, &source, options) {
        Ok(module) => {
            if cli.print_ir || !cli.stats {
                print!("{}", module);
            }
            if cli.stats {
                print!("{}", session.stats());
                println!("  Arena bytes: {}", session.arena_bytes());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    };
    code
}
