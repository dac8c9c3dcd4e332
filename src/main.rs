//! qvickbuild - a small, parallel build automation engine.
//!
//! Usage:
//!   qvickbuild              Build the topmost task of ./qvickbuild
//!   qvickbuild <task>       Build a specific task
//!   qvickbuild -f <path>    Use a different configuration file

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use qvickbuild::{Driver, InputMethod, LogLevel, Setup};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!(
        r#"qvickbuild {} - a small, parallel build automation engine

USAGE:
    qvickbuild [OPTIONS] [TASK]

ARGS:
    TASK                 Task key to build (default: the topmost task)

OPTIONS:
    -f, --file <PATH>    Configuration file (default: ./qvickbuild)
        --stdin          Read the configuration from standard input
    -q, --quiet          Only show quiet-level output
    -v, --verbose        Also show executed command lines
    -n, --dry-run        Resolve and report, but execute nothing
    -h, --help           Show this help message
    -V, --version        Show version

CONFIGURATION:
    name = expression;             Field: a named value
    "key" {{ field... }}             Task: a unit of work
    "key" as it {{ field... }}       Task with a named iterator
    a, b, c                        List
    input : "*.c" -> "*.o"         Wildcard replacement
    "src/*"                        Filesystem glob

TASK FIELDS:
    depends = ...;                 Files or tasks this task depends on
    depends_parallel = true;       Build dependencies in parallel
    run = ...;                     Shell commands to execute
    run_parallel = true;           Execute commands in parallel
    visible = false;               Hide the task from progress output
"#,
        VERSION
    );
}

fn print_version() {
    println!("qvickbuild {}", VERSION);
}

fn parse_args(args: &[String]) -> Result<Option<Setup>, String> {
    let mut setup = Setup::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            "-V" | "--version" => {
                print_version();
                return Ok(None);
            }
            "-f" | "--file" => {
                index += 1;
                let path = args
                    .get(index)
                    .ok_or_else(|| "missing path after --file".to_string())?;
                setup.input_file = PathBuf::from(path);
            }
            "--stdin" => setup.input_method = InputMethod::Stdin,
            "-q" | "--quiet" => setup.log_level = LogLevel::Quiet,
            "-v" | "--verbose" => setup.log_level = LogLevel::Verbose,
            "-n" | "--dry-run" => setup.dry_run = true,
            flag if flag.starts_with('-') => {
                return Err(format!("unknown option: {}", flag));
            }
            task => {
                if setup.task.is_some() {
                    return Err(format!("more than one task given: {}", task));
                }
                setup.task = Some(task.to_string());
            }
        }
        index += 1;
    }
    Ok(Some(setup))
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    match parse_args(&args) {
        Ok(Some(setup)) => {
            let code = Driver::new(setup).run();
            ExitCode::from(code as u8)
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {}", message);
            eprintln!("try 'qvickbuild --help'");
            ExitCode::FAILURE
        }
    }
}
