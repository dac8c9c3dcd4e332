//! The driver: engine assembly, configuration input, the build run and
//! the final error unwinding.

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use console::style;

use crate::cli::{Cli, LogLevel};
use crate::errors::{BuildError, BuildResult, Diagnostics};
use crate::eval::{Interpreter, InterpreterOptions};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::pipeline::Pipeline;

/// The engine context: the pipeline, the log boundary and the shared
/// diagnostic state. Constructed by the driver and threaded through the
/// interpreter and every job.
pub struct Engine {
    pub pipeline: Arc<Pipeline>,
    pub cli: Arc<Cli>,
    pub diags: Arc<Diagnostics>,
}

impl Engine {
    pub fn new(log_level: LogLevel, threads: usize) -> Arc<Engine> {
        Arc::new(Engine {
            pipeline: Pipeline::new(threads),
            cli: Arc::new(Cli::new(log_level)),
            diags: Arc::new(Diagnostics::new()),
        })
    }
}

/// Where the configuration bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMethod {
    ConfigFile,
    Stdin,
}

/// Options required to run the driver.
#[derive(Debug, Clone)]
pub struct Setup {
    /// Explicit task key; the topmost task is built when absent.
    pub task: Option<String>,
    pub input_method: InputMethod,
    /// Only used with `InputMethod::ConfigFile`.
    pub input_file: PathBuf,
    pub log_level: LogLevel,
    pub dry_run: bool,
    /// Directory globbing and timestamp lookups resolve against.
    pub workdir: PathBuf,
}

impl Default for Setup {
    fn default() -> Self {
        Setup {
            task: None,
            input_method: InputMethod::ConfigFile,
            input_file: PathBuf::from("./qvickbuild"),
            log_level: LogLevel::Standard,
            dry_run: false,
            workdir: PathBuf::from("."),
        }
    }
}

/// Interface for running a build end to end.
pub struct Driver {
    setup: Setup,
}

impl Driver {
    pub fn new(setup: Setup) -> Self {
        Driver { setup }
    }

    /// Run the build. Returns the process exit code: `0` on success,
    /// `1` on any unrecovered error.
    pub fn run(&self) -> i32 {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let engine = Engine::new(self.setup.log_level, threads);

        // the configuration lives outside the fallible path so the error
        // renderer can excerpt it during unwinding.
        let mut config = String::new();
        let outcome = self.execute(&engine, &mut config);

        let code = match outcome {
            Ok(()) => 0,
            Err(_) => {
                self.unwind_errors(&engine, &config);
                1
            }
        };
        engine.pipeline.stop_sync();
        code
    }

    fn execute(&self, engine: &Arc<Engine>, config: &mut String) -> BuildResult<()> {
        *config = self.read_config(engine)?;
        let tokens = Lexer::new(config, &engine.diags).token_stream()?;
        let ast = Parser::new(tokens, &engine.diags).parse()?;
        let interpreter = Interpreter::new(
            engine.clone(),
            ast,
            InterpreterOptions {
                task: self.setup.task.clone(),
                dry_run: self.setup.dry_run,
                workdir: self.setup.workdir.clone(),
            },
        );
        interpreter.build()
    }

    fn read_config(&self, engine: &Arc<Engine>) -> BuildResult<String> {
        match self.setup.input_method {
            InputMethod::ConfigFile => fs::read_to_string(&self.setup.input_file).map_err(|_| {
                engine.diags.halt(BuildError::InvalidInputFile {
                    path: self.setup.input_file.display().to_string(),
                })
            }),
            InputMethod::Stdin => {
                let mut all = String::new();
                match std::io::stdin().read_to_string(&mut all) {
                    Ok(_) => Ok(all),
                    Err(_) => Err(engine.diags.halt(BuildError::InvalidInputFile {
                        path: "<stdin>".to_string(),
                    })),
                }
            }
        }
    }

    /// Render every collected error with its context frames. When more
    /// than one thread contributed, each report is prefixed with a short
    /// thread identifier.
    fn unwind_errors(&self, engine: &Arc<Engine>, config: &str) {
        let reports = engine.diags.reports();
        let tag_threads = reports.len() > 1;
        let bar = format!("{}", style("│").red());

        for report in reports {
            let rendered = prefix_continuations(&report.error.render(config), &format!("{} ", bar));
            let thread_prefix = if tag_threads {
                format!(
                    "{} ",
                    style(format!("«thread {}»", report.thread_ordinal))
                        .red()
                        .bold()
                )
            } else {
                String::new()
            };
            engine
                .cli
                .write_to_suffix(&format!("{}{}", thread_prefix, rendered));

            if !report.frames.is_empty() {
                engine.cli.write_to_suffix(&bar);
            }
            for frame in &report.frames {
                engine.cli.write_to_suffix(&format!(
                    "{}  {} while {}",
                    bar,
                    style("note:").dim(),
                    frame.render(config)
                ));
            }
            engine
                .cli
                .write_to_suffix(&format!("{}", style("╰ end.").red()));
        }
    }
}

/// Insert `prefix` after every newline so continuation lines share the
/// report gutter.
fn prefix_continuations(view: &str, prefix: &str) -> String {
    let mut out = String::with_capacity(view.len());
    for c in view.chars() {
        out.push(c);
        if c == '\n' {
            out.push_str(prefix);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_config(dir: &std::path::Path, contents: &str) -> PathBuf {
        let path = dir.join("qvickbuild");
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn setup_for(dir: &std::path::Path, contents: &str) -> Setup {
        Setup {
            input_file: write_config(dir, contents),
            workdir: dir.to_path_buf(),
            log_level: LogLevel::Quiet,
            ..Setup::default()
        }
    }

    #[test]
    fn missing_config_file_fails() {
        let setup = Setup {
            input_file: PathBuf::from("/nonexistent/qvickbuild"),
            log_level: LogLevel::Quiet,
            ..Setup::default()
        };
        assert_eq!(Driver::new(setup).run(), 1);
    }

    #[test]
    fn trivial_build_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let config = format!("\"all\" {{ run = \"touch {}\"; }}\n", marker.display());
        let setup = setup_for(dir.path(), &config);
        assert_eq!(Driver::new(setup).run(), 0);
        assert!(marker.exists());
    }

    #[test]
    fn failing_command_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let setup = setup_for(dir.path(), "\"all\" { run = \"exit 4\"; }\n");
        assert_eq!(Driver::new(setup).run(), 1);
    }

    #[test]
    fn explicit_unknown_task_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut setup = setup_for(dir.path(), "\"all\" { }\n");
        setup.task = Some("missing".into());
        assert_eq!(Driver::new(setup).run(), 1);
    }

    #[test]
    fn dry_run_executes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let config = format!("\"all\" {{ run = \"touch {}\"; }}\n", marker.display());
        let mut setup = setup_for(dir.path(), &config);
        setup.dry_run = true;
        assert_eq!(Driver::new(setup).run(), 0);
        assert!(!marker.exists());
    }

    #[test]
    fn syntax_error_fails_with_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let setup = setup_for(dir.path(), "broken =\n");
        assert_eq!(Driver::new(setup).run(), 1);
    }

    #[test]
    fn prefix_continuations_inserts_gutter() {
        assert_eq!(prefix_continuations("a\nb\nc", "| "), "a\n| b\n| c");
    }
}
