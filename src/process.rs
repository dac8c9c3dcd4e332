//! The process-capture layer.
//!
//! The primary path allocates a pseudoterminal whose winsize and termios
//! are cloned from the controlling terminal, reparents the child onto the
//! PTY slave and execs `/bin/sh -c <cmdline>`; the parent reads the
//! master side in non-blocking chunks and forwards each chunk to the log
//! buffer until the child exits. When PTY setup fails the engine falls
//! back to a plain pipe+exec path. UNIX only.

use std::ffi::CString;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsRawFd, OwnedFd};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use console::style;
use nix::pty::openpty;
use nix::sys::termios::tcgetattr;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execv, fork, ForkResult, Pid};

use crate::cli::{EntryHandle, EntryStatus};
use crate::driver::Engine;
use crate::errors::BuildError;
use crate::pipeline::{JobState, PipelineJob};
use crate::tracking::Reference;

/// How far along the captured process is after one read step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    DataRead,
    ExitSuccess,
    ExitFailure,
    InternalError,
}

/// PTY allocation or fork failed; the caller decides whether to fall
/// back or report.
#[derive(Debug, Clone, Copy)]
pub struct DispatchError;

/// A dispatched subprocess whose output can be drained chunk by chunk.
pub trait ProcessCapture {
    fn read_output(&mut self, out: &mut String) -> ReadStatus;
}

/// Pump a process to completion, handing every chunk to `sink`.
pub fn capture<P: ProcessCapture>(process: &mut P, mut sink: impl FnMut(&str)) -> ReadStatus {
    let mut buffer = String::new();
    loop {
        let status = process.read_output(&mut buffer);
        if !buffer.is_empty() {
            sink(&buffer);
            buffer.clear();
        }
        if status != ReadStatus::DataRead {
            return status;
        }
    }
}

/// The PTY-backed primary path.
pub struct PtyProcess {
    master: File,
    child: Pid,
}

impl PtyProcess {
    /// Clone the terminal's winsize and termios onto a fresh PTY, fork,
    /// and exec the command line under the slave side.
    pub fn dispatch(cmdline: &str) -> Result<PtyProcess, DispatchError> {
        let termios = tcgetattr(std::io::stdout()).ok();
        let mut winsize: libc::winsize = unsafe { std::mem::zeroed() };
        let winsize_ok =
            unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ as _, &mut winsize) } == 0;
        let pty = openpty(winsize_ok.then_some(&winsize), termios.as_ref())
            .map_err(|_| DispatchError)?;

        // argv is assembled before forking; the child must not allocate.
        let shell = CString::new("/bin/sh").map_err(|_| DispatchError)?;
        let dash_c = CString::new("-c").map_err(|_| DispatchError)?;
        let line = CString::new(cmdline).map_err(|_| DispatchError)?;
        let argv = [shell.clone(), dash_c, line];

        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                drop(pty.slave);
                let master = File::from(pty.master);
                set_nonblocking(&master);
                Ok(PtyProcess { master, child })
            }
            Ok(ForkResult::Child) => {
                attach_to_slave(&pty.master, &pty.slave);
                let _ = execv(&shell, &argv);
                // we are a duplicate engine instance; returning would
                // leave two of them evaluating the same configuration.
                unsafe { libc::_exit(-1) }
            }
            Err(_) => Err(DispatchError),
        }
    }
}

fn set_nonblocking(file: &File) {
    unsafe {
        let fd = file.as_raw_fd();
        let flags = libc::fcntl(fd, libc::F_GETFL);
        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
    }
}

/// Make the slave the child's controlling terminal and standard streams.
fn attach_to_slave(master: &OwnedFd, slave: &OwnedFd) {
    unsafe {
        let slave = slave.as_raw_fd();
        libc::setsid();
        libc::ioctl(slave, libc::TIOCSCTTY as _, 0);
        libc::dup2(slave, libc::STDIN_FILENO);
        libc::dup2(slave, libc::STDOUT_FILENO);
        libc::dup2(slave, libc::STDERR_FILENO);
        libc::close(master.as_raw_fd());
        if slave > libc::STDERR_FILENO {
            libc::close(slave);
        }
    }
}

impl ProcessCapture for PtyProcess {
    fn read_output(&mut self, out: &mut String) -> ReadStatus {
        let status = match waitpid(self.child, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => status,
            Err(_) => return ReadStatus::InternalError,
        };

        let mut chunk = [0u8; 8192];
        let mut read_any = false;
        loop {
            match self.master.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    out.push_str(&String::from_utf8_lossy(&chunk[..n]));
                    read_any = true;
                    // keep draining only once the child is gone.
                    if matches!(status, WaitStatus::StillAlive) {
                        break;
                    }
                }
                Err(error) if error.kind() == ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }

        match status {
            WaitStatus::StillAlive => {
                if !read_any {
                    thread::sleep(Duration::from_millis(5));
                }
                ReadStatus::DataRead
            }
            WaitStatus::Exited(_, 0) => ReadStatus::ExitSuccess,
            WaitStatus::Exited(_, _) => ReadStatus::ExitFailure,
            WaitStatus::Signaled(_, _, _) => ReadStatus::ExitFailure,
            _ => ReadStatus::DataRead,
        }
    }
}

/// The pipe+exec fallback.
pub struct PipeProcess {
    child: Child,
}

impl PipeProcess {
    pub fn dispatch(cmdline: &str) -> Result<PipeProcess, DispatchError> {
        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(cmdline)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|_| DispatchError)?;
        Ok(PipeProcess { child })
    }
}

impl ProcessCapture for PipeProcess {
    fn read_output(&mut self, out: &mut String) -> ReadStatus {
        let mut chunk = [0u8; 8192];
        if let Some(stdout) = self.child.stdout.as_mut() {
            match stdout.read(&mut chunk) {
                Ok(n) if n > 0 => {
                    out.push_str(&String::from_utf8_lossy(&chunk[..n]));
                    return ReadStatus::DataRead;
                }
                Ok(_) => {}
                Err(_) => return ReadStatus::InternalError,
            }
        }
        // stdout hit end of stream: collect stderr and reap.
        if let Some(mut stderr) = self.child.stderr.take() {
            let mut trailing = String::new();
            if stderr.read_to_string(&mut trailing).is_ok() {
                out.push_str(&trailing);
            }
        }
        match self.child.wait() {
            Ok(status) if status.success() => ReadStatus::ExitSuccess,
            Ok(_) => ReadStatus::ExitFailure,
            Err(_) => ReadStatus::InternalError,
        }
    }
}

/// One shell command scheduled through the managed pool.
pub struct ExecuteJob {
    cmdline: String,
    reference: Reference,
    entry_handle: Arc<EntryHandle>,
    engine: Arc<Engine>,
    state: JobState,
}

impl ExecuteJob {
    pub fn new(
        cmdline: String,
        reference: Reference,
        entry_handle: Arc<EntryHandle>,
        engine: Arc<Engine>,
    ) -> Arc<ExecuteJob> {
        Arc::new(ExecuteJob {
            cmdline,
            reference,
            entry_handle,
            engine,
            state: JobState::new(),
        })
    }

    fn settle(&self, status: ReadStatus) {
        match status {
            ReadStatus::ExitSuccess | ReadStatus::DataRead => {}
            ReadStatus::ExitFailure => {
                self.engine.diags.soft_report(BuildError::NonZeroProcess {
                    cmdline: self.cmdline.clone(),
                    reference: self.reference,
                });
                self.state.report_error();
            }
            ReadStatus::InternalError => {
                self.engine.diags.soft_report(BuildError::ProcessInternal {
                    cmdline: self.cmdline.clone(),
                    reference: self.reference,
                });
                self.state.report_error();
            }
        }
    }

    fn compute_fallback(&self) {
        let mut process = match PipeProcess::dispatch(&self.cmdline) {
            Ok(process) => process,
            Err(_) => {
                self.engine.diags.soft_report(BuildError::ProcessInternal {
                    cmdline: self.cmdline.clone(),
                    reference: self.reference,
                });
                self.state.report_error();
                return;
            }
        };
        let status = capture(&mut process, |chunk| self.engine.cli.write_to_log(chunk));
        self.settle(status);
    }
}

impl PipelineJob for ExecuteJob {
    fn compute(&self) {
        self.entry_handle.set_status(EntryStatus::Building);
        self.engine.cli.write_verbose(&self.cmdline);

        let mut process = match PtyProcess::dispatch(&self.cmdline) {
            Ok(process) => process,
            Err(_) => {
                if self.engine.cli.is_interactive() {
                    self.engine.cli.write_to_log(&format!(
                        "{} dispatching pty failed, falling back to exec.\n",
                        style("warning:").yellow().bold()
                    ));
                }
                return self.compute_fallback();
            }
        };
        let status = capture(&mut process, |chunk| self.engine.cli.write_to_log(chunk));
        self.settle(status);
    }

    fn state(&self) -> &JobState {
        &self.state
    }
}
