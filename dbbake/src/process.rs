use std::{
    ffi::OsStr,
    fmt, io,
    num::NonZeroI32,
    process,
    time::{Duration, Instant},
};

use log::debug;

/// How often a child that runs under a deadline is polled for completion.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct Command(process::Command);

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self(process::Command::new(program))
    }

    pub fn args<'a, I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = &'a OsStr>,
    {
        self.0.args(args);
        self
    }

    pub fn try_output(mut self) -> Result<Output> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("capturing `{command:?}`...", command = &self.0);
        }

        match self.0.output() {
            Ok(output) => Ok(Output {
                command: self,
                output,
            }),
            Err(error) => Err(Error {
                command: self,
                kind: error.into(),
            }),
        }
    }

    pub fn output(self) -> Result<Output> {
        self.try_output().and_then(Output::require_success)
    }

    /// Captures the child's output like [`Command::try_output`], but kills the child once the
    /// deadline passes. The exit status is not checked.
    pub fn try_output_with_deadline(mut self, timeout: Duration) -> Result<Output> {
        if log::log_enabled!(log::Level::Debug) {
            debug!(
                "capturing `{command:?}` with a {timeout:?} deadline...",
                command = &self.0
            );
        }

        let mut child = match self
            .0
            .stdout(process::Stdio::piped())
            .stderr(process::Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(error) => {
                return Err(Error {
                    command: self,
                    kind: error.into(),
                })
            }
        };

        // Both pipes are drained on threads so a chatty child can not fill a pipe buffer and
        // stall without ever reaching the deadline check.
        let stdout_thread = std::thread::spawn({
            let mut stream = child.stdout.take().expect("Failed to open stdout");
            move || {
                let mut buffer = Vec::new();
                io::Read::read_to_end(&mut stream, &mut buffer).map(|_| buffer)
            }
        });
        let stderr_thread = std::thread::spawn({
            let mut stream = child.stderr.take().expect("Failed to open stderr");
            move || {
                let mut buffer = Vec::new();
                io::Read::read_to_end(&mut stream, &mut buffer).map(|_| buffer)
            }
        });

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(error) => {
                    return Err(Error {
                        command: self,
                        kind: error.into(),
                    })
                }
            }

            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error {
                    command: self,
                    kind: ErrorKind::TimedOut(timeout),
                });
            }

            std::thread::sleep(WAIT_POLL_INTERVAL);
        };

        let stdout = stdout_thread
            .join()
            .expect("Thread draining stdout panicked")
            .unwrap_or_default();
        let stderr = stderr_thread
            .join()
            .expect("Thread draining stderr panicked")
            .unwrap_or_default();

        Ok(Output {
            command: self,
            output: process::Output {
                status,
                stdout,
                stderr,
            },
        })
    }
}

#[derive(Debug)]
pub struct Output {
    pub command: Command,
    pub output: process::Output,
}

impl Output {
    pub fn require_success(self) -> Result<Output> {
        let Output { command, output } = self;
        if output.status.success() {
            Ok(Output { command, output })
        } else {
            Err(Error {
                command,
                kind: ErrorKind::NonZeroExitStatus(output.status.code().and_then(NonZeroI32::new)),
            })
        }
    }
}

impl std::ops::Deref for Output {
    type Target = process::Output;

    fn deref(&self) -> &Self::Target {
        &self.output
    }
}

#[derive(Debug)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    NonZeroExitStatus(Option<NonZeroI32>),
    TimedOut(Duration),
    Other(io::Error),
}

impl From<io::Error> for ErrorKind {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::Other(value),
        }
    }
}

#[derive(Debug)]
pub struct Error {
    pub command: Command,
    pub kind: ErrorKind,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to run `{command:?}`: ",
            command = &self.command.0
        )?;
        match &self.kind {
            ErrorKind::NotFound => {
                let program = self.command.0.get_program().to_string_lossy();
                write!(f, "the `{program}` command is required but not available on your system, please install it")
            }
            ErrorKind::PermissionDenied => {
                let program = self.command.0.get_program().to_string_lossy();
                write!(f, "the `{program}` command is available but does not have the right permissions, please make sure the binary is executable")
            }
            ErrorKind::NonZeroExitStatus(code) => {
                if let Some(code) = code {
                    write!(f, "exited with non-zero exit code `{code}`")
                } else {
                    write!(f, "did not run succesfully")
                }
            }
            ErrorKind::TimedOut(timeout) => {
                write!(f, "timed out after {timeout:?} and was killed")
            }
            ErrorKind::Other(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Creates a new [`Command`] and supplies the provided arguments, if any, while calling
/// [`std::convert::AsRef::as_ref`] on each.
macro_rules! command {
    ($program:expr, $($arg:expr),* $(,)?) => {
        $crate::process::args!($crate::process::Command::new($program), $($arg,)*)
    };
}

/// Calls [`Command::args`] on the provided [`Command`] while calling [`std::convert::AsRef::as_ref`]
/// on each argument.
macro_rules! args {
    ($program:expr, $($arg:expr),+ $(,)?) => {
        $program.args([
            $(($arg).as_ref(),)*
        ])
    }
}

pub(crate) use args;
pub(crate) use command;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_captures_stdout() {
        let output = command!("echo", "hello").output().unwrap();
        assert_eq!(std::str::from_utf8(&output.stdout).unwrap().trim(), "hello");
    }

    #[test]
    fn test_nonzero_exit_is_an_error() {
        let error = command!("sh", "-c", "exit 3").output().unwrap_err();
        assert!(matches!(
            error.kind,
            ErrorKind::NonZeroExitStatus(Some(code)) if code.get() == 3
        ));
    }

    #[test]
    fn test_missing_program() {
        let error = command!("dbbake-no-such-program", "--version")
            .output()
            .unwrap_err();
        assert!(matches!(error.kind, ErrorKind::NotFound));
    }

    #[test]
    fn test_deadline_kills_the_child() {
        let error = command!("sleep", "5")
            .try_output_with_deadline(Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(error.kind, ErrorKind::TimedOut(_)));
    }

    #[test]
    fn test_deadline_passes_through_fast_children() {
        let output = command!("echo", "fast")
            .try_output_with_deadline(Duration::from_secs(5))
            .unwrap();
        assert!(output.status.success());
        assert_eq!(std::str::from_utf8(&output.stdout).unwrap().trim(), "fast");
    }
}
