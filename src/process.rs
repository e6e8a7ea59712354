//! Subprocess execution with captured output and an optional timeout.
//!
//! Pipes are drained on helper threads while the caller waits, so a child
//! writing more than a pipe buffer of output cannot stall. One deadline
//! covers both the exit of the child and the close of its pipes: a
//! background process that inherited stdout keeps the pipe open after the
//! direct child exits. On Unix each child leads its own process group and
//! the whole group is killed when the deadline passes.

use crate::error::{OracleError, Result};
use crossbeam_channel::{at, bounded, never, select, tick, Receiver};
use std::fmt;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// How often a running child is polled while a timeout is armed.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// A fully resolved command line. No shell is involved in running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Split a whitespace-separated command string into program and args.
    ///
    /// There is no quoting: arguments containing spaces cannot be expressed.
    pub fn parse(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| OracleError::InvalidConfig("empty command".to_string()))?;
        Ok(Self {
            program: program.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

/// Single-quote a word for pasting into a POSIX shell, if needed.
fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./:=+,@%".contains(&b));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Captured result of a finished process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Stdout as text with trailing whitespace removed.
    pub fn stdout_trimmed(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim_end().to_string()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim_end().to_string()
    }
}

/// Run an invocation to completion, killing it if `timeout` elapses.
///
/// The timeout bounds the whole call, including reading output that a
/// lingering grandchild holds open. A non-zero exit status is not an error
/// here; callers decide what it means.
pub fn run(invocation: &Invocation, timeout: Option<Duration>) -> Result<ProcessOutput> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut child = invocation
        .to_command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| OracleError::Spawn {
            command: invocation.to_string(),
            source,
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let timed_out = || OracleError::Timeout {
        command: invocation.to_string(),
        timeout: timeout.unwrap_or_default(),
    };

    let status = match wait(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            terminate(&mut child);
            return Err(timed_out());
        }
        Err(e) => {
            terminate(&mut child);
            return Err(OracleError::Io(e));
        }
    };

    let (Some(stdout), Some(stderr)) = (collect(&stdout, deadline)?, collect(&stderr, deadline)?)
    else {
        terminate(&mut child);
        return Err(timed_out());
    };
    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
    })
}

/// Run an invocation and fail unless it exits successfully.
pub fn run_checked(invocation: &Invocation, timeout: Option<Duration>) -> Result<ProcessOutput> {
    let output = run(invocation, timeout)?;
    if !output.status.success() {
        return Err(OracleError::Invocation {
            command: invocation.to_string(),
            status: output.status,
            stderr: output.stderr_lossy(),
        });
    }
    Ok(output)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<io::Result<Vec<u8>>> {
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = match pipe {
            Some(mut pipe) => pipe.read_to_end(&mut buf).map(|_| buf),
            None => Ok(buf),
        };
        let _ = tx.send(result);
    });
    rx
}

/// Wait for a drained pipe; `Ok(None)` means the deadline passed first.
fn collect(rx: &Receiver<io::Result<Vec<u8>>>, deadline: Option<Instant>) -> Result<Option<Vec<u8>>> {
    let expired = deadline.map_or_else(never::<Instant>, at);
    select! {
        recv(rx) -> msg => match msg {
            Ok(result) => Ok(Some(result?)),
            Err(_) => Err(OracleError::Io(io::Error::other("output reader thread exited early"))),
        },
        recv(expired) -> _ => Ok(None),
    }
}

/// Wait for the child; `Ok(None)` means the deadline passed first.
fn wait(child: &mut Child, deadline: Option<Instant>) -> io::Result<Option<ExitStatus>> {
    let Some(deadline) = deadline else {
        return child.wait().map(Some);
    };

    let expired = at(deadline);
    let ticker = tick(POLL_INTERVAL);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        select! {
            recv(ticker) -> _ => {}
            recv(expired) -> _ => return child.try_wait(),
        }
    }
}

/// Kill the child and everything it started, then reap the child.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Ok(pid) = i32::try_from(child.id()) {
            let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}
