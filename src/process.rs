//! Bounded execution of external tools
//!
//! Valgrind and GDB run the user's program, which may loop forever. Every
//! invocation therefore gets a deadline: output is drained on reader threads
//! while the child is polled with `try_wait`, and a child still running at
//! the deadline is killed.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::errors::ProcessError;

/// Interval between `try_wait` polls.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// stdout followed by stderr, the way a terminal would interleave them
    /// for batch tools that write to both.
    pub fn combined(&self) -> String {
        let mut all = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        all.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') {
            all.push('\n');
        }
        all.push_str(&self.stderr);
        all
    }
}

/// Runs `command` to completion or until `timeout` elapses.
pub fn run_with_timeout(
    command: &mut Command,
    timeout: Duration,
) -> Result<CapturedOutput, ProcessError> {
    let program = command.get_program().to_string_lossy().into_owned();

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| spawn_error(&program, source))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_until(&mut child, Instant::now() + timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            warn!(%program, timeout_secs = timeout.as_secs(), "killing child after timeout");
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProcessError::Timeout { program, timeout });
        }
        Err(source) => return Err(ProcessError::Io { program, source }),
    };

    debug!(%program, ?status, "child exited");
    Ok(CapturedOutput {
        status,
        stdout: join(stdout),
        stderr: join(stderr),
    })
}

/// Returns true when `program --version` runs and exits successfully.
pub fn probe(program: &str, timeout: Duration) -> bool {
    run_with_timeout(Command::new(program).arg("--version"), timeout)
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn spawn_error(program: &str, source: io::Error) -> ProcessError {
    if source.kind() == io::ErrorKind::NotFound {
        ProcessError::NotFound {
            program: program.to_string(),
        }
    } else {
        ProcessError::Io {
            program: program.to_string(),
            source,
        }
    }
}
