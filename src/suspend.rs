//! External suspend/resume tool
//!
//! The actual OS-level suspend is delegated to a short-lived external
//! executable (PsSuspend by default). Exit code 0 means success; anything
//! else, or a launch failure, is a failure carrying the tool's stderr.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::SuspendConfig;
use crate::error::{FreezerError, FreezerResult};

/// How often a running tool is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Minimum time left for reading output once the tool has exited
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Which way the external tool should move the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Suspend,
    Resume,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Suspend => "suspend",
            Self::Resume => "resume",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Suspend => "suspended",
            Self::Resume => "resumed",
        }
    }
}

/// Something that can suspend or resume every process behind an identifier
pub trait SuspendAction: Send + Sync {
    fn run(&self, identifier: &str, direction: Direction) -> FreezerResult<()>;
}

/// Runs the configured executable once per request
#[derive(Debug, Clone)]
pub struct ExternalTool {
    executable: String,
    resume_flag: String,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl ExternalTool {
    pub fn new(executable: impl Into<String>, resume_flag: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            resume_flag: resume_flag.into(),
            extra_args: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &SuspendConfig) -> Self {
        Self::new(config.executable.clone(), config.resume_flag.clone())
            .with_args(config.extra_args.clone())
            .with_timeout(config.timeout())
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full argument list for one invocation
    fn args(&self, identifier: &str, direction: Direction) -> Vec<String> {
        let mut args = self.extra_args.clone();
        if direction == Direction::Resume && !self.resume_flag.is_empty() {
            args.push(self.resume_flag.clone());
        }
        args.push(identifier.to_string());
        args
    }

    fn command(&self, identifier: &str, direction: Direction) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(self.args(identifier, direction))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd
    }
}

impl SuspendAction for ExternalTool {
    fn run(&self, identifier: &str, direction: Direction) -> FreezerResult<()> {
        info!(
            "Attempting to {} process {:?} via {}",
            direction.as_str(),
            identifier,
            self.executable
        );

        let mut child = self.command(identifier, direction).spawn().map_err(|e| {
            warn!("Failed to launch {}: {}", self.executable, e);
            FreezerError::ExternalActionFailed {
                identifier: identifier.to_string(),
                diagnostic: format!("failed to launch {}: {}", self.executable, e),
            }
        })?;

        let deadline = Instant::now() + self.timeout;
        let mut output = Output::capture(&mut child);

        let status = match wait_until(&mut child, deadline) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(
                    "{} for {:?} timed out after {:?}; killing it",
                    self.executable, identifier, self.timeout
                );
                let _ = child.kill();
                let _ = child.wait();
                return Err(FreezerError::Timeout {
                    identifier: identifier.to_string(),
                    timeout: self.timeout,
                });
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(FreezerError::ExternalActionFailed {
                    identifier: identifier.to_string(),
                    diagnostic: format!("failed waiting for {}: {}", self.executable, e),
                });
            }
        };

        // A descendant that inherited the pipes can keep them open long after
        // the tool exits; the exit status decides, with whatever output arrived.
        if !output.finish(deadline.max(Instant::now() + DRAIN_GRACE)) {
            warn!(
                "{} exited but its output pipes stayed open; not waiting for them",
                self.executable
            );
        }
        let stdout = output.text(Stream::Stdout);
        let stderr = output.text(Stream::Stderr);
        debug!("{} stdout: {}", self.executable, stdout.trim());

        if status.success() {
            info!("Successfully {} process {:?}", direction.past_tense(), identifier);
            return Ok(());
        }

        let diagnostic = diagnostic_text(&stderr, &stdout, status);
        warn!(
            "Failed to {} process {:?}: {}",
            direction.as_str(),
            identifier,
            diagnostic
        );
        Err(FreezerError::ExternalActionFailed {
            identifier: identifier.to_string(),
            diagnostic,
        })
    }
}

/// Poll until the child exits or `deadline` passes (`Ok(None)`)
fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Captured output; `None` marks end of stream
type Chunk = (Stream, Option<Vec<u8>>);

/// Output of a running tool, read on background threads so the child never
/// blocks on a full pipe and the caller never blocks on an open one
struct Output {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    open: usize,
    chunks: Receiver<Chunk>,
}

impl Output {
    fn capture(child: &mut Child) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut open = 0;
        if let Some(pipe) = child.stdout.take() {
            drain(pipe, Stream::Stdout, tx.clone());
            open += 1;
        }
        if let Some(pipe) = child.stderr.take() {
            drain(pipe, Stream::Stderr, tx);
            open += 1;
        }
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            open,
            chunks: rx,
        }
    }

    /// Collect until both streams close or `deadline` passes. Returns false
    /// when a stream was still open at the deadline.
    fn finish(&mut self, deadline: Instant) -> bool {
        while self.open > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.chunks.recv_timeout(remaining) {
                Ok((Stream::Stdout, Some(data))) => self.stdout.extend(data),
                Ok((Stream::Stderr, Some(data))) => self.stderr.extend(data),
                Ok((_, None)) => self.open -= 1,
                Err(_) => return false,
            }
        }
        true
    }

    fn text(&self, stream: Stream) -> String {
        let buf = match stream {
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
        };
        String::from_utf8_lossy(buf).into_owned()
    }
}

/// Forward a pipe chunk by chunk until it closes
fn drain<R: Read + Send + 'static>(mut pipe: R, stream: Stream, tx: Sender<Chunk>) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send((stream, Some(buf[..n].to_vec()))).is_err() {
                        return;
                    }
                }
            }
        }
        let _ = tx.send((stream, None));
    });
}

/// Prefer stderr, then stdout, then the bare exit code
fn diagnostic_text(stderr: &str, stdout: &str, status: ExitStatus) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}
