// src/compiler.rs

//! The boundary with the external font compiler.
//!
//! The compiler is an opaque tool: given a character map, an output path
//! stem, a family name, a format tag, and optionally an adjustments file, it
//! is expected to produce `<stem>.<format>`. The pipeline only talks to it
//! through the `FontCompiler` trait, so the concrete mechanism (subprocess,
//! library call, remote service) can be swapped without touching assembly.
//!
//! `ProcessCompiler` is the subprocess implementation. It never waits
//! forever: past the configured timeout the whole process group gets
//! SIGTERM, then SIGKILL after a short grace period.

use crate::config::CompilerConfig;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

// --- Formats ---

/// The binary font containers the compiler can emit. They share glyph data
/// and differ only in container/compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFormat {
    #[default]
    Ttf,
    Otf,
    Woff,
    Woff2,
}

impl FontFormat {
    pub const ALL: [FontFormat; 4] = [
        FontFormat::Ttf,
        FontFormat::Otf,
        FontFormat::Woff,
        FontFormat::Woff2,
    ];

    /// File extension, which doubles as the format tag on the command line.
    pub fn extension(self) -> &'static str {
        match self {
            FontFormat::Ttf => "ttf",
            FontFormat::Otf => "otf",
            FontFormat::Woff => "woff",
            FontFormat::Woff2 => "woff2",
        }
    }
}

impl fmt::Display for FontFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown font format '{0}' (expected one of ttf, otf, woff, woff2)")]
pub struct UnknownFormat(pub String);

impl FromStr for FontFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().trim_start_matches('.').to_ascii_lowercase();
        FontFormat::ALL
            .into_iter()
            .find(|f| f.extension() == lower)
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

// --- Jobs ---

/// Everything the compiler needs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileJob {
    pub charmap_path: PathBuf,
    pub adjustments_path: Option<PathBuf>,
    /// Output path without extension.
    pub output_stem: PathBuf,
    pub family_name: String,
    pub format: FontFormat,
}

impl CompileJob {
    /// `<output stem>.<format>`: where the compiler must leave the font.
    pub fn output_path(&self) -> PathBuf {
        output_path_for(&self.output_stem, self.format)
    }
}

/// Appends the format extension to `stem` (a stem containing dots keeps them).
pub fn output_path_for(stem: &Path, format: FontFormat) -> PathBuf {
    let mut path = OsString::from(stem.as_os_str());
    path.push(".");
    path.push(format.extension());
    PathBuf::from(path)
}

/// What a successful compiler run reported.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompileReport {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// The compiler failed, timed out, or could not be launched. The
    /// diagnostics are the tool's own output, passed through verbatim.
    #[error("font compiler failed (exit code {}): {diagnostics}", exit_label(.exit_code))]
    Failed {
        exit_code: Option<i32>,
        diagnostics: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Narrow interface to whatever turns a character map into a font file.
pub trait FontCompiler {
    fn compile(&self, job: &CompileJob) -> Result<CompileReport, CompileError>;
}

// --- Subprocess implementation ---

/// Runs the compiler as a child process:
/// `<program> <args...> <charmap> <stem> <family> <format> [<adjustments>]`.
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessCompiler {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone(), config.timeout())
    }

    fn command(&self, job: &CompileJob) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&job.charmap_path)
            .arg(&job.output_stem)
            .arg(&job.family_name)
            .arg(job.format.extension());
        if let Some(adjustments) = &job.adjustments_path {
            cmd.arg(adjustments);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Own process group, so a timeout can take down helpers the tool spawned.
            .process_group(0);
        cmd
    }

    fn timed_out(&self, waiting_for: &str) -> CompileError {
        CompileError::Failed {
            exit_code: None,
            diagnostics: format!(
                "font compiler timed out after {:?} waiting for it {}",
                self.timeout, waiting_for
            ),
        }
    }
}

impl FontCompiler for ProcessCompiler {
    fn compile(&self, job: &CompileJob) -> Result<CompileReport, CompileError> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        log::info!(
            "Compiler: Launching '{}' for '{}' ({})",
            self.program.display(),
            job.family_name,
            job.format
        );
        let mut child = self.command(job).spawn().map_err(|e| CompileError::Failed {
            exit_code: None,
            diagnostics: format!("failed to launch '{}': {}", self.program.display(), e),
        })?;
        let group = Pid::from_raw(child.id() as i32);

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_until(&mut child, deadline) {
            Ok(Some(status)) => status,
            Ok(None) => {
                log::error!(
                    "Compiler: No result after {:?}, terminating process group {}",
                    self.timeout,
                    group
                );
                terminate(&mut child, group);
                // The reader threads are left to finish on their own.
                return Err(self.timed_out("to exit"));
            }
            Err(e) => {
                terminate(&mut child, group);
                return Err(CompileError::Failed {
                    exit_code: None,
                    diagnostics: format!("failed to wait for font compiler: {}", e),
                });
            }
        };

        // Helpers the tool left behind can hold the pipes open past its exit.
        let (Some(stdout), Some(stderr)) = (
            collect_until(stdout, deadline),
            collect_until(stderr, deadline),
        ) else {
            log::error!(
                "Compiler: Output still open after {:?}, killing process group {}",
                self.timeout,
                group
            );
            signal_group(group, Signal::SIGKILL);
            return Err(self.timed_out("to close its output"));
        };

        let report = CompileReport {
            exit_code: status.code(),
            stdout,
            stderr,
            elapsed: started.elapsed(),
        };
        for line in report.stdout.lines() {
            log::debug!("Compiler: {}", line);
        }

        if !status.success() {
            let diagnostics = if report.stderr.trim().is_empty() {
                report.stdout.clone()
            } else {
                report.stderr.clone()
            };
            log::error!("Compiler: Exited with {}", status);
            return Err(CompileError::Failed {
                exit_code: status.code(),
                diagnostics,
            });
        }

        log::info!("Compiler: Finished in {:?}", report.elapsed);
        Ok(report)
    }
}

/// Reads `pipe` to the end on its own thread and sends the text back.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    let mut pipe = pipe?;
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            log::warn!("Compiler: Failed to read child output: {}", e);
        }
        // Nobody is listening any more if the run already gave up.
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    Some(rx)
}

/// Text of a drained pipe, or `None` if it is still open at `deadline`.
fn collect_until(output: Option<Receiver<String>>, deadline: Instant) -> Option<String> {
    let Some(rx) = output else {
        return Some(String::new());
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(text) => Some(text),
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}

/// Polls the child until it exits or `deadline` passes (`Ok(None)`).
fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn signal_group(group: Pid, signal: Signal) {
    if let Err(e) = killpg(group, signal) {
        log::warn!("Compiler: {} to process group {} failed: {}", signal, group, e);
    }
}

/// SIGTERM to the child's process group, then SIGKILL once the grace period runs out.
fn terminate(child: &mut Child, group: Pid) {
    signal_group(group, Signal::SIGTERM);
    if let Ok(Some(_)) = wait_until(child, Instant::now() + TERMINATE_GRACE) {
        return;
    }
    signal_group(group, Signal::SIGKILL);
    if let Err(e) = child.wait() {
        log::warn!("Compiler: Failed to reap child: {}", e);
    }
}
