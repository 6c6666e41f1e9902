// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Assessment, Job, JobOutput, JobStartContext, RunMode};
use crate::{
    errors::JobError,
    unit::{Test, TestOutcome, TestSignature},
};
use bytes::Bytes;
use camino::Utf8Path;
use std::{
    process::{ExitStatus, Stdio},
    sync::Arc,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Child,
    task::JoinHandle,
};
use tracing::{debug, warn};

/// The environment variable a job's slot is exposed through.
pub const SLOTRUN_SLOT_ENV: &str = "SLOTRUN_SLOT";

/// The environment variable the total number of slots is exposed through.
pub const SLOTRUN_SLOT_COUNT_ENV: &str = "SLOTRUN_SLOT_COUNT";

/// The command used to run test files: `<program> <args...> <test file>`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Interpreter {
    program: String,
    args: Vec<String>,
    skip_exit_code: Option<i32>,
}

impl Interpreter {
    /// The exit code that marks a test as skipped by default, following the automake convention.
    pub const DEFAULT_SKIP_EXIT_CODE: i32 = 77;

    /// Creates an interpreter from an argument vector.
    ///
    /// Returns `None` if `argv` is empty.
    pub fn from_argv(argv: impl IntoIterator<Item = impl Into<String>>) -> Option<Self> {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next()?;
        Some(Self {
            program,
            args: argv.collect(),
            skip_exit_code: Some(Self::DEFAULT_SKIP_EXIT_CODE),
        })
    }

    /// Sets the exit code that marks a test as skipped, or `None` to never skip.
    pub fn set_skip_exit_code(&mut self, skip_exit_code: Option<i32>) -> &mut Self {
        self.skip_exit_code = skip_exit_code;
        self
    }

    /// Returns the program.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the arguments passed before the test file.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the exit code that marks a test as skipped, if any.
    pub fn skip_exit_code(&self) -> Option<i32> {
        self.skip_exit_code
    }

    /// Returns the signature for the test at `path` run by this interpreter.
    ///
    /// `path` is spelled the way discovery found it, so a test is recognized across runs as long as
    /// its root is named the same way.
    pub fn signature_for(&self, path: &Utf8Path) -> TestSignature {
        TestSignature::from_parts(
            path,
            std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str)),
        )
    }

    /// Creates a job that runs `test` with this interpreter.
    pub fn job(self: &Arc<Self>, test: Test) -> ProcessJob {
        ProcessJob {
            test,
            interpreter: self.clone(),
            state: ProcessState::NotStarted,
        }
    }

    fn outcome_for(&self, status: ExitStatus) -> (TestOutcome, String) {
        match status.code() {
            Some(0) => (TestOutcome::Passed, "exited with code 0".to_owned()),
            Some(code) if Some(code) == self.skip_exit_code => {
                (TestOutcome::Skipped, format!("exited with code {code}"))
            }
            Some(code) => (TestOutcome::Failed, format!("exited with code {code}")),
            None => (TestOutcome::Failed, describe_abnormal_exit(status)),
        }
    }
}

#[cfg(unix)]
fn describe_abnormal_exit(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match status.signal() {
        Some(signal) => format!("killed by signal {signal}"),
        None => "exited abnormally".to_owned(),
    }
}

#[cfg(not(unix))]
fn describe_abnormal_exit(_status: ExitStatus) -> String {
    "exited abnormally".to_owned()
}

/// A job that runs one test file as an external process.
///
/// Standard output and standard error are drained in the background while the process runs, so a
/// chatty test never blocks on a full pipe. The process is not killed when the job is dropped.
#[derive(Debug)]
pub struct ProcessJob {
    test: Test,
    interpreter: Arc<Interpreter>,
    state: ProcessState,
}

#[derive(Debug)]
enum ProcessState {
    NotStarted,
    Running {
        child: Child,
        readers: OutputReaders,
    },
    Exited {
        status: ExitStatus,
        readers: OutputReaders,
    },
    SpawnFailed {
        error: std::io::Error,
    },
    Assessed,
}

#[derive(Debug)]
struct OutputReaders {
    stdout: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    stderr: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl OutputReaders {
    fn spawn(child: &mut Child) -> Self {
        Self {
            stdout: child.stdout.take().map(|r| tokio::spawn(read_all(r))),
            stderr: child.stderr.take().map(|r| tokio::spawn(read_all(r))),
        }
    }

    async fn collect(self, file: &Utf8Path) -> JobOutput {
        JobOutput {
            stdout: join_reader(self.stdout, file, "stdout").await,
            stderr: join_reader(self.stderr, file, "stderr").await,
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

async fn join_reader(
    reader: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    file: &Utf8Path,
    stream: &str,
) -> Bytes {
    let Some(reader) = reader else {
        return Bytes::new();
    };
    match reader.await {
        Ok(Ok(buf)) => Bytes::from(buf),
        Ok(Err(error)) => {
            warn!("error reading {stream} for test {file}: {error}");
            Bytes::new()
        }
        Err(error) => {
            warn!("{stream} reader for test {file} did not complete: {error}");
            Bytes::new()
        }
    }
}

impl ProcessJob {
    fn command(&self, cx: &JobStartContext<'_>) -> tokio::process::Command {
        let mut cmd = std::process::Command::new(&self.interpreter.program);
        cmd.args(&self.interpreter.args)
            .arg(self.test.file())
            .envs(cx.env)
            .env(SLOTRUN_SLOT_ENV, cx.slot.to_string())
            .env(SLOTRUN_SLOT_COUNT_ENV, cx.slot_count.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.into()
    }

    fn invalid_state(&self, message: &'static str) -> JobError {
        JobError::InvalidState {
            file: self.test.file().to_owned(),
            message,
        }
    }
}

impl Job for ProcessJob {
    fn test(&self) -> &Test {
        &self.test
    }

    async fn start(&mut self, cx: JobStartContext<'_>) -> Result<(), JobError> {
        if !matches!(self.state, ProcessState::NotStarted) {
            return Err(self.invalid_state("was started twice"));
        }

        let mut cmd = self.command(&cx);
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(error) => {
                // Failing to spawn is an outcome of this test, reported at assessment time.
                debug!("failed to spawn test {}: {error}", self.test.file());
                self.state = ProcessState::SpawnFailed { error };
                return Ok(());
            }
        };
        let readers = OutputReaders::spawn(&mut child);

        self.state = match cx.mode {
            RunMode::Sync => {
                let status = tokio::select! {
                    status = child.wait() => Some(status),
                    () = cx.interrupt.requested() => None,
                };
                match status {
                    Some(status) => {
                        let status = status.map_err(|error| JobError::Wait {
                            file: self.test.file().to_owned(),
                            error,
                        })?;
                        ProcessState::Exited { status, readers }
                    }
                    // Stop waiting, but leave the process running.
                    None => ProcessState::Running { child, readers },
                }
            }
            RunMode::Async => ProcessState::Running { child, readers },
        };
        Ok(())
    }

    fn is_running(&mut self) -> Result<bool, JobError> {
        match &mut self.state {
            ProcessState::NotStarted => Err(self.invalid_state("was polled before being started")),
            ProcessState::Running { child, .. } => {
                let status = child.try_wait().map_err(|error| JobError::Poll {
                    file: self.test.file().to_owned(),
                    error,
                })?;
                let Some(status) = status else {
                    return Ok(true);
                };
                let ProcessState::Running { readers, .. } =
                    std::mem::replace(&mut self.state, ProcessState::Assessed)
                else {
                    unreachable!("state was just matched as running");
                };
                self.state = ProcessState::Exited { status, readers };
                Ok(false)
            }
            ProcessState::Exited { .. }
            | ProcessState::SpawnFailed { .. }
            | ProcessState::Assessed => Ok(false),
        }
    }

    async fn assess(&mut self) -> Result<Assessment, JobError> {
        match std::mem::replace(&mut self.state, ProcessState::Assessed) {
            ProcessState::Exited { status, readers } => {
                let output = readers.collect(self.test.file()).await;
                let (outcome, detail) = self.interpreter.outcome_for(status);
                Ok(Assessment {
                    outcome,
                    output,
                    detail: Some(detail),
                })
            }
            ProcessState::SpawnFailed { error } => Ok(Assessment {
                outcome: TestOutcome::Failed,
                output: JobOutput::default(),
                detail: Some(format!(
                    "failed to spawn `{}`: {error}",
                    self.interpreter.program
                )),
            }),
            state @ ProcessState::Running { .. } => {
                self.state = state;
                Err(self.invalid_state("was assessed while still running"))
            }
            ProcessState::NotStarted => {
                self.state = ProcessState::NotStarted;
                Err(self.invalid_state("was assessed before being started"))
            }
            ProcessState::Assessed => Err(self.invalid_state("was assessed twice")),
        }
    }
}
