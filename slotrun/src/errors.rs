// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::{FromPathBufError, Utf8PathBuf};
use owo_colors::OwoColorize;
use slotrun_runner::errors::{
    ConfigParseError, DiscoveryError, RunError, SchedulerBuildError, SinkError,
};
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Process exit codes used by slotrun.
pub mod exit_code {
    /// The run succeeded.
    pub const OK: i32 = 0;

    /// Setting up the run failed: the config, cache directory or roots are invalid.
    pub const SETUP_ERROR: i32 = 96;

    /// At least one test failed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// A job or sink could not be managed.
    pub const INTERNAL_ERROR: i32 = 101;

    /// The run was interrupted before it finished, and no test failed.
    pub const INTERRUPTED: i32 = 130;
}

// The #[error()] strings are placeholder messages: errors are meant to be printed with
// display_to_stderr, which colorizes them and prints the chain of causes.

/// An error that slotrun expects to report to the user.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("current directory is invalid")]
    CurrentDirInvalid {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 {
        #[source]
        err: FromPathBufError,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("interpreter parse error")]
    InterpreterParseError {
        input: String,
        #[source]
        err: shell_words::ParseError,
    },
    #[error("empty interpreter")]
    EmptyInterpreter,
    #[error("scheduler build error")]
    SchedulerBuildError {
        #[from]
        err: SchedulerBuildError,
    },
    #[error("discovery error")]
    DiscoveryError {
        #[from]
        err: DiscoveryError,
    },
    #[error("run error")]
    RunError {
        #[from]
        err: RunError,
    },
    #[error("error writing test list")]
    WriteTestListError {
        #[source]
        err: std::io::Error,
    },
    #[error("test run failed")]
    TestRunFailed,
    #[error("test run interrupted")]
    Interrupted,
}

impl ExpectedError {
    pub(crate) fn write_test_list_error(err: std::io::Error) -> Self {
        Self::WriteTestListError { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirInvalid { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::InterpreterParseError { .. }
            | Self::EmptyInterpreter
            | Self::SchedulerBuildError { .. }
            | Self::DiscoveryError { .. } => exit_code::SETUP_ERROR,
            Self::RunError { err } => match err {
                RunError::Discovery(_) => exit_code::SETUP_ERROR,
                _ => exit_code::INTERNAL_ERROR,
            },
            Self::WriteTestListError { .. } => exit_code::INTERNAL_ERROR,
            Self::TestRunFailed => exit_code::TEST_RUN_FAILED,
            Self::Interrupted => exit_code::INTERRUPTED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDirInvalid { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { err } => {
                error!("current directory is not valid UTF-8");
                Some(err as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse slotrun config at `{}`",
                    err.config_file().style(styles.bold)
                );
                err.source()
            }
            Self::InterpreterParseError { input, err } => {
                error!(
                    "failed to parse --interpreter `{}`",
                    input.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::EmptyInterpreter => {
                error!("--interpreter must contain at least the program to run");
                None
            }
            Self::SchedulerBuildError { err } => {
                error!("failed to set up the scheduler");
                Some(err as &dyn Error)
            }
            Self::DiscoveryError { err } => {
                error!("{err}");
                err.source()
            }
            Self::RunError { err } => match err {
                RunError::Discovery(err) => {
                    error!("{err}");
                    err.source()
                }
                RunError::Sink(SinkError::Fs { file, .. } | SinkError::Junit { file, .. }) => {
                    error!(
                        "failed to write report to `{}`",
                        file.style(styles.bold)
                    );
                    err.source().and_then(|err| err.source())
                }
                other => {
                    error!("{other}");
                    other.source()
                }
            },
            Self::WriteTestListError { err } => {
                error!("failed to write test list");
                Some(err as &dyn Error)
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
            Self::Interrupted => {
                error!(
                    "{}",
                    "test run interrupted".style(styles.warning_text)
                );
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

/// Returns the current directory, which relative roots and config paths are resolved against.
pub(crate) fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(|err| ExpectedError::CurrentDirInvalid { err })?;
    Utf8PathBuf::try_from(dir).map_err(|err| ExpectedError::CurrentDirInvalidUtf8 { err })
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotrun_runner::errors::JobError;
    use test_case::test_case;

    #[test_case(ExpectedError::TestRunFailed, exit_code::TEST_RUN_FAILED; "test failure")]
    #[test_case(ExpectedError::Interrupted, exit_code::INTERRUPTED; "interrupted")]
    #[test_case(ExpectedError::EmptyInterpreter, exit_code::SETUP_ERROR; "empty interpreter")]
    #[test_case(
        ExpectedError::from(RunError::Discovery(DiscoveryError::PathNotFound {
            path: "missing".into(),
        })),
        exit_code::SETUP_ERROR;
        "missing root"
    )]
    #[test_case(
        ExpectedError::from(RunError::Job(JobError::NotFinalized { file: "a.test".into() })),
        exit_code::INTERNAL_ERROR;
        "job error"
    )]
    fn exit_codes(error: ExpectedError, expected: i32) {
        assert_eq!(error.process_exit_code(), expected);
    }
}
