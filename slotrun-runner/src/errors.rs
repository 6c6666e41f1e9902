// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by slotrun.

use camino::{FromPathBufError, Utf8PathBuf};
use config::ConfigError;
use std::{error::Error, fmt, path::PathBuf};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse slotrun config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// The `interpreter` key was set to an empty list.
    #[error("`interpreter` must contain at least the program to run")]
    EmptyInterpreter,
}

/// Error returned while parsing a [`TestThreads`](crate::config::TestThreads) value.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for test-threads: {input}")]
pub struct TestThreadsParseError {
    /// The input that failed to parse.
    pub input: String,
}

impl TestThreadsParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurred while setting up the outcome cache directory.
///
/// This is a configuration error: it is raised before any test is run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheDirError {
    /// The cache directory could not be created.
    #[error("failed to create cache directory `{dir}`")]
    Create {
        /// The directory that could not be created.
        dir: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The cache path exists but is not a directory.
    #[error("cache path `{dir}` is not a directory")]
    NotADirectory {
        /// The path that is not a directory.
        dir: Utf8PathBuf,
    },

    /// The cache directory is not writable.
    #[error("cache directory `{dir}` is not writable")]
    NotWritable {
        /// The directory that is not writable.
        dir: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurred while writing to the outcome cache.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// A cache entry could not be written.
    #[error("failed to write cache entry `{path}`")]
    Write {
        /// The path to the cache entry.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: atomicwrites::Error<std::io::Error>,
    },
}

/// An error that occurred while discovering tests.
///
/// These are input errors: they are raised before scheduling begins.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// A literal (non-pattern) path does not exist.
    #[error("path `{path}` does not exist")]
    PathNotFound {
        /// The path that does not exist.
        path: Utf8PathBuf,
    },

    /// The metadata of a literal path could not be read for a reason other than it not existing.
    #[error("failed to read metadata for `{path}`")]
    Metadata {
        /// The path whose metadata could not be read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A glob pattern could not be parsed.
    #[error("invalid glob pattern `{pattern}`")]
    InvalidPattern {
        /// The pattern that failed to parse.
        pattern: String,

        /// The underlying error.
        #[source]
        error: globset::Error,
    },

    /// An error occurred while walking a directory.
    #[error("error walking directory `{root}`")]
    Walk {
        /// The root of the walk.
        root: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: walkdir::Error,
    },

    /// A discovered path is not valid UTF-8.
    #[error("discovered path `{}` is not valid UTF-8", .path.display())]
    NonUtf8Path {
        /// The path that is not valid UTF-8.
        path: PathBuf,
    },
}

impl From<FromPathBufError> for DiscoveryError {
    fn from(error: FromPathBufError) -> Self {
        Self::NonUtf8Path {
            path: error.into_path_buf(),
        }
    }
}

/// An error that occurred within a job while it was being started, polled or assessed.
///
/// A test failing is not an error: it's a normal outcome. These errors indicate that the job
/// itself could not be managed, and they abort the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JobError {
    /// The liveness of the job's process could not be determined.
    #[error("failed to poll process for test `{file}`")]
    Poll {
        /// The test file.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The job's process could not be waited on.
    #[error("failed to wait for process for test `{file}`")]
    Wait {
        /// The test file.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The job was asked to do something out of order.
    #[error("job for test `{file}` {message}")]
    InvalidState {
        /// The test file.
        file: Utf8PathBuf,

        /// A description of what went wrong.
        message: &'static str,
    },

    /// The job's assessment didn't produce a terminal outcome.
    #[error("job for test `{file}` was assessed without a terminal outcome")]
    NotFinalized {
        /// The test file.
        file: Utf8PathBuf,
    },
}

/// An error that occurred while a sink was processing a notification.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SinkError {
    /// An error occurred while writing to the provided output.
    #[error("error writing to output")]
    Io(#[source] std::io::Error),

    /// An error occurred while operating on the file system.
    #[error("error operating on path {file}")]
    Fs {
        /// The file being operated on.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// An error occurred while producing JUnit XML.
    #[error("error writing JUnit output to {file}")]
    Junit {
        /// The output file.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: quick_junit::SerializeError,
    },
}

/// An error occurred while setting up the signal handler.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] std::io::Error);

/// An error that occurred while building a [`Scheduler`](crate::runner::Scheduler).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchedulerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// The outcome cache directory is unusable.
    #[error("outcome cache is unusable")]
    CacheDir(#[from] CacheDirError),
}

/// An error that aborted a run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// Discovery failed.
    #[error("error discovering tests")]
    Discovery(#[from] DiscoveryError),

    /// A job could not be managed.
    #[error("error running job")]
    Job(#[from] JobError),

    /// A sink failed to process a notification.
    #[error("error reporting test event")]
    Sink(#[from] SinkError),

    /// The outcome cache could not be updated.
    #[error("error updating outcome cache")]
    Cache(#[from] CacheError),
}

/// Displays an error along with its chain of sources, on a single line.
#[derive(Clone, Copy, Debug)]
pub struct DisplayErrorChain<E>(E);

impl<E: Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(error) = source {
            write!(f, ": {error}")?;
            source = error.source();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_error_chain() {
        let error = RunError::Job(JobError::Poll {
            file: "a.test".into(),
            error: std::io::Error::other("boom"),
        });
        assert_eq!(
            DisplayErrorChain::new(&error).to_string(),
            "error running job: failed to poll process for test `a.test`: boom"
        );
    }
}
