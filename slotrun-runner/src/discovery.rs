// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning root paths and glob patterns into jobs.
//!
//! A [`Discover`] implementation is handed one root at a time, and registers a job for every test
//! it finds through [`JobQueue::add_job`]. [`PathDiscovery`] is the standard implementation: it
//! runs every matching file through an [`Interpreter`].

use crate::{
    errors::DiscoveryError,
    job::{Interpreter, Job, ProcessJob},
    unit::Test,
};
use camino::{Utf8Path, Utf8PathBuf};
use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use std::{collections::VecDeque, sync::Arc};
use tracing::debug;
use walkdir::WalkDir;

/// The pending queue of a run: jobs waiting to be dispatched, in dispatch order.
#[derive(Debug)]
pub struct JobQueue<J> {
    jobs: VecDeque<J>,
}

impl<J> Default for JobQueue<J> {
    fn default() -> Self {
        Self {
            jobs: VecDeque::new(),
        }
    }
}

impl<J: Job> JobQueue<J> {
    /// Creates a new, empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job at the back of the queue.
    pub fn add_job(&mut self, job: J) {
        self.jobs.push_back(job);
    }

    /// Returns the number of queued jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if no jobs are queued.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Iterates over the queued tests, in dispatch order.
    pub fn tests(&self) -> impl ExactSizeIterator<Item = &Test> + '_ {
        self.jobs.iter().map(|job| job.test())
    }

    /// Iterates over the tests queued at or after `start`.
    pub(crate) fn tests_from(&self, start: usize) -> impl Iterator<Item = &Test> + '_ {
        self.jobs.range(start..).map(|job| job.test())
    }

    pub(crate) fn pop_front(&mut self) -> Option<J> {
        self.jobs.pop_front()
    }

    /// Stable-sorts the queue by a key computed once per job.
    pub(crate) fn sort_by_cached_key<K: Ord>(&mut self, mut f: impl FnMut(&J) -> K) {
        let mut keyed: Vec<_> = self.jobs.drain(..).map(|job| (f(&job), job)).collect();
        // sort_by is stable, so jobs with equal keys stay in discovery order.
        keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
        self.jobs.extend(keyed.into_iter().map(|(_, job)| job));
    }
}

/// Discovers tests under a root and registers a job for each.
pub trait Discover {
    /// The kind of job this discovery produces.
    type Job: Job;

    /// Registers a job in `queue` for every test found under `root`, in a deterministic order.
    ///
    /// `root` is either a path or a glob pattern. A literal path that doesn't exist is an error; a
    /// pattern that matches nothing is not.
    fn discover(
        &mut self,
        root: &str,
        queue: &mut JobQueue<Self::Job>,
    ) -> Result<(), DiscoveryError>;
}

/// Discovers test files on disk and runs each with an interpreter.
#[derive(Clone, Debug)]
pub struct PathDiscovery {
    interpreter: Arc<Interpreter>,
    test_patterns: GlobSet,
}

impl PathDiscovery {
    /// The file name patterns used to find tests within directories, by default.
    pub const DEFAULT_TEST_PATTERNS: &'static [&'static str] = &["*.test", "*.t"];

    /// Creates a new discovery that finds files whose names match any of `test_patterns` within
    /// directories.
    pub fn new<S: AsRef<str>>(
        interpreter: Interpreter,
        test_patterns: impl IntoIterator<Item = S>,
    ) -> Result<Self, DiscoveryError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in test_patterns {
            let pattern = pattern.as_ref();
            builder.add(GlobBuilder::new(pattern).build().map_err(|error| {
                DiscoveryError::InvalidPattern {
                    pattern: pattern.to_owned(),
                    error,
                }
            })?);
        }
        let test_patterns = builder
            .build()
            .map_err(|error| DiscoveryError::InvalidPattern {
                pattern: "<test patterns>".to_owned(),
                error,
            })?;

        Ok(Self {
            interpreter: Arc::new(interpreter),
            test_patterns,
        })
    }

    /// Returns the interpreter tests are run with.
    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Returns the test files found under `root`, sorted.
    pub fn find(&self, root: &str) -> Result<Vec<Utf8PathBuf>, DiscoveryError> {
        let mut files = if is_pattern(root) {
            self.find_pattern(root)?
        } else {
            self.find_literal(Utf8Path::new(root))?
        };
        files.sort_unstable();
        files.dedup();
        Ok(files)
    }

    fn find_literal(&self, path: &Utf8Path) -> Result<Vec<Utf8PathBuf>, DiscoveryError> {
        let metadata = path.metadata().map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                DiscoveryError::PathNotFound {
                    path: path.to_owned(),
                }
            } else {
                DiscoveryError::Metadata {
                    path: path.to_owned(),
                    error,
                }
            }
        })?;

        if !metadata.is_dir() {
            // A file named explicitly is always a test.
            return Ok(vec![path.to_owned()]);
        }

        walk_files(path)?
            .into_iter()
            .filter(|file| {
                file.file_name()
                    .is_some_and(|name| self.test_patterns.is_match(name))
            })
            .map(Ok)
            .collect()
    }

    fn find_pattern(&self, pattern: &str) -> Result<Vec<Utf8PathBuf>, DiscoveryError> {
        let matcher = compile_glob(pattern)?;
        let base = literal_prefix(pattern);
        let walk_root = if base.as_str().is_empty() {
            Utf8Path::new(".")
        } else {
            base.as_path()
        };
        if !walk_root.is_dir() {
            debug!("pattern `{pattern}` has no existing base directory, matching nothing");
            return Ok(Vec::new());
        }

        let files = walk_files(walk_root)?
            .into_iter()
            .map(|file| {
                // Walking "." yields "./a/b", but the pattern was written as "a/b".
                if base.as_str().is_empty() {
                    file.strip_prefix(".").map(Utf8Path::to_owned).unwrap_or(file)
                } else {
                    file
                }
            })
            .filter(|file| matcher.is_match(file))
            .collect();
        Ok(files)
    }
}

impl Discover for PathDiscovery {
    type Job = ProcessJob;

    fn discover(
        &mut self,
        root: &str,
        queue: &mut JobQueue<ProcessJob>,
    ) -> Result<(), DiscoveryError> {
        let files = self.find(root)?;
        debug!("discovered {} tests under `{root}`", files.len());
        for file in files {
            let signature = self.interpreter.signature_for(&file);
            queue.add_job(self.interpreter.job(Test::new(file, signature)));
        }
        Ok(())
    }
}

/// Returns true if `root` contains glob metacharacters.
pub fn is_pattern(root: &str) -> bool {
    root.contains(['*', '?', '[', '{'])
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher, DiscoveryError> {
    let glob = GlobBuilder::new(pattern)
        // "*" stays within a path component, "**" crosses them.
        .literal_separator(true)
        // Only allow escapes via [].
        .backslash_escape(false)
        .build()
        .map_err(|error| DiscoveryError::InvalidPattern {
            pattern: pattern.to_owned(),
            error,
        })?;
    Ok(glob.compile_matcher())
}

/// Returns the leading components of `pattern` that contain no glob metacharacters.
fn literal_prefix(pattern: &str) -> Utf8PathBuf {
    Utf8Path::new(pattern)
        .components()
        .take_while(|component| !is_pattern(component.as_str()))
        .collect()
}

fn walk_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, DiscoveryError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|error| DiscoveryError::Walk {
            root: root.to_owned(),
            error,
        })?;
        if entry.file_type().is_file() {
            files.push(Utf8PathBuf::try_from(entry.into_path())?);
        }
    }
    Ok(files)
}
