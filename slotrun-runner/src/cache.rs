// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage and retrieval of test outcomes from previous runs.
//!
//! The outcome cache is used only to bias scheduling order: tests that failed last time are run
//! first. Each test gets one small file, named after the test file plus a short hash of its
//! signature, containing the bare outcome code.

use crate::{
    errors::{CacheDirError, CacheError},
    unit::{Test, TestOutcome, TestSignature},
};
use atomicwrites::{AllowOverwrite, AtomicFile};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::NamedUtf8TempFile;
use std::{collections::HashMap, fs, io::Write};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Length of the signature hash fragment in cache file names.
const HASH_FRAGMENT_LEN: usize = 5;

/// Persists the last observed outcome for each test signature.
#[derive(Debug)]
pub struct OutcomeCache {
    dir: Utf8PathBuf,
    // Outcomes are read lazily, on first query, and memoized here.
    known: HashMap<TestSignature, TestOutcome>,
    writes: usize,
}

impl OutcomeCache {
    /// The suffix for cache files.
    pub const FILE_SUFFIX: &'static str = "result";

    /// Opens the outcome cache at `dir`, creating the directory if necessary.
    ///
    /// Returns an error if the directory can't be created or isn't writable.
    pub fn open(dir: impl Into<Utf8PathBuf>) -> Result<Self, CacheDirError> {
        let dir = dir.into();

        if dir.exists() && !dir.is_dir() {
            return Err(CacheDirError::NotADirectory { dir });
        }
        fs::create_dir_all(&dir).map_err(|error| CacheDirError::Create {
            dir: dir.clone(),
            error,
        })?;

        // Probe for writability up front, so a bad directory is caught before any test runs.
        NamedUtf8TempFile::new_in(&dir).map_err(|error| CacheDirError::NotWritable {
            dir: dir.clone(),
            error,
        })?;

        debug!("using outcome cache at {dir}");
        Ok(Self {
            dir,
            known: HashMap::new(),
            writes: 0,
        })
    }

    /// Returns the cache directory.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Returns the number of cache entries written through this instance.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Returns the path to the cache entry for `test`.
    pub fn entry_path(&self, test: &Test) -> Utf8PathBuf {
        let base = test.file().file_name().unwrap_or("test");
        self.dir.join(format!(
            "{base}.{}.{}",
            hash_fragment(test.signature()),
            Self::FILE_SUFFIX,
        ))
    }

    /// Returns the last recorded outcome for `test`.
    ///
    /// Tests without an entry are treated as [`TestOutcome::Prepared`].
    pub fn last_outcome(&mut self, test: &Test) -> TestOutcome {
        if let Some(outcome) = self.known.get(test.signature()) {
            return *outcome;
        }

        let path = self.entry_path(test);
        let outcome = match fs::read_to_string(&path) {
            Ok(contents) => match contents.parse::<TestOutcome>() {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!("ignoring malformed cache entry {path}: {error}");
                    TestOutcome::Prepared
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => TestOutcome::Prepared,
            Err(error) => {
                warn!("ignoring unreadable cache entry {path}: {error}");
                TestOutcome::Prepared
            }
        };

        self.known.insert(test.signature().clone(), outcome);
        outcome
    }

    /// Records `outcome` as the latest outcome for `test`.
    ///
    /// The entry is only rewritten if the outcome differs from the one previously recorded.
    /// Returns true if the entry was written.
    pub fn record(&mut self, test: &Test, outcome: TestOutcome) -> Result<bool, CacheError> {
        if self.last_outcome(test) == outcome {
            return Ok(false);
        }

        let path = self.entry_path(test);
        AtomicFile::new(&path, AllowOverwrite)
            .write(|f| write!(f, "{}", outcome.code()))
            .map_err(|error| CacheError::Write {
                path: path.clone(),
                error,
            })?;

        debug!("updated cache entry {path} to {outcome}");
        self.known.insert(test.signature().clone(), outcome);
        self.writes += 1;
        Ok(true)
    }
}

fn hash_fragment(signature: &TestSignature) -> String {
    let hash = format!("{:016x}", xxh3_64(signature.as_str().as_bytes()));
    hash[..HASH_FRAGMENT_LEN].to_owned()
}
