// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test units: the identity of a single test and its outcome.

use camino::{Utf8Path, Utf8PathBuf};
use std::{fmt, str::FromStr};

/// A single logical test unit, as produced by discovery.
///
/// A `Test` is owned by the [`Job`](crate::job::Job) that runs it. Its identity never changes once
/// it is created: the terminal outcome is reported separately, through
/// [`FinishedTest`](crate::reporter::FinishedTest).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Test {
    file: Utf8PathBuf,
    signature: TestSignature,
}

impl Test {
    /// Creates a new test for the given file, identified by `signature`.
    pub fn new(file: impl Into<Utf8PathBuf>, signature: TestSignature) -> Self {
        Self {
            file: file.into(),
            signature,
        }
    }

    /// Returns the path to the test file.
    pub fn file(&self) -> &Utf8Path {
        &self.file
    }

    /// Returns the stable identity of this test.
    pub fn signature(&self) -> &TestSignature {
        &self.signature
    }
}

/// A stable identity string for a test, derived from its file and parameters.
///
/// Signatures are used as keys into the [`OutcomeCache`](crate::cache::OutcomeCache), so they must
/// stay the same across runs for the same test.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TestSignature(String);

impl TestSignature {
    /// Creates a signature from a raw string.
    pub fn new(signature: impl Into<String>) -> Self {
        Self(signature.into())
    }

    /// Derives a signature from a test path and the arguments it is run with.
    ///
    /// Components are separated by NUL bytes, which can't appear in either paths or arguments.
    pub fn from_parts<'a>(path: &Utf8Path, params: impl IntoIterator<Item = &'a str>) -> Self {
        let mut signature = path.as_str().to_owned();
        for param in params {
            signature.push('\0');
            signature.push_str(param);
        }
        Self(signature)
    }

    /// Returns the signature as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // NUL separators aren't printable.
        write!(f, "{}", self.0.replace('\0', " "))
    }
}

/// The outcome of a test.
///
/// Outcomes are totally ordered by their [`code`](Self::code). The ordering is what the
/// scheduler uses to prioritize tests across runs: previously failing tests sort first, then
/// tests never seen before, then skipped tests, then passing tests.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum TestOutcome {
    /// The test failed.
    Failed,

    /// The test has not been run yet.
    Prepared,

    /// The test was skipped.
    Skipped,

    /// The test passed.
    Passed,
}

impl TestOutcome {
    /// Returns the numeric code for this outcome, as stored in the outcome cache.
    pub fn code(self) -> u8 {
        match self {
            Self::Failed => 0,
            Self::Prepared => 1,
            Self::Skipped => 2,
            Self::Passed => 3,
        }
    }

    /// Returns the outcome corresponding to `code`, if any.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Failed),
            1 => Some(Self::Prepared),
            2 => Some(Self::Skipped),
            3 => Some(Self::Passed),
            _ => None,
        }
    }

    /// Returns true if this is a terminal outcome, i.e. the test has finished running.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Prepared)
    }

    /// Returns true if the test failed.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Returns a short, lowercase description of the outcome.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::Prepared => "prepared",
            Self::Skipped => "skipped",
            Self::Passed => "passed",
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestOutcome {
    type Err = std::num::ParseIntError;

    /// Parses an outcome from its code. Unknown codes parse as [`TestOutcome::Prepared`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().parse::<u8>()?;
        Ok(Self::from_code(code).unwrap_or(Self::Prepared))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[test]
    fn outcome_order() {
        let mut outcomes = vec![
            TestOutcome::Passed,
            TestOutcome::Prepared,
            TestOutcome::Skipped,
            TestOutcome::Failed,
        ];
        outcomes.sort();
        assert_eq!(
            outcomes,
            [
                TestOutcome::Failed,
                TestOutcome::Prepared,
                TestOutcome::Skipped,
                TestOutcome::Passed,
            ]
        );
    }

    #[proptest]
    fn code_matches_order(a: TestOutcome, b: TestOutcome) {
        assert_eq!(a.cmp(&b), a.code().cmp(&b.code()));
        assert_eq!(TestOutcome::from_code(a.code()), Some(a));
    }

    #[test]
    fn parse_outcome() {
        assert_eq!("0\n".parse::<TestOutcome>().unwrap(), TestOutcome::Failed);
        assert_eq!("3".parse::<TestOutcome>().unwrap(), TestOutcome::Passed);
        assert_eq!("42".parse::<TestOutcome>().unwrap(), TestOutcome::Prepared);
        "passed".parse::<TestOutcome>().unwrap_err();
    }

    #[test]
    fn signature_from_parts() {
        let signature = TestSignature::from_parts(Utf8Path::new("a/b.test"), ["-n", "x"]);
        assert_eq!(signature.as_str(), "a/b.test\0-n\0x");
        assert_eq!(signature.to_string(), "a/b.test -n x");
        let bare = TestSignature::from_parts(Utf8Path::new("a/b.test"), std::iter::empty());
        assert_eq!(bare.as_str(), "a/b.test");
    }
}
