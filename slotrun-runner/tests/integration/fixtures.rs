// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use slotrun_runner::{
    config::TestThreads,
    discovery::PathDiscovery,
    job::Interpreter,
    runner::{Scheduler, SchedulerBuilder},
    signal::SignalHandlerKind,
};
use std::time::Duration;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum FixtureStatus {
    Pass,
    Fail,
    Skip,
}

impl FixtureStatus {
    fn script(self) -> &'static str {
        match self {
            FixtureStatus::Pass => "echo \"running in slot $SLOTRUN_SLOT of $SLOTRUN_SLOT_COUNT\"\nexit 0\n",
            FixtureStatus::Fail => "echo 'expected 2, got 3'\necho 'assertion failed' >&2\nexit 1\n",
            FixtureStatus::Skip => "exit 77\n",
        }
    }
}

/// A directory of test scripts.
pub(crate) struct FixtureDir {
    dir: Utf8TempDir,
}

impl FixtureDir {
    pub(crate) fn new(tests: &[(&str, FixtureStatus)]) -> Result<Self> {
        let dir = Utf8TempDir::new()?;
        for (name, status) in tests {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, status.script())?;
        }
        Ok(Self { dir })
    }

    pub(crate) fn path(&self) -> &Utf8Path {
        self.dir.path()
    }

    pub(crate) fn join(&self, name: &str) -> Utf8PathBuf {
        self.dir.path().join(name)
    }

    pub(crate) fn discovery(&self) -> Result<PathDiscovery> {
        let interpreter = Interpreter::from_argv(["sh"]).expect("argv is non-empty");
        Ok(PathDiscovery::new(
            interpreter,
            PathDiscovery::DEFAULT_TEST_PATTERNS,
        )?)
    }
}

pub(crate) fn scheduler(slots: usize, configure: impl FnOnce(&mut SchedulerBuilder)) -> Result<Scheduler> {
    let mut builder = SchedulerBuilder::default();
    builder
        .set_test_threads(TestThreads::Count(slots))
        .set_poll_interval(Duration::from_millis(1));
    configure(&mut builder);
    Ok(builder.build(SignalHandlerKind::Noop)?)
}
