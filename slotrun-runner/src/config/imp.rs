// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestThreads;
use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    job::{EnvMap, Interpreter},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use itertools::Itertools;
use serde::Deserialize;
use std::{collections::BTreeSet, time::Duration};
use tracing::warn;

/// Overall configuration for slotrun.
///
/// Configuration is layered: the defaults embedded in slotrun come first, then the config file at
/// [`CONFIG_PATH`](Self::CONFIG_PATH) under the root (or an explicitly specified file). Command-line
/// flags are applied on top by the caller.
#[derive(Clone, Debug)]
pub struct SlotrunConfig {
    test_threads: TestThreads,
    stop_on_failure: bool,
    cache_dir: Option<Utf8PathBuf>,
    env: EnvMap,
    interpreter: Interpreter,
    test_patterns: Vec<String>,
    poll_interval: Duration,
    junit_path: Option<Utf8PathBuf>,
}

impl SlotrunConfig {
    /// The default location of the config within the root: `.config/slotrun.toml`.
    pub const CONFIG_PATH: &'static str = ".config/slotrun.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the config from the given sources, layered on top of the default config.
    ///
    /// If `config_file` is `None`, the config file at [`CONFIG_PATH`](Self::CONFIG_PATH) under
    /// `root` is read if it exists. An explicitly specified file must exist.
    pub fn from_sources(
        root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let root = root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (config, ignored) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        if !ignored.is_empty() {
            warn!(
                "ignoring unknown configuration keys in {config_file}: {}",
                ignored.iter().join(", ")
            );
        }

        Self::from_deserialized(&root, config)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))
    }

    /// Returns the default configuration, rooted at `root`.
    pub fn default_config(root: impl AsRef<Utf8Path>) -> Self {
        let (config, _ignored) = Self::build_and_deserialize_config(&Self::make_default_config())
            .expect("default config is always valid");
        Self::from_deserialized(root.as_ref(), config).expect("default config is always valid")
    }

    /// Returns the number of slots to run tests in.
    pub fn test_threads(&self) -> TestThreads {
        self.test_threads
    }

    /// Returns true if the run should stop dispatching tests after the first failure.
    pub fn stop_on_failure(&self) -> bool {
        self.stop_on_failure
    }

    /// Returns the outcome cache directory, if one is configured.
    pub fn cache_dir(&self) -> Option<&Utf8Path> {
        self.cache_dir.as_deref()
    }

    /// Returns the environment variables set for every test.
    pub fn env(&self) -> &EnvMap {
        &self.env
    }

    /// Returns the interpreter test files are run with.
    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Returns the file name patterns that identify tests within directories.
    pub fn test_patterns(&self) -> &[String] {
        &self.test_patterns
    }

    /// Returns the interval between polls of running tests.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the path to write a JUnit report to, if one is configured.
    pub fn junit_path(&self) -> Option<&Utf8Path> {
        self.junit_path.as_deref()
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(SlotrunConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: SlotrunConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // serde_path_to_error already reports the key, so drop it from the config error.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }

    fn from_deserialized(
        root: &Utf8Path,
        config: SlotrunConfigDeserialize,
    ) -> Result<Self, ConfigParseErrorKind> {
        let mut interpreter = Interpreter::from_argv(config.interpreter)
            .ok_or(ConfigParseErrorKind::EmptyInterpreter)?;
        interpreter.set_skip_exit_code(config.skip_exit_code);

        Ok(Self {
            cache_dir: config.cache_dir.map(|dir| root.join(dir)),
            junit_path: config.junit.path.map(|path| root.join(path)),
            test_threads: config.test_threads,
            stop_on_failure: config.stop_on_failure,
            env: config.env,
            interpreter,
            test_patterns: config.test_patterns,
            poll_interval: config.poll_interval,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SlotrunConfigDeserialize {
    test_threads: TestThreads,
    stop_on_failure: bool,
    #[serde(default)]
    cache_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    env: EnvMap,
    interpreter: Vec<String>,
    #[serde(default)]
    skip_exit_code: Option<i32>,
    test_patterns: Vec<String>,
    #[serde(with = "humantime_serde")]
    poll_interval: Duration,
    #[serde(default)]
    junit: JunitConfigDeserialize,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct JunitConfigDeserialize {
    #[serde(default)]
    path: Option<Utf8PathBuf>,
}
