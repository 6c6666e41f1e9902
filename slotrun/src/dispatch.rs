// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::{Result, current_dir, exit_code},
    output::{OutputContext, OutputOpts, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use slotrun_runner::{
    config::{SlotrunConfig, TestThreads},
    discovery::PathDiscovery,
    job::Interpreter,
    reporter::{DisplaySinkBuilder, DisplayStderr, JunitSink, SinkList},
    runner::{CancelReason, Scheduler, SchedulerBuilder},
    signal::SignalHandlerKind,
};
use std::io::{BufWriter, Write};
use tracing::debug;

/// Runs test files in parallel across a fixed number of slots.
#[derive(Debug, Parser)]
#[command(version, name = "slotrun", styles = clap_styles::style())]
pub struct SlotrunApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[command(subcommand)]
    command: Command,
}

impl SlotrunApp {
    /// Initializes the output context, including logging.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code on success.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        let root = current_dir()?;
        let config = self.config_opts.make_config(&root)?;

        match self.command {
            Command::Run {
                roots,
                runner_opts,
                reporter_opts,
            } => {
                let app = RunApp::new(&config, runner_opts)?;
                app.exec(&roots_or_default(roots), reporter_opts, output)
            }
            Command::List { roots, runner_opts } => {
                let app = RunApp::new(&config, runner_opts)?;
                app.list(&roots_or_default(roots))
            }
        }
    }
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: <current-dir>/.config/slotrun.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self, root: &Utf8Path) -> Result<SlotrunConfig> {
        SlotrunConfig::from_sources(root, self.config_file.as_deref())
            .map_err(|err| ExpectedError::ConfigParseError { err })
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Discover and run tests
    ///
    /// Each root is a test file, a directory to search for test files, or a glob pattern. Tests
    /// are run in parallel, one per slot.
    Run {
        /// Test files, directories or glob patterns [default: .]
        #[arg(value_name = "ROOTS")]
        roots: Vec<String>,

        #[clap(flatten)]
        runner_opts: RunnerOpts,

        #[clap(flatten)]
        reporter_opts: ReporterOpts,
    },

    /// List tests without running them
    ///
    /// Tests are printed one per line, in the order they would be run.
    List {
        /// Test files, directories or glob patterns [default: .]
        #[arg(value_name = "ROOTS")]
        roots: Vec<String>,

        #[clap(flatten)]
        runner_opts: RunnerOpts,
    },
}

fn roots_or_default(roots: Vec<String>) -> Vec<String> {
    if roots.is_empty() {
        vec![".".to_owned()]
    } else {
        roots
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Runner options")]
struct RunnerOpts {
    /// Number of tests to run simultaneously [possible values: integer or "num-cpus"]
    #[arg(
        long,
        short = 'j',
        visible_alias = "jobs",
        value_name = "N",
        env = "SLOTRUN_TEST_THREADS",
        allow_negative_numbers = true
    )]
    test_threads: Option<TestThreads>,

    /// Stop starting tests after the first failure
    #[arg(long, overrides_with = "no_stop_on_failure")]
    stop_on_failure: bool,

    /// Run all tests regardless of failure
    #[arg(long, overrides_with = "stop_on_failure")]
    no_stop_on_failure: bool,

    /// Directory to cache test outcomes in, so that failing tests are run first next time
    #[arg(long, value_name = "DIR", env = "SLOTRUN_CACHE_DIR")]
    cache_dir: Option<Utf8PathBuf>,

    /// Set an environment variable for every test (may be repeated)
    #[arg(long, value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Command to run each test file with, split like a shell would
    #[arg(long, value_name = "CMD")]
    interpreter: Option<String>,
}

impl RunnerOpts {
    fn stop_on_failure(&self, config: &SlotrunConfig) -> bool {
        if self.stop_on_failure {
            true
        } else if self.no_stop_on_failure {
            false
        } else {
            config.stop_on_failure()
        }
    }

    fn interpreter(&self, config: &SlotrunConfig) -> Result<Interpreter> {
        let Some(input) = &self.interpreter else {
            return Ok(config.interpreter().clone());
        };
        let argv = shell_words::split(input).map_err(|err| ExpectedError::InterpreterParseError {
            input: input.clone(),
            err,
        })?;
        let mut interpreter = Interpreter::from_argv(argv).ok_or(ExpectedError::EmptyInterpreter)?;
        interpreter.set_skip_exit_code(config.interpreter().skip_exit_code());
        Ok(interpreter)
    }
}

fn parse_env_pair(input: &str) -> std::result::Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("missing variable name in `{input}`")),
        Some((key, value)) => Ok((key.to_owned(), value.to_owned())),
        None => Err(format!("expected KEY=VALUE, found `{input}`")),
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Reporter options")]
struct ReporterOpts {
    /// Write a JUnit XML report to this path
    #[arg(long, value_name = "PATH", env = "SLOTRUN_JUNIT")]
    junit: Option<Utf8PathBuf>,

    /// Don't print the captured output of failing tests
    #[arg(long)]
    hide_failure_output: bool,
}

struct RunApp {
    scheduler_builder: SchedulerBuilder,
    discovery: PathDiscovery,
    junit_path: Option<Utf8PathBuf>,
}

impl RunApp {
    fn new(config: &SlotrunConfig, opts: RunnerOpts) -> Result<Self> {
        let mut env = config.env().clone();
        env.extend(opts.env.iter().cloned());

        let mut scheduler_builder = SchedulerBuilder::default();
        scheduler_builder
            .set_test_threads(opts.test_threads.unwrap_or(config.test_threads()))
            .set_stop_on_failure(opts.stop_on_failure(config))
            .set_env(env)
            .set_poll_interval(config.poll_interval());
        if let Some(cache_dir) = opts.cache_dir.as_deref().or(config.cache_dir()) {
            scheduler_builder.set_cache_dir(cache_dir);
        }

        let discovery = PathDiscovery::new(opts.interpreter(config)?, config.test_patterns())?;
        Ok(Self {
            scheduler_builder,
            discovery,
            junit_path: config.junit_path().map(Utf8Path::to_owned),
        })
    }

    fn build_scheduler(&mut self, signal_handler: SignalHandlerKind) -> Result<Scheduler> {
        let scheduler = std::mem::take(&mut self.scheduler_builder).build(signal_handler)?;
        debug!(
            "running tests in {} slots with `{}`",
            scheduler.slot_count(),
            self.discovery.interpreter().program(),
        );
        if let Some(cache_dir) = scheduler.cache_dir() {
            debug!("recording outcomes in {cache_dir}");
        }
        Ok(scheduler)
    }

    fn exec(
        mut self,
        roots: &[String],
        reporter_opts: ReporterOpts,
        output: OutputContext,
    ) -> Result<i32> {
        let mut scheduler = self.build_scheduler(SignalHandlerKind::Standard)?;

        let mut display = DisplaySinkBuilder::default();
        display
            .set_colorize(output.color.should_colorize(supports_color::Stream::Stderr))
            .set_failure_output(!reporter_opts.hide_failure_output);

        let mut sinks = SinkList::new();
        sinks.push(display.build(DisplayStderr::Terminal));
        if let Some(path) = reporter_opts.junit.or(self.junit_path) {
            sinks.push(JunitSink::new(path));
        }

        let stats = scheduler.execute(&mut self.discovery, roots, &mut sinks)?;
        if !stats.is_success() {
            Err(ExpectedError::TestRunFailed)
        } else if stats.cancel_reason == Some(CancelReason::Signal) {
            Err(ExpectedError::Interrupted)
        } else {
            Ok(exit_code::OK)
        }
    }

    fn list(mut self, roots: &[String]) -> Result<i32> {
        let mut scheduler = self.build_scheduler(SignalHandlerKind::Noop)?;
        let queue = scheduler.discover(&mut self.discovery, roots)?;

        let mut writer = BufWriter::new(std::io::stdout().lock());
        for test in queue.tests() {
            writeln!(writer, "{}", test.file()).map_err(ExpectedError::write_test_list_error)?;
        }
        writer
            .flush()
            .map_err(ExpectedError::write_test_list_error)?;
        Ok(exit_code::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn verify_app() {
        SlotrunApp::command().debug_assert();
    }

    #[test_case("KEY=value", Ok(("KEY", "value")); "simple")]
    #[test_case("KEY=a=b", Ok(("KEY", "a=b")); "equals in value")]
    #[test_case("KEY=", Ok(("KEY", "")); "empty value")]
    #[test_case("=value", Err(()); "empty key")]
    #[test_case("KEY", Err(()); "no equals")]
    fn env_pairs(input: &str, expected: std::result::Result<(&str, &str), ()>) {
        let actual = parse_env_pair(input);
        match expected {
            Ok((key, value)) => assert_eq!(actual, Ok((key.to_owned(), value.to_owned()))),
            Err(()) => assert!(actual.is_err(), "{input} should not parse"),
        }
    }

    fn parse_run(args: &[&str]) -> (Vec<String>, RunnerOpts, ReporterOpts) {
        let app = SlotrunApp::try_parse_from(args.iter().copied()).unwrap();
        match app.command {
            Command::Run {
                roots,
                runner_opts,
                reporter_opts,
            } => (roots, runner_opts, reporter_opts),
            other => panic!("expected run, found {other:?}"),
        }
    }

    #[test]
    fn run_flags_override_config() {
        let dir = Utf8TempDir::new().unwrap();
        let config = SlotrunConfig::default_config(dir.path());

        let (roots, opts, reporter_opts) = parse_run(&[
            "slotrun",
            "run",
            "tests",
            "-j",
            "2",
            "--stop-on-failure",
            "--env",
            "A=1",
            "--interpreter",
            "bash -eu",
            "--junit",
            "out.xml",
        ]);
        assert_eq!(roots, ["tests"]);
        assert_eq!(opts.test_threads, Some(TestThreads::Count(2)));
        assert!(opts.stop_on_failure(&config));
        assert_eq!(opts.env, [("A".to_owned(), "1".to_owned())]);
        assert_eq!(reporter_opts.junit.as_deref(), Some(Utf8Path::new("out.xml")));

        let interpreter = opts.interpreter(&config).unwrap();
        assert_eq!(interpreter.program(), "bash");
        assert_eq!(interpreter.args(), ["-eu"]);
        assert_eq!(
            interpreter.skip_exit_code(),
            Some(Interpreter::DEFAULT_SKIP_EXIT_CODE)
        );
    }

    #[test]
    fn stop_on_failure_flags_override_each_other() {
        let config = SlotrunConfig::default_config("/repo");
        let (_, opts, _) =
            parse_run(&["slotrun", "run", "--stop-on-failure", "--no-stop-on-failure"]);
        assert!(!opts.stop_on_failure(&config));
        let (_, opts, _) =
            parse_run(&["slotrun", "run", "--no-stop-on-failure", "--stop-on-failure"]);
        assert!(opts.stop_on_failure(&config));
        let (_, opts, _) = parse_run(&["slotrun", "run"]);
        assert!(!opts.stop_on_failure(&config));
    }

    #[test]
    fn invalid_interpreter_is_rejected() {
        let config = SlotrunConfig::default_config("/repo");
        let (_, opts, _) = parse_run(&["slotrun", "run", "--interpreter", "sh 'unterminated"]);
        assert!(matches!(
            opts.interpreter(&config),
            Err(ExpectedError::InterpreterParseError { .. })
        ));
        let (_, opts, _) = parse_run(&["slotrun", "run", "--interpreter", "   "]);
        assert!(matches!(
            opts.interpreter(&config),
            Err(ExpectedError::EmptyInterpreter)
        ));
    }

    #[test]
    fn default_root_is_current_dir() {
        assert_eq!(roots_or_default(Vec::new()), ["."]);
        assert_eq!(roots_or_default(vec!["a".to_owned()]), ["a"]);
    }
}
