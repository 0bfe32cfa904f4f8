//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Regression test harness for AI agent services
#[derive(Parser, Debug)]
#[command(name = "ai-answer-checker")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding per-agent test scenarios
    #[arg(long, default_value = "tests", env = "AAC_TESTS_DIR", global = true)]
    pub tests_dir: PathBuf,

    /// Directory holding agent endpoint configurations
    #[arg(long, default_value = "configs", env = "AAC_CONFIGS_DIR", global = true)]
    pub configs_dir: PathBuf,

    /// Directory reports are written into
    #[arg(long, default_value = "reports", env = "AAC_REPORTS_DIR", global = true)]
    pub reports_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "AAC_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (json for structured output)
    #[arg(long, env = "AAC_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Harness subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an agent's test suite
    Run {
        /// Agent name (its directory under the tests root)
        agent: String,

        /// Run a single named test instead of the whole suite
        #[arg(long)]
        test: Option<String>,

        /// Config environment to resolve the agent endpoint in
        #[arg(short, long, default_value = "dev", env = "AAC_ENVIRONMENT")]
        environment: String,

        /// Validate and report without calling the agent
        #[arg(long)]
        dry_run: bool,

        /// Skip writing CSV and JSON report files
        #[arg(long)]
        no_reports: bool,

        /// Keep the stub server running after the run, until Ctrl-C
        #[arg(long)]
        keep_stubs: bool,

        /// Do not start the stub server
        #[arg(long)]
        no_stubs: bool,
    },

    /// List agents that have test suites
    List,

    /// Validate an agent's test files without running them
    Validate {
        /// Agent name
        agent: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_run_with_flags() {
        let cli = Cli::parse_from([
            "ai-answer-checker",
            "run",
            "payroll",
            "--test",
            "basic_pay",
            "--environment",
            "staging",
            "--dry-run",
            "--no-reports",
        ]);
        let Command::Run {
            agent,
            test,
            environment,
            dry_run,
            no_reports,
            keep_stubs,
            no_stubs,
        } = cli.command
        else {
            panic!("expected run command");
        };
        assert_eq!(agent, "payroll");
        assert_eq!(test.as_deref(), Some("basic_pay"));
        assert_eq!(environment, "staging");
        assert!(dry_run);
        assert!(no_reports);
        assert!(!keep_stubs);
        assert!(!no_stubs);
    }

    #[test]
    fn global_dirs_have_defaults() {
        let cli = Cli::parse_from(["ai-answer-checker", "list"]);
        assert_eq!(cli.tests_dir, PathBuf::from("tests"));
        assert_eq!(cli.configs_dir, PathBuf::from("configs"));
        assert_eq!(cli.reports_dir, PathBuf::from("reports"));
        assert_eq!(cli.log_level, "info");
    }
}
