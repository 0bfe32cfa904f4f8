//! AI Answer Checker - regression tests for AI agent services
//!
//! Runs declarative YAML test scenarios against a live agent endpoint while
//! an embedded stub server answers the agent's tool calls from fixtures.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use ai_answer_checker::{
    cli::{Cli, Command},
    runner::{RunOptions, TestRunner},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let runner = TestRunner::new(
        cli.configs_dir.clone(),
        cli.tests_dir.clone(),
        cli.reports_dir.clone(),
    );

    match cli.command {
        Command::Run {
            agent,
            test,
            environment,
            dry_run,
            no_reports,
            keep_stubs,
            no_stubs,
        } => {
            let options = RunOptions {
                environment,
                dry_run,
                write_reports: !no_reports,
                keep_stubs,
                no_stubs,
            };
            run_suite(&runner, &agent, test.as_deref(), &options).await
        }
        Command::List => {
            let agents = runner.list_agents();
            if agents.is_empty() {
                println!("No agent test suites found under {}", cli.tests_dir.display());
            } else {
                for agent in agents {
                    println!("{agent}");
                }
            }
            ExitCode::SUCCESS
        }
        Command::Validate { agent } => match runner.validate_agent(&agent) {
            Ok(findings) if findings.is_empty() => {
                println!("All test files for '{agent}' are valid");
                ExitCode::SUCCESS
            }
            Ok(findings) => {
                for (test_name, problems) in findings {
                    for problem in problems {
                        println!("{test_name}: {problem}");
                    }
                }
                ExitCode::FAILURE
            }
            Err(e) => {
                error!(agent = %agent, error = %e, "Validation failed");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run_suite(
    runner: &TestRunner,
    agent: &str,
    test: Option<&str>,
    options: &RunOptions,
) -> ExitCode {
    match runner.run_agent(agent, test, options).await {
        Ok(outcome) => {
            let report = &outcome.report;
            println!(
                "{}: {} | {}/{} passed ({:.1}%), {} failed, {} errors",
                report.agent_name,
                report.overall_status(),
                report.passed,
                report.total_tests,
                report.pass_percentage(),
                report.failed,
                report.errors,
            );
            if let Some(csv) = &outcome.files.csv {
                println!("Report: {}", csv.display());
            }
            if report.failed > 0 || report.errors > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(agent = %agent, error = %e, "Test run failed");
            ExitCode::FAILURE
        }
    }
}
