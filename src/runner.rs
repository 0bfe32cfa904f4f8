//! Test run orchestration
//!
//! Ties the pieces together for one agent run: load the agent config and
//! test suite, bring up the stub server with the right fixtures, send each
//! test case to the agent, compare answers, and emit the report. Each test
//! starts from a freshly registered fixture set so earlier cases cannot
//! shadow later ones.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::{AgentClient, AgentRequest, AgentResponse, LlmConfig};
use crate::compare::Comparator;
use crate::config::{AgentConfigStore, StubConfig};
use crate::report::{ReportFiles, ReportWriter, TestReport, TestResult, TestStatus};
use crate::scenario::{AgentTestSuite, FailedLoad, ScenarioStore, TestCase};
use crate::stub::StubServer;
use crate::{Error, Result};

/// Options for one run, set from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Config environment (`dev`, `staging`, `prod`)
    pub environment: String,
    /// Validate and report without calling the agent
    pub dry_run: bool,
    /// Write CSV and JSON reports after the run
    pub write_reports: bool,
    /// Leave the stub server running after the run, until Ctrl-C
    pub keep_stubs: bool,
    /// Skip the stub server entirely
    pub no_stubs: bool,
}

/// Outcome of a full agent run.
pub struct RunOutcome {
    /// Aggregated report
    pub report: TestReport,
    /// Report files written, when enabled
    pub files: ReportFiles,
}

/// Runs an agent's test suite end to end.
pub struct TestRunner {
    configs: AgentConfigStore,
    scenarios: ScenarioStore,
    reports: ReportWriter,
    stub_config: StubConfig,
    comparator: Comparator,
}

impl TestRunner {
    /// Create a runner over the three working directories.
    #[must_use]
    pub fn new(configs_dir: PathBuf, tests_dir: PathBuf, reports_dir: PathBuf) -> Self {
        Self {
            configs: AgentConfigStore::new(configs_dir),
            scenarios: ScenarioStore::new(tests_dir),
            reports: ReportWriter::new(reports_dir),
            stub_config: StubConfig::default(),
            comparator: Comparator::new(),
        }
    }

    /// Override the stub server bind configuration.
    #[must_use]
    pub fn with_stub_config(mut self, stub_config: StubConfig) -> Self {
        self.stub_config = stub_config;
        self
    }

    /// Agents discovered under the tests directory.
    #[must_use]
    pub fn list_agents(&self) -> Vec<String> {
        self.scenarios.discover_agents()
    }

    /// Validate every test file for an agent without running anything.
    ///
    /// Returns `(test_name, problems)` pairs; an empty list means the suite
    /// is clean.
    pub fn validate_agent(&self, agent_name: &str) -> Result<Vec<(String, Vec<String>)>> {
        let suite = self.scenarios.load_suite(agent_name)?;
        let mut findings = Vec::new();
        for failed in &suite.failed_loads {
            findings.push((failed.test_name.clone(), vec![failed.error.clone()]));
        }
        for case in &suite.test_cases {
            let errors = case.validation_errors();
            if !errors.is_empty() {
                findings.push((case.test_name.clone(), errors));
            }
        }
        Ok(findings)
    }

    /// Run an agent's suite, or a single named test of it.
    pub async fn run_agent(
        &self,
        agent_name: &str,
        test_name: Option<&str>,
        options: &RunOptions,
    ) -> Result<RunOutcome> {
        let config = self.configs.get(agent_name, &options.environment)?;
        let suite = match test_name {
            Some(name) => self.scenarios.load_single(agent_name, name)?,
            None => self.scenarios.load_suite(agent_name)?,
        };
        if suite.total_tests() == 0 {
            return Err(Error::Scenario(format!(
                "No tests to run for agent: {agent_name}"
            )));
        }

        info!(
            agent = %agent_name,
            environment = %options.environment,
            tests = suite.total_tests(),
            dry_run = options.dry_run,
            "Starting test run"
        );

        let mut stub_server = if options.no_stubs || options.dry_run {
            None
        } else {
            let mut server = StubServer::new(self.stub_config.clone());
            server.start().await?;
            Some(server)
        };

        let client = AgentClient::new(config)?;
        let stubs_dir = self.scenarios.stubs_dir(agent_name);

        let run_start = Instant::now();
        let mut results = Vec::with_capacity(suite.total_tests());

        for failed in &suite.failed_loads {
            results.push(load_failure_result(failed));
        }

        for case in &suite.test_cases {
            if let Some(server) = &stub_server {
                register_fixtures(server, &suite, case, &stubs_dir);
            }
            let result = self.run_case(&client, case, options).await;
            info!(
                test = %result.test_name,
                status = result.status.as_str(),
                "Test finished"
            );
            results.push(result);
        }

        let report = build_report(agent_name, &suite, results, run_start);
        info!(
            agent = %agent_name,
            passed = report.passed,
            failed = report.failed,
            errors = report.errors,
            "Test run complete"
        );

        let files = if options.write_reports {
            self.reports.write_report(&report)?
        } else {
            ReportFiles::default()
        };

        if let Some(server) = &mut stub_server {
            if options.keep_stubs {
                info!(port = server.port(), "Keeping stub server running, press Ctrl-C to stop");
                tokio::signal::ctrl_c()
                    .await
                    .map_err(|e| Error::Internal(format!("Failed to wait for Ctrl-C: {e}")))?;
            }
            server.stop().await;
        }

        Ok(RunOutcome { report, files })
    }

    /// Execute one test case against the agent.
    async fn run_case(
        &self,
        client: &AgentClient,
        case: &TestCase,
        options: &RunOptions,
    ) -> TestResult {
        let start = Instant::now();

        let validation_errors = case.validation_errors();
        if !validation_errors.is_empty() {
            warn!(test = %case.test_name, errors = ?validation_errors, "Test case failed validation");
            return error_result(
                case,
                format!("Validation failed: {}", validation_errors.join("; ")),
                start,
            );
        }

        if options.dry_run {
            return TestResult {
                test_name: case.test_name.clone(),
                status: TestStatus::Pass,
                actual_response: None,
                expected_response: Some(case.expected_answer.clone()),
                semantic_score: None,
                comparison_method: Some("dry-run".to_string()),
                comparison_details: Some("Validated without execution".to_string()),
                error_message: None,
                execution_time_ms: elapsed_ms(start),
                tool_calls_made: None,
            };
        }

        if case.is_healthcheck() {
            return self.run_healthcheck(client, case, start).await;
        }

        let request = AgentRequest {
            user_input: case.user_input.clone(),
            variables: case.variables.clone(),
            session_id: format!("test-{}", Uuid::new_v4()),
            llm: LlmConfig::default(),
        };

        let reply = match client.send_query(&request, &case.test_name).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(test = %case.test_name, error = %e, "Agent request failed");
                return error_result(case, format!("Agent request failed: {e}"), start);
            }
        };

        if reply.status >= 400 {
            let e = Error::AgentStatus {
                status: reply.status,
                body: truncate(&reply.body, 500),
            };
            return error_result(case, e.to_string(), start);
        }

        let response = AgentResponse::parse(&reply.body);
        let comparison = self
            .comparator
            .compare(
                &response.answer,
                &case.expected_answer,
                &case.comparison_method,
                case.semantic_threshold,
                case.required_words.as_deref(),
            )
            .await;

        let status = if comparison.error_message.is_some() {
            TestStatus::Error
        } else if comparison.is_match {
            TestStatus::Pass
        } else {
            TestStatus::Fail
        };

        TestResult {
            test_name: case.test_name.clone(),
            status,
            actual_response: Some(response.answer),
            expected_response: Some(case.expected_answer.clone()),
            semantic_score: Some(comparison.score),
            comparison_method: Some(comparison.method),
            comparison_details: comparison.details,
            error_message: comparison.error_message,
            execution_time_ms: elapsed_ms(start),
            tool_calls_made: response.tool_calls_made,
        }
    }

    /// The healthcheck special form: a GET that passes on any 2xx.
    async fn run_healthcheck(
        &self,
        client: &AgentClient,
        case: &TestCase,
        start: Instant,
    ) -> TestResult {
        match client.send_healthcheck(&case.test_name).await {
            Ok(reply) if reply.status < 400 => TestResult {
                test_name: case.test_name.clone(),
                status: TestStatus::Pass,
                actual_response: Some(truncate(&reply.body, 500)),
                expected_response: Some(case.expected_answer.clone()),
                semantic_score: None,
                comparison_method: Some("healthcheck".to_string()),
                comparison_details: Some(format!("HTTP {}", reply.status)),
                error_message: None,
                execution_time_ms: elapsed_ms(start),
                tool_calls_made: None,
            },
            Ok(reply) => error_result(
                case,
                format!("Healthcheck returned HTTP {}", reply.status),
                start,
            ),
            Err(e) => error_result(case, format!("Healthcheck failed: {e}"), start),
        }
    }
}

/// Register the fixtures a test case runs against: the test's own fixtures,
/// with agent-level fixtures prepended at higher priority. The registry is
/// rebuilt per case so fixture order stays deterministic across the suite.
fn register_fixtures(
    server: &StubServer,
    suite: &AgentTestSuite,
    case: &TestCase,
    stubs_dir: &std::path::Path,
) {
    server.clear_fixtures();
    if let Some(stubs) = &case.tool_stubs {
        server.load_test_fixtures(stubs, stubs_dir);
    }
    if let Some(agent_stubs) = &suite.agent_stubs {
        for (tool_key, rules) in agent_stubs {
            server.load_agent_fixtures(tool_key, rules.clone(), stubs_dir);
        }
    }
}

fn build_report(
    agent_name: &str,
    suite: &AgentTestSuite,
    results: Vec<TestResult>,
    run_start: Instant,
) -> TestReport {
    let passed = results.iter().filter(|r| r.status == TestStatus::Pass).count();
    let failed = results.iter().filter(|r| r.status == TestStatus::Fail).count();
    let errors = results.iter().filter(|r| r.status == TestStatus::Error).count();
    TestReport {
        agent_name: agent_name.to_string(),
        total_tests: suite.total_tests(),
        passed,
        failed,
        errors,
        results,
        execution_time_total_ms: elapsed_ms(run_start),
    }
}

fn load_failure_result(failed: &FailedLoad) -> TestResult {
    TestResult {
        test_name: failed.test_name.clone(),
        status: TestStatus::Error,
        actual_response: None,
        expected_response: None,
        semantic_score: None,
        comparison_method: None,
        comparison_details: None,
        error_message: Some(format!("Failed to load test file: {}", failed.error)),
        execution_time_ms: 0.0,
        tool_calls_made: None,
    }
}

fn error_result(case: &TestCase, message: String, start: Instant) -> TestResult {
    TestResult {
        test_name: case.test_name.clone(),
        status: TestStatus::Error,
        actual_response: None,
        expected_response: Some(case.expected_answer.clone()),
        semantic_score: None,
        comparison_method: Some(case.comparison_method.clone()),
        comparison_details: None,
        error_message: Some(message),
        execution_time_ms: elapsed_ms(start),
        tool_calls_made: None,
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
