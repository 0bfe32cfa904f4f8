//! Test result reporting
//!
//! Writes one CSV and one JSON file per run, named
//! `{agent-slug}_results_{YYYY-MM-DDTHH-MM-SSZ}.{csv,json}`. The CSV layout
//! (header, optional summary row, flattened newlines) matches what the
//! downstream tooling already parses.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::{Error, Result};

/// Outcome of one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Answer matched expectations
    Pass,
    /// Answer did not match expectations
    Fail,
    /// The test could not be executed or evaluated
    Error,
}

impl TestStatus {
    /// Lowercase label used in reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Error => "error",
        }
    }
}

/// Result of one executed test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// Test name
    pub test_name: String,
    /// Outcome
    pub status: TestStatus,
    /// Agent's actual answer
    #[serde(default)]
    pub actual_response: Option<String>,
    /// Expected answer from the scenario
    #[serde(default)]
    pub expected_response: Option<String>,
    /// Similarity score, when computed
    #[serde(default)]
    pub semantic_score: Option<f64>,
    /// Comparison method used
    #[serde(default)]
    pub comparison_method: Option<String>,
    /// Human-readable comparison detail
    #[serde(default)]
    pub comparison_details: Option<String>,
    /// Error message for `error` results
    #[serde(default)]
    pub error_message: Option<String>,
    /// Wall time of the test in milliseconds
    pub execution_time_ms: f64,
    /// Tool calls the agent reported making
    #[serde(default)]
    pub tool_calls_made: Option<Value>,
}

/// Complete run report for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    /// Agent name
    pub agent_name: String,
    /// Total test count, including failed loads
    pub total_tests: usize,
    /// Passed count
    pub passed: usize,
    /// Failed count
    pub failed: usize,
    /// Error count
    pub errors: usize,
    /// Per-test results
    pub results: Vec<TestResult>,
    /// Total wall time in milliseconds
    pub execution_time_total_ms: f64,
}

impl TestReport {
    /// Percentage of tests that passed.
    #[must_use]
    pub fn pass_percentage(&self) -> f64 {
        if self.total_tests == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let pct = self.passed as f64 / self.total_tests as f64 * 100.0;
        pct
    }

    /// Overall run status label.
    #[must_use]
    pub fn overall_status(&self) -> &'static str {
        if self.errors > 0 {
            "ERROR"
        } else if self.failed > 0 {
            "FAILED"
        } else if self.passed == self.total_tests {
            "PASSED"
        } else {
            "INCOMPLETE"
        }
    }
}

/// Paths of the files a report run produced.
#[derive(Debug, Clone, Default)]
pub struct ReportFiles {
    /// CSV report path
    pub csv: Option<PathBuf>,
    /// JSON report path
    pub json: Option<PathBuf>,
}

/// Writes reports into an output directory.
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    /// Create a writer rooted at the output directory.
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// Write CSV and JSON reports, returning the paths written.
    pub fn write_report(&self, report: &TestReport) -> Result<ReportFiles> {
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| Error::Report(format!("Failed to create report directory: {e}")))?;

        let slug = agent_slug(&report.agent_name);
        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ");

        let csv_path = self.output_dir.join(format!("{slug}_results_{timestamp}.csv"));
        fs::write(&csv_path, render_csv(report, true))
            .map_err(|e| Error::Report(format!("Failed to write CSV report: {e}")))?;
        info!(path = %csv_path.display(), "Wrote CSV report");

        let json_path = self.output_dir.join(format!("{slug}_results_{timestamp}.json"));
        fs::write(&json_path, serde_json::to_string_pretty(report)?)
            .map_err(|e| Error::Report(format!("Failed to write JSON report: {e}")))?;
        info!(path = %json_path.display(), "Wrote JSON report");

        Ok(ReportFiles {
            csv: Some(csv_path),
            json: Some(json_path),
        })
    }

    /// Most recent CSV report for an agent, if any.
    #[must_use]
    pub fn latest_report(&self, agent_name: &str) -> Option<PathBuf> {
        let prefix = format!("{}_results_", agent_slug(agent_name));
        let mut files: Vec<PathBuf> = fs::read_dir(&self.output_dir)
            .ok()?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "csv"))
            .filter(|p| {
                p.file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(&prefix))
            })
            .collect();
        // timestamped names sort chronologically
        files.sort();
        files.pop()
    }
}

/// URL-safe agent slug for filenames.
fn agent_slug(agent_name: &str) -> String {
    agent_name.replace(['_', ' '], "-").to_lowercase()
}

/// Flatten newlines and trim, keeping one logical CSV line per field.
fn flatten(text: &str) -> String {
    text.replace(['\n', '\r'], " ").trim().to_string()
}

/// Quote a CSV field when it needs quoting.
fn csv_field(text: &str) -> String {
    if text.contains([',', '"']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn csv_row(fields: &[&str]) -> String {
    let quoted: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
    quoted.join(",")
}

fn render_csv(report: &TestReport, include_summary: bool) -> String {
    let mut out = String::new();
    out.push_str("test_name,test_type,status,similarity,error,expected_answer,actual_answer\n");

    if include_summary {
        out.push_str(&csv_row(&[
            &format!("OVERALL_SUMMARY_{}", report.agent_name),
            "summary",
            &report.overall_status().to_lowercase(),
            &format!("{:.1}%", report.pass_percentage()),
            &format!("passed: {}/{}", report.passed, report.total_tests),
            "",
            "",
        ]));
        out.push('\n');
    }

    for result in &report.results {
        let similarity = result
            .semantic_score
            .map(|s| format!("{s:.3}"))
            .unwrap_or_default();
        out.push_str(&csv_row(&[
            &result.test_name,
            result.comparison_method.as_deref().unwrap_or("unknown"),
            result.status.as_str(),
            &similarity,
            &flatten(result.error_message.as_deref().unwrap_or_default()),
            &flatten(result.expected_response.as_deref().unwrap_or_default()),
            &flatten(result.actual_response.as_deref().unwrap_or_default()),
        ]));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_report() -> TestReport {
        TestReport {
            agent_name: "pay_details agent".to_string(),
            total_tests: 2,
            passed: 1,
            failed: 1,
            errors: 0,
            results: vec![
                TestResult {
                    test_name: "basic".to_string(),
                    status: TestStatus::Pass,
                    actual_response: Some("pay is\n100".to_string()),
                    expected_response: Some("pay is 100".to_string()),
                    semantic_score: Some(0.91234),
                    comparison_method: Some("semantic".to_string()),
                    comparison_details: None,
                    error_message: None,
                    execution_time_ms: 12.0,
                    tool_calls_made: None,
                },
                TestResult {
                    test_name: "other".to_string(),
                    status: TestStatus::Fail,
                    actual_response: Some("a, \"quoted\"".to_string()),
                    expected_response: Some("b".to_string()),
                    semantic_score: None,
                    comparison_method: Some("exact".to_string()),
                    comparison_details: None,
                    error_message: None,
                    execution_time_ms: 3.0,
                    tool_calls_made: None,
                },
            ],
            execution_time_total_ms: 15.0,
        }
    }

    #[test]
    fn overall_status_prioritizes_errors() {
        let mut report = sample_report();
        assert_eq!(report.overall_status(), "FAILED");
        report.errors = 1;
        assert_eq!(report.overall_status(), "ERROR");
        report.errors = 0;
        report.failed = 0;
        report.passed = 2;
        assert_eq!(report.overall_status(), "PASSED");
    }

    #[test]
    fn csv_flattens_newlines_and_quotes_commas() {
        let csv = render_csv(&sample_report(), true);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "test_name,test_type,status,similarity,error,expected_answer,actual_answer"
        );
        assert!(lines[1].starts_with("OVERALL_SUMMARY_pay_details agent,summary,failed,50.0%"));
        assert!(lines[2].contains("pay is 100"));
        assert!(!lines[2].contains('\n'));
        assert!(lines[3].contains(r#""a, ""quoted""""#));
    }

    #[test]
    fn writes_and_finds_latest_report() {
        let tmp = TempDir::new().unwrap();
        let writer = ReportWriter::new(tmp.path());
        let files = writer.write_report(&sample_report()).unwrap();
        let csv = files.csv.unwrap();
        assert!(csv.exists());
        assert!(
            csv.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("pay-details-agent_results_")
        );
        assert_eq!(writer.latest_report("pay_details agent").unwrap(), csv);
        assert!(files.json.unwrap().exists());
    }
}
