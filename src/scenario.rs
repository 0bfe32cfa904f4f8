//! Test scenario model and discovery
//!
//! Scenarios live as one YAML file per test case under
//! `<tests-root>/<agent>/`, with fixture payloads under
//! `<tests-root>/<agent>/stubs/` and optional agent-level fixtures in
//! `agent-services.yaml`. A malformed file is recorded as a failed load and
//! never aborts the rest of the suite.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::stub::FixtureRule;
use crate::{Error, Result};

/// One declarative test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// Test name, taken from the file stem rather than the YAML body
    #[serde(default)]
    pub test_name: String,
    /// Variables forwarded to the agent alongside the input
    #[serde(default)]
    pub variables: Option<serde_json::Map<String, Value>>,
    /// The user input sent to the agent
    pub user_input: String,
    /// The expected answer
    pub expected_answer: String,
    /// Similarity threshold for the `semantic` comparison method
    #[serde(default = "default_threshold")]
    pub semantic_threshold: f64,
    /// Comparison method: `semantic`, `exact`, or `substring`
    #[serde(default = "default_method")]
    pub comparison_method: String,
    /// Words that must appear in the answer (substring method only)
    #[serde(default)]
    pub required_words: Option<Vec<String>>,
    /// Tool fixtures keyed by tool name
    #[serde(default)]
    pub tool_stubs: Option<BTreeMap<String, Vec<FixtureRule>>>,
}

fn default_threshold() -> f64 {
    0.85
}

fn default_method() -> String {
    "semantic".to_string()
}

impl TestCase {
    /// Load a test case from a YAML file; the file stem becomes the name.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Scenario(format!("Test file not found: {}: {e}", path.display())))?;
        let mut case: Self = serde_yaml::from_str(&content)?;
        case.test_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(case)
    }

    /// Whether this case is the healthcheck special form.
    #[must_use]
    pub fn is_healthcheck(&self) -> bool {
        self.test_name.eq_ignore_ascii_case("healthcheck")
    }

    /// Structural validation before a request is built.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.user_input.trim().is_empty() {
            errors.push("user_input must not be empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.semantic_threshold) {
            errors.push("semantic_threshold must be between 0.0 and 1.0".to_string());
        }
        match self.comparison_method.as_str() {
            "semantic" | "exact" => {}
            "substring" => {
                if self.required_words.as_ref().is_none_or(Vec::is_empty) {
                    errors.push("substring comparison requires required_words".to_string());
                }
            }
            other => errors.push(format!("Unknown comparison method: {other}")),
        }
        errors
    }
}

/// A YAML file that failed to load, carried through to the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedLoad {
    /// Test name (file stem)
    pub test_name: String,
    /// Parse or IO error message
    pub error: String,
    /// Path of the offending file
    pub file_path: String,
}

/// All test cases for one agent.
#[derive(Debug, Clone)]
pub struct AgentTestSuite {
    /// Agent the suite belongs to
    pub agent_name: String,
    /// Successfully loaded cases
    pub test_cases: Vec<TestCase>,
    /// Files that failed to parse
    pub failed_loads: Vec<FailedLoad>,
    /// Agent-level fixtures applied to every test, highest priority
    pub agent_stubs: Option<BTreeMap<String, Vec<FixtureRule>>>,
}

impl AgentTestSuite {
    /// Total cases including failed loads.
    #[must_use]
    pub fn total_tests(&self) -> usize {
        self.test_cases.len() + self.failed_loads.len()
    }
}

/// Shape of `agent-services.yaml`.
#[derive(Debug, Deserialize)]
struct AgentServicesFile {
    #[serde(default)]
    agent_stubs: Option<BTreeMap<String, Vec<FixtureRule>>>,
}

/// Discovers and loads test scenarios from the tests root directory.
pub struct ScenarioStore {
    tests_root: PathBuf,
}

impl ScenarioStore {
    /// Create a store rooted at the tests directory.
    pub fn new<P: AsRef<Path>>(tests_root: P) -> Self {
        Self {
            tests_root: tests_root.as_ref().to_path_buf(),
        }
    }

    /// Agent test directory.
    #[must_use]
    pub fn agent_dir(&self, agent_name: &str) -> PathBuf {
        self.tests_root.join(agent_name)
    }

    /// Directory holding an agent's fixture payload files.
    #[must_use]
    pub fn stubs_dir(&self, agent_name: &str) -> PathBuf {
        self.agent_dir(agent_name).join("stubs")
    }

    /// List agents that have at least one YAML test file.
    #[must_use]
    pub fn discover_agents(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.tests_root) else {
            warn!(path = %self.tests_root.display(), "Tests directory not found");
            return Vec::new();
        };
        let mut agents: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .filter(|e| !Self::yaml_files_in(&e.path()).is_empty())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        agents.sort();
        info!(count = agents.len(), "Discovered agent test directories");
        agents
    }

    /// All YAML test files for an agent, sorted, excluding the agent-level
    /// services file and hidden files.
    pub fn discover_test_files(&self, agent_name: &str) -> Result<Vec<PathBuf>> {
        let dir = self.agent_dir(agent_name);
        if !dir.is_dir() {
            return Err(Error::Scenario(format!(
                "Agent test directory not found: {}",
                dir.display()
            )));
        }
        let mut files = Self::yaml_files_in(&dir);
        files.retain(|f| {
            f.file_stem()
                .is_none_or(|s| s.to_string_lossy() != "agent-services")
        });
        files.sort();
        debug!(agent = %agent_name, count = files.len(), "Discovered test files");
        Ok(files)
    }

    fn yaml_files_in(dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .filter(|p| {
                p.file_name()
                    .is_none_or(|n| !n.to_string_lossy().starts_with('.'))
            })
            .collect()
    }

    /// Load every test case for an agent, tolerating individual failures.
    pub fn load_suite(&self, agent_name: &str) -> Result<AgentTestSuite> {
        let files = self.discover_test_files(agent_name)?;
        if files.is_empty() {
            return Err(Error::Scenario(format!(
                "No test files found for agent: {agent_name}"
            )));
        }

        let mut test_cases = Vec::new();
        let mut failed_loads = Vec::new();
        for file in files {
            match TestCase::from_yaml_file(&file) {
                Ok(case) => test_cases.push(case),
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "Failed to load test case");
                    failed_loads.push(FailedLoad {
                        test_name: file
                            .file_stem()
                            .map(|s| s.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        error: e.to_string(),
                        file_path: file.display().to_string(),
                    });
                }
            }
        }

        let agent_stubs = self.load_agent_stubs(agent_name);
        info!(
            agent = %agent_name,
            tests = test_cases.len(),
            failed = failed_loads.len(),
            "Loaded test suite"
        );
        Ok(AgentTestSuite {
            agent_name: agent_name.to_string(),
            test_cases,
            failed_loads,
            agent_stubs,
        })
    }

    /// Load a single named test into a one-case suite.
    pub fn load_single(&self, agent_name: &str, test_name: &str) -> Result<AgentTestSuite> {
        let dir = self.agent_dir(agent_name);
        if !dir.is_dir() {
            return Err(Error::Scenario(format!(
                "Agent test directory not found: {}",
                dir.display()
            )));
        }
        let file = ["yaml", "yml"]
            .iter()
            .map(|ext| dir.join(format!("{test_name}.{ext}")))
            .find(|p| p.exists())
            .ok_or_else(|| {
                Error::Scenario(format!(
                    "Test file not found: {test_name}.yaml (or .yml) in {}",
                    dir.display()
                ))
            })?;

        let (test_cases, failed_loads) = match TestCase::from_yaml_file(&file) {
            Ok(case) => (vec![case], Vec::new()),
            Err(e) => (
                Vec::new(),
                vec![FailedLoad {
                    test_name: test_name.to_string(),
                    error: e.to_string(),
                    file_path: file.display().to_string(),
                }],
            ),
        };

        Ok(AgentTestSuite {
            agent_name: agent_name.to_string(),
            test_cases,
            failed_loads,
            agent_stubs: self.load_agent_stubs(agent_name),
        })
    }

    /// Agent-level fixtures from `agent-services.yaml`, if present.
    fn load_agent_stubs(&self, agent_name: &str) -> Option<BTreeMap<String, Vec<FixtureRule>>> {
        let dir = self.agent_dir(agent_name);
        let file = ["agent-services.yaml", "agent-services.yml"]
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.exists())?;

        match fs::read_to_string(&file)
            .map_err(Error::from)
            .and_then(|content| serde_yaml::from_str::<AgentServicesFile>(&content).map_err(Error::from))
        {
            Ok(parsed) => {
                let stubs = parsed.agent_stubs?;
                info!(agent = %agent_name, tools = ?stubs.keys().collect::<Vec<_>>(), "Loaded agent-level stubs");
                Some(stubs)
            }
            Err(e) => {
                warn!(file = %file.display(), error = %e, "Failed to load agent-services.yaml");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    const VALID_TEST: &str = "user_input: What is my pay?\nexpected_answer: Your pay is 100.\n";

    #[test]
    fn test_name_comes_from_file_stem() {
        let tmp = TempDir::new().unwrap();
        let agent = tmp.path().join("payroll");
        write(&agent, "basic_pay.yaml", VALID_TEST);

        let case = TestCase::from_yaml_file(&agent.join("basic_pay.yaml")).unwrap();
        assert_eq!(case.test_name, "basic_pay");
        assert_eq!(case.comparison_method, "semantic");
        assert!((case.semantic_threshold - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn suite_tolerates_malformed_files() {
        let tmp = TempDir::new().unwrap();
        let agent = tmp.path().join("payroll");
        write(&agent, "good.yaml", VALID_TEST);
        write(&agent, "bad.yaml", "user_input: [unclosed\n");

        let store = ScenarioStore::new(tmp.path());
        let suite = store.load_suite("payroll").unwrap();
        assert_eq!(suite.test_cases.len(), 1);
        assert_eq!(suite.failed_loads.len(), 1);
        assert_eq!(suite.failed_loads[0].test_name, "bad");
        assert_eq!(suite.total_tests(), 2);
    }

    #[test]
    fn tool_stubs_deserialize_into_fixture_rules() {
        let tmp = TempDir::new().unwrap();
        let agent = tmp.path().join("payroll");
        write(
            &agent,
            "stubbed.yaml",
            "user_input: hi\nexpected_answer: hello\ntool_stubs:\n  paySlips:\n    - request:\n        employeeId: 123\n      response_file: payslips/123\n      method: GET\n      path_template: /employees/{employeeId}/payslips\n",
        );

        let case = TestCase::from_yaml_file(&agent.join("stubbed.yaml")).unwrap();
        let stubs = case.tool_stubs.unwrap();
        let rules = &stubs["paySlips"];
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].response_file, "payslips/123");
        assert_eq!(
            rules[0].path_template.as_deref(),
            Some("/employees/{employeeId}/payslips")
        );
    }

    #[test]
    fn discover_agents_skips_dirs_without_yaml() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("with-tests"), "t.yaml", VALID_TEST);
        fs::create_dir_all(tmp.path().join("empty")).unwrap();

        let store = ScenarioStore::new(tmp.path());
        assert_eq!(store.discover_agents(), vec!["with-tests".to_string()]);
    }

    #[test]
    fn agent_services_file_is_not_a_test_case() {
        let tmp = TempDir::new().unwrap();
        let agent = tmp.path().join("payroll");
        write(&agent, "t.yaml", VALID_TEST);
        write(
            &agent,
            "agent-services.yaml",
            "agent_stubs:\n  api/mcp/service/payMCP:\n    - request: {}\n      response_file: catalog\n",
        );

        let store = ScenarioStore::new(tmp.path());
        let suite = store.load_suite("payroll").unwrap();
        assert_eq!(suite.test_cases.len(), 1);
        let stubs = suite.agent_stubs.unwrap();
        assert!(stubs.contains_key("api/mcp/service/payMCP"));
    }

    #[test]
    fn substring_method_requires_words() {
        let tmp = TempDir::new().unwrap();
        let agent = tmp.path().join("a");
        write(
            &agent,
            "s.yaml",
            "user_input: hi\nexpected_answer: ignored\ncomparison_method: substring\n",
        );
        let case = TestCase::from_yaml_file(&agent.join("s.yaml")).unwrap();
        assert!(!case.validation_errors().is_empty());
    }
}
