//! Fixture registry and response resolution
//!
//! The registry holds, per tool key, an ordered list of fixture rules.
//! Insertion order is the precedence order: the earliest rule whose pattern
//! matches wins, and when nothing matches the first-registered rule is
//! served anyway. That fallback mirrors the documented harness policy of
//! convenience over precision; it is flagged on the resolution so callers
//! can observe (and tests can assert) when it fires.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};
use tracing::{debug, info, warn};

use super::routes::{CompiledRoute, compile_catalog_routes};
use super::value::ParamValue;
use super::matcher::params_match;

/// Tool keys with this prefix hold MCP service-catalog fixtures; their
/// payloads are mined for `executionUrl` route templates.
pub const MCP_SERVICE_PREFIX: &str = "api/mcp/service/";

/// One declared fixture: a request pattern plus the file naming its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureRule {
    /// Declared request pattern; empty means "match any request"
    #[serde(default)]
    pub request: serde_json::Map<String, Json>,
    /// Payload file, relative to the stubs base directory (`.json` implied)
    pub response_file: String,
    /// HTTP method for template routing (default GET)
    #[serde(default)]
    pub method: Option<String>,
    /// Optional path template, e.g. `/employees/{employeeId}/summary`
    #[serde(default)]
    pub path_template: Option<String>,
}

/// Outcome of resolving a tool key against the registry.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The fixture payload to serve
    pub payload: Json,
    /// True when no pattern matched and the first-registered fixture was
    /// served as a fallback
    pub fallback: bool,
}

/// Ordered fixture store plus the compiled routes derived from it.
#[derive(Default)]
pub struct FixtureRegistry {
    fixtures: HashMap<String, Vec<FixtureRule>>,
    routes: Vec<CompiledRoute>,
    base_dir: Option<PathBuf>,
    payload_cache: Mutex<HashMap<PathBuf, Json>>,
}

impl FixtureRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register agent-level fixtures for one tool key.
    ///
    /// Agent-level fixtures are prepended so they outrank per-test fixtures
    /// even though they are loaded first. Catalog keys additionally have
    /// their payloads compiled into path routes.
    pub fn register_agent_fixtures(
        &mut self,
        tool_key: &str,
        rules: Vec<FixtureRule>,
        base_dir: &Path,
    ) {
        if rules.is_empty() {
            return;
        }
        if self.base_dir.is_none() {
            self.base_dir = Some(base_dir.to_path_buf());
        }

        if tool_key.starts_with(MCP_SERVICE_PREFIX) {
            for rule in &rules {
                let payload = self.load_payload(&rule.response_file);
                for route in compile_catalog_routes(&payload) {
                    self.add_route(route);
                }
            }
        }
        self.compile_fixture_routes(tool_key, &rules);

        let entry = self.fixtures.entry(tool_key.to_string()).or_default();
        let existing = std::mem::take(entry);
        entry.extend(rules);
        entry.extend(existing);

        debug!(tool = %tool_key, "Registered agent-level fixtures");
    }

    /// Register per-test fixtures, keyed by tool. Empty lists are dropped so
    /// a registered tool key always has at least one fixture.
    pub fn register_test_fixtures(
        &mut self,
        stubs: &BTreeMap<String, Vec<FixtureRule>>,
        base_dir: &Path,
    ) {
        if self.base_dir.is_none() {
            self.base_dir = Some(base_dir.to_path_buf());
        }
        for (tool_key, rules) in stubs {
            if rules.is_empty() {
                continue;
            }
            self.compile_fixture_routes(tool_key, rules);
            self.fixtures
                .entry(tool_key.clone())
                .or_default()
                .extend(rules.iter().cloned());
        }
        info!(tools = ?stubs.keys().collect::<Vec<_>>(), "Registered test fixtures");
    }

    /// Compile routes declared inline on fixture rules via `path_template`.
    fn compile_fixture_routes(&mut self, tool_key: &str, rules: &[FixtureRule]) {
        if tool_key.starts_with(MCP_SERVICE_PREFIX) {
            return;
        }
        for rule in rules {
            let Some(template) = rule.path_template.as_deref() else {
                continue;
            };
            let method = rule.method.as_deref().unwrap_or("GET");
            if let Some(route) = CompiledRoute::compile(tool_key, method, template) {
                self.add_route(route);
            }
        }
    }

    /// Routes are deduped by `(template, method)` so re-registering the same
    /// declarations stays idempotent.
    fn add_route(&mut self, route: CompiledRoute) {
        let exists = self
            .routes
            .iter()
            .any(|r| r.template == route.template && r.method == route.method);
        if !exists {
            self.routes.push(route);
        }
    }

    /// Match a request path against the compiled routes, in compilation
    /// order. Returns the owning tool key and the captured path variables.
    #[must_use]
    pub fn match_route(&self, method: &str, path: &str) -> Option<(String, BTreeMap<String, String>)> {
        self.routes
            .iter()
            .find_map(|r| r.match_path(method, path).map(|vars| (r.tool_key.clone(), vars)))
    }

    /// Resolve a tool key against the registry.
    ///
    /// Fixtures are tried in registration (priority) order; the first whose
    /// pattern is satisfied wins. When none matches, the first fixture is
    /// served with `fallback: true`. Returns `None` only for unknown keys.
    #[must_use]
    pub fn resolve(&self, tool_key: &str, params: &BTreeMap<String, ParamValue>) -> Option<Resolution> {
        let rules = self.fixtures.get(tool_key)?;

        for rule in rules {
            if params_match(&rule.request, params) {
                return Some(Resolution {
                    payload: self.load_payload(&rule.response_file),
                    fallback: false,
                });
            }
        }

        // Deliberate convenience-over-precision policy: serve the highest
        // priority fixture even though its pattern did not match.
        let first = rules.first()?;
        warn!(
            tool = %tool_key,
            response_file = %first.response_file,
            "No fixture pattern matched, serving first registered fixture"
        );
        Some(Resolution {
            payload: self.load_payload(&first.response_file),
            fallback: true,
        })
    }

    /// Load a fixture payload, defaulting the `.json` extension and caching
    /// by resolved path. Missing or unparsable files yield an in-band error
    /// object rather than a hard failure.
    #[must_use]
    pub fn load_payload(&self, response_file: &str) -> Json {
        let Some(base_dir) = &self.base_dir else {
            warn!("Stubs base directory not set");
            return json!({"error": "Stubs not configured"});
        };

        let relative = if Path::new(response_file).extension().is_some() {
            response_file.to_string()
        } else {
            format!("{response_file}.json")
        };
        let path = base_dir.join(relative);

        if let Some(cached) = self.payload_cache.lock().get(&path) {
            return cached.clone();
        }

        let payload = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Json>(&content) {
                Ok(value) => value,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse fixture payload");
                    json!({"error": format!("Failed to load stub: {e}")})
                }
            },
            Err(_) => {
                warn!(path = %path.display(), "Fixture payload file not found");
                json!({"error": format!("Stub file not found: {response_file}")})
            }
        };

        self.payload_cache.lock().insert(path, payload.clone());
        payload
    }

    /// Tool keys currently registered, sorted for stable reporting.
    #[must_use]
    pub fn loaded_tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = self.fixtures.keys().cloned().collect();
        tools.sort();
        tools
    }

    /// Total number of registered fixtures across all tools.
    #[must_use]
    pub fn total_fixtures(&self) -> usize {
        self.fixtures.values().map(Vec::len).sum()
    }

    /// Drop all fixtures, routes, and cached payloads.
    pub fn clear(&mut self) {
        self.fixtures.clear();
        self.routes.clear();
        self.payload_cache.lock().clear();
        debug!("Cleared all fixtures");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::value::normalize_params;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_fixture(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut f = fs::File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    fn rule(pattern: Json, file: &str) -> FixtureRule {
        FixtureRule {
            request: pattern.as_object().cloned().unwrap_or_default(),
            response_file: file.to_string(),
            method: None,
            path_template: None,
        }
    }

    fn params(v: Json) -> BTreeMap<String, ParamValue> {
        normalize_params(v.as_object().expect("object"))
    }

    #[test]
    fn resolves_first_matching_fixture_in_order() {
        let tmp = TempDir::new().unwrap();
        write_fixture(tmp.path(), "a.json", r#"{"which": "a"}"#);
        write_fixture(tmp.path(), "b.json", r#"{"which": "b"}"#);

        let mut registry = FixtureRegistry::new();
        let mut stubs = BTreeMap::new();
        stubs.insert(
            "tool".to_string(),
            vec![rule(json!({"id": 1}), "a"), rule(json!({"id": 2}), "b")],
        );
        registry.register_test_fixtures(&stubs, tmp.path());

        let res = registry.resolve("tool", &params(json!({"id": "2"}))).unwrap();
        assert!(!res.fallback);
        assert_eq!(res.payload, json!({"which": "b"}));
    }

    #[test]
    fn registration_order_beats_pattern_specificity() {
        let tmp = TempDir::new().unwrap();
        write_fixture(tmp.path(), "agent.json", r#"{"which": "agent"}"#);
        write_fixture(tmp.path(), "test.json", r#"{"which": "test"}"#);

        let mut registry = FixtureRegistry::new();
        registry.register_agent_fixtures("x", vec![rule(json!({}), "agent")], tmp.path());
        let mut stubs = BTreeMap::new();
        stubs.insert("x".to_string(), vec![rule(json!({"id": 1}), "test")]);
        registry.register_test_fixtures(&stubs, tmp.path());

        // the empty agent pattern is earlier in the list, so it wins even
        // for requests the test fixture declares explicitly
        let res = registry.resolve("x", &params(json!({"id": 1}))).unwrap();
        assert_eq!(res.payload, json!({"which": "agent"}));
        let res = registry.resolve("x", &params(json!({"id": 2}))).unwrap();
        assert_eq!(res.payload, json!({"which": "agent"}));
    }

    #[test]
    fn falls_back_to_first_fixture_when_nothing_matches() {
        let tmp = TempDir::new().unwrap();
        write_fixture(tmp.path(), "f1.json", r#"{"which": "f1"}"#);
        write_fixture(tmp.path(), "f2.json", r#"{"which": "f2"}"#);

        let mut registry = FixtureRegistry::new();
        let mut stubs = BTreeMap::new();
        stubs.insert(
            "y".to_string(),
            vec![rule(json!({"id": 1}), "f1"), rule(json!({"id": 2}), "f2")],
        );
        registry.register_test_fixtures(&stubs, tmp.path());

        let res = registry.resolve("y", &params(json!({"id": 99}))).unwrap();
        assert!(res.fallback);
        assert_eq!(res.payload, json!({"which": "f1"}));
    }

    #[test]
    fn unknown_tool_resolves_to_none() {
        let registry = FixtureRegistry::new();
        assert!(registry.resolve("nope", &BTreeMap::new()).is_none());
    }

    #[test]
    fn missing_payload_file_is_an_in_band_error() {
        let tmp = TempDir::new().unwrap();
        let mut registry = FixtureRegistry::new();
        let mut stubs = BTreeMap::new();
        stubs.insert("z".to_string(), vec![rule(json!({}), "missing")]);
        registry.register_test_fixtures(&stubs, tmp.path());

        let res = registry.resolve("z", &BTreeMap::new()).unwrap();
        assert!(res.payload.get("error").is_some());
    }

    #[test]
    fn empty_fixture_lists_are_not_registered() {
        let tmp = TempDir::new().unwrap();
        let mut registry = FixtureRegistry::new();
        let mut stubs = BTreeMap::new();
        stubs.insert("empty".to_string(), Vec::new());
        registry.register_test_fixtures(&stubs, tmp.path());
        assert!(registry.loaded_tools().is_empty());
        assert!(registry.resolve("empty", &BTreeMap::new()).is_none());
    }

    #[test]
    fn catalog_fixture_compiles_routes_from_payload() {
        let tmp = TempDir::new().unwrap();
        write_fixture(
            tmp.path(),
            "catalog.json",
            r#"{"toolkits": [{"tools": [
                {"name": "paySlips", "method": "GET", "executionUrl": "/employees/{employeeId}/payslips"}
            ]}]}"#,
        );

        let mut registry = FixtureRegistry::new();
        registry.register_agent_fixtures(
            "api/mcp/service/payDetailsMCP",
            vec![rule(json!({}), "catalog")],
            tmp.path(),
        );

        let (tool, vars) = registry.match_route("GET", "/employees/7/payslips").unwrap();
        assert_eq!(tool, "paySlips");
        assert_eq!(vars["employeeId"], "7");
    }

    #[test]
    fn routes_dedupe_by_template_and_method() {
        let tmp = TempDir::new().unwrap();
        write_fixture(tmp.path(), "r.json", "{}");

        let mut registry = FixtureRegistry::new();
        let mut stubs = BTreeMap::new();
        let mut with_template = rule(json!({}), "r");
        with_template.path_template = Some("/things/{id}".to_string());
        stubs.insert("things".to_string(), vec![with_template]);
        registry.register_test_fixtures(&stubs, tmp.path());
        registry.register_test_fixtures(&stubs, tmp.path());

        assert_eq!(registry.routes.len(), 1);
    }

    #[test]
    fn payloads_are_cached_after_first_read() {
        let tmp = TempDir::new().unwrap();
        write_fixture(tmp.path(), "once.json", r#"{"v": 1}"#);

        let mut registry = FixtureRegistry::new();
        let mut stubs = BTreeMap::new();
        stubs.insert("once".to_string(), vec![rule(json!({}), "once")]);
        registry.register_test_fixtures(&stubs, tmp.path());

        assert_eq!(registry.load_payload("once"), json!({"v": 1}));
        // mutate the file on disk; the cache keeps serving the first read
        write_fixture(tmp.path(), "once.json", r#"{"v": 2}"#);
        assert_eq!(registry.load_payload("once"), json!({"v": 1}));
    }
}
