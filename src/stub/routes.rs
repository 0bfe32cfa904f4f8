//! Path-template route compilation
//!
//! Routes come from two declaration sources: MCP-style service catalogs
//! (toolkits of tools with `executionUrl` templates) and flat fixture
//! declarations carrying an optional `path_template`. Both converge on
//! [`CompiledRoute`] so the dispatcher never cares which source produced a
//! route.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as Json;
use tracing::warn;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder regex"));

/// A compiled path matcher bound to a tool key.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    /// Tool key resolved fixtures are looked up under
    pub tool_key: String,
    /// HTTP method (uppercase)
    pub method: String,
    /// Source template, kept for dedupe and diagnostics
    pub template: String,
    regex: Regex,
}

impl CompiledRoute {
    /// Compile a `{name}`-style path template into an anchored matcher.
    ///
    /// Returns `None` (with a warning) when the template does not compile;
    /// a bad template never aborts compilation of the rest.
    #[must_use]
    pub fn compile(tool_key: &str, method: &str, template: &str) -> Option<Self> {
        match template_to_regex(template) {
            Ok(regex) => Some(Self {
                tool_key: tool_key.to_string(),
                method: method.to_ascii_uppercase(),
                template: template.to_string(),
                regex,
            }),
            Err(e) => {
                warn!(template = %template, error = %e, "Invalid path template, skipping route");
                None
            }
        }
    }

    /// Match a request path against this route, returning captured path
    /// variables on a hit. The match is anchored: the whole path must match.
    #[must_use]
    pub fn match_path(&self, method: &str, path: &str) -> Option<BTreeMap<String, String>> {
        if !method.eq_ignore_ascii_case(&self.method) {
            return None;
        }
        let caps = self.regex.captures(path)?;
        let mut vars = BTreeMap::new();
        for name in self.regex.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                vars.insert(name.to_string(), m.as_str().to_string());
            }
        }
        Some(vars)
    }
}

/// Convert a template into an anchored regex. Each `{identifier}` becomes a
/// named capture that stops at the next slash; literal text is escaped.
fn template_to_regex(template: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::with_capacity(template.len() + 8);
    pattern.push('^');
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        pattern.push_str(&regex::escape(&template[last..whole.start()]));
        pattern.push_str("(?P<");
        pattern.push_str(&caps[1]);
        pattern.push_str(">[^/]+)");
        last = whole.end();
    }
    pattern.push_str(&regex::escape(&template[last..]));
    pattern.push('$');
    Regex::new(&pattern)
}

/// Compile routes from an MCP service-catalog payload.
///
/// The payload shape is `{toolkits: [{tools: [{name, method, executionUrl}]}]}`;
/// each tool with a name and a URL template yields one route. Anything that
/// does not fit the shape is silently ignored.
#[must_use]
pub fn compile_catalog_routes(payload: &Json) -> Vec<CompiledRoute> {
    let mut routes = Vec::new();
    let toolkits = payload
        .get("toolkits")
        .and_then(Json::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for toolkit in toolkits {
        let tools = toolkit
            .get("tools")
            .and_then(Json::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for tool in tools {
            let Some(name) = tool.get("name").and_then(Json::as_str) else {
                continue;
            };
            let Some(template) = tool.get("executionUrl").and_then(Json::as_str) else {
                continue;
            };
            if template.is_empty() {
                continue;
            }
            let method = tool.get("method").and_then(Json::as_str).unwrap_or("GET");
            routes.extend(CompiledRoute::compile(name, method, template));
        }
    }
    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn template_placeholders_capture_single_segments() {
        let route =
            CompiledRoute::compile("paySlips", "get", "/employees/{employeeId}/payslips").unwrap();
        assert_eq!(route.method, "GET");

        let vars = route.match_path("GET", "/employees/123/payslips").unwrap();
        assert_eq!(vars["employeeId"], "123");

        // captures never span slashes
        assert!(route.match_path("GET", "/employees/1/2/payslips").is_none());
    }

    #[test]
    fn match_is_anchored() {
        let route = CompiledRoute::compile("t", "GET", "/a/{id}").unwrap();
        assert!(route.match_path("GET", "/a/1").is_some());
        assert!(route.match_path("GET", "/a/1/extra").is_none());
        assert!(route.match_path("GET", "/prefix/a/1").is_none());
    }

    #[test]
    fn method_must_match() {
        let route = CompiledRoute::compile("t", "POST", "/a/{id}").unwrap();
        assert!(route.match_path("GET", "/a/1").is_none());
        assert!(route.match_path("post", "/a/1").is_some());
    }

    #[test]
    fn literal_regex_metacharacters_are_escaped() {
        let route = CompiledRoute::compile("t", "GET", "/v1.0/{id}").unwrap();
        assert!(route.match_path("GET", "/v1.0/9").is_some());
        assert!(route.match_path("GET", "/v1x0/9").is_none());
    }

    #[test]
    fn duplicate_placeholder_is_skipped_not_fatal() {
        assert!(CompiledRoute::compile("t", "GET", "/{id}/{id}").is_none());
    }

    #[test]
    fn catalog_payload_yields_one_route_per_tool() {
        let payload = json!({
            "toolkits": [{
                "tools": [
                    {"name": "paySlips", "method": "GET", "executionUrl": "/employees/{employeeId}/payslips"},
                    {"name": "payDetails", "executionUrl": "/employees/{employeeId}/details"},
                    {"name": "broken"},
                ]
            }]
        });
        let routes = compile_catalog_routes(&payload);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].tool_key, "paySlips");
        // method defaults to GET
        assert_eq!(routes[1].method, "GET");
    }

    #[test]
    fn non_catalog_payload_yields_nothing() {
        assert!(compile_catalog_routes(&json!({"answer": 42})).is_empty());
        assert!(compile_catalog_routes(&json!([1, 2])).is_empty());
    }
}
