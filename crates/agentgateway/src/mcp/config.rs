//! MCP proxy configuration (spec.md §4.7): per-route backend list, tool
//! selectors, and the raw authorization-rule list compiled at
//! [`RuntimeConfig::from_raw`](crate::config::RuntimeConfig::from_raw) time.
//! Grounded on the teacher's `mcp/router.rs` `McpBackendGroup`/`McpTarget`
//! shape, narrowed to the plain-HTTP backend list spec.md describes (no
//! SSE/stdio/OpenAPI upstream kinds — out of scope here).

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::mcp::rbac::RawAuthzRule;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfig {
	#[serde(default)]
	pub routes: HashMap<String, McpRoute>,
}

impl McpConfig {
	pub fn route(&self, name: &str) -> Option<&McpRoute> {
		self.routes.get(name)
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpRoute {
	pub backends: Vec<McpBackend>,
	#[serde(default)]
	pub authorization: Vec<RawAuthzRule>,
	#[serde(default)]
	pub default_action: DefaultAction,
	/// Seed combined with a random per-encryption salt to derive the primary
	/// session-encryption key (spec.md §4.7 "Session encryption").
	pub session_seed: String,
	/// Older seed tried on decrypt failure, so rotating `session_seed` doesn't
	/// invalidate sessions minted under the previous one.
	#[serde(default)]
	pub fallback_session_seed: Option<String>,
	/// GET notification-stream heartbeat interval; 0 disables heartbeats.
	#[serde(default = "default_heartbeat_secs")]
	pub heartbeat_interval_secs: u64,
}

fn default_heartbeat_secs() -> u64 {
	30
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultAction {
	#[default]
	Deny,
	Allow,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpBackend {
	pub name: String,
	/// Base URL of the backend's streamable-HTTP MCP endpoint, e.g.
	/// `http://127.0.0.1:9000/mcp`.
	pub address: String,
	#[serde(default)]
	pub tools: ToolSelector,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolSelector {
	#[serde(default)]
	pub include_exact: Vec<String>,
	#[serde(default)]
	pub include_regex: Vec<String>,
}

impl ToolSelector {
	fn as_sets(&self) -> (BTreeSet<&str>, BTreeSet<&str>) {
		(
			self.include_exact.iter().map(String::as_str).collect(),
			self.include_regex.iter().map(String::as_str).collect(),
		)
	}

	/// Whether `tool` is selected by this backend: an exact-name hit, or a
	/// match against any configured regex. Invalid regexes never match rather
	/// than panicking — config validation is expected to have rejected them
	/// earlier, but a stray bad pattern shouldn't take the backend's tool
	/// list down to zero silently either way.
	pub fn selects(&self, tool: &str) -> bool {
		if self.include_exact.iter().any(|t| t == tool) {
			return true;
		}
		self
			.include_regex
			.iter()
			.filter_map(|p| regex::Regex::new(p).ok())
			.any(|re| re.is_match(tool))
	}
}

fn route_fingerprint(route: &McpRoute) -> BTreeSet<(String, BTreeSet<&str>, BTreeSet<&str>)> {
	route
		.backends
		.iter()
		.map(|backend| {
			let (exact, regex) = backend.tools.as_sets();
			(backend.name.clone(), exact, regex)
		})
		.collect()
}

/// spec.md §8: "two `MCPConfig` values with the same set of `(backend,
/// include-set, include-regex-set)` produce `sameTools == true` regardless of
/// list order." Compared as sets, not sequences, so reordering a route's
/// backend list or a selector's entries never registers as a change.
pub fn same_tools(a: &McpConfig, b: &McpConfig) -> bool {
	if a.routes.len() != b.routes.len() {
		return false;
	}
	a.routes.iter().all(|(name, route)| {
		b.routes
			.get(name)
			.is_some_and(|other| route_fingerprint(route) == route_fingerprint(other))
	})
}

/// Per-route variant of [`same_tools`], used by the config-reload path to
/// decide which routes' [`super::sse::ToolChangeSignaler`] to wake rather
/// than notifying every route whenever any one of them changes.
pub fn route_tools_changed(old: Option<&McpRoute>, new: Option<&McpRoute>) -> bool {
	match (old, new) {
		(Some(old), Some(new)) => route_fingerprint(old) != route_fingerprint(new),
		(None, None) => false,
		_ => true,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn route(backends: Vec<McpBackend>) -> McpRoute {
		McpRoute {
			backends,
			authorization: vec![],
			default_action: DefaultAction::Deny,
			session_seed: "seed".to_string(),
			fallback_session_seed: None,
			heartbeat_interval_secs: 30,
		}
	}

	fn backend(name: &str, exact: Vec<&str>) -> McpBackend {
		McpBackend {
			name: name.to_string(),
			address: "http://localhost/mcp".to_string(),
			tools: ToolSelector {
				include_exact: exact.into_iter().map(str::to_string).collect(),
				include_regex: vec![],
			},
		}
	}

	#[test]
	fn same_tools_ignores_order() {
		let mut a = McpConfig::default();
		a.routes.insert(
			"r".to_string(),
			route(vec![backend("one", vec!["a", "b"]), backend("two", vec!["c"])]),
		);
		let mut b = McpConfig::default();
		b.routes.insert(
			"r".to_string(),
			route(vec![backend("two", vec!["c"]), backend("one", vec!["b", "a"])]),
		);
		assert!(same_tools(&a, &b));
	}

	#[test]
	fn same_tools_detects_real_change() {
		let mut a = McpConfig::default();
		a.routes.insert("r".to_string(), route(vec![backend("one", vec!["a"])]));
		let mut b = McpConfig::default();
		b.routes.insert("r".to_string(), route(vec![backend("one", vec!["a", "b"])]));
		assert!(!same_tools(&a, &b));
	}

	#[test]
	fn route_tools_changed_detects_additions_and_ignores_order() {
		let r1 = route(vec![backend("one", vec!["a", "b"]), backend("two", vec!["c"])]);
		let r2 = route(vec![backend("two", vec!["c"]), backend("one", vec!["b", "a"])]);
		assert!(!route_tools_changed(Some(&r1), Some(&r2)));

		let r3 = route(vec![backend("one", vec!["a"])]);
		assert!(route_tools_changed(Some(&r1), Some(&r3)));
		assert!(route_tools_changed(None, Some(&r1)));
		assert!(route_tools_changed(Some(&r1), None));
		assert!(!route_tools_changed(None, None));
	}

	#[test]
	fn tool_selector_matches_exact_and_regex() {
		let sel = ToolSelector {
			include_exact: vec!["exact_tool".to_string()],
			include_regex: vec!["^search_.*".to_string()],
		};
		assert!(sel.selects("exact_tool"));
		assert!(sel.selects("search_docs"));
		assert!(!sel.selects("other"));
	}
}
