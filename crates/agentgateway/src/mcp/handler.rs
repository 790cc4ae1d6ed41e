//! MCP HTTP handler (spec.md §4.7): the single handler bound to a route's
//! root path, dispatching by HTTP method. Route selection happens upstream
//! (the `x-ai-eg-mcp-route` header, stamped by the ext-processor pipeline
//! before the request reaches this handler — spec.md §6), so this module
//! only ever resolves a route by that header, never by URL path.
//!
//! Ties together `session.rs` (fan-out/dispatch/crypto), `rbac.rs`
//! (authorization), `sse.rs` (notification stream + tool-change signaling)
//! and `config.rs` (route/tool-selector config) into the four method
//! handlers spec.md names. No server-side session store: every piece of
//! state needed to serve a request after `initialize` travels inside the
//! encrypted composite session id, per spec.md §6 ("Persisted state:
//! none").

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use sse_stream::SseBody;

use crate::config::{ConfigHandle, RuntimeConfig};
use crate::ext_proc::{HEADER_MCP_BACKEND, HEADER_MCP_ROUTE};
use crate::mcp::config::{McpConfig, McpRoute, route_tools_changed};
use crate::mcp::rbac::{Decision, EvalVars, McpAuthorizationSet, parse_bearer_claims};
use crate::mcp::session::{
	CompositeSessionId, HttpClient, MCP_SESSION_ID_HEADER, SessionCrypto, dispatch_merge_tools, dispatch_single,
	fan_out_initialize, new_http_client, terminate_all,
};
use crate::mcp::sse::{ToolChangeSignaler, notification_stream_response};
use crate::mcp::McpError;

pub struct McpHandler {
	config: ConfigHandle,
	client: HttpClient,
	signalers: DashMap<String, Arc<ToolChangeSignaler>>,
	authz_cache: Mutex<Option<(uuid::Uuid, Arc<HashMap<String, Arc<McpAuthorizationSet>>>)>>,
}

impl McpHandler {
	pub fn new(config: ConfigHandle) -> Self {
		Self {
			config,
			client: new_http_client(),
			signalers: DashMap::new(),
			authz_cache: Mutex::new(None),
		}
	}

	fn signaler_for(&self, route: &str) -> Arc<ToolChangeSignaler> {
		self
			.signalers
			.entry(route.to_string())
			.or_insert_with(|| Arc::new(ToolChangeSignaler::new()))
			.clone()
	}

	/// Called by the config-reload path whenever `RuntimeConfig.mcp` changes,
	/// so every active `GET` watcher on a route whose tool configuration
	/// actually changed gets woken (spec.md §5's reloadable-channel
	/// broadcaster; spec.md §8's per-route `sameTools` property).
	pub fn notify_tool_changes(&self, old: &McpConfig, new: &McpConfig) {
		for (name, route) in new.routes.iter() {
			if route_tools_changed(old.route(name), Some(route)) {
				self.signaler_for(name).notify_changed();
			}
		}
		for name in old.routes.keys() {
			if !new.routes.contains_key(name) {
				self.signaler_for(name).notify_changed();
			}
		}
	}

	/// Compiled authorization rule sets are cached per config generation
	/// (`RuntimeConfig.uuid`), matching the compile-once-at-reload idiom
	/// `config.rs`'s `CostRule` already uses, rather than re-compiling CEL
	/// programs on every tool call.
	fn authorization_for(&self, route_name: &str, route: &McpRoute, runtime: &RuntimeConfig) -> Arc<McpAuthorizationSet> {
		{
			let guard = self.authz_cache.lock().expect("authz cache mutex poisoned");
			if let Some((uuid, map)) = guard.as_ref()
				&& *uuid == runtime.uuid
				&& let Some(set) = map.get(route_name)
			{
				return set.clone();
			}
		}
		let mut map = HashMap::new();
		for (name, r) in runtime.mcp.routes.iter() {
			match McpAuthorizationSet::compile(&r.authorization, r.default_action) {
				Ok(set) => {
					map.insert(name.clone(), Arc::new(set));
				},
				Err(error) => tracing::warn!(route = %name, %error, "failed to compile mcp authorization rules"),
			}
		}
		let map = Arc::new(map);
		let set = map
			.get(route_name)
			.cloned()
			.unwrap_or_else(|| Arc::new(McpAuthorizationSet::compile(&[], route.default_action).expect("empty rule set compiles")));
		*self.authz_cache.lock().expect("authz cache mutex poisoned") = Some((runtime.uuid, map));
		set
	}

	fn crypto_for(route: &McpRoute) -> SessionCrypto {
		SessionCrypto::new(route.session_seed.clone(), route.fallback_session_seed.clone())
	}

	fn route_for<'r>(&self, headers: &http::HeaderMap, runtime: &'r RuntimeConfig) -> Result<(String, &'r McpRoute), McpError> {
		let name = headers
			.get(HEADER_MCP_ROUTE)
			.and_then(|v| v.to_str().ok())
			.ok_or(McpError::UnknownRoute)?;
		let route = runtime.mcp.route(name).ok_or(McpError::UnknownRoute)?;
		Ok((name.to_string(), route))
	}

	fn authorize(
		&self,
		set: &McpAuthorizationSet,
		backend: &str,
		tool: &str,
		args: &serde_json::Value,
		headers: &http::HeaderMap,
	) -> Result<(), McpError> {
		let (scopes, claims) = bearer_claims(headers);
		let header_map = headers_to_btreemap(headers);
		let host = headers.get(http::header::HOST).and_then(|v| v.to_str().ok()).unwrap_or("");
		let vars = EvalVars {
			backend,
			tool,
			args,
			headers: &header_map,
			host,
			http_method: "POST",
			scopes: &scopes,
			claims: &claims,
		};
		match set.evaluate(&vars) {
			Decision::Allow => Ok(()),
			decision @ Decision::Deny { .. } => Err(McpError::Authorization {
				www_authenticate: decision.www_authenticate().unwrap_or_else(|| "Bearer".to_string()),
			}),
		}
	}

	/// `POST` (spec.md §4.7): `initialize` fans out across every backend and
	/// mints a fresh composite session id; every other method decrypts the
	/// existing one and routes to the backend(s) that own it.
	pub async fn handle_post(&self, req: http::Request<Bytes>) -> http::Response<Bytes> {
		match self.try_handle_post(req).await {
			Ok(resp) => resp,
			Err(error) => error.into_response(),
		}
	}

	async fn try_handle_post(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>, McpError> {
		let (parts, body) = req.into_parts();
		let runtime = self.config.current();
		let (route_name, route) = self.route_for(&parts.headers, &runtime)?;
		let value: serde_json::Value = serde_json::from_slice(&body)?;
		let method = value.get("method").and_then(|m| m.as_str()).unwrap_or_default();

		if method == "initialize" {
			let subject = subject_from_headers(&parts.headers);
			return self.handle_initialize(&route_name, route, &subject, body).await;
		}

		let session_header = parts
			.headers
			.get(MCP_SESSION_ID_HEADER)
			.and_then(|v| v.to_str().ok())
			.ok_or(McpError::SessionIdRequired)?;
		let crypto = Self::crypto_for(route);
		let plain = crypto.decrypt(session_header)?;
		let composite = CompositeSessionId::parse(&plain).ok_or(McpError::MalformedSessionId)?;
		if composite.route != route_name {
			return Err(McpError::UnknownSession);
		}

		let authz = self.authorization_for(&route_name, route, &runtime);
		let request_id = value.get("id").cloned().unwrap_or(serde_json::Value::Null);

		match method {
			"tools/list" => {
				self.authorize(&authz, "", "", &serde_json::Value::Null, &parts.headers)?;
				let merged = dispatch_merge_tools(&self.client, route, &composite, body, request_id).await;
				Ok(json_response(merged))
			},
			"tools/call" => {
				let tool = value
					.pointer("/params/name")
					.and_then(|v| v.as_str())
					.ok_or_else(|| McpError::UnknownTool(String::new()))?;
				let backend = route
					.backends
					.iter()
					.find(|b| b.tools.selects(tool))
					.ok_or_else(|| McpError::UnknownTool(tool.to_string()))?;
				let args = value.pointer("/params/arguments").cloned().unwrap_or(serde_json::Value::Null);
				self.authorize(&authz, &backend.name, tool, &args, &parts.headers)?;
				let resp = dispatch_single(&self.client, route, &composite, &backend.name, body).await?;
				Ok(json_response(resp))
			},
			_ => {
				// No single natural backend for this method (e.g. a
				// capability probe); route it to whichever backend the
				// upstream pipeline hinted at, falling back to the first
				// backend the session was established against.
				let backend_name = parts
					.headers
					.get(HEADER_MCP_BACKEND)
					.and_then(|v| v.to_str().ok())
					.map(str::to_string)
					.or_else(|| composite.backend_sessions.first().map(|(name, _)| name.clone()))
					.ok_or(McpError::AllBackendsFailed)?;
				let resp = dispatch_single(&self.client, route, &composite, &backend_name, body).await?;
				Ok(json_response(resp))
			},
		}
	}

	async fn handle_initialize(
		&self,
		route_name: &str,
		route: &McpRoute,
		subject: &str,
		body: Bytes,
	) -> Result<http::Response<Bytes>, McpError> {
		let (composite, representative) = fan_out_initialize(&self.client, route_name, route, subject, body).await?;
		let crypto = Self::crypto_for(route);
		let encrypted = crypto.encrypt(&composite.encode_plain())?;
		let mut resp = json_response(representative);
		let value = http::HeaderValue::from_str(&encrypted).map_err(|_| McpError::Crypto)?;
		resp.headers_mut().insert(http::HeaderName::from_static(MCP_SESSION_ID_HEADER), value);
		Ok(resp)
	}

	/// `GET` (spec.md §4.7): open the long-lived notification stream for the
	/// route named by `x-ai-eg-mcp-route`.
	pub fn handle_get(&self, headers: &http::HeaderMap) -> Result<http::Response<SseBody>, McpError> {
		let runtime = self.config.current();
		let (route_name, route) = self.route_for(headers, &runtime)?;
		let signaler = self.signaler_for(&route_name);
		let heartbeat = match route.heartbeat_interval_secs {
			0 => None,
			secs => Some(Duration::from_secs(secs)),
		};
		Ok(notification_stream_response(&signaler, heartbeat))
	}

	/// `DELETE` (spec.md §4.7): terminate every per-backend session the
	/// composite id names, in parallel.
	pub async fn handle_delete(&self, headers: &http::HeaderMap) -> Result<http::Response<Bytes>, McpError> {
		let runtime = self.config.current();
		let (_, route) = self.route_for(headers, &runtime)?;
		let session_header = headers
			.get(MCP_SESSION_ID_HEADER)
			.and_then(|v| v.to_str().ok())
			.ok_or(McpError::SessionIdRequired)?;
		let crypto = Self::crypto_for(route);
		let composite = CompositeSessionId::parse(&crypto.decrypt(session_header)?).ok_or(McpError::MalformedSessionId)?;
		terminate_all(&self.client, route, &composite).await;
		Ok(http::Response::builder().status(http::StatusCode::NO_CONTENT).body(Bytes::new()).expect("valid response"))
	}
}

fn json_response(body: Bytes) -> http::Response<Bytes> {
	http::Response::builder()
		.status(http::StatusCode::OK)
		.header(http::header::CONTENT_TYPE, "application/json")
		.body(body)
		.expect("valid response")
}

fn bearer_claims(headers: &http::HeaderMap) -> (BTreeSet<String>, HashMap<String, String>) {
	let auth = headers.get(http::header::AUTHORIZATION).and_then(|v| v.to_str().ok());
	parse_bearer_claims(auth)
}

fn subject_from_headers(headers: &http::HeaderMap) -> String {
	let (_, claims) = bearer_claims(headers);
	claims.get("sub").cloned().unwrap_or_else(|| "anonymous".to_string())
}

fn headers_to_btreemap(headers: &http::HeaderMap) -> BTreeMap<String, String> {
	headers
		.iter()
		.map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).to_string()))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::RawConfig;

	fn handler_with_route(route_name: &str, route: McpRoute) -> McpHandler {
		let mut mcp = McpConfig::default();
		mcp.routes.insert(route_name.to_string(), route);
		let raw = RawConfig {
			mcp: Some(mcp),
			..Default::default()
		};
		McpHandler::new(ConfigHandle::new(RuntimeConfig::from_raw(raw).unwrap()))
	}

	fn test_route() -> McpRoute {
		McpRoute {
			backends: vec![],
			authorization: vec![],
			default_action: crate::mcp::config::DefaultAction::Deny,
			session_seed: "seed".to_string(),
			fallback_session_seed: None,
			heartbeat_interval_secs: 30,
		}
	}

	#[tokio::test]
	async fn post_without_route_header_is_unknown_route() {
		let handler = handler_with_route("r", test_route());
		let req = http::Request::builder()
			.body(Bytes::from_static(br#"{"method":"initialize"}"#))
			.unwrap();
		let resp = handler.handle_post(req).await;
		assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn post_with_unknown_session_header_is_bad_request() {
		let handler = handler_with_route("r", test_route());
		let req = http::Request::builder()
			.header(HEADER_MCP_ROUTE, "r")
			.header(MCP_SESSION_ID_HEADER, "not-base64!!")
			.body(Bytes::from_static(br#"{"method":"tools/list"}"#))
			.unwrap();
		let resp = handler.handle_post(req).await;
		assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST);
	}

	#[test]
	fn get_without_route_header_is_unknown_route() {
		let handler = handler_with_route("r", test_route());
		let headers = http::HeaderMap::new();
		assert!(matches!(handler.handle_get(&headers), Err(McpError::UnknownRoute)));
	}

	#[test]
	fn notify_tool_changes_wakes_only_changed_routes() {
		let handler = handler_with_route("unchanged", test_route());
		let mut old = McpConfig::default();
		old.routes.insert("unchanged".to_string(), test_route());
		old.routes.insert("changed".to_string(), test_route());
		let mut new = old.clone();
		new.routes.get_mut("changed").unwrap().heartbeat_interval_secs = 5;
		let mut changed_route = test_route();
		changed_route.backends.push(crate::mcp::config::McpBackend {
			name: "b".to_string(),
			address: "http://localhost/mcp".to_string(),
			tools: Default::default(),
		});
		new.routes.insert("changed".to_string(), changed_route);

		let mut unchanged_rx = handler.signaler_for("unchanged").subscribe();
		let mut changed_rx = handler.signaler_for("changed").subscribe();
		handler.notify_tool_changes(&old, &new);
		assert!(changed_rx.try_recv().is_ok());
		assert!(unchanged_rx.try_recv().is_err());
	}
}
