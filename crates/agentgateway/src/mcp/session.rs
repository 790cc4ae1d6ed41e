//! Composite MCP session id: encryption, and the per-backend fan-out that
//! builds and consumes it (spec.md §4.7 "Session encryption",
//! "POST with method initialize").
//!
//! The encryption scheme is grounded on the teacher's `http::sessionpersistence::aes`
//! module (`RandomizedNonceKey`/`AES_256_GCM`, `nonce || ciphertext+tag`
//! layout, base64), extended with the PBKDF2-SHA256 key derivation and
//! fallback-key decrypt spec.md §4.7 calls for: `aws-lc-rs` already exposes
//! `pbkdf2::derive` alongside the `aead` module the teacher uses, so no new
//! dependency is needed.
//!
//! The fan-out/dispatch half has no direct teacher counterpart (the teacher
//! keeps a server-side `SessionManager` map); here the composite id itself
//! is the session record, so initialize/dispatch/terminate are plain
//! functions over a client, a route's backend list, and the id.

use std::collections::BTreeSet;
use std::num::NonZeroU32;

use aws_lc_rs::aead::{AES_256_GCM, Aad, Nonce, RandomizedNonceKey};
use aws_lc_rs::pbkdf2;
use aws_lc_rs::rand::{SecureRandom, SystemRandom};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures::future::join_all;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use crate::mcp::McpError;
use crate::mcp::config::McpRoute;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const PBKDF2_ITERATIONS: u32 = 100_000;

/// AES-256-GCM with a PBKDF2-SHA256-derived key, keyed by a configured seed
/// plus a fresh random salt per encryption (spec.md §4.7). Stored layout:
/// `salt || nonce || ciphertext+tag`, base64-encoded.
pub struct SessionCrypto {
	seed: String,
	fallback_seed: Option<String>,
}

impl SessionCrypto {
	pub fn new(seed: String, fallback_seed: Option<String>) -> Self {
		Self { seed, fallback_seed }
	}

	fn derive_key(seed: &str, salt: &[u8]) -> [u8; 32] {
		let mut key = [0u8; 32];
		let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).expect("nonzero iteration count");
		pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, iterations, salt, seed.as_bytes(), &mut key);
		key
	}

	pub fn encrypt(&self, plaintext: &str) -> Result<String, McpError> {
		let mut salt = [0u8; SALT_LEN];
		SystemRandom::new().fill(&mut salt).map_err(|_| McpError::Crypto)?;
		let key_bytes = Self::derive_key(&self.seed, &salt);
		let key = RandomizedNonceKey::new(&AES_256_GCM, &key_bytes).map_err(|_| McpError::Crypto)?;
		let mut in_out = plaintext.as_bytes().to_vec();
		let nonce = key
			.seal_in_place_append_tag(Aad::empty(), &mut in_out)
			.map_err(|_| McpError::Crypto)?;
		let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + in_out.len());
		out.extend_from_slice(&salt);
		out.extend_from_slice(nonce.as_ref());
		out.extend_from_slice(&in_out);
		Ok(BASE64.encode(out))
	}

	/// spec.md §8 "MCP session id round-trip": tries the primary seed first,
	/// then the fallback seed, so rotating `seed` doesn't invalidate ids
	/// minted under the previous one.
	pub fn decrypt(&self, encoded: &str) -> Result<String, McpError> {
		let raw = BASE64.decode(encoded).map_err(|_| McpError::MalformedSessionId)?;
		if raw.len() < SALT_LEN + NONCE_LEN {
			return Err(McpError::MalformedSessionId);
		}
		let (salt, rest) = raw.split_at(SALT_LEN);
		let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
		for seed in std::iter::once(&self.seed).chain(self.fallback_seed.iter()) {
			let key_bytes = Self::derive_key(seed, salt);
			let Ok(key) = RandomizedNonceKey::new(&AES_256_GCM, &key_bytes) else {
				continue;
			};
			let Ok(nonce) = Nonce::try_assume_unique_for_key(nonce_bytes) else {
				return Err(McpError::MalformedSessionId);
			};
			let mut in_out = ciphertext.to_vec();
			if let Ok(plain) = key.open_in_place(nonce, Aad::empty(), &mut in_out) {
				return String::from_utf8(plain.to_vec()).map_err(|_| McpError::MalformedSessionId);
			}
		}
		Err(McpError::Crypto)
	}
}

/// The plaintext a composite session id encodes: spec.md §4.7's
/// `<route>@<subject>@<backend>:<base64(backend-session)>[,...]` form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositeSessionId {
	pub route: String,
	pub subject: String,
	pub backend_sessions: Vec<(String, String)>,
}

impl CompositeSessionId {
	pub fn encode_plain(&self) -> String {
		let parts = self
			.backend_sessions
			.iter()
			.map(|(backend, session)| format!("{backend}:{}", BASE64.encode(session)))
			.collect::<Vec<_>>()
			.join(",");
		format!("{}@{}@{}", self.route, self.subject, parts)
	}

	pub fn parse(plain: &str) -> Option<Self> {
		let mut parts = plain.splitn(3, '@');
		let route = parts.next()?.to_string();
		let subject = parts.next()?.to_string();
		let rest = parts.next()?;
		let backend_sessions = rest
			.split(',')
			.filter(|s| !s.is_empty())
			.map(|pair| {
				let (backend, encoded) = pair.split_once(':')?;
				let decoded = BASE64.decode(encoded).ok()?;
				let session = String::from_utf8(decoded).ok()?;
				Some((backend.to_string(), session))
			})
			.collect::<Option<Vec<_>>>()?;
		Some(Self {
			route,
			subject,
			backend_sessions,
		})
	}

	pub fn backend_session(&self, backend: &str) -> Option<&str> {
		self
			.backend_sessions
			.iter()
			.find(|(name, _)| name == backend)
			.map(|(_, session)| session.as_str())
	}

	pub fn backend_names(&self) -> BTreeSet<&str> {
		self.backend_sessions.iter().map(|(name, _)| name.as_str()).collect()
	}
}

pub type HttpClient = Client<HttpConnector, Full<Bytes>>;

pub fn new_http_client() -> HttpClient {
	Client::builder(TokioExecutor::new()).build_http()
}

pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";
const JSON_CONTENT_TYPE: &str = "application/json";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

struct BackendResponse {
	status: http::StatusCode,
	session_id: Option<String>,
	body: Bytes,
}

async fn post_json(
	client: &HttpClient,
	address: &str,
	body: Bytes,
	session_id: Option<&str>,
) -> Result<BackendResponse, McpError> {
	let uri: http::Uri = address.parse().map_err(|_| McpError::InvalidBackendAddress(address.to_string()))?;
	let mut builder = http::Request::builder()
		.method(http::Method::POST)
		.uri(uri)
		.header(http::header::CONTENT_TYPE, JSON_CONTENT_TYPE)
		.header(http::header::ACCEPT, ACCEPT_BOTH);
	if let Some(session_id) = session_id {
		builder = builder.header(MCP_SESSION_ID_HEADER, session_id);
	}
	let req = builder
		.body(Full::new(body))
		.map_err(|e| McpError::Backend(e.to_string()))?;
	let resp = client
		.request(req)
		.await
		.map_err(|e| McpError::Backend(e.to_string()))?;
	let status = resp.status();
	let session_id = resp
		.headers()
		.get(MCP_SESSION_ID_HEADER)
		.and_then(|v| v.to_str().ok())
		.map(str::to_string);
	let body = resp
		.into_body()
		.collect()
		.await
		.map_err(|e| McpError::Backend(e.to_string()))?
		.to_bytes();
	Ok(BackendResponse { status, session_id, body })
}

async fn delete_session(client: &HttpClient, address: &str, session_id: &str) {
	let Ok(uri) = address.parse::<http::Uri>() else {
		return;
	};
	let Ok(req) = http::Request::builder()
		.method(http::Method::DELETE)
		.uri(uri)
		.header(MCP_SESSION_ID_HEADER, session_id)
		.body(Full::new(Bytes::new()))
	else {
		return;
	};
	if let Err(error) = client.request(req).await {
		tracing::debug!(%error, "mcp backend session delete failed");
	}
}

fn initialized_notification() -> Bytes {
	Bytes::from_static(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
}

/// spec.md §4.7: "fan out to every backend of the request's route in
/// parallel. For each, send the `initialize` JSON-RPC message, capture the
/// MCP session id from the response, then send `notifications/initialized`.
/// Failed backends are dropped." Each backend runs as its own task, joined
/// with a barrier (spec.md §9's "one task per backend with a join barrier").
pub async fn fan_out_initialize(
	client: &HttpClient,
	route_name: &str,
	route: &McpRoute,
	subject: &str,
	initialize_body: Bytes,
) -> Result<(CompositeSessionId, Bytes), McpError> {
	let attempts = route.backends.iter().map(|backend| {
		let client = client;
		let body = initialize_body.clone();
		async move {
			let response = post_json(client, &backend.address, body, None).await.ok()?;
			if !response.status.is_success() {
				return None;
			}
			let session_id = response.session_id.clone()?;
			let _ = post_json(client, &backend.address, initialized_notification(), Some(&session_id)).await;
			Some((backend.name.clone(), session_id, response.body))
		}
	});
	let results: Vec<_> = join_all(attempts).await.into_iter().flatten().collect();
	if results.is_empty() {
		return Err(McpError::AllBackendsFailed);
	}
	let representative = results[0].2.clone();
	let backend_sessions = results.into_iter().map(|(name, session, _)| (name, session)).collect();
	let composite = CompositeSessionId {
		route: route_name.to_string(),
		subject: subject.to_string(),
		backend_sessions,
	};
	Ok((composite, representative))
}

/// spec.md §4.7 "POST with any other method": forward `body` to a single
/// resolved backend's session.
pub async fn dispatch_single(
	client: &HttpClient,
	route: &McpRoute,
	composite: &CompositeSessionId,
	backend_name: &str,
	body: Bytes,
) -> Result<Bytes, McpError> {
	let backend = route
		.backends
		.iter()
		.find(|b| b.name == backend_name)
		.ok_or_else(|| McpError::BackendUnavailable(backend_name.to_string()))?;
	let session_id = composite
		.backend_session(backend_name)
		.ok_or_else(|| McpError::BackendUnavailable(backend_name.to_string()))?;
	let response = post_json(client, &backend.address, body, Some(session_id)).await?;
	if !response.status.is_success() {
		return Err(McpError::BackendUnavailable(backend_name.to_string()));
	}
	Ok(response.body)
}

/// Methods with no single natural backend (e.g. `tools/list`) fan out to
/// every backend named in the composite id and merge the `result.tools`
/// arrays into one JSON-RPC response, preserving the original request id.
pub async fn dispatch_merge_tools(
	client: &HttpClient,
	route: &McpRoute,
	composite: &CompositeSessionId,
	body: Bytes,
	request_id: serde_json::Value,
) -> Bytes {
	let attempts = composite.backend_sessions.iter().filter_map(|(name, session_id)| {
		let backend = route.backends.iter().find(|b| &b.name == name)?;
		let address = backend.address.clone();
		let body = body.clone();
		let session_id = session_id.clone();
		Some(async move { post_json(client, &address, body, Some(&session_id)).await.ok() })
	});
	let responses: Vec<_> = join_all(attempts).await.into_iter().flatten().collect();
	let mut tools = Vec::new();
	for response in &responses {
		if !response.status.is_success() {
			continue;
		}
		if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&response.body)
			&& let Some(list) = value.pointer("/result/tools").and_then(|v| v.as_array())
		{
			tools.extend(list.iter().cloned());
		}
	}
	let merged = serde_json::json!({
		"jsonrpc": "2.0",
		"id": request_id,
		"result": {"tools": tools},
	});
	Bytes::from(merged.to_string())
}

/// spec.md §4.7 "DELETE: terminate all per-backend sessions in parallel."
pub async fn terminate_all(client: &HttpClient, route: &McpRoute, composite: &CompositeSessionId) {
	let tasks = composite.backend_sessions.iter().filter_map(|(name, session_id)| {
		let backend = route.backends.iter().find(|b| &b.name == name)?;
		let address = backend.address.clone();
		let session_id = session_id.clone();
		Some(async move { delete_session(client, &address, &session_id).await })
	});
	join_all(tasks).await;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn composite_session_id_round_trips() {
		let composite = CompositeSessionId {
			route: "my-route".to_string(),
			subject: "user-42".to_string(),
			backend_sessions: vec![("a".to_string(), "sess-a".to_string()), ("b".to_string(), "sess-b".to_string())],
		};
		let encoded = composite.encode_plain();
		let parsed = CompositeSessionId::parse(&encoded).unwrap();
		assert_eq!(parsed, composite);
	}

	#[test]
	fn encrypted_session_id_round_trips_under_primary_key() {
		let crypto = SessionCrypto::new("seed-one".to_string(), None);
		let plain = "my-route@subj@a:c2Vzcw==";
		let encrypted = crypto.encrypt(plain).unwrap();
		assert_eq!(crypto.decrypt(&encrypted).unwrap(), plain);
	}

	#[test]
	fn fallback_key_decrypts_ids_minted_under_the_old_primary() {
		let old = SessionCrypto::new("old-seed".to_string(), None);
		let plain = "route@subj@a:c2Vzcw==";
		let encrypted = old.encrypt(plain).unwrap();

		let rotated = SessionCrypto::new("new-seed".to_string(), Some("old-seed".to_string()));
		assert_eq!(rotated.decrypt(&encrypted).unwrap(), plain);
	}

	#[test]
	fn wrong_key_fails_to_decrypt() {
		let a = SessionCrypto::new("seed-a".to_string(), None);
		let b = SessionCrypto::new("seed-b".to_string(), None);
		let encrypted = a.encrypt("route@subj@").unwrap();
		assert!(b.decrypt(&encrypted).is_err());
	}
}
