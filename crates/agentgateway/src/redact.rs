//! Redaction for debug logging (spec.md §4.1, "Debug logging"): a read-only
//! projection of a request/response passed through debug logging only,
//! never the actual bytes sent to the host or the client. Grounded on the
//! debug-logging redaction pattern referenced at the teacher's
//! `http/ext_proc.rs` logging call sites (`http::DebugExtensions`) and the
//! length-preserving masking helper `agent_core::trcng::redact_tail`, here
//! generalized into the standalone view spec.md's redaction invariant
//! describes: every placeholder advertises a length equal to the original
//! plain-text's length, so a log reader can reason about payload size
//! without ever seeing the payload.

use std::fmt;

use bytes::Bytes;
use http::HeaderMap;
use sha2::{Digest, Sha256};

/// Header names whose *values* must never appear in a debug log verbatim.
/// Case-insensitive; matched against `HeaderName`, which already lower-cases.
const SENSITIVE_HEADERS: &[&str] = &[
	"authorization",
	"x-api-key",
	"x-goog-api-key",
	"api-key",
	"cookie",
	"set-cookie",
	"proxy-authorization",
];

/// A placeholder for a redacted value: never the original bytes, but keeps
/// enough information (length, content hash) for a log reader to correlate
/// repeated requests without recovering the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Redacted {
	pub length: usize,
	pub sha256_hex: String,
}

impl Redacted {
	pub fn new(value: &[u8]) -> Self {
		let mut hasher = Sha256::new();
		hasher.update(value);
		Redacted {
			length: value.len(),
			sha256_hex: hex::encode(hasher.finalize()),
		}
	}
}

impl fmt::Debug for Redacted {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<redacted len={} sha256={}>", self.length, &self.sha256_hex[..12])
	}
}

impl fmt::Display for Redacted {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

/// A debug-log-only view of a request/response's headers and body. Building
/// one never mutates the real `HeaderMap`/`Bytes` it's built from — spec.md
/// §4.1 and §7: "Redaction ... never changes what the client sees; it only
/// changes what is written to debug logs."
#[derive(Debug, Clone)]
pub struct RedactedView {
	pub headers: Vec<(String, RedactedHeaderValue)>,
	pub body: Option<RedactedBodyValue>,
}

#[derive(Clone)]
pub enum RedactedHeaderValue {
	Plain(String),
	Redacted(Redacted),
}

impl fmt::Debug for RedactedHeaderValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RedactedHeaderValue::Plain(s) => fmt::Debug::fmt(s, f),
			RedactedHeaderValue::Redacted(r) => fmt::Debug::fmt(r, f),
		}
	}
}

/// The body half of a [`RedactedView`]: masked when `redact_body` is set,
/// otherwise the real bytes (lossily rendered), since body masking is
/// optional per spec.md §4.1 ("and (optionally) body bytes with
/// placeholders").
#[derive(Clone)]
pub enum RedactedBodyValue {
	Plain(String),
	Redacted(Redacted),
}

impl fmt::Debug for RedactedBodyValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RedactedBodyValue::Plain(s) => fmt::Debug::fmt(s, f),
			RedactedBodyValue::Redacted(r) => fmt::Debug::fmt(r, f),
		}
	}
}

fn is_sensitive_header(name: &str) -> bool {
	SENSITIVE_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Build the redacted view for logging, optionally also masking the body
/// (spec.md §4.1: "and (optionally) body bytes with placeholders"). Non-
/// UTF-8 header values fall back to a lossy rendering rather than being
/// silently dropped, matching spec.md §8's boundary-behavior rule for raw
/// header values generally.
pub fn redact_headers_and_body(headers: &HeaderMap, body: Option<&Bytes>, redact_body: bool) -> RedactedView {
	let headers = headers
		.iter()
		.map(|(name, value)| {
			let name = name.as_str().to_string();
			let rendered = if is_sensitive_header(&name) {
				RedactedHeaderValue::Redacted(Redacted::new(value.as_bytes()))
			} else {
				RedactedHeaderValue::Plain(String::from_utf8_lossy(value.as_bytes()).to_string())
			};
			(name, rendered)
		})
		.collect();
	let body = body.map(|b| {
		if redact_body {
			RedactedBodyValue::Redacted(Redacted::new(b))
		} else {
			RedactedBodyValue::Plain(String::from_utf8_lossy(b).to_string())
		}
	});
	RedactedView { headers, body }
}

#[cfg(test)]
mod tests {
	use http::{HeaderMap, HeaderValue};

	use super::*;

	#[test]
	fn redacted_length_matches_original() {
		let original = b"sk-some-secret-value-1234567890";
		let r = Redacted::new(original);
		assert_eq!(r.length, original.len());
	}

	#[test]
	fn sensitive_headers_are_masked_others_pass_through() {
		let mut headers = HeaderMap::new();
		headers.insert("authorization", HeaderValue::from_static("Bearer sk-abc123"));
		headers.insert("content-type", HeaderValue::from_static("application/json"));

		let view = redact_headers_and_body(&headers, None, false);
		let auth = view
			.headers
			.iter()
			.find(|(k, _)| k == "authorization")
			.unwrap();
		assert!(matches!(auth.1, RedactedHeaderValue::Redacted(_)));
		let ct = view
			.headers
			.iter()
			.find(|(k, _)| k == "content-type")
			.unwrap();
		assert!(matches!(&ct.1, RedactedHeaderValue::Plain(s) if s == "application/json"));
	}

	#[test]
	fn same_bytes_hash_identically() {
		let a = Redacted::new(b"hello world");
		let b = Redacted::new(b"hello world");
		assert_eq!(a.sha256_hex, b.sha256_hex);
	}
}
