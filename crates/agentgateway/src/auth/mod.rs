//! Backend-auth handlers (spec.md §4.5): invoked exactly once per upstream
//! attempt, after translation, to inject provider credentials into the
//! outgoing request. Grounded on `http/apikey.rs` for the static-key shape;
//! the AWS SigV4 and GCP OAuth handlers additionally draw on the sibling
//! `vishalbelsare-agentgateway` example's `http/auth.rs`, the only pack repo
//! with a working signer/credential-cache for those two backends.

mod apikey;
mod azure;
mod gcp;
mod sigv4;

use std::sync::Arc;

use http::HeaderMap;
use serde::{Deserialize, Serialize};

pub use apikey::ApiKeyAuth;
pub use azure::AzureTokenAuth;
pub use gcp::GcpOAuthAuth;
pub use sigv4::SigV4Auth;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
	#[error("missing credential source: {0}")]
	MissingCredential(String),
	#[error("failed to construct credentials: {0}")]
	CredentialConstruction(String),
	#[error("failed to sign request: {0}")]
	Signing(String),
	#[error("failed to read credential file {path}: {source}")]
	FileRead {
		path: String,
		#[source]
		source: std::io::Error,
	},
}

/// `Do(path, headers, body) -> (additional-headers, error)` from spec.md
/// §4.5. `path` is the already-translated outgoing `:path` (e.g. Bedrock's
/// `/model/.../converse`), needed by signers that canonicalize the request
/// URI (SigV4). The handler may not mutate the body (SigV4 needs to read it
/// to compute a signature, never to change it), and is invoked exactly once
/// per upstream attempt, after translation, so it always sees
/// post-translation headers.
#[async_trait::async_trait]
pub trait BackendAuthHandler: Send + Sync {
	async fn apply(&self, path: &str, headers: &HeaderMap, body: &[u8]) -> Result<HeaderMap, AuthError>;
}

/// No-op handler for backends that require no credential injection (a
/// passthrough OpenAI-compatible backend behind its own network policy,
/// for instance).
pub struct NoAuth;

#[async_trait::async_trait]
impl BackendAuthHandler for NoAuth {
	async fn apply(&self, _path: &str, _headers: &HeaderMap, _body: &[u8]) -> Result<HeaderMap, AuthError> {
		Ok(HeaderMap::new())
	}
}

/// On-disk shape of a backend's auth config; one variant per handler kind
/// named in spec.md §4.5.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum BackendAuthConfig {
	ApiKey {
		key: secrecy::SecretString,
		#[serde(default)]
		header: ApiKeyHeader,
	},
	AwsSigV4 {
		region: String,
		service: String,
		#[serde(default)]
		access_key_id: Option<secrecy::SecretString>,
		#[serde(default)]
		secret_access_key: Option<secrecy::SecretString>,
		#[serde(default)]
		session_token: Option<secrecy::SecretString>,
	},
	AzureToken {
		token_file: std::path::PathBuf,
	},
	GcpOAuth {
		#[serde(default)]
		scopes: Vec<String>,
	},
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ApiKeyHeader {
	#[default]
	Bearer,
	XApiKey,
}

/// Construct the concrete handler once at config-reload time (`RuntimeConfig`
/// build), not per request.
pub fn build_handler(
	cfg: Option<&BackendAuthConfig>,
) -> anyhow::Result<Arc<dyn BackendAuthHandler>> {
	Ok(match cfg {
		None => Arc::new(NoAuth),
		Some(BackendAuthConfig::ApiKey { key, header }) => {
			Arc::new(ApiKeyAuth::new(key.clone(), *header))
		},
		Some(BackendAuthConfig::AwsSigV4 {
			region,
			service,
			access_key_id,
			secret_access_key,
			session_token,
		}) => Arc::new(SigV4Auth::new(
			region.clone(),
			service.clone(),
			access_key_id.clone(),
			secret_access_key.clone(),
			session_token.clone(),
		)?),
		Some(BackendAuthConfig::AzureToken { token_file }) => {
			Arc::new(AzureTokenAuth::new(token_file.clone()))
		},
		Some(BackendAuthConfig::GcpOAuth { scopes }) => Arc::new(GcpOAuthAuth::new(scopes.clone())),
	})
}
