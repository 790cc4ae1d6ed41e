//! Static API key injection, grounded on the teacher's `http/apikey.rs`
//! `APIKey`/`APIKeyAuthentication` pattern, inverted from "verify an inbound
//! key" to "attach an outbound key".

use http::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use super::{ApiKeyHeader, AuthError, BackendAuthHandler};

pub struct ApiKeyAuth {
	key: SecretString,
	header: ApiKeyHeader,
}

impl ApiKeyAuth {
	pub fn new(key: SecretString, header: ApiKeyHeader) -> Self {
		Self { key, header }
	}
}

#[async_trait::async_trait]
impl BackendAuthHandler for ApiKeyAuth {
	async fn apply(&self, _path: &str, _headers: &HeaderMap, _body: &[u8]) -> Result<HeaderMap, AuthError> {
		let mut out = HeaderMap::new();
		let (name, value) = match self.header {
			ApiKeyHeader::Bearer => (
				HeaderName::from_static("authorization"),
				format!("Bearer {}", self.key.expose_secret()),
			),
			ApiKeyHeader::XApiKey => (
				HeaderName::from_static("x-api-key"),
				self.key.expose_secret().to_string(),
			),
		};
		let value = HeaderValue::from_str(&value)
			.map_err(|e| AuthError::CredentialConstruction(e.to_string()))?;
		out.insert(name, value);
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn bearer_header_carries_key() {
		let auth = ApiKeyAuth::new(SecretString::from("sk-test".to_string()), ApiKeyHeader::Bearer);
		let out = auth.apply("/v1/chat/completions", &HeaderMap::new(), b"").await.unwrap();
		assert_eq!(out.get("authorization").unwrap(), "Bearer sk-test");
	}

	#[tokio::test]
	async fn x_api_key_header_carries_key() {
		let auth = ApiKeyAuth::new(SecretString::from("sk-test".to_string()), ApiKeyHeader::XApiKey);
		let out = auth.apply("/v1/chat/completions", &HeaderMap::new(), b"").await.unwrap();
		assert_eq!(out.get("x-api-key").unwrap(), "sk-test");
	}
}
