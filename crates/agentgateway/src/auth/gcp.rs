//! GCP OAuth token injection for the Vertex AI and GCP-Anthropic backends,
//! via `google-cloud-auth`'s application-default-credentials resolution. The
//! npolshakova teacher has no GCP signer; grounded on the sibling
//! `vishalbelsare-agentgateway` example's `http/auth.rs` GCP handler shape.

use google_cloud_auth::credentials::CacheableResource;
use http::HeaderMap;
use tokio::sync::OnceCell;

use super::{AuthError, BackendAuthHandler};

/// `scopes` is currently unused by `google-cloud-auth`'s default credential
/// builder but kept on the config shape so a future scoped-token flow can
/// pick it up without a config migration.
pub struct GcpOAuthAuth {
	_scopes: Vec<String>,
	credentials: OnceCell<google_cloud_auth::credentials::Credentials>,
}

impl GcpOAuthAuth {
	pub fn new(scopes: Vec<String>) -> Self {
		Self {
			_scopes: scopes,
			credentials: OnceCell::new(),
		}
	}

	async fn credentials(&self) -> Result<&google_cloud_auth::credentials::Credentials, AuthError> {
		self
			.credentials
			.get_or_try_init(|| async {
				google_cloud_auth::credentials::Builder::default()
					.build()
					.map_err(|e| AuthError::CredentialConstruction(e.to_string()))
			})
			.await
	}
}

#[async_trait::async_trait]
impl BackendAuthHandler for GcpOAuthAuth {
	async fn apply(&self, _path: &str, _headers: &HeaderMap, _body: &[u8]) -> Result<HeaderMap, AuthError> {
		let credentials = self.credentials().await?;
		let extra = credentials
			.headers(http::Extensions::new())
			.await
			.map_err(|e| AuthError::Signing(e.to_string()))?;
		match extra {
			CacheableResource::New { data, .. } => Ok(data),
			CacheableResource::NotModified => {
				Err(AuthError::Signing("credential cache returned stale entry".into()))
			},
		}
	}
}
