//! Azure access-token injection. Tokens are supplied out-of-band by an Azure
//! identity sidecar writing a bearer token to a well-known file; this handler
//! re-reads the file whenever its mtime advances rather than on every
//! request, and otherwise reuses the cached value. No filesystem-watch crate
//! is pulled in for this (see DESIGN.md) — a stat() per request is cheap
//! enough and keeps the dependency footprint aligned with the teacher's.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;

use http::{HeaderMap, HeaderValue};

use super::{AuthError, BackendAuthHandler};

struct Cached {
	mtime: SystemTime,
	token: String,
}

pub struct AzureTokenAuth {
	path: PathBuf,
	cache: Mutex<Option<Cached>>,
}

impl AzureTokenAuth {
	pub fn new(path: PathBuf) -> Self {
		Self {
			path,
			cache: Mutex::new(None),
		}
	}

	async fn read_token(&self) -> Result<String, AuthError> {
		let metadata = fs_err::tokio::metadata(&self.path)
			.await
			.map_err(|source| AuthError::FileRead {
				path: self.path.display().to_string(),
				source,
			})?;
		let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

		{
			let cache = self.cache.lock().unwrap();
			if let Some(cached) = cache.as_ref() {
				if cached.mtime == mtime {
					return Ok(cached.token.clone());
				}
			}
		}

		let contents = fs_err::tokio::read_to_string(&self.path)
			.await
			.map_err(|source| AuthError::FileRead {
				path: self.path.display().to_string(),
				source,
			})?;
		let token = contents.trim().to_string();
		*self.cache.lock().unwrap() = Some(Cached {
			mtime,
			token: token.clone(),
		});
		Ok(token)
	}
}

#[async_trait::async_trait]
impl BackendAuthHandler for AzureTokenAuth {
	async fn apply(&self, _path: &str, _headers: &HeaderMap, _body: &[u8]) -> Result<HeaderMap, AuthError> {
		let token = self.read_token().await?;
		let mut out = HeaderMap::new();
		let value = HeaderValue::from_str(&format!("Bearer {token}"))
			.map_err(|e| AuthError::CredentialConstruction(e.to_string()))?;
		out.insert(http::header::AUTHORIZATION, value);
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn reads_and_caches_token() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("token");
		fs_err::tokio::write(&path, "abc123\n").await.unwrap();

		let auth = AzureTokenAuth::new(path.clone());
		let out = auth.apply("/openai/deployments/gpt-4/chat/completions", &HeaderMap::new(), b"").await.unwrap();
		assert_eq!(out.get(http::header::AUTHORIZATION).unwrap(), "Bearer abc123");

		// Unchanged mtime serves from cache even if we don't rewrite the file.
		let out2 = auth.apply("/openai/deployments/gpt-4/chat/completions", &HeaderMap::new(), b"").await.unwrap();
		assert_eq!(out2.get(http::header::AUTHORIZATION).unwrap(), "Bearer abc123");
	}
}
