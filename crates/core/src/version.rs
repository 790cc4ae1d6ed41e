//! Build metadata, reported on startup and attached to the `/healthz` and
//! gRPC health responses so an operator can tell which build a given process
//! is running.

use std::fmt;

#[derive(Clone, Debug, serde::Serialize)]
pub struct BuildInfo {
	pub version: &'static str,
	pub rust_version: &'static str,
	pub build_profile: &'static str,
}

impl BuildInfo {
	pub const fn new() -> Self {
		Self {
			version: env!("CARGO_PKG_VERSION"),
			rust_version: env!("CARGO_PKG_RUST_VERSION"),
			build_profile: if cfg!(debug_assertions) { "debug" } else { "release" },
		}
	}
}

impl Default for BuildInfo {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for BuildInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} (rustc {}, {})", self.version, self.rust_version, self.build_profile)
	}
}
