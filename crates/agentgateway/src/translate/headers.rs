//! Header-mutation set and route-level header mutator, grounded on the
//! header-mutation-application helpers in the teacher's `http/ext_proc.rs`
//! (there applied to a received mutation; here produced, the inverse
//! direction).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppendAction {
	OverwriteOrAdd,
	AddIfAbsent,
	AppendIfExistsOrAdd,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeaderMutation {
	pub key: String,
	pub raw_value: Vec<u8>,
	pub append_action: AppendAction,
}

/// A batch of header mutations plus an explicit remove-list, matching the
/// wire shape of an ext_proc `HeaderMutation` (spec.md §6).
#[derive(Clone, Debug, Default)]
pub struct HeaderSet {
	pub set: Vec<HeaderMutation>,
	pub remove: Vec<String>,
	/// Non-empty only when the translator rewrites the outgoing path
	/// (Bedrock/Vertex/Azure targets, per the translator table in spec.md
	/// §4.4).
	pub path: Option<String>,
}

impl HeaderSet {
	pub fn set(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
		self.set.push(HeaderMutation {
			key: key.into(),
			raw_value: value.into(),
			append_action: AppendAction::OverwriteOrAdd,
		});
		self
	}

	pub fn with_path(mut self, path: impl Into<String>) -> Self {
		self.path = Some(path.into());
		self
	}

	pub fn merge(&mut self, other: HeaderSet) {
		self.set.extend(other.set);
		self.remove.extend(other.remove);
		if other.path.is_some() {
			self.path = other.path;
		}
	}
}

/// Route-level header mutator: a declared set/remove list applied on top of
/// whatever the translator produced. On retry, sensitive headers the first
/// attempt stripped (e.g. a client-supplied `authorization` the backend auth
/// handler will replace anyway) are restored, per spec.md §4.2 step 4.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMutationConfig {
	#[serde(default)]
	pub set: BTreeMap<String, String>,
	#[serde(default)]
	pub remove: Vec<String>,
}

impl HeaderMutationConfig {
	pub fn apply(&self, mut headers: HeaderSet, is_retry: bool) -> HeaderSet {
		for (key, value) in &self.set {
			headers = headers.set(key.clone(), value.clone());
		}
		if !is_retry {
			for key in &self.remove {
				headers.remove.push(key.clone());
			}
		}
		headers
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn retry_skips_removal_of_declared_headers() {
		let cfg = HeaderMutationConfig {
			set: BTreeMap::new(),
			remove: vec!["authorization".to_string()],
		};
		let first = cfg.apply(HeaderSet::default(), false);
		assert_eq!(first.remove, vec!["authorization".to_string()]);

		let retry = cfg.apply(HeaderSet::default(), true);
		assert!(retry.remove.is_empty());
	}
}
