//! Path-based JSON set/remove mutation on raw request/response bodies
//! (spec.md §4.2 step 5). Paths are `.`-separated object keys; array
//! indexing is out of scope for this gateway's route-level mutators (the
//! translators themselves handle array-shaped fields).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyMutationConfig {
	#[serde(default)]
	pub set: Vec<JsonSet>,
	#[serde(default)]
	pub remove: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JsonSet {
	pub path: String,
	pub value: Value,
}

impl BodyMutationConfig {
	pub fn is_empty(&self) -> bool {
		self.set.is_empty() && self.remove.is_empty()
	}

	/// Apply declared set/remove entries to `body`, returning `None` when the
	/// body was not valid JSON or when no mutator entries were configured
	/// (the caller falls back to the translator's own output in that case).
	pub fn apply(&self, body: &[u8]) -> Option<Vec<u8>> {
		if self.is_empty() {
			return None;
		}
		let mut value: Value = serde_json::from_slice(body).ok()?;
		for remove in &self.remove {
			remove_path(&mut value, remove);
		}
		for entry in &self.set {
			set_path(&mut value, &entry.path, entry.value.clone());
		}
		serde_json::to_vec(&value).ok()
	}
}

fn set_path(root: &mut Value, path: &str, value: Value) {
	let mut cursor = root;
	let mut segments = path.split('.').peekable();
	while let Some(segment) = segments.next() {
		if !cursor.is_object() {
			*cursor = Value::Object(Default::default());
		}
		let map = cursor.as_object_mut().expect("just ensured object");
		if segments.peek().is_none() {
			map.insert(segment.to_string(), value);
			return;
		}
		cursor = map
			.entry(segment.to_string())
			.or_insert_with(|| Value::Object(Default::default()));
	}
}

fn remove_path(root: &mut Value, path: &str) {
	let segments: Vec<&str> = path.split('.').collect();
	let Some((last, parents)) = segments.split_last() else {
		return;
	};
	let mut cursor = root;
	for segment in parents {
		match cursor.get_mut(*segment) {
			Some(next) => cursor = next,
			None => return,
		}
	}
	if let Some(map) = cursor.as_object_mut() {
		map.remove(*last);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn sets_nested_path() {
		let cfg = BodyMutationConfig {
			set: vec![JsonSet {
				path: "stream_options.include_usage".to_string(),
				value: json!(true),
			}],
			remove: vec![],
		};
		let out = cfg.apply(br#"{"model":"gpt-4"}"#).unwrap();
		let value: Value = serde_json::from_slice(&out).unwrap();
		assert_eq!(value["stream_options"]["include_usage"], json!(true));
		assert_eq!(value["model"], json!("gpt-4"));
	}

	#[test]
	fn removes_top_level_field() {
		let cfg = BodyMutationConfig {
			set: vec![],
			remove: vec!["model".to_string()],
		};
		let out = cfg.apply(br#"{"model":"x","a":1}"#).unwrap();
		let value: Value = serde_json::from_slice(&out).unwrap();
		assert!(value.get("model").is_none());
		assert_eq!(value["a"], json!(1));
	}

	#[test]
	fn empty_config_applies_nothing() {
		let cfg = BodyMutationConfig::default();
		assert!(cfg.apply(br#"{}"#).is_none());
	}
}
