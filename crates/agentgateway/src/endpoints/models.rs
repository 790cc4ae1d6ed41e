//! `/v1/models` (spec.md §4.3): answered directly from `RuntimeConfig.
//! declared-models` by the router processor, never proxied to a backend —
//! there is no translator matrix entry for it, so `get_translator` always
//! fails. Kept as an `EndpointSpec` only so the registry's dispatch-by-path
//! lookup in `ext_proc` treats it uniformly with the translating endpoints
//! up through the `ParseBody` step (an empty GET body parses trivially).

use std::sync::Arc;

use serde_json::{Value, json};

use super::{EndpointSpec, ParseOutcome};
use crate::config::{BackendSchema, DeclaredModel};
use crate::translate::{TranslateError, Translator, types::ParsedRequest};

pub struct ModelsSpec;

impl EndpointSpec for ModelsSpec {
	fn parse_body(&self, _raw: &[u8], _costs_configured: bool) -> Result<ParseOutcome, TranslateError> {
		Ok(ParseOutcome {
			original_model: String::new(),
			stream: false,
			parsed: ParsedRequest {
				model: String::new(),
				stream: false,
				value: Value::Null,
			},
			rewritten_raw: None,
		})
	}

	fn get_translator(
		&self,
		backend: &BackendSchema,
		_model_override: Option<&str>,
	) -> Result<Arc<dyn Translator>, TranslateError> {
		Err(TranslateError::UnsupportedRoute {
			backend: format!("{} (endpoint=/v1/models is answered locally, never proxied)", backend.dialect),
		})
	}
}

/// OpenAI-shaped `{"object": "list", "data": [...]}` listing, built straight
/// from `RuntimeConfig.declared_models`.
pub fn list_response(models: &[DeclaredModel]) -> Value {
	let data: Vec<Value> = models
		.iter()
		.map(|m| {
			json!({
				"id": m.name,
				"object": "model",
				"owned_by": m.owned_by,
				"created": m.created_at,
			})
		})
		.collect();
	json!({ "object": "list", "data": data })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lists_declared_models() {
		let models = vec![DeclaredModel {
			name: "gpt-4".to_string(),
			owned_by: "openai".to_string(),
			created_at: 0,
		}];
		let out = list_response(&models);
		assert_eq!(out["data"][0]["id"], json!("gpt-4"));
	}
}
