//! Process-wide configuration: the on-disk `RawConfig`, the validated
//! `Config`/`RuntimeConfig` the rest of the crate actually consumes, and the
//! atomically-swapped pointer every request snapshots once on entry.
//!
//! Reading config bytes off disk and watching them for changes is an
//! external collaborator's job (see `agentgateway-app`); this module only
//! owns parsing, validation, and the swap.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use agent_core::prelude::Strng;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::auth::BackendAuthConfig;
use crate::mcp::config::McpConfig;
use crate::translate::Dialect;

/// Bytes a `RawConfig` is parsed from. Reading them is out of scope for this
/// crate (CLI/file-watching lives in `agentgateway-app`); this just owns the
/// two shapes bytes can arrive in.
#[derive(Clone, Debug)]
pub enum ConfigSource {
	File(PathBuf),
	Static(bytes::Bytes),
}

impl ConfigSource {
	pub async fn read_to_string(&self) -> anyhow::Result<String> {
		Ok(match self {
			ConfigSource::File(path) => fs_err::tokio::read_to_string(path).await?,
			ConfigSource::Static(data) => std::str::from_utf8(data)?.to_string(),
		})
	}
}

/// What's actually on disk. `deny_unknown_fields` is intentionally left off
/// so older binaries tolerate newer config files growing new optional keys.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
	#[serde(default)]
	pub backends: HashMap<String, RawBackend>,
	#[serde(default)]
	pub request_costs: Vec<RawCostRule>,
	#[serde(default)]
	pub declared_models: Vec<DeclaredModel>,
	#[serde(default)]
	pub mcp: Option<McpConfig>,
	#[serde(default)]
	pub debug_logging: bool,
	/// Whether the debug-logging view also masks body bytes, or logs them
	/// plaintext (spec.md §4.1: body masking is "(optionally)" on top of the
	/// always-on header redaction). Defaults to redacting, the conservative
	/// choice.
	#[serde(default = "default_debug_redact_body")]
	pub debug_redact_body: bool,
}

fn default_debug_redact_body() -> bool {
	true
}

impl Default for RawConfig {
	fn default() -> Self {
		Self {
			backends: HashMap::new(),
			request_costs: Vec::new(),
			declared_models: Vec::new(),
			mcp: None,
			debug_logging: false,
			debug_redact_body: default_debug_redact_body(),
		}
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBackend {
	pub schema: BackendSchema,
	#[serde(default)]
	pub auth: Option<BackendAuthConfig>,
	#[serde(default)]
	pub header_mutation: crate::translate::HeaderMutationConfig,
	#[serde(default)]
	pub body_mutation: crate::translate::BodyMutationConfig,
	#[serde(default)]
	pub model_name_override: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSchema {
	pub dialect: Dialect,
	#[serde(default)]
	pub version: Option<String>,
	#[serde(default)]
	pub prefix: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CostKind {
	Input,
	CachedInput,
	CacheCreationInput,
	Output,
	Total,
	Cel,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCostRule {
	pub kind: CostKind,
	pub metadata_key: String,
	#[serde(default)]
	pub expression: Option<String>,
}

/// A cost rule with its CEL expression pre-compiled once at config-load time,
/// not re-parsed per request.
#[derive(Clone, Debug)]
pub struct CostRule {
	pub kind: CostKind,
	pub metadata_key: Strng,
	pub expression: Option<Arc<cel::Program>>,
}

impl CostRule {
	fn compile(raw: RawCostRule) -> anyhow::Result<Self> {
		let expression = match (&raw.kind, raw.expression) {
			(CostKind::Cel, Some(expr)) => Some(Arc::new(cel::Program::compile(&expr)?)),
			(CostKind::Cel, None) => anyhow::bail!("cel cost rule {} has no expression", raw.metadata_key),
			(_, _) => None,
		};
		Ok(CostRule {
			kind: raw.kind,
			metadata_key: Strng::from(raw.metadata_key),
			expression,
		})
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredModel {
	pub name: String,
	pub owned_by: String,
	pub created_at: i64,
}

/// A fully validated backend: the cost of CEL-compiling and constructing the
/// auth handler paid once, at reload time, not per request.
#[derive(Clone)]
pub struct Backend {
	pub name: Strng,
	pub schema: BackendSchema,
	pub auth: Arc<dyn crate::auth::BackendAuthHandler>,
	pub header_mutation: crate::translate::HeaderMutationConfig,
	pub body_mutation: crate::translate::BodyMutationConfig,
	pub model_name_override: Option<Strng>,
}

impl std::fmt::Debug for Backend {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Backend")
			.field("name", &self.name)
			.field("schema", &self.schema)
			.finish_non_exhaustive()
	}
}

/// The validated, process-wide configuration generation. Swapped atomically
/// on reload; any `Backend`/`CostRule` handed out from a given generation
/// remains callable for the lifetime of that `Arc`, per the "callable until
/// next reload" invariant — readers snapshot `load_full()` exactly once.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
	pub uuid: uuid::Uuid,
	pub backends: Arc<HashMap<Strng, Backend>>,
	pub request_costs: Arc<Vec<CostRule>>,
	pub declared_models: Arc<Vec<DeclaredModel>>,
	pub mcp: Arc<McpConfig>,
	pub debug_logging: bool,
	pub debug_redact_body: bool,
}

impl RuntimeConfig {
	pub fn from_raw(raw: RawConfig) -> anyhow::Result<Self> {
		let mut backends = HashMap::new();
		for (name, b) in raw.backends {
			let auth = crate::auth::build_handler(b.auth.as_ref())?;
			backends.insert(
				Strng::from(name.as_str()),
				Backend {
					name: Strng::from(name.as_str()),
					schema: b.schema,
					auth,
					header_mutation: b.header_mutation,
					body_mutation: b.body_mutation,
					model_name_override: b.model_name_override.map(Strng::from),
				},
			);
		}
		let request_costs = raw
			.request_costs
			.into_iter()
			.map(CostRule::compile)
			.collect::<anyhow::Result<Vec<_>>>()?;
		Ok(RuntimeConfig {
			uuid: uuid::Uuid::new_v4(),
			backends: Arc::new(backends),
			request_costs: Arc::new(request_costs),
			declared_models: Arc::new(raw.declared_models),
			mcp: Arc::new(raw.mcp.unwrap_or_default()),
			debug_logging: raw.debug_logging,
			debug_redact_body: raw.debug_redact_body,
		})
	}

	pub fn get_backend(&self, name: &str) -> Option<&Backend> {
		self.backends.get(name)
	}
}

/// Process-wide swapped pointer. `store()` never blocks readers; every
/// processor calls `load_full()` exactly once, at `SetBackend`/first access,
/// and holds that `Arc` for the request's lifetime. This is the open
/// question in spec.md §9 resolved: the spec treats pointer-swap alone as
/// sufficient since each request snapshots once, so no extra read lock is
/// added here.
#[derive(Clone)]
pub struct ConfigHandle(Arc<ArcSwap<RuntimeConfig>>);

impl ConfigHandle {
	pub fn new(initial: RuntimeConfig) -> Self {
		Self(Arc::new(ArcSwap::new(Arc::new(initial))))
	}

	/// `LoadConfig` from spec.md §4.1: replace the runtime config atomically.
	/// May race with in-flight requests; tolerated by design.
	pub fn load_config(&self, next: RuntimeConfig) {
		self.0.store(Arc::new(next));
	}

	pub fn current(&self) -> Arc<RuntimeConfig> {
		self.0.load_full()
	}
}

pub mod cel {
	//! Thin wrapper so `config.rs` doesn't need to know which CEL crate
	//! backs cost-rule evaluation; kept separate from `agent_celx` (pure
	//! extension functions) since this owns context construction too.

	pub struct Program(::cel::Program);

	impl std::fmt::Debug for Program {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			f.write_str("Program(..)")
		}
	}

	impl Program {
		pub fn compile(src: &str) -> anyhow::Result<Self> {
			Ok(Program(::cel::Program::compile(src)?))
		}

		/// Evaluate with the cost-rule variable set named in spec.md §4.6:
		/// `{model, backend, input, cached_input, cache_creation_input,
		/// output, total}`. Truncated to u32 at emission, per spec.md §4.4.
		pub fn eval_cost(&self, vars: &CostVars) -> anyhow::Result<u64> {
			let mut ctx = ::cel::Context::default();
			agent_celx::insert_all(&mut ctx);
			ctx.add_variable_from_value("model", vars.model.clone());
			ctx.add_variable_from_value("backend", vars.backend.clone());
			ctx.add_variable_from_value("input", vars.input as i64);
			ctx.add_variable_from_value("cached_input", vars.cached_input as i64);
			ctx.add_variable_from_value("cache_creation_input", vars.cache_creation_input as i64);
			ctx.add_variable_from_value("output", vars.output as i64);
			ctx.add_variable_from_value("total", vars.total as i64);
			let value = self.0.execute(&ctx)?;
			match value {
				::cel::Value::Int(i) => Ok(i.max(0) as u64),
				::cel::Value::UInt(u) => Ok(u),
				other => anyhow::bail!("cost expression did not return a number: {other:?}"),
			}
		}
	}

	#[derive(Default, Clone, Debug)]
	pub struct CostVars {
		pub model: String,
		pub backend: String,
		pub input: u64,
		pub cached_input: u64,
		pub cache_creation_input: u64,
		pub output: u64,
		pub total: u64,
	}
}
