//! The AI-traffic gateway: an external-processor server that intercepts a host
//! proxy's request/response phases, translates between LLM provider dialects,
//! injects backend authentication, records token-cost metrics, and
//! multiplexes MCP sessions across backend MCP servers.

pub use agent_core::prelude::*;

pub mod auth;
pub mod config;
pub mod endpoints;
pub mod ext_proc;
pub mod mcp;
pub mod metrics;
pub mod redact;
pub mod telemetry;
pub mod translate;

pub use config::{ConfigHandle, ConfigSource, RawConfig, RuntimeConfig};
