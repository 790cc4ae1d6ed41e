//! Process entrypoint: CLI parsing, configuration loading, telemetry setup,
//! and wiring the router/upstream ext_proc gRPC listeners plus the MCP HTTP
//! listener to a shared [`ConfigHandle`]. Reading config off disk and
//! driving reload is this binary's job; `agentgateway` itself only owns
//! parsing/validation/the swap (spec.md §4.1, §6 "Persisted state: none;
//! ... Config is read from files by external collaborators and delivered
//! via LoadConfig").

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use agent_core::version::BuildInfo;
use agentgateway::config::{ConfigHandle, ConfigSource, RawConfig, RuntimeConfig};
use agentgateway::ext_proc::proto::health::health_check_response::ServingStatus;
use agentgateway::ext_proc::{ExtProcService, HealthService, RouterRegistry};
use agentgateway::mcp::handler::McpHandler;
use agentgateway::telemetry::{self, LogFormat, TelemetryConfig};
use anyhow::Context as _;
use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Either, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use sse_stream::SseBody;
use tokio::net::TcpListener;
use tonic::transport::Server;
use tracing::{error, info, warn};

#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

const EXT_PROC_SERVICE_NAME: &str = "envoy.service.ext_proc.v3.ExternalProcessor";

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
#[command(disable_version_flag = true)]
struct Args {
	/// Inline configuration (YAML), mutually exclusive with --file.
	#[arg(short, long, value_name = "config")]
	config: Option<String>,

	/// Configuration file path. Reloaded on SIGHUP.
	#[arg(short, long, value_name = "file")]
	file: Option<PathBuf>,

	/// Router-filter ext_proc gRPC listener address.
	#[arg(long, value_name = "addr", default_value = "127.0.0.1:9001")]
	router_addr: SocketAddr,

	/// Upstream-filter ext_proc gRPC listener address.
	#[arg(long, value_name = "addr", default_value = "127.0.0.1:9002")]
	upstream_addr: SocketAddr,

	/// MCP proxy HTTP listener address.
	#[arg(long, value_name = "addr", default_value = "127.0.0.1:9003")]
	mcp_addr: SocketAddr,

	/// OTLP gRPC collector endpoint; spans stay local-only when unset.
	#[arg(long, value_name = "endpoint")]
	otlp_endpoint: Option<String>,

	/// Print version and exit.
	#[arg(short = 'V', long = "version")]
	version: bool,
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	if args.version {
		println!("{}", BuildInfo::new());
		return Ok(());
	}
	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()?
		.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
	let telemetry_config = TelemetryConfig {
		log_format: LogFormat::from_env(),
		otlp_endpoint: args.otlp_endpoint.clone(),
	};
	let guard = telemetry::init(&telemetry_config)?;
	info!(version = %BuildInfo::new(), "starting agentgateway");

	let source = match (args.config, args.file) {
		(Some(_), Some(_)) => anyhow::bail!("only one of --config or --file may be set"),
		(Some(inline), None) => ConfigSource::Static(Bytes::from(inline)),
		(None, Some(path)) => ConfigSource::File(path),
		(None, None) => ConfigSource::Static(Bytes::from_static(b"")),
	};

	let runtime = load_runtime_config(&source).await.context("loading initial configuration")?;
	let config = ConfigHandle::new(runtime);
	let registry = RouterRegistry::new();
	let mcp_handler = Arc::new(McpHandler::new(config.clone()));

	if matches!(source, ConfigSource::File(_)) {
		tokio::task::spawn(watch_reload(source.clone(), config.clone(), mcp_handler.clone()));
	}

	let mut statuses = HashMap::new();
	statuses.insert(EXT_PROC_SERVICE_NAME.to_string(), ServingStatus::Serving);
	let health = HealthService::new(statuses);

	let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

	let router_task = {
		let mut rx = shutdown_tx.subscribe();
		let svc = ExtProcService::router(registry.clone(), config.clone());
		let health = health.clone();
		let addr = args.router_addr;
		tokio::task::spawn(async move {
			info!(%addr, "router ext_proc listener ready");
			if let Err(error) = Server::builder()
				.add_service(svc)
				.add_service(health)
				.serve_with_shutdown(addr, async move {
					let _ = rx.recv().await;
				})
				.await
			{
				error!(%error, "router ext_proc listener exited");
			}
		})
	};

	let upstream_task = {
		let mut rx = shutdown_tx.subscribe();
		let svc = ExtProcService::upstream(registry.clone(), config.clone());
		let health = health.clone();
		let addr = args.upstream_addr;
		tokio::task::spawn(async move {
			info!(%addr, "upstream ext_proc listener ready");
			if let Err(error) = Server::builder()
				.add_service(svc)
				.add_service(health)
				.serve_with_shutdown(addr, async move {
					let _ = rx.recv().await;
				})
				.await
			{
				error!(%error, "upstream ext_proc listener exited");
			}
		})
	};

	let mcp_task = {
		let mut rx = shutdown_tx.subscribe();
		let handler = mcp_handler.clone();
		let addr = args.mcp_addr;
		tokio::task::spawn(async move {
			tokio::select! {
				result = serve_mcp(handler, addr) => {
					if let Err(error) = result {
						error!(%error, "mcp listener exited");
					}
				},
				_ = rx.recv() => {},
			}
		})
	};

	tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
	info!("shutdown signal received");
	let _ = shutdown_tx.send(());
	let _ = tokio::join!(router_task, upstream_task, mcp_task);
	guard.shutdown();
	Ok(())
}

async fn load_runtime_config(source: &ConfigSource) -> anyhow::Result<RuntimeConfig> {
	let contents = source.read_to_string().await?;
	let raw: RawConfig = if contents.trim().is_empty() {
		RawConfig::default()
	} else {
		serde_yaml::from_str(&contents).context("parsing configuration")?
	};
	RuntimeConfig::from_raw(raw)
}

/// SIGHUP-triggered reload, matching the ztunnel-lineage convention of this
/// project's proxies for file-based configuration (inline `--config` has
/// nothing to re-read, so it's never watched).
async fn watch_reload(source: ConfigSource, config: ConfigHandle, mcp_handler: Arc<McpHandler>) {
	let mut signals = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
		Ok(signals) => signals,
		Err(error) => {
			warn!(%error, "failed to install SIGHUP handler; config reload on signal is disabled");
			return;
		},
	};
	while signals.recv().await.is_some() {
		match load_runtime_config(&source).await {
			Ok(next) => {
				let old_mcp = config.current().mcp.clone();
				mcp_handler.notify_tool_changes(&old_mcp, &next.mcp);
				config.load_config(next);
				info!("configuration reloaded");
			},
			Err(error) => error!(%error, "failed to reload configuration, keeping previous generation"),
		}
	}
}

type McpResponseBody = Either<Full<Bytes>, SseBody>;

async fn serve_mcp(handler: Arc<McpHandler>, addr: SocketAddr) -> anyhow::Result<()> {
	let listener = TcpListener::bind(addr).await.with_context(|| format!("binding mcp listener on {addr}"))?;
	info!(%addr, "mcp listener ready");
	loop {
		let (stream, peer) = match listener.accept().await {
			Ok(pair) => pair,
			Err(error) => {
				warn!(%error, "mcp listener accept failed");
				continue;
			},
		};
		let handler = handler.clone();
		tokio::task::spawn(async move {
			let io = TokioIo::new(stream);
			let service = service_fn(move |req| {
				let handler = handler.clone();
				async move { mcp_respond(handler, req).await }
			});
			if let Err(error) = ConnBuilder::new(TokioExecutor::new()).serve_connection(io, service).await {
				warn!(%peer, %error, "mcp connection error");
			}
		});
	}
}

async fn mcp_respond(
	handler: Arc<McpHandler>,
	req: http::Request<Incoming>,
) -> Result<http::Response<McpResponseBody>, Infallible> {
	let (parts, body) = req.into_parts();
	match parts.method {
		http::Method::POST => {
			let bytes = match body.collect().await {
				Ok(collected) => collected.to_bytes(),
				Err(_) => Bytes::new(),
			};
			let req = http::Request::from_parts(parts, bytes);
			let resp = handler.handle_post(req).await;
			Ok(resp.map(|b| Either::Left(Full::new(b))))
		},
		http::Method::GET => match handler.handle_get(&parts.headers) {
			Ok(resp) => Ok(resp.map(Either::Right)),
			Err(error) => Ok(error.into_response().map(|b| Either::Left(Full::new(b)))),
		},
		http::Method::DELETE => {
			let resp = match handler.handle_delete(&parts.headers).await {
				Ok(resp) => resp,
				Err(error) => error.into_response(),
			};
			Ok(resp.map(|b| Either::Left(Full::new(b))))
		},
		_ => Ok(http::Response::builder()
			.status(http::StatusCode::METHOD_NOT_ALLOWED)
			.body(Either::Left(Full::new(Bytes::new())))
			.expect("valid response")),
	}
}
