//! GET notification stream (spec.md §4.7 "GET: open a long-lived
//! notification stream..."): JSON-RPC `ping` heartbeats on a configurable
//! interval (0 disables them) plus a `notifications/tools/list_changed`
//! message whenever the route's tool configuration changes.
//!
//! The tool-change signal is grounded on spec.md §5: "a broadcast primitive
//! implemented as a reloadable channel — each watcher re-reads the current
//! channel every iteration; on change, the broadcaster closes the current
//! channel and installs a fresh one under a mutex," which is exactly what
//! [`ToolChangeSignaler`] does with `tokio::sync::broadcast`. The heartbeat
//! is driven directly off a `tokio::time::interval` tick inside the stream
//! body rather than `sse_stream`'s `with_keep_alive` (which emits a bare SSE
//! comment line, not a JSON-RPC `ping` message) so every heartbeat is the
//! `ping_event()` spec.md §4.7 names.

use std::sync::Mutex;
use std::time::Duration;

use sse_stream::{Sse, SseBody};

/// Per-route broadcaster for "the tool configuration changed" events.
/// Watchers hold no long-lived subscription; they re-subscribe to whatever
/// channel is current each time they wake, so a reload that replaces the
/// channel doesn't strand an existing watcher on a closed one forever within
/// their next heartbeat loop.
#[derive(Default)]
pub struct ToolChangeSignaler {
	inner: Mutex<tokio::sync::broadcast::Sender<()>>,
}

impl ToolChangeSignaler {
	pub fn new() -> Self {
		let (tx, _rx) = tokio::sync::broadcast::channel(1);
		Self { inner: Mutex::new(tx) }
	}

	/// Called from the config-reload path when `same_tools` reports a
	/// change: closes out the current channel's receivers by replacing it
	/// with a fresh one, and wakes anyone still subscribed to the old one.
	pub fn notify_changed(&self) {
		let mut guard = self.inner.lock().unwrap();
		let _ = guard.send(());
		let (tx, _rx) = tokio::sync::broadcast::channel(1);
		*guard = tx;
	}

	pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<()> {
		self.inner.lock().unwrap().subscribe()
	}
}

fn ping_event() -> Sse {
	Sse::default().data(r#"{"jsonrpc":"2.0","method":"ping"}"#)
}

fn tools_changed_event() -> Sse {
	Sse::default().data(r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#)
}

/// Builds the GET response body: a stream that yields one
/// `notifications/tools/list_changed` event per tool-change signal, plus a
/// JSON-RPC `ping` heartbeat every `heartbeat_interval` (never, if `None` or
/// zero — spec.md: "Heartbeat interval is configurable; 0 disables
/// heartbeats.", "flush immediately on server events").
pub fn notification_stream_response(
	signaler: &ToolChangeSignaler,
	heartbeat_interval: Option<Duration>,
) -> http::Response<SseBody> {
	let mut rx = signaler.subscribe();
	let heartbeat_interval = heartbeat_interval.filter(|d| !d.is_zero());
	let stream = async_stream::stream! {
		let mut ticker = heartbeat_interval.map(tokio::time::interval);
		loop {
			match &mut ticker {
				Some(ticker) => {
					tokio::select! {
						biased;
						changed = rx.recv() => match changed {
							Ok(()) => yield Ok(tools_changed_event()),
							Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
							Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
						},
						_ = ticker.tick() => yield Ok(ping_event()),
					}
				},
				None => match rx.recv().await {
					Ok(()) => yield Ok(tools_changed_event()),
					Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
					Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
				},
			}
		}
	};
	let body = SseBody::new(Box::pin(stream));
	http::Response::builder()
		.status(http::StatusCode::OK)
		.header(http::header::CONTENT_TYPE, "text/event-stream")
		.header(http::header::CACHE_CONTROL, "no-cache")
		.body(body)
		.expect("valid sse response")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn signaler_wakes_subscribers_on_change() {
		let signaler = ToolChangeSignaler::new();
		let mut rx = signaler.subscribe();
		signaler.notify_changed();
		assert!(rx.recv().await.is_ok());
	}
}
