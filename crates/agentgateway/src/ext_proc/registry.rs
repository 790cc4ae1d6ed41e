//! Process-wide router-processor registry keyed by the generated internal
//! request id (spec.md §4.1 step 5): the upstream stream looks up the
//! router processor's shared state by this id at `SetBackend` time. Backed
//! by `dashmap` (already a teacher dependency) rather than a bare
//! `RwLock<HashMap>`: it shards internally, matching spec.md §5's
//! "read-biased shared map, short critical sections" without hand-rolling
//! the sharding ourselves.
//!
//! spec.md §9 warns against reaching the router "via a raw pointer that can
//! outlive the request" — entries here are `Arc<Mutex<RequestState>>`, and
//! the map entry itself (not a long-lived reference into it) is what's
//! looked up on each access, so an upstream processor never holds anything
//! that survives the router stream closing out from under it.

use std::sync::Arc;

use dashmap::DashMap;

use super::router::RouterProcessor;

#[derive(Clone, Default)]
pub struct RouterRegistry {
	inner: Arc<DashMap<String, Arc<RouterProcessor>>>,
}

impl RouterRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a freshly created router processor under its generated
	/// internal id (spec.md §4.1 step 5: `<x-request-id>-<uuid>`).
	pub fn insert(&self, internal_req_id: String, processor: Arc<RouterProcessor>) {
		self.inner.insert(internal_req_id, processor);
	}

	/// Look up a router processor by internal id. Called by the upstream
	/// processor's `SetBackend`; a missing entry means the router stream
	/// already closed (or the header was never stamped), which is a fatal
	/// `InternalError` per spec.md §4.1's failure semantics.
	pub fn get(&self, internal_req_id: &str) -> Option<Arc<RouterProcessor>> {
		self.inner.get(internal_req_id).map(|e| e.value().clone())
	}

	/// Remove the entry when the router stream closes, per spec.md §4.1
	/// step 5: "The map entry is removed when the router stream closes."
	pub fn remove(&self, internal_req_id: &str) {
		self.inner.remove(internal_req_id);
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn insert_get_remove_round_trips() {
		let registry = RouterRegistry::new();
		let processor = Arc::new(RouterProcessor::new("req-1".to_string(), "/v1/chat/completions".to_string()));
		registry.insert("req-1".to_string(), processor);
		assert!(registry.get("req-1").is_some());
		registry.remove("req-1");
		assert!(registry.get("req-1").is_none());
	}

	#[tokio::test]
	async fn missing_entry_is_none() {
		let registry = RouterRegistry::new();
		assert!(registry.get("does-not-exist").is_none());
	}
}
