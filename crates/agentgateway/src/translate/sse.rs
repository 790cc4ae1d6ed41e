//! Minimal incremental SSE reader: parses `event:`/`data:`/blank-line
//! message boundaries out of a byte buffer that grows one upstream chunk at
//! a time, returning whichever complete events the buffer now contains and
//! leaving a trailing partial event buffered for the next call. Translators
//! use this directly (rather than the MCP proxy's `sse_stream` crate, which
//! models a complete async stream) because `Translator::response_body` is
//! handed one synchronous chunk at a time and must report partial-frame
//! state back into `ResponseState::buffer`.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseEvent {
	pub event: Option<String>,
	pub data: String,
	pub id: Option<String>,
}

/// Feeds `chunk` into `buffer`, extracting every complete `\n\n`-terminated
/// event. The leftover partial event (if any) remains in `buffer`.
pub struct SseReader;

impl SseReader {
	pub fn feed(buffer: &mut Vec<u8>, chunk: &[u8]) -> Vec<SseEvent> {
		buffer.extend_from_slice(chunk);
		let mut events = Vec::new();
		loop {
			let Some(boundary) = find_double_newline(buffer) else {
				break;
			};
			let raw: Vec<u8> = buffer.drain(..boundary.end).collect();
			// Drop the boundary bytes themselves (already consumed by drain).
			let text = String::from_utf8_lossy(&raw[..boundary.start]);
			if let Some(event) = parse_event(&text) {
				events.push(event);
			}
		}
		events
	}
}

struct Boundary {
	start: usize,
	end: usize,
}

fn find_double_newline(buf: &[u8]) -> Option<Boundary> {
	let mut i = 0;
	while i + 1 < buf.len() {
		if buf[i] == b'\n' && buf[i + 1] == b'\n' {
			return Some(Boundary { start: i, end: i + 2 });
		}
		if buf[i] == b'\r' && buf.get(i + 1) == Some(&b'\n') && buf.get(i + 2) == Some(&b'\r') && buf.get(i + 3) == Some(&b'\n') {
			return Some(Boundary { start: i, end: i + 4 });
		}
		i += 1;
	}
	None
}

fn parse_event(text: &str) -> Option<SseEvent> {
	let mut event = SseEvent::default();
	let mut data_lines = Vec::new();
	let mut saw_field = false;
	for line in text.lines() {
		if let Some(rest) = line.strip_prefix("data:") {
			data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
			saw_field = true;
		} else if let Some(rest) = line.strip_prefix("event:") {
			event.event = Some(rest.strip_prefix(' ').unwrap_or(rest).to_string());
			saw_field = true;
		} else if let Some(rest) = line.strip_prefix("id:") {
			event.id = Some(rest.strip_prefix(' ').unwrap_or(rest).to_string());
			saw_field = true;
		}
	}
	if !saw_field {
		return None;
	}
	event.data = data_lines.join("\n");
	Some(event)
}

pub fn format_event(event: &SseEvent) -> Vec<u8> {
	let mut out = Vec::new();
	if let Some(name) = &event.event {
		out.extend_from_slice(format!("event: {name}\n").as_bytes());
	}
	if let Some(id) = &event.id {
		out.extend_from_slice(format!("id: {id}\n").as_bytes());
	}
	for line in event.data.split('\n') {
		out.extend_from_slice(format!("data: {line}\n").as_bytes());
	}
	out.push(b'\n');
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_events_split_across_chunks() {
		let mut buffer = Vec::new();
		let first = SseReader::feed(&mut buffer, b"event: message_start\ndata: {\"a\":1");
		assert!(first.is_empty());
		let second = SseReader::feed(&mut buffer, b"}\n\n");
		assert_eq!(second.len(), 1);
		assert_eq!(second[0].event.as_deref(), Some("message_start"));
		assert_eq!(second[0].data, "{\"a\":1}");
	}

	#[test]
	fn preserves_done_sentinel() {
		let mut buffer = Vec::new();
		let events = SseReader::feed(&mut buffer, b"data: [DONE]\n\n");
		assert_eq!(events[0].data, "[DONE]");
	}
}
