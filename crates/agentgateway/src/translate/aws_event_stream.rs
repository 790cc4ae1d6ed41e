//! AWS event-stream decoder: the body is a sequence of length-prefixed
//! binary frames (spec.md §4.4, §6 glossary); each frame's JSON payload
//! carries a base64-encoded inner event under a `"bytes"` key. Grounded on
//! the teacher's `parse/aws_sse.rs`, which wraps
//! `aws_smithy_eventstream::frame::MessageFrameDecoder` as a
//! `tokio_util::codec::Decoder`; reused directly here since the framing
//! itself is unchanged, only what we do with each decoded frame differs (the
//! teacher re-emits as SSE for an outbound relay, we decode the inner
//! payload for translation).

use aws_smithy_eventstream::frame::{DecodedFrame, MessageFrameDecoder};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::BytesMut;
use serde_json::Value;

use crate::translate::TranslateError;

/// One AWS event-stream frame's inner payload, decoded and base64-decoded.
pub struct InnerEvent {
	pub event_type: Option<String>,
	pub payload: Vec<u8>,
}

/// Feed one upstream chunk into `buf` (the partial-frame state a
/// `ResponseState` owns across calls) and return every frame it completes.
/// `MessageFrameDecoder` carries no state of its own beyond the bytes it is
/// handed, so a fresh decoder per call is equivalent to a long-lived one.
pub fn feed(buf: &mut BytesMut, chunk: &[u8]) -> Result<Vec<InnerEvent>, TranslateError> {
	buf.extend_from_slice(chunk);
	let mut decoder = MessageFrameDecoder::default();
	let mut out = Vec::new();
	loop {
		match decoder
			.decode_frame(buf)
			.map_err(|e| TranslateError::Protocol(e.to_string()))?
		{
			DecodedFrame::Complete(message) => out.push(decode_inner(message)?),
			DecodedFrame::Incomplete => break,
		}
	}
	Ok(out)
}

fn decode_inner(message: aws_smithy_types::event_stream::Message) -> Result<InnerEvent, TranslateError> {
	let event_type = message
		.headers()
		.iter()
		.find(|h| h.name().as_str() == ":event-type")
		.and_then(|h| h.value().as_string().ok())
		.map(|s| s.as_str().to_string());

	let payload: Value = serde_json::from_slice(message.payload())
		.map_err(|e| TranslateError::Protocol(format!("invalid event-stream payload json: {e}")))?;
	let inner_b64 = payload
		.get("bytes")
		.and_then(Value::as_str)
		.ok_or_else(|| TranslateError::Protocol("event-stream frame missing bytes field".into()))?;
	let payload = BASE64
		.decode(inner_b64)
		.map_err(|e| TranslateError::Protocol(format!("invalid base64 in event-stream frame: {e}")))?;
	Ok(InnerEvent { event_type, payload })
}
