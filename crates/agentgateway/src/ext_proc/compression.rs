//! Response-body gzip decompression (spec.md §4.2 "decompress if needed
//! (gzip)", §3 "each response-body chunk is decompressed, translated").
//! Grounded on the teacher's `http/compression/mod.rs`
//! (`async_compression::tokio::bufread::GzipDecoder` over a `Content-Encoding`
//! sniff), adapted from the teacher's whole-body/stream-of-`Body` shape to
//! this pipeline's one-chunk-at-a-time `ProcessResponseBody` calls: a
//! `GzipDecoder` over a growable `Vec<u8>` writer is fed each wire chunk as it
//! arrives and drained after every feed, so decoder state (the in-flight
//! DEFLATE window) persists exactly the way a translator's own partial-frame
//! buffer does across chunks.

use tokio::io::AsyncWriteExt;

/// Per-response incremental gzip decoder. One instance per upstream
/// response; constructed only when `ProcessResponseHeaders` observes
/// `content-encoding: gzip`.
pub struct GzipStream {
	decoder: async_compression::tokio::write::GzipDecoder<Vec<u8>>,
}

impl GzipStream {
	pub fn new() -> Self {
		Self {
			decoder: async_compression::tokio::write::GzipDecoder::new(Vec::new()),
		}
	}

	/// Feed one more compressed chunk, returning whatever plaintext bytes the
	/// decoder has produced so far. `flush` on every call (not just at
	/// end-of-stream) so a unary response split across several wire chunks
	/// still decodes incrementally; `shutdown` at end-of-stream to drain any
	/// trailer the decoder was holding back.
	pub async fn feed(&mut self, chunk: &[u8], end_of_stream: bool) -> std::io::Result<Vec<u8>> {
		self.decoder.write_all(chunk).await?;
		if end_of_stream {
			self.decoder.shutdown().await?;
		} else {
			self.decoder.flush().await?;
		}
		Ok(std::mem::take(self.decoder.get_mut()))
	}
}

impl Default for GzipStream {
	fn default() -> Self {
		Self::new()
	}
}

/// Does this `content-encoding` value name gzip (ignoring case and the
/// `identity` no-op some upstreams append alongside it)?
pub fn is_gzip(content_encoding: &str) -> bool {
	content_encoding
		.split(',')
		.map(str::trim)
		.any(|tok| tok.eq_ignore_ascii_case("gzip"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn is_gzip_matches_case_insensitively_and_alongside_identity() {
		assert!(is_gzip("gzip"));
		assert!(is_gzip("GZIP"));
		assert!(is_gzip("identity, gzip"));
		assert!(!is_gzip("br"));
		assert!(!is_gzip("identity"));
	}

	#[tokio::test]
	async fn feed_round_trips_a_gzip_encoded_body_across_chunks() {
		use async_compression::tokio::write::GzipEncoder;

		let plaintext = b"{\"output\":{\"message\":{\"content\":[{\"text\":\"hi\"}]}}}";
		let mut encoder = GzipEncoder::new(Vec::new());
		encoder.write_all(plaintext).await.unwrap();
		encoder.shutdown().await.unwrap();
		let compressed = encoder.into_inner();

		let mut stream = GzipStream::new();
		let mid = compressed.len() / 2;
		let mut out = stream.feed(&compressed[..mid], false).await.unwrap();
		out.extend(stream.feed(&compressed[mid..], true).await.unwrap());
		assert_eq!(out, plaintext);
	}
}
