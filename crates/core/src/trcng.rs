//! Small helpers shared between the tracing layer and anything that needs to
//! read claims out of an authenticated identity (JWT-backed or otherwise)
//! without depending on a concrete token format.

use std::fmt;

/// A source of string-valued claims, keyed by name. Implemented by whatever
/// an endpoint's authentication layer produces (a decoded JWT, a static
/// service identity, ...) so CEL contexts and authorization rules can read
/// claims without caring where they came from.
pub trait Claim {
	fn get_claim(&self, key: &str) -> Option<&str>;
}

impl Claim for std::collections::HashMap<String, String> {
	fn get_claim(&self, key: &str) -> Option<&str> {
		self.get(key).map(String::as_str)
	}
}

/// Redact a value for inclusion in a tracing span or log line, keeping only
/// enough of it to be useful for correlation.
pub fn redact_tail(value: &str, keep: usize) -> String {
	let len = value.chars().count();
	if len <= keep {
		return "*".repeat(len);
	}
	let skip = len - keep;
	let mut out = String::with_capacity(len);
	out.extend(std::iter::repeat('*').take(skip));
	out.extend(value.chars().skip(skip));
	out
}

/// Wraps a displayable value so it only ever appears in tracing output as
/// `<redacted>`, while still being `Debug`/`Display` so it can sit inside a
/// struct that derives both.
pub struct Sensitive<T>(pub T);

impl<T> fmt::Debug for Sensitive<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

impl<T> fmt::Display for Sensitive<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn redact_tail_keeps_suffix() {
		assert_eq!(redact_tail("sk-abcdef1234", 4), "*********1234");
		assert_eq!(redact_tail("ab", 4), "**");
	}
}
