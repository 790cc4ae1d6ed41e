//! A cheaply-cloneable, interned-friendly string type used throughout the
//! gateway for anything that is read far more often than it is constructed
//! (model names, backend names, header values copied into state). Built on
//! `arcstr::ArcStr`, which stores its bytes behind an `Arc` so clones are a
//! refcount bump rather than an allocation.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

pub type Strng = arcstr::ArcStr;

/// Construct a `Strng` from anything that's already owned or borrowed text.
pub fn new(s: impl AsRef<str>) -> Strng {
	Strng::from(s.as_ref())
}

/// Re-exported so call sites can write `strng::literal!("foo")` for a
/// `'static` string with no allocation at all.
#[macro_export]
macro_rules! strng_literal {
	($s:expr) => {
		$crate::strng::Strng::from_static_str($s)
	};
}

pub use strng_literal as literal;

/// Re-exported so call sites can write `strng::format!("{a}/{b}")` the same
/// way they'd use `std::format!`, just producing a `Strng`.
#[macro_export]
macro_rules! strng_format {
	($($arg:tt)*) => {
		$crate::strng::new(::std::format!($($arg)*))
	};
}

pub use strng_format as format;

/// A thin, `Deref<Target = str>` view that's handy when a function wants to
/// accept either a `Strng` or a plain `&str` without forcing an allocation.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct StrngRef(pub Strng);

impl Deref for StrngRef {
	type Target = str;
	fn deref(&self) -> &str {
		self.0.as_str()
	}
}

impl Borrow<str> for StrngRef {
	fn borrow(&self) -> &str {
		self.0.as_str()
	}
}

impl fmt::Display for StrngRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}
