//! Conversions between filesystem paths and `file://` URIs.
//!
//! Documents are keyed by their URI string throughout the store; these
//! helpers are the only place the two representations meet.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use url::Url;

/// Errors that can occur when converting a URI back into a filesystem path.
#[derive(Debug, Error)]
pub enum UriError {
	/// The URI could not be parsed at all.
	#[error("malformed URI: {0}")]
	Malformed(String),

	/// The URI parses but does not name a local file.
	#[error("not a file URI: {0}")]
	NotAFile(String),
}

/// Converts an absolute filesystem path into a `file://` URI string.
///
/// Returns `None` for relative paths.
pub fn from_path(path: &Path) -> Option<String> {
	Url::from_file_path(path).ok().map(Url::into)
}

/// Converts a `file://` URI string back into a filesystem path.
pub fn to_path(uri: &str) -> Result<PathBuf, UriError> {
	let url = Url::parse(uri).map_err(|_| UriError::Malformed(uri.to_string()))?;
	url.to_file_path().map_err(|()| UriError::NotAFile(uri.to_string()))
}

/// Resolves `relative` against the directory containing `base_uri`.
pub fn resolve_relative(base_uri: &str, relative: &str) -> Option<String> {
	let base = to_path(base_uri).ok()?;
	let dir = base.parent()?;
	from_path(&normalize(&dir.join(relative)))
}

/// Lexically removes `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
	let mut out = PathBuf::new();
	for component in path.components() {
		match component {
			Component::CurDir => {}
			Component::ParentDir => {
				if !out.pop() {
					out.push(component.as_os_str());
				}
			}
			other => out.push(other.as_os_str()),
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[test]
	fn test_path_uri_round_trip() {
		let uri = from_path(Path::new("/projects/app/src/main.zig")).unwrap();
		assert_eq!(uri, "file:///projects/app/src/main.zig");
		assert_eq!(to_path(&uri).unwrap(), Path::new("/projects/app/src/main.zig"));
	}

	#[test]
	fn test_from_path_percent_encodes() {
		let uri = from_path(Path::new("/has space/a.zig")).unwrap();
		assert_eq!(uri, "file:///has%20space/a.zig");
		assert_eq!(to_path(&uri).unwrap(), Path::new("/has space/a.zig"));
	}

	#[test]
	fn test_from_path_rejects_relative() {
		assert_eq!(from_path(Path::new("src/main.zig")), None);
	}

	#[test]
	fn test_to_path_rejects_non_file_uris() {
		assert!(matches!(to_path("https://example.com/a.zig"), Err(UriError::NotAFile(_))));
		assert!(matches!(to_path("not a uri"), Err(UriError::Malformed(_))));
	}

	#[rstest]
	#[case("file:///p/sub/x.zig", "other.zig", "file:///p/sub/other.zig")]
	#[case("file:///p/sub/x.zig", "./other.zig", "file:///p/sub/other.zig")]
	#[case("file:///p/sub/x.zig", "../lib/a.zig", "file:///p/lib/a.zig")]
	#[case("file:///p/x.zig", "nested/deep.zig", "file:///p/nested/deep.zig")]
	fn test_resolve_relative(#[case] base: &str, #[case] relative: &str, #[case] expected: &str) {
		assert_eq!(resolve_relative(base, relative).as_deref(), Some(expected));
	}
}
