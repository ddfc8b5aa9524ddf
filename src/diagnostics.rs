//! Error bundles and the diagnostics sink seam.
//!
//! The store never talks to the client directly; it converts tool output
//! into [`ErrorBundle`]s and hands them to a [`DiagnosticsSink`] owned by
//! the surrounding server.

use std::path::Path;

/// A bundle of source-located error messages produced by an external tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorBundle {
	/// Messages in the order the tool emitted them.
	pub messages: Vec<ErrorMessage>,
}

/// A single message inside an [`ErrorBundle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
	/// Human-readable message text.
	pub message: String,
	/// Path of the offending file, when the tool reported one.
	pub path: Option<String>,
	/// One-based line number, zero when unknown.
	pub line: u32,
	/// One-based column number, zero when unknown.
	pub column: u32,
}

impl ErrorBundle {
	/// Returns true when the bundle carries no messages.
	pub fn is_empty(&self) -> bool {
		self.messages.is_empty()
	}

	/// Parses compiler-style stderr into a bundle.
	///
	/// Lines of the form `path:line:col: error: message` become located
	/// messages; anything else non-empty is kept as plain text so no output
	/// is silently dropped.
	pub fn from_compiler_output(output: &str) -> Self {
		let mut messages = Vec::new();
		for line in output.lines() {
			let line = line.trim_end();
			if line.is_empty() {
				continue;
			}
			messages.push(parse_located_line(line).unwrap_or_else(|| ErrorMessage {
				message: line.to_string(),
				path: None,
				line: 0,
				column: 0,
			}));
		}
		Self { messages }
	}
}

fn parse_located_line(line: &str) -> Option<ErrorMessage> {
	let (location, message) = line.split_once(": error: ")?;
	let (rest, column) = location.rsplit_once(':')?;
	let (path, line_number) = rest.rsplit_once(':')?;
	Some(ErrorMessage {
		message: message.to_string(),
		path: Some(path.to_string()),
		line: line_number.parse().ok()?,
		column: column.parse().ok()?,
	})
}

/// Origin of a per-document bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticsKind {
	/// Errors from parsing the document itself.
	Parse,
	/// Errors from translating an embedded C import.
	CImport,
}

/// Sink for diagnostics produced by the store.
///
/// Implementations batch pushed bundles and forward them to the client on
/// [`publish`](Self::publish).
pub trait DiagnosticsSink: Send + Sync {
	/// Records a bundle under a workspace-level tag, replacing whatever was
	/// previously recorded for that tag at an older version.
	fn push_error_bundle(&self, tag: &str, version: u32, cwd: Option<&Path>, bundle: &ErrorBundle);

	/// Records a bundle attached to a single document.
	fn push_single_document(&self, kind: DiagnosticsKind, uri: &str, bundle: &ErrorBundle);

	/// Forwards everything recorded since the last call to the client.
	fn publish(&self);
}

/// Sink that drops everything. Used by headless deployments and tests.
#[derive(Debug, Default)]
pub struct NullDiagnostics;

impl DiagnosticsSink for NullDiagnostics {
	fn push_error_bundle(&self, _tag: &str, _version: u32, _cwd: Option<&Path>, _bundle: &ErrorBundle) {}

	fn push_single_document(&self, _kind: DiagnosticsKind, _uri: &str, _bundle: &ErrorBundle) {}

	fn publish(&self) {}
}
