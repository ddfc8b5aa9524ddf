//! Seam to the language frontend.
//!
//! Parsing, scope building, IR generation, and C translation are all owned
//! by the surrounding server; the store only schedules them and caches
//! their results. The traits here define exactly what the store needs from
//! that machinery, and [`ScanFrontend`] provides a lexical stand-in that is
//! good enough for tests and single-crate deployments.

use std::hash::Hasher;
use std::path::PathBuf;

use siphasher::sip128::{Hasher128, SipHasher13};

use crate::config::StoreConfig;
use crate::diagnostics::ErrorBundle;

/// 128-bit keyed hash identifying a generated C source text.
pub type Hash = [u8; 16];

const HASH_KEY: (u64, u64) = (0x5a49_4747_5552_4154, 0x4349_4d50_4f52_5453);

/// Computes the keyed content hash used as C-import identity.
pub fn compute_hash(bytes: &[u8]) -> Hash {
	let mut hasher = SipHasher13::new_with_keys(HASH_KEY.0, HASH_KEY.1);
	hasher.write(bytes);
	hasher.finish128().as_bytes()
}

/// Dialect a document is parsed as, determined by its URI extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
	/// Ordinary source files (`.zig`).
	#[default]
	Source,
	/// Data-literal files (`.zon`).
	DataLiteral,
}

impl ParseMode {
	/// Picks the dialect for a document URI.
	pub fn from_uri(uri: &str) -> Self {
		if uri.ends_with(".zon") { Self::DataLiteral } else { Self::Source }
	}
}

/// Parse tree handed back by the frontend.
///
/// The store treats the tree as opaque apart from threading it back into
/// the same frontend's derivative producers and collectors.
#[derive(Debug, Default)]
pub struct ParseTree {
	/// Dialect the text was parsed as.
	pub mode: ParseMode,
	/// Import strings appearing in the tree, in source order.
	pub imports: Vec<String>,
	/// `@cImport` nodes appearing in the tree, in source order.
	pub cimports: Vec<CImportNode>,
	/// Node count reported by the parser.
	pub node_count: u32,
}

/// A `@cImport` node extracted from a parse tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CImportNode {
	/// Index of the node in the parse tree.
	pub node: u32,
	/// C source text synthesized from the node body.
	pub c_source: String,
}

/// Scope index derived from a parse tree.
#[derive(Debug, Default)]
pub struct ScopeIndex {
	/// Top-level declaration names in source order.
	pub declarations: Vec<String>,
}

/// Intermediate representation of a `source`-dialect document.
#[derive(Debug, Default)]
pub struct SourceIr {
	/// Errors produced while lowering; empty for well-formed input.
	pub errors: ErrorBundle,
}

/// Intermediate representation of a `data-literal`-dialect document.
#[derive(Debug, Default)]
pub struct DataIr {
	/// Errors produced while lowering; empty for well-formed input.
	pub errors: ErrorBundle,
}

/// The language frontend: parser, scope builder, IR generators, and the
/// import collectors.
///
/// All methods are total over well-formed trees; producers that can fail on
/// broken input report through the artifact's own error bundle instead.
pub trait Frontend: Send + Sync {
	/// Parses `text` in the given dialect.
	fn parse(&self, text: &str, mode: ParseMode) -> ParseTree;

	/// Builds the scope index for a tree.
	fn document_scope(&self, tree: &ParseTree, text: &str) -> ScopeIndex;

	/// Lowers a `source`-dialect tree.
	fn ir_source(&self, tree: &ParseTree, text: &str) -> SourceIr;

	/// Lowers a `data-literal`-dialect tree.
	fn ir_data(&self, tree: &ParseTree, text: &str) -> DataIr;

	/// Collects the import strings of a tree.
	fn import_strings(&self, tree: &ParseTree) -> Vec<String>;

	/// Collects the `@cImport` nodes of a tree.
	fn cimport_nodes(&self, tree: &ParseTree) -> Vec<CImportNode>;
}

/// Result of translating the C source behind a `@cImport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateResult {
	/// Translation produced a synthetic source file at this URI.
	Success(String),
	/// Translation ran but the C source did not compile.
	Failure(ErrorBundle),
}

/// Translator for embedded C source.
pub trait CTranslator: Send + Sync {
	/// Translates `c_source` using the given include directories and macro
	/// definitions. Returns `None` when no translator is available.
	fn translate(
		&self,
		config: &StoreConfig,
		include_dirs: &[PathBuf],
		c_macros: &[String],
		c_source: &str,
	) -> Option<TranslateResult>;
}

/// Translator that reports C imports as unavailable.
#[derive(Debug, Default)]
pub struct NullTranslator;

impl CTranslator for NullTranslator {
	fn translate(
		&self,
		_config: &StoreConfig,
		_include_dirs: &[PathBuf],
		_c_macros: &[String],
		_c_source: &str,
	) -> Option<TranslateResult> {
		None
	}
}

/// Lexical fallback frontend.
///
/// Recognizes `@import("...")` and `@cImport(...)` occurrences by scanning
/// the raw text and records top-level `const` declarations as the scope
/// index. It does not understand the language beyond that.
#[derive(Debug, Default)]
pub struct ScanFrontend;

impl Frontend for ScanFrontend {
	fn parse(&self, text: &str, mode: ParseMode) -> ParseTree {
		ParseTree {
			mode,
			imports: scan_imports(text),
			cimports: scan_cimports(text),
			node_count: text.lines().count() as u32,
		}
	}

	fn document_scope(&self, _tree: &ParseTree, text: &str) -> ScopeIndex {
		let mut declarations = Vec::new();
		for line in text.lines() {
			let line = line.trim_start();
			let rest = line.strip_prefix("pub const ").or_else(|| line.strip_prefix("const "));
			if let Some(rest) = rest {
				let name: String = rest
					.chars()
					.take_while(|c| c.is_alphanumeric() || *c == '_')
					.collect();
				if !name.is_empty() {
					declarations.push(name);
				}
			}
		}
		ScopeIndex { declarations }
	}

	fn ir_source(&self, _tree: &ParseTree, _text: &str) -> SourceIr {
		SourceIr::default()
	}

	fn ir_data(&self, _tree: &ParseTree, _text: &str) -> DataIr {
		DataIr::default()
	}

	fn import_strings(&self, tree: &ParseTree) -> Vec<String> {
		tree.imports.clone()
	}

	fn cimport_nodes(&self, tree: &ParseTree) -> Vec<CImportNode> {
		tree.cimports.clone()
	}
}

fn scan_imports(text: &str) -> Vec<String> {
	const NEEDLE: &str = "@import(\"";
	let mut imports = Vec::new();
	let mut rest = text;
	while let Some(position) = rest.find(NEEDLE) {
		rest = &rest[position + NEEDLE.len()..];
		let Some(end) = rest.find('"') else { break };
		imports.push(rest[..end].to_string());
		rest = &rest[end..];
	}
	imports
}

fn scan_cimports(text: &str) -> Vec<CImportNode> {
	const NEEDLE: &str = "@cImport(";
	let mut nodes = Vec::new();
	let mut offset = 0;
	while let Some(position) = text[offset..].find(NEEDLE) {
		let start = offset + position + NEEDLE.len();
		let Some(length) = balanced_paren_span(&text[start..]) else { break };
		nodes.push(CImportNode {
			node: nodes.len() as u32,
			c_source: text[start..start + length].trim().to_string(),
		});
		offset = start + length;
	}
	nodes
}

/// Returns the length of the text up to the `)` that closes an already
/// opened parenthesis, or `None` if the text ends first.
fn balanced_paren_span(text: &str) -> Option<usize> {
	let mut depth = 1usize;
	for (index, byte) in text.bytes().enumerate() {
		match byte {
			b'(' => depth += 1,
			b')' => {
				depth -= 1;
				if depth == 0 {
					return Some(index);
				}
			}
			_ => {}
		}
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_hash_is_stable_and_content_keyed() {
		let a = compute_hash(b"#include <stdio.h>");
		let b = compute_hash(b"#include <stdio.h>");
		let c = compute_hash(b"#include <stdlib.h>");
		assert_eq!(a, b);
		assert_ne!(a, c);
	}

	#[test]
	fn test_parse_mode_from_uri() {
		assert_eq!(ParseMode::from_uri("file:///a/b.zig"), ParseMode::Source);
		assert_eq!(ParseMode::from_uri("file:///a/build.zig.zon"), ParseMode::DataLiteral);
	}

	#[test]
	fn test_scan_imports_in_order() {
		let tree = ScanFrontend.parse(
			"const std = @import(\"std\");\nconst util = @import(\"util.zig\");\n",
			ParseMode::Source,
		);
		assert_eq!(tree.imports, vec!["std", "util.zig"]);
	}

	#[test]
	fn test_scan_cimports_balances_parens() {
		let tree = ScanFrontend.parse(
			"const c = @cImport({ @cInclude(\"stdio.h\"); });\n",
			ParseMode::Source,
		);
		assert_eq!(tree.cimports.len(), 1);
		assert_eq!(tree.cimports[0].node, 0);
		assert_eq!(tree.cimports[0].c_source, "{ @cInclude(\"stdio.h\"); }");
	}

	#[test]
	fn test_scan_unterminated_cimport_is_ignored() {
		let tree = ScanFrontend.parse("const c = @cImport({", ParseMode::Source);
		assert!(tree.cimports.is_empty());
	}

	#[test]
	fn test_scope_collects_declarations() {
		let scope = ScanFrontend.document_scope(
			&ParseTree::default(),
			"pub const Alpha = struct {};\nconst beta_2 = 1;\nvar skipped = 0;\n",
		);
		assert_eq!(scope.declarations, vec!["Alpha", "beta_2"]);
	}
}
