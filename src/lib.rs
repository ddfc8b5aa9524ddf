//! Concurrent document store for a Zig language server.
//!
//! The store tracks every source document the server knows about together
//! with the artifacts derived from it (parse tree, scope index, two IR
//! forms, translated C imports) and the build-description files whose
//! execution yields package and include-path metadata.
//!
//! The building blocks:
//!
//! * [`Handle`] — one document: source text, parse tree, and lazily
//!   produced derivatives with an at-most-once production protocol.
//! * [`BuildFile`] — one build description: its executed configuration and
//!   a state machine that coalesces concurrent re-runs.
//! * [`Store`] — the shared container: URI-keyed maps of handles and build
//!   files, a hash-keyed cache of C-import translations, lifecycle
//!   orchestration, and a reachability garbage collector that prunes
//!   whatever no open document needs anymore.
//!
//! Parsing, scope building, IR generation, C translation, diagnostics, and
//! the client transport are owned by the surrounding server and injected
//! through the seams in [`analysis`], [`diagnostics`], and [`transport`].

#![warn(missing_docs)]

pub mod analysis;
pub mod build_file;
pub mod config;
pub mod diagnostics;
pub mod handle;
pub mod store;
pub mod transport;
pub mod uri;
pub mod worker;

pub use analysis::{
	CImportNode, CTranslator, Frontend, Hash, NullTranslator, ParseMode, ParseTree, ScanFrontend,
	TranslateResult, compute_hash,
};
pub use build_file::{BuildAssociatedConfig, BuildConfig, BuildFile, BuildRunError, NamePath};
pub use config::StoreConfig;
pub use diagnostics::{DiagnosticsKind, DiagnosticsSink, ErrorBundle, ErrorMessage, NullDiagnostics};
pub use handle::{AssociatedBuildFile, CImport, DerivativeStatus, Handle};
pub use store::{CImportResult, MAX_DOCUMENT_SIZE, Store, StoreOptions, is_build_file_uri, is_builtin_uri, is_in_std};
pub use transport::{ClientCapabilities, MessageTransport, NullTransport};
