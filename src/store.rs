//! Top-level document store.
//!
//! The store owns every tracked document and build file and orchestrates
//! their lifecycle: open/refresh/close from the client, load-on-demand for
//! dependencies, build-file discovery and invalidation, import and C-import
//! resolution, and the reachability garbage collector that prunes state no
//! open document needs anymore.
//!
//! # Locking
//!
//! Three lock levels, acquired strictly in this order: the store map lock
//! (structure of the three maps), a handle's mutex, a build file's mutex.
//! Per-handle content, slot, and association state sit behind their own
//! short-lived leaf locks that are never held while acquiring anything
//! else. The association resolver is the one path that reaches back into
//! the map lock while holding a handle mutex; that is safe because
//! exclusive map holders (the garbage collector) only ever touch leaf
//! state, never a handle mutex.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::analysis::{CTranslator, Frontend, Hash, NullTranslator, ScanFrontend, ScopeIndex, SourceIr, DataIr, TranslateResult, compute_hash};
use crate::build_file::{BuildFile, execute_build_runner};
use crate::config::StoreConfig;
use crate::diagnostics::{DiagnosticsKind, DiagnosticsSink, ErrorBundle, NullDiagnostics};
use crate::handle::{CImport, Handle};
use crate::transport::{BuildOutcome, BuildProgress, ClientCapabilities, MessageTransport, NullTransport};
use crate::uri;

/// Largest document the store will load from disk.
pub const MAX_DOCUMENT_SIZE: u64 = u32::MAX as u64;

const BUILD_FILE_NAME: &str = "build.zig";
const BUILD_FILE_SUFFIX: &str = "/build.zig";
const STD_SEGMENT: &str = "/std/";
const BUILTIN_SUFFIX: &str = "/builtin.zig";
const SOURCE_EXTENSION: &str = ".zig";
const BUILD_DIAGNOSTIC_TAG_PREFIX: &str = "build_runner:";

/// Returns true when `uri` names a build description file.
pub fn is_build_file_uri(uri: &str) -> bool {
	uri.ends_with(BUILD_FILE_SUFFIX)
}

/// Returns true when `uri` points into the standard library.
pub fn is_in_std(uri: &str) -> bool {
	uri.contains(STD_SEGMENT)
}

/// Returns true when `uri` names a language-builtin module file.
pub fn is_builtin_uri(uri: &str) -> bool {
	uri.ends_with(BUILTIN_SUFFIX)
}

/// Cached outcome of translating one C source text.
#[derive(Debug, Clone)]
pub enum CImportResult {
	/// Translation produced a synthetic source file at this URI.
	Success(String),
	/// Translation failed; kept so the same source is not retried.
	Failure(ErrorBundle),
}

struct StoreMaps {
	handles: HashMap<String, Arc<Handle>>,
	build_files: HashMap<String, Arc<BuildFile>>,
	cimports: HashMap<Hash, CImportResult>,
}

/// Everything a [`Store`] needs from its surroundings.
pub struct StoreOptions {
	/// Immutable path configuration.
	pub config: StoreConfig,
	/// Capabilities the client advertised during initialization.
	pub capabilities: ClientCapabilities,
	/// The language frontend.
	pub frontend: Arc<dyn Frontend>,
	/// Translator for embedded C source.
	pub translator: Arc<dyn CTranslator>,
	/// Sink for build and translation diagnostics.
	pub diagnostics: Arc<dyn DiagnosticsSink>,
	/// Writer for progress and refresh messages to the client.
	pub transport: Arc<dyn MessageTransport>,
	/// Pool for external build runs; `None` runs them inline.
	pub thread_pool: Option<Arc<rayon::ThreadPool>>,
}

impl Default for StoreOptions {
	fn default() -> Self {
		Self {
			config: StoreConfig::default(),
			capabilities: ClientCapabilities::default(),
			frontend: Arc::new(ScanFrontend),
			translator: Arc::new(NullTranslator),
			diagnostics: Arc::new(NullDiagnostics),
			transport: Arc::new(NullTransport),
			thread_pool: None,
		}
	}
}

/// Concurrently shared container of documents, build files, and C-import
/// translation results.
pub struct Store {
	config: StoreConfig,
	maps: RwLock<StoreMaps>,
	progress: BuildProgress,
	frontend: Arc<dyn Frontend>,
	translator: Arc<dyn CTranslator>,
	diagnostics: Arc<dyn DiagnosticsSink>,
	thread_pool: Option<Arc<rayon::ThreadPool>>,
}

impl Store {
	/// Creates an empty store.
	pub fn new(options: StoreOptions) -> Self {
		Self {
			config: options.config,
			maps: RwLock::new(StoreMaps {
				handles: HashMap::new(),
				build_files: HashMap::new(),
				cimports: HashMap::new(),
			}),
			progress: BuildProgress::new(options.transport, options.capabilities),
			frontend: options.frontend,
			translator: options.translator,
			diagnostics: options.diagnostics,
			thread_pool: options.thread_pool,
		}
	}

	/// The store's immutable configuration.
	pub fn config(&self) -> &StoreConfig {
		&self.config
	}

	/// Opens a document with client-provided text.
	///
	/// Callers must not open the same URI concurrently; the surrounding
	/// server dispatches lifecycle messages for one URI in order. If the
	/// URI is already tracked, the previous handle is replaced.
	pub fn open_document(self: &Arc<Self>, uri: &str, text: String) -> Arc<Handle> {
		if self.get_handle(uri).is_some() {
			warn!(uri = %uri, "reopening document that is already tracked");
		}
		let handle = self.create_handle(uri, text, true);
		self.maps.write().handles.insert(uri.to_string(), handle.clone());

		if is_build_file_uri(uri) && !is_in_std(uri) {
			let build_file = self.get_or_create_build_file(uri);
			self.invalidate_build_file_entry(&build_file);
		}

		self.refresh_derived(&handle);
		info!(uri = %uri, "opened document");
		handle
	}

	/// Marks a document closed and opportunistically collects garbage.
	pub fn close_document(&self, uri: &str) {
		let Some(handle) = self.get_handle(uri) else {
			warn!(uri = %uri, "closing unknown document");
			return;
		};
		if !handle.set_open(false) {
			warn!(uri = %uri, "closing document that was not open");
			return;
		}
		debug!(uri = %uri, "closed document");
		self.garbage_collect();
	}

	/// Replaces a document's text with a client-provided edit.
	///
	/// Returns false when the URI is not tracked.
	pub fn refresh_document(self: &Arc<Self>, uri: &str, new_text: String) -> bool {
		let Some(handle) = self.get_handle(uri) else {
			warn!(uri = %uri, "refreshing unknown document");
			return false;
		};
		handle.set_source(self.frontend.as_ref(), new_text);
		self.refresh_derived(&handle);
		debug!(uri = %uri, version = handle.version(), "refreshed document");
		true
	}

	/// Drops a non-open document so the next access reloads it from disk.
	///
	/// Open documents are left alone: the client's text is authoritative.
	/// Returns whether a removal occurred.
	pub fn refresh_document_from_file_system(&self, uri: &str) -> bool {
		let Some(handle) = self.get_handle(uri) else { return false };
		if handle.is_open() {
			return false;
		}
		debug!(uri = %uri, "dropping document in favor of file system");
		self.maps.write().handles.remove(uri).is_some()
	}

	/// Looks up a tracked document.
	pub fn get_handle(&self, uri: &str) -> Option<Arc<Handle>> {
		self.maps.read().handles.get(uri).cloned()
	}

	/// Looks up a tracked document, loading it from disk when absent.
	///
	/// Load failures are logged and reported as absence.
	pub fn get_or_load_handle(self: &Arc<Self>, uri: &str) -> Option<Arc<Handle>> {
		if let Some(handle) = self.get_handle(uri) {
			return Some(handle);
		}
		let text = match load_document(uri) {
			Ok(text) => text,
			Err(load_error) => {
				error!(uri = %uri, error = %load_error, "failed to load document");
				return None;
			}
		};
		let created = self.create_handle(uri, text, false);
		let handle = self
			.maps
			.write()
			.handles
			.entry(uri.to_string())
			.or_insert_with(|| created.clone())
			.clone();
		if Arc::ptr_eq(&handle, &created) {
			self.refresh_derived(&handle);
			debug!(uri = %uri, "loaded document from disk");
		}
		Some(handle)
	}

	/// Looks up a tracked build file.
	pub fn get_build_file(&self, uri: &str) -> Option<Arc<BuildFile>> {
		self.maps.read().build_files.get(uri).cloned()
	}

	/// URIs of all tracked documents, in no particular order.
	pub fn document_uris(&self) -> Vec<String> {
		self.maps.read().handles.keys().cloned().collect()
	}

	/// Cached translation outcome for a C source hash.
	pub fn cimport_result(&self, hash: &Hash) -> Option<CImportResult> {
		self.maps.read().cimports.get(hash).cloned()
	}

	/// Requests a re-run of a tracked build description, coalescing with
	/// any run already in flight.
	pub fn invalidate_build_file(self: &Arc<Self>, uri: &str) {
		if let Some(build_file) = self.get_build_file(uri) {
			self.invalidate_build_file_entry(&build_file);
		}
	}

	/// Resolves and returns the build file a document belongs to.
	///
	/// May block on filesystem walks of candidate package graphs. Returns
	/// `None` both for documents without a build file and for documents
	/// whose candidates cannot be decided yet.
	pub fn associated_build_file(self: &Arc<Self>, handle: &Handle) -> Option<Arc<BuildFile>> {
		let document_uri = handle.uri().to_string();
		let resolved = handle.resolve_build_file(|candidate| {
			let build_file = self.get_or_create_build_file(candidate);
			self.is_dependency_of(&build_file, &document_uri)
		})?;
		// Recreate rather than look up: the candidate entry may have been
		// garbage collected between discovery and resolution.
		Some(self.get_or_create_build_file(&resolved))
	}

	/// Produces the scope index of a document.
	pub fn get_scope(&self, handle: &Handle) -> Arc<ScopeIndex> {
		handle.document_scope(self.frontend.as_ref())
	}

	/// Produces the source-dialect IR of a document.
	pub fn get_ir_source(&self, handle: &Handle) -> Arc<SourceIr> {
		handle.ir_source(self.frontend.as_ref())
	}

	/// Produces the data-literal IR of a document.
	pub fn get_ir_data(&self, handle: &Handle) -> Arc<DataIr> {
		handle.ir_data(self.frontend.as_ref())
	}

	/// Converts an import string appearing in `handle` into a document URI.
	///
	/// `"std"` and `"builtin"` resolve through the store configuration,
	/// names without a source extension resolve through the associated
	/// build file's packages, everything else resolves relative to the
	/// importing document.
	pub fn uri_from_import_str(self: &Arc<Self>, handle: &Handle, import: &str) -> Option<String> {
		if import == "std" {
			let lib_dir = self.config.zig_lib_dir.as_ref()?;
			return uri::from_path(&lib_dir.join("std").join("std.zig"));
		}
		if import == "builtin" {
			if let Some(build_file) = self.associated_build_file(handle)
				&& let Some(builtin) = build_file.builtin_uri()
			{
				return Some(builtin);
			}
			return uri::from_path(self.config.builtin_path.as_deref()?);
		}
		if !import.ends_with(SOURCE_EXTENSION) {
			// A package name. Build files resolve against their own
			// dependency roots, source files against their build file's
			// package table.
			if is_build_file_uri(handle.uri()) {
				let build_file = self.get_build_file(handle.uri())?;
				let config = build_file.config()?;
				let entry = config.deps_build_roots.iter().find(|entry| entry.name == import)?;
				return uri::from_path(&entry.path);
			}
			let build_file = self.associated_build_file(handle)?;
			let config = build_file.config()?;
			let entry = config.packages.iter().find(|entry| entry.name == import)?;
			return uri::from_path(&entry.path);
		}
		uri::resolve_relative(handle.uri(), import)
	}

	/// Resolves the `@cImport` at `node` to the URI of its translated
	/// source.
	///
	/// The first resolution of a given C source invokes the translator and
	/// may block on an external process; afterwards the result (success or
	/// failure) is served from the hash-keyed cache until the source
	/// changes.
	pub fn resolve_c_import(self: &Arc<Self>, handle: &Handle, node: u32) -> Option<String> {
		let cimports = handle.cimports();
		let cimport = cimports.iter().find(|c| c.node == node)?;

		if let Some(result) = self.maps.read().cimports.get(&cimport.hash) {
			return match result {
				CImportResult::Success(uri) => Some(uri.clone()),
				CImportResult::Failure(_) => None,
			};
		}

		// Translation proceeds with whatever configuration is available;
		// a pending build config only costs include paths.
		let mut include_dirs = Vec::new();
		let mut c_macros = Vec::new();
		self.collect_include_dirs(handle, &mut include_dirs);
		self.collect_c_macros(handle, &mut c_macros);

		let result = self
			.translator
			.translate(&self.config, &include_dirs, &c_macros, &cimport.source)?;
		let (stored, resolved) = match result {
			TranslateResult::Success(translated_uri) => {
				debug!(uri = %handle.uri(), node, "translated C import");
				(CImportResult::Success(translated_uri.clone()), Some(translated_uri))
			}
			TranslateResult::Failure(bundle) => {
				warn!(uri = %handle.uri(), node, "C import translation failed");
				self.diagnostics.push_single_document(DiagnosticsKind::CImport, handle.uri(), &bundle);
				self.diagnostics.publish();
				(CImportResult::Failure(bundle), None)
			}
		};
		self.maps.write().cimports.entry(cimport.hash).or_insert(stored);
		resolved
	}

	/// Appends every URI `handle` depends on: imports, translated C
	/// imports, and the packages of its build file.
	///
	/// Never triggers build-file resolution or disk loads, so it is safe
	/// under the exclusive map lock.
	pub fn collect_dependencies(&self, handle: &Handle, dependencies: &mut Vec<String>) {
		let maps = self.maps.read();
		collect_dependencies_locked(&maps, handle, dependencies);
	}

	/// Appends the include directories contributed by `handle`'s build
	/// file. Returns false when a build configuration is still pending and
	/// the data is therefore incomplete.
	pub fn collect_include_dirs(self: &Arc<Self>, handle: &Handle, include_dirs: &mut Vec<PathBuf>) -> bool {
		let Some(build_file) = self.associated_build_file(handle) else { return true };
		match build_file.config() {
			Some(config) => {
				include_dirs.extend(config.include_dirs.iter().map(PathBuf::from));
				true
			}
			None => {
				// Nudge the config into existence; in-flight runs coalesce.
				self.invalidate_build_file_entry(&build_file);
				false
			}
		}
	}

	/// Appends the C macro definitions contributed by `handle`'s build
	/// file. Returns false when a build configuration is still pending.
	pub fn collect_c_macros(self: &Arc<Self>, handle: &Handle, c_macros: &mut Vec<String>) -> bool {
		let Some(build_file) = self.associated_build_file(handle) else { return true };
		match build_file.config() {
			Some(config) => {
				c_macros.extend(config.c_macros.iter().cloned());
				true
			}
			None => {
				self.invalidate_build_file_entry(&build_file);
				false
			}
		}
	}

	fn create_handle(self: &Arc<Self>, uri: &str, text: String, open: bool) -> Arc<Handle> {
		let potential = if is_build_file_uri(uri) {
			Vec::new()
		} else {
			self.collect_potential_build_files(uri)
		};
		Arc::new(Handle::new(uri.to_string(), text, open, self.frontend.as_ref(), potential))
	}

	/// Walks ancestor directories and registers every readable `build.zig`
	/// as a candidate. Best-effort: unreadable directories simply
	/// contribute nothing.
	fn collect_potential_build_files(self: &Arc<Self>, uri: &str) -> Vec<String> {
		let Ok(path) = uri::to_path(uri) else { return Vec::new() };
		let mut candidates = Vec::new();
		let mut directory = path.parent();
		while let Some(current) = directory {
			let candidate = current.join(BUILD_FILE_NAME);
			if candidate.is_file()
				&& let Some(candidate_uri) = uri::from_path(&candidate)
			{
				self.get_or_create_build_file(&candidate_uri);
				candidates.push(candidate_uri);
			}
			directory = current.parent();
		}
		// The outermost build file is overwhelmingly the project root;
		// nearer ones are sub-packages, so they resolve last.
		candidates.reverse();
		candidates
	}

	fn get_or_create_build_file(self: &Arc<Self>, uri: &str) -> Arc<BuildFile> {
		if let Some(existing) = self.maps.read().build_files.get(uri).cloned() {
			return existing;
		}
		let created = Arc::new(BuildFile::new(uri.to_string()));
		let build_file = self
			.maps
			.write()
			.build_files
			.entry(uri.to_string())
			.or_insert_with(|| created.clone())
			.clone();
		if Arc::ptr_eq(&build_file, &created) {
			info!(uri = %uri, "tracking build file");
			self.invalidate_build_file_entry(&build_file);
		}
		build_file
	}

	fn invalidate_build_file_entry(self: &Arc<Self>, build_file: &Arc<BuildFile>) {
		if self.config.zig_exe_path.is_none() || self.config.build_runner_path.is_none() {
			debug!(uri = %build_file.uri(), "build runner not configured; skipping invalidation");
			return;
		}
		if !build_file.begin_invalidation() {
			return;
		}
		self.progress.begin();
		match &self.thread_pool {
			Some(pool) => {
				let store = self.clone();
				let build_file = build_file.clone();
				pool.spawn(move || store.run_invalidation_loop(&build_file));
			}
			None => self.run_invalidation_loop(build_file),
		}
	}

	/// Runs the build description until no invalidation arrived mid-run.
	fn run_invalidation_loop(&self, build_file: &Arc<BuildFile>) {
		let mut outcome = BuildOutcome::Failed;
		loop {
			let version = build_file.version();
			let options = build_file.build_options();
			let produced = match execute_build_runner(&self.config, build_file.uri(), &options) {
				Ok(config) => {
					outcome = BuildOutcome::Success;
					info!(uri = %build_file.uri(), packages = config.packages.len(), "build file ran");
					Some(config)
				}
				Err(failure) => {
					outcome = BuildOutcome::Failed;
					warn!(uri = %build_file.uri(), error = %failure.error, "build file run failed");
					if let Some(bundle) = failure.stderr {
						let tag = format!("{BUILD_DIAGNOSTIC_TAG_PREFIX}{}", build_file.uri());
						let cwd = uri::to_path(build_file.uri())
							.ok()
							.and_then(|path| path.parent().map(PathBuf::from));
						self.diagnostics.push_error_bundle(&tag, version, cwd.as_deref(), &bundle);
						self.diagnostics.publish();
					}
					None
				}
			};
			if !build_file.finish_run(produced) {
				break;
			}
			debug!(uri = %build_file.uri(), "build file invalidated mid-run; running again");
		}
		if outcome == BuildOutcome::Success {
			self.progress.config_refreshed();
		}
		self.progress.end(outcome);
	}

	/// Decides whether `document_uri` is a dependency of `build_file`.
	///
	/// Returns `None` while the build file has no configuration yet.
	fn is_dependency_of(self: &Arc<Self>, build_file: &BuildFile, document_uri: &str) -> Option<bool> {
		let config = build_file.config()?;
		let mut checked = HashSet::new();
		for package in &config.packages {
			let Some(root_uri) = uri::from_path(&package.path) else { continue };
			if self.uri_in_imports(&mut checked, build_file.uri(), &root_uri, document_uri) {
				return Some(true);
			}
		}
		Some(false)
	}

	/// Depth-first search through import edges starting at `source_uri`.
	///
	/// Standard-library files are leaves, and a handle already resolved to
	/// the queried build file counts as a match without further descent.
	fn uri_in_imports(
		self: &Arc<Self>,
		checked: &mut HashSet<String>,
		build_file_uri: &str,
		source_uri: &str,
		document_uri: &str,
	) -> bool {
		if source_uri == document_uri {
			return true;
		}
		if is_in_std(source_uri) || !checked.insert(source_uri.to_string()) {
			return false;
		}
		let Some(handle) = self.get_or_load_handle(source_uri) else { return false };
		if let Some(resolved) = handle.resolved_build_file()
			&& resolved == build_file_uri
		{
			return true;
		}
		let import_uris = handle.import_uris();
		import_uris
			.iter()
			.any(|import| self.uri_in_imports(checked, build_file_uri, import, document_uri))
	}

	/// Recomputes a handle's resolved import URIs and C imports from its
	/// current tree.
	fn refresh_derived(self: &Arc<Self>, handle: &Arc<Handle>) {
		let tree = handle.tree();
		let import_strings = self.frontend.import_strings(&tree);
		let mut import_uris = Vec::with_capacity(import_strings.len());
		for import in &import_strings {
			if let Some(resolved) = self.uri_from_import_str(handle, import) {
				import_uris.push(resolved);
			}
		}
		let cimports: Vec<CImport> = self
			.frontend
			.cimport_nodes(&tree)
			.into_iter()
			.map(|node| CImport {
				node: node.node,
				hash: compute_hash(node.c_source.as_bytes()),
				source: node.c_source.into(),
			})
			.collect();
		handle.replace_derived_inputs(import_uris, cimports);
	}

	/// Prunes state unreachable from any open document.
	///
	/// Non-blocking: when the exclusive map lock is contended the sweep is
	/// skipped and deferred to the next close.
	fn garbage_collect(&self) {
		let Some(mut maps) = self.maps.try_write() else {
			debug!("garbage collection skipped; store is busy");
			return;
		};
		garbage_collect_maps(&mut maps);
	}
}

/// Three sweeps under the exclusive lock: documents, then C-import results,
/// then build files, so each later sweep sees only surviving upstream
/// references.
fn garbage_collect_maps(maps: &mut StoreMaps) {
	// Documents reachable from open handles.
	let mut reachable: HashSet<String> = HashSet::new();
	let mut queue: VecDeque<String> = maps
		.handles
		.values()
		.filter(|handle| handle.is_open())
		.map(|handle| handle.uri().to_string())
		.collect();
	while let Some(current) = queue.pop_front() {
		if !reachable.insert(current.clone()) {
			continue;
		}
		let Some(handle) = maps.handles.get(&current) else { continue };
		let mut dependencies = Vec::new();
		collect_dependencies_locked(maps, handle, &mut dependencies);
		queue.extend(dependencies);
	}
	let documents_before = maps.handles.len();
	maps.handles.retain(|handle_uri, _| reachable.contains(handle_uri));
	if maps.handles.len() != documents_before {
		debug!(removed = documents_before - maps.handles.len(), "garbage collected documents");
	}

	// C-import results referenced by a surviving handle.
	let mut live_hashes: HashSet<Hash> = HashSet::new();
	for handle in maps.handles.values() {
		live_hashes.extend(handle.cimports().iter().map(|cimport| cimport.hash));
	}
	maps.cimports.retain(|hash, _| live_hashes.contains(hash));

	// Build files referenced by surviving handles, plus their transitive
	// dependency build roots.
	let mut live_builds: HashSet<String> = HashSet::new();
	let mut queue: VecDeque<String> = VecDeque::new();
	for handle in maps.handles.values() {
		if let Some(build_uri) = handle.resolved_build_file() {
			queue.push_back(build_uri);
		}
		if maps.build_files.contains_key(handle.uri()) {
			queue.push_back(handle.uri().to_string());
		}
	}
	while let Some(current) = queue.pop_front() {
		if !live_builds.insert(current.clone()) {
			continue;
		}
		let Some(build_file) = maps.build_files.get(&current) else { continue };
		if let Some(config) = build_file.config() {
			for root in &config.deps_build_roots {
				if let Some(root_uri) = uri::from_path(&root.path) {
					queue.push_back(root_uri);
				}
			}
		}
	}
	let builds_before = maps.build_files.len();
	maps.build_files.retain(|build_uri, _| live_builds.contains(build_uri));
	if maps.build_files.len() != builds_before {
		debug!(removed = builds_before - maps.build_files.len(), "garbage collected build files");
	}
}

fn collect_dependencies_locked(maps: &StoreMaps, handle: &Handle, dependencies: &mut Vec<String>) {
	let import_uris = handle.import_uris();
	dependencies.extend(import_uris.iter().cloned());

	for cimport in handle.cimports().iter() {
		if let Some(CImportResult::Success(translated)) = maps.cimports.get(&cimport.hash) {
			dependencies.push(translated.clone());
		}
	}

	if let Some(build_uri) = handle.resolved_build_file()
		&& let Some(build_file) = maps.build_files.get(&build_uri)
		&& let Some(config) = build_file.config()
	{
		for package in &config.packages {
			if let Some(package_uri) = uri::from_path(&package.path) {
				dependencies.push(package_uri);
			}
		}
	}

	// A build file additionally depends on the build roots of its declared
	// dependencies.
	if let Some(build_file) = maps.build_files.get(handle.uri())
		&& let Some(config) = build_file.config()
	{
		for root in &config.deps_build_roots {
			if let Some(root_uri) = uri::from_path(&root.path) {
				dependencies.push(root_uri);
			}
		}
	}
}

#[derive(Debug, Error)]
enum LoadError {
	#[error(transparent)]
	Uri(#[from] uri::UriError),
	#[error("document is {size} bytes, limit is {MAX_DOCUMENT_SIZE}")]
	TooLarge { size: u64 },
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

fn load_document(document_uri: &str) -> Result<String, LoadError> {
	let path = resolve_load_path(uri::to_path(document_uri)?);
	let size = std::fs::metadata(&path)?.len();
	if size > MAX_DOCUMENT_SIZE {
		return Err(LoadError::TooLarge { size });
	}
	Ok(std::fs::read_to_string(&path)?)
}

/// Without libc there is no host path resolution; the `/lib` and `/cache`
/// preopens are checked before the working directory.
#[cfg(target_os = "wasi")]
fn resolve_load_path(path: PathBuf) -> PathBuf {
	use std::path::Path;
	for preopen in ["/lib", "/cache"] {
		let candidate = Path::new(preopen).join(path.strip_prefix("/").unwrap_or(&path));
		if candidate.exists() {
			return candidate;
		}
	}
	path
}

#[cfg(not(target_os = "wasi"))]
fn resolve_load_path(path: PathBuf) -> PathBuf {
	path
}
