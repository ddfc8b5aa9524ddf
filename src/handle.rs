//! Per-document state.
//!
//! A [`Handle`] owns one document's source text and parse tree and caches
//! the artifacts derived from them. Derivatives are produced lazily and at
//! most once per text revision: the first requester computes, concurrent
//! requesters sleep on the handle's condition variable, and everyone after
//! publication reads the cached value straight off an atomic fast path.
//!
//! # Status word
//!
//! A single `AtomicU32` encodes the open flag plus, for each derivative, a
//! producer-claim bit and a published bit; the IRs additionally carry an
//! outdated bit. Publication stores with release ordering and the fast path
//! loads with acquire, so any reader that observes a published bit sees a
//! fully initialized slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::analysis::{DataIr, Frontend, Hash, ParseMode, ParseTree, ScopeIndex, SourceIr};

const OPEN: u32 = 1 << 0;
const SCOPE_LOCK: u32 = 1 << 1;
const HAS_SCOPE: u32 = 1 << 2;
const IR_SOURCE_LOCK: u32 = 1 << 3;
const HAS_IR_SOURCE: u32 = 1 << 4;
const IR_SOURCE_OUTDATED: u32 = 1 << 5;
const IR_DATA_LOCK: u32 = 1 << 6;
const HAS_IR_DATA: u32 = 1 << 7;
const IR_DATA_OUTDATED: u32 = 1 << 8;

/// Lifecycle of a cached derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeStatus {
	/// Never produced for the current text.
	None,
	/// Produced for an earlier revision and not yet refreshed.
	Outdated,
	/// Produced for the current text.
	Done,
}

/// A `@cImport` occurrence extracted from the parse tree.
#[derive(Debug, Clone)]
pub struct CImport {
	/// Index of the `@cImport` node in the parse tree.
	pub node: u32,
	/// Keyed hash of `source`, identifying the translation result.
	pub hash: Hash,
	/// The C source text synthesized from the node body.
	pub source: Arc<str>,
}

/// Association between a document and the build file that configures it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociatedBuildFile {
	/// The document has no build file (terminal).
	None,
	/// Candidates discovered by the ancestor walk, not yet decided.
	Unresolved {
		/// Candidate build-file URIs, outermost ancestor first.
		potential: Vec<String>,
		/// Parallel to `potential`; `true` once a candidate is ruled out.
		rejected: Vec<bool>,
	},
	/// The document belongs to this build file (terminal).
	Resolved(String),
}

/// Text-derived state that swaps as one unit on every edit, so readers
/// observe all-old or all-new.
struct Content {
	text: Arc<str>,
	tree: Arc<ParseTree>,
	import_uris: Arc<[String]>,
	cimports: Arc<[CImport]>,
}

#[derive(Default)]
struct Slots {
	scope: Option<Arc<ScopeIndex>>,
	ir_source: Option<Arc<SourceIr>>,
	ir_data: Option<Arc<DataIr>>,
}

/// In-memory state of one source document.
pub struct Handle {
	uri: String,
	version: AtomicU32,
	status: AtomicU32,
	content: RwLock<Content>,
	slots: RwLock<Slots>,
	assoc: RwLock<AssociatedBuildFile>,
	/// Serializes derivative production and build-file resolution.
	sync: Mutex<()>,
	produced: Condvar,
}

impl std::fmt::Debug for Handle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Handle")
			.field("uri", &self.uri)
			.field("version", &self.version)
			.field("status", &format_args!("{:#b}", self.status.load(Ordering::Relaxed)))
			.finish()
	}
}

impl Handle {
	pub(crate) fn new(
		uri: String,
		text: String,
		open: bool,
		frontend: &dyn Frontend,
		potential_build_files: Vec<String>,
	) -> Self {
		let mode = ParseMode::from_uri(&uri);
		let text: Arc<str> = text.into();
		let tree = Arc::new(frontend.parse(&text, mode));
		let assoc = if potential_build_files.is_empty() {
			AssociatedBuildFile::None
		} else {
			let rejected = vec![false; potential_build_files.len()];
			AssociatedBuildFile::Unresolved {
				potential: potential_build_files,
				rejected,
			}
		};
		Self {
			uri,
			version: AtomicU32::new(1),
			status: AtomicU32::new(if open { OPEN } else { 0 }),
			content: RwLock::new(Content {
				text,
				tree,
				import_uris: Arc::from(Vec::new()),
				cimports: Arc::from(Vec::new()),
			}),
			slots: RwLock::new(Slots::default()),
			assoc: RwLock::new(assoc),
			sync: Mutex::new(()),
			produced: Condvar::new(),
		}
	}

	/// Canonical document URI.
	pub fn uri(&self) -> &str {
		&self.uri
	}

	/// Edit counter; starts at 1 and increments on every text replacement.
	pub fn version(&self) -> u32 {
		self.version.load(Ordering::Relaxed)
	}

	/// Whether a client currently has the document open.
	pub fn is_open(&self) -> bool {
		self.status.load(Ordering::Relaxed) & OPEN != 0
	}

	/// Sets the open flag and returns its previous value.
	pub(crate) fn set_open(&self, open: bool) -> bool {
		let previous = if open {
			self.status.fetch_or(OPEN, Ordering::Relaxed)
		} else {
			self.status.fetch_and(!OPEN, Ordering::Relaxed)
		};
		previous & OPEN != 0
	}

	/// Current source text.
	pub fn text(&self) -> Arc<str> {
		self.content.read().text.clone()
	}

	/// Current parse tree.
	pub fn tree(&self) -> Arc<ParseTree> {
		self.content.read().tree.clone()
	}

	/// Resolved dependency URIs, in import order.
	pub fn import_uris(&self) -> Arc<[String]> {
		self.content.read().import_uris.clone()
	}

	/// `@cImport` occurrences of the current tree.
	pub fn cimports(&self) -> Arc<[CImport]> {
		self.content.read().cimports.clone()
	}

	/// Snapshot of the build-file association without triggering resolution.
	pub fn build_file_association(&self) -> AssociatedBuildFile {
		self.assoc.read().clone()
	}

	/// URI of the resolved build file, if resolution already concluded.
	pub(crate) fn resolved_build_file(&self) -> Option<String> {
		match &*self.assoc.read() {
			AssociatedBuildFile::Resolved(uri) => Some(uri.clone()),
			_ => None,
		}
	}

	/// Returns the scope index, producing it on first request.
	pub fn document_scope(&self, frontend: &dyn Frontend) -> Arc<ScopeIndex> {
		self.get_or_produce(
			HAS_SCOPE,
			SCOPE_LOCK,
			0,
			|slots| slots.scope.clone(),
			|slots, value| slots.scope = Some(value),
			|tree, text| frontend.document_scope(tree, text),
		)
	}

	/// Returns the source-dialect IR, producing it on first request.
	pub fn ir_source(&self, frontend: &dyn Frontend) -> Arc<SourceIr> {
		self.get_or_produce(
			HAS_IR_SOURCE,
			IR_SOURCE_LOCK,
			IR_SOURCE_OUTDATED,
			|slots| slots.ir_source.clone(),
			|slots, value| slots.ir_source = Some(value),
			|tree, text| frontend.ir_source(tree, text),
		)
	}

	/// Returns the data-literal IR, producing it on first request.
	pub fn ir_data(&self, frontend: &dyn Frontend) -> Arc<DataIr> {
		self.get_or_produce(
			HAS_IR_DATA,
			IR_DATA_LOCK,
			IR_DATA_OUTDATED,
			|slots| slots.ir_data.clone(),
			|slots, value| slots.ir_data = Some(value),
			|tree, text| frontend.ir_data(tree, text),
		)
	}

	/// Scope status without triggering production.
	pub fn scope_status(&self) -> DerivativeStatus {
		self.derivative_status(HAS_SCOPE, 0)
	}

	/// Source-IR status without triggering production.
	pub fn ir_source_status(&self) -> DerivativeStatus {
		self.derivative_status(HAS_IR_SOURCE, IR_SOURCE_OUTDATED)
	}

	/// Data-IR status without triggering production.
	pub fn ir_data_status(&self) -> DerivativeStatus {
		self.derivative_status(HAS_IR_DATA, IR_DATA_OUTDATED)
	}

	fn derivative_status(&self, has: u32, outdated: u32) -> DerivativeStatus {
		let status = self.status.load(Ordering::Acquire);
		if status & has == 0 {
			DerivativeStatus::None
		} else if status & outdated != 0 {
			DerivativeStatus::Outdated
		} else {
			DerivativeStatus::Done
		}
	}

	fn get_or_produce<T>(
		&self,
		has: u32,
		lock: u32,
		outdated: u32,
		read: fn(&Slots) -> Option<Arc<T>>,
		write: fn(&mut Slots, Arc<T>),
		produce: impl FnOnce(&ParseTree, &str) -> T,
	) -> Arc<T> {
		// Fast path: the published bit gates the slot, no locking needed.
		if self.status.load(Ordering::Acquire) & has != 0
			&& let Some(value) = read(&self.slots.read())
		{
			return value;
		}

		let mut sync = self.sync.lock();
		loop {
			if self.status.load(Ordering::Acquire) & has != 0
				&& let Some(value) = read(&self.slots.read())
			{
				return value;
			}
			if self.status.fetch_or(lock, Ordering::Acquire) & lock != 0 {
				// Another producer holds the claim; sleep until it publishes.
				self.produced.wait(&mut sync);
				continue;
			}

			let (tree, text) = {
				let content = self.content.read();
				(content.tree.clone(), content.text.clone())
			};
			let value = Arc::new(produce(&tree, &text));
			write(&mut self.slots.write(), value.clone());
			self.status.fetch_or(has, Ordering::Release);
			self.status.fetch_and(!(lock | outdated), Ordering::Release);
			self.produced.notify_all();
			return value;
		}
	}

	/// Replaces the document text, invalidating every cached derivative.
	///
	/// The new tree is parsed before the handle mutex is taken; under the
	/// mutex the status word collapses to just the open flag, then text and
	/// tree swap in. Old artifacts are dropped only after the mutex is
	/// released.
	pub(crate) fn set_source(&self, frontend: &dyn Frontend, new_text: String) {
		let mode = ParseMode::from_uri(&self.uri);
		let text: Arc<str> = new_text.into();
		let tree = Arc::new(frontend.parse(&text, mode));

		let old_content;
		let old_slots;
		{
			let _sync = self.sync.lock();
			let mut status = self.status.load(Ordering::Relaxed);
			while let Err(current) = self.status.compare_exchange_weak(
				status,
				status & OPEN,
				Ordering::AcqRel,
				Ordering::Relaxed,
			) {
				status = current;
			}

			old_content = std::mem::replace(&mut *self.content.write(), Content {
				text,
				tree,
				import_uris: Arc::from(Vec::new()),
				cimports: Arc::from(Vec::new()),
			});
			old_slots = std::mem::take(&mut *self.slots.write());
			self.version.fetch_add(1, Ordering::Relaxed);
		}
		drop(old_content);
		drop(old_slots);
	}

	/// Installs the resolved import URIs and C imports for the current tree.
	pub(crate) fn replace_derived_inputs(&self, import_uris: Vec<String>, cimports: Vec<CImport>) {
		let mut content = self.content.write();
		content.import_uris = import_uris.into();
		content.cimports = cimports.into();
	}

	/// Resolves the associated build file, querying candidate membership
	/// through `is_dependency` (`None` means the candidate's configuration
	/// is not available yet).
	///
	/// Serialized on the handle mutex; inconclusive candidates keep the
	/// association unresolved so a later call can retry.
	pub(crate) fn resolve_build_file(
		&self,
		mut is_dependency: impl FnMut(&str) -> Option<bool>,
	) -> Option<String> {
		match &*self.assoc.read() {
			AssociatedBuildFile::Resolved(uri) => return Some(uri.clone()),
			AssociatedBuildFile::None => return None,
			AssociatedBuildFile::Unresolved { .. } => {}
		}

		let _sync = self.sync.lock();
		let (potential, mut rejected) = match &*self.assoc.read() {
			AssociatedBuildFile::Resolved(uri) => return Some(uri.clone()),
			AssociatedBuildFile::None => return None,
			AssociatedBuildFile::Unresolved { potential, rejected } => {
				(potential.clone(), rejected.clone())
			}
		};
		debug_assert_eq!(potential.len(), rejected.len());

		let candidates: Vec<usize> = (0..potential.len()).filter(|&i| !rejected[i]).collect();
		if let [only] = candidates[..] {
			let uri = potential[only].clone();
			*self.assoc.write() = AssociatedBuildFile::Resolved(uri.clone());
			return Some(uri);
		}

		let mut inconclusive = false;
		for index in candidates {
			match is_dependency(&potential[index]) {
				Some(true) => {
					let uri = potential[index].clone();
					*self.assoc.write() = AssociatedBuildFile::Resolved(uri.clone());
					return Some(uri);
				}
				Some(false) => rejected[index] = true,
				None => inconclusive = true,
			}
		}

		*self.assoc.write() = if inconclusive {
			AssociatedBuildFile::Unresolved { potential, rejected }
		} else {
			AssociatedBuildFile::None
		};
		None
	}
}
