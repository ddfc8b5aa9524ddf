//! End-to-end tests driving the store through its public surface, with the
//! external build runner replaced by a shell script and the collaborator
//! seams replaced by instrumented doubles.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use ziggurat::{
	ClientCapabilities, CTranslator, DiagnosticsKind, DiagnosticsSink, ErrorBundle, MessageTransport,
	Store, StoreConfig, StoreOptions, TranslateResult, uri,
};

#[derive(Default)]
struct RecordingDiagnostics {
	bundles: Mutex<Vec<(String, u32, ErrorBundle)>>,
	documents: Mutex<Vec<(DiagnosticsKind, String, ErrorBundle)>>,
	publishes: AtomicUsize,
}

impl DiagnosticsSink for RecordingDiagnostics {
	fn push_error_bundle(&self, tag: &str, version: u32, _cwd: Option<&Path>, bundle: &ErrorBundle) {
		self.bundles.lock().push((tag.to_string(), version, bundle.clone()));
	}

	fn push_single_document(&self, kind: DiagnosticsKind, uri: &str, bundle: &ErrorBundle) {
		self.documents.lock().push((kind, uri.to_string(), bundle.clone()));
	}

	fn publish(&self) {
		self.publishes.fetch_add(1, Ordering::SeqCst);
	}
}

#[derive(Default)]
struct RecordingTransport {
	messages: Mutex<Vec<Value>>,
}

impl MessageTransport for RecordingTransport {
	fn write_json_message(&self, message: Value) {
		self.messages.lock().push(message);
	}
}

/// Translator that fails every request and counts invocations.
#[derive(Default)]
struct FailingTranslator {
	calls: AtomicUsize,
}

impl CTranslator for FailingTranslator {
	fn translate(
		&self,
		_config: &StoreConfig,
		_include_dirs: &[PathBuf],
		_c_macros: &[String],
		c_source: &str,
	) -> Option<TranslateResult> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		Some(TranslateResult::Failure(ErrorBundle::from_compiler_output(&format!(
			"translate.c:1:1: error: cannot translate: {c_source}"
		))))
	}
}

/// Translator that succeeds with a fixed URI and counts invocations.
struct FixedTranslator {
	calls: AtomicUsize,
	translated_uri: String,
}

impl CTranslator for FixedTranslator {
	fn translate(
		&self,
		_config: &StoreConfig,
		_include_dirs: &[PathBuf],
		_c_macros: &[String],
		_c_source: &str,
	) -> Option<TranslateResult> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		Some(TranslateResult::Success(self.translated_uri.clone()))
	}
}

fn file_uri(path: &Path) -> String {
	uri::from_path(path).unwrap()
}

fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) {
	let start = Instant::now();
	while !condition() {
		assert!(start.elapsed() < deadline, "condition not reached in {deadline:?}");
		std::thread::sleep(Duration::from_millis(10));
	}
}

#[test]
fn open_close_leaves_store_empty() {
	let store = Arc::new(Store::new(StoreOptions::default()));

	store.open_document("file:///p/a.zig", "const a = 1;".to_string());
	assert_eq!(store.document_uris(), vec!["file:///p/a.zig".to_string()]);

	store.close_document("file:///p/a.zig");
	assert!(store.document_uris().is_empty());
}

#[test]
fn repeated_refresh_only_moves_the_version() {
	let store = Arc::new(Store::new(StoreOptions {
		config: StoreConfig { zig_lib_dir: Some("/z/lib".into()), ..StoreConfig::default() },
		..StoreOptions::default()
	}));

	let handle = store.open_document("file:///p/a.zig", String::new());
	let text = "const std = @import(\"std\");".to_string();

	assert!(store.refresh_document("file:///p/a.zig", text.clone()));
	let first_imports = handle.import_uris();
	assert!(store.refresh_document("file:///p/a.zig", text));

	assert_eq!(handle.version(), 3);
	assert!(handle.is_open());
	assert_eq!(handle.import_uris(), first_imports);
}

#[test]
fn cimport_failure_is_sticky_per_hash() {
	let translator = Arc::new(FailingTranslator::default());
	let diagnostics = Arc::new(RecordingDiagnostics::default());
	let store = Arc::new(Store::new(StoreOptions {
		translator: translator.clone(),
		diagnostics: diagnostics.clone(),
		..StoreOptions::default()
	}));

	let handle = store.open_document(
		"file:///p/a.zig",
		"const c = @cImport(@cInclude(\"x.h\"));".to_string(),
	);
	assert_eq!(handle.cimports().len(), 1);

	assert_eq!(store.resolve_c_import(&handle, 0), None);
	assert_eq!(translator.calls.load(Ordering::SeqCst), 1);

	// Same hash: the cached failure answers without a second invocation.
	assert_eq!(store.resolve_c_import(&handle, 0), None);
	assert_eq!(translator.calls.load(Ordering::SeqCst), 1);

	{
		let documents = diagnostics.documents.lock();
		assert_eq!(documents.len(), 1);
		assert_eq!(documents[0].0, DiagnosticsKind::CImport);
		assert_eq!(documents[0].1, "file:///p/a.zig");
	}

	// A different C source hashes differently and is translated again.
	store.refresh_document(
		"file:///p/a.zig",
		"const c = @cImport(@cInclude(\"y.h\"));".to_string(),
	);
	assert_eq!(store.resolve_c_import(&handle, 0), None);
	assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn gc_drops_cimport_results_with_their_document() {
	let translator = Arc::new(FixedTranslator {
		calls: AtomicUsize::new(0),
		translated_uri: "file:///cache/translated/x.zig".to_string(),
	});
	let store = Arc::new(Store::new(StoreOptions {
		translator: translator.clone(),
		..StoreOptions::default()
	}));

	let handle = store.open_document(
		"file:///p/a.zig",
		"const c = @cImport(@cInclude(\"x.h\"));".to_string(),
	);
	let hash = handle.cimports()[0].hash;

	assert_eq!(
		store.resolve_c_import(&handle, 0).as_deref(),
		Some("file:///cache/translated/x.zig"),
	);
	assert!(store.cimport_result(&hash).is_some());

	store.close_document("file:///p/a.zig");

	assert!(store.cimport_result(&hash).is_none());
	assert!(store.document_uris().is_empty());
}

#[cfg(unix)]
mod runner {
	use super::*;

	/// Writes a fake compiler that logs each run, then prints the given
	/// streams after `sleep_secs`.
	fn fake_compiler(dir: &Path, log: &Path, sleep_secs: f32, stdout: &str, stderr: &str, exit: i32) -> PathBuf {
		use std::os::unix::fs::PermissionsExt;

		let path = dir.join("fake-zig");
		std::fs::write(
			&path,
			format!(
				"#!/bin/sh\necho run >> '{}'\nsleep {sleep_secs}\nprintf '%s' '{stdout}'\nprintf '%s\\n' '{stderr}' >&2\nexit {exit}\n",
				log.display(),
			),
		)
		.unwrap();
		std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
		path
	}

	fn run_count(log: &Path) -> usize {
		std::fs::read_to_string(log).map(|text| text.lines().count()).unwrap_or(0)
	}

	#[test]
	fn rapid_invalidations_coalesce_into_one_follow_up_run() {
		let dir = tempfile::tempdir().unwrap();
		let project = dir.path().join("project");
		std::fs::create_dir_all(&project).unwrap();
		std::fs::write(project.join("build.zig"), "").unwrap();
		let log = dir.path().join("runs.log");
		let compiler = fake_compiler(dir.path(), &log, 0.3, r#"{"packages":[]}"#, "", 0);

		let store = Arc::new(Store::new(StoreOptions {
			config: StoreConfig {
				zig_exe_path: Some(compiler),
				build_runner_path: Some(dir.path().join("runner.zig")),
				..StoreConfig::default()
			},
			thread_pool: Some(ziggurat::worker::build_pool(2).unwrap()),
			..StoreOptions::default()
		}));

		// Opening a document discovers the build file and runs it once.
		store.open_document(&file_uri(&project.join("main.zig")), String::new());
		let build_uri = file_uri(&project.join("build.zig"));
		let build_file = store.get_build_file(&build_uri).unwrap();
		wait_until(Duration::from_secs(10), || !build_file.busy() && build_file.version() == 1);
		assert_eq!(run_count(&log), 1);

		// Three rapid invalidations: one run starts, the other two fold
		// into a single follow-up.
		store.invalidate_build_file(&build_uri);
		store.invalidate_build_file(&build_uri);
		store.invalidate_build_file(&build_uri);
		wait_until(Duration::from_secs(10), || !build_file.busy() && build_file.version() == 2);

		assert_eq!(run_count(&log), 3);
		assert!(build_file.config().is_some());
	}

	#[test]
	fn failed_run_publishes_tagged_diagnostics_and_progress() {
		let dir = tempfile::tempdir().unwrap();
		let project = dir.path().join("project");
		std::fs::create_dir_all(&project).unwrap();
		std::fs::write(project.join("build.zig"), "").unwrap();
		let log = dir.path().join("runs.log");
		let compiler = fake_compiler(dir.path(), &log, 0.0, "", "build.zig:3:5: error: no build manifest", 1);

		let diagnostics = Arc::new(RecordingDiagnostics::default());
		let transport = Arc::new(RecordingTransport::default());
		let store = Arc::new(Store::new(StoreOptions {
			config: StoreConfig {
				zig_exe_path: Some(compiler),
				build_runner_path: Some(dir.path().join("runner.zig")),
				..StoreConfig::default()
			},
			capabilities: ClientCapabilities { work_done_progress: true, ..ClientCapabilities::default() },
			diagnostics: diagnostics.clone(),
			transport: transport.clone(),
			thread_pool: Some(ziggurat::worker::build_pool(1).unwrap()),
			..StoreOptions::default()
		}));

		store.open_document(&file_uri(&project.join("main.zig")), String::new());
		let build_uri = file_uri(&project.join("build.zig"));
		let build_file = store.get_build_file(&build_uri).unwrap();
		wait_until(Duration::from_secs(10), || !build_file.busy());
		wait_until(Duration::from_secs(10), || diagnostics.publishes.load(Ordering::SeqCst) >= 1);

		// The failure keeps no config and is published under the build tag.
		assert!(build_file.config().is_none());
		assert_eq!(build_file.version(), 0);
		let bundles = diagnostics.bundles.lock();
		assert_eq!(bundles.len(), 1);
		assert_eq!(bundles[0].0, format!("build_runner:{build_uri}"));
		assert_eq!(bundles[0].2.messages[0].message, "no build manifest");
		assert_eq!(bundles[0].2.messages[0].line, 3);

		// Exactly one begin/end progress pair, ending in failure.
		wait_until(Duration::from_secs(10), || {
			transport
				.messages
				.lock()
				.iter()
				.any(|m| m["params"]["value"]["kind"] == "end")
		});
		let messages = transport.messages.lock();
		let kinds: Vec<&Value> = messages.iter().map(|m| &m["params"]["value"]["kind"]).collect();
		assert_eq!(kinds.iter().filter(|k| **k == "begin").count(), 1);
		assert_eq!(kinds.iter().filter(|k| **k == "end").count(), 1);
		let end = messages.iter().find(|m| m["params"]["value"]["kind"] == "end").unwrap();
		assert_eq!(end["params"]["value"]["message"], "failed");
	}
}
