//! Per-build-description state.
//!
//! A [`BuildFile`] caches the configuration produced by executing its build
//! description through the compiler. Executions are expensive external
//! processes, so concurrent invalidations coalesce: at most one run is in
//! flight per build file, and any invalidation arriving mid-run schedules
//! exactly one follow-up run.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::diagnostics::ErrorBundle;
use crate::uri;

/// Hard cap on captured runner output, per stream.
const MAX_RUNNER_OUTPUT: u64 = 16 * 1024 * 1024;

/// Name of the optional static companion config next to a build file.
const ASSOCIATED_CONFIG_NAME: &str = "zls.build.json";

/// Configuration produced by executing a build description.
///
/// This mirrors the JSON the build runner prints on stdout; unknown fields
/// are ignored so runner and server can evolve independently.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildConfig {
	/// Build roots of declared dependencies, used to resolve imports inside
	/// the build file itself.
	#[serde(default)]
	pub deps_build_roots: Vec<NamePath>,
	/// Importable packages declared by the build file.
	#[serde(default)]
	pub packages: Vec<NamePath>,
	/// C include directories contributed by the build file.
	#[serde(default)]
	pub include_dirs: Vec<String>,
	/// C macro definitions contributed by the build file.
	#[serde(default)]
	pub c_macros: Vec<String>,
}

impl BuildConfig {
	/// Anchors relative package paths at the build file's directory.
	fn resolve_paths(&mut self, base: &Path) {
		for entry in self.packages.iter_mut().chain(self.deps_build_roots.iter_mut()) {
			if entry.path.is_relative() {
				entry.path = base.join(&entry.path);
			}
		}
	}
}

/// A named path entry in a [`BuildConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct NamePath {
	/// Package or dependency name as it appears in import strings.
	pub name: String,
	/// Root source file of the entry.
	pub path: PathBuf,
}

/// Optional static configuration loaded from `zls.build.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildAssociatedConfig {
	/// Extra arguments appended to every runner invocation.
	#[serde(default)]
	pub build_options: Vec<String>,
	/// Override for the language-builtin module, relative to the build file.
	#[serde(default)]
	pub relative_builtin_path: Option<String>,
}

/// Coalescing state of the external runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum RunState {
	#[default]
	Idle,
	Running,
	RunningButInvalidated,
}

#[derive(Debug, Default)]
struct BuildFileState {
	config: Option<Arc<BuildConfig>>,
	builtin_uri: Option<String>,
	associated_config: Option<BuildAssociatedConfig>,
	version: u32,
	run: RunState,
}

/// In-memory state of one build description and its executed output.
pub struct BuildFile {
	uri: String,
	state: Mutex<BuildFileState>,
}

impl std::fmt::Debug for BuildFile {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("BuildFile")
			.field("uri", &self.uri)
			.field("version", &state.version)
			.field("has_config", &state.config.is_some())
			.field("run", &state.run)
			.finish()
	}
}

impl BuildFile {
	pub(crate) fn new(uri: String) -> Self {
		let associated_config = load_associated_config(&uri);
		let builtin_uri = associated_config
			.as_ref()
			.and_then(|config| config.relative_builtin_path.as_deref())
			.and_then(|relative| uri::resolve_relative(&uri, relative));
		Self {
			uri,
			state: Mutex::new(BuildFileState {
				builtin_uri,
				associated_config,
				..BuildFileState::default()
			}),
		}
	}

	/// URI of the build description document.
	pub fn uri(&self) -> &str {
		&self.uri
	}

	/// Latest successfully produced configuration, if any.
	pub fn config(&self) -> Option<Arc<BuildConfig>> {
		self.state.lock().config.clone()
	}

	/// Counts successful runs; language features use it to notice staleness.
	pub fn version(&self) -> u32 {
		self.state.lock().version
	}

	/// Override URI for the language-builtin module, when the companion
	/// config provides one.
	pub fn builtin_uri(&self) -> Option<String> {
		self.state.lock().builtin_uri.clone()
	}

	/// True while an external run is in flight.
	pub fn busy(&self) -> bool {
		self.state.lock().run != RunState::Idle
	}

	pub(crate) fn build_options(&self) -> Vec<String> {
		self.state
			.lock()
			.associated_config
			.as_ref()
			.map(|config| config.build_options.clone())
			.unwrap_or_default()
	}

	/// Registers an invalidation. Returns true when the caller must start a
	/// run; false when an in-flight run will pick the invalidation up.
	pub(crate) fn begin_invalidation(&self) -> bool {
		let mut state = self.state.lock();
		match state.run {
			RunState::Idle => {
				state.run = RunState::Running;
				true
			}
			RunState::Running => {
				state.run = RunState::RunningButInvalidated;
				false
			}
			RunState::RunningButInvalidated => false,
		}
	}

	/// Completes a run, publishing `config` when present. Returns true when
	/// an invalidation arrived mid-run and the caller must run again; the
	/// completed result is discarded in that case.
	pub(crate) fn finish_run(&self, config: Option<BuildConfig>) -> bool {
		let mut state = self.state.lock();
		match state.run {
			RunState::RunningButInvalidated => {
				state.run = RunState::Running;
				true
			}
			RunState::Running => {
				if let Some(config) = config {
					state.config = Some(Arc::new(config));
					state.version += 1;
				}
				state.run = RunState::Idle;
				false
			}
			RunState::Idle => {
				debug_assert!(false, "finish_run without begin_invalidation");
				false
			}
		}
	}

	#[cfg(test)]
	pub(crate) fn publish_config(&self, config: BuildConfig) {
		let mut state = self.state.lock();
		state.config = Some(Arc::new(config));
		state.version += 1;
	}
}

/// Errors from executing a build description.
#[derive(Debug, Error)]
pub enum BuildRunError {
	/// The store configuration is missing the compiler or runner path.
	#[error("build runner not configured")]
	Disabled,

	/// The build file URI does not name a filesystem path.
	#[error("build file has no filesystem path: {0}")]
	InvalidUri(String),

	/// The child process could not be spawned or awaited.
	#[error("failed to run build runner: {0}")]
	Spawn(#[source] io::Error),

	/// The process exited unsuccessfully; stderr carries the details.
	#[error("build runner exited with {status}")]
	RunFailed {
		/// Exit status of the child process.
		status: ExitStatus,
	},

	/// The process succeeded but printed something other than a config.
	#[error("build runner produced invalid config: {0}")]
	InvalidBuildConfig(#[from] serde_json::Error),
}

/// A failed runner execution, with parsed stderr when the process ran.
pub(crate) struct RunnerFailure {
	pub error: BuildRunError,
	pub stderr: Option<ErrorBundle>,
}

impl From<BuildRunError> for RunnerFailure {
	fn from(error: BuildRunError) -> Self {
		Self { error, stderr: None }
	}
}

/// Executes the build description and parses the printed configuration.
///
/// Output is captured with a hard cap per stream so a misbehaving build
/// script cannot exhaust memory.
pub(crate) fn execute_build_runner(
	store_config: &StoreConfig,
	build_file_uri: &str,
	build_options: &[String],
) -> Result<BuildConfig, RunnerFailure> {
	let zig_exe = store_config.zig_exe_path.as_ref().ok_or(BuildRunError::Disabled)?;
	let runner = store_config.build_runner_path.as_ref().ok_or(BuildRunError::Disabled)?;
	let build_path = uri::to_path(build_file_uri)
		.map_err(|_| BuildRunError::InvalidUri(build_file_uri.to_string()))?;
	let build_dir = build_path
		.parent()
		.ok_or_else(|| BuildRunError::InvalidUri(build_file_uri.to_string()))?;

	let mut command = Command::new(zig_exe);
	command.arg("build").arg("--build-runner").arg(runner);
	if let Some(lib_dir) = &store_config.zig_lib_dir {
		command.arg("--zig-lib-dir").arg(lib_dir);
	}
	if let Some(cache_dir) = &store_config.global_cache_dir {
		command.arg("--cache-dir").arg(cache_dir);
	}
	command.args(build_options);
	command.current_dir(build_dir);
	command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

	debug!(uri = %build_file_uri, "running build file");
	let mut child = command.spawn().map_err(BuildRunError::Spawn)?;

	let stderr_pipe = child
		.stderr
		.take()
		.ok_or_else(|| BuildRunError::Spawn(io::Error::other("stderr not captured")))?;
	let stdout_pipe = child
		.stdout
		.take()
		.ok_or_else(|| BuildRunError::Spawn(io::Error::other("stdout not captured")))?;

	let stderr_reader = std::thread::spawn(move || read_capped(stderr_pipe));
	let stdout = read_capped(stdout_pipe);
	let stderr = stderr_reader.join().unwrap_or_default();
	let status = child.wait().map_err(BuildRunError::Spawn)?;

	if !status.success() {
		let bundle = ErrorBundle::from_compiler_output(&String::from_utf8_lossy(&stderr));
		return Err(RunnerFailure {
			error: BuildRunError::RunFailed { status },
			stderr: Some(bundle),
		});
	}

	let mut config: BuildConfig =
		serde_json::from_slice(&stdout).map_err(BuildRunError::InvalidBuildConfig)?;
	config.resolve_paths(build_dir);
	Ok(config)
}

fn read_capped(mut reader: impl Read) -> Vec<u8> {
	let mut buffer = Vec::new();
	let _ = reader.take(MAX_RUNNER_OUTPUT).read_to_end(&mut buffer);
	buffer
}

fn load_associated_config(build_file_uri: &str) -> Option<BuildAssociatedConfig> {
	let path = uri::to_path(build_file_uri).ok()?.parent()?.join(ASSOCIATED_CONFIG_NAME);
	let text = match std::fs::read_to_string(&path) {
		Ok(text) => text,
		Err(error) if error.kind() == io::ErrorKind::NotFound => {
			debug!(path = %path.display(), "no build-associated config");
			return None;
		}
		Err(error) => {
			debug!(path = %path.display(), %error, "failed to read build-associated config");
			return None;
		}
	};
	match serde_json::from_str(&text) {
		Ok(config) => Some(config),
		Err(error) => {
			warn!(path = %path.display(), %error, "malformed build-associated config");
			None
		}
	}
}
