//! Immutable store configuration.

use std::path::PathBuf;

use serde::Deserialize;

/// Paths the store needs to drive the build subsystem and resolve the
/// standard library.
///
/// Every field may be absent. Absence disables the features that depend on
/// it rather than failing: a store without [`zig_exe_path`](Self::zig_exe_path)
/// simply never runs build files, a store without
/// [`zig_lib_dir`](Self::zig_lib_dir) resolves `@import("std")` to nothing.
///
/// The configuration is fixed for the lifetime of the store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
	/// Path to the compiler executable used to run build files.
	pub zig_exe_path: Option<PathBuf>,
	/// Path to the build-runner script handed to the compiler.
	pub build_runner_path: Option<PathBuf>,
	/// Root of the standard library installation.
	pub zig_lib_dir: Option<PathBuf>,
	/// Global cache directory forwarded to build-file runs.
	pub global_cache_dir: Option<PathBuf>,
	/// Fallback path of the `builtin.zig` module when no build file
	/// provides one.
	pub builtin_path: Option<PathBuf>,
}
