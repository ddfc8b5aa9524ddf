//! Worker-pool construction for long-running build work.
//!
//! External build runs block a thread for the lifetime of the child
//! process, so they are pushed onto a dedicated pool instead of whatever
//! thread happened to trigger the invalidation. Single-threaded
//! deployments simply pass no pool and runs execute inline.

use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

/// Builds the pool used for external build runs.
///
/// `threads == 0` lets the pool size itself from the available parallelism.
pub fn build_pool(threads: usize) -> Result<Arc<ThreadPool>, ThreadPoolBuildError> {
	ThreadPoolBuilder::new()
		.num_threads(threads)
		.thread_name(|index| format!("ziggurat-build-{index}"))
		.build()
		.map(Arc::new)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_pool_runs_work() {
		let pool = build_pool(1).unwrap();
		let result = pool.install(|| 2 + 2);
		assert_eq!(result, 4);
	}
}
