//! Client message transport and build-progress reporting.
//!
//! The store publishes work-done progress and configuration-refresh
//! notifications through a [`MessageTransport`] owned by the surrounding
//! server. Emission is gated by the capabilities the client advertised
//! during the initialize handshake.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use lsp_types::notification::{Notification, Progress};
use lsp_types::request::{InlayHintRefreshRequest, Request, SemanticTokensRefresh, WorkDoneProgressCreate};
use lsp_types::{
	NumberOrString, ProgressParams, ProgressParamsValue, WorkDoneProgress, WorkDoneProgressBegin,
	WorkDoneProgressCreateParams, WorkDoneProgressEnd,
};
use serde_json::{Value, json};

const PROGRESS_TOKEN: &str = "ziggurat/loadBuildConfig";
const PROGRESS_TITLE: &str = "Loading build configuration";

/// Writer for raw JSON-RPC messages to the client.
pub trait MessageTransport: Send + Sync {
	/// Queues one message for delivery. Must not block on the client.
	fn write_json_message(&self, message: Value);
}

/// Transport that discards every message.
#[derive(Debug, Default)]
pub struct NullTransport;

impl MessageTransport for NullTransport {
	fn write_json_message(&self, _message: Value) {}
}

/// Client capabilities that gate what the store is allowed to send.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientCapabilities {
	/// The client renders `$/progress` work-done notifications.
	pub work_done_progress: bool,
	/// The client honors `workspace/semanticTokens/refresh`.
	pub semantic_tokens_refresh: bool,
	/// The client honors `workspace/inlayHint/refresh`.
	pub inlay_hints_refresh: bool,
}

/// Outcome of a group of build-file runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuildOutcome {
	Success,
	Failed,
}

/// Aggregates overlapping build-file runs into a single progress report.
///
/// The first run to start emits *begin*, the last one to finish emits *end*;
/// runs in between only move the counter.
pub(crate) struct BuildProgress {
	transport: Arc<dyn MessageTransport>,
	capabilities: ClientCapabilities,
	builds_in_progress: AtomicU32,
	next_request_id: AtomicU32,
}

impl BuildProgress {
	pub(crate) fn new(transport: Arc<dyn MessageTransport>, capabilities: ClientCapabilities) -> Self {
		Self {
			transport,
			capabilities,
			builds_in_progress: AtomicU32::new(0),
			next_request_id: AtomicU32::new(1),
		}
	}

	pub(crate) fn begin(&self) {
		if self.builds_in_progress.fetch_add(1, Ordering::Relaxed) != 0
			|| !self.capabilities.work_done_progress
		{
			return;
		}
		self.transport.write_json_message(json!({
			"jsonrpc": "2.0",
			"id": self.next_request_id.fetch_add(1, Ordering::Relaxed),
			"method": WorkDoneProgressCreate::METHOD,
			"params": WorkDoneProgressCreateParams {
				token: NumberOrString::String(PROGRESS_TOKEN.to_string()),
			},
		}));
		self.transport.write_json_message(progress_message(WorkDoneProgress::Begin(
			WorkDoneProgressBegin {
				title: PROGRESS_TITLE.to_string(),
				cancellable: Some(false),
				message: None,
				percentage: None,
			},
		)));
	}

	pub(crate) fn end(&self, outcome: BuildOutcome) {
		if self.builds_in_progress.fetch_sub(1, Ordering::Relaxed) != 1
			|| !self.capabilities.work_done_progress
		{
			return;
		}
		let message = match outcome {
			BuildOutcome::Success => "completed",
			BuildOutcome::Failed => "failed",
		};
		self.transport.write_json_message(progress_message(WorkDoneProgress::End(
			WorkDoneProgressEnd {
				message: Some(message.to_string()),
			},
		)));
	}

	/// Asks the client to re-pull data derived from build configuration.
	pub(crate) fn config_refreshed(&self) {
		if self.capabilities.semantic_tokens_refresh {
			self.write_refresh_request(SemanticTokensRefresh::METHOD);
		}
		if self.capabilities.inlay_hints_refresh {
			self.write_refresh_request(InlayHintRefreshRequest::METHOD);
		}
	}

	fn write_refresh_request(&self, method: &str) {
		self.transport.write_json_message(json!({
			"jsonrpc": "2.0",
			"id": self.next_request_id.fetch_add(1, Ordering::Relaxed),
			"method": method,
			"params": Value::Null,
		}));
	}
}

fn progress_message(value: WorkDoneProgress) -> Value {
	json!({
		"jsonrpc": "2.0",
		"method": Progress::METHOD,
		"params": ProgressParams {
			token: NumberOrString::String(PROGRESS_TOKEN.to_string()),
			value: ProgressParamsValue::WorkDone(value),
		},
	})
}

#[cfg(test)]
mod tests {
	use parking_lot::Mutex;

	use super::*;

	#[derive(Default)]
	struct RecordingTransport {
		messages: Mutex<Vec<Value>>,
	}

	impl MessageTransport for RecordingTransport {
		fn write_json_message(&self, message: Value) {
			self.messages.lock().push(message);
		}
	}

	fn methods(transport: &RecordingTransport) -> Vec<String> {
		transport
			.messages
			.lock()
			.iter()
			.map(|m| m["method"].as_str().unwrap_or_default().to_string())
			.collect()
	}

	#[test]
	fn test_overlapping_builds_emit_one_begin_end_pair() {
		let transport = Arc::new(RecordingTransport::default());
		let progress = BuildProgress::new(transport.clone(), ClientCapabilities {
			work_done_progress: true,
			..ClientCapabilities::default()
		});

		progress.begin();
		progress.begin();
		progress.end(BuildOutcome::Success);
		progress.end(BuildOutcome::Failed);

		assert_eq!(methods(&transport), vec![
			"window/workDoneProgress/create",
			"$/progress",
			"$/progress",
		]);
		let last = transport.messages.lock().last().cloned().unwrap();
		assert_eq!(last["params"]["value"]["kind"], "end");
		assert_eq!(last["params"]["value"]["message"], "failed");
	}

	#[test]
	fn test_no_progress_without_capability() {
		let transport = Arc::new(RecordingTransport::default());
		let progress = BuildProgress::new(transport.clone(), ClientCapabilities::default());

		progress.begin();
		progress.end(BuildOutcome::Success);

		assert!(transport.messages.lock().is_empty());
	}

	#[test]
	fn test_refresh_requests_follow_capabilities() {
		let transport = Arc::new(RecordingTransport::default());
		let progress = BuildProgress::new(transport.clone(), ClientCapabilities {
			semantic_tokens_refresh: true,
			inlay_hints_refresh: false,
			..ClientCapabilities::default()
		});

		progress.config_refreshed();

		assert_eq!(methods(&transport), vec!["workspace/semanticTokens/refresh"]);
	}
}
