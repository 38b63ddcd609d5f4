use std::time::Duration;

/// Diagnostic progress notices emitted during a call. The reporting layer
/// subscribes to these; the core never writes to any output sink directly.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    CallStart { backend: String, model: String },
    FirstToken,
    Retry { attempt: u32, delay: Duration },
    Finished { chars: usize },
}

/// Observer channel for progress events, injected per adapter.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// Forwards progress events to `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::CallStart { backend, model } => {
                tracing::debug!(backend = backend.as_str(), model = model.as_str(), "call start");
            }
            ProgressEvent::FirstToken => {
                tracing::debug!("first token received");
            }
            ProgressEvent::Retry { attempt, delay } => {
                tracing::info!(attempt, ?delay, "retrying call");
            }
            ProgressEvent::Finished { chars } => {
                tracing::debug!(chars, "call finished");
            }
        }
    }
}
