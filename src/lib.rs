#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

//! Concurrency-bounded request dispatch for heterogeneous text-generation
//! backends: streamed decode, tool-call reassembly, retry with backoff, and
//! JSON extraction from free-form model output.

pub mod adapter;
pub mod backend;
pub mod decode;
pub mod error;
pub mod gate;
pub mod observer;
pub mod retry;
pub mod sanitize;
pub mod streaming;
pub mod template;
pub mod types;

pub use adapter::{Adapter, AdapterConfig};
pub use backend::{Backend, Framing, HttpCall, OllamaBackend, OpenAiCompatBackend};
pub use decode::{Frame, FrameDecoder, JsonLinesDecoder, SseFrameDecoder};
pub use error::{DispatchError, Result};
pub use gate::{Gate, GatePermit};
pub use observer::{LogSink, NullSink, ProgressEvent, ProgressSink};
pub use retry::RetryPolicy;
pub use sanitize::{clean, extract_json, extract_json_array};
pub use streaming::{ResponseCollector, StreamOutcome, StreamPhase};
pub use template::{TemplateVars, render};
pub use types::{CompletionOptions, FinishReason, ToolCall, ToolOutcome, ToolSpec};
