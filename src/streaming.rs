use crate::decode::Frame;
use crate::observer::{ProgressEvent, ProgressSink};
use crate::types::{FinishReason, ToolCall, ToolOutcome};

/// Lifecycle of one streamed response, used for diagnostics.
///
/// `Failed` is reached only on transport-level failure; a single unparsable
/// frame never fails a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Connecting,
    Streaming,
    Finalizing,
    Done,
    Failed,
}

/// Callback invoked with each non-empty text delta, in frame order.
pub type ChunkCallback<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Everything accumulated from one finished stream.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub text: String,
    pub saw_thinking: bool,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
}

impl StreamOutcome {
    pub fn into_tool_outcome(self) -> ToolOutcome {
        ToolOutcome {
            content: self.text,
            tool_calls: self.tool_calls,
            finish_reason: self.finish_reason,
        }
    }
}

/// Partially built tool call, keyed by the frame-supplied index.
///
/// `id` and `name` are set once when first seen; `arguments` only ever
/// appends, since argument fragments are sequential pieces of one
/// JSON-encoded string.
#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Consumes frames and produces the finalized [`StreamOutcome`].
pub struct ResponseCollector<'a> {
    text: String,
    saw_thinking: bool,
    first_token_sent: bool,
    finish_reason: Option<FinishReason>,
    builders: Vec<ToolCallBuilder>,
    on_chunk: Option<ChunkCallback<'a>>,
    sink: &'a dyn ProgressSink,
}

impl<'a> ResponseCollector<'a> {
    pub fn new(sink: &'a dyn ProgressSink, on_chunk: Option<ChunkCallback<'a>>) -> Self {
        Self {
            text: String::new(),
            saw_thinking: false,
            first_token_sent: false,
            finish_reason: None,
            builders: Vec::new(),
            on_chunk,
            sink,
        }
    }

    fn mark_first_token(&mut self) {
        if !self.first_token_sent {
            self.first_token_sent = true;
            self.sink.on_event(&ProgressEvent::FirstToken);
        }
    }

    pub fn feed(&mut self, frame: Frame) {
        match frame {
            Frame::TextDelta(delta) => {
                if delta.is_empty() {
                    return;
                }
                self.mark_first_token();
                self.text.push_str(&delta);
                if let Some(on_chunk) = self.on_chunk.as_mut() {
                    on_chunk(&delta);
                }
            }
            Frame::Thinking(thinking) => {
                if thinking.is_empty() {
                    return;
                }
                self.mark_first_token();
                self.saw_thinking = true;
            }
            Frame::ToolCallDelta {
                index,
                id,
                name,
                arguments_delta,
            } => {
                let slot = index as usize;
                while self.builders.len() <= slot {
                    self.builders.push(ToolCallBuilder::default());
                }
                let builder = &mut self.builders[slot];
                if builder.id.is_none() {
                    builder.id = id;
                }
                if builder.name.is_none() {
                    builder.name = name;
                }
                builder.arguments.push_str(&arguments_delta);
            }
            Frame::Done { reason } => {
                if reason.is_some() {
                    self.finish_reason = reason;
                }
            }
            Frame::Other => {}
        }
    }

    pub fn finish(self) -> StreamOutcome {
        let mut tool_calls = Vec::with_capacity(self.builders.len());
        for (index, builder) in self.builders.into_iter().enumerate() {
            let Some(name) = builder.name else {
                if !builder.arguments.trim().is_empty() {
                    tracing::warn!(index, "skipping streamed tool call without a name");
                }
                continue;
            };
            let id = builder
                .id
                .unwrap_or_else(|| format!("call_{index}"));
            tool_calls.push(ToolCall::function(id, name, builder.arguments));
        }

        let finish_reason = self.finish_reason.unwrap_or(if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        });

        self.sink.on_event(&ProgressEvent::Finished {
            chars: self.text.chars().count(),
        });

        StreamOutcome {
            text: self.text,
            saw_thinking: self.saw_thinking,
            tool_calls,
            finish_reason,
        }
    }
}
