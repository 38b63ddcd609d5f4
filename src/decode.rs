//! Wire-frame decoders for the two streaming framings the dispatcher speaks.
//!
//! Both decoders consume raw byte chunks and emit [`Frame`]s. Partial lines
//! are carried across chunk boundaries, so splitting the transport stream at
//! any byte offset yields the same frame sequence as delivering it whole.
//! A line that fails to decode is dropped, counted, and never fatal.

use crate::types::FinishReason;
use serde::Deserialize;

/// One decoded unit of a streaming protocol response.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    TextDelta(String),
    ToolCallDelta {
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments_delta: String,
    },
    Thinking(String),
    Done { reason: Option<FinishReason> },
    Other,
}

/// Turns transport byte chunks into a lazy sequence of frames.
pub trait FrameDecoder: Send {
    /// Feed one chunk; returns the frames completed by it.
    fn push(&mut self, chunk: &[u8]) -> Vec<Frame>;

    /// Signal end-of-input. Any buffered remainder is decoded as one final
    /// line — some servers omit the trailing newline on the last frame.
    fn finish(&mut self) -> Vec<Frame>;

    /// Whether the protocol's own end-of-stream marker has been seen.
    fn at_end(&self) -> bool;

    /// Lines that failed to decode and were dropped.
    fn dropped_frames(&self) -> usize;
}

/// Byte-level line assembly carrying an unterminated trailing fragment of one
/// chunk over to the next. Splitting only ever happens at `\n`, which cannot
/// fall inside a multi-byte UTF-8 sequence.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
            let rest = self.buf.split_off(newline + 1);
            let mut line = std::mem::replace(&mut self.buf, rest);
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.buf);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

// ─── Event-stream framing ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EventChunk {
    #[serde(default)]
    choices: Vec<EventChoice>,
}

#[derive(Debug, Deserialize)]
struct EventChoice {
    #[serde(default)]
    delta: EventDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EventDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<EventToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct EventToolCallDelta {
    index: u32,
    id: Option<String>,
    function: Option<EventToolFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct EventToolFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Decoder for `data: <json>` event-stream framing with a `data: [DONE]`
/// terminal sentinel. Blank lines separate events; non-`data:` lines are
/// protocol furniture and ignored.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    lines: LineBuffer,
    dropped: usize,
    done: bool,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_line(&mut self, line: &str) -> Vec<Frame> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        let Some(payload) = trimmed.strip_prefix(DATA_PREFIX) else {
            return Vec::new();
        };
        let payload = payload.trim();

        if payload == DONE_SENTINEL {
            self.done = true;
            return vec![Frame::Done { reason: None }];
        }

        let chunk: EventChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(error) => {
                self.dropped += 1;
                tracing::debug!("dropping undecodable event-stream payload: {error}");
                return Vec::new();
            }
        };

        let Some(choice) = chunk.choices.into_iter().next() else {
            return vec![Frame::Other];
        };

        let mut frames = Vec::new();
        if let Some(thinking) = choice.delta.reasoning_content
            && !thinking.is_empty()
        {
            frames.push(Frame::Thinking(thinking));
        }
        if let Some(content) = choice.delta.content
            && !content.is_empty()
        {
            frames.push(Frame::TextDelta(content));
        }
        if let Some(tool_calls) = choice.delta.tool_calls {
            for delta in tool_calls {
                let (name, arguments) = match delta.function {
                    Some(function) => (function.name, function.arguments),
                    None => (None, None),
                };
                frames.push(Frame::ToolCallDelta {
                    index: delta.index,
                    id: delta.id,
                    name,
                    arguments_delta: arguments.unwrap_or_default(),
                });
            }
        }
        if let Some(reason) = choice.finish_reason {
            frames.push(Frame::Done {
                reason: FinishReason::parse(&reason),
            });
        }
        if frames.is_empty() {
            frames.push(Frame::Other);
        }
        frames
    }
}

impl FrameDecoder for SseFrameDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for line in self.lines.push(chunk) {
            frames.extend(self.decode_line(&line));
        }
        frames
    }

    fn finish(&mut self) -> Vec<Frame> {
        match self.lines.finish() {
            Some(line) => self.decode_line(&line),
            None => Vec::new(),
        }
    }

    fn at_end(&self) -> bool {
        self.done
    }

    fn dropped_frames(&self) -> usize {
        self.dropped
    }
}

// ─── Line-delimited framing ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateLine {
    response: Option<String>,
    thinking: Option<String>,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
}

/// Decoder for newline-delimited JSON framing: each line is one complete
/// object `{response, done, ...}`; `done: true` ends the stream.
#[derive(Debug, Default)]
pub struct JsonLinesDecoder {
    lines: LineBuffer,
    dropped: usize,
    done: bool,
}

impl JsonLinesDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_line(&mut self, line: &str) -> Vec<Frame> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let parsed: GenerateLine = match serde_json::from_str(trimmed) {
            Ok(parsed) => parsed,
            Err(error) => {
                self.dropped += 1;
                tracing::debug!("skipping malformed line-delimited frame: {error}");
                return Vec::new();
            }
        };

        let mut frames = Vec::new();
        if let Some(thinking) = parsed.thinking
            && !thinking.is_empty()
        {
            frames.push(Frame::Thinking(thinking));
        }
        if let Some(response) = parsed.response
            && !response.is_empty()
        {
            frames.push(Frame::TextDelta(response));
        }
        if parsed.done {
            self.done = true;
            frames.push(Frame::Done {
                reason: parsed.done_reason.as_deref().and_then(FinishReason::parse),
            });
        }
        if frames.is_empty() {
            frames.push(Frame::Other);
        }
        frames
    }
}

impl FrameDecoder for JsonLinesDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for line in self.lines.push(chunk) {
            frames.extend(self.decode_line(&line));
        }
        frames
    }

    fn finish(&mut self) -> Vec<Frame> {
        match self.lines.finish() {
            Some(line) => self.decode_line(&line),
            None => Vec::new(),
        }
    }

    fn at_end(&self) -> bool {
        self.done
    }

    fn dropped_frames(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(decoder: &mut dyn FrameDecoder, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = decoder.push(bytes);
        frames.extend(decoder.finish());
        frames
    }

    fn sse_body() -> String {
        concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"world\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        )
        .to_string()
    }

    fn text_of(frames: &[Frame]) -> String {
        frames
            .iter()
            .filter_map(|frame| match frame {
                Frame::TextDelta(delta) => Some(delta.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn sse_decodes_content_deltas_in_order() {
        let mut decoder = SseFrameDecoder::new();
        let frames = drain(&mut decoder, sse_body().as_bytes());
        assert_eq!(text_of(&frames), "Hello world");
        assert!(decoder.at_end());
        assert_eq!(decoder.dropped_frames(), 0);
    }

    #[test]
    fn sse_split_at_any_byte_offset_decodes_identically() {
        let body = sse_body();
        let whole = drain(&mut SseFrameDecoder::new(), body.as_bytes());

        for split in 1..body.len() {
            let mut decoder = SseFrameDecoder::new();
            let mut frames = decoder.push(&body.as_bytes()[..split]);
            frames.extend(decoder.push(&body.as_bytes()[split..]));
            frames.extend(decoder.finish());
            assert_eq!(frames, whole, "split at byte {split} diverged");
        }
    }

    #[test]
    fn sse_malformed_payload_is_dropped_not_fatal() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: {not json at all\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
            "data: [DONE]\n",
        );
        let mut decoder = SseFrameDecoder::new();
        let frames = drain(&mut decoder, body.as_bytes());
        assert_eq!(text_of(&frames), "ab");
        assert_eq!(decoder.dropped_frames(), 1);
    }

    #[test]
    fn sse_ignores_non_data_lines() {
        let body = concat!(
            ": keep-alive comment\n",
            "event: message\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
        );
        let mut decoder = SseFrameDecoder::new();
        let frames = drain(&mut decoder, body.as_bytes());
        assert_eq!(frames, vec![Frame::TextDelta("x".into())]);
        assert_eq!(decoder.dropped_frames(), 0);
    }

    #[test]
    fn sse_missing_trailing_newline_still_decodes_last_frame() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}";
        let mut decoder = SseFrameDecoder::new();
        let mut frames = decoder.push(body.as_bytes());
        assert!(frames.is_empty());
        frames.extend(decoder.finish());
        assert_eq!(frames, vec![Frame::TextDelta("tail".into())]);
    }

    #[test]
    fn sse_tool_call_fragments_become_indexed_frames() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"f\",\"arguments\":\"\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"a\\\":1}\"}}]}}]}\n",
        );
        let mut decoder = SseFrameDecoder::new();
        let frames = drain(&mut decoder, body.as_bytes());
        assert_eq!(
            frames,
            vec![
                Frame::ToolCallDelta {
                    index: 0,
                    id: Some("call_1".into()),
                    name: Some("f".into()),
                    arguments_delta: String::new(),
                },
                Frame::ToolCallDelta {
                    index: 0,
                    id: None,
                    name: None,
                    arguments_delta: "{\"a\":1}".into(),
                },
            ]
        );
    }

    #[test]
    fn sse_reasoning_content_becomes_thinking_frame() {
        let body = "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hmm\"}}]}\n";
        let frames = drain(&mut SseFrameDecoder::new(), body.as_bytes());
        assert_eq!(frames, vec![Frame::Thinking("hmm".into())]);
    }

    #[test]
    fn sse_payload_without_choices_is_other() {
        let body = "data: {\"ping\": true}\n";
        let frames = drain(&mut SseFrameDecoder::new(), body.as_bytes());
        assert_eq!(frames, vec![Frame::Other]);
    }

    #[test]
    fn sse_handles_crlf_line_endings() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\ndata: [DONE]\r\n";
        let mut decoder = SseFrameDecoder::new();
        let frames = drain(&mut decoder, body.as_bytes());
        assert_eq!(
            frames,
            vec![Frame::TextDelta("x".into()), Frame::Done { reason: None }]
        );
        assert!(decoder.at_end());
    }

    #[test]
    fn sse_multibyte_text_split_mid_character_survives() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n";
        let bytes = body.as_bytes();
        // Split inside the two-byte 'é'.
        let split = body.find("h\u{e9}").unwrap() + 2;
        let mut decoder = SseFrameDecoder::new();
        let mut frames = decoder.push(&bytes[..split]);
        frames.extend(decoder.push(&bytes[split..]));
        frames.extend(decoder.finish());
        assert_eq!(frames, vec![Frame::TextDelta("héllo".into())]);
    }

    fn lines_body() -> String {
        concat!(
            "{\"response\":\"one \",\"done\":false}\n",
            "{\"response\":\"two \",\"done\":false}\n",
            "{\"response\":\"three\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true,\"done_reason\":\"stop\"}\n",
        )
        .to_string()
    }

    #[test]
    fn lines_decode_and_terminate_on_done() {
        let mut decoder = JsonLinesDecoder::new();
        let frames = drain(&mut decoder, lines_body().as_bytes());
        assert_eq!(text_of(&frames), "one two three");
        assert!(decoder.at_end());
        assert_eq!(
            frames.last(),
            Some(&Frame::Done {
                reason: Some(FinishReason::Stop)
            })
        );
    }

    #[test]
    fn lines_split_at_any_byte_offset_decodes_identically() {
        let body = lines_body();
        let whole = drain(&mut JsonLinesDecoder::new(), body.as_bytes());

        for split in 1..body.len() {
            let mut decoder = JsonLinesDecoder::new();
            let mut frames = decoder.push(&body.as_bytes()[..split]);
            frames.extend(decoder.push(&body.as_bytes()[split..]));
            frames.extend(decoder.finish());
            assert_eq!(frames, whole, "split at byte {split} diverged");
        }
    }

    #[test]
    fn lines_malformed_line_is_skipped() {
        let body = concat!(
            "{\"response\":\"a\",\"done\":false}\n",
            "garbage\n",
            "{\"response\":\"b\",\"done\":true}\n",
        );
        let mut decoder = JsonLinesDecoder::new();
        let frames = drain(&mut decoder, body.as_bytes());
        assert_eq!(text_of(&frames), "ab");
        assert_eq!(decoder.dropped_frames(), 1);
        assert!(decoder.at_end());
    }

    #[test]
    fn lines_missing_trailing_newline_decodes_remainder() {
        let body = "{\"response\":\"tail\",\"done\":true}";
        let mut decoder = JsonLinesDecoder::new();
        let mut frames = decoder.push(body.as_bytes());
        assert!(frames.is_empty());
        frames.extend(decoder.finish());
        assert_eq!(text_of(&frames), "tail");
        assert!(decoder.at_end());
    }

    #[test]
    fn lines_thinking_field_becomes_thinking_frame() {
        let body = "{\"thinking\":\"let me see\",\"done\":false}\n";
        let frames = drain(&mut JsonLinesDecoder::new(), body.as_bytes());
        assert_eq!(frames, vec![Frame::Thinking("let me see".into())]);
    }

    #[test]
    fn lines_unknown_done_reason_maps_to_none() {
        let body = "{\"response\":\"x\",\"done\":true,\"done_reason\":\"weird\"}\n";
        let frames = drain(&mut JsonLinesDecoder::new(), body.as_bytes());
        assert_eq!(frames.last(), Some(&Frame::Done { reason: None }));
    }
}
