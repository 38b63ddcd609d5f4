use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool the model may invoke, described by a JSON schema.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One finalized model-issued tool invocation. `arguments` stays the raw
/// JSON-encoded string exactly as the backend produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: ToolFunction {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
}

impl FinishReason {
    /// Map a backend's finish-reason string onto the normalized set.
    /// Unknown strings map to `None`; the accumulator applies its default.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "stop" => Some(Self::Stop),
            "tool_calls" => Some(Self::ToolCalls),
            "length" => Some(Self::Length),
            "content_filter" => Some(Self::ContentFilter),
            _ => None,
        }
    }
}

/// Per-call option set. Immutable for the duration of the call.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub max_tokens: Option<u32>,
    pub expects_json: bool,
    pub json_schema: Option<Value>,
    pub tool_choice: Option<String>,
}

/// Result of a tool-calling completion.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_serializes_with_type_field() {
        let call = ToolCall::function("call_1", "shell", "{\"command\":\"ls\"}");
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "shell");
        assert_eq!(json["function"]["arguments"], "{\"command\":\"ls\"}");
    }

    #[test]
    fn finish_reason_parses_known_values() {
        assert_eq!(FinishReason::parse("stop"), Some(FinishReason::Stop));
        assert_eq!(FinishReason::parse("tool_calls"), Some(FinishReason::ToolCalls));
        assert_eq!(FinishReason::parse("length"), Some(FinishReason::Length));
        assert_eq!(
            FinishReason::parse("content_filter"),
            Some(FinishReason::ContentFilter)
        );
    }

    #[test]
    fn finish_reason_unknown_maps_to_none() {
        assert_eq!(FinishReason::parse("eos_token"), None);
        assert_eq!(FinishReason::parse(""), None);
    }

    #[test]
    fn options_default_to_plain_text() {
        let options = CompletionOptions::default();
        assert!(!options.expects_json);
        assert!(options.max_tokens.is_none());
        assert!(options.json_schema.is_none());
        assert!(options.tool_choice.is_none());
    }
}
