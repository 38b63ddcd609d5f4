use super::{Backend, Framing, HttpCall};
use crate::error::{DispatchError, Result, bounded_snippet};
use crate::types::{CompletionOptions, FinishReason, ToolCall, ToolOutcome, ToolSpec};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

/// Backend for a local Ollama server.
///
/// Completions stream over `/api/generate` as JSON lines. Tool calls go
/// through `/api/chat` buffered, since Ollama reports tool calls only on
/// the final message.
pub struct OllamaBackend {
    endpoint: String,
    model: String,
    context_window: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
    done_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Deserialize)]
struct ChatToolCall {
    function: ChatToolFunction,
}

#[derive(Deserialize)]
struct ChatToolFunction {
    name: String,
    arguments: Value,
}

impl OllamaBackend {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        context_window: Option<u32>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            context_window,
        }
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn framing(&self) -> Framing {
        Framing::JsonLines
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn completion_call(&self, prompt: &str, options: &CompletionOptions, stream: bool) -> HttpCall {
        let mut generation = serde_json::Map::new();
        if let Some(max_tokens) = options.max_tokens {
            generation.insert("num_predict".to_string(), json!(max_tokens));
        }
        if let Some(num_ctx) = self.context_window {
            generation.insert("num_ctx".to_string(), json!(num_ctx));
        }

        let mut body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": stream,
        });
        if !generation.is_empty() {
            body["options"] = Value::Object(generation);
        }
        if options.expects_json {
            body["format"] = json!("json");
        }

        HttpCall {
            url: format!("{}/api/generate", self.endpoint),
            headers: Vec::new(),
            body,
        }
    }

    fn tools_call(
        &self,
        prompt: &str,
        tools: &[ToolSpec],
        options: &CompletionOptions,
    ) -> HttpCall {
        let tool_defs: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    },
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
            "tools": tool_defs,
        });
        let mut generation = serde_json::Map::new();
        if let Some(max_tokens) = options.max_tokens {
            generation.insert("num_predict".to_string(), json!(max_tokens));
        }
        if let Some(num_ctx) = self.context_window {
            generation.insert("num_ctx".to_string(), json!(num_ctx));
        }
        if !generation.is_empty() {
            body["options"] = Value::Object(generation);
        }

        HttpCall {
            url: format!("{}/api/chat", self.endpoint),
            headers: Vec::new(),
            body,
        }
    }

    fn parse_tools_body(&self, body: &str) -> Result<ToolOutcome> {
        let response: ChatResponse =
            serde_json::from_str(body).map_err(|err| DispatchError::InvalidJson {
                snippet: bounded_snippet(body),
                message: err.to_string(),
            })?;

        let tool_calls: Vec<ToolCall> = response
            .message
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, call)| {
                ToolCall::function(
                    format!("call_{i}"),
                    call.function.name,
                    call.function.arguments.to_string(),
                )
            })
            .collect();

        let finish_reason = response
            .done_reason
            .as_deref()
            .and_then(FinishReason::parse)
            .unwrap_or(if tool_calls.is_empty() {
                FinishReason::Stop
            } else {
                FinishReason::ToolCalls
            });

        Ok(ToolOutcome {
            content: response.message.content,
            tool_calls,
            finish_reason,
        })
    }

    async fn probe(&self, client: &Client) -> Result<()> {
        client
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
