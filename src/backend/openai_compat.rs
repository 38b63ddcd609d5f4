use super::{Backend, Framing, HttpCall};
use crate::error::Result;
use crate::types::{CompletionOptions, ToolSpec};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

/// Backend for OpenAI-compatible chat-completion servers (hosted APIs,
/// vLLM, llama.cpp server, LM Studio, and the like).
pub struct OpenAiCompatBackend {
    name: String,
    endpoint: String,
    model: String,
    chat_url: String,
    // Prebuilt "Bearer {key}" header value, absent for keyless local servers.
    cached_auth_header: Option<String>,
}

impl OpenAiCompatBackend {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let chat_url = format!("{endpoint}/chat/completions");
        Self {
            name: name.into(),
            endpoint,
            model: model.into(),
            chat_url,
            cached_auth_header: api_key.map(|key| format!("Bearer {key}")),
        }
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        match &self.cached_auth_header {
            Some(auth) => vec![("Authorization", auth.clone())],
            None => Vec::new(),
        }
    }

    fn response_format(options: &CompletionOptions) -> Option<Value> {
        if let Some(schema) = &options.json_schema {
            return Some(json!({
                "type": "json_schema",
                "json_schema": schema,
            }));
        }
        if options.expects_json {
            return Some(json!({"type": "json_object"}));
        }
        None
    }
}

#[async_trait]
impl Backend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn framing(&self) -> Framing {
        Framing::EventStream
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn tools_streamed(&self) -> bool {
        true
    }

    fn completion_call(&self, prompt: &str, options: &CompletionOptions, stream: bool) -> HttpCall {
        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": stream,
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(format) = Self::response_format(options) {
            body["response_format"] = format;
        }

        HttpCall {
            url: self.chat_url.clone(),
            headers: self.headers(),
            body,
        }
    }

    fn tools_call(
        &self,
        prompt: &str,
        tools: &[ToolSpec],
        options: &CompletionOptions,
    ) -> HttpCall {
        let mut call = self.completion_call(prompt, options, true);

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
        call.body["tools"] = json!(tool_defs);
        if let Some(choice) = &options.tool_choice {
            call.body["tool_choice"] = json!(choice);
        }

        call
    }

    async fn probe(&self, client: &Client) -> Result<()> {
        let mut request = client.get(format!("{}/models", self.endpoint));
        if let Some(auth) = &self.cached_auth_header {
            request = request.header("Authorization", auth);
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}
