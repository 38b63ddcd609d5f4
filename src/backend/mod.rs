//! Backend seam: each concrete backend describes its wire protocol and the
//! dispatch layer drives the HTTP exchange.

mod ollama;
mod openai_compat;

pub use ollama::OllamaBackend;
pub use openai_compat::OpenAiCompatBackend;

use crate::error::{DispatchError, Result, bounded_snippet};
use crate::types::{CompletionOptions, ToolOutcome, ToolSpec};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

/// Stream framing a backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `text/event-stream` with `data:` lines and a `[DONE]` sentinel.
    EventStream,
    /// One standalone JSON object per line.
    JsonLines,
}

/// A fully prepared HTTP request: URL, extra headers, JSON body.
#[derive(Debug, Clone)]
pub struct HttpCall {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

/// Protocol description for one backend family. Implementations build
/// request bodies and interpret responses; they never own an HTTP client
/// or perform retries themselves.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    fn framing(&self) -> Framing;

    fn supports_tools(&self) -> bool {
        false
    }

    /// Whether tool calls arrive as streamed fragments. When false, tool
    /// calls use a buffered request parsed by [`Backend::parse_tools_body`].
    fn tools_streamed(&self) -> bool {
        false
    }

    /// Build the request for a plain completion.
    fn completion_call(&self, prompt: &str, options: &CompletionOptions, stream: bool) -> HttpCall;

    /// Build the request for a tool-calling completion.
    fn tools_call(
        &self,
        prompt: &str,
        tools: &[ToolSpec],
        options: &CompletionOptions,
    ) -> HttpCall {
        let _ = tools;
        self.completion_call(prompt, options, self.tools_streamed())
    }

    /// Parse a buffered (non-streamed) tool-calling response body.
    fn parse_tools_body(&self, body: &str) -> Result<ToolOutcome> {
        let _ = body;
        Err(DispatchError::Unsupported {
            backend: self.name().to_string(),
            operation: "buffered tool calls".to_string(),
        })
    }

    /// Map a non-success HTTP status onto the error taxonomy.
    fn classify_http(&self, status: u16, body: &str) -> DispatchError {
        match status {
            401 | 403 => DispatchError::Auth {
                backend: self.name().to_string(),
            },
            429 => DispatchError::RateLimited {
                backend: self.name().to_string(),
            },
            _ => DispatchError::Http {
                status,
                body: bounded_snippet(body),
            },
        }
    }

    /// Cheap reachability check against the backend's listing endpoint.
    async fn probe(&self, client: &Client) -> Result<()>;
}
