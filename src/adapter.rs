//! Dispatch layer: template rendering, concurrency gating, retry, timeout,
//! and the streamed HTTP exchange, composed around one [`Backend`].

use crate::backend::{Backend, Framing, HttpCall};
use crate::decode::{FrameDecoder, JsonLinesDecoder, SseFrameDecoder};
use crate::error::{DispatchError, Result};
use crate::gate::Gate;
use crate::observer::{ProgressEvent, ProgressSink};
use crate::retry::RetryPolicy;
use crate::sanitize;
use crate::streaming::{ChunkCallback, ResponseCollector, StreamOutcome, StreamPhase};
use crate::template::{self, TemplateVars};
use crate::types::{CompletionOptions, ToolOutcome, ToolSpec};
use futures_util::StreamExt;
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Tuning knobs for one adapter instance.
#[derive(Debug, Clone, Copy)]
pub struct AdapterConfig {
    /// Per-attempt deadline, measured from the start of the HTTP exchange.
    pub timeout: Duration,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl AdapterConfig {
    /// Profile for hosted APIs: parallel calls, moderate deadline.
    pub fn remote() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            concurrency: 10,
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
        }
    }

    /// Profile for a local single-GPU server: serialized calls, generous
    /// deadline to cover cold model loads.
    pub fn local() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            concurrency: 1,
            ..Self::remote()
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::remote()
    }
}

// The per-call deadline lives in the dispatch layer, so the client itself
// carries only a connect timeout.
fn build_backend_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Unified entry point for one backend: all calls share the gate, retry
/// policy, deadline, and progress sink configured here.
pub struct Adapter {
    backend: Arc<dyn Backend>,
    client: Client,
    gate: Gate,
    retry: RetryPolicy,
    timeout: Duration,
    sink: Arc<dyn ProgressSink>,
}

impl Adapter {
    pub fn new(
        backend: Arc<dyn Backend>,
        config: AdapterConfig,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_backend_client(),
            gate: Gate::new(config.concurrency)?,
            retry: RetryPolicy::new(config.max_attempts, config.base_backoff),
            timeout: config.timeout,
            backend,
            sink,
        })
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Render the prompt and run a buffered completion with retry. With
    /// `expects_json` set, the result is the extracted JSON payload in
    /// compact form rather than the raw text.
    pub async fn complete(
        &self,
        prompt: &str,
        vars: &TemplateVars,
        options: &CompletionOptions,
    ) -> Result<String> {
        let rendered = template::render(prompt, vars);
        let prompt = rendered.as_str();

        let outcome = self
            .retry
            .run(self.sink.as_ref(), move || {
                self.attempt_stream(prompt, options, None)
            })
            .await?;

        if outcome.text.trim().is_empty() {
            return Err(DispatchError::EmptyResponse);
        }
        if options.expects_json {
            let value = sanitize::extract_json(&outcome.text)?;
            return Ok(value.to_string());
        }
        Ok(outcome.text)
    }

    /// Render the prompt and stream the completion, invoking `on_chunk` for
    /// every text delta in order. Never retried: a replayed stream would
    /// hand the caller duplicate chunks.
    pub async fn stream(
        &self,
        prompt: &str,
        vars: &TemplateVars,
        options: &CompletionOptions,
        mut on_chunk: impl FnMut(&str) + Send,
    ) -> Result<String> {
        let rendered = template::render(prompt, vars);
        let outcome = self
            .attempt_stream(&rendered, options, Some(&mut on_chunk))
            .await?;

        if outcome.text.trim().is_empty() {
            return Err(DispatchError::EmptyResponse);
        }
        Ok(outcome.text)
    }

    /// Render the prompt and run a tool-calling completion with retry.
    pub async fn complete_with_tools(
        &self,
        prompt: &str,
        vars: &TemplateVars,
        tools: &[ToolSpec],
        options: &CompletionOptions,
    ) -> Result<ToolOutcome> {
        if !self.backend.supports_tools() {
            return Err(DispatchError::Unsupported {
                backend: self.backend.name().to_string(),
                operation: "tool calls".to_string(),
            });
        }

        let rendered = template::render(prompt, vars);
        let prompt = rendered.as_str();

        self.retry
            .run(self.sink.as_ref(), move || {
                self.attempt_tools(prompt, tools, options)
            })
            .await
    }

    /// Whether the backend answers its listing endpoint within the deadline.
    pub async fn test_connection(&self) -> bool {
        match tokio::time::timeout(self.timeout, self.backend.probe(&self.client)).await {
            Ok(result) => result.is_ok(),
            Err(_) => false,
        }
    }

    async fn with_deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::TimedOut(self.timeout)),
        }
    }

    async fn attempt_stream<'a>(
        &'a self,
        prompt: &str,
        options: &CompletionOptions,
        on_chunk: Option<ChunkCallback<'a>>,
    ) -> Result<StreamOutcome> {
        tracing::debug!(phase = ?StreamPhase::Idle, "awaiting dispatch slot");
        let _permit = self.gate.acquire().await;
        self.sink.on_event(&ProgressEvent::CallStart {
            backend: self.backend.name().to_string(),
            model: self.backend.model().to_string(),
        });

        let call = self.backend.completion_call(prompt, options, true);
        self.with_deadline(self.exchange_frames(call, on_chunk)).await
    }

    async fn attempt_tools(
        &self,
        prompt: &str,
        tools: &[ToolSpec],
        options: &CompletionOptions,
    ) -> Result<ToolOutcome> {
        let _permit = self.gate.acquire().await;
        self.sink.on_event(&ProgressEvent::CallStart {
            backend: self.backend.name().to_string(),
            model: self.backend.model().to_string(),
        });

        let call = self.backend.tools_call(prompt, tools, options);
        if self.backend.tools_streamed() {
            let outcome = self.with_deadline(self.exchange_frames(call, None)).await?;
            Ok(outcome.into_tool_outcome())
        } else {
            let body = self.with_deadline(self.exchange_buffered(call)).await?;
            self.backend.parse_tools_body(&body)
        }
    }

    fn prepare(&self, call: &HttpCall) -> reqwest::RequestBuilder {
        let mut request = self.client.post(&call.url).json(&call.body);
        for (name, value) in &call.headers {
            request = request.header(*name, value);
        }
        request
    }

    async fn exchange_frames<'a>(
        &'a self,
        call: HttpCall,
        on_chunk: Option<ChunkCallback<'a>>,
    ) -> Result<StreamOutcome> {
        tracing::debug!(phase = ?StreamPhase::Connecting, url = %call.url, "dispatching streamed request");
        let response = self.prepare(&call).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(phase = ?StreamPhase::Failed, status = status.as_u16(), "request rejected");
            return Err(self.backend.classify_http(status.as_u16(), &body));
        }

        let mut decoder: Box<dyn FrameDecoder> = match self.backend.framing() {
            Framing::EventStream => Box::new(SseFrameDecoder::new()),
            Framing::JsonLines => Box::new(JsonLinesDecoder::new()),
        };
        let mut collector = ResponseCollector::new(self.sink.as_ref(), on_chunk);

        tracing::debug!(phase = ?StreamPhase::Streaming, "stream open");
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for frame in decoder.push(&chunk) {
                collector.feed(frame);
            }
            if decoder.at_end() {
                break;
            }
        }

        tracing::debug!(phase = ?StreamPhase::Finalizing, "stream drained");
        for frame in decoder.finish() {
            collector.feed(frame);
        }
        if decoder.dropped_frames() > 0 {
            tracing::debug!(
                dropped = decoder.dropped_frames(),
                "undecodable frames were skipped"
            );
        }

        let outcome = collector.finish();
        tracing::debug!(phase = ?StreamPhase::Done, chars = outcome.text.len(), "stream complete");
        Ok(outcome)
    }

    async fn exchange_buffered(&self, call: HttpCall) -> Result<String> {
        tracing::debug!(url = %call.url, "dispatching buffered request");
        let response = self.prepare(&call).send().await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(self.backend.classify_http(status.as_u16(), &body));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NullSink;
    use async_trait::async_trait;
    use serde_json::json;

    struct TextOnlyBackend;

    #[async_trait]
    impl Backend for TextOnlyBackend {
        fn name(&self) -> &str {
            "text-only"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        fn framing(&self) -> Framing {
            Framing::EventStream
        }

        fn completion_call(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
            stream: bool,
        ) -> HttpCall {
            HttpCall {
                url: "http://localhost:0/v1/chat/completions".to_string(),
                headers: Vec::new(),
                body: json!({"prompt": prompt, "stream": stream}),
            }
        }

        async fn probe(&self, _client: &Client) -> Result<()> {
            Ok(())
        }
    }

    fn adapter(config: AdapterConfig) -> Result<Adapter> {
        Adapter::new(Arc::new(TextOnlyBackend), config, Arc::new(NullSink))
    }

    #[test]
    fn zero_concurrency_is_a_config_error() {
        let config = AdapterConfig {
            concurrency: 0,
            ..AdapterConfig::remote()
        };
        assert!(matches!(
            adapter(config),
            Err(DispatchError::Config(_))
        ));
    }

    #[test]
    fn local_profile_serializes_calls() {
        let config = AdapterConfig::local();
        assert_eq!(config.concurrency, 1);
        assert!(config.timeout > AdapterConfig::remote().timeout);
    }

    #[tokio::test]
    async fn tools_on_text_only_backend_is_unsupported() {
        let adapter = adapter(AdapterConfig::remote()).unwrap();
        let tools = vec![ToolSpec {
            name: "f".to_string(),
            description: "noop".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let err = adapter
            .complete_with_tools("go", &TemplateVars::new(), &tools, &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unsupported { .. }));
        // Rejected before any slot was claimed.
        assert_eq!(adapter.gate().running(), 0);
    }
}
