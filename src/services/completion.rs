use crate::configuration::OpenAiSettings;
use crate::errors::ChatError;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;

/// Lazy, finite sequence of text fragments from a streaming completion.
pub type FragmentStream = BoxStream<'static, Result<String, ChatError>>;

const QUICK_RESPONSE_MAX_TOKENS: u32 = 150;
const QUICK_RESPONSE_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Function the model is forced to call; its arguments are the result.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object.
    pub parameters: Value,
}

/// Abstraction over the text-generation API.
///
/// Production: `OpenAiClient`. Tests: `mock::ScriptedCompletion`.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    /// Provider name for logs and error messages.
    fn name(&self) -> &str;

    /// Short overview of a topic from the plain completion model.
    async fn quick_response(&self, prompt: &str) -> Result<String, ChatError>;

    /// Blocking chat completion returning the whole answer.
    async fn complete_chat(&self, messages: &[ChatMessage]) -> Result<String, ChatError>;

    /// Streaming chat completion. Connection and status failures are
    /// reported here as `Upstream`; failures after the first byte arrive
    /// in the stream as `Stream`.
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<FragmentStream, ChatError>;

    /// Chat completion forced through `function`; returns its JSON arguments.
    async fn complete_structured(
        &self,
        prompt: &str,
        function: &FunctionSpec,
    ) -> Result<Value, ChatError>;
}

/// OpenAI-compatible HTTP API (`/completions`, `/chat/completions`).
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    completion_model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiClient {
    pub fn from_settings(settings: &OpenAiSettings) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ChatError::Upstream(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.trim().to_string(),
            chat_model: settings.chat_model.clone(),
            completion_model: settings.completion_model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, ChatError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::error!(provider = self.name(), %status, "completion request rejected");
            return Err(ChatError::Upstream(format!("HTTP {}: {}", status, text)));
        }

        Ok(response)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ChatError> {
        self.post(path, body)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| ChatError::Upstream(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait::async_trait]
impl CompletionClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    #[tracing::instrument(name = "Quick response completion.", skip_all)]
    async fn quick_response(&self, prompt: &str) -> Result<String, ChatError> {
        let body = json!({
            "model": self.completion_model,
            "prompt": format!("Provide a brief overview for the following topic: {}", prompt),
            "max_tokens": QUICK_RESPONSE_MAX_TOKENS,
            "temperature": QUICK_RESPONSE_TEMPERATURE,
        });

        let json = self.post_json("/completions", &body).await?;
        json["choices"][0]["text"]
            .as_str()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| ChatError::Upstream("No text in completion response".to_string()))
    }

    #[tracing::instrument(name = "Chat completion.", skip_all, fields(messages = messages.len()))]
    async fn complete_chat(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let body = json!({
            "model": self.chat_model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let json = self.post_json("/chat/completions", &body).await?;
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ChatError::Upstream("No content in response".to_string()))
    }

    #[tracing::instrument(name = "Streaming chat completion.", skip_all, fields(messages = messages.len()))]
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<FragmentStream, ChatError> {
        let body = json!({
            "model": self.chat_model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": true,
        });

        let response = self.post("/chat/completions", &body).await?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();

        Ok(fragments(body))
    }

    #[tracing::instrument(name = "Structured completion.", skip_all, fields(function = %function.name))]
    async fn complete_structured(
        &self,
        prompt: &str,
        function: &FunctionSpec,
    ) -> Result<Value, ChatError> {
        let body = json!({
            "model": self.chat_model,
            "messages": [ChatMessage::user(prompt)],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "tools": [{
                "type": "function",
                "function": {
                    "name": function.name,
                    "description": function.description,
                    "parameters": function.parameters,
                }
            }],
            "tool_choice": {"type": "function", "function": {"name": function.name}},
        });

        let json = self.post_json("/chat/completions", &body).await?;
        let message = &json["choices"][0]["message"];

        // OpenAI encodes arguments as a JSON string
        let arguments = message["tool_calls"][0]["function"]["arguments"]
            .as_str()
            .or_else(|| message["content"].as_str())
            .ok_or_else(|| {
                ChatError::Upstream(format!("No {} call in response", function.name))
            })?;

        serde_json::from_str(arguments).map_err(|e| {
            ChatError::Upstream(format!("Invalid {} arguments: {}", function.name, e))
        })
    }
}

#[derive(Debug, PartialEq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Splits a server-sent-events byte stream into `data:` payloads.
/// Lines may straddle network chunks, so bytes are buffered until `\n`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line).into_iter().collect()
    }
}

fn parse_line(line: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let payload = line.strip_prefix("data:")?.trim_start();

    if payload == "[DONE]" {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(payload.to_string()))
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// `Ok(None)` for chunks that carry no choice (usage reports and the like).
fn parse_chunk(payload: &str) -> Result<Option<String>, ChatError> {
    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|e| ChatError::Stream(format!("Unparsable stream event: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(ChatError::Stream(format!("Upstream reported: {}", error)));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.delta.content.unwrap_or_default()))
}

struct SseState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, ChatError>>,
    finished: bool,
}

impl SseState {
    fn enqueue(&mut self, events: Vec<SseEvent>) {
        for event in events {
            if self.finished {
                return;
            }
            match event {
                SseEvent::Done => self.finished = true,
                SseEvent::Data(payload) => match parse_chunk(&payload) {
                    Ok(Some(fragment)) => self.pending.push_back(Ok(fragment)),
                    Ok(None) => {}
                    Err(err) => {
                        self.pending.push_back(Err(err));
                        self.finished = true;
                    }
                },
            }
        }
    }
}

/// Turns an SSE response body into fragments. Ends at `[DONE]`, at the end of
/// the body, or right after the first error.
pub fn fragments(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> FragmentStream {
    let state = SseState {
        body,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(&chunk);
                    state.enqueue(events);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((
                        Err(ChatError::Stream(format!("Stream interrupted: {}", err))),
                        state,
                    ));
                }
                None => {
                    let events = state.decoder.finish();
                    state.enqueue(events);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: &str) -> OpenAiSettings {
        OpenAiSettings {
            api_key: "test-key".to_string(),
            base_url: base_url.to_string(),
            chat_model: "gpt-test".to_string(),
            completion_model: "instruct-test".to_string(),
            max_tokens: 100,
            temperature: 0.7,
            timeout_secs: 5,
        }
    }

    fn sse_body(fragments: &[&str]) -> String {
        let mut body = String::new();
        for fragment in fragments {
            let chunk = json!({"choices": [{"delta": {"content": fragment}}]});
            body.push_str(&format!("data: {}\n\n", chunk));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[test]
    fn decoder_joins_lines_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let events = decoder.push(b":1}\n\ndata: [DONE]\n");
        assert_eq!(
            events,
            vec![SseEvent::Data("{\"a\":1}".to_string()), SseEvent::Done]
        );
    }

    #[test]
    fn decoder_ignores_comments_and_other_fields() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keep-alive\r\nevent: ping\r\ndata:x\r\n");
        assert_eq!(events, vec![SseEvent::Data("x".to_string())]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn chunk_without_content_is_an_empty_fragment() {
        assert_eq!(
            parse_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            Some(String::new())
        );
        assert_eq!(parse_chunk(r#"{"choices":[]}"#).unwrap(), None);
        assert!(parse_chunk("not json").is_err());
    }

    #[tokio::test]
    async fn stream_stops_after_first_error() {
        let chunks: Vec<reqwest::Result<Vec<u8>>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"Grace \"}}]}\n".to_vec()),
            Ok(b"data: garbage\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"lost\"}}]}\n".to_vec()),
        ];
        let items: Vec<_> = fragments(futures::stream::iter(chunks).boxed())
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Grace ");
        assert_eq!(items[1].as_ref().unwrap_err().kind(), "stream");
    }

    #[tokio::test]
    async fn stream_chat_yields_fragments_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"stream": true, "model": "gpt-test"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(&["Grace ", "", "is ", "unmerited favor."])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::from_settings(&settings(&server.uri())).unwrap();
        let stream = client
            .stream_chat(vec![ChatMessage::user("Explain grace")])
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|item| item.unwrap()).collect().await;

        assert_eq!(fragments, vec!["Grace ", "", "is ", "unmerited favor."]);
    }

    #[tokio::test]
    async fn rejected_stream_request_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = OpenAiClient::from_settings(&settings(&server.uri())).unwrap();
        let err = match client.stream_chat(vec![ChatMessage::user("hi")]).await {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err.kind(), "upstream");
    }

    #[tokio::test]
    async fn quick_response_wraps_prompt_and_trims() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/completions"))
            .and(body_partial_json(json!({
                "model": "instruct-test",
                "prompt": "Provide a brief overview for the following topic: Psalms",
                "max_tokens": 150
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": [{"text": "\n\nA book of songs. "}]})),
            )
            .mount(&server)
            .await;

        let client = OpenAiClient::from_settings(&settings(&server.uri())).unwrap();
        let text = client.quick_response("Psalms").await.unwrap();
        assert_eq!(text, "A book of songs.");
    }

    #[tokio::test]
    async fn structured_completion_returns_call_arguments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "tool_choice": {"type": "function", "function": {"name": "generate_topic_plan"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": null, "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "generate_topic_plan",
                        "arguments": "{\"title\":\"Romans\",\"objective\":\"Grace\",\"lessons\":[]}"
                    }
                }]}}]
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::from_settings(&settings(&server.uri())).unwrap();
        let function = FunctionSpec {
            name: "generate_topic_plan".to_string(),
            description: "plan".to_string(),
            parameters: json!({"type": "object"}),
        };
        let args = client
            .complete_structured("Create a plan", &function)
            .await
            .unwrap();
        assert_eq!(args["title"], "Romans");
    }
}
