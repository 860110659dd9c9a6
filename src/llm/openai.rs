use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::{LlmProvider, TokenStream};
use super::types::ChatRequest;
use crate::core::errors::ApiError;

const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Client for any server speaking the OpenAI chat/embeddings HTTP API.
#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client: Client::new(),
        }
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.post(url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn chat_body(request: ChatRequest, model_id: &str, stream: bool) -> Value {
        let mut body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature { obj.insert("temperature".to_string(), json!(t)); }
            if let Some(t) = request.top_p { obj.insert("top_p".to_string(), json!(t)); }
            if let Some(t) = request.max_tokens { obj.insert("max_tokens".to_string(), json!(t)); }
            if let Some(s) = request.stop { obj.insert("stop".to_string(), json!(s)); }
        }

        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ApiError> {
        let body = Self::chat_body(request, model_id, false);

        let res = self.post("/v1/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("Chat completion failed ({}): {}", status, text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;

        // Non-string content (tool calls, refusals) is reported as an empty reply.
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<TokenStream, ApiError> {
        let body = Self::chat_body(request, model_id, true);

        let res = self.post("/v1/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("Chat stream failed ({}): {}", status, text)));
        }

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(pump_sse(res.bytes_stream(), tx));

        Ok(rx)
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let res = self.post("/v1/embeddings")
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("Embedding request failed ({}): {}", status, text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        let embeddings = parse_embeddings(&payload);

        if embeddings.len() != inputs.len() {
            return Err(ApiError::Internal(format!(
                "Embedding count mismatch: {} != {}",
                embeddings.len(),
                inputs.len()
            )));
        }

        Ok(embeddings)
    }
}

/// Splits a byte stream into complete lines, holding partial lines (and partial
/// UTF-8 sequences) until their newline arrives.
#[derive(Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).trim().to_string());
        }
        lines
    }
}

/// Forwards delta tokens from an SSE body until `[DONE]`.
///
/// A transport error, an `error` event, or a body that ends without `[DONE]`
/// is sent as a terminal `Err`. Returns early once the receiver is gone.
async fn pump_sse<S, B, E>(mut stream: S, tx: mpsc::Sender<Result<String, ApiError>>)
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut lines = SseLineBuffer::default();
    loop {
        let item = tokio::select! {
            _ = tx.closed() => return,
            item = stream.next() => item,
        };

        let bytes = match item {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                let _ = tx.send(Err(ApiError::internal(e))).await;
                return;
            }
            None => {
                let _ = tx
                    .send(Err(ApiError::Internal(
                        "model stream ended before [DONE]".to_string(),
                    )))
                    .await;
                return;
            }
        };

        for line in lines.push(bytes.as_ref()) {
            match parse_sse_line(&line) {
                SseEvent::Done => return,
                SseEvent::Token(content) => {
                    if tx.send(Ok(content)).await.is_err() {
                        return;
                    }
                }
                SseEvent::Error(message) => {
                    let _ = tx
                        .send(Err(ApiError::Internal(format!("model stream error: {}", message))))
                        .await;
                    return;
                }
                SseEvent::Skip => {}
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Token(String),
    Error(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    let Ok(json) = serde_json::from_str::<Value>(data) else {
        return SseEvent::Skip;
    };

    if let Some(error) = json.get("error").filter(|e| !e.is_null()) {
        let message = error["message"]
            .as_str()
            .or_else(|| error.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return SseEvent::Error(message);
    }

    json["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|content| !content.is_empty())
        .map(|content| SseEvent::Token(content.to_string()))
        .unwrap_or(SseEvent::Skip)
}

fn parse_embeddings(payload: &Value) -> Vec<Vec<f32>> {
    let Some(data) = payload["data"].as_array() else {
        return Vec::new();
    };

    let mut indexed: Vec<(usize, Vec<f32>)> = data
        .iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let vals = item["embedding"].as_array()?;
            let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(position);
            let vec: Vec<f32> = vals.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect();
            Some((index, vec))
        })
        .collect();

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, vec)| vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    #[test]
    fn line_buffer_holds_partial_lines() {
        let mut buffer = SseLineBuffer::default();

        assert!(buffer.push(b"data: {\"a\"").is_empty());
        let lines = buffer.push(b":1}\n\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"a\":1}", "", "data: [DONE]"]);
    }

    #[test]
    fn line_buffer_keeps_split_utf8_intact() {
        let mut buffer = SseLineBuffer::default();
        let text = "data: é\n".as_bytes();

        assert!(buffer.push(&text[..7]).is_empty());
        assert_eq!(buffer.push(&text[7..]), vec!["data: é"]);
    }

    #[test]
    fn parses_delta_tokens_and_terminator() {
        let line = r#"data: {"choices":[{"delta":{"content":"Get-"}}]}"#;
        assert_eq!(parse_sse_line(line), SseEvent::Token("Get-".to_string()));
        assert_eq!(parse_sse_line("data: [DONE]"), SseEvent::Done);
        assert_eq!(parse_sse_line(r#"data: {"choices":[{"delta":{}}]}"#), SseEvent::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Skip);
    }

    #[test]
    fn error_events_are_reported() {
        let line = r#"data: {"error":{"message":"overloaded","type":"server_error"}}"#;
        assert_eq!(parse_sse_line(line), SseEvent::Error("overloaded".to_string()));
        assert_eq!(
            parse_sse_line(r#"data: {"error":"bad gateway"}"#),
            SseEvent::Error("bad gateway".to_string())
        );
    }

    async fn pump(chunks: &[&str]) -> Vec<Result<String, ApiError>> {
        let body = futures_util::stream::iter(
            chunks
                .iter()
                .map(|c| Ok::<_, std::io::Error>(c.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        );
        let (tx, mut rx) = mpsc::channel(8);
        pump_sse(body, tx).await;

        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn complete_stream_ends_cleanly_at_done() {
        let items = pump(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Get-\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Service\"}}]}\n\ndata: [DONE]\n\n",
        ])
        .await;

        let tokens: Vec<String> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(tokens, vec!["Get-", "Service"]);
    }

    #[tokio::test]
    async fn body_ending_without_done_is_an_error() {
        let items = pump(&["data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n"]).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(items[1].as_ref().unwrap_err().to_string().contains("[DONE]"));
    }

    #[tokio::test]
    async fn error_event_terminates_the_stream() {
        let items = pump(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"overloaded\"}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n",
        ])
        .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(items[1].as_ref().unwrap_err().to_string().contains("overloaded"));
    }

    #[test]
    fn embeddings_follow_response_index() {
        let payload = json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });

        assert_eq!(
            parse_embeddings(&payload),
            vec![vec![1.0, 0.0], vec![0.0, 1.0]]
        );
    }

    #[test]
    fn chat_body_includes_sampling_options() {
        let request = ChatRequest::new(vec![ChatMessage::user("hi")]).with_temperature(0.0);
        let body = OpenAiProvider::chat_body(request, "gpt-4o-mini", true);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("max_tokens").is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_openai_connection() {
        let key = std::env::var("OPENAI_API_KEY").ok();
        let provider = OpenAiProvider::new("https://api.openai.com".to_string(), key);

        let request = ChatRequest::new(vec![ChatMessage::user("Hello")]);
        match provider.chat(request, "gpt-4o-mini").await {
            Ok(response) => println!("Chat Response: {}", response),
            Err(e) => panic!("Failed to reach OpenAI: {}", e),
        }
    }
}
