use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{ScreenPilotError, ScreenPilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, StreamChunkKind};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> ScreenPilotResult<LlmResponse> {
        let body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
        });

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            "sending LLM request"
        );
        tracing::trace!(body = %sanitized_for_log(&body), "request body (base64 omitted)");

        let mut request = self.client.post(&self.api_base).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(ScreenPilotError::LlmProvider(format!("{}: {}", status, err_body)));
        }

        if cfg.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Accumulate an SSE response until `[DONE]` or end of body.
    async fn handle_stream(&self, response: reqwest::Response) -> ScreenPilotResult<LlmResponse> {
        let mut byte_stream = response.bytes_stream();
        let mut acc = StreamAccumulator::default();

        while let Some(result) = byte_stream.next().await {
            let bytes = result?;
            if acc.feed(&bytes) {
                break;
            }
        }
        let resp = acc.finish();

        tracing::info!(
            provider = %self.id,
            content_len = resp.content.len(),
            reasoning_len = resp.reasoning.len(),
            "LLM stream complete"
        );
        Ok(resp)
    }

    async fn handle_json(&self, response: reqwest::Response) -> ScreenPilotResult<LlmResponse> {
        let json: serde_json::Value = response.json().await?;
        let message = &json["choices"][0]["message"];

        let resp = LlmResponse {
            content: message["content"].as_str().unwrap_or("").to_string(),
            reasoning: message["reasoning_content"].as_str().unwrap_or("").to_string(),
        };

        tracing::info!(
            provider = %self.id,
            content_len = resp.content.len(),
            "LLM JSON response received"
        );
        Ok(resp)
    }
}

/// Line-buffers raw SSE bytes across network chunks and collects the deltas.
///
/// Lines are decoded only once complete, so a multi-byte character split between
/// two chunks survives intact.
#[derive(Default)]
struct StreamAccumulator {
    line_buf: Vec<u8>,
    resp: LlmResponse,
}

impl StreamAccumulator {
    /// Returns `true` once the stream signalled completion.
    fn feed(&mut self, bytes: &[u8]) -> bool {
        for &byte in bytes {
            if byte != b'\n' {
                self.line_buf.push(byte);
                continue;
            }
            let line = std::mem::take(&mut self.line_buf);
            if self.consume_line(String::from_utf8_lossy(&line).trim()) {
                return true;
            }
        }
        false
    }

    fn consume_line(&mut self, line: &str) -> bool {
        if line.is_empty() {
            return false;
        }
        match sse_parser::parse_sse_line(line) {
            Ok(Some(chunk)) => match chunk.kind {
                StreamChunkKind::Reasoning => self.resp.reasoning.push_str(&chunk.content),
                StreamChunkKind::Content => self.resp.content.push_str(&chunk.content),
                StreamChunkKind::Done => return true,
            },
            Ok(None) => {}
            Err(e) => tracing::debug!("SSE parse skipped: {e}"),
        }
        false
    }

    /// Flush a trailing line without newline, then hand back the reply.
    fn finish(mut self) -> LlmResponse {
        let rest = std::mem::take(&mut self.line_buf);
        self.consume_line(String::from_utf8_lossy(&rest).trim());
        self.resp
    }
}

/// Copy of the request body with image payloads replaced, for logging only.
fn sanitized_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) != Some("image_url") {
                    continue;
                }
                if let Some(url) = part.get_mut("image_url").and_then(|i| i.get_mut("url")) {
                    *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ContentPart;

    #[test]
    fn accumulator_joins_lines_split_across_chunks() {
        let mut acc = StreamAccumulator::default();
        assert!(!acc.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel"));
        assert!(!acc.feed(b"lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n"));
        assert!(acc.feed(b"data: [DONE]\n"));
        assert_eq!(acc.finish().content, "Hello world");
    }

    #[test]
    fn accumulator_keeps_multibyte_chars_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"type(\\\"caf\u{e9}\\\")\"}}]}\n";
        let bytes = line.as_bytes();
        // Split between the two bytes of 'é' (0xC3 0xA9).
        let split = bytes.iter().position(|&b| b == 0xC3).expect("multibyte char") + 1;

        let mut acc = StreamAccumulator::default();
        assert!(!acc.feed(&bytes[..split]));
        assert!(!acc.feed(&bytes[split..]));
        assert_eq!(acc.finish().content, "type(\"caf\u{e9}\")");
    }

    #[test]
    fn accumulator_flushes_unterminated_tail() {
        let mut acc = StreamAccumulator::default();
        assert!(!acc.feed(b"data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"think\"}}]}\n"));
        assert!(!acc.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"{}\"}}]}"));
        let resp = acc.finish();
        assert_eq!(resp.reasoning, "think");
        assert_eq!(resp.content, "{}");
    }

    #[test]
    fn log_body_omits_images_only() {
        let messages = vec![
            ChatMessage::system("rules"),
            ChatMessage::user_parts(vec![ContentPart::text("look"), ContentPart::png_base64("SECRETBYTES")]),
        ];
        let body = serde_json::json!({ "model": "m", "messages": messages });
        let logged = sanitized_for_log(&body);
        assert!(!logged.contains("SECRETBYTES"));
        assert!(logged.contains("<omitted_base64_image>"));
        assert!(logged.contains("look"));
        assert!(logged.contains("rules"));
    }
}
