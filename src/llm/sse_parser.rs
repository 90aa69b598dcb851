use crate::errors::{ScreenPilotError, ScreenPilotResult};
use crate::llm::types::{StreamChunk, StreamChunkKind};

/// Parses a raw SSE line (OpenAI-compatible format) into a StreamChunk.
/// Returns None if the line is a keep-alive or non-data line.
pub fn parse_sse_line(line: &str) -> ScreenPilotResult<Option<StreamChunk>> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return Ok(None);
    };

    if data == "[DONE]" {
        return Ok(Some(done()));
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| ScreenPilotError::SseParsing(e.to_string()))?;

    let Some(first) = json["choices"].as_array().and_then(|c| c.first()) else {
        return Ok(None);
    };
    let delta = &first["delta"];

    // Some reasoning models stream their chain of thought separately.
    if let Some(reasoning) = delta["reasoning_content"].as_str().filter(|s| !s.is_empty()) {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Reasoning,
            content: reasoning.to_string(),
        }));
    }

    if let Some(content) = delta["content"].as_str().filter(|s| !s.is_empty()) {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Content,
            content: content.to_string(),
        }));
    }

    if first["finish_reason"].as_str().is_some() {
        return Ok(Some(done()));
    }

    Ok(None)
}

fn done() -> StreamChunk {
    StreamChunk {
        kind: StreamChunkKind::Done,
        content: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_alives_and_other_fields_are_skipped() {
        assert_eq!(parse_sse_line("").expect("ok"), None);
        assert_eq!(parse_sse_line(": ping").expect("ok"), None);
        assert_eq!(parse_sse_line("event: message").expect("ok"), None);
    }

    #[test]
    fn content_and_reasoning_deltas() {
        let chunk = parse_sse_line(r#"data: {"choices":[{"delta":{"content":"{\"act"}}]}"#)
            .expect("ok")
            .expect("chunk");
        assert_eq!(chunk.kind, StreamChunkKind::Content);
        assert_eq!(chunk.content, "{\"act");

        let chunk = parse_sse_line(r#"data: {"choices":[{"delta":{"reasoning_content":"hmm"}}]}"#)
            .expect("ok")
            .expect("chunk");
        assert_eq!(chunk.kind, StreamChunkKind::Reasoning);
    }

    #[test]
    fn done_marker_and_finish_reason() {
        assert_eq!(parse_sse_line("data: [DONE]").expect("ok").map(|c| c.kind), Some(StreamChunkKind::Done));
        let chunk = parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#)
            .expect("ok")
            .expect("chunk");
        assert_eq!(chunk.kind, StreamChunkKind::Done);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(parse_sse_line("data: {nope"), Err(ScreenPilotError::SseParsing(_))));
    }
}
