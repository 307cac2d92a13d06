//! SSE 流解析器
//!
//! 将任意切分的字节流还原为 Server-Sent Events 的 data 负载，
//! 并从 OpenAI 兼容的 chunk 中提取文本增量

use serde_json::Value;
use tracing::warn;

/// SSE 事件解码器
///
/// 事件以空行分隔；不完整的事件保留在缓冲区等待后续字节
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// 已确认不含事件分隔符的前缀长度
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一个字节块，返回其中完整事件的 data 负载
    pub fn process(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut payloads = Vec::new();
        loop {
            // 分隔符可能跨越上一块的最后一个字节
            let from = self.scanned.saturating_sub(1);
            let Some(offset) = find_event_end(&self.buffer[from..]) else {
                self.scanned = self.buffer.len();
                break;
            };
            let pos = from + offset;
            let event: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            self.scanned = 0;
            if let Some(data) = event_data(&event[..pos]) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// 流结束时处理缓冲区中最后一个没有空行结尾的事件
    pub fn finish(&mut self) -> Vec<String> {
        let event = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        event_data(&event).into_iter().collect()
    }
}

fn find_event_end(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

/// 提取事件中的 data 行，多行 data 以换行连接
fn event_data(event: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(event);
    let lines: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Chat Completions 流式 chunk 的解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum ChatDelta {
    /// 文本增量
    Text(String),
    /// 流结束标记 `[DONE]`
    Done,
    /// 上游在流中返回的错误
    Error(String),
    /// 无文本内容（角色、usage、无法解析的数据等）
    Skip,
}

/// 解析 OpenAI 兼容的 SSE data 负载
pub fn parse_chat_delta(data: &str) -> ChatDelta {
    if data.trim() == "[DONE]" {
        return ChatDelta::Done;
    }

    let json: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            warn!("[SseDecoder] 解析 JSON 失败: {} - data: {}", e, data);
            return ChatDelta::Skip;
        }
    };

    if let Some(err) = json.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return ChatDelta::Error(message);
    }

    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(|content| content.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| ChatDelta::Text(s.to_string()))
        .unwrap_or(ChatDelta::Skip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_split_events() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.process(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.process(b":1}\n\ndata: [DO"), vec![r#"{"a":1}"#]);
        assert_eq!(decoder.process(b"NE]\n\n"), vec!["[DONE]"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_decoder_crlf_and_comments() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.process(b": keep-alive\r\n\r\nevent: message\r\ndata: x\r\n\r\n");
        assert_eq!(payloads, vec!["x"]);
    }

    #[test]
    fn test_decoder_separator_split_across_chunks() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.process(b"data: one\n").is_empty());
        assert_eq!(decoder.scanned, b"data: one\n".len());
        assert_eq!(decoder.process(b"\ndata: two\n"), vec!["one"]);
        assert_eq!(decoder.process(b"\n"), vec!["two"]);
        assert_eq!(decoder.scanned, 0);
    }

    #[test]
    fn test_decoder_multiline_data() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.process(b"data: a\ndata: b\n\n"), vec!["a\nb"]);
    }

    #[test]
    fn test_decoder_multibyte_split() {
        let bytes = "data: 你好\n\n".as_bytes();
        let mut decoder = SseDecoder::new();
        // 在多字节字符中间切开
        assert!(decoder.process(&bytes[..8]).is_empty());
        assert_eq!(decoder.process(&bytes[8..]), vec!["你好"]);
    }

    #[test]
    fn test_decoder_finish_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.process(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_parse_text_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_chat_delta(data), ChatDelta::Text("Hello".to_string()));
    }

    #[test]
    fn test_parse_role_only_and_usage() {
        assert_eq!(
            parse_chat_delta(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#),
            ChatDelta::Skip
        );
        assert_eq!(
            parse_chat_delta(r#"{"choices":[],"usage":{"prompt_tokens":3}}"#),
            ChatDelta::Skip
        );
    }

    #[test]
    fn test_parse_done_and_error() {
        assert_eq!(parse_chat_delta(" [DONE] "), ChatDelta::Done);
        assert_eq!(
            parse_chat_delta(r#"{"error":{"message":"overloaded"}}"#),
            ChatDelta::Error("overloaded".to_string())
        );
        assert_eq!(parse_chat_delta("not json"), ChatDelta::Skip);
    }
}
