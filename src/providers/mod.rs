//! 上游数据源模块
//!
//! 数据源负责把 Prompt 发送给远端生成服务，并以原始文本块的形式返回输出。
//! 文本块的边界由上游决定，与语义无关，重新切分由 [`crate::aggregator`] 完成。
//!
//! - `openai`: OpenAI 兼容的 Chat Completions 流式数据源
//! - `sse`: SSE 事件解码
//! - [`StaticSource`]: 返回预设文本块，用于测试和离线演示

mod openai;
pub mod sse;

pub use openai::OpenAICompatibleSource;
pub use sse::{parse_chat_delta, ChatDelta, SseDecoder};

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 原始文本块流
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// 流式数据源 trait
#[async_trait]
pub trait ChunkSource: Send + Sync + 'static {
    /// 发送 Prompt 并返回原始文本块流
    async fn stream(&self, ctx: &CancellationToken, prompt: &str) -> Result<ChunkStream>;

    /// 数据源名称（用于日志）
    fn name(&self) -> &str;
}

/// 预设文本块数据源
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    chunks: Vec<Result<String>>,
    delay: Option<Duration>,
}

impl StaticSource {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(|c| Ok(c.into())).collect(),
            delay: None,
        }
    }

    /// 在输出完所有文本块后追加一个传输错误
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.chunks.push(Err(PipelineError::Stream(message.into())));
        self
    }

    /// 每个文本块之前等待一段时间
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ChunkSource for StaticSource {
    async fn stream(&self, _ctx: &CancellationToken, _prompt: &str) -> Result<ChunkStream> {
        let chunks = self.chunks.clone();
        let delay = self.delay;

        let stream = async_stream::stream! {
            for chunk in chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield chunk;
            }
        };
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// 回显 Prompt 的数据源，按固定字符数切块
#[derive(Debug, Clone)]
pub struct EchoSource {
    chunk_chars: usize,
}

impl EchoSource {
    pub fn new(chunk_chars: usize) -> Self {
        Self {
            chunk_chars: chunk_chars.max(1),
        }
    }
}

#[async_trait]
impl ChunkSource for EchoSource {
    async fn stream(&self, _ctx: &CancellationToken, prompt: &str) -> Result<ChunkStream> {
        let chars: Vec<char> = prompt.chars().collect();
        let chunks: Vec<Result<String>> = chars
            .chunks(self.chunk_chars)
            .map(|c| Ok(c.iter().collect()))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn name(&self) -> &str {
        "echo"
    }
}
