//! OpenAI 兼容流式数据源
//!
//! 调用 Chat Completions API（`stream: true`），把 SSE 中的文本增量作为原始文本块输出。
//! 适用于 OpenAI 以及各类 OpenAI 兼容服务。

use super::sse::{parse_chat_delta, ChatDelta, SseDecoder};
use super::{ChunkSource, ChunkStream};
use crate::config::ProviderConfig;
use crate::error::{PipelineError, Result};
use crate::logger::sanitize_log_message;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Chat Completions 端点
const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// OpenAI 兼容数据源
pub struct OpenAICompatibleSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAICompatibleSource {
    /// 根据 Provider 配置创建数据源
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if config.connect_timeout_ms > 0 {
            builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        }
        let client = builder
            .build()
            .map_err(|e| PipelineError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self::with_client(client, config))
    }

    /// 使用已有的 HTTP 客户端
    pub fn with_client(client: Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.resolve_api_key(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, CHAT_COMPLETIONS_PATH)
    }

    /// 构建请求体
    fn build_request(&self, prompt: &str) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": true,
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl ChunkSource for OpenAICompatibleSource {
    async fn stream(&self, _ctx: &CancellationToken, prompt: &str) -> Result<ChunkStream> {
        info!(
            "[OpenAISource] 发送流式请求: model={}, prompt_len={}",
            self.model,
            prompt.len()
        );

        let mut request = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&self.build_request(prompt));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::Provider(format!("请求失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = sanitize_log_message(&body);
            error!("[OpenAISource] 请求失败: {} - {}", status, body);
            return Err(PipelineError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        error!("[OpenAISource] 流读取错误: {}", e);
                        yield Err(PipelineError::Stream(e.to_string()));
                        return;
                    }
                };

                for data in decoder.process(&chunk) {
                    match parse_chat_delta(&data) {
                        ChatDelta::Text(text) => yield Ok(text),
                        ChatDelta::Done => {
                            debug!("[OpenAISource] 收到 [DONE]");
                            return;
                        }
                        ChatDelta::Error(message) => {
                            yield Err(PipelineError::Provider(message));
                            return;
                        }
                        ChatDelta::Skip => {}
                    }
                }
            }

            // 流正常结束但没有收到 [DONE]
            for data in decoder.finish() {
                match parse_chat_delta(&data) {
                    ChatDelta::Text(text) => yield Ok(text),
                    ChatDelta::Error(message) => yield Err(PipelineError::Provider(message)),
                    ChatDelta::Done | ChatDelta::Skip => {}
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        "openai"
    }
}
