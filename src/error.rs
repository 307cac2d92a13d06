//! 管道错误类型
//!
//! 定义流式管道处理过程中可能发生的错误

use thiserror::Error;

/// 管道结果类型别名
pub type Result<T> = std::result::Result<T, PipelineError>;

/// 管道错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Prompt 渲染失败（模板与输入不匹配）
    #[error("Prompt 渲染失败: {0}")]
    Render(String),

    /// Provider 调用失败
    #[error("Provider 调用失败: {0}")]
    Provider(String),

    /// 上游返回非成功状态码
    #[error("API 错误 ({status}): {body}")]
    Http { status: u16, body: String },

    /// 流读取错误
    #[error("流读取错误: {0}")]
    Stream(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 操作被取消
    #[error("操作已取消")]
    Cancelled,
}

impl PipelineError {
    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            PipelineError::Render(_) => "render_error",
            PipelineError::Provider(_) => "provider_error",
            PipelineError::Http { .. } => "http_error",
            PipelineError::Stream(_) => "stream_error",
            PipelineError::Config(_) => "config_error",
            PipelineError::Cancelled => "cancelled",
        }
    }

    /// 是否为取消信号
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::Provider(e.to_string())
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(e: serde_yaml::Error) -> Self {
        PipelineError::Config(e.to_string())
    }
}
