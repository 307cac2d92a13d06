//! 配置模块
//!
//! 从 YAML 文件加载管道、Provider 和日志配置，所有字段均有默认值

use crate::aggregator::AggregationStrategy;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::mpsc;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// 管道配置
    pub pipeline: PipelineConfig,
    /// Provider 配置
    pub provider: ProviderConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 管道配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// 分段策略（word / line / json），无法识别时按 word 处理
    pub strategy: AggregationStrategy,
    /// Prompt 模板，`{{text}}` 绑定输入项文本
    pub prompt_template: String,
    /// 额外的模板变量
    pub variables: HashMap<String, String>,
    /// 输入通道容量
    pub input_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: AggregationStrategy::Word,
            prompt_template: "{{text}}".to_string(),
            variables: HashMap::new(),
            input_buffer: 16,
        }
    }
}

impl PipelineConfig {
    /// 按 `input_buffer` 创建管道输入通道
    pub fn input_channel<T>(&self) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
        mpsc::channel(self.input_buffer.max(1))
    }
}

/// Provider 配置（OpenAI 兼容接口）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// API 基础地址
    pub base_url: String,
    /// API 密钥（优先于环境变量）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// 读取 API 密钥的环境变量名
    pub api_key_env: String,
    /// 模型名称
    pub model: String,
    /// 温度
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// 最大输出 token 数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// 连接超时（毫秒），0 表示不设置
    pub connect_timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: None,
            max_tokens: None,
            connect_timeout_ms: 10_000,
        }
    }
}

impl ProviderConfig {
    /// 获取 API 密钥：配置值优先，其次读取环境变量
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.is_empty())
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 是否启用日志输出
    pub enabled: bool,
    /// 日志级别（trace / debug / info / warn / error）
    pub level: String,
    /// 是否输出 target
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            with_target: false,
        }
    }
}

impl AppConfig {
    /// 从 YAML 文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("读取配置文件失败 {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&content)?;
        tracing::info!("[Config] 已加载配置: {}", path.display());
        Ok(config)
    }

    /// 从 YAML 字符串解析并校验配置
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.provider.base_url.trim().is_empty() {
            return Err(PipelineError::Config("provider.base_url 不能为空".to_string()));
        }
        if self.provider.model.trim().is_empty() {
            return Err(PipelineError::Config("provider.model 不能为空".to_string()));
        }
        if self.pipeline.input_buffer == 0 {
            return Err(PipelineError::Config(
                "pipeline.input_buffer 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}
