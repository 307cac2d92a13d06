//! 流式生成管道
//!
//! 把输入项渲染为 Prompt，交给流式生成服务，再把上游任意切分的输出
//! 重新切分为单词、行或完整 JSON 值，逐项交给消费者。
//!
//! # 架构设计
//!
//! ```text
//! 输入通道 ──> [Pipeline] ──> [PromptTemplate] ──> [ChunkSource] ──> 原始文本块
//!                                                                    │
//! 消费者 <── OutputStream <── OutputSink <── [SegmentAggregator] <────┘
//! ```
//!
//! # 模块结构
//!
//! - `aggregator`: 分段聚合器 (word / line / json)
//! - `carrier`: 管道中流动的数据项
//! - `config`: YAML 配置
//! - `context`: 取消上下文
//! - `error`: 错误类型
//! - `handler`: 数据源 + 聚合器组成的流式处理器
//! - `logger`: 日志初始化与脱敏
//! - `pipeline`: 管道执行引擎与零容量输出交接点
//! - `prompt`: Prompt 模板
//! - `providers`: 上游数据源

pub mod aggregator;
pub mod carrier;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod logger;
pub mod pipeline;
pub mod prompt;
pub mod providers;

// 重新导出核心类型
pub use aggregator::{AggregationStrategy, SegmentAggregator};
pub use carrier::{Carrier, TextItem};
pub use config::{AppConfig, LoggingConfig, PipelineConfig, ProviderConfig};
pub use error::{PipelineError, Result};
pub use handler::StreamingHandler;
pub use pipeline::{OutputSink, OutputStream, Pipeline, PipelineRun, RunStats, StageHandler};
pub use prompt::PromptTemplate;
pub use providers::{ChunkSource, ChunkStream, EchoSource, OpenAICompatibleSource, StaticSource};
