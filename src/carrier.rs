//! 载体类型定义
//!
//! 管道对流经的数据项一无所知，只通过 [`Carrier`] 的三个操作与之交互：
//! 转为文本、从文本构造、附加错误。

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// 管道载体 trait
///
/// 任何满足这三个操作的类型都可以在管道中流动。
/// 要求 `T::from_text(s).to_text() == s` 对任意 UTF-8 字符串成立。
pub trait Carrier: Send + Sync + Sized + 'static {
    /// 转换为 UTF-8 文本
    fn to_text(&self) -> String;

    /// 从 UTF-8 文本构造新的载体
    fn from_text(text: &str) -> Self;

    /// 返回附加了错误信息的副本
    fn with_error(&self, err: &PipelineError) -> Self;
}

/// 默认的文本载体
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextItem {
    /// 文本内容
    pub text: String,
    /// 错误信息（处理失败时存在）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TextItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: None,
        }
    }

    /// 是否携带错误
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl Carrier for TextItem {
    fn to_text(&self) -> String {
        self.text.clone()
    }

    fn from_text(text: &str) -> Self {
        Self::new(text)
    }

    fn with_error(&self, err: &PipelineError) -> Self {
        Self {
            text: self.text.clone(),
            error: Some(err.to_string()),
        }
    }
}

impl From<&str> for TextItem {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}
