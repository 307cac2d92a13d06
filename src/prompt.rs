//! Prompt 渲染
//!
//! 将输入项渲染为发送给上游的 Prompt。模板使用 `{{ name }}` 占位符，
//! `text` 绑定输入项的文本，其余变量来自配置。

use crate::carrier::Carrier;
use crate::error::{PipelineError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex is valid")
});

/// 输入文本绑定的变量名
pub const TEXT_VARIABLE: &str = "text";

/// Prompt 模板
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    template: String,
    variables: HashMap<String, String>,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new("{{text}}")
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            variables: HashMap::new(),
        }
    }

    /// 设置额外变量
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// 批量设置额外变量
    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// 渲染输入项
    pub fn render<T: Carrier>(&self, item: &T) -> Result<String> {
        self.render_text(&item.to_text())
    }

    /// 以给定文本作为 `text` 变量渲染
    pub fn render_text(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(self.template.len() + text.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(&self.template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = if name.as_str() == TEXT_VARIABLE {
                text
            } else {
                self.variables
                    .get(name.as_str())
                    .map(String::as_str)
                    .ok_or_else(|| {
                        PipelineError::Render(format!("未定义的模板变量: {}", name.as_str()))
                    })?
            };
            out.push_str(&self.template[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }

        out.push_str(&self.template[last..]);
        Ok(out)
    }
}
