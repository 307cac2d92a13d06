//! 分段聚合器
//!
//! 将任意切分的上游文本块重新切分为有语义的片段：
//!
//! ```text
//! 原始文本块 ──> [SegmentAggregator::append] ──> 完整片段 ──> 下游
//!                 ...
//! 流结束     ──> [SegmentAggregator::finish] ──> 剩余内容
//! ```
//!
//! # 策略
//!
//! - `word`: 以空白或 `. , ; : ! ? … » «` 作为边界
//! - `line`: 以换行作为边界
//! - `json`: 输出完整的顶层 JSON 值，丢弃值之间的噪声
//!
//! 聚合器不做任何 I/O，也不需要加锁：每次处理调用独占一个实例。

mod json;


use json::{JsonScanner, Scan};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 单词边界标点
const WORD_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '…', '»', '«'];

/// 聚合策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AggregationStrategy {
    /// 按单词切分（默认）
    #[default]
    Word,
    /// 按行切分
    Line,
    /// 按完整 JSON 值切分
    Json,
}

impl AggregationStrategy {
    /// 从字符串解析策略，无法识别时回退为 `Word`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "line" => Self::Line,
            "json" => Self::Json,
            _ => Self::Word,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::Line => "line",
            Self::Json => "json",
        }
    }

    fn is_boundary(&self, ch: char) -> bool {
        match self {
            Self::Word => ch.is_whitespace() || WORD_PUNCTUATION.contains(&ch),
            Self::Line => ch == '\n',
            Self::Json => false,
        }
    }
}

impl From<String> for AggregationStrategy {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<AggregationStrategy> for String {
    fn from(strategy: AggregationStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

impl std::fmt::Display for AggregationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分段聚合器
///
/// `word`/`line` 策略下 `cursor` 标记已输出内容的末尾，只增不减；
/// `json` 策略下已消费的前缀随即从缓冲区移除，`cursor` 恒为 0，
/// 未完成值的扫描进度保存在 `scanner` 中。
#[derive(Debug, Clone, Default)]
pub struct SegmentAggregator {
    strategy: AggregationStrategy,
    buffer: String,
    cursor: usize,
    scanner: JsonScanner,
}

impl SegmentAggregator {
    pub fn new(strategy: AggregationStrategy) -> Self {
        Self {
            strategy,
            buffer: String::new(),
            cursor: 0,
            scanner: JsonScanner::default(),
        }
    }

    /// 从策略名称创建，无法识别的名称按 `word` 处理
    pub fn with_strategy_name(name: &str) -> Self {
        Self::new(AggregationStrategy::parse(name))
    }

    pub fn strategy(&self) -> AggregationStrategy {
        self.strategy
    }

    /// 尚未输出的缓冲内容
    pub fn pending(&self) -> &str {
        &self.buffer[self.cursor..]
    }

    /// 追加一个文本块，返回新产生的完整片段
    pub fn append(&mut self, chunk: &str) -> Vec<String> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.buffer.push_str(chunk);

        match self.strategy {
            AggregationStrategy::Json => self.collect_json(),
            _ => self.collect_delimited(),
        }
    }

    /// 上游结束时调用，输出剩余内容
    ///
    /// `json` 策略下剩余的不完整内容原样输出，由下游判断是否为截断的 JSON。
    pub fn finish(&mut self) -> Vec<String> {
        match self.strategy {
            AggregationStrategy::Json => {
                let mut segments = self.collect_json();
                if !self.buffer.is_empty() {
                    debug!(
                        "[Aggregator] 流结束时残留 {} 字节未完成的 JSON",
                        self.buffer.len()
                    );
                    segments.push(std::mem::take(&mut self.buffer));
                    self.scanner.reset();
                }
                segments
            }
            _ => {
                if self.cursor >= self.buffer.len() {
                    return Vec::new();
                }
                let tail = self.buffer[self.cursor..].to_string();
                self.cursor = self.buffer.len();
                vec![tail]
            }
        }
    }

    /// 按边界字符切分未输出的内容
    fn collect_delimited(&mut self) -> Vec<String> {
        let mut segments = Vec::new();
        let mut start = self.cursor;

        for (offset, ch) in self.buffer[self.cursor..].char_indices() {
            let pos = self.cursor + offset;
            if !self.strategy.is_boundary(ch) {
                continue;
            }
            // 紧贴游标的边界字符不单独成段，留给下一段
            if pos == start {
                continue;
            }
            let end = pos + ch.len_utf8();
            segments.push(self.buffer[start..end].to_string());
            start = end;
        }

        self.cursor = start;
        segments
    }

    /// 循环提取缓冲区中所有完整的 JSON 值
    fn collect_json(&mut self) -> Vec<String> {
        let mut segments = Vec::new();

        loop {
            match self.scanner.scan(&self.buffer) {
                Scan::NoOpener => {
                    self.buffer.clear();
                    self.scanner.reset();
                    break;
                }
                Scan::Complete { start, end } => {
                    segments.push(self.buffer[start..=end].to_string());
                    self.buffer.drain(..=end);
                }
                Scan::Partial { start } => {
                    self.buffer.drain(..start);
                    self.scanner.shift(start);
                    break;
                }
                Scan::Mismatch { start, at } => {
                    debug!(
                        "[Aggregator] JSON 结束符不匹配: offset={}，保留 {} 字节等待后续输入",
                        at - start,
                        self.buffer.len() - start
                    );
                    self.buffer.drain(..start);
                    self.scanner.shift(start);
                    break;
                }
            }
        }

        segments
    }
}
