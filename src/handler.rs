//! 流式处理器
//!
//! 把数据源、分段聚合器和输出端连接起来：
//!
//! ```text
//! Prompt ──> [ChunkSource] ──> 原始文本块 ──> [SegmentAggregator] ──> 片段 ──> T::from_text ──> OutputSink
//! ```

use crate::aggregator::{AggregationStrategy, SegmentAggregator};
use crate::carrier::Carrier;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::{OutputSink, StageHandler};
use crate::prompt::PromptTemplate;
use crate::providers::ChunkSource;
use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 基于数据源的流式处理器
pub struct StreamingHandler<S> {
    source: S,
    template: PromptTemplate,
    strategy: AggregationStrategy,
}

impl<S: ChunkSource> StreamingHandler<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            template: PromptTemplate::default(),
            strategy: AggregationStrategy::default(),
        }
    }

    /// 根据管道配置创建
    pub fn from_config(source: S, config: &PipelineConfig) -> Self {
        Self {
            source,
            template: PromptTemplate::new(config.prompt_template.clone())
                .with_variables(config.variables.clone()),
            strategy: config.strategy,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_strategy(mut self, strategy: AggregationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[async_trait]
impl<T, S> StageHandler<T> for StreamingHandler<S>
where
    T: Carrier,
    S: ChunkSource,
{
    fn render_prompt(&self, item: &T) -> Result<String> {
        self.template.render(item)
    }

    async fn handle(
        &self,
        ctx: &CancellationToken,
        _item: &T,
        prompt: &str,
        sink: &OutputSink<T>,
    ) -> Result<()> {
        let mut chunks = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(PipelineError::Cancelled),
            opened = self.source.stream(ctx, prompt) => opened?,
        };

        // 每次调用独占一个聚合器
        let mut aggregator = SegmentAggregator::new(self.strategy);
        let mut chunk_count = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(PipelineError::Cancelled),
                next = chunks.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    chunk_count += 1;
                    for segment in aggregator.append(&chunk) {
                        sink.push(T::from_text(&segment)).await?;
                    }
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        for segment in aggregator.finish() {
            sink.push(T::from_text(&segment)).await?;
        }

        debug!(
            "[StreamingHandler] {} 完成: chunks={}, strategy={}",
            self.source.name(),
            chunk_count,
            self.strategy
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::TextItem;
    use crate::pipeline::Pipeline;
    use crate::providers::{EchoSource, StaticSource};
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn run_texts<S: ChunkSource>(
        handler: StreamingHandler<S>,
        inputs: &[&str],
    ) -> Vec<TextItem> {
        let (tx, rx) = mpsc::channel(inputs.len().max(1));
        for input in inputs {
            tx.send(TextItem::new(*input)).await.unwrap();
        }
        drop(tx);

        let (items, _stats) = Pipeline::new(handler).run(rx).collect().await.unwrap();
        items
    }

    #[tokio::test]
    async fn test_word_strategy_resegments_chunks() {
        let source = StaticSource::new(["Hel", "lo wo", "rld, fr", "iend"]);
        let items = run_texts(StreamingHandler::new(source), &["prompt"]).await;

        let texts: Vec<&str> = items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello ", "world,", " friend"]);
    }

    #[tokio::test]
    async fn test_json_strategy_extracts_values() {
        let source = StaticSource::new([
            "Here you go: {\"na",
            "me\":\"a\"} and {\"name\"",
            ":\"b\"}",
        ]);
        let handler = StreamingHandler::new(source).with_strategy(AggregationStrategy::Json);
        let items = run_texts(handler, &["list names"]).await;

        let texts: Vec<&str> = items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec![r#"{"name":"a"}"#, r#"{"name":"b"}"#]);
    }

    #[tokio::test]
    async fn test_transport_error_annotates_original_item() {
        let source = StaticSource::new(["partial "]).with_error("connection reset");
        let items = run_texts(StreamingHandler::new(source), &["question"]).await;

        // 出错前已推送的片段保留，随后是带错误的原始项
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], TextItem::new("partial "));
        assert_eq!(items[1].text, "question");
        assert!(items[1]
            .error
            .as_deref()
            .unwrap()
            .contains("connection reset"));
    }

    #[tokio::test]
    async fn test_template_and_echo_source() {
        let handler = StreamingHandler::new(EchoSource::new(3))
            .with_template(PromptTemplate::new("Q: {{text}}\n"))
            .with_strategy(AggregationStrategy::Line);
        let items = run_texts(handler, &["one", "two"]).await;

        let texts: Vec<&str> = items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["Q: one\n", "Q: two\n"]);
    }

    #[tokio::test]
    async fn test_render_error_from_template() {
        let handler = StreamingHandler::new(EchoSource::new(4))
            .with_template(PromptTemplate::new("{{missing}}"));
        let items = run_texts(handler, &["x"]).await;

        assert_eq!(items.len(), 1);
        assert!(items[0].is_error());
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = PipelineConfig {
            strategy: AggregationStrategy::Line,
            prompt_template: "{{prefix}}{{text}}".to_string(),
            variables: [("prefix".to_string(), "> ".to_string())].into_iter().collect(),
            ..Default::default()
        };
        let handler = StreamingHandler::from_config(EchoSource::new(1), &config);

        let (tx, rx) = config.input_channel();
        tx.send(TextItem::new("a\nb")).await.unwrap();
        drop(tx);
        let texts = Pipeline::new(handler).run(rx).into_parts().0.collect_texts().await;
        assert_eq!(texts, vec!["> a\n", "b"]);
    }

    #[tokio::test]
    async fn test_cancellation_stops_slow_source() {
        let source = StaticSource::new(["a ", "b ", "c "]).with_delay(Duration::from_secs(30));
        let ctx = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);
        tx.send(TextItem::new("go")).await.unwrap();

        let run = Pipeline::new(StreamingHandler::new(source))
            .with_context(ctx.clone())
            .run(rx);
        let (output, worker) = run.into_parts();

        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("worker must stop waiting for the source")
            .unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.items_failed, 0);
        assert!(output.collect_texts().await.is_empty());
    }
}
