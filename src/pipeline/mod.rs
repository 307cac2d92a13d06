//! 管道执行引擎
//!
//! 单个后台任务按顺序读取输入项，渲染 Prompt，调用处理器，
//! 并把处理器推送的结果交给输出流：
//!
//! ```text
//! 输入通道 ──> [render_prompt] ──> [handle] ──> OutputSink ──> OutputStream ──> 消费者
//!                   │ 失败              │ 失败
//!                   └──── item.with_error(err) ────┘
//! ```
//!
//! # 保证
//!
//! - 每个输入项至少产生一个输出项或一个带错误的原始项，单项失败不会中断流
//! - 输出流只关闭一次：输入耗尽或上下文取消时
//! - 取消后不再读取新输入，并排空输入通道，避免上游生产者永久阻塞
//! - 同一管道内的处理器调用严格串行，按输入顺序执行

mod sink;


pub use sink::{OutputSink, OutputStream};

use crate::carrier::Carrier;
use crate::context;
use crate::error::{PipelineError, Result};
use crate::logger::sanitize_log_message;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 管道处理器 trait
///
/// 由两部分组成：Prompt 渲染与流式处理。处理器在执行过程中
/// 通过 `sink` 推送零个或多个结果，推送会在消费者取走前阻塞。
#[async_trait]
pub trait StageHandler<T: Carrier>: Send + Sync + 'static {
    /// 将输入项渲染为 Prompt
    fn render_prompt(&self, item: &T) -> Result<String>;

    /// 处理单个输入项
    ///
    /// 实现方应在每个等待点观察 `ctx`，取消后停止推送。
    async fn handle(
        &self,
        ctx: &CancellationToken,
        item: &T,
        prompt: &str,
        sink: &OutputSink<T>,
    ) -> Result<()>;
}

/// 单次运行统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// 读取的输入项数
    pub items_read: usize,
    /// 失败（被附加错误）的输入项数
    pub items_failed: usize,
    /// 被消费者取走的输出项数
    pub items_emitted: usize,
    /// 取消或输出关闭后被丢弃的输入项数
    pub items_drained: usize,
    /// 是否因取消而结束
    pub cancelled: bool,
}

/// 一次管道运行
pub struct PipelineRun<T> {
    output: OutputStream<T>,
    worker: JoinHandle<RunStats>,
}

impl<T: Carrier> PipelineRun<T> {
    /// 拆分为输出流和工作任务句柄
    pub fn into_parts(self) -> (OutputStream<T>, JoinHandle<RunStats>) {
        (self.output, self.worker)
    }

    /// 消费全部输出并等待工作任务结束
    pub async fn collect(self) -> Result<(Vec<T>, RunStats)> {
        use futures::StreamExt;
        let items: Vec<T> = self.output.collect().await;
        let stats = self
            .worker
            .await
            .map_err(|e| PipelineError::Stream(format!("管道任务异常退出: {}", e)))?;
        Ok((items, stats))
    }
}

/// 管道执行引擎
pub struct Pipeline<H> {
    handler: Arc<H>,
    ctx: Option<CancellationToken>,
}

impl<H> Pipeline<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            ctx: None,
        }
    }

    /// 设置执行上下文，未设置时使用永不取消的上下文
    pub fn with_context(mut self, ctx: CancellationToken) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// 启动一次运行
    ///
    /// 必须在 tokio 运行时内调用
    pub fn run<T>(&self, input: mpsc::Receiver<T>) -> PipelineRun<T>
    where
        T: Carrier,
        H: StageHandler<T>,
    {
        run(self.ctx.clone(), input, self.handler.clone())
    }
}

/// 启动管道工作任务，返回输出流
pub fn run<T, H>(
    ctx: Option<CancellationToken>,
    input: mpsc::Receiver<T>,
    handler: Arc<H>,
) -> PipelineRun<T>
where
    T: Carrier,
    H: StageHandler<T>,
{
    let ctx = context::or_background(ctx);
    let (sink, output) = sink::handoff(ctx.clone());
    let worker = tokio::spawn(work(ctx, input, handler, sink));
    PipelineRun { output, worker }
}

/// 工作任务主循环
async fn work<T, H>(
    ctx: CancellationToken,
    mut input: mpsc::Receiver<T>,
    handler: Arc<H>,
    sink: OutputSink<T>,
) -> RunStats
where
    T: Carrier,
    H: StageHandler<T>,
{
    let mut stats = RunStats::default();
    let mut exhausted = false;
    debug!("[Pipeline] 工作任务启动");

    loop {
        if sink.is_closed() {
            warn!("[Pipeline] 输出流已被丢弃，停止处理");
            break;
        }

        let item = tokio::select! {
            biased;
            _ = ctx.cancelled() => break,
            next = input.recv() => match next {
                Some(item) => item,
                None => {
                    exhausted = true;
                    break;
                }
            },
        };
        stats.items_read += 1;

        let err = match process_item(&ctx, handler.as_ref(), &item, &sink).await {
            Ok(()) => continue,
            Err(e) => e,
        };
        // 运行上下文取消才结束运行，处理器内部派生上下文的取消按单项失败处理
        if ctx.is_cancelled() {
            break;
        }
        if sink.is_closed() {
            debug!("[Pipeline] 输出流已被丢弃，第 {} 项中止", stats.items_read);
            break;
        }

        stats.items_failed += 1;
        if err.is_cancelled() {
            warn!("[Pipeline] 第 {} 项被处理器取消", stats.items_read);
        } else {
            warn!(
                error_type = %err.error_type(),
                "[Pipeline] 第 {} 项处理失败: {}",
                stats.items_read,
                sanitize_log_message(&err.to_string())
            );
        }

        if let Err(push_err) = sink.push(item.with_error(&err)).await {
            debug!("[Pipeline] 错误项推送中止: {}", push_err);
            break;
        }
    }

    stats.cancelled = ctx.is_cancelled();
    if !exhausted {
        stats.items_drained = drain(&mut input).await;
    }
    stats.items_emitted = sink.pushed();

    info!(
        "[Pipeline] 运行结束: read={}, failed={}, emitted={}, drained={}, cancelled={}",
        stats.items_read,
        stats.items_failed,
        stats.items_emitted,
        stats.items_drained,
        stats.cancelled
    );
    stats
}

/// 处理单个输入项：渲染失败或处理器失败都返回错误，由调用方附加到原始项
async fn process_item<T, H>(
    ctx: &CancellationToken,
    handler: &H,
    item: &T,
    sink: &OutputSink<T>,
) -> Result<()>
where
    T: Carrier,
    H: StageHandler<T>,
{
    let prompt = handler.render_prompt(item)?;

    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(PipelineError::Cancelled),
        result = handler.handle(ctx, item, &prompt, sink) => result,
    }
}

/// 关闭输入通道并丢弃所有剩余项
///
/// 关闭后阻塞在发送上的生产者会立即收到错误，不会永久等待。
async fn drain<T>(input: &mut mpsc::Receiver<T>) -> usize {
    input.close();
    let mut drained = 0;
    while input.recv().await.is_some() {
        drained += 1;
    }
    if drained > 0 {
        debug!("[Pipeline] 已丢弃 {} 个未处理的输入项", drained);
    }
    drained
}
