//! 输出交接点
//!
//! [`OutputSink`] 与 [`OutputStream`] 组成零容量的交接点：
//! 每次 `push` 都要等到消费者真正取走该项后才返回，
//! 因此生产速度严格受限于消费速度。等待期间始终监听取消信号。

use crate::error::{PipelineError, Result};
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// 交接项：数据 + 消费确认
type Handoff<T> = (T, oneshot::Sender<()>);

/// 创建一对交接端点
pub(crate) fn handoff<T>(ctx: CancellationToken) -> (OutputSink<T>, OutputStream<T>) {
    let (tx, rx) = mpsc::channel(1);
    let sink = OutputSink {
        tx,
        ctx: ctx.clone(),
        pushed: AtomicUsize::new(0),
    };
    let stream = OutputStream {
        rx,
        ctx,
        done: false,
    };
    (sink, stream)
}

/// 输出端句柄，由管道工作任务持有并借给处理器
#[derive(Debug)]
pub struct OutputSink<T> {
    tx: mpsc::Sender<Handoff<T>>,
    ctx: CancellationToken,
    pushed: AtomicUsize,
}

impl<T> OutputSink<T> {
    /// 推送一项，直到消费者取走才返回
    ///
    /// 取消先于交接完成时放弃推送并返回 [`PipelineError::Cancelled`]。
    pub async fn push(&self, item: T) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();

        tokio::select! {
            biased;
            _ = self.ctx.cancelled() => return Err(PipelineError::Cancelled),
            sent = self.tx.send((item, ack_tx)) => {
                if sent.is_err() {
                    return Err(PipelineError::Stream("输出流已关闭".to_string()));
                }
            }
        }

        tokio::select! {
            biased;
            _ = self.ctx.cancelled() => Err(PipelineError::Cancelled),
            ack = ack_rx => match ack {
                Ok(()) => {
                    self.pushed.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
                Err(_) => Err(PipelineError::Stream("输出流已关闭".to_string())),
            },
        }
    }

    /// 消费者是否已丢弃输出流
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// 已被消费者取走的项数
    pub fn pushed(&self) -> usize {
        self.pushed.load(Ordering::Relaxed)
    }
}

/// 管道输出流
///
/// 工作任务退出后关闭；上下文取消后不再产出任何项。
#[derive(Debug)]
pub struct OutputStream<T> {
    rx: mpsc::Receiver<Handoff<T>>,
    ctx: CancellationToken,
    done: bool,
}

impl<T> Stream for OutputStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        if self.ctx.is_cancelled() {
            self.done = true;
            self.rx.close();
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some((item, ack))) => {
                let _ = ack.send(());
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: crate::carrier::Carrier> OutputStream<T> {
    /// 收集所有输出项的文本
    pub async fn collect_texts(self) -> Vec<String> {
        use futures::StreamExt;
        self.map(|item| item.to_text()).collect().await
    }
}
