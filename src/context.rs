//! 执行上下文
//!
//! 管道使用 [`CancellationToken`] 作为可取消的执行上下文。
//! 核心本身不设超时，需要截止时间的调用方通过 [`with_timeout`] 派生子令牌。

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 创建永不取消的根上下文
pub fn background() -> CancellationToken {
    CancellationToken::new()
}

/// 未提供上下文时使用永不取消的根上下文
pub fn or_background(ctx: Option<CancellationToken>) -> CancellationToken {
    ctx.unwrap_or_else(background)
}

/// 派生一个在 `timeout` 后自动取消的子上下文
///
/// 父上下文取消时子上下文同样取消。必须在 tokio 运行时内调用。
///
/// 计时任务在截止时间到达或子上下文被取消时结束。只丢弃子上下文不会结束计时任务，
/// 提前完成的调用方应调用 `cancel()` 释放它。
pub fn with_timeout(parent: &CancellationToken, timeout: Duration) -> CancellationToken {
    let child = parent.child_token();
    let timer = child.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                tracing::debug!("[Context] 超时 {}ms，取消上下文", timeout.as_millis());
                timer.cancel();
            }
            _ = timer.cancelled() => {}
        }
    });

    child
}
