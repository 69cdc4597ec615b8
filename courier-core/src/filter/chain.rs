use crate::context::FilterContext;
use crate::error::CourierResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 过滤器：在上下文 `C` 上包裹下一层
#[async_trait]
pub trait Filter<C: FilterContext>: Send + Sync + 'static {
    async fn invoke(&self, ctx: &mut C, next: Next<'_, C>) -> CourierResult<()>;
}

/// 链末尾的终端动作
#[async_trait]
pub trait Terminal<C: FilterContext>: Send + Sync {
    async fn call(&self, ctx: &mut C, cancel: &CancellationToken) -> CourierResult<()>;
}

/// 链中剩余部分
pub struct Next<'a, C: FilterContext> {
    filters: &'a [Arc<dyn Filter<C>>],
    terminal: &'a dyn Terminal<C>,
    cancel: &'a CancellationToken,
}

impl<'a, C: FilterContext + 'static> Next<'a, C> {
    pub fn cancellation(&self) -> &'a CancellationToken {
        self.cancel
    }

    /// 剩余过滤器数量（不含终端）
    pub fn remaining(&self) -> usize {
        self.filters.len()
    }

    pub async fn run(self, ctx: &mut C) -> CourierResult<()> {
        match self.filters.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    filters: rest,
                    terminal: self.terminal,
                    cancel: self.cancel,
                };
                current.invoke(ctx, next).await
            }
            None if ctx.has_response() => Ok(()),
            None => self.terminal.call(ctx, self.cancel).await,
        }
    }
}

/// 已组装的过滤器链
pub struct FilterChain<'a, C: FilterContext> {
    filters: &'a [Arc<dyn Filter<C>>],
    terminal: &'a dyn Terminal<C>,
    cancel: &'a CancellationToken,
}

impl<'a, C: FilterContext + 'static> FilterChain<'a, C> {
    pub fn build(
        filters: &'a [Arc<dyn Filter<C>>],
        terminal: &'a dyn Terminal<C>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            filters,
            terminal,
            cancel,
        }
    }

    pub async fn invoke(self, ctx: &mut C) -> CourierResult<()> {
        // 无过滤器时直接调用终端
        if self.filters.is_empty() {
            return self.terminal.call(ctx, self.cancel).await;
        }
        Next {
            filters: self.filters,
            terminal: self.terminal,
            cancel: self.cancel,
        }
        .run(ctx)
        .await
    }
}
