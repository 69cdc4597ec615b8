use super::{Filter, Next};
use crate::context::{FilterContext, HandlerContext};
use crate::error::CourierResult;
use async_trait::async_trait;
use std::time::Instant;

/// 记录处理器执行耗时与结果
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingFilter;

#[async_trait]
impl Filter<HandlerContext> for LoggingFilter {
    async fn invoke(
        &self,
        ctx: &mut HandlerContext,
        next: Next<'_, HandlerContext>,
    ) -> CourierResult<()> {
        let request_id = ctx.request().id();
        let message = ctx.request().message_name();
        let handler = ctx.descriptor().handler_name();
        let start = Instant::now();

        tracing::debug!(%request_id, message, handler, "handler executing");

        let result = next.run(ctx).await;

        let elapsed = start.elapsed();
        match &result {
            Ok(()) => {
                tracing::info!(
                    %request_id,
                    message,
                    handler,
                    responded = ctx.has_response(),
                    duration.ms = elapsed.as_millis() as u64,
                    "handler executed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    %request_id,
                    message,
                    handler,
                    error = %e,
                    duration.ms = elapsed.as_millis() as u64,
                    "handler failed"
                );
            }
        }

        result
    }
}
