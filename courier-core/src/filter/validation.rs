use super::{Filter, Next};
use crate::context::HandlerContext;
use crate::error::CourierResult;
use crate::request::HandlerRequest;
use crate::response::{HandlerResponse, ResponseFault};
use async_trait::async_trait;

/// 消息校验服务（以 `dyn Validator` 注册到服务表或请求覆盖层）
pub trait Validator: Send + Sync {
    fn validate(&self, request: &HandlerRequest) -> bool;
}

/// 校验过滤器
///
/// 未注册 `Validator` 时直接放行。校验失败时：
/// - `abort_on_invalid_command = true`：设置失败响应，处理器不再执行；
/// - 否则仅记录告警并继续。
#[derive(Clone, Copy, Debug, Default)]
pub struct ValidationFilter;

#[async_trait]
impl Filter<HandlerContext> for ValidationFilter {
    async fn invoke(
        &self,
        ctx: &mut HandlerContext,
        next: Next<'_, HandlerContext>,
    ) -> CourierResult<()> {
        let valid = match ctx.services().get::<dyn Validator>() {
            Some(validator) => validator.validate(ctx.request()),
            None => true,
        };

        if !valid {
            let request = ctx.request();
            let abort = request.configuration().settings().abort_on_invalid_command;
            tracing::warn!(
                request_id = %request.id(),
                message = request.message_name(),
                abort,
                "message failed validation"
            );
            if abort {
                let fault = ResponseFault::new(request.message_name(), "validation failed")
                    .with_handler(ctx.descriptor().handler_name());
                ctx.set_response(HandlerResponse::failed(fault));
            }
        }

        next.run(ctx).await
    }
}
