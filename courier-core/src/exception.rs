//! 异常处理链
//!
//! 管线内（过滤器或处理器）产生的故障依次经过：
//! 1. 异常过滤器：全局 + 描述符声明，按声明顺序的逆序执行，可设置响应或替换故障；
//! 2. 异常日志：所有日志器都会收到通知，取消类故障不记录；
//! 3. 异常处理器：无响应且非取消时调用，未配置时使用透传处理器。
//!
//! 结束时若已设置响应则返回该响应，否则原样返回当前故障（未替换即原始故障）。
//! 各步骤中的 panic 被捕获：过滤器与处理器的 panic 替换故障，日志器的 panic 仅记录。
//!
use crate::config::ProcessorConfiguration;
use crate::context::FilterContext;
use crate::descriptor::HandlerDescriptor;
use crate::error::{CourierError, CourierResult};
use crate::filter::{Filter, FilterChain, Terminal};
use crate::request::HandlerRequest;
use crate::response::HandlerResponse;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 异常处理上下文
pub struct ExceptionContext {
    fault: CourierError,
    replaced: bool,
    request: Arc<HandlerRequest>,
    descriptor: Option<Arc<HandlerDescriptor>>,
    response: Option<HandlerResponse>,
}

impl ExceptionContext {
    pub fn new(
        fault: CourierError,
        request: Arc<HandlerRequest>,
        descriptor: Option<Arc<HandlerDescriptor>>,
    ) -> Self {
        Self {
            fault,
            replaced: false,
            request,
            descriptor,
            response: None,
        }
    }

    pub fn fault(&self) -> &CourierError {
        &self.fault
    }

    /// 以新故障替换当前故障
    pub fn replace_fault(&mut self, fault: CourierError) {
        self.fault = fault;
        self.replaced = true;
    }

    pub fn is_replaced(&self) -> bool {
        self.replaced
    }

    pub fn is_cancellation(&self) -> bool {
        self.fault.is_cancelled()
    }

    pub fn request(&self) -> &Arc<HandlerRequest> {
        &self.request
    }

    pub fn descriptor(&self) -> Option<&Arc<HandlerDescriptor>> {
        self.descriptor.as_ref()
    }

    pub fn handler_name(&self) -> Option<&'static str> {
        self.descriptor.as_ref().map(|d| d.handler_name())
    }

    pub fn response(&self) -> Option<&HandlerResponse> {
        self.response.as_ref()
    }

    pub fn set_response(&mut self, response: HandlerResponse) {
        self.response = Some(response);
    }

    fn into_outcome(self) -> CourierResult<HandlerResponse> {
        match self.response {
            Some(response) => Ok(response),
            None => Err(self.fault),
        }
    }
}

impl FilterContext for ExceptionContext {
    fn has_response(&self) -> bool {
        self.response.is_some()
    }
}

/// 异常日志器
#[async_trait]
pub trait ExceptionLogger: Send + Sync {
    async fn log(&self, ctx: &ExceptionContext, cancel: &CancellationToken);
}

/// 异常处理器：可设置响应以吞掉故障，返回错误则替换故障
#[async_trait]
pub trait ExceptionHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &mut ExceptionContext,
        cancel: &CancellationToken,
    ) -> CourierResult<()>;
}

/// 以 `tracing::error!` 输出故障
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingExceptionLogger;

#[async_trait]
impl ExceptionLogger for TracingExceptionLogger {
    async fn log(&self, ctx: &ExceptionContext, _cancel: &CancellationToken) {
        tracing::error!(
            request_id = %ctx.request().id(),
            message = ctx.request().message_name(),
            handler = ctx.handler_name().unwrap_or("-"),
            replaced = ctx.is_replaced(),
            error = %ctx.fault(),
            "unhandled fault in dispatch pipeline"
        );
    }
}

/// 透传：不设置响应，故障原样返回
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThroughExceptionHandler;

#[async_trait]
impl ExceptionHandler for PassThroughExceptionHandler {
    async fn handle(
        &self,
        _ctx: &mut ExceptionContext,
        _cancel: &CancellationToken,
    ) -> CourierResult<()> {
        Ok(())
    }
}

/// 异常过滤器链的终端：不做任何事
struct Unwound;

#[async_trait]
impl Terminal<ExceptionContext> for Unwound {
    async fn call(
        &self,
        _ctx: &mut ExceptionContext,
        _cancel: &CancellationToken,
    ) -> CourierResult<()> {
        Ok(())
    }
}

/// 一次故障处理所需的组件
pub struct ExceptionChain<'a> {
    filters: Vec<Arc<dyn Filter<ExceptionContext>>>,
    loggers: &'a [Arc<dyn ExceptionLogger>],
    handler: &'a dyn ExceptionHandler,
}

impl<'a> ExceptionChain<'a> {
    /// 描述符存在时使用其（已合并全局的）异常过滤器，否则仅使用全局异常过滤器
    pub fn new(
        configuration: &'a ProcessorConfiguration,
        descriptor: Option<&HandlerDescriptor>,
    ) -> Self {
        let declared = match descriptor {
            Some(d) => d.exception_filters(),
            None => configuration.exception_filters(),
        };
        Self {
            filters: declared.iter().rev().cloned().collect(),
            loggers: configuration.exception_loggers(),
            handler: configuration.exception_handler(),
        }
    }

    pub async fn handle(
        &self,
        mut ctx: ExceptionContext,
        cancel: &CancellationToken,
    ) -> CourierResult<HandlerResponse> {
        let cancellation = ctx.is_cancellation();
        let source = ctx
            .handler_name()
            .unwrap_or_else(|| ctx.request().message_name());

        let filtered = FilterChain::build(&self.filters, &Unwound, cancel).invoke(&mut ctx);
        match AssertUnwindSafe(filtered).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(fault)) => ctx.replace_fault(fault),
            Err(panic) => ctx.replace_fault(CourierError::panicked(source, panic.as_ref())),
        }

        if !cancellation {
            for logger in self.loggers {
                if let Err(panic) = AssertUnwindSafe(logger.log(&ctx, cancel))
                    .catch_unwind()
                    .await
                {
                    let fault = CourierError::panicked(source, panic.as_ref());
                    tracing::error!(error = %fault, "exception logger panicked");
                }
            }
        }

        if !ctx.has_response() && !cancellation {
            match AssertUnwindSafe(self.handler.handle(&mut ctx, cancel))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(fault)) => ctx.replace_fault(fault),
                Err(panic) => ctx.replace_fault(CourierError::panicked(source, panic.as_ref())),
            }
        }

        ctx.into_outcome()
    }
}
