//! 命令处理器（CommandProcessor）
//!
//! 一次命令提交的完整路径：
//! 1. 解析描述符（未找到/不唯一直接返回，不进入管线）；
//! 2. 队列策略：`Queue` 时投递并返回 `Accepted`（出队重放的请求跳过此步）；
//! 3. 过滤器链 → 终端（激活处理器并调用，可选重试装饰）；
//! 4. 管线内故障交给异常处理链，得到响应或原样返回故障。
//!
//! 事件发布对每个匹配的处理器独立执行第 3、4 步，受并发上限约束，结果按声明顺序汇总。
//!
use crate::activator::HandlerActivator;
use crate::config::ProcessorConfiguration;
use crate::context::HandlerContext;
use crate::descriptor::HandlerDescriptor;
use crate::error::{CourierError, CourierResult};
use crate::exception::{ExceptionChain, ExceptionContext};
use crate::filter::{FilterChain, Terminal};
use crate::message::{Command, Event, MessageKind};
use crate::queue::CommandEnvelope;
use crate::request::HandlerRequest;
use crate::response::{HandlerOutcome, HandlerResponse, PublishReport};
use crate::retry::{RetryDecorator, RetryPolicy, RetryableOperation};
use async_trait::async_trait;
use futures_util::{FutureExt, StreamExt, stream};
use std::any::TypeId;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// 命令/事件分发入口（克隆开销为一次引用计数）
#[derive(Clone)]
pub struct CommandProcessor {
    configuration: Arc<ProcessorConfiguration>,
}

impl CommandProcessor {
    pub fn new(configuration: ProcessorConfiguration) -> Self {
        Self::from_shared(Arc::new(configuration))
    }

    pub fn from_shared(configuration: Arc<ProcessorConfiguration>) -> Self {
        Self { configuration }
    }

    pub fn configuration(&self) -> &Arc<ProcessorConfiguration> {
        &self.configuration
    }

    /// 创建请求；调用方可在处理前写入请求级服务覆盖或属性
    pub fn create_request<C: Command>(&self, command: C) -> HandlerRequest {
        HandlerRequest::command(self.configuration.clone(), command)
    }

    pub async fn process<C: Command>(
        &self,
        command: C,
        cancel: &CancellationToken,
    ) -> CourierResult<HandlerResponse> {
        self.process_request(Arc::new(self.create_request(command)), cancel)
            .await
    }

    /// 处理并提取强类型结果
    pub async fn send<C: Command>(
        &self,
        command: C,
        cancel: &CancellationToken,
    ) -> CourierResult<C::Output> {
        self.process(command, cancel).await?.into_output::<C::Output>()
    }

    pub async fn process_request(
        &self,
        request: Arc<HandlerRequest>,
        cancel: &CancellationToken,
    ) -> CourierResult<HandlerResponse> {
        if request.kind() != MessageKind::Command {
            return Err(CourierError::InvalidArgument {
                name: "request",
                reason: format!("{} is an event and must be published", request.message_name()),
            });
        }

        let descriptor = self
            .configuration
            .descriptors()
            .resolve_command(request.message_type(), request.message_name())?;

        if !request.is_deferred() {
            if let Some(accepted) = descriptor
                .queue_policy()
                .try_enqueue(&request, cancel)
                .await?
            {
                return Ok(accepted);
            }
        }

        let span = tracing::debug_span!(
            "dispatch",
            request_id = %request.id(),
            message = request.message_name(),
            deferred = request.is_deferred()
        );
        self.execute(request, descriptor, cancel)
            .instrument(span)
            .await
    }

    /// 处理出队的命令（跳过队列策略）
    pub async fn process_envelope(
        &self,
        envelope: CommandEnvelope,
        cancel: &CancellationToken,
    ) -> CourierResult<HandlerResponse> {
        let request = HandlerRequest::from_envelope(self.configuration.clone(), envelope);
        self.process_request(Arc::new(request), cancel).await
    }

    /// 发布事件到所有匹配的处理器
    pub async fn publish<E: Event>(
        &self,
        event: E,
        cancel: &CancellationToken,
    ) -> CourierResult<PublishReport> {
        let descriptors = self
            .configuration
            .descriptors()
            .resolve_events(TypeId::of::<E>())
            .to_vec();

        if descriptors.is_empty() {
            tracing::debug!(event = E::NAME, "no handlers registered for event");
            return Ok(PublishReport {
                event_name: E::NAME,
                outcomes: Vec::new(),
            });
        }

        let request = Arc::new(HandlerRequest::event(self.configuration.clone(), event));
        let concurrency = self.configuration.settings().event_handler_concurrency.max(1);
        let processor = self.clone();
        let cancel = cancel.clone();

        let span = tracing::debug_span!(
            "publish",
            request_id = %request.id(),
            event = E::NAME,
            handlers = descriptors.len()
        );

        let outcomes = stream::iter(descriptors)
            .map(move |descriptor| {
                let processor = processor.clone();
                let request = request.clone();
                let cancel = cancel.clone();
                async move {
                    let handler_name = descriptor.handler_name();
                    let result = processor
                        .execute(request, descriptor, &cancel)
                        .await
                        .and_then(|response| match response {
                            HandlerResponse::Failed(fault) => Err(CourierError::Faulted {
                                message: fault.message_name,
                                reason: fault.reason,
                            }),
                            _ => Ok(()),
                        });
                    HandlerOutcome {
                        handler_name,
                        result,
                    }
                }
            })
            .buffered(concurrency)
            .collect::<Vec<_>>()
            .instrument(span)
            .await;

        Ok(PublishReport {
            event_name: E::NAME,
            outcomes,
        })
    }

    async fn execute(
        &self,
        request: Arc<HandlerRequest>,
        descriptor: Arc<HandlerDescriptor>,
        cancel: &CancellationToken,
    ) -> CourierResult<HandlerResponse> {
        tracing::debug!(handler = descriptor.handler_name(), "dispatching to handler");

        let mut ctx = HandlerContext::new(request.clone(), descriptor.clone());
        let terminal = InvokeHandler {
            activator: self.configuration.activator(),
        };
        let chain = FilterChain::build(descriptor.filters(), &terminal, cancel).invoke(&mut ctx);
        // 过滤器与处理器中的 panic 同样进入异常处理链
        let outcome = match AssertUnwindSafe(chain).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let fault = CourierError::panicked(descriptor.handler_name(), panic.as_ref());
                tracing::error!(
                    handler = descriptor.handler_name(),
                    error = %fault,
                    "dispatch pipeline panicked"
                );
                Err(fault)
            }
        };

        let fault = match outcome {
            Ok(()) => match ctx.take_response() {
                Some(response) => return Ok(response),
                None => CourierError::invalid_operation(format!(
                    "filter pipeline of {} completed without a response",
                    descriptor.handler_name()
                )),
            },
            Err(fault) => fault,
        };

        let chain = ExceptionChain::new(&self.configuration, Some(&descriptor));
        chain
            .handle(ExceptionContext::new(fault, request, Some(descriptor)), cancel)
            .await
    }
}

/// 过滤器链终端：激活并调用处理器
struct InvokeHandler<'a> {
    activator: &'a HandlerActivator,
}

#[async_trait]
impl Terminal<HandlerContext> for InvokeHandler<'_> {
    async fn call(&self, ctx: &mut HandlerContext, cancel: &CancellationToken) -> CourierResult<()> {
        if cancel.is_cancelled() {
            return Err(CourierError::Cancelled);
        }

        let policy = ctx.services().get::<dyn RetryPolicy>();
        let invocation = Invocation {
            ctx: &*ctx,
            activator: self.activator,
        };
        let response = match policy {
            Some(policy) => RetryDecorator::new(policy, invocation).execute(cancel).await?,
            None => invocation.execute(cancel).await?,
        };

        ctx.set_response(response);
        Ok(())
    }
}

/// 一次“激活 + 调用”，可被重试策略重复执行
struct Invocation<'a> {
    ctx: &'a HandlerContext,
    activator: &'a HandlerActivator,
}

#[async_trait]
impl RetryableOperation for Invocation<'_> {
    async fn execute(&self, cancel: &CancellationToken) -> CourierResult<HandlerResponse> {
        let descriptor = self.ctx.descriptor();
        let run = async {
            let instance = self.activator.create(self.ctx.request(), descriptor)?;
            descriptor.invoker().invoke(instance, self.ctx, cancel).await
        };

        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(CourierError::panicked(
                descriptor.handler_name(),
                panic.as_ref(),
            )),
        }
    }
}
