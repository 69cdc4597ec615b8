//! 处理器抽象
//!
//! 强类型的 `CommandHandler` / `EventHandler` 由使用方实现；
//! 描述符内部持有类型擦除的调用器，负责把实例与消息还原为具体类型后调用。
//!
use crate::context::HandlerContext;
use crate::error::{CourierError, CourierResult};
use crate::message::{Command, Event};
use crate::response::HandlerResponse;
use crate::services::ServiceArc;
use async_trait::async_trait;
use std::any::type_name;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

/// 命令处理器
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync + 'static {
    async fn handle(
        &self,
        command: &C,
        ctx: &HandlerContext,
        cancel: &CancellationToken,
    ) -> CourierResult<C::Output>;
}

/// 事件处理器
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync + 'static {
    async fn handle(
        &self,
        event: &E,
        ctx: &HandlerContext,
        cancel: &CancellationToken,
    ) -> CourierResult<()>;
}

#[async_trait]
pub(crate) trait HandlerInvoker: Send + Sync {
    async fn invoke(
        &self,
        instance: ServiceArc,
        ctx: &HandlerContext,
        cancel: &CancellationToken,
    ) -> CourierResult<HandlerResponse>;
}

pub(crate) struct CommandInvoker<C, H>(PhantomData<fn() -> (C, H)>);

impl<C, H> CommandInvoker<C, H> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<C, H> HandlerInvoker for CommandInvoker<C, H>
where
    C: Command,
    H: CommandHandler<C>,
{
    async fn invoke(
        &self,
        instance: ServiceArc,
        ctx: &HandlerContext,
        cancel: &CancellationToken,
    ) -> CourierResult<HandlerResponse> {
        let handler = downcast_handler::<H>(instance)?;
        let message = ctx.request().message().clone();
        let command = message
            .downcast_ref::<C>()
            .ok_or(CourierError::TypeMismatch {
                expected: type_name::<C>(),
                found: ctx.request().message_name(),
            })?;
        let output = handler.handle(command, ctx, cancel).await?;
        Ok(HandlerResponse::completed(output))
    }
}

pub(crate) struct EventInvoker<E, H>(PhantomData<fn() -> (E, H)>);

impl<E, H> EventInvoker<E, H> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<E, H> HandlerInvoker for EventInvoker<E, H>
where
    E: Event,
    H: EventHandler<E>,
{
    async fn invoke(
        &self,
        instance: ServiceArc,
        ctx: &HandlerContext,
        cancel: &CancellationToken,
    ) -> CourierResult<HandlerResponse> {
        let handler = downcast_handler::<H>(instance)?;
        let message = ctx.request().message().clone();
        let event = message
            .downcast_ref::<E>()
            .ok_or(CourierError::TypeMismatch {
                expected: type_name::<E>(),
                found: ctx.request().message_name(),
            })?;
        handler.handle(event, ctx, cancel).await?;
        Ok(HandlerResponse::completed(()))
    }
}

fn downcast_handler<H: Send + Sync + 'static>(
    instance: ServiceArc,
) -> CourierResult<std::sync::Arc<H>> {
    instance
        .downcast::<H>()
        .map_err(|_| CourierError::TypeMismatch {
            expected: type_name::<H>(),
            found: "resolved service",
        })
}
