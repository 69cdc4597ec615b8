//! 队列契约与队列策略
//!
//! - `CommandEnvelope`：入队的命令项，沿用原请求 id；
//! - `CommandSender` / `CommandReceiver`：发送端与阻塞接收端契约；
//! - `QueuePolicy::try_enqueue`：命令处理前的策略步骤，`Queue` 时投递到请求可见的发送端并返回 `Accepted`。
//!
use crate::descriptor::QueuePolicy;
use crate::error::{CourierError, CourierResult};
use crate::message::Command;
use crate::request::HandlerRequest;
use crate::response::HandlerResponse;
use crate::services::ServiceArc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 队列中的命令项
#[derive(Clone)]
pub struct CommandEnvelope {
    id: Uuid,
    message: ServiceArc,
    message_type: TypeId,
    message_name: &'static str,
    enqueued_at: DateTime<Utc>,
}

impl CommandEnvelope {
    pub fn new<C: Command>(command: C) -> Self {
        Self {
            id: Uuid::new_v4(),
            message: Arc::new(command),
            message_type: TypeId::of::<C>(),
            message_name: C::NAME,
            enqueued_at: Utc::now(),
        }
    }

    pub fn from_request(request: &HandlerRequest) -> Self {
        Self {
            id: request.id(),
            message: request.message().clone(),
            message_type: request.message_type(),
            message_name: request.message_name(),
            enqueued_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn message(&self) -> &ServiceArc {
        &self.message
    }

    pub fn downcast_ref<C: Command>(&self) -> Option<&C> {
        self.message.downcast_ref::<C>()
    }

    pub fn message_type(&self) -> TypeId {
        self.message_type
    }

    pub fn message_name(&self) -> &'static str {
        self.message_name
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }
}

impl fmt::Debug for CommandEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEnvelope")
            .field("id", &self.id)
            .field("message", &self.message_name)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

/// 队列发送端
#[async_trait]
pub trait CommandSender: Send + Sync {
    async fn send(&self, envelope: CommandEnvelope, cancel: &CancellationToken)
    -> CourierResult<()>;
}

/// 队列接收端
///
/// - `receive`：阻塞直到有命令、队列完成且已排空，或取消；后两种返回 `None`；
/// - `is_completed`：已调用 `complete` 且没有剩余命令；
/// - `complete`：停止接收新命令，已入队的命令仍可取出。幂等。
#[async_trait]
pub trait CommandReceiver: Send + Sync {
    async fn receive(&self, cancel: &CancellationToken) -> CourierResult<Option<CommandEnvelope>>;

    fn is_completed(&self) -> bool;

    fn complete(&self);
}

impl QueuePolicy {
    /// 返回 `None` 表示本步骤不处理，继续同步执行
    pub async fn try_enqueue(
        self,
        request: &HandlerRequest,
        cancel: &CancellationToken,
    ) -> CourierResult<Option<HandlerResponse>> {
        match self {
            QueuePolicy::NoQueue => Ok(None),
            QueuePolicy::Queue => {
                let sender = request.services().get::<dyn CommandSender>().ok_or_else(|| {
                    CourierError::invalid_operation(format!(
                        "{} requires a command sender to be queued",
                        request.message_name()
                    ))
                })?;
                sender
                    .send(CommandEnvelope::from_request(request), cancel)
                    .await?;
                tracing::info!(
                    request_id = %request.id(),
                    message = request.message_name(),
                    "command queued for deferred processing"
                );
                Ok(Some(HandlerResponse::accepted(
                    request.id(),
                    request.message_name(),
                )))
            }
        }
    }
}
