//! 处理结果
//!
//! - `Completed`：处理器同步完成，携带类型擦除的返回值；
//! - `Accepted`：命令已入队，稍后由队列运行器处理；
//! - `Failed`：由运行器或过滤器合成的失败响应，保留出处信息。
//!
use crate::error::{CourierError, CourierResult};
use std::any::{Any, type_name};
use std::fmt;
use uuid::Uuid;

/// 类型擦除的返回值
pub struct Payload {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn downcast<T: 'static>(self) -> CourierResult<T> {
        let found = self.type_name;
        self.value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| CourierError::TypeMismatch {
                expected: type_name::<T>(),
                found,
            })
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// 失败响应：记录消息、处理器与原因
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseFault {
    pub message_name: &'static str,
    pub handler_name: Option<&'static str>,
    pub reason: String,
    pub cancelled: bool,
}

impl ResponseFault {
    pub fn new(message_name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            message_name,
            handler_name: None,
            reason: reason.into(),
            cancelled: false,
        }
    }

    pub fn from_error(message_name: &'static str, error: &CourierError) -> Self {
        Self {
            message_name,
            handler_name: None,
            reason: error.to_string(),
            cancelled: error.is_cancelled(),
        }
    }

    pub fn with_handler(mut self, handler_name: &'static str) -> Self {
        self.handler_name = Some(handler_name);
        self
    }
}

#[derive(Debug)]
pub enum HandlerResponse {
    Completed(Payload),
    Accepted {
        request_id: Uuid,
        message_name: &'static str,
    },
    Failed(ResponseFault),
}

impl HandlerResponse {
    pub fn completed<T: Send + Sync + 'static>(value: T) -> Self {
        HandlerResponse::Completed(Payload::new(value))
    }

    pub fn accepted(request_id: Uuid, message_name: &'static str) -> Self {
        HandlerResponse::Accepted {
            request_id,
            message_name,
        }
    }

    pub fn failed(fault: ResponseFault) -> Self {
        HandlerResponse::Failed(fault)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, HandlerResponse::Completed(_))
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, HandlerResponse::Accepted { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, HandlerResponse::Failed(_))
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            HandlerResponse::Completed(payload) => Some(payload),
            _ => None,
        }
    }

    /// 提取强类型返回值；入队与失败响应都视为错误
    pub fn into_output<T: 'static>(self) -> CourierResult<T> {
        match self {
            HandlerResponse::Completed(payload) => payload.downcast::<T>(),
            HandlerResponse::Accepted { message_name, .. } => Err(CourierError::invalid_operation(
                format!("{message_name} was accepted for deferred processing"),
            )),
            HandlerResponse::Failed(fault) => Err(CourierError::Faulted {
                message: fault.message_name,
                reason: fault.reason,
            }),
        }
    }
}

/// 单个事件处理器的执行结果
#[derive(Debug)]
pub struct HandlerOutcome {
    pub handler_name: &'static str,
    pub result: CourierResult<()>,
}

/// 事件发布报告
#[derive(Debug)]
pub struct PublishReport {
    pub event_name: &'static str,
    pub outcomes: Vec<HandlerOutcome>,
}

impl PublishReport {
    pub fn handled(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &HandlerOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// 取第一个失败（按处理器声明顺序）
    pub fn into_result(self) -> CourierResult<()> {
        self.outcomes
            .into_iter()
            .map(|o| o.result)
            .find(|r| r.is_err())
            .unwrap_or(Ok(()))
    }
}
