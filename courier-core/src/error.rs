//! 分发管线统一错误定义
//!
//! 覆盖参数守卫、处理器解析/激活、执行期故障与队列四类，
//! 处理器与工厂返回的 `anyhow::Error` 通过 `Unhandled` 透明承载。
//!
use std::any::Any;
use thiserror::Error;

/// 可跨线程传递的装箱错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CourierError {
    // --- 参数守卫 ---
    #[error("invalid argument: {name}, reason={reason}")]
    InvalidArgument { name: &'static str, reason: String },
    #[error("argument out of range: {name}, value={value}")]
    ArgumentOutOfRange { name: &'static str, value: String },

    // --- 处理器解析/激活 ---
    #[error("handler not found: {message_type}")]
    HandlerNotFound { message_type: &'static str },
    #[error("ambiguous handler: message={message_type}, handlers={handlers:?}")]
    AmbiguousHandler {
        message_type: &'static str,
        handlers: Vec<&'static str>,
    },
    #[error("handler activation failed: handler={handler}, reason={source}")]
    HandlerActivation {
        handler: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    // --- 执行 ---
    #[error("operation cancelled")]
    Cancelled,
    #[error("invalid operation: {reason}")]
    InvalidOperation { reason: String },
    #[error("handler panicked: handler={handler}, reason={reason}")]
    HandlerPanicked { handler: &'static str, reason: String },
    #[error("response faulted: message={message}, reason={reason}")]
    Faulted { message: &'static str, reason: String },

    // --- 队列 ---
    #[error("queue completed")]
    QueueCompleted,
    #[error("queue error: {reason}")]
    Queue { reason: String },

    // --- 通用 ---
    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

impl CourierError {
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        CourierError::InvalidOperation {
            reason: reason.into(),
        }
    }

    pub fn activation(handler: &'static str, source: impl Into<BoxError>) -> Self {
        CourierError::HandlerActivation {
            handler,
            source: source.into(),
        }
    }

    /// 将 `catch_unwind` 捕获的 panic 转换为故障
    pub fn panicked(handler: &'static str, panic: &(dyn Any + Send)) -> Self {
        let reason = if let Some(s) = panic.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        CourierError::HandlerPanicked { handler, reason }
    }

    /// 调用方主动取消
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CourierError::Cancelled)
    }

    /// 参数守卫失败：立即返回，不进入管线也不参与重试
    pub fn is_guard(&self) -> bool {
        matches!(
            self,
            CourierError::InvalidArgument { .. } | CourierError::ArgumentOutOfRange { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type CourierResult<T> = Result<T, CourierError>;
