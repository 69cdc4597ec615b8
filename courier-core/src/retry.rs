//! 重试装饰
//!
//! `RetryDecorator` 将任意 `RetryableOperation` 交给 `RetryPolicy` 执行，自身无状态，可多层叠加。
//! 管线在请求可见 `dyn RetryPolicy` 服务时，以装饰器包裹“激活 + 调用”处理器。
//!
use crate::error::{CourierError, CourierResult};
use crate::response::HandlerResponse;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 可重复执行的操作
#[async_trait]
pub trait RetryableOperation: Send + Sync {
    async fn execute(&self, cancel: &CancellationToken) -> CourierResult<HandlerResponse>;
}

/// 重试策略
#[async_trait]
pub trait RetryPolicy: Send + Sync {
    async fn execute(
        &self,
        operation: &dyn RetryableOperation,
        cancel: &CancellationToken,
    ) -> CourierResult<HandlerResponse>;
}

pub struct RetryDecorator<O> {
    policy: Arc<dyn RetryPolicy>,
    inner: O,
}

impl<O: RetryableOperation> RetryDecorator<O> {
    pub fn new(policy: Arc<dyn RetryPolicy>, inner: O) -> Self {
        Self { policy, inner }
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

#[async_trait]
impl<O: RetryableOperation> RetryableOperation for RetryDecorator<O> {
    async fn execute(&self, cancel: &CancellationToken) -> CourierResult<HandlerResponse> {
        self.policy.execute(&self.inner, cancel).await
    }
}

/// 只执行一次
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRetryPolicy;

#[async_trait]
impl RetryPolicy for NoRetryPolicy {
    async fn execute(
        &self,
        operation: &dyn RetryableOperation,
        cancel: &CancellationToken,
    ) -> CourierResult<HandlerResponse> {
        operation.execute(cancel).await
    }
}

/// 指数退避配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// 总尝试次数（含首次）
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    /// 第 `attempt` 次失败后的等待时间（attempt 从 1 开始）
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }
}

type RetryPredicate = Arc<dyn Fn(&CourierError) -> bool + Send + Sync>;

/// 指数退避重试
///
/// 参数守卫与取消类故障从不重试；其余故障由谓词决定（默认全部重试）。
/// 等待期间取消会立即返回最近一次的故障。
#[derive(Clone)]
pub struct BackoffRetryPolicy {
    settings: RetrySettings,
    retry_if: RetryPredicate,
}

impl BackoffRetryPolicy {
    pub fn new(settings: RetrySettings) -> CourierResult<Self> {
        if settings.max_attempts == 0 {
            return Err(CourierError::ArgumentOutOfRange {
                name: "max_attempts",
                value: settings.max_attempts.to_string(),
            });
        }
        if settings.multiplier.is_nan() || settings.multiplier < 1.0 {
            return Err(CourierError::ArgumentOutOfRange {
                name: "multiplier",
                value: settings.multiplier.to_string(),
            });
        }
        Ok(Self {
            settings,
            retry_if: Arc::new(|_| true),
        })
    }

    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CourierError) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Arc::new(predicate);
        self
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    fn should_retry(&self, error: &CourierError) -> bool {
        !error.is_cancelled() && !error.is_guard() && (self.retry_if)(error)
    }
}

#[async_trait]
impl RetryPolicy for BackoffRetryPolicy {
    async fn execute(
        &self,
        operation: &dyn RetryableOperation,
        cancel: &CancellationToken,
    ) -> CourierResult<HandlerResponse> {
        let mut attempt = 1;
        loop {
            let error = match operation.execute(cancel).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };
            if attempt >= self.settings.max_attempts || !self.should_retry(&error) {
                return Err(error);
            }

            let delay = self.settings.delay_for_attempt(attempt);
            tracing::warn!(
                attempt,
                max_attempts = self.settings.max_attempts,
                delay.ms = delay.as_millis() as u64,
                error = %error,
                "operation failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(error),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
