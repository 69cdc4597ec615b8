//! 队列运行器（QueueRunner）
//!
//! 单个循环：从接收端取出命令，重新进入与同步提交相同的过滤器 + 异常处理管线。
//! - 同一运行器内严格顺序处理，同一时刻只有一个命令在执行；
//! - 单个命令的故障（包括 panic）被转换为 `Failed` 响应，循环继续；
//! - 取消或接收端完成后退出，返回本次运行的统计。
//!
use async_trait::async_trait;
use courier_core::{
    CommandProcessor, CommandReceiver, CourierError, HandlerResponse, ResponseFault,
};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// 出队命令的响应去向（由宿主决定记录到哪里）
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn record(
        &self,
        envelope_id: Uuid,
        message_name: &'static str,
        response: &HandlerResponse,
    );
}

/// 运行器退出时的统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunnerReport {
    pub runner_id: usize,
    pub processed: usize,
    pub failed: usize,
}

pub struct QueueRunner {
    id: usize,
    receiver: Arc<dyn CommandReceiver>,
    processor: CommandProcessor,
    sink: Option<Arc<dyn ResponseSink>>,
    receive_error_backoff: Duration,
}

impl QueueRunner {
    pub fn new(
        id: usize,
        receiver: Arc<dyn CommandReceiver>,
        processor: CommandProcessor,
        sink: Option<Arc<dyn ResponseSink>>,
        receive_error_backoff: Duration,
    ) -> Self {
        Self {
            id,
            receiver,
            processor,
            sink,
            receive_error_backoff,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub async fn run(self, cancel: CancellationToken) -> RunnerReport {
        let mut report = RunnerReport {
            runner_id: self.id,
            ..RunnerReport::default()
        };
        tracing::debug!(runner = self.id, "queue runner started");

        while !cancel.is_cancelled() && !self.receiver.is_completed() {
            let envelope = match self.receiver.receive(&cancel).await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(runner = self.id, error = %err, "failed to receive command");
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.receive_error_backoff) => {}
                    }
                    continue;
                }
            };

            let envelope_id = envelope.id();
            let message_name = envelope.message_name();
            let span = tracing::info_span!(
                "queue_runner.process",
                runner = self.id,
                request_id = %envelope_id,
                message = message_name
            );

            let processing = self.processor.process_envelope(envelope, &cancel);
            let processed = match AssertUnwindSafe(processing)
                .catch_unwind()
                .instrument(span)
                .await
            {
                Ok(processed) => processed,
                Err(panic) => Err(CourierError::panicked(message_name, panic.as_ref())),
            };

            let response = match processed {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(
                        runner = self.id,
                        request_id = %envelope_id,
                        message = message_name,
                        error = %err,
                        "queued command faulted"
                    );
                    HandlerResponse::failed(ResponseFault::from_error(message_name, &err))
                }
            };

            report.processed += 1;
            if response.is_failed() {
                report.failed += 1;
            }

            match &self.sink {
                Some(sink) => {
                    let recorded = sink.record(envelope_id, message_name, &response);
                    if let Err(panic) = AssertUnwindSafe(recorded).catch_unwind().await {
                        let fault = CourierError::panicked(message_name, panic.as_ref());
                        tracing::error!(
                            runner = self.id,
                            request_id = %envelope_id,
                            error = %fault,
                            "response sink panicked"
                        );
                    }
                }
                None => tracing::debug!(
                    runner = self.id,
                    request_id = %envelope_id,
                    failed = response.is_failed(),
                    "response discarded"
                ),
            }
        }

        tracing::debug!(
            runner = self.id,
            processed = report.processed,
            failed = report.failed,
            "queue runner stopped"
        );
        report
    }
}
