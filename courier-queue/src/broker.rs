//! 命令调度器（CommandBroker）
//!
//! - 持有 N 个队列运行器（N = `parallelism`，必须大于 0），启动后各自独立并发运行；
//! - `BrokerHandle::join` 在所有运行器退出后返回，并允许调度器再次启动；
//!   直接丢弃句柄时，同样要等到运行器全部退出后才能再次启动；
//! - `complete` 转发到接收端，运行器处理完剩余命令后退出；
//! - 运行期间重复启动返回 `InvalidOperation`。
//!
use crate::runner::{QueueRunner, ResponseSink, RunnerReport};
use bon::bon;
use courier_core::{CommandProcessor, CommandReceiver, CourierError, CourierResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub parallelism: usize,
    pub receive_error_backoff_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            receive_error_backoff_ms: 1000,
        }
    }
}

impl BrokerConfig {
    pub fn receive_error_backoff(&self) -> Duration {
        Duration::from_millis(self.receive_error_backoff_ms)
    }
}

pub struct CommandBroker {
    config: BrokerConfig,
    receiver: Arc<dyn CommandReceiver>,
    processor: CommandProcessor,
    sink: Option<Arc<dyn ResponseSink>>,
    started: Arc<AtomicBool>,
}

#[bon]
impl CommandBroker {
    #[builder]
    pub fn new(
        receiver: Arc<dyn CommandReceiver>,
        processor: CommandProcessor,
        #[builder(default)] config: BrokerConfig,
        sink: Option<Arc<dyn ResponseSink>>,
    ) -> CourierResult<Self> {
        if config.parallelism == 0 {
            return Err(CourierError::ArgumentOutOfRange {
                name: "parallelism",
                value: config.parallelism.to_string(),
            });
        }
        Ok(Self {
            config,
            receiver,
            processor,
            sink,
            started: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl CommandBroker {
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// 启动全部运行器
    pub fn start(&self) -> CourierResult<BrokerHandle> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(CourierError::invalid_operation("command broker already started"));
        }

        let token = CancellationToken::new();
        let backoff = self.config.receive_error_backoff();
        let tasks = (0..self.config.parallelism)
            .map(|id| {
                let runner = QueueRunner::new(
                    id,
                    self.receiver.clone(),
                    self.processor.clone(),
                    self.sink.clone(),
                    backoff,
                );
                tokio::spawn(runner.run(token.child_token()))
            })
            .collect();

        tracing::info!(parallelism = self.config.parallelism, "command broker started");
        Ok(BrokerHandle {
            token,
            tasks,
            receiver: self.receiver.clone(),
            started: self.started.clone(),
        })
    }

    /// 停止接收新命令；运行器排空后退出
    pub fn complete(&self) {
        self.receiver.complete();
    }
}

/// 调度器运行句柄：完成、关闭与等待
pub struct BrokerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<RunnerReport>>,
    receiver: Arc<dyn CommandReceiver>,
    started: Arc<AtomicBool>,
}

impl BrokerHandle {
    pub fn complete(&self) {
        self.receiver.complete();
    }

    /// 立即取消所有运行器；正在执行的命令会收到取消信号
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) -> Vec<RunnerReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());

        // 逐个等待后再移出；join 被中途丢弃时剩余任务仍由 Drop 接管
        while let Some(task) = self.tasks.first_mut() {
            let joined = task.await;
            self.tasks.remove(0);
            match joined {
                Ok(report) => reports.push(report),
                Err(err) => tracing::error!(error = %err, "queue runner task failed"),
            }
        }

        self.started.store(false, Ordering::Release);
        tracing::info!(
            runners = reports.len(),
            processed = reports.iter().map(|r| r.processed).sum::<usize>(),
            "command broker stopped"
        );
        reports
    }
}

/// 未 join 即丢弃：取消运行器，待其全部退出后才允许再次启动
impl Drop for BrokerHandle {
    fn drop(&mut self) {
        self.shutdown();

        let tasks = std::mem::take(&mut self.tasks);
        if tasks.is_empty() {
            return;
        }
        let started = self.started.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    for t in tasks {
                        let _ = t.await;
                    }
                    started.store(false, Ordering::Release);
                    tracing::info!("command broker stopped after handle was dropped");
                });
            }
            Err(_) => {
                tracing::warn!("broker handle dropped outside a runtime, broker stays started");
            }
        }
    }
}
