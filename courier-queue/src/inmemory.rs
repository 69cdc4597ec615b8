//! 内存命令队列
//!
//! 同时实现 `CommandSender` 与 `CommandReceiver`，基于 tokio mpsc：
//! - 有界/无界两种模式，有界时发送在队列满时等待（可取消）；
//! - 多个运行器共享同一个接收端，每个命令只会被取出一次；
//! - `complete` 后不再接受新命令，已入队的命令仍可被取出，取空后 `is_completed` 为真。
//!
use async_trait::async_trait;
use courier_core::{CommandEnvelope, CommandReceiver, CommandSender, CourierError, CourierResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;

/// 内存队列配置；`capacity` 为空表示无界
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: Option<usize>,
}

#[derive(Clone)]
enum Tx {
    Bounded(mpsc::Sender<CommandEnvelope>),
    Unbounded(mpsc::UnboundedSender<CommandEnvelope>),
}

enum Rx {
    Bounded(mpsc::Receiver<CommandEnvelope>),
    Unbounded(mpsc::UnboundedReceiver<CommandEnvelope>),
}

impl Rx {
    async fn recv(&mut self) -> Option<CommandEnvelope> {
        match self {
            Rx::Bounded(rx) => rx.recv().await,
            Rx::Unbounded(rx) => rx.recv().await,
        }
    }
}

pub struct InMemoryCommandQueue {
    tx: Mutex<Option<Tx>>,
    rx: AsyncMutex<Rx>,
    pending: AtomicUsize,
    completed: AtomicBool,
    capacity: Option<usize>,
}

impl InMemoryCommandQueue {
    pub fn unbounded() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::with_channel(Tx::Unbounded(tx), Rx::Unbounded(rx), None)
    }

    pub fn bounded(capacity: usize) -> CourierResult<Self> {
        if capacity == 0 {
            return Err(CourierError::ArgumentOutOfRange {
                name: "capacity",
                value: capacity.to_string(),
            });
        }
        let (tx, rx) = mpsc::channel(capacity);
        Ok(Self::with_channel(
            Tx::Bounded(tx),
            Rx::Bounded(rx),
            Some(capacity),
        ))
    }

    pub fn from_config(config: &QueueConfig) -> CourierResult<Self> {
        match config.capacity {
            Some(capacity) => Self::bounded(capacity),
            None => Ok(Self::unbounded()),
        }
    }

    fn with_channel(tx: Tx, rx: Rx, capacity: Option<usize>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            rx: AsyncMutex::new(rx),
            pending: AtomicUsize::new(0),
            completed: AtomicBool::new(false),
            capacity,
        }
    }

    /// 已入队、尚未取出的命令数
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[async_trait]
impl CommandSender for InMemoryCommandQueue {
    async fn send(
        &self,
        envelope: CommandEnvelope,
        cancel: &CancellationToken,
    ) -> CourierResult<()> {
        let tx = self.tx.lock().clone().ok_or(CourierError::QueueCompleted)?;

        self.pending.fetch_add(1, Ordering::AcqRel);
        let sent = match tx {
            Tx::Unbounded(tx) => tx.send(envelope).map_err(|_| CourierError::QueueCompleted),
            Tx::Bounded(tx) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(CourierError::Cancelled),
                    sent = tx.send(envelope) => sent.map_err(|_| CourierError::QueueCompleted),
                }
            }
        };
        if sent.is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
        sent
    }
}

#[async_trait]
impl CommandReceiver for InMemoryCommandQueue {
    async fn receive(&self, cancel: &CancellationToken) -> CourierResult<Option<CommandEnvelope>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            envelope = async { self.rx.lock().await.recv().await } => envelope,
        };

        if received.is_some() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(received)
    }

    fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire) && self.pending.load(Ordering::Acquire) == 0
    }

    fn complete(&self) {
        if !self.completed.swap(true, Ordering::AcqRel) {
            // 释放发送端；在途发送仍持有克隆，完成后通道随之关闭
            self.tx.lock().take();
            tracing::debug!(pending = self.len(), "command queue completed");
        }
    }
}
