//! 延迟执行子系统（courier-queue）
//!
//! - `InMemoryCommandQueue`：同时充当发送端与接收端的内存队列；
//! - `QueueRunner`：从接收端取命令并重新进入分发管线；
//! - `CommandBroker`：管理多个运行器的启动、完成与关闭。
//!
//! 将队列注册为请求可见的 `CommandSender` 服务后，`QueuePolicy::Queue` 的命令会被投递到队列，
//! 由调度器在后台处理。
//!
pub mod broker;
pub mod inmemory;
pub mod runner;

pub use broker::{BrokerConfig, BrokerHandle, CommandBroker};
pub use inmemory::{InMemoryCommandQueue, QueueConfig};
pub use runner::{QueueRunner, ResponseSink, RunnerReport};
