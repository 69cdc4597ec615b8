//! 命令/事件分发管线（courier-core）
//!
//! 将强类型命令与事件路由到已注册的处理器，并围绕每次调用组装一条可组合的管线：
//! - 处理器描述符（`descriptor`）与按生命周期激活实例（`activator`）
//! - 洋葱式过滤器链（`filter`）与异常处理链（`exception`）
//! - 可叠加的重试装饰（`retry`）
//! - 队列策略与队列契约（`queue`），具体的内存队列、运行器与调度器位于 `courier-queue`
//!
//! 典型用法：
//! 1. 为命令实现 `Command`（或使用 `#[command]` 宏），实现 `CommandHandler`；
//! 2. 用 `HandlerDescriptor` 描述处理器并注册到 `HandlerCatalog`；
//! 3. 通过 `ProcessorConfiguration::builder()` 装配服务、过滤器与异常组件；
//! 4. 以 `CommandProcessor` 处理命令或发布事件。
//!
pub mod activator;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod exception;
pub mod filter;
pub mod handler;
pub mod message;
pub mod processor;
pub mod queue;
pub mod request;
pub mod response;
pub mod retry;
pub mod services;

pub use config::{ProcessorConfiguration, ProcessorSettings};
pub use context::{FilterContext, HandlerContext};
pub use descriptor::{
    DescriptorTable, HandlerCatalog, HandlerDescriptor, HandlerLifetime, HandlerTypeResolver,
    QueuePolicy,
};
pub use error::{CourierError, CourierResult};
pub use handler::{CommandHandler, EventHandler};
pub use message::{Command, Event, MessageKind};
pub use processor::CommandProcessor;
pub use queue::{CommandEnvelope, CommandReceiver, CommandSender};
pub use request::HandlerRequest;
pub use response::{HandlerResponse, Payload, PublishReport, ResponseFault};
