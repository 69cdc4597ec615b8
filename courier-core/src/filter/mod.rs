//! 过滤器链
//!
//! 洋葱模型：声明顺序中第一个过滤器在最外层。每个过滤器可在调用 `next.run(ctx)`
//! 前后执行逻辑，也可直接设置响应并跳过内层。链到末尾时若上下文已有响应，
//! 终端不再执行；外层过滤器的后置逻辑照常运行。
//!
//! - `chain`：`Filter` / `Terminal` / `Next` / `FilterChain`
//! - `logging`：记录处理器执行耗时与结果
//! - `validation`：调用 `Validator` 服务校验消息
//!
mod chain;
mod logging;
mod validation;

pub use chain::{Filter, FilterChain, Next, Terminal};
pub use logging::LoggingFilter;
pub use validation::{ValidationFilter, Validator};
