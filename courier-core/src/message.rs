//! 消息抽象：命令与事件
//!
//! 消息在提交时被移入 `Arc`，此后在管线内只读共享。
//!
/// 命令：有且仅有一个处理器，产出 `Output`
pub trait Command: Send + Sync + 'static {
    /// 命令名称（用于日志与诊断）
    const NAME: &'static str;

    /// 处理成功后的返回值类型
    type Output: Send + Sync + 'static;
}

/// 事件：可被零个或多个处理器订阅
pub trait Event: Send + Sync + 'static {
    /// 事件名称（用于日志与诊断）
    const NAME: &'static str;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Command,
    Event,
}
