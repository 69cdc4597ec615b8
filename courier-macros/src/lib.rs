//! courier 过程宏
//!
//! - `#[command(output = T, name = "...")]`：为结构体实现 `::courier_core::message::Command`
//! - `#[event(name = "...")]`：为结构体实现 `::courier_core::message::Event`
//!
//! 两者都会合并默认派生 `Debug, Clone`（已有派生保留、去重）。
//!
use proc_macro::TokenStream;

mod derive_utils;
mod message;

/// 命令宏
/// - `output`：处理结果类型，默认 `()`
/// - `name`：命令名称，默认取结构体名
#[proc_macro_attribute]
pub fn command(attr: TokenStream, item: TokenStream) -> TokenStream {
    message::expand(message::MessageKind::Command, attr, item)
}

/// 事件宏
/// - `name`：事件名称，默认取结构体名
#[proc_macro_attribute]
pub fn event(attr: TokenStream, item: TokenStream) -> TokenStream {
    message::expand(message::MessageKind::Event, attr, item)
}
