//! 处理器描述符与描述符表
//!
//! 描述符记录“消息类型 → 处理器类型”的静态元数据：
//! 生命周期、队列策略、声明的过滤器/异常过滤器、可选的构造工厂与类型擦除调用器。
//! 描述符表在每个配置上只构建一次，全局过滤器在构建时前置到每个描述符。
//!
use crate::context::HandlerContext;
use crate::error::{CourierError, CourierResult};
use crate::exception::ExceptionContext;
use crate::filter::Filter;
use crate::handler::{CommandHandler, CommandInvoker, EventHandler, EventInvoker, HandlerInvoker};
use crate::message::{Command, Event, MessageKind};
use crate::services::ServiceArc;
use serde::{Deserialize, Serialize};
use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 处理器实例的生命周期
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerLifetime {
    /// 每次调用新建
    #[default]
    Transient,
    /// 同一请求内复用
    PerRequest,
    /// 同一配置内复用
    Singleton,
}

/// 命令是否延迟到队列中执行
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    #[default]
    NoQueue,
    Queue,
}

/// 处理器构造工厂
pub type HandlerFactory = Arc<dyn Fn() -> anyhow::Result<ServiceArc> + Send + Sync>;

#[derive(Clone)]
pub struct HandlerDescriptor {
    kind: MessageKind,
    message_type: TypeId,
    message_name: &'static str,
    handler_type: TypeId,
    handler_name: &'static str,
    lifetime: HandlerLifetime,
    queue_policy: QueuePolicy,
    filters: Vec<Arc<dyn Filter<HandlerContext>>>,
    exception_filters: Vec<Arc<dyn Filter<ExceptionContext>>>,
    factory: Option<HandlerFactory>,
    invoker: Arc<dyn HandlerInvoker>,
}

impl HandlerDescriptor {
    /// 命令处理器，解析器未提供实例时以 `Default` 构造
    pub fn command<C, H>() -> Self
    where
        C: Command,
        H: CommandHandler<C> + Default,
    {
        Self::command_resolved::<C, H>().with_factory(|| Ok(H::default()))
    }

    /// 命令处理器，解析器未提供实例时调用 `factory`
    pub fn command_with<C, H, F>(factory: F) -> Self
    where
        C: Command,
        H: CommandHandler<C>,
        F: Fn() -> anyhow::Result<H> + Send + Sync + 'static,
    {
        Self::command_resolved::<C, H>().with_factory(factory)
    }

    /// 命令处理器，实例只能来自依赖解析器
    pub fn command_resolved<C, H>() -> Self
    where
        C: Command,
        H: CommandHandler<C>,
    {
        Self::new::<C, H>(
            MessageKind::Command,
            C::NAME,
            Arc::new(CommandInvoker::<C, H>::new()),
        )
    }

    pub fn event<E, H>() -> Self
    where
        E: Event,
        H: EventHandler<E> + Default,
    {
        Self::event_resolved::<E, H>().with_factory(|| Ok(H::default()))
    }

    pub fn event_with<E, H, F>(factory: F) -> Self
    where
        E: Event,
        H: EventHandler<E>,
        F: Fn() -> anyhow::Result<H> + Send + Sync + 'static,
    {
        Self::event_resolved::<E, H>().with_factory(factory)
    }

    pub fn event_resolved<E, H>() -> Self
    where
        E: Event,
        H: EventHandler<E>,
    {
        Self::new::<E, H>(
            MessageKind::Event,
            E::NAME,
            Arc::new(EventInvoker::<E, H>::new()),
        )
    }

    fn new<M: 'static, H: 'static>(
        kind: MessageKind,
        message_name: &'static str,
        invoker: Arc<dyn HandlerInvoker>,
    ) -> Self {
        Self {
            kind,
            message_type: TypeId::of::<M>(),
            message_name,
            handler_type: TypeId::of::<H>(),
            handler_name: type_name::<H>(),
            lifetime: HandlerLifetime::default(),
            queue_policy: QueuePolicy::default(),
            filters: Vec::new(),
            exception_filters: Vec::new(),
            factory: None,
            invoker,
        }
    }

    fn with_factory<H, F>(mut self, factory: F) -> Self
    where
        H: Send + Sync + 'static,
        F: Fn() -> anyhow::Result<H> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(move || {
            factory().map(|handler| Arc::new(handler) as ServiceArc)
        }));
        self
    }

    pub fn with_lifetime(mut self, lifetime: HandlerLifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_queue_policy(mut self, policy: QueuePolicy) -> Self {
        self.queue_policy = policy;
        self
    }

    /// 追加过滤器（按声明顺序由外到内）
    pub fn with_filter(mut self, filter: impl Filter<HandlerContext>) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// 追加异常过滤器（执行时逆序）
    pub fn with_exception_filter(mut self, filter: impl Filter<ExceptionContext>) -> Self {
        self.exception_filters.push(Arc::new(filter));
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn message_type(&self) -> TypeId {
        self.message_type
    }

    pub fn message_name(&self) -> &'static str {
        self.message_name
    }

    pub fn handler_type(&self) -> TypeId {
        self.handler_type
    }

    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    pub fn lifetime(&self) -> HandlerLifetime {
        self.lifetime
    }

    pub fn queue_policy(&self) -> QueuePolicy {
        self.queue_policy
    }

    /// 实际执行的过滤器：全局过滤器在前，声明的过滤器在后
    pub fn filters(&self) -> &[Arc<dyn Filter<HandlerContext>>] {
        &self.filters
    }

    /// 声明顺序的异常过滤器（全局在前）
    pub fn exception_filters(&self) -> &[Arc<dyn Filter<ExceptionContext>>] {
        &self.exception_filters
    }

    pub fn factory(&self) -> Option<&HandlerFactory> {
        self.factory.as_ref()
    }

    pub(crate) fn invoker(&self) -> &dyn HandlerInvoker {
        self.invoker.as_ref()
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("kind", &self.kind)
            .field("message", &self.message_name)
            .field("handler", &self.handler_name)
            .field("lifetime", &self.lifetime)
            .field("queue_policy", &self.queue_policy)
            .field("filters", &self.filters.len())
            .field("exception_filters", &self.exception_filters.len())
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

/// 处理器类型来源
pub trait HandlerTypeResolver: Send + Sync {
    fn handler_types(&self) -> Vec<HandlerDescriptor>;
}

/// 默认的处理器目录：按注册顺序保存描述符
#[derive(Clone, Debug, Default)]
pub struct HandlerCatalog {
    descriptors: Vec<HandlerDescriptor>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, descriptor: HandlerDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl HandlerTypeResolver for HandlerCatalog {
    fn handler_types(&self) -> Vec<HandlerDescriptor> {
        self.descriptors.clone()
    }
}

/// 描述符表（构建后只读）
#[derive(Debug, Default)]
pub struct DescriptorTable {
    commands: HashMap<TypeId, Vec<Arc<HandlerDescriptor>>>,
    events: HashMap<TypeId, Vec<Arc<HandlerDescriptor>>>,
}

impl DescriptorTable {
    pub fn build(
        resolver: &dyn HandlerTypeResolver,
        global_filters: &[Arc<dyn Filter<HandlerContext>>],
        global_exception_filters: &[Arc<dyn Filter<ExceptionContext>>],
    ) -> Self {
        let mut table = Self::default();
        for mut descriptor in resolver.handler_types() {
            if !global_filters.is_empty() {
                descriptor.filters = global_filters
                    .iter()
                    .cloned()
                    .chain(descriptor.filters)
                    .collect();
            }
            if !global_exception_filters.is_empty() {
                descriptor.exception_filters = global_exception_filters
                    .iter()
                    .cloned()
                    .chain(descriptor.exception_filters)
                    .collect();
            }
            let slot = match descriptor.kind {
                MessageKind::Command => &mut table.commands,
                MessageKind::Event => &mut table.events,
            };
            slot.entry(descriptor.message_type)
                .or_default()
                .push(Arc::new(descriptor));
        }
        table
    }

    /// 命令必须恰好对应一个处理器
    pub fn resolve_command(
        &self,
        message_type: TypeId,
        message_name: &'static str,
    ) -> CourierResult<Arc<HandlerDescriptor>> {
        match self.commands.get(&message_type).map(Vec::as_slice) {
            None | Some([]) => Err(CourierError::HandlerNotFound {
                message_type: message_name,
            }),
            Some([descriptor]) => Ok(descriptor.clone()),
            Some(many) => Err(CourierError::AmbiguousHandler {
                message_type: message_name,
                handlers: many.iter().map(|d| d.handler_name).collect(),
            }),
        }
    }

    /// 事件可对应零个或多个处理器
    pub fn resolve_events(&self, message_type: TypeId) -> &[Arc<HandlerDescriptor>] {
        self.events
            .get(&message_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn command_count(&self) -> usize {
        self.commands.values().map(Vec::len).sum()
    }

    pub fn event_handler_count(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }
}
