//! 处理请求
//!
//! 一次提交（命令、事件或出队的信封）对应一个 `HandlerRequest`：
//! 持有配置、只读消息、请求级服务覆盖、属性袋、按需开启的依赖作用域与请求级实例缓存。
//!
use crate::config::ProcessorConfiguration;
use crate::message::{Command, Event, MessageKind};
use crate::queue::CommandEnvelope;
use crate::services::{DependencyScope, RequestServices, ServiceArc};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

pub struct HandlerRequest {
    id: Uuid,
    configuration: Arc<ProcessorConfiguration>,
    message: ServiceArc,
    message_type: TypeId,
    message_name: &'static str,
    kind: MessageKind,
    deferred: bool,
    created_at: DateTime<Utc>,
    services: RequestServices,
    properties: Properties,
    scope: OnceLock<Box<dyn DependencyScope>>,
    instances: DashMap<TypeId, ServiceArc>,
}

impl HandlerRequest {
    pub fn command<C: Command>(configuration: Arc<ProcessorConfiguration>, command: C) -> Self {
        Self::new(
            configuration,
            Uuid::new_v4(),
            Arc::new(command),
            TypeId::of::<C>(),
            C::NAME,
            MessageKind::Command,
            false,
        )
    }

    pub fn event<E: Event>(configuration: Arc<ProcessorConfiguration>, event: E) -> Self {
        Self::new(
            configuration,
            Uuid::new_v4(),
            Arc::new(event),
            TypeId::of::<E>(),
            E::NAME,
            MessageKind::Event,
            false,
        )
    }

    /// 由出队信封重建请求：沿用原请求 id，标记为延迟执行以跳过队列策略
    pub fn from_envelope(
        configuration: Arc<ProcessorConfiguration>,
        envelope: CommandEnvelope,
    ) -> Self {
        Self::new(
            configuration,
            envelope.id(),
            envelope.message().clone(),
            envelope.message_type(),
            envelope.message_name(),
            MessageKind::Command,
            true,
        )
    }

    fn new(
        configuration: Arc<ProcessorConfiguration>,
        id: Uuid,
        message: ServiceArc,
        message_type: TypeId,
        message_name: &'static str,
        kind: MessageKind,
        deferred: bool,
    ) -> Self {
        let services = RequestServices::new(configuration.services().clone());
        Self {
            id,
            configuration,
            message,
            message_type,
            message_name,
            kind,
            deferred,
            created_at: Utc::now(),
            services,
            properties: Properties::default(),
            scope: OnceLock::new(),
            instances: DashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn configuration(&self) -> &Arc<ProcessorConfiguration> {
        &self.configuration
    }

    pub fn message(&self) -> &ServiceArc {
        &self.message
    }

    pub fn message_as<T: 'static>(&self) -> Option<&T> {
        self.message.downcast_ref::<T>()
    }

    pub fn message_type(&self) -> TypeId {
        self.message_type
    }

    pub fn message_name(&self) -> &'static str {
        self.message_name
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// 已经过队列、正在被运行器重新处理
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn services(&self) -> &RequestServices {
        &self.services
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// 首次访问时向解析器开启作用域，随请求一起释放
    pub fn dependency_scope(&self) -> &dyn DependencyScope {
        self.scope
            .get_or_init(|| self.configuration.resolver().begin_scope())
            .as_ref()
    }

    pub(crate) fn instances(&self) -> &DashMap<TypeId, ServiceArc> {
        &self.instances
    }
}

impl fmt::Debug for HandlerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRequest")
            .field("id", &self.id)
            .field("message", &self.message_name)
            .field("kind", &self.kind)
            .field("deferred", &self.deferred)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// 请求属性袋：过滤器之间传递临时数据
#[derive(Default)]
pub struct Properties {
    items: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Properties {
    pub fn insert<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.items.insert(key.into(), Arc::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let item = self.items.get(key)?.value().clone();
        item.downcast::<T>().ok()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.items.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
