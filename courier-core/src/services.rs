//! 服务表与依赖解析
//!
//! - `ServiceMap`：配置期构建、此后只读的类型键服务表，支持 `dyn Trait` 服务；
//! - `RequestServices`：请求级写时复制覆盖层，查询先看本请求覆盖，再回落到配置表；
//! - `DependencyResolver` / `DependencyScope`：外部容器的最小抽象，作用域随 drop 释放。
//!
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// 类型擦除的共享服务
pub type ServiceArc = Arc<dyn Any + Send + Sync>;

/// 只读服务表（克隆开销为一次引用计数）
///
/// 条目以 `Arc<Arc<T>>` 形式保存，使 `T` 可以是 `dyn Trait`。
#[derive(Clone, Default)]
pub struct ServiceMap {
    entries: Arc<HashMap<TypeId, ServiceArc>>,
}

impl ServiceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册服务；同类型重复注册以后者为准
    pub fn with<T>(mut self, service: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.entries).insert(TypeId::of::<T>(), Arc::new(service));
        self
    }

    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<Arc<T>>())
            .cloned()
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 请求级服务视图
pub struct RequestServices {
    parent: ServiceMap,
    overrides: DashMap<TypeId, ServiceArc>,
}

impl RequestServices {
    pub fn new(parent: ServiceMap) -> Self {
        Self {
            parent,
            overrides: DashMap::new(),
        }
    }

    /// 仅写入本请求的覆盖层，配置表保持不变
    pub fn insert<T>(&self, service: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.overrides
            .insert(TypeId::of::<T>(), Arc::new(service) as ServiceArc);
    }

    pub fn remove<T: ?Sized + 'static>(&self) -> bool {
        self.overrides.remove(&TypeId::of::<T>()).is_some()
    }

    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if let Some(entry) = self.overrides.get(&TypeId::of::<T>()) {
            return entry.value().downcast_ref::<Arc<T>>().cloned();
        }
        self.parent.get::<T>()
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.overrides.contains_key(&TypeId::of::<T>()) || self.parent.contains::<T>()
    }

    pub fn has_overrides(&self) -> bool {
        !self.overrides.is_empty()
    }
}

/// 外部依赖解析器
///
/// 解析处理器时，返回值应为 `Arc<H>` 擦除后的 `ServiceArc`。
pub trait DependencyResolver: Send + Sync {
    fn get_service(&self, service_type: TypeId) -> Option<ServiceArc>;

    fn get_services(&self, service_type: TypeId) -> Vec<ServiceArc> {
        self.get_service(service_type).into_iter().collect()
    }

    /// 开启一个依赖作用域（每个请求至多一次）
    fn begin_scope(&self) -> Box<dyn DependencyScope>;
}

/// 依赖作用域；drop 即释放
pub trait DependencyScope: Send + Sync {
    fn get_service(&self, service_type: TypeId) -> Option<ServiceArc>;

    fn get_services(&self, service_type: TypeId) -> Vec<ServiceArc> {
        self.get_service(service_type).into_iter().collect()
    }
}

/// 空解析器：处理器全部回落到描述符中的工厂
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyResolver;

impl DependencyResolver for EmptyResolver {
    fn get_service(&self, _service_type: TypeId) -> Option<ServiceArc> {
        None
    }

    fn begin_scope(&self) -> Box<dyn DependencyScope> {
        Box::new(EmptyScope)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct EmptyScope;

impl DependencyScope for EmptyScope {
    fn get_service(&self, _service_type: TypeId) -> Option<ServiceArc> {
        None
    }
}
