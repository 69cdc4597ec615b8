//! 处理器激活
//!
//! 按描述符的生命周期获取处理器实例：
//! - `Transient`：每次从请求作用域解析，解析不到时调用工厂；
//! - `PerRequest`：同一请求内按处理器类型缓存；
//! - `Singleton`：配置级缓存，并发首建时只保留先写入者，其余丢弃。
//!
//! 构造失败不会写入任何缓存，下一次调用会重新尝试。
//!
use crate::descriptor::{HandlerDescriptor, HandlerLifetime};
use crate::error::{CourierError, CourierResult};
use crate::request::HandlerRequest;
use crate::services::ServiceArc;
use dashmap::DashMap;
use std::any::TypeId;

#[derive(Default)]
pub struct HandlerActivator {
    singletons: DashMap<TypeId, ServiceArc>,
}

impl HandlerActivator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        request: &HandlerRequest,
        descriptor: &HandlerDescriptor,
    ) -> CourierResult<ServiceArc> {
        let key = descriptor.handler_type();
        match descriptor.lifetime() {
            HandlerLifetime::Transient => construct(
                descriptor,
                request.dependency_scope().get_service(key),
            ),
            HandlerLifetime::PerRequest => {
                let cache = request.instances();
                if let Some(existing) = cache.get(&key) {
                    return Ok(existing.value().clone());
                }
                let created = construct(descriptor, request.dependency_scope().get_service(key))?;
                Ok(cache.entry(key).or_insert(created).value().clone())
            }
            HandlerLifetime::Singleton => {
                if let Some(existing) = self.singletons.get(&key) {
                    return Ok(existing.value().clone());
                }
                let resolver = request.configuration().resolver();
                let created = construct(descriptor, resolver.get_service(key))?;
                let winner = self.singletons.entry(key).or_insert(created).value().clone();
                tracing::debug!(handler = descriptor.handler_name(), "singleton handler activated");
                Ok(winner)
            }
        }
    }

    /// 已缓存的单例数量
    pub fn singleton_count(&self) -> usize {
        self.singletons.len()
    }
}

fn construct(
    descriptor: &HandlerDescriptor,
    resolved: Option<ServiceArc>,
) -> CourierResult<ServiceArc> {
    if let Some(instance) = resolved {
        return Ok(instance);
    }
    match descriptor.factory() {
        Some(factory) => {
            factory().map_err(|e| CourierError::activation(descriptor.handler_name(), e))
        }
        None => Err(CourierError::activation(
            descriptor.handler_name(),
            "no instance resolved and no factory registered",
        )),
    }
}
