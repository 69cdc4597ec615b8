//! 处理器配置
//!
//! `ProcessorSettings` 为可反序列化的调优参数；`ProcessorConfiguration` 负责装配：
//! 依赖解析器、处理器来源、服务表、全局过滤器与异常组件。
//! 配置同时拥有描述符表（只构建一次）与单例缓存，二者随配置一同释放。
//!
use crate::activator::HandlerActivator;
use crate::context::HandlerContext;
use crate::descriptor::{DescriptorTable, HandlerCatalog, HandlerDescriptor, HandlerTypeResolver};
use crate::error::CourierResult;
use crate::exception::{
    ExceptionContext, ExceptionHandler, ExceptionLogger, PassThroughExceptionHandler,
    TracingExceptionLogger,
};
use crate::filter::Filter;
use crate::message::Command;
use crate::services::{DependencyResolver, EmptyResolver, ServiceMap};
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::sync::{Arc, OnceLock};

// 导入由 bon::Builder 生成的 typestate 模块与状态转换别名
use self::processor_configuration_builder::{
    IsUnset, SetHandlerTypes, State as BuilderState,
};

/// 处理器调优参数
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorSettings {
    /// 同一事件广播给多个处理器时的并发上限
    pub event_handler_concurrency: usize,
    /// 校验失败时是否直接返回失败响应
    pub abort_on_invalid_command: bool,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            event_handler_concurrency: 8,
            abort_on_invalid_command: true,
        }
    }
}

#[derive(Builder)]
pub struct ProcessorConfiguration {
    #[builder(default)]
    settings: ProcessorSettings,
    #[builder(default = Arc::new(EmptyResolver) as Arc<dyn DependencyResolver>)]
    resolver: Arc<dyn DependencyResolver>,
    #[builder(setters(vis = "pub(crate)"))]
    handler_types: Arc<dyn HandlerTypeResolver>,
    #[builder(default)]
    services: ServiceMap,
    #[builder(default)]
    filters: Vec<Arc<dyn Filter<HandlerContext>>>,
    #[builder(default)]
    exception_filters: Vec<Arc<dyn Filter<ExceptionContext>>>,
    #[builder(default = vec![Arc::new(TracingExceptionLogger) as Arc<dyn ExceptionLogger>])]
    exception_loggers: Vec<Arc<dyn ExceptionLogger>>,
    exception_handler: Option<Arc<dyn ExceptionHandler>>,
    #[builder(skip)]
    descriptors: OnceLock<DescriptorTable>,
    #[builder(skip)]
    activator: HandlerActivator,
}

// 处理器来源只能设置一次：目录或自定义解析器二选一
impl<S: BuilderState> ProcessorConfigurationBuilder<S> {
    pub fn handlers(self, catalog: HandlerCatalog) -> ProcessorConfigurationBuilder<SetHandlerTypes<S>>
    where
        <S as BuilderState>::HandlerTypes: IsUnset,
    {
        self.handler_types(Arc::new(catalog))
    }

    pub fn handler_type_resolver(
        self,
        resolver: Arc<dyn HandlerTypeResolver>,
    ) -> ProcessorConfigurationBuilder<SetHandlerTypes<S>>
    where
        <S as BuilderState>::HandlerTypes: IsUnset,
    {
        self.handler_types(resolver)
    }
}

static PASS_THROUGH: PassThroughExceptionHandler = PassThroughExceptionHandler;

impl ProcessorConfiguration {
    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &dyn DependencyResolver {
        self.resolver.as_ref()
    }

    pub fn services(&self) -> &ServiceMap {
        &self.services
    }

    /// 全局过滤器（声明顺序）
    pub fn filters(&self) -> &[Arc<dyn Filter<HandlerContext>>] {
        &self.filters
    }

    /// 全局异常过滤器（声明顺序）
    pub fn exception_filters(&self) -> &[Arc<dyn Filter<ExceptionContext>>] {
        &self.exception_filters
    }

    pub fn exception_loggers(&self) -> &[Arc<dyn ExceptionLogger>] {
        &self.exception_loggers
    }

    /// 未配置时返回透传处理器
    pub fn exception_handler(&self) -> &dyn ExceptionHandler {
        match &self.exception_handler {
            Some(handler) => handler.as_ref(),
            None => &PASS_THROUGH,
        }
    }

    pub fn activator(&self) -> &HandlerActivator {
        &self.activator
    }

    /// 首次访问时向处理器来源查询并构建描述符表
    pub fn descriptors(&self) -> &DescriptorTable {
        self.descriptors.get_or_init(|| {
            let table = DescriptorTable::build(
                self.handler_types.as_ref(),
                &self.filters,
                &self.exception_filters,
            );
            tracing::info!(
                commands = table.command_count(),
                event_handlers = table.event_handler_count(),
                "handler descriptors built"
            );
            table
        })
    }

    /// 立即构建描述符表
    pub fn initialize(&self) {
        self.descriptors();
    }

    pub fn descriptor_for<C: Command>(&self) -> CourierResult<Arc<HandlerDescriptor>> {
        self.descriptors()
            .resolve_command(TypeId::of::<C>(), C::NAME)
    }
}
