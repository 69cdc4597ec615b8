//! 处理器执行上下文
//!
use crate::descriptor::HandlerDescriptor;
use crate::request::{HandlerRequest, Properties};
use crate::response::HandlerResponse;
use crate::services::RequestServices;
use std::sync::Arc;

/// 过滤器链可观察的上下文
pub trait FilterContext: Send {
    /// 已产生响应时，链末尾的终端将被跳过
    fn has_response(&self) -> bool;
}

/// 单个处理器的一次执行
pub struct HandlerContext {
    request: Arc<HandlerRequest>,
    descriptor: Arc<HandlerDescriptor>,
    response: Option<HandlerResponse>,
}

impl HandlerContext {
    pub fn new(request: Arc<HandlerRequest>, descriptor: Arc<HandlerDescriptor>) -> Self {
        Self {
            request,
            descriptor,
            response: None,
        }
    }

    pub fn request(&self) -> &Arc<HandlerRequest> {
        &self.request
    }

    pub fn descriptor(&self) -> &Arc<HandlerDescriptor> {
        &self.descriptor
    }

    pub fn services(&self) -> &RequestServices {
        self.request.services()
    }

    pub fn properties(&self) -> &Properties {
        self.request.properties()
    }

    pub fn response(&self) -> Option<&HandlerResponse> {
        self.response.as_ref()
    }

    pub fn set_response(&mut self, response: HandlerResponse) {
        self.response = Some(response);
    }

    pub fn take_response(&mut self) -> Option<HandlerResponse> {
        self.response.take()
    }
}

impl FilterContext for HandlerContext {
    fn has_response(&self) -> bool {
        self.response.is_some()
    }
}
