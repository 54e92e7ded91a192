//! 已注册的值来源

use std::fmt;
use std::sync::Arc;

use super::Injector;
use crate::errors::Result;
use crate::provider::{Dependency, Provider};

/// 首次解析时构建提供者。接收注入器，以便带注解的工厂解析自身依赖
pub(crate) type Constructor = dyn Fn(&Injector) -> Result<Arc<dyn Provider>> + Send + Sync;

/// 绑定类型
#[derive(Clone)]
pub(crate) enum Binding {
    /// 预先构建的提供者，首次使用时记入基础帧
    Instance(Arc<dyn Provider>),
    /// 提供者构造函数、工厂或带注解工厂，延迟构建
    Lazy(Arc<Constructor>),
    /// 静态值，无提供者生命周期
    Value(Dependency),
}

impl Binding {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Binding::Instance(_) => "instance",
            Binding::Lazy(_) => "lazy",
            Binding::Value(_) => "value",
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Binding::{}", self.kind())
    }
}
