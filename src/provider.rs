//! 提供者能力及内置提供者

use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::errors::ProviderError;

/// 解析得到的依赖值，调用方向下转型为具体类型
pub type Dependency = Arc<dyn Any + Send + Sync>;

/// 把任意值包装为 [`Dependency`]
pub fn dependency<T: Any + Send + Sync>(value: T) -> Dependency {
    Arc::new(value)
}

/// 应答一个基础令牌及其子键命名空间的提供者
///
/// 每次解析调用一次 `get`，传入令牌的子键（如果有）以及调用方转发的额外值。
/// 子键缺失或存在的含义完全由提供者决定。`close` 至多调用一次，
/// 发生在实例化该提供者的作用域结束或注入器关闭时。
pub trait Provider: Send + Sync {
    /// 获取值。无法给出值时返回 [`ProviderError::Unset`]
    fn get(&self, subkey: Option<&str>, extra: &[Dependency]) -> Result<Dependency, ProviderError>;

    /// 释放资源
    fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

impl<P: Provider + ?Sized> Provider for Arc<P> {
    fn get(&self, subkey: Option<&str>, extra: &[Dependency]) -> Result<Dependency, ProviderError> {
        (**self).get(subkey, extra)
    }

    fn close(&self) -> Result<(), ProviderError> {
        (**self).close()
    }
}

type GetFn = dyn Fn(Option<&str>, &[Dependency]) -> Result<Dependency, ProviderError> + Send + Sync;
type CloseFn = dyn Fn() -> Result<(), ProviderError> + Send + Sync;

/// 基于闭包的提供者
pub struct FnProvider {
    get: Box<GetFn>,
    close: Option<Box<CloseFn>>,
}

impl FnProvider {
    pub fn new<F>(get: F) -> Self
    where
        F: Fn(Option<&str>, &[Dependency]) -> Result<Dependency, ProviderError> + Send + Sync + 'static,
    {
        Self {
            get: Box::new(get),
            close: None,
        }
    }

    /// 设置关闭回调
    pub fn on_close<F>(mut self, close: F) -> Self
    where
        F: Fn() -> Result<(), ProviderError> + Send + Sync + 'static,
    {
        self.close = Some(Box::new(close));
        self
    }
}

impl Provider for FnProvider {
    fn get(&self, subkey: Option<&str>, extra: &[Dependency]) -> Result<Dependency, ProviderError> {
        (self.get)(subkey, extra)
    }

    fn close(&self) -> Result<(), ProviderError> {
        match &self.close {
            Some(close) => close(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for FnProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProvider")
            .field("closes", &self.close.is_some())
            .finish()
    }
}

type SubkeyFn<T> = dyn Fn(&T, &str) -> Result<Dependency, ProviderError> + Send + Sync;
type TeardownFn<T> = Box<dyn FnOnce(&T) -> Result<(), ProviderError> + Send>;

/// 一个已获取的值及其释放逻辑
///
/// `get(None)` 返回该值；释放逻辑在首次 `close` 时执行，至多一次。
/// 未通过 [`Resource::with_subkeys`] 设置解析函数时，子键一律视为不支持。
pub struct Resource<T> {
    value: Arc<T>,
    subkeys: Option<Box<SubkeyFn<T>>>,
    teardown: Mutex<Option<TeardownFn<T>>>,
}

impl<T: Send + Sync + 'static> Resource<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(value),
            subkeys: None,
            teardown: Mutex::new(None),
        }
    }

    /// 设置释放逻辑
    pub fn on_close<F>(self, teardown: F) -> Self
    where
        F: FnOnce(&T) -> Result<(), ProviderError> + Send + 'static,
    {
        *self.teardown.lock() = Some(Box::new(teardown));
        self
    }

    /// 设置子键解析函数
    pub fn with_subkeys<F>(mut self, resolve: F) -> Self
    where
        F: Fn(&T, &str) -> Result<Dependency, ProviderError> + Send + Sync + 'static,
    {
        self.subkeys = Some(Box::new(resolve));
        self
    }

    pub fn value(&self) -> &Arc<T> {
        &self.value
    }
}

impl<T: Send + Sync + 'static> Provider for Resource<T> {
    fn get(&self, subkey: Option<&str>, _extra: &[Dependency]) -> Result<Dependency, ProviderError> {
        match (subkey, &self.subkeys) {
            (None, _) => Ok(self.value.clone()),
            (Some(key), Some(resolve)) => resolve(&self.value, key),
            (Some(key), None) => Err(ProviderError::UnsupportedSubkey(key.to_string())),
        }
    }

    fn close(&self) -> Result<(), ProviderError> {
        let teardown = self.teardown.lock().take();
        match teardown {
            Some(teardown) => teardown(&self.value),
            None => Ok(()),
        }
    }
}

/// 无参工厂产生的值，只实例化一次
pub struct FactoryProvider {
    value: Dependency,
}

impl FactoryProvider {
    pub fn new(value: Dependency) -> Self {
        Self { value }
    }
}

impl Provider for FactoryProvider {
    fn get(&self, subkey: Option<&str>, _extra: &[Dependency]) -> Result<Dependency, ProviderError> {
        match subkey {
            None => Ok(self.value.clone()),
            Some(key) => Err(ProviderError::UnsupportedSubkey(key.to_string())),
        }
    }
}
