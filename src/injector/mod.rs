//! 注入器：绑定注册表、提供者缓存、作用域栈
//!
//! 解析过程中调用提供者代码、工厂、装饰器或目标可调用对象时，
//! 不持有任何注册表锁。每个缓存槽位都有自己的互斥锁和条件变量，
//! 因此即使多个线程同时请求同一个基础名，提供者也最多只构建一次。

mod binding;
mod decoration;
mod scope;
mod strategy;

pub use scope::{ScopeGuard, ScopeHandle};
pub use strategy::{BoundCall, Strategy, Timing};

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::{Condvar, Mutex};
use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use crate::annotation::Injectable;
use crate::errors::{CloseAggregateError, CloseFailure, InjectorError, ProviderError, Result};
use crate::provider::{dependency, Dependency, FactoryProvider, Provider};
use crate::token::Token;

use binding::{Binding, Constructor};
use decoration::Decoration;
use scope::{Frame, ScopeStack};

/// 依赖注册表与生命周期所有者
///
/// 克隆得到的是同一个注入器的另一个句柄。
#[derive(Clone)]
pub struct Injector {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    /// 基础名 -> 绑定
    bindings: DashMap<String, Binding>,
    /// 基础名 -> 提供者缓存槽位
    instances: DashMap<String, Arc<Slot>>,
    /// 至少被解析过一次、且尚未被驱逐的基础名
    resolved: DashSet<String>,
    /// 按精确令牌登记的装饰器
    decorations: DashMap<Token, Vec<Decoration>>,
    scopes: Mutex<ScopeStack>,
    closed: AtomicBool,
    stats: InnerStats,
}

/// 单个基础名的缓存槽位
#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

#[derive(Default)]
enum SlotState {
    /// 尚未构建
    #[default]
    Empty,
    /// 正在由某个线程构建
    Realizing(ThreadId),
    /// 已构建并缓存
    Ready(Arc<dyn Provider>),
}

#[derive(Default)]
struct InnerStats {
    total_resolutions: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
}

/// 解析计数快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionStats {
    /// 解析总次数
    pub total_resolutions: usize,
    /// 命中缓存的提供者查找次数
    pub cache_hits: usize,
    /// 需要构建提供者的查找次数
    pub cache_misses: usize,
}

impl ResolutionStats {
    /// 提供者查找的缓存命中率
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

impl Injector {
    /// 创建空的注入器
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                bindings: DashMap::new(),
                instances: DashMap::new(),
                resolved: DashSet::new(),
                decorations: DashMap::new(),
                scopes: Mutex::new(ScopeStack::new()),
                closed: AtomicBool::new(false),
                stats: InnerStats::default(),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    // --- 注册 ---

    /// 绑定一个预先构建的提供者，注入器在关闭时负责关闭它。
    pub fn provider<P: Provider + 'static>(&self, base: &str, provider: P) -> Result<()> {
        self.provider_shared(base, Arc::new(provider))
    }

    /// 绑定共享的提供者实例。
    ///
    /// 同一个实例可以登记在多个基础名下，关闭时只会关闭一次。
    pub fn provider_shared(&self, base: &str, provider: Arc<dyn Provider>) -> Result<()> {
        self.register(base, Binding::Instance(provider))
    }

    /// 绑定提供者构造函数，首次解析时调用一次。
    pub fn factory<P, F>(&self, base: &str, ctor: F) -> Result<()>
    where
        P: Provider + 'static,
        F: Fn() -> std::result::Result<P, ProviderError> + Send + Sync + 'static,
    {
        let token = base.to_string();
        let ctor: Arc<Constructor> = Arc::new(move |_: &Injector| {
            let provider = ctor().map_err(|err| InjectorError::from_provider(&token, err))?;
            Ok(Arc::new(provider) as Arc<dyn Provider>)
        });
        self.register(base, Binding::Lazy(ctor))
    }

    /// 绑定无参工厂，其结果只生成一次，之后作为基础令牌的值返回。
    pub fn factory_fn<T, F>(&self, base: &str, factory: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let ctor: Arc<Constructor> = Arc::new(move |_: &Injector| {
            Ok(Arc::new(FactoryProvider::new(dependency(factory()))) as Arc<dyn Provider>)
        });
        self.register(base, Binding::Lazy(ctor))
    }

    /// 绑定构建提供者的带注解可调用对象。提供者实例化时，
    /// 以 [`Strategy::Regardless`] 解析其注解。
    pub fn factory_annotated<C, P>(&self, base: &str, callable: C) -> Result<()>
    where
        C: Injectable<Output = P> + Send + Sync + 'static,
        P: Provider + 'static,
    {
        let ctor: Arc<Constructor> = Arc::new(move |injector: &Injector| {
            let provider = injector.apply_regardless(&callable)?;
            Ok(Arc::new(provider) as Arc<dyn Provider>)
        });
        self.register(base, Binding::Lazy(ctor))
    }

    /// 绑定静态值，不参与提供者生命周期。
    pub fn value<T: Any + Send + Sync>(&self, base: &str, value: T) -> Result<()> {
        self.register(base, Binding::Value(dependency(value)))
    }

    fn register(&self, base: &str, binding: Binding) -> Result<()> {
        self.ensure_open()?;
        Token::validate_base(base)?;
        let kind = binding.kind();
        // 分片写锁覆盖检查与写入；resolve 在持有读锁时登记已解析
        let replaced = match self.inner.bindings.entry(base.to_string()) {
            Entry::Occupied(mut entry) => {
                if self.inner.resolved.contains(base) || self.is_realized(base) {
                    return Err(InjectorError::RebindingError {
                        base: base.to_string(),
                    });
                }
                entry.insert(binding);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(binding);
                false
            }
        };
        tracing::debug!(base, kind, replaced, "registered binding");
        Ok(())
    }

    /// 是否存在该基础名的绑定
    pub fn is_bound(&self, base: &str) -> bool {
        self.inner.bindings.contains_key(base)
    }

    /// 该基础名的提供者当前是否已缓存（或正在构建）
    pub fn is_realized(&self, base: &str) -> bool {
        let slot = match self.inner.instances.get(base) {
            Some(slot) => slot.clone(),
            None => return false,
        };
        let realized = !matches!(*slot.state.lock(), SlotState::Empty);
        realized
    }

    // --- 解析 ---

    pub fn get(&self, token: impl Into<Token>) -> Result<Dependency> {
        self.get_with(token, &[])
    }

    /// 解析令牌，并把 `extra` 转发给提供者的 `get`。
    pub fn get_with(&self, token: impl Into<Token>, extra: &[Dependency]) -> Result<Dependency> {
        self.ensure_open()?;
        self.resolve(&token.into(), extra)
    }

    /// 解析并向下转型为具体类型
    pub fn get_as<T: Any + Send + Sync>(&self, token: impl Into<Token>) -> Result<Arc<T>> {
        let token = token.into();
        self.get(&token)?
            .downcast::<T>()
            .map_err(|_| InjectorError::TypeMismatch {
                name: token.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub(crate) fn resolve(&self, token: &Token, extra: &[Dependency]) -> Result<Dependency> {
        self.inner.stats.total_resolutions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(token = %token, "resolving");

        let binding = match self.inner.bindings.get(token.base()) {
            Some(entry) => {
                self.inner.resolved.insert(token.base().to_string());
                entry.value().clone()
            }
            None => return Err(InjectorError::unbound(token)),
        };

        let value = match binding {
            Binding::Value(value) => {
                if let Some(subkey) = token.subkey() {
                    return Err(InjectorError::UnsetDependency {
                        token: token.to_string(),
                        reason: format!("static value has no subkey '{}'", subkey),
                    });
                }
                value
            }
            Binding::Instance(provider) => {
                let provider = self.realize(token.base(), true, |_| Ok(provider))?;
                self.query(&provider, token, extra)?
            }
            Binding::Lazy(ctor) => {
                let provider = self.realize(token.base(), false, |injector| ctor(injector))?;
                self.query(&provider, token, extra)?
            }
        };

        self.decorate_value(token, value)
    }

    fn query(&self, provider: &Arc<dyn Provider>, token: &Token, extra: &[Dependency]) -> Result<Dependency> {
        provider
            .get(token.subkey(), extra)
            .map_err(|err| InjectorError::from_provider(token, err))
    }

    /// 返回该基础名的缓存提供者，必要时构建。
    ///
    /// `pinned` 的提供者归属基础帧，作用域退出时不会被关闭。
    fn realize<F>(&self, base: &str, pinned: bool, build: F) -> Result<Arc<dyn Provider>>
    where
        F: FnOnce(&Injector) -> Result<Arc<dyn Provider>>,
    {
        let slot = self
            .inner
            .instances
            .entry(base.to_string())
            .or_default()
            .value()
            .clone();
        let me = thread::current().id();

        {
            let mut state = slot.state.lock();
            loop {
                match &*state {
                    SlotState::Ready(provider) => {
                        self.inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(provider.clone());
                    }
                    SlotState::Realizing(owner) if *owner == me => {
                        return Err(InjectorError::CircularDependency {
                            base: base.to_string(),
                        });
                    }
                    SlotState::Realizing(_) => slot.ready.wait(&mut state),
                    SlotState::Empty => break,
                }
            }
            self.ensure_open()?;
            *state = SlotState::Realizing(me);
        }

        self.inner.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
        let built = build(self);

        let mut orphan = None;
        let mut state = slot.state.lock();
        let outcome = match built {
            Ok(provider) => {
                // 与 close() 的 drain 互斥：要么记入某个帧，要么由本线程关闭
                let recorded = {
                    let mut scopes = self.inner.scopes.lock();
                    if self.is_closed() {
                        None
                    } else {
                        scopes.record(base, pinned)
                    }
                };
                match recorded {
                    Some(depth) => {
                        self.inner.resolved.insert(base.to_string());
                        *state = SlotState::Ready(provider.clone());
                        tracing::debug!(base, depth, "realized provider");
                        Ok(provider)
                    }
                    None => {
                        *state = SlotState::Empty;
                        orphan = Some(provider);
                        Err(InjectorError::InjectorClosed)
                    }
                }
            }
            Err(err) => {
                *state = SlotState::Empty;
                Err(err)
            }
        };
        drop(state);
        slot.ready.notify_all();

        if let Some(provider) = orphan {
            tracing::debug!(base, "injector closed during realization, closing late provider");
            if let Err(err) = provider.close() {
                tracing::warn!(base, error = %err, "late provider failed to close");
            }
        }
        outcome
    }

    // --- 生命周期 ---

    /// 注入器是否已关闭
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(InjectorError::InjectorClosed)
        } else {
            Ok(())
        }
    }

    /// 关闭所有已实例化的提供者：从最内层作用域开始，
    /// 每个作用域内按实例化的逆序关闭。之后注入器不可再用。
    /// 每个提供者都会尝试关闭，失败统一汇总返回。
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(InjectorError::InjectorClosed);
        }
        let failures = self.inner.shutdown();
        tracing::info!(failures = failures.len(), "injector closed");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CloseAggregateError { failures }.into())
        }
    }

    /// 获取解析统计
    pub fn stats(&self) -> ResolutionStats {
        let stats = &self.inner.stats;
        ResolutionStats {
            total_resolutions: stats.total_resolutions.load(Ordering::Relaxed),
            cache_hits: stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: stats.cache_misses.load(Ordering::Relaxed),
        }
    }
}

impl Inner {
    fn shutdown(&self) -> Vec<CloseFailure> {
        let frames = self.scopes.lock().drain();
        frames
            .into_iter()
            .flat_map(|frame| self.close_frame(frame))
            .collect()
    }

    /// 驱逐并关闭 `frame` 中实例化的提供者，最新的先关闭。
    fn close_frame(&self, frame: Frame) -> Vec<CloseFailure> {
        let mut failures = Vec::new();
        let mut closed: Vec<Arc<dyn Provider>> = Vec::new();
        for base in frame.realized.iter().rev() {
            self.resolved.remove(base);
            let Some((_, slot)) = self.instances.remove(base) else {
                continue;
            };
            let provider = {
                let mut state = slot.state.lock();
                match std::mem::take(&mut *state) {
                    SlotState::Ready(provider) => provider,
                    other => {
                        *state = other;
                        continue;
                    }
                }
            };
            // 共享实例登记在多个基础名下时只关闭一次
            if closed.iter().any(|seen| same_provider(seen, &provider)) {
                tracing::debug!(base = %base, "provider already closed under another name");
                continue;
            }
            match provider.close() {
                Ok(()) => tracing::debug!(base = %base, "closed provider"),
                Err(source) => {
                    tracing::warn!(base = %base, error = %source, "provider failed to close");
                    failures.push(CloseFailure {
                        base: base.clone(),
                        source,
                    });
                }
            }
            closed.push(provider);
        }
        failures
    }
}

fn same_provider(a: &Arc<dyn Provider>, b: &Arc<dyn Provider>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for failure in self.shutdown() {
            tracing::warn!(base = %failure.base, error = %failure.source, "provider failed to close on drop");
        }
    }
}

impl Default for Injector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("bindings", &self.inner.bindings.len())
            .field("realized", &self.inner.instances.len())
            .field("depth", &self.depth())
            .field("closed", &self.is_closed())
            .finish()
    }
}
