//! 作用域栈：已实例化提供者的嵌套生命周期

use std::fmt;
use std::time::Instant;
use uuid::Uuid;

use super::Injector;
use crate::errors::{CloseAggregateError, InjectorError, Result};

/// 已进入作用域的标识，由 [`Injector::enter`] 返回
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeHandle {
    id: Uuid,
    depth: usize,
}

impl ScopeHandle {
    /// 作用域ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 深度，最外层进入的作用域为 1
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl fmt::Display for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope #{} ({})", self.depth, self.id)
    }
}

/// 作用域帧
pub(crate) struct Frame {
    id: Uuid,
    /// 进入时间
    entered_at: Instant,
    /// 按实例化顺序记录的基础名
    pub(crate) realized: Vec<String>,
}

impl Frame {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            entered_at: Instant::now(),
            realized: Vec::new(),
        }
    }
}

/// 第 0 帧是注入器自身的生命周期，只会被 `drain` 移除
pub(crate) struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub(crate) fn new() -> Self {
        Self {
            frames: vec![Frame::new(Uuid::nil())],
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    fn push(&mut self) -> ScopeHandle {
        let id = Uuid::new_v4();
        self.frames.push(Frame::new(id));
        ScopeHandle {
            id,
            depth: self.depth(),
        }
    }

    fn pop(&mut self, handle: ScopeHandle) -> Result<Frame> {
        let top_id = self.frames.last().map(|top| top.id);
        if self.frames.len() > 1 && top_id == Some(handle.id) {
            if let Some(frame) = self.frames.pop() {
                return Ok(frame);
            }
        }
        let innermost = match self.frames.last() {
            Some(top) if self.frames.len() > 1 => ScopeHandle {
                id: top.id,
                depth: self.depth(),
            }
            .to_string(),
            _ => "the injector's base scope".to_string(),
        };
        Err(InjectorError::ScopeMismatch {
            requested: handle.to_string(),
            innermost,
        })
    }

    /// 把 `base` 记入最内层帧（`pinned` 时记入基础帧），返回所在深度。
    /// 栈已被 `drain` 清空时返回 `None`。
    pub(crate) fn record(&mut self, base: &str, pinned: bool) -> Option<usize> {
        let index = if pinned { 0 } else { self.frames.len().checked_sub(1)? };
        self.frames.get_mut(index)?.realized.push(base.to_string());
        Some(index)
    }

    /// 移除全部帧，最内层在前
    pub(crate) fn drain(&mut self) -> Vec<Frame> {
        let mut frames: Vec<Frame> = self.frames.drain(..).collect();
        frames.reverse();
        frames
    }
}

impl Injector {
    /// 进入新作用域。在其为最内层时首次实例化的提供者，会在退出时关闭
    pub fn enter(&self) -> Result<ScopeHandle> {
        self.ensure_open()?;
        let handle = self.inner.scopes.lock().push();
        tracing::debug!(scope = %handle, "entered scope");
        Ok(handle)
    }

    /// 退出最内层作用域，按最新优先关闭其提供者。
    ///
    /// `handle` 必须指向最内层作用域，否则不弹出任何帧。
    pub fn exit(&self, handle: ScopeHandle) -> Result<()> {
        self.ensure_open()?;
        let frame = self.inner.scopes.lock().pop(handle)?;
        let lived = frame.entered_at.elapsed();
        let realized = frame.realized.len();
        let failures = self.inner.close_frame(frame);
        tracing::debug!(scope = %handle, realized, ?lived, failures = failures.len(), "exited scope");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CloseAggregateError { failures }.into())
        }
    }

    /// 进入作用域，守卫释放时自动退出
    pub fn scope(&self) -> Result<ScopeGuard<'_>> {
        let handle = self.enter()?;
        Ok(ScopeGuard {
            injector: self,
            handle: Some(handle),
        })
    }

    /// 在新作用域中执行 `f`，任何路径都会退出作用域
    pub fn scoped<R>(&self, f: impl FnOnce(&Injector) -> R) -> Result<R> {
        let guard = self.scope()?;
        let result = f(self);
        guard.exit()?;
        Ok(result)
    }

    /// 已进入且尚未退出的作用域数量
    pub fn depth(&self) -> usize {
        self.inner.scopes.lock().depth()
    }
}

/// 释放时退出作用域的守卫。需要获取关闭失败时调用 [`ScopeGuard::exit`]，否则失败只记录日志
#[must_use = "the scope exits as soon as the guard is dropped"]
pub struct ScopeGuard<'a> {
    injector: &'a Injector,
    handle: Option<ScopeHandle>,
}

impl ScopeGuard<'_> {
    pub fn handle(&self) -> Option<ScopeHandle> {
        self.handle
    }

    pub fn exit(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self.injector.exit(handle),
            None => Ok(()),
        }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = self.injector.exit(handle) {
                tracing::error!(scope = %handle, error = %err, "failed to exit scope");
            }
        }
    }
}
