//! 注解、参数集合与可注入调用接口
//!
//! [`Annotation`] 是一张旁路表，描述可调用对象的哪些参数需要注入、来自哪个令牌。
//! 注入器据此填充 [`Arguments`]，再交给 [`Injectable::invoke`]。

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{InjectorError, Result};
use crate::provider::{dependency, Dependency};
use crate::token::Token;

/// 注解参数的必需程度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// 解析失败则中止调用
    Required,
    /// 令牌未满足或未设置时省略该参数
    Maybe,
}

/// 单个注解参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// 参数名
    pub param: String,
    /// 依赖令牌
    pub token: Token,
    /// 必需程度
    pub requirement: Requirement,
}

/// 一个可调用对象的有序参数 → 令牌注解
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    notes: Vec<Note>,
}

impl Annotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加必需注解
    pub fn require(self, param: impl Into<String>, token: impl Into<Token>) -> Self {
        self.note(param, token, Requirement::Required)
    }

    /// 添加可选注解
    pub fn maybe(self, param: impl Into<String>, token: impl Into<Token>) -> Self {
        self.note(param, token, Requirement::Maybe)
    }

    /// 添加注解；同一参数重复注解时原位替换旧注解
    pub fn note(mut self, param: impl Into<String>, token: impl Into<Token>, requirement: Requirement) -> Self {
        let note = Note {
            param: param.into(),
            token: token.into(),
            requirement,
        };
        match self.notes.iter_mut().find(|n| n.param == note.param) {
            Some(existing) => *existing = note,
            None => self.notes.push(note),
        }
        self
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

/// 交给可调用对象的具名参数集合
#[derive(Clone, Default)]
pub struct Arguments {
    values: HashMap<String, Dependency>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// [`Arguments::insert`] 的构建器形式
    pub fn with<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, dependency(value));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Dependency) -> Option<Dependency> {
        self.values.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Dependency> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn raw(&self, name: &str) -> Option<&Dependency> {
        self.values.get(name)
    }

    /// 按类型取出参数，缺失或类型不符时返回错误
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| InjectorError::MissingArgument(name.to_string()))?;
        value.clone().downcast::<T>().map_err(|_| InjectorError::TypeMismatch {
            name: name.to_string(),
            expected: type_name::<T>(),
        })
    }

    /// 克隆取出值，适合小的 `Clone` 类型
    pub fn value<T: Any + Send + Sync + Clone>(&self, name: &str) -> Result<T> {
        self.get::<T>(name).map(|v| (*v).clone())
    }

    /// 参数不存在时返回 `Ok(None)`
    pub fn optional<T: Any + Send + Sync>(&self, name: &str) -> Result<Option<Arc<T>>> {
        if self.contains(name) {
            self.get(name).map(Some)
        } else {
            Ok(None)
        }
    }

    /// 合并 `other` 的全部值，同名覆盖
    pub fn merge(&mut self, other: Arguments) {
        self.values.extend(other.values);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dependency)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IntoIterator for Arguments {
    type Item = (String, Dependency);
    type IntoIter = std::collections::hash_map::IntoIter<String, Dependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Arguments").field("names", &names).finish()
    }
}

/// 可由注入器调用的对象
pub trait Injectable {
    /// 返回值类型
    type Output;

    /// 参数注解
    fn annotation(&self) -> &Annotation;

    /// 可调用对象是否为 `param` 提供了自身默认值
    fn has_default(&self, _param: &str) -> bool {
        false
    }

    /// 以填充好的参数调用
    fn invoke(&self, args: Arguments) -> Self::Output;
}

impl<C: Injectable + ?Sized> Injectable for &C {
    type Output = C::Output;

    fn annotation(&self) -> &Annotation {
        (**self).annotation()
    }

    fn has_default(&self, param: &str) -> bool {
        (**self).has_default(param)
    }

    fn invoke(&self, args: Arguments) -> Self::Output {
        (**self).invoke(args)
    }
}

impl<C: Injectable + ?Sized> Injectable for Arc<C> {
    type Output = C::Output;

    fn annotation(&self) -> &Annotation {
        (**self).annotation()
    }

    fn has_default(&self, param: &str) -> bool {
        (**self).has_default(param)
    }

    fn invoke(&self, args: Arguments) -> Self::Output {
        (**self).invoke(args)
    }
}

/// 带注解和参数默认值的闭包
#[derive(Clone)]
pub struct Annotated<F> {
    annotation: Annotation,
    defaults: Arguments,
    func: F,
}

impl<F, R> Annotated<F>
where
    F: Fn(Arguments) -> R,
{
    pub fn new(annotation: Annotation, func: F) -> Self {
        Self {
            annotation,
            defaults: Arguments::new(),
            func,
        }
    }

    /// 声明参数的自身默认值。调用方和注入器都未提供该参数时生效。
    pub fn with_default<T: Any + Send + Sync>(mut self, param: impl Into<String>, value: T) -> Self {
        self.defaults.insert(param, dependency(value));
        self
    }
}

impl<F, R> Injectable for Annotated<F>
where
    F: Fn(Arguments) -> R,
{
    type Output = R;

    fn annotation(&self) -> &Annotation {
        &self.annotation
    }

    fn has_default(&self, param: &str) -> bool {
        self.defaults.contains(param)
    }

    fn invoke(&self, mut args: Arguments) -> R {
        for (name, value) in &self.defaults.values {
            if !args.contains(name) {
                args.insert(name.clone(), value.clone());
            }
        }
        (self.func)(args)
    }
}

impl<F> fmt::Debug for Annotated<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Annotated")
            .field("annotation", &self.annotation)
            .field("defaults", &self.defaults)
            .finish()
    }
}
