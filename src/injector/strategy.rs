//! 绑定策略：立即调用，或返回绑定后的调用

use std::sync::Weak;

use super::{Injector, Inner};
use crate::annotation::{Arguments, Injectable, Requirement};
use crate::errors::{InjectorError, Result};

/// 调用方已提供注解参数时以谁为准
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// 保留调用方提供的值
    #[default]
    Strict,
    /// 注入值覆盖调用方提供的值
    Regardless,
}

/// 绑定调用何时解析依赖
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    /// 绑定时解析，缺少依赖则绑定失败
    Eager,
    /// 每次调用时解析
    Lazy,
}

pub(crate) struct Prepared {
    args: Arguments,
    injected: Vec<String>,
}

impl Injector {
    /// 按注解顺序把目标的依赖填入 `supplied`。必需依赖失败时在调用前中止。
    pub(crate) fn prepare<C>(&self, target: &C, supplied: Arguments, strategy: Strategy) -> Result<Prepared>
    where
        C: Injectable + ?Sized,
    {
        self.ensure_open()?;
        let mut args = supplied;
        let mut injected = Vec::new();

        for note in target.annotation().notes() {
            let caller_supplied = args.contains(&note.param);
            if caller_supplied && strategy == Strategy::Strict {
                tracing::trace!(param = %note.param, "caller supplied value, not injecting");
                continue;
            }

            match self.resolve(&note.token, &[]) {
                Ok(value) => {
                    args.insert(note.param.clone(), value);
                    injected.push(note.param.clone());
                }
                Err(err) if err.is_unsatisfied() => match note.requirement {
                    Requirement::Maybe => {
                        tracing::debug!(
                            param = %note.param,
                            token = %note.token,
                            has_default = target.has_default(&note.param),
                            "optional dependency unavailable, omitting"
                        );
                    }
                    Requirement::Required if caller_supplied => {
                        tracing::debug!(
                            param = %note.param,
                            token = %note.token,
                            "required dependency unavailable, keeping caller value"
                        );
                    }
                    Requirement::Required => return Err(err.for_parameter(&note.param)),
                },
                Err(err) => return Err(err),
            }
        }

        Ok(Prepared { args, injected })
    }

    /// 解析目标的依赖并立即调用
    pub fn apply<C: Injectable + ?Sized>(&self, target: &C) -> Result<C::Output> {
        self.apply_inner(target, Arguments::new(), Strategy::Strict)
    }

    /// 同 [`Injector::apply`]，保留调用方提供的参数
    pub fn apply_with<C: Injectable + ?Sized>(&self, target: &C, supplied: Arguments) -> Result<C::Output> {
        self.apply_inner(target, supplied, Strategy::Strict)
    }

    /// 立即调用，注入值优先
    pub fn apply_regardless<C: Injectable + ?Sized>(&self, target: &C) -> Result<C::Output> {
        self.apply_inner(target, Arguments::new(), Strategy::Regardless)
    }

    /// 同 [`Injector::apply_with`]，但注入值覆盖调用方的值
    pub fn apply_regardless_with<C: Injectable + ?Sized>(
        &self,
        target: &C,
        supplied: Arguments,
    ) -> Result<C::Output> {
        self.apply_inner(target, supplied, Strategy::Regardless)
    }

    fn apply_inner<C: Injectable + ?Sized>(
        &self,
        target: &C,
        supplied: Arguments,
        strategy: Strategy,
    ) -> Result<C::Output> {
        let prepared = self.prepare(target, supplied, strategy)?;
        Ok(target.invoke(prepared.args))
    }

    /// 解析和调用都推迟到绑定调用执行时
    pub fn partial<C: Injectable>(&self, target: C) -> Result<BoundCall<C>> {
        self.bind(target, Arguments::new(), Strategy::Strict, Timing::Lazy)
    }

    /// 延迟绑定，注入值优先
    pub fn partial_regardless<C: Injectable>(&self, target: C) -> Result<BoundCall<C>> {
        self.bind(target, Arguments::new(), Strategy::Regardless, Timing::Lazy)
    }

    /// 立即解析，稍后调用
    pub fn eager_partial<C: Injectable>(&self, target: C) -> Result<BoundCall<C>> {
        self.bind(target, Arguments::new(), Strategy::Strict, Timing::Eager)
    }

    /// 立即解析，注入值优先
    pub fn eager_partial_regardless<C: Injectable>(&self, target: C) -> Result<BoundCall<C>> {
        self.bind(target, Arguments::new(), Strategy::Regardless, Timing::Eager)
    }

    /// 各 partial 操作的通用形式
    pub fn bind<C: Injectable>(
        &self,
        target: C,
        supplied: Arguments,
        strategy: Strategy,
        timing: Timing,
    ) -> Result<BoundCall<C>> {
        self.ensure_open()?;
        let bound = match timing {
            Timing::Eager => {
                let prepared = self.prepare(&target, supplied, strategy)?;
                Bound::Resolved {
                    args: prepared.args,
                    injected: prepared.injected,
                }
            }
            Timing::Lazy => Bound::Deferred {
                injector: self.downgrade(),
                supplied,
            },
        };
        Ok(BoundCall {
            target,
            strategy,
            bound,
        })
    }
}

enum Bound {
    Resolved { args: Arguments, injected: Vec<String> },
    Deferred { injector: Weak<Inner>, supplied: Arguments },
}

/// 绑定后的调用：目标加上已解析的参数，或稍后解析所需的信息。
///
/// 延迟调用只弱引用注入器：注入器释放或关闭后，调用返回 [`InjectorError::InjectorClosed`]。
pub struct BoundCall<C> {
    target: C,
    strategy: Strategy,
    bound: Bound,
}

impl<C: Injectable> BoundCall<C> {
    /// 不带额外参数调用
    pub fn call(&self) -> Result<C::Output> {
        self.call_with(Arguments::new())
    }

    /// 带额外参数调用。[`Strategy::Strict`] 下额外参数覆盖已有参数；
    /// [`Strategy::Regardless`] 下注入值优先。
    pub fn call_with(&self, extra: Arguments) -> Result<C::Output> {
        match &self.bound {
            Bound::Resolved { args, injected } => {
                let mut merged = args.clone();
                for (name, value) in extra {
                    if self.strategy == Strategy::Regardless && injected.contains(&name) {
                        continue;
                    }
                    merged.insert(name, value);
                }
                Ok(self.target.invoke(merged))
            }
            Bound::Deferred { injector, supplied } => {
                let injector = Injector::upgrade(injector).ok_or(InjectorError::InjectorClosed)?;
                let mut args = supplied.clone();
                args.merge(extra);
                let prepared = injector.prepare(&self.target, args, self.strategy)?;
                Ok(self.target.invoke(prepared.args))
            }
        }
    }

    /// 是否已在绑定时解析
    pub fn is_resolved(&self) -> bool {
        matches!(self.bound, Bound::Resolved { .. })
    }

    /// 立即绑定调用的已解析参数
    pub fn arguments(&self) -> Option<&Arguments> {
        match &self.bound {
            Bound::Resolved { args, .. } => Some(args),
            Bound::Deferred { .. } => None,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn target(&self) -> &C {
        &self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Annotated, Annotation};
    use crate::errors::ProviderError;
    use crate::provider::FnProvider;

    fn greet() -> Annotated<impl Fn(Arguments) -> String + Clone> {
        Annotated::new(
            Annotation::new().require("greeting", "greeting").maybe("name", "name"),
            |args: Arguments| {
                format!(
                    "{}, {}",
                    args.value::<&'static str>("greeting").unwrap(),
                    args.value::<&'static str>("name").unwrap()
                )
            },
        )
        .with_default("name", "stranger")
    }

    #[test]
    fn strict_keeps_caller_value() {
        let injector = Injector::new();
        injector.value("greeting", "hello").unwrap();
        injector.value("name", "world").unwrap();

        let supplied = Arguments::new().with("name", "caller");
        assert_eq!(injector.apply_with(&greet(), supplied.clone()).unwrap(), "hello, caller");
        assert_eq!(
            injector.apply_regardless_with(&greet(), supplied).unwrap(),
            "hello, world"
        );
    }

    #[test]
    fn maybe_falls_back_to_callable_default() {
        let injector = Injector::new();
        injector.value("greeting", "hi").unwrap();
        assert_eq!(injector.apply(&greet()).unwrap(), "hi, stranger");
    }

    #[test]
    fn required_caller_value_survives_regardless_when_unbound() {
        let injector = Injector::new();
        let supplied = Arguments::new().with("greeting", "hey");
        assert_eq!(
            injector.apply_regardless_with(&greet(), supplied).unwrap(),
            "hey, stranger"
        );
        assert!(matches!(
            injector.apply(&greet()),
            Err(InjectorError::UnsatisfiedDependency { parameter: Some(ref p), .. }) if p == "greeting"
        ));
    }

    #[test]
    fn lazy_partial_resolves_at_call_time() {
        let injector = Injector::new();
        let bound = injector.partial(greet()).unwrap();
        assert!(!bound.is_resolved());
        assert!(bound.call().is_err());

        injector.value("greeting", "late").unwrap();
        assert_eq!(bound.call().unwrap(), "late, stranger");
    }

    #[test]
    fn eager_partial_fails_at_bind_time() {
        let injector = Injector::new();
        assert!(matches!(
            injector.eager_partial(greet()),
            Err(InjectorError::UnsatisfiedDependency { .. })
        ));
    }

    #[test]
    fn call_with_precedence_follows_strategy() {
        let injector = Injector::new();
        injector.value("greeting", "hello").unwrap();
        injector.value("name", "world").unwrap();

        let strict = injector.eager_partial(greet()).unwrap();
        let extra = Arguments::new().with("name", "later");
        assert_eq!(strict.call_with(extra.clone()).unwrap(), "hello, later");

        let regardless = injector.eager_partial_regardless(greet()).unwrap();
        assert_eq!(regardless.call_with(extra).unwrap(), "hello, world");
        assert_eq!(regardless.strategy(), Strategy::Regardless);
    }

    #[test]
    fn provider_failures_are_not_swallowed_by_maybe() {
        let injector = Injector::new();
        injector.value("greeting", "hello").unwrap();
        injector
            .provider(
                "name",
                FnProvider::new(|_, _| Err(ProviderError::failed("backend down"))),
            )
            .unwrap();
        assert!(matches!(
            injector.apply(&greet()),
            Err(InjectorError::Provider { .. })
        ));
    }

    #[test]
    fn unset_provider_value_is_tolerated_by_maybe() {
        let injector = Injector::new();
        injector.value("greeting", "hello").unwrap();
        injector
            .provider("name", FnProvider::new(|_, _| Err(ProviderError::unset("name"))))
            .unwrap();
        assert_eq!(injector.apply(&greet()).unwrap(), "hello, stranger");
    }

    #[test]
    fn deferred_call_after_drop_reports_closed() {
        let bound = {
            let injector = Injector::new();
            injector.value("greeting", "hello").unwrap();
            injector.partial(greet()).unwrap()
        };
        assert!(matches!(bound.call(), Err(InjectorError::InjectorClosed)));
    }
}
