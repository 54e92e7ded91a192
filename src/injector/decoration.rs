//! 按精确令牌登记的解析后钩子

use std::sync::Arc;

use super::Injector;
use crate::errors::{InjectorError, ProviderError, Result};
use crate::provider::Dependency;
use crate::token::Token;

type DecorateFn = dyn Fn(Dependency) -> std::result::Result<Dependency, ProviderError> + Send + Sync;
type ConfigureFn = dyn Fn(&Dependency) + Send + Sync;

#[derive(Clone)]
pub(crate) enum Decoration {
    /// 返回值替换解析结果
    Decorate(Arc<DecorateFn>),
    /// 只观察值，不替换
    Configure(Arc<ConfigureFn>),
}

impl Injector {
    /// 变换每个精确解析自 `token` 的值
    pub fn decorate<F>(&self, token: impl Into<Token>, f: F) -> Result<()>
    where
        F: Fn(Dependency) -> std::result::Result<Dependency, ProviderError> + Send + Sync + 'static,
    {
        self.add_decoration(token.into(), Decoration::Decorate(Arc::new(f)))
    }

    /// 观察每个解析自 `token` 的值，只能用于基础令牌
    pub fn configure<F>(&self, token: impl Into<Token>, f: F) -> Result<()>
    where
        F: Fn(&Dependency) + Send + Sync + 'static,
    {
        let token = token.into();
        if token.has_subkey() {
            return Err(InjectorError::InvalidToken {
                token: token.to_string(),
                reason: "configure applies to base tokens only".to_string(),
            });
        }
        self.add_decoration(token, Decoration::Configure(Arc::new(f)))
    }

    fn add_decoration(&self, token: Token, decoration: Decoration) -> Result<()> {
        self.ensure_open()?;
        tracing::debug!(token = %token, "registered decoration");
        self.inner.decorations.entry(token).or_default().push(decoration);
        Ok(())
    }

    pub(super) fn decorate_value(&self, token: &Token, mut value: Dependency) -> Result<Dependency> {
        let decorations = match self.inner.decorations.get(token) {
            Some(list) => list.value().clone(),
            None => return Ok(value),
        };
        for decoration in decorations {
            match decoration {
                Decoration::Decorate(f) => {
                    value = f(value).map_err(|err| InjectorError::from_provider(token, err))?;
                }
                Decoration::Configure(f) => f(&value),
            }
        }
        Ok(value)
    }
}
