use std::fmt;
use thiserror::Error;

/// 注入器错误类型，由 `get`、`apply`、`partial` 以及注册和作用域操作返回
#[derive(Debug, Error)]
pub enum InjectorError {
    /// 令牌可识别，但提供者无法给出值
    #[error("'{token}' is recognized but unset: {reason}")]
    UnsetDependency { token: String, reason: String },

    /// 没有可满足该令牌的绑定
    #[error("unsatisfied dependency '{token}'{}: {reason}", parameter_suffix(.parameter))]
    UnsatisfiedDependency {
        token: String,
        parameter: Option<String>,
        reason: String,
    },

    /// 基础名已解析后再次绑定
    #[error("cannot rebind '{base}': it has already been resolved")]
    RebindingError { base: String },

    /// 注入器已关闭
    #[error("injector is closed")]
    InjectorClosed,

    /// 关闭时一个或多个提供者失败
    #[error(transparent)]
    CloseAggregate(#[from] CloseAggregateError),

    /// 退出的不是最内层作用域
    #[error("scope mismatch: tried to exit {requested}, but the innermost scope is {innermost}")]
    ScopeMismatch { requested: String, innermost: String },

    /// 提供者实例化过程中再次请求自身
    #[error("circular dependency: '{base}' was requested while it was being realized")]
    CircularDependency { base: String },

    /// 令牌格式无效
    #[error("invalid token '{token}': {reason}")]
    InvalidToken { token: String, reason: String },

    /// 提供者失败
    #[error("provider for '{token}' failed: {source}")]
    Provider {
        token: String,
        #[source]
        source: ProviderError,
    },

    /// 参数缺失
    #[error("missing argument '{0}'")]
    MissingArgument(String),

    /// 参数类型不符
    #[error("argument '{name}' is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },
}

impl InjectorError {
    /// 是否属于可选注解可以容忍的两种失败
    pub fn is_unsatisfied(&self) -> bool {
        matches!(
            self,
            InjectorError::UnsetDependency { .. } | InjectorError::UnsatisfiedDependency { .. }
        )
    }

    /// 将提供者错误映射为注入器错误。`Unset` 与不支持的子键都视为"未设置"，
    /// 以便 maybe 注解可以容忍它们。
    pub(crate) fn from_provider(token: impl fmt::Display, err: ProviderError) -> Self {
        match err {
            ProviderError::Unset(reason) => InjectorError::UnsetDependency {
                token: token.to_string(),
                reason,
            },
            ProviderError::UnsupportedSubkey(subkey) => InjectorError::UnsetDependency {
                token: token.to_string(),
                reason: format!("subkey '{}' not supported by this provider", subkey),
            },
            source => InjectorError::Provider {
                token: token.to_string(),
                source,
            },
        }
    }

    pub(crate) fn unbound(token: impl fmt::Display) -> Self {
        InjectorError::UnsatisfiedDependency {
            token: token.to_string(),
            parameter: None,
            reason: "no binding registered".to_string(),
        }
    }

    /// 为解析失败附加参数名
    pub(crate) fn for_parameter(self, param: &str) -> Self {
        match self {
            InjectorError::UnsatisfiedDependency { token, reason, .. } => {
                InjectorError::UnsatisfiedDependency {
                    token,
                    parameter: Some(param.to_string()),
                    reason,
                }
            }
            InjectorError::UnsetDependency { token, reason } => InjectorError::UnsatisfiedDependency {
                token,
                parameter: Some(param.to_string()),
                reason,
            },
            other => other,
        }
    }
}

fn parameter_suffix(parameter: &Option<String>) -> String {
    match parameter {
        Some(p) => format!(" for parameter '{}'", p),
        None => String::new(),
    }
}

/// 提供者在 `get` 或 `close` 中报告的错误
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 没有对应的值
    #[error("no value for {0}")]
    Unset(String),

    /// 不支持该子键
    #[error("subkey '{0}' not supported by this provider")]
    UnsupportedSubkey(String),

    /// 其他失败
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl ProviderError {
    pub fn unset(what: impl Into<String>) -> Self {
        ProviderError::Unset(what.into())
    }

    pub fn failed(msg: impl fmt::Display) -> Self {
        ProviderError::Failed(anyhow::anyhow!("{}", msg))
    }
}

/// 作用域退出或关闭时 `close` 失败的单个提供者
#[derive(Debug)]
pub struct CloseFailure {
    pub base: String,
    pub source: ProviderError,
}

impl fmt::Display for CloseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {}", self.base, self.source)
    }
}

/// 拆除作用域或注入器时收集到的全部关闭失败
#[derive(Debug, Error)]
pub struct CloseAggregateError {
    pub failures: Vec<CloseFailure>,
}

impl CloseAggregateError {
    /// 关闭失败的基础名，按关闭顺序
    pub fn bases(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.base.as_str()).collect()
    }
}

impl fmt::Display for CloseAggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} provider(s) failed to close", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  {}", failure)?;
        }
        Ok(())
    }
}

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
    #[error("Failed to deserialize config section '{0}': {1}")]
    Section(String, #[source] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, InjectorError>;
