//! jeni：依赖聚合
//!
//! 可调用对象通过 [`Annotation`] 声明所需的具名依赖；[`Injector`]
//! 从已注册的提供者中取得这些依赖并缓存已实例化的提供者，
//! 在作用域结束时按创建的逆序关闭它们。
//!
//! ```
//! use jeni::{Annotated, Annotation, Arguments, Injector};
//!
//! let injector = Injector::new();
//! injector.value("greeting", "hello").unwrap();
//!
//! let greet = Annotated::new(Annotation::new().require("greeting", "greeting"), |args: Arguments| {
//!     args.value::<&'static str>("greeting").unwrap()
//! });
//! assert_eq!(injector.apply(&greet).unwrap(), "hello");
//! ```

pub mod annotation;
pub mod config;
pub mod errors;
pub mod injector;
pub mod logging;
pub mod provider;
pub mod token;

// 重新导出常用类型
pub use annotation::{Annotated, Annotation, Arguments, Injectable, Note, Requirement};
pub use config::ConfigProvider;
pub use errors::{CloseAggregateError, CloseFailure, ConfigError, InjectorError, ProviderError, Result};
pub use injector::{BoundCall, Injector, ResolutionStats, ScopeGuard, ScopeHandle, Strategy, Timing};
pub use provider::{dependency, Dependency, FactoryProvider, FnProvider, Provider, Resource};
pub use token::Token;
