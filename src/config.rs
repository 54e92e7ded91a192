//! 基于 TOML 的配置提供者
//!
//! 与其他提供者一样注册（通常名为 `config`），应答点分子键：
//! `config:db.host`、`config:db.port` 等。

use serde::de::DeserializeOwned;
use std::path::Path;
use std::{env, fs};

use crate::errors::{ConfigError, ProviderError};
use crate::provider::{dependency, Dependency, Provider};

/// 配置提供者
#[derive(Debug, Clone, Default)]
pub struct ConfigProvider {
    root: toml::Table,
}

impl ConfigProvider {
    pub fn new(root: toml::Table) -> Self {
        Self { root }
    }

    /// 从 TOML 字符串加载
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let root = source
            .parse::<toml::Table>()
            .map_err(|e| ConfigError::TomlParse("<string>".to_string(), e))?;
        Ok(Self { root })
    }

    /// 从文件加载
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::FileRead(shown.clone(), e))?;
        let root = content
            .parse::<toml::Table>()
            .map_err(|e| ConfigError::TomlParse(shown.clone(), e))?;
        tracing::debug!(path = %shown, keys = root.len(), "loaded configuration");
        Ok(Self { root })
    }

    /// 应用进程环境变量中 `PREFIX_A__B=value` 形式的覆盖
    pub fn with_env_overrides(self, prefix: &str) -> Self {
        self.with_overrides(prefix, env::vars())
    }

    /// 从 `(name, value)` 对应用覆盖。名称必须以 `PREFIX_` 开头，
    /// 其余部分转为小写并以 `__` 分隔路径段。值按 TOML 标量解析，失败时作为字符串。
    pub fn with_overrides<I>(mut self, prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let wanted = format!("{}_", prefix);
        for (name, raw) in vars {
            let Some(rest) = name.strip_prefix(&wanted) else {
                continue;
            };
            let path: Vec<String> = rest.split("__").map(|s| s.to_lowercase()).collect();
            if path.iter().any(|s| s.is_empty()) {
                tracing::warn!(variable = %name, "ignoring malformed config override");
                continue;
            }
            tracing::debug!(variable = %name, key = %path.join("."), "config override");
            set_path(&mut self.root, &path, parse_scalar(&raw));
        }
        self
    }

    /// 按点分路径查找值
    pub fn lookup(&self, key: &str) -> Option<&toml::Value> {
        let mut segments = key.split('.');
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = current.as_table()?.get(segment)?;
        }
        Some(current)
    }

    /// 把 `key` 处的表反序列化为类型化配置段
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let value = self
            .lookup(key)
            .cloned()
            .unwrap_or_else(|| toml::Value::Table(toml::Table::new()));
        value
            .try_into()
            .map_err(|e| ConfigError::Section(key.to_string(), e))
    }

    pub fn root(&self) -> &toml::Table {
        &self.root
    }
}

impl Provider for ConfigProvider {
    fn get(&self, subkey: Option<&str>, _extra: &[Dependency]) -> Result<Dependency, ProviderError> {
        match subkey {
            None => Ok(dependency(self.root.clone())),
            Some(key) => self
                .lookup(key)
                .map(leaf)
                .ok_or_else(|| ProviderError::unset(format!("config key '{}'", key))),
        }
    }
}

fn leaf(value: &toml::Value) -> Dependency {
    match value {
        toml::Value::String(s) => dependency(s.clone()),
        toml::Value::Integer(i) => dependency(*i),
        toml::Value::Float(f) => dependency(*f),
        toml::Value::Boolean(b) => dependency(*b),
        other => dependency(other.clone()),
    }
}

fn parse_scalar(raw: &str) -> toml::Value {
    format!("v = {}", raw)
        .parse::<toml::Table>()
        .ok()
        .and_then(|mut t| t.remove("v"))
        .filter(|v| !v.is_table() && !v.is_array())
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

fn set_path(table: &mut toml::Table, path: &[String], value: toml::Value) {
    let (last, parents) = match path.split_last() {
        Some(split) => split,
        None => return,
    };
    let mut current = table;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if !entry.is_table() {
            *entry = toml::Value::Table(toml::Table::new());
        }
        current = match entry {
            toml::Value::Table(t) => t,
            _ => return,
        };
    }
    current.insert(last.clone(), value);
}
