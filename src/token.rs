//! 依赖令牌：`base` 或 `base:subkey`
//!
//! 只有基础名用于选择绑定。子键（如果有）会交给提供者，
//! 因此一个提供者可以应答整个命名空间（`config:db.host`、`config:db.port` 等）。

use std::fmt;
use std::str::FromStr;

use crate::errors::InjectorError;

/// 依赖令牌
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    /// 基础名
    base: String,
    /// 子键
    subkey: Option<String>,
}

impl Token {
    /// 创建不带子键的令牌
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            subkey: None,
        }
    }

    /// 创建带子键的令牌，空子键视为无子键
    pub fn with_subkey(base: impl Into<String>, subkey: impl Into<String>) -> Self {
        let subkey = subkey.into();
        Self {
            base: base.into(),
            subkey: if subkey.is_empty() { None } else { Some(subkey) },
        }
    }

    /// 按第一个 `:` 拆分注解，`"base:"` 没有子键。
    pub fn parse(note: &str) -> Result<Self, InjectorError> {
        let token = Token::from(note);
        if token.base.is_empty() {
            return Err(InjectorError::InvalidToken {
                token: note.to_string(),
                reason: "base name is empty".to_string(),
            });
        }
        Ok(token)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn subkey(&self) -> Option<&str> {
        self.subkey.as_deref()
    }

    pub fn has_subkey(&self) -> bool {
        self.subkey.is_some()
    }

    /// 校验注册用的名称：非空，且不含子键部分
    pub(crate) fn validate_base(base: &str) -> Result<(), InjectorError> {
        if base.is_empty() {
            return Err(InjectorError::InvalidToken {
                token: base.to_string(),
                reason: "base name is empty".to_string(),
            });
        }
        if base.contains(':') {
            return Err(InjectorError::InvalidToken {
                token: base.to_string(),
                reason: "bindings are registered by base name only".to_string(),
            });
        }
        Ok(())
    }
}

impl From<&str> for Token {
    fn from(note: &str) -> Self {
        match note.split_once(':') {
            Some((base, subkey)) => Token::with_subkey(base, subkey),
            None => Token::new(note),
        }
    }
}

impl From<String> for Token {
    fn from(note: String) -> Self {
        Token::from(note.as_str())
    }
}

impl From<&Token> for Token {
    fn from(token: &Token) -> Self {
        token.clone()
    }
}

impl From<(&str, &str)> for Token {
    fn from((base, subkey): (&str, &str)) -> Self {
        Token::with_subkey(base, subkey)
    }
}

impl FromStr for Token {
    type Err = InjectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Token::parse(s)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subkey {
            Some(subkey) => write!(f, "{}:{}", self.base, subkey),
            None => f.write_str(&self.base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_colon_only() {
        let token = Token::from("config:db:primary.host");
        assert_eq!(token.base(), "config");
        assert_eq!(token.subkey(), Some("db:primary.host"));
        assert_eq!(token.to_string(), "config:db:primary.host");
    }

    #[test]
    fn trailing_colon_means_no_subkey() {
        let token = Token::from("hello:");
        assert_eq!(token, Token::new("hello"));
        assert!(!token.has_subkey());
    }

    #[test]
    fn pair_form() {
        assert_eq!(Token::from(("hello", "name")), Token::from("hello:name"));
    }

    #[test]
    fn empty_base_rejected() {
        assert!(matches!(
            ":thing".parse::<Token>(),
            Err(InjectorError::InvalidToken { .. })
        ));
    }

    #[test]
    fn registration_base_validation() {
        assert!(Token::validate_base("db").is_ok());
        assert!(Token::validate_base("db:users").is_err());
        assert!(Token::validate_base("").is_err());
    }
}
