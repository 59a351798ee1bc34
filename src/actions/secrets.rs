//! 密钥存储：按名称查找 app key
//!
//! 缺失是软失败（记录日志，返回空字符串，下游请求通常会自然失败）。
//! 值形如 `domain,value` 时，请求 URL 的 host 必须与 domain 一致，否则返回 AppKeyDomainMismatch。

use std::collections::HashMap;

use url::Url;

use crate::core::SessionError;

/// 环境变量式的密钥查找
pub trait SecretStore: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// 从进程环境变量读取，键名加前缀（默认 `SLASH_GPT_ENV_`）
#[derive(Debug, Clone)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for EnvSecretStore {
    fn default() -> Self {
        Self::new("SLASH_GPT_ENV_")
    }
}

impl SecretStore for EnvSecretStore {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(format!("{}{}", self.prefix, key))
            .ok()
            .filter(|v| !v.is_empty())
    }
}

/// 固定表（测试、嵌入式使用）
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    values: HashMap<String, String>,
}

impl StaticSecretStore {
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl SecretStore for StaticSecretStore {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// 解析 action 的 app key 值并校验域名
pub fn resolve_appkey(
    store: &dyn SecretStore,
    appkey_ref: Option<&str>,
    url: &str,
) -> Result<String, SessionError> {
    let Some(appkey) = appkey_ref else {
        return Ok(String::new());
    };
    let Some(raw) = store.lookup(appkey) else {
        tracing::warn!(appkey = %appkey, "missing app key, continuing with empty credential");
        return Ok(String::new());
    };

    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 2 {
        return Ok(raw);
    }
    let (domain, value) = (parts[0], parts[1]);
    let actual = host_of(url).unwrap_or_default();
    if domain != actual {
        return Err(SessionError::AppKeyDomainMismatch {
            appkey: appkey.to_string(),
            expected: domain.to_string(),
            actual,
        });
    }
    Ok(value.to_string())
}

/// URL 的 host[:port]；URL 中的占位符不影响 host 解析
fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
