//! 函数调用参数
//!
//! 模型返回的 arguments 可能是自由文本（单参数函数常见）或 JSON 对象。
//! 两种形态在解析边界一次性确定，分发处不再重复判断。

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Arguments {
    /// 单个位置参数（原样文本）
    PositionalBlob(String),
    /// 关键字参数
    KeywordArgs(Map<String, Value>),
}

impl Default for Arguments {
    fn default() -> Self {
        Arguments::KeywordArgs(Map::new())
    }
}

impl Arguments {
    /// 从原始 JSON 值解析：字符串若能解析为 JSON 对象则视为关键字参数
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Arguments::KeywordArgs(map),
            Value::Null => Arguments::default(),
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => Arguments::KeywordArgs(map),
                _ => Arguments::PositionalBlob(text),
            },
            other => Arguments::PositionalBlob(other.to_string()),
        }
    }

    /// 模板占位符取值；位置参数绑定到 `{}`、`{0}` 与 `{arguments}`
    pub fn lookup(&self, key: &str) -> Option<String> {
        match self {
            Arguments::PositionalBlob(text) => match key {
                "" | "0" | "arguments" => Some(text.clone()),
                _ => None,
            },
            Arguments::KeywordArgs(map) => map.get(key).map(value_to_text),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Arguments::KeywordArgs(map) => map.get(key),
            Arguments::PositionalBlob(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Arguments::PositionalBlob(text) => Value::String(text.clone()),
            Arguments::KeywordArgs(map) => Value::Object(map.clone()),
        }
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, Arguments::PositionalBlob(_))
    }
}

/// 字符串按原样，其余 JSON 值序列化
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
