//! 模板替换：`{name}` 占位符，`{{` / `}}` 转义为字面花括号
//!
//! 缺少参数时返回 TemplateArgumentMissing。

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::actions::Arguments;
use crate::core::SessionError;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{|\}\}|\{([^{}]*)\}").unwrap_or_else(|e| panic!("placeholder regex: {e}"))
    })
}

/// 用任意取值函数替换占位符；`{key:fmt}` 只取冒号前的 key
pub fn render_with<F>(template: &str, lookup: F) -> Result<String, SessionError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing: Option<String> = None;
    let rendered = placeholder_re().replace_all(template, |caps: &Captures| {
        let whole = &caps[0];
        match whole {
            "{{" => "{".to_string(),
            "}}" => "}".to_string(),
            _ => {
                let key = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let key = key.split([':', '!']).next().unwrap_or("").trim();
                match lookup(key) {
                    Some(v) => v,
                    None => {
                        missing.get_or_insert_with(|| key.to_string());
                        String::new()
                    }
                }
            }
        }
    });
    match missing {
        Some(key) => Err(SessionError::TemplateArgumentMissing(key)),
        None => Ok(rendered.into_owned()),
    }
}

/// 用函数调用参数替换
pub fn render(template: &str, args: &Arguments) -> Result<String, SessionError> {
    render_with(template, |k| args.lookup(k))
}

/// 递归替换嵌套结构：字符串替换，对象逐键替换，数组等其余值原样保留
pub fn render_value(value: &Value, args: &Arguments) -> Result<Value, SessionError> {
    Ok(match value {
        Value::String(s) => Value::String(render(s, args)?),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), render_value(v, args)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}
