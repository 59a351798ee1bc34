//! Action 描述：manifest 中 `actions.<函数名>` 的类型化形式
//!
//! 通过 `type` 字段区分；缺失或无法识别的 type 解析为 Noop（分发时返回 "Success"），
//! 带 `metafile` / `manifest` 的条目为上下文切换。

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// 单个 action 的类型化描述
#[derive(Debug, Clone, PartialEq)]
pub enum ActionSpec {
    Rest(RestAction),
    GraphQl(GraphQlAction),
    DataUrl(DataUrlAction),
    MessageTemplate { message_template: String },
    Emit(EmitAction),
    SwitchContext(SwitchAction),
    /// 未声明或未知类型：宽松处理，分发时返回固定的 "Success"
    Noop,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RestAction {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// 密钥名（在密钥存储中查找 `<prefix><appkey>`）
    #[serde(default, rename = "appkey")]
    pub appkey_ref: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphQlAction {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, rename = "appkey")]
    pub appkey_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataUrlAction {
    /// 相对 base_dir 的模板文件
    #[serde(rename = "template")]
    pub template_file: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// 含 `{url}` 的回复模板
    #[serde(rename = "message")]
    pub message_template: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmitAction {
    pub emit_method: String,
    #[serde(default, rename = "emit_data")]
    pub emit_data_template: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchAction {
    /// 目标 agent 表达式（可含 `{参数}`）
    pub target_agent_expr: String,
    /// 可选：渲染后作为 user 消息带入新会话
    pub message_template: Option<String>,
}

impl ActionSpec {
    /// 类别名（审计日志用）
    pub fn kind(&self) -> &'static str {
        match self {
            ActionSpec::Rest(_) => "rest",
            ActionSpec::GraphQl(_) => "graphQL",
            ActionSpec::DataUrl(_) => "data_url",
            ActionSpec::MessageTemplate { .. } => "message_template",
            ActionSpec::Emit(_) => "emit",
            ActionSpec::SwitchContext(_) => "switch_context",
            ActionSpec::Noop => "noop",
        }
    }

    pub fn is_switch_context(&self) -> bool {
        matches!(self, ActionSpec::SwitchContext(_))
    }

    pub fn is_emit(&self) -> bool {
        matches!(self, ActionSpec::Emit(_))
    }

    /// 从 manifest 的原始 JSON 解析
    ///
    /// 已知 type 但字段缺失时返回错误；type 缺失或未知时得到 Noop。
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        let target = value
            .get("metafile")
            .or_else(|| value.get("manifest"))
            .and_then(Value::as_str);
        let kind = value.get("type").and_then(Value::as_str);

        if let Some(target) = target {
            return Ok(ActionSpec::SwitchContext(SwitchAction {
                target_agent_expr: target.to_string(),
                message_template: value
                    .get("message")
                    .and_then(Value::as_str)
                    .map(String::from),
            }));
        }

        Ok(match kind {
            Some("rest") => ActionSpec::Rest(RestAction::deserialize(value)?),
            Some("graphQL") | Some("graphql") => {
                ActionSpec::GraphQl(GraphQlAction::deserialize(value)?)
            }
            Some("data_url") => ActionSpec::DataUrl(DataUrlAction::deserialize(value)?),
            Some("message_template") => {
                #[derive(Deserialize)]
                struct Template {
                    message: String,
                }
                ActionSpec::MessageTemplate {
                    message_template: Template::deserialize(value)?.message,
                }
            }
            Some("emit") => ActionSpec::Emit(EmitAction::deserialize(value)?),
            Some(other) => {
                tracing::debug!(action_type = %other, "unknown action type, treated as no-op");
                ActionSpec::Noop
            }
            None => ActionSpec::Noop,
        })
    }
}
