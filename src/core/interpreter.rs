//! 函数调用解释器
//!
//! 把模型回复拆成（可选的）assistant 文本与（可选的）结构化函数调用；
//! 参数的两种形态在这里一次性确定。notebook manifest 中，带代码块的普通回复
//! 额外解释为一次 `run_python_code` 调用。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::actions::{Arguments, DispatchOutcome};
use crate::core::Continuation;
use crate::llm::{FunctionCallPayload, ModelReply};
use crate::manifest::AgentManifest;
use crate::memory::{MessageHistory, Role};

pub const NOTEBOOK_FUNCTION: &str = "run_python_code";

/// 结构化的函数调用
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallRequest {
    pub name: Option<String>,
    pub arguments: Arguments,
}

impl FunctionCallRequest {
    pub fn new(name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            name: Some(name.into()),
            arguments,
        }
    }

    pub fn from_payload(payload: FunctionCallPayload) -> Self {
        Self {
            name: payload.name.filter(|n| !n.is_empty()),
            arguments: Arguments::from_value(payload.arguments),
        }
    }

    /// 无函数名的调用不分发
    pub fn should_call(&self) -> bool {
        self.name.is_some()
    }
}

/// 一次模型回复的解释结果
#[derive(Debug, Clone, PartialEq)]
pub struct Interpreted {
    pub role: Role,
    pub assistant_text: Option<String>,
    pub call: Option<FunctionCallRequest>,
}

pub fn interpret(reply: ModelReply, manifest: &AgentManifest, history: &MessageHistory) -> Interpreted {
    let mut call = reply.function_call.map(FunctionCallRequest::from_payload);
    let text = reply.text.filter(|t| !t.is_empty());

    if call.is_none() && manifest.notebook {
        if let Some(code) = text.as_deref().and_then(extract_code) {
            let query = history
                .user_contents_latest_first()
                .next()
                .unwrap_or_default()
                .to_string();
            tracing::debug!(lines = code.len(), "code block extracted from reply");
            call = Some(FunctionCallRequest::new(
                NOTEBOOK_FUNCTION,
                Arguments::from_value(json!({ "code": code, "query": query })),
            ));
        }
    }

    Interpreted {
        role: reply.role,
        assistant_text: text,
        call,
    }
}

fn code_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[^\n]*\n(.*?)```").unwrap_or_else(|e| panic!("code block regex: {e}"))
    })
}

/// 取第一个 fenced 代码块的行；后续代码块（如示例输出）忽略。没有代码块返回 None
pub fn extract_code(text: &str) -> Option<Vec<Value>> {
    let block = code_block_re().captures(text)?.get(1)?;
    let lines: Vec<Value> = block
        .as_str()
        .lines()
        .map(|l| Value::String(l.to_string()))
        .collect();
    (!lines.is_empty()).then_some(lines)
}

/// 普通结果回填时使用的角色：skip 模式下作为 user 消息
pub fn result_role(manifest: &AgentManifest) -> Role {
    if manifest.skip_function_result {
        Role::User
    } else {
        Role::Function
    }
}

/// 分发之后是否再次调用模型
pub fn continuation_after(outcome: &DispatchOutcome, manifest: &AgentManifest) -> Continuation {
    match outcome {
        DispatchOutcome::Result { .. } if !manifest.skip_function_result => {
            Continuation::ContinueWithModel
        }
        _ => Continuation::ReturnToUser,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notebook() -> AgentManifest {
        let mut m = AgentManifest::empty("jupyter");
        m.notebook = true;
        m
    }

    #[test]
    fn test_payload_string_arguments() {
        let call = FunctionCallRequest::from_payload(FunctionCallPayload {
            name: Some("get_weather".to_string()),
            arguments: json!("{\"city\": \"Lyon\"}"),
        });
        assert!(call.should_call());
        assert_eq!(call.arguments.lookup("city").as_deref(), Some("Lyon"));
    }

    #[test]
    fn test_empty_name_is_not_called() {
        let call = FunctionCallRequest::from_payload(FunctionCallPayload {
            name: Some(String::new()),
            arguments: Value::Null,
        });
        assert!(!call.should_call());
    }

    #[test]
    fn test_plain_reply() {
        let history = MessageHistory::in_memory("x");
        let out = interpret(ModelReply::text("hello"), &AgentManifest::empty("x"), &history);
        assert_eq!(out.assistant_text.as_deref(), Some("hello"));
        assert!(out.call.is_none());
    }

    #[test]
    fn test_notebook_code_extraction() {
        let mut history = MessageHistory::in_memory("jupyter");
        history.append(Role::User, "plot sin", None).unwrap();
        let reply = ModelReply::text("Here:\n```python\nimport math\nprint(math.sin(1))\n```\n");
        let out = interpret(reply, &notebook(), &history);

        assert!(out.assistant_text.is_some());
        let call = out.call.unwrap();
        assert_eq!(call.name.as_deref(), Some(NOTEBOOK_FUNCTION));
        assert_eq!(
            call.arguments.to_json(),
            json!({"code": ["import math", "print(math.sin(1))"], "query": "plot sin"})
        );
    }

    #[test]
    fn test_only_first_code_block_is_run() {
        let reply = "```python\nprint(1)\n```\nOutput:\n```\n1\n```";
        assert_eq!(extract_code(reply), Some(vec![json!("print(1)")]));
        assert_eq!(extract_code("no code here"), None);
    }

    #[test]
    fn test_code_ignored_without_notebook() {
        let history = MessageHistory::in_memory("x");
        let reply = ModelReply::text("```\nprint(1)\n```");
        assert!(interpret(reply, &AgentManifest::empty("x"), &history).call.is_none());
    }

    #[test]
    fn test_continuation() {
        let mut m = AgentManifest::empty("x");
        let result = DispatchOutcome::Result {
            text: "ok".to_string(),
            echo: None,
        };
        assert_eq!(continuation_after(&result, &m), Continuation::ContinueWithModel);
        assert_eq!(result_role(&m), Role::Function);

        let emit = DispatchOutcome::Emit {
            method: "m".to_string(),
            data: Value::Null,
        };
        assert_eq!(continuation_after(&emit, &m), Continuation::ReturnToUser);

        m.skip_function_result = true;
        assert_eq!(continuation_after(&result, &m), Continuation::ReturnToUser);
        assert_eq!(result_role(&m), Role::User);
    }
}
