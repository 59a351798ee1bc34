//! 模型调用抽象
//!
//! 所有后端（OpenAI 兼容 / Scripted Mock）实现 ChatModel：输入有序消息 + manifest 配置，
//! 输出 (role, text, function_call) 三元组，成功时 text 与 function_call 恰有一个。

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::llm::LlmModel;
use crate::manifest::AgentManifest;
use crate::memory::Role;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Missing API key: set {0}")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    /// 脚本化模型的回复已用完（测试）
    #[error("Scripted replies exhausted after {0} calls")]
    ScriptExhausted(usize),
}

/// 模型返回的原始函数调用；arguments 可能是 JSON 对象或自由文本
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallPayload {
    pub name: Option<String>,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub role: Role,
    pub text: Option<String>,
    pub function_call: Option<FunctionCallPayload>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: Some(text.into()),
            function_call: None,
        }
    }

    pub fn function_call(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            role: Role::Assistant,
            text: None,
            function_call: Some(FunctionCallPayload {
                name: Some(name.into()),
                arguments,
            }),
        }
    }
}

/// 一次模型调用的输入
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub messages: &'a [Value],
    pub manifest: &'a AgentManifest,
    pub model: &'a LlmModel,
    pub verbose: bool,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, request: ChatRequest<'_>) -> Result<ModelReply, LlmError>;

    /// 累计 token 使用：(prompt, completion, total)；默认不统计
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
