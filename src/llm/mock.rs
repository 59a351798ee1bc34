//! 脚本化模型（用于测试，无需 API）
//!
//! 按顺序返回预置回复，并记录每次调用收到的消息，便于断言调用次数与上下文。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{ChatModel, ChatRequest, LlmError, ModelReply};

#[derive(Debug, Default)]
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<Result<ModelReply, String>>>,
    calls: Mutex<Vec<Vec<Value>>>,
}

impl ScriptedChatModel {
    pub fn new(replies: impl IntoIterator<Item = ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 先返回 n 次函数调用，再返回一条普通文本
    pub fn function_calls_then_text(
        n: usize,
        function_name: &str,
        arguments: Value,
        text: &str,
    ) -> Self {
        let mut replies: Vec<ModelReply> = (0..n)
            .map(|_| ModelReply::function_call(function_name, arguments.clone()))
            .collect();
        replies.push(ModelReply::text(text));
        Self::new(replies)
    }

    pub fn push(&self, reply: ModelReply) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply));
        }
    }

    /// 下一次调用返回 API 错误
    pub fn push_error(&self, message: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(message.into()));
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// 第 i 次调用收到的消息序列
    pub fn call_messages(&self, i: usize) -> Option<Vec<Value>> {
        self.calls.lock().ok().and_then(|c| c.get(i).cloned())
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn generate(&self, request: ChatRequest<'_>) -> Result<ModelReply, LlmError> {
        let count = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|e| LlmError::Api(e.to_string()))?;
            calls.push(request.messages.to_vec());
            calls.len()
        };
        let next = self
            .replies
            .lock()
            .map_err(|e| LlmError::Api(e.to_string()))?
            .pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(LlmError::Api(message)),
            None => Err(LlmError::ScriptExhausted(count - 1)),
        }
    }
}
