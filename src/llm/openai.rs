//! OpenAI 兼容 Chat Completions 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。manifest 的 functions 作为
//! `functions` 发送，回复中的 `function_call` 交给解释器（arguments 是 JSON 字符串）。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionFunctions, ChatCompletionRequestMessage, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse, Role as WireRole,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{ChatModel, ChatRequest, FunctionCallPayload, LlmError, ModelReply};
use crate::memory::Role;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：API Key 按模型条目的 api_key_env 读取，每次请求据此构造 async_openai Client
pub struct OpenAiChatModel {
    http: reqwest::Client,
    base_url: String,
    pub usage: TokenUsage,
}

impl OpenAiChatModel {
    pub fn new(base_url: Option<&str>, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            usage: TokenUsage::new(),
        }
    }

    fn client(&self, api_key: String) -> Client<OpenAIConfig> {
        let config = OpenAIConfig::new()
            .with_api_base(&self.base_url)
            .with_api_key(api_key);
        Client::with_config(config).with_http_client(self.http.clone())
    }

    /// 历史（wire 形式）+ manifest 的 functions / temperature → 请求
    #[allow(deprecated)]
    fn build_request(request: &ChatRequest<'_>) -> Result<CreateChatCompletionRequest, LlmError> {
        let messages: Vec<ChatCompletionRequestMessage> =
            serde_json::from_value(Value::Array(request.messages.to_vec()))
                .map_err(|e| LlmError::Malformed(format!("message history: {}", e)))?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(request.model.name())
            .messages(messages)
            .temperature(request.manifest.temperature);

        let functions: Vec<ChatCompletionFunctions> = request
            .manifest
            .functions
            .iter()
            .flatten()
            .filter_map(to_function)
            .collect();
        if !functions.is_empty() {
            args.functions(functions);
        }
        args.build().map_err(|e| LlmError::Malformed(e.to_string()))
    }

    /// 取首个 choice：有 function_call 则为函数调用，否则为文本
    #[allow(deprecated)]
    fn reply_from_response(&self, response: CreateChatCompletionResponse) -> Result<ModelReply, LlmError> {
        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }
        let message = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::Malformed("no choices".to_string()))?;

        let role = match message.role {
            WireRole::System => Role::System,
            WireRole::User => Role::User,
            WireRole::Function | WireRole::Tool => Role::Function,
            WireRole::Assistant => Role::Assistant,
        };

        Ok(match message.function_call {
            Some(call) => ModelReply {
                role,
                text: None,
                function_call: Some(FunctionCallPayload {
                    name: Some(call.name),
                    arguments: Value::String(call.arguments),
                }),
            },
            None => ModelReply {
                role,
                text: Some(message.content.unwrap_or_default()),
                function_call: None,
            },
        })
    }
}

/// manifest 中的函数声明（name / description / parameters）；无 name 的条目忽略
fn to_function(value: &Value) -> Option<ChatCompletionFunctions> {
    let name = value.get("name")?.as_str()?.to_string();
    Some(ChatCompletionFunctions {
        name,
        description: value
            .get("description")
            .and_then(Value::as_str)
            .map(String::from),
        parameters: value
            .get("parameters")
            .cloned()
            .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
    })
}

fn map_error(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::Reqwest(e) => LlmError::Http(e.to_string()),
        OpenAIError::ApiError(e) => LlmError::Api(e.to_string()),
        OpenAIError::JSONDeserialize(e, _) => LlmError::Malformed(e.to_string()),
        other => LlmError::Api(other.to_string()),
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn generate(&self, request: ChatRequest<'_>) -> Result<ModelReply, LlmError> {
        let api_key = std::env::var(&request.model.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(request.model.api_key_env.clone()))?;

        let body = Self::build_request(&request)?;
        if request.verbose {
            tracing::debug!(model = %request.model.name(), body = ?body, "chat request");
        }

        let response = self
            .client(api_key)
            .chat()
            .create(body)
            .await
            .map_err(map_error)?;

        let reply = self.reply_from_response(response)?;
        if request.verbose {
            tracing::debug!(text = ?reply.text, function_call = ?reply.function_call, "chat reply");
        }
        Ok(reply)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}
