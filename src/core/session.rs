//! 会话状态
//!
//! 每次启动或切换 agent 都构造全新的 SessionState，旧状态整体丢弃，不做就地修补。
//! 字段只在 crate 内可写：唯一的修改路径是编排器。

use std::fmt;
use std::sync::Arc;

use crate::core::interpreter::FunctionCallRequest;
use crate::core::SessionPhase;
use crate::llm::LlmModel;
use crate::manifest::AgentManifest;
use crate::memory::{MessageHistory, VectorStore};

pub struct SessionState {
    pub(crate) manifest: Arc<AgentManifest>,
    pub(crate) model: LlmModel,
    pub(crate) history: MessageHistory,
    /// 渲染后的 system prompt（仍含 `{articles}`），上下文增强以它为模板
    pub(crate) prompt: String,
    pub(crate) vector_store: Option<Arc<dyn VectorStore>>,
    pub(crate) pending_function_call: Option<FunctionCallRequest>,
    pub(crate) should_continue_with_llm: bool,
    pub(crate) phase: SessionPhase,
    pub(crate) intro_message: Option<String>,
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("agent", &self.manifest.key)
            .field("model", &self.model.key)
            .field("history", &self.history)
            .field("has_vector_store", &self.vector_store.is_some())
            .field("pending_function_call", &self.pending_function_call)
            .field("should_continue_with_llm", &self.should_continue_with_llm)
            .field("phase", &self.phase)
            .finish()
    }
}

impl SessionState {
    pub fn agent_key(&self) -> &str {
        &self.manifest.key
    }

    pub fn manifest(&self) -> &Arc<AgentManifest> {
        &self.manifest
    }

    pub fn model(&self) -> &LlmModel {
        &self.model
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn has_vector_store(&self) -> bool {
        self.vector_store.is_some()
    }

    pub fn pending_function_call(&self) -> Option<&FunctionCallRequest> {
        self.pending_function_call.as_ref()
    }

    pub fn should_continue_with_llm(&self) -> bool {
        self.should_continue_with_llm
    }

    /// 启动时选中的开场白（若有）
    pub fn intro_message(&self) -> Option<&str> {
        self.intro_message.as_deref()
    }
}
