//! LLM 层：模型调用抽象与实现（OpenAI 兼容 / Scripted Mock）、嵌入、模型目录

pub mod embedding;
pub mod mock;
pub mod models;
pub mod openai;
pub mod traits;

pub use embedding::{create_embedder_from_config, EmbeddingProvider, OpenAiEmbedder};
pub use mock::ScriptedChatModel;
pub use models::{LlmModel, ModelCatalog};
pub use openai::{OpenAiChatModel, TokenUsage};
pub use traits::{ChatModel, ChatRequest, FunctionCallPayload, LlmError, ModelReply};
