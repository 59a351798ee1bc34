//! 记忆层：对话历史、日志持久化、token 预算、向量检索与上下文增强

pub mod augmenter;
pub mod conversation;
pub mod persistence;
pub mod token_budget;
pub mod vector;

pub use augmenter::{Augmentation, ContextAugmenter, ARTICLES_PLACEHOLDER};
pub use conversation::{Message, MessageHistory, Role};
pub use persistence::{ConversationLog, FileConversationLog, NoopConversationLog};
pub use token_budget::{MemoizedTokenCounter, TokenCounter, TokenEstimator};
pub use vector::{
    InMemoryVectorIndex, IndexEntry, LocalIndexFactory, Snippet, VectorStore, VectorStoreFactory,
};
