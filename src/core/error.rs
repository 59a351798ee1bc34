//! 会话错误类型
//!
//! 增强检索失败在本地吸收；其余错误在函数调用循环顶层统一捕获，转为用户可见消息并重置会话。

use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;
use crate::manifest::ManifestError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// 违反 system 消息不变式
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Invalid appkey domain for {appkey}: expected {expected}, got {actual}")]
    AppKeyDomainMismatch {
        appkey: String,
        expected: String,
        actual: String,
    },

    #[error("Template file not found: {}", .0.display())]
    TemplateFileNotFound(PathBuf),

    #[error("Missing template argument: {0}")]
    TemplateArgumentMissing(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Unknown manifest set: {0}")]
    UnknownManifestSet(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// 模型、HTTP、向量库等外部调用失败
    #[error("External call failed: {0}")]
    ExternalCall(String),
}

impl From<LlmError> for SessionError {
    fn from(e: LlmError) -> Self {
        SessionError::ExternalCall(e.to_string())
    }
}
