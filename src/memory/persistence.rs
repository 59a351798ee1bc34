//! 对话日志持久化
//!
//! 每次追加消息后把完整对话写入 `log_dir/<agent>/<会话开始时间>.json`，
//! 同一会话反复覆盖同一文件。写入失败由调用方记录，不影响对话。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::memory::Message;

/// 日志持久化协作方：agent key + 完整消息序列 + 会话开始时间
pub trait ConversationLog: Send + Sync {
    fn save(
        &self,
        agent_key: &str,
        messages: &[Message],
        started_at: DateTime<Local>,
    ) -> anyhow::Result<()>;
}

/// 不落盘
#[derive(Debug, Clone, Default)]
pub struct NoopConversationLog;

impl ConversationLog for NoopConversationLog {
    fn save(&self, _: &str, _: &[Message], _: DateTime<Local>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 单文件 JSON 日志，按 agent 分目录
#[derive(Debug, Clone)]
pub struct FileConversationLog {
    root: PathBuf,
}

impl FileConversationLog {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, agent_key: &str, started_at: DateTime<Local>) -> PathBuf {
        self.root
            .join(agent_key)
            .join(format!("{}.json", started_at.format("%Y-%m-%d_%H-%M-%S")))
    }

    /// 读回某次会话的日志；文件不存在时返回空 Vec
    pub fn load(&self, agent_key: &str, started_at: DateTime<Local>) -> anyhow::Result<Vec<Message>> {
        let path = self.path_for(agent_key, started_at);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

impl ConversationLog for FileConversationLog {
    fn save(
        &self,
        agent_key: &str,
        messages: &[Message],
        started_at: DateTime<Local>,
    ) -> anyhow::Result<()> {
        let path = self.path_for(agent_key, started_at);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(messages)?)?;
        Ok(())
    }
}
