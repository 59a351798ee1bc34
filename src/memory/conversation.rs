//! 对话历史：有序的角色消息日志
//!
//! 只追加；唯一可改写的槽位是下标 0 的 system 消息（用于注入检索到的上下文）。
//! 每次成功 append 后调用日志协作方持久化（失败只记录，不中断对话）。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::core::SessionError;
use crate::memory::{ConversationLog, NoopConversationLog};

/// 消息角色（与 Chat Completions API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "function" => Ok(Role::Function),
            other => Err(SessionError::InvalidRole(other.to_string())),
        }
    }
}

/// 单条消息；function 消息带 name（函数名）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn function(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Function,
            content: content.into(),
            name: Some(name.into()),
        }
    }
}

/// 会话消息历史
///
/// 不变式：若存在 system 消息，它只能位于下标 0；
/// 下标 0 之外的消息一旦追加即不可变。
#[derive(Clone)]
pub struct MessageHistory {
    agent_key: String,
    started_at: DateTime<Local>,
    messages: Vec<Message>,
    log: Arc<dyn ConversationLog>,
}

impl fmt::Debug for MessageHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHistory")
            .field("agent_key", &self.agent_key)
            .field("started_at", &self.started_at)
            .field("messages", &self.messages)
            .finish()
    }
}

impl MessageHistory {
    pub fn new(agent_key: impl Into<String>, log: Arc<dyn ConversationLog>) -> Self {
        Self {
            agent_key: agent_key.into(),
            started_at: Local::now(),
            messages: Vec::new(),
            log,
        }
    }

    /// 无持久化的历史（测试、临时会话）
    pub fn in_memory(agent_key: impl Into<String>) -> Self {
        Self::new(agent_key, Arc::new(NoopConversationLog))
    }

    pub fn agent_key(&self) -> &str {
        &self.agent_key
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// 以字符串角色追加（来自模型或外部输入），非法角色返回 InvalidRole
    pub fn append_raw(
        &mut self,
        role: &str,
        content: impl Into<String>,
        name: Option<String>,
    ) -> Result<(), SessionError> {
        let role: Role = role.parse()?;
        self.append(role, content, name)
    }

    /// 追加一条消息。system 消息只允许作为第一条。
    pub fn append(
        &mut self,
        role: Role,
        content: impl Into<String>,
        name: Option<String>,
    ) -> Result<(), SessionError> {
        if role == Role::System && !self.messages.is_empty() {
            return Err(SessionError::Precondition(
                "system message may only be the first message".to_string(),
            ));
        }
        self.messages.push(Message {
            role,
            content: content.into(),
            name,
        });
        self.persist();
        Ok(())
    }

    pub fn push(&mut self, message: Message) -> Result<(), SessionError> {
        self.append(message.role, message.content, message.name)
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    /// 改写下标 0 的 system 消息；下标 0 不存在或不是 system 时返回 Precondition
    pub fn rewrite_system(&mut self, content: impl Into<String>) -> Result<(), SessionError> {
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => {
                first.content = content.into();
                Ok(())
            }
            Some(first) => Err(SessionError::Precondition(format!(
                "message 0 has role {}, expected system",
                first.role
            ))),
            None => Err(SessionError::Precondition(
                "missing system message".to_string(),
            )),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 按追加顺序、最新在前返回所有 user 消息内容
    pub fn user_contents_latest_first(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 模型调用协作方需要的有序消息序列
    pub fn to_wire_sequence(&self) -> Vec<serde_json::Value> {
        self.messages
            .iter()
            .map(|m| {
                let mut wire = serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                });
                if let Some(name) = &m.name {
                    wire["name"] = serde_json::Value::String(name.clone());
                }
                wire
            })
            .collect()
    }

    /// 写日志检查点；失败不影响对话
    fn persist(&self) {
        if let Err(e) = self
            .log
            .save(&self.agent_key, &self.messages, self.started_at)
        {
            tracing::warn!(agent = %self.agent_key, error = %e, "conversation log save failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLog(AtomicUsize);

    impl ConversationLog for CountingLog {
        fn save(
            &self,
            _agent_key: &str,
            _messages: &[Message],
            _started_at: DateTime<Local>,
        ) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("disk full")
        }
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("function".parse::<Role>().unwrap(), Role::Function);
        let err = "tool".parse::<Role>().unwrap_err();
        assert!(matches!(err, SessionError::InvalidRole(r) if r == "tool"));
    }

    #[test]
    fn test_append_raw_rejects_unknown_role() {
        let mut history = MessageHistory::in_memory("gpt");
        assert!(history.append_raw("narrator", "hi", None).is_err());
        assert!(history.is_empty());
    }

    #[test]
    fn test_system_only_at_index_zero() {
        let mut history = MessageHistory::in_memory("gpt");
        history.append(Role::User, "hello", None).unwrap();
        let err = history.append(Role::System, "late prompt", None).unwrap_err();
        assert!(matches!(err, SessionError::Precondition(_)));
        assert_eq!(history.len(), 1);
        assert_eq!(history.get(0).unwrap().role, Role::User);
    }

    #[test]
    fn test_rewrite_system() {
        let mut history = MessageHistory::in_memory("gpt");
        assert!(history.rewrite_system("x").is_err());

        history.append(Role::System, "prompt {articles}", None).unwrap();
        history.append(Role::User, "question", None).unwrap();
        history.rewrite_system("prompt ABC").unwrap();
        history.rewrite_system("prompt ABC").unwrap();
        assert_eq!(history.get(0).unwrap().content, "prompt ABC");
        assert_eq!(history.get(1).unwrap().content, "question");
    }

    #[test]
    fn test_rewrite_requires_system_first() {
        let mut history = MessageHistory::in_memory("gpt");
        history.append(Role::User, "question", None).unwrap();
        assert!(matches!(
            history.rewrite_system("x"),
            Err(SessionError::Precondition(_))
        ));
    }

    #[test]
    fn test_wire_sequence_includes_name() {
        let mut history = MessageHistory::in_memory("gpt");
        history.append(Role::System, "sys", None).unwrap();
        history
            .append(Role::Function, "{\"temp\": 20}", Some("get_weather".into()))
            .unwrap();
        let wire = history.to_wire_sequence();
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0]["role"], "system");
        assert!(wire[0].get("name").is_none());
        assert_eq!(wire[1]["role"], "function");
        assert_eq!(wire[1]["name"], "get_weather");
    }

    #[test]
    fn test_log_failure_does_not_abort_append() {
        let log = Arc::new(CountingLog(AtomicUsize::new(0)));
        let mut history = MessageHistory::new("gpt", log.clone());
        history.append(Role::User, "a", None).unwrap();
        history.append(Role::Assistant, "b", None).unwrap();
        assert_eq!(log.0.load(Ordering::SeqCst), 2);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_user_contents_latest_first() {
        let mut history = MessageHistory::in_memory("gpt");
        history.append(Role::System, "sys", None).unwrap();
        history.append(Role::User, "first", None).unwrap();
        history.append(Role::Assistant, "reply", None).unwrap();
        history.append(Role::User, "second", None).unwrap();
        let users: Vec<&str> = history.user_contents_latest_first().collect();
        assert_eq!(users, vec!["second", "first"]);
    }
}
