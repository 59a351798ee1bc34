//! Agent 切换控制器
//!
//! 切换是全有或全无的：目标 manifest 不存在时返回 UnknownAgent，当前会话不受影响；
//! 成功时构造全新的 SessionState（新历史、重新渲染的 system prompt、新的向量库绑定）。

use std::sync::Arc;

use chrono::Local;

use crate::core::{SessionError, SessionPhase, SessionState};
use crate::llm::ModelCatalog;
use crate::manifest::{AgentManifest, ManifestRegistry, ManifestSet};
use crate::memory::{ConversationLog, MessageHistory, NoopConversationLog, Role, VectorStoreFactory};

pub struct AgentSwitcher {
    registry: ManifestRegistry,
    catalog: ModelCatalog,
    log: Arc<dyn ConversationLog>,
    vector_factory: Option<Arc<dyn VectorStoreFactory>>,
}

impl AgentSwitcher {
    pub fn new(registry: ManifestRegistry, catalog: ModelCatalog) -> Self {
        Self {
            registry,
            catalog,
            log: Arc::new(NoopConversationLog),
            vector_factory: None,
        }
    }

    pub fn with_log(mut self, log: Arc<dyn ConversationLog>) -> Self {
        self.log = log;
        self
    }

    pub fn with_vector_factory(mut self, factory: Arc<dyn VectorStoreFactory>) -> Self {
        self.vector_factory = Some(factory);
        self
    }

    pub fn registry(&self) -> &ManifestRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// 为 agent_key 构造新会话；emit_intro 时随机选一条开场白作为 assistant 消息
    pub fn switch(&self, agent_key: &str, emit_intro: bool) -> Result<SessionState, SessionError> {
        let manifest = self
            .registry
            .get(agent_key)
            .ok_or_else(|| SessionError::UnknownAgent(agent_key.to_string()))?;
        let mut session = self.build(manifest)?;
        if emit_intro {
            if let Some(intro) = session.manifest.pick_intro().map(String::from) {
                session.history.append(Role::Assistant, intro.clone(), None)?;
                session.intro_message = Some(intro);
            }
        }
        tracing::info!(agent = %agent_key, model = %session.model.key, intro = emit_intro, "session started");
        Ok(session)
    }

    /// 加载另一组 manifest 并以其默认 agent 开始新会话（播放开场白）
    ///
    /// 目录加载失败或默认 agent 不存在时注册表保持原样。
    pub fn switch_set(&mut self, set: &ManifestSet) -> Result<SessionState, SessionError> {
        let mut registry = self.registry.clone();
        let base_dir = self.registry.base_dir().to_path_buf();
        registry.reload(&set.manifests_dir, &base_dir)?;
        let previous = std::mem::replace(&mut self.registry, registry);
        match self.switch(&set.default_agent, true) {
            Ok(session) => {
                tracing::info!(dir = %set.manifests_dir.display(), agent = %set.default_agent, "manifest set loaded");
                Ok(session)
            }
            Err(e) => {
                self.registry = previous;
                Err(e)
            }
        }
    }

    /// 以同一 manifest 重建会话（错误恢复、/new），不播放开场白
    pub fn rebuild(&self, manifest: Arc<AgentManifest>) -> Result<SessionState, SessionError> {
        self.build(manifest)
    }

    fn build(&self, manifest: Arc<AgentManifest>) -> Result<SessionState, SessionError> {
        let model = self.catalog.resolve(manifest.model.as_deref());
        if !model.has_api_key() {
            tracing::warn!(model = %model.key, env = %model.api_key_env, "API key for model is not set");
        }

        let agents = self.registry.agents_summary(manifest.agents.as_deref());
        let prompt = manifest.render_prompt(&agents, Local::now());

        let mut history = MessageHistory::new(manifest.key.clone(), Arc::clone(&self.log));
        if !prompt.is_empty() {
            history.append(Role::System, prompt.clone(), None)?;
        }

        let vector_store = match (&manifest.embeddings, &self.vector_factory) {
            (Some(spec), Some(factory)) => match factory.open(&spec.name) {
                Ok(store) => Some(store),
                Err(e) => {
                    tracing::warn!(agent = %manifest.key, table = %spec.name, error = %e, "vector store unavailable");
                    None
                }
            },
            (Some(spec), None) => {
                tracing::warn!(agent = %manifest.key, table = %spec.name, "no vector store configured");
                None
            }
            _ => None,
        };

        Ok(SessionState {
            manifest,
            model,
            history,
            prompt,
            vector_store,
            pending_function_call: None,
            should_continue_with_llm: false,
            phase: SessionPhase::AwaitingUserInput,
            intro_message: None,
        })
    }
}
