//! 会话编排器：一次用户输入驱动零到多次模型调用与 action 分发
//!
//! 循环以显式的 Continuation 表达：模型给出普通回复、action 要求返回用户、
//! 发生上下文切换或出错时结束；否则继续调用模型，深度不设上限。
//! 循环中的任何错误在顶层捕获一次：丢弃本轮输出，为同一 agent 重建会话（不播放开场白）。

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::actions::{ActionDispatcher, DispatchOutcome, EmitSink, TracingEmitSink};
use crate::core::interpreter::{self, FunctionCallRequest};
use crate::core::{AgentSwitcher, Continuation, SessionError, SessionPhase, SessionState, TurnEvent};
use crate::llm::{ChatModel, ChatRequest};
use crate::manifest::ManifestSet;
use crate::memory::{Augmentation, ContextAugmenter, Role};

pub struct Orchestrator {
    session: SessionState,
    switcher: AgentSwitcher,
    model: Arc<dyn ChatModel>,
    dispatcher: ActionDispatcher,
    augmenter: Option<ContextAugmenter>,
    emit_sink: Arc<dyn EmitSink>,
    manifest_sets: BTreeMap<String, ManifestSet>,
    verbose: bool,
}

impl Orchestrator {
    /// 以 initial_agent 启动（播放开场白）
    pub fn new(
        switcher: AgentSwitcher,
        model: Arc<dyn ChatModel>,
        dispatcher: ActionDispatcher,
        initial_agent: &str,
    ) -> Result<Self, SessionError> {
        let session = switcher.switch(initial_agent, true)?;
        Ok(Self {
            session,
            switcher,
            model,
            dispatcher,
            augmenter: None,
            emit_sink: Arc::new(TracingEmitSink),
            manifest_sets: BTreeMap::new(),
            verbose: false,
        })
    }

    pub fn with_augmenter(mut self, augmenter: ContextAugmenter) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    pub fn with_emit_sink(mut self, sink: Arc<dyn EmitSink>) -> Self {
        self.emit_sink = sink;
        self
    }

    pub fn with_manifest_sets(mut self, sets: BTreeMap<String, ManifestSet>) -> Self {
        self.manifest_sets = sets;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn switcher(&self) -> &AgentSwitcher {
        &self.switcher
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn toggle_verbose(&mut self) -> bool {
        self.verbose = !self.verbose;
        self.verbose
    }

    /// 切换 agent；失败时当前会话保持不变
    pub fn switch_agent(&mut self, agent_key: &str, emit_intro: bool) -> Result<Option<String>, SessionError> {
        let fresh = self.switcher.switch(agent_key, emit_intro)?;
        self.session = fresh;
        Ok(self.session.intro_message.clone())
    }

    pub fn manifest_set_names(&self) -> Vec<String> {
        self.manifest_sets.keys().cloned().collect()
    }

    /// 切换到另一组 manifest 的默认 agent；失败时注册表与当前会话保持不变
    pub fn switch_set(&mut self, name: &str) -> Result<Option<String>, SessionError> {
        let set = self
            .manifest_sets
            .get(name)
            .cloned()
            .ok_or_else(|| SessionError::UnknownManifestSet(name.to_string()))?;
        self.session = self.switcher.switch_set(&set)?;
        Ok(self.session.intro_message.clone())
    }

    /// 丢弃当前历史，为同一 agent 重建会话
    pub fn reset(&mut self) -> Result<(), SessionError> {
        let fresh = self.switcher.rebuild(Arc::clone(&self.session.manifest))?;
        self.session = fresh;
        Ok(())
    }

    /// 替换当前会话使用的模型（保留历史）
    pub fn set_model(&mut self, key: &str) -> bool {
        match self.switcher.catalog().get(key) {
            Some(model) => {
                tracing::info!(agent = %self.session.agent_key(), model = %model.key, "model override");
                self.session.model = model.clone();
                true
            }
            None => false,
        }
    }

    /// 处理一次用户输入；出错时返回的事件只有一条 Reset
    pub async fn handle_input(&mut self, input: &str) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        let result = self.begin_turn(input, &mut events).await;
        self.session.phase = SessionPhase::AwaitingUserInput;
        match result {
            Ok(()) => events,
            Err(e) => vec![self.recover(e)],
        }
    }

    async fn begin_turn(&mut self, input: &str, events: &mut Vec<TurnEvent>) -> Result<(), SessionError> {
        let question = self.session.manifest.format_question(input);
        self.session.history.append(Role::User, question, None)?;
        self.augment().await;
        self.run_loop(events).await
    }

    /// 不追加用户输入，直接从当前历史继续（例如 skip 模式回填结果之后）
    pub async fn resume(&mut self) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        let result = self.run_loop(&mut events).await;
        self.session.phase = SessionPhase::AwaitingUserInput;
        match result {
            Ok(()) => events,
            Err(e) => vec![self.recover(e)],
        }
    }

    async fn augment(&mut self) -> Option<Augmentation> {
        let augmenter = self.augmenter.as_ref()?;
        let store = Arc::clone(self.session.vector_store.as_ref()?);
        let session = &mut self.session;
        augmenter
            .augment(store.as_ref(), &mut session.history, &session.prompt, &session.model)
            .await
    }

    async fn run_loop(&mut self, events: &mut Vec<TurnEvent>) -> Result<(), SessionError> {
        loop {
            match self.step(events).await? {
                Continuation::ContinueWithModel => continue,
                Continuation::ReturnToUser => return Ok(()),
            }
        }
    }

    /// 一次模型调用，以及（若有）随后的一次分发
    async fn step(&mut self, events: &mut Vec<TurnEvent>) -> Result<Continuation, SessionError> {
        self.session.phase = SessionPhase::InvokingModel;
        let messages = self.session.history.to_wire_sequence();
        let reply = self
            .model
            .generate(ChatRequest {
                messages: &messages,
                manifest: &self.session.manifest,
                model: &self.session.model,
                verbose: self.verbose,
            })
            .await?;

        let interpreted = interpreter::interpret(reply, &self.session.manifest, &self.session.history);
        if let Some(text) = interpreted.assistant_text {
            self.session.phase = SessionPhase::EmittingAssistantMessage;
            self.session.history.append(interpreted.role, text.clone(), None)?;
            events.push(TurnEvent::Assistant {
                bot: self.session.manifest.bot.clone(),
                text,
            });
        }

        match interpreted.call {
            Some(call) if call.should_call() => {
                self.session.phase = SessionPhase::InterpretingFunctionCall;
                self.session.pending_function_call = Some(call.clone());
                let next = self.dispatch(call, events).await;
                self.session.pending_function_call = None;
                let next = next?;
                self.session.should_continue_with_llm = next == Continuation::ContinueWithModel;
                Ok(next)
            }
            _ => {
                self.session.should_continue_with_llm = false;
                Ok(Continuation::ReturnToUser)
            }
        }
    }

    async fn dispatch(
        &mut self,
        call: FunctionCallRequest,
        events: &mut Vec<TurnEvent>,
    ) -> Result<Continuation, SessionError> {
        let Some(name) = call.name else {
            return Ok(Continuation::ReturnToUser);
        };
        self.session.phase = SessionPhase::DispatchingAction;
        let manifest = Arc::clone(&self.session.manifest);
        let outcome = self
            .dispatcher
            .dispatch(&name, &call.arguments, &manifest, self.verbose)
            .await?;
        let next = interpreter::continuation_after(&outcome, &manifest);

        match outcome {
            DispatchOutcome::Result { text, echo } => {
                if let Some(message) = echo {
                    self.session.history.append(Role::Assistant, message.clone(), None)?;
                    events.push(TurnEvent::RuntimeMessage { text: message });
                }
                match interpreter::result_role(&manifest) {
                    Role::Function => {
                        self.session
                            .history
                            .append(Role::Function, text.clone(), Some(name.clone()))?;
                        events.push(TurnEvent::FunctionResult { name, text });
                    }
                    role => {
                        self.session.history.append(role, text.clone(), None)?;
                        events.push(TurnEvent::FoldedResult { name, text });
                    }
                }
            }
            DispatchOutcome::Emit { method, data } => {
                self.emit_sink.emit(&method, &data);
                events.push(TurnEvent::Emitted { method, data });
            }
            DispatchOutcome::SwitchContext { agent_key, message } => {
                let mut fresh = self.switcher.switch(&agent_key, false)?;
                if let Some(message) = message {
                    fresh.history.append(Role::User, message, None)?;
                }
                self.session = fresh;
                events.push(TurnEvent::Switched { agent_key });
            }
        }
        Ok(next)
    }

    fn recover(&mut self, error: SessionError) -> TurnEvent {
        let agent_key = self.session.agent_key().to_string();
        tracing::error!(agent = %agent_key, error = %error, "turn failed, resetting session");
        if let Err(e) = self.reset() {
            tracing::error!(agent = %agent_key, error = %e, "session reset failed");
        }
        TurnEvent::Reset {
            agent_key,
            error: error.to_string(),
        }
    }
}
