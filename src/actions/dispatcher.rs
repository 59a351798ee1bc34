//! Action 分发器
//!
//! 按 ActionSpec 变体执行（封闭的分发表），未声明的函数名在 notebook manifest 下交给代码运行时。
//! 每次分发输出一条 JSON 审计日志（action、kind、outcome、耗时）。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::actions::arguments::value_to_text;
use crate::actions::http::HttpActionClient;
use crate::actions::runtime::CodeRuntime;
use crate::actions::secrets::{resolve_appkey, SecretStore};
use crate::actions::spec::{ActionSpec, DataUrlAction};
use crate::actions::template::{render, render_value, render_with};
use crate::actions::Arguments;
use crate::core::SessionError;
use crate::manifest::AgentManifest;

/// 未声明 type 的 action 的固定结果
pub const NOOP_RESULT: &str = "Success";

/// 分发结果：普通结果回填对话；Emit 与上下文切换交给编排器处理
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Result {
        text: String,
        /// 代码运行时返回的附加消息（回显为 assistant 消息）
        echo: Option<String>,
    },
    Emit {
        method: String,
        data: Value,
    },
    SwitchContext {
        agent_key: String,
        message: Option<String>,
    },
}

impl DispatchOutcome {
    fn text(text: impl Into<String>) -> Self {
        DispatchOutcome::Result {
            text: text.into(),
            echo: None,
        }
    }
}

pub struct ActionDispatcher {
    http: HttpActionClient,
    secrets: Arc<dyn SecretStore>,
    runtime: Option<Arc<dyn CodeRuntime>>,
    base_dir: PathBuf,
}

impl ActionDispatcher {
    pub fn new(
        http: HttpActionClient,
        secrets: Arc<dyn SecretStore>,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            http,
            secrets,
            runtime: None,
            base_dir: base_dir.into(),
        }
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn CodeRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// 分发一次函数调用并记录审计日志
    pub async fn dispatch(
        &self,
        function_name: &str,
        args: &Arguments,
        manifest: &AgentManifest,
        verbose: bool,
    ) -> Result<DispatchOutcome, SessionError> {
        let start = Instant::now();
        let spec = manifest.actions.resolve(function_name);
        let kind = match spec {
            Some(spec) => spec.kind(),
            None => "code_runtime",
        };

        let result = match spec {
            Some(spec) => self.execute(spec, args, verbose).await,
            None => self.delegate_to_runtime(function_name, args, manifest).await,
        };

        let outcome = match &result {
            Ok(DispatchOutcome::Result { .. }) => "ok",
            Ok(DispatchOutcome::Emit { .. }) => "emit",
            Ok(DispatchOutcome::SwitchContext { .. }) => "switch",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "action_audit",
            "agent": manifest.key,
            "action": function_name,
            "kind": kind,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit.to_string(), "action");
        result
    }

    /// 执行一个已解析的 action
    pub async fn execute(
        &self,
        spec: &ActionSpec,
        args: &Arguments,
        verbose: bool,
    ) -> Result<DispatchOutcome, SessionError> {
        match spec {
            ActionSpec::Rest(rest) => {
                let appkey = resolve_appkey(self.secrets.as_ref(), rest.appkey_ref.as_deref(), &rest.url)?;
                let body = self.http.call_rest(rest, args, &appkey, verbose).await?;
                Ok(DispatchOutcome::text(body))
            }
            ActionSpec::GraphQl(gql) => {
                let appkey = resolve_appkey(self.secrets.as_ref(), gql.appkey_ref.as_deref(), &gql.url)?;
                let body = self.http.call_graphql(gql, args, &appkey, verbose).await?;
                Ok(DispatchOutcome::text(body))
            }
            ActionSpec::DataUrl(data_url) => {
                let message = self.render_data_url(data_url, args, verbose).await?;
                Ok(DispatchOutcome::text(message))
            }
            ActionSpec::MessageTemplate { message_template } => {
                Ok(DispatchOutcome::text(render(message_template, args)?))
            }
            ActionSpec::Emit(emit) => Ok(DispatchOutcome::Emit {
                method: emit.emit_method.clone(),
                data: render_value(&emit.emit_data_template, args)?,
            }),
            ActionSpec::SwitchContext(switch) => Ok(DispatchOutcome::SwitchContext {
                agent_key: render(&switch.target_agent_expr, args)?,
                message: switch
                    .message_template
                    .as_deref()
                    .map(|t| render(t, args))
                    .transpose()?,
            }),
            ActionSpec::Noop => Ok(DispatchOutcome::text(NOOP_RESULT)),
        }
    }

    async fn render_data_url(
        &self,
        action: &DataUrlAction,
        args: &Arguments,
        verbose: bool,
    ) -> Result<String, SessionError> {
        let path = self.base_dir.join(&action.template_file);
        let template = tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SessionError::TemplateFileNotFound(path.clone())
            } else {
                SessionError::ExternalCall(format!("read {}: {}", path.display(), e))
            }
        })?;
        if verbose {
            tracing::debug!(template = %template, "data url template");
        }
        let data = render(&template, args)?;
        let encoded: String = url::form_urlencoded::byte_serialize(data.as_bytes()).collect();
        let data_url = format!(
            "data:{};charset=utf-8,{}",
            action.mime_type.as_deref().unwrap_or(""),
            encoded
        );
        render_with(&action.message_template, |k| {
            if k == "url" {
                Some(data_url.clone())
            } else {
                args.lookup(k)
            }
        })
    }

    async fn delegate_to_runtime(
        &self,
        function_name: &str,
        args: &Arguments,
        manifest: &AgentManifest,
    ) -> Result<DispatchOutcome, SessionError> {
        let runtime = match &self.runtime {
            Some(rt) if manifest.notebook && rt.has_operation(function_name) => rt,
            _ => return Err(SessionError::UnknownFunction(function_name.to_string())),
        };
        let output = runtime.call(function_name, args).await?;
        let result = value_to_text(&output.result);
        let text = match manifest.result_form.as_deref() {
            Some(form) => render_with(form, |k| (k == "result").then(|| result.clone()))?,
            None => result,
        };
        Ok(DispatchOutcome::Result {
            text,
            echo: output.message,
        })
    }
}

fn args_preview(args: &Arguments) -> String {
    let s = args.to_json().to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
