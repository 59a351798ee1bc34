//! 代码执行运行时
//!
//! notebook 类型的 manifest 中，未声明 action 的函数名交给运行时按名称分发。
//! 本地实现以子进程运行解释器（代码经 stdin 传入），带超时；没有沙箱隔离。

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::actions::arguments::value_to_text;
use crate::actions::Arguments;
use crate::core::SessionError;

/// 运行结果：result 回填为函数结果，message 存在时作为 assistant 消息回显
#[derive(Debug, Clone, PartialEq)]
pub struct CodeOutput {
    pub result: Value,
    pub message: Option<String>,
}

#[async_trait]
pub trait CodeRuntime: Send + Sync {
    /// 是否提供名为 `operation` 的操作
    fn has_operation(&self, operation: &str) -> bool;

    /// 执行操作；调用前应已确认 has_operation
    async fn call(&self, operation: &str, args: &Arguments) -> Result<CodeOutput, SessionError>;
}

/// 子进程 Python 运行时，提供 `run_python_code`（code 为行列表或字符串）与 `python`（整段代码）
pub struct ProcessCodeRuntime {
    interpreter: String,
    timeout_secs: u64,
}

impl ProcessCodeRuntime {
    pub const OPERATIONS: &'static [&'static str] = &["run_python_code", "python"];

    pub fn new(interpreter: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout_secs,
        }
    }

    async fn run(&self, code: &str) -> Result<CodeOutput, SessionError> {
        tracing::info!(interpreter = %self.interpreter, bytes = code.len(), "code runtime invoke");
        let mut child = Command::new(&self.interpreter)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::ExternalCall(format!("code runtime spawn failed: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(code.as_bytes())
                .await
                .map_err(|e| SessionError::ExternalCall(format!("code runtime stdin: {}", e)))?;
        }

        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| SessionError::ExternalCall(format!("code runtime timeout after {}s", self.timeout_secs)))?
        .map_err(|e| SessionError::ExternalCall(format!("code runtime wait failed: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Ok(CodeOutput {
                result: json!({ "error": stderr, "exit_code": output.status.code() }),
                message: None,
            });
        }
        Ok(CodeOutput {
            result: Value::String(stdout),
            message: (!stderr.is_empty()).then_some(stderr),
        })
    }
}

#[async_trait]
impl CodeRuntime for ProcessCodeRuntime {
    fn has_operation(&self, operation: &str) -> bool {
        Self::OPERATIONS.contains(&operation)
    }

    async fn call(&self, operation: &str, args: &Arguments) -> Result<CodeOutput, SessionError> {
        let code = match operation {
            "run_python_code" => match args.get("code") {
                Some(Value::Array(lines)) => lines.iter().map(value_to_text).collect::<Vec<_>>().join("\n"),
                Some(other) => value_to_text(other),
                None => args
                    .lookup("arguments")
                    .ok_or_else(|| SessionError::TemplateArgumentMissing("code".to_string()))?,
            },
            "python" => args
                .lookup("arguments")
                .or_else(|| args.lookup("code"))
                .ok_or_else(|| SessionError::TemplateArgumentMissing("code".to_string()))?,
            other => return Err(SessionError::UnknownFunction(other.to_string())),
        };
        self.run(&code).await
    }
}
