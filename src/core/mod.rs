//! 核心编排层：错误、会话状态、函数调用解释、agent 切换、主控循环与 Slash 命令

pub mod commands;
pub mod error;
pub mod interpreter;
pub mod orchestrator;
pub mod session;
pub mod state;
pub mod switcher;

pub use commands::{parse_input, run_command, CommandOutput, Input, SlashCommand, ONELINE_HELP};
pub use error::SessionError;
pub use interpreter::{FunctionCallRequest, Interpreted};
pub use orchestrator::Orchestrator;
pub use session::SessionState;
pub use state::{Continuation, SessionPhase, TurnEvent};
pub use switcher::AgentSwitcher;
