//! 状态机词汇：会话阶段、循环继续方式、一轮产生的输出事件

use serde::Serialize;
use serde_json::Value;

/// 会话阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    AwaitingUserInput,
    InvokingModel,
    EmittingAssistantMessage,
    InterpretingFunctionCall,
    DispatchingAction,
}

/// 一次分发之后循环如何继续
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Continuation {
    ReturnToUser,
    ContinueWithModel,
}

/// 一轮处理中呈现给用户的输出，按发生顺序
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TurnEvent {
    /// 模型回复（bot 为 manifest 中的显示名）
    Assistant { bot: String, text: String },
    /// 回填为 function 消息的 action 结果
    FunctionResult { name: String, text: String },
    /// skip 模式下以 user 消息回填的 action 结果
    FoldedResult { name: String, text: String },
    /// 代码运行时附带的消息
    RuntimeMessage { text: String },
    Emitted { method: String, data: Value },
    /// 上下文切换到另一个 agent
    Switched { agent_key: String },
    /// 出错后会话已重置
    Reset { agent_key: String, error: String },
}
