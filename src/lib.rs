//! Slash - 基于 Manifest 的多智能体对话编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态、函数调用解释、agent 切换、编排主循环、Slash 命令
//! - **actions**: Action 描述、注册表与分发（REST / GraphQL / 模板 / Emit / 代码运行时）
//! - **manifest**: Agent manifest 的加载与注册表
//! - **llm**: 模型调用抽象与实现（OpenAI 兼容 / Scripted Mock）、嵌入、模型目录
//! - **memory**: 对话历史、日志持久化、token 预算、向量检索与上下文增强

pub mod actions;
pub mod config;
pub mod core;
pub mod llm;
pub mod manifest;
pub mod memory;
