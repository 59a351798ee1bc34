//! Actions 层：manifest 声明的函数调用如何落地
//!
//! - **spec / registry**：类型化的 action 描述与按函数名查表
//! - **dispatcher**：封闭分发表 + 代码运行时兜底，带审计日志
//! - **http / secrets / template**：REST、GraphQL、密钥解析与模板替换
//! - **runtime / emit**：代码执行与 Emit 投递的外部协作方

pub mod arguments;
pub mod dispatcher;
pub mod emit;
pub mod http;
pub mod registry;
pub mod runtime;
pub mod secrets;
pub mod spec;
pub mod template;

pub use arguments::Arguments;
pub use dispatcher::{ActionDispatcher, DispatchOutcome, NOOP_RESULT};
pub use emit::{CollectingEmitSink, EmitSink, TracingEmitSink};
pub use http::HttpActionClient;
pub use registry::ActionRegistry;
pub use runtime::{CodeOutput, CodeRuntime, ProcessCodeRuntime};
pub use secrets::{EnvSecretStore, SecretStore, StaticSecretStore};
pub use spec::ActionSpec;
