//! Emit 投递：结果不回填对话，交给外部接收方

use std::sync::Mutex;

use serde_json::Value;

pub trait EmitSink: Send + Sync {
    fn emit(&self, method: &str, data: &Value);
}

/// 默认接收方：写一条结构化日志
#[derive(Debug, Default)]
pub struct TracingEmitSink;

impl EmitSink for TracingEmitSink {
    fn emit(&self, method: &str, data: &Value) {
        tracing::info!(emit_method = %method, data = %data, "emit");
    }
}

/// 收集所有投递（测试与嵌入方使用）
#[derive(Debug, Default)]
pub struct CollectingEmitSink {
    emitted: Mutex<Vec<(String, Value)>>,
}

impl CollectingEmitSink {
    pub fn take(&self) -> Vec<(String, Value)> {
        self.emitted
            .lock()
            .map(|mut v| std::mem::take(&mut *v))
            .unwrap_or_default()
    }
}

impl EmitSink for CollectingEmitSink {
    fn emit(&self, method: &str, data: &Value) {
        if let Ok(mut v) = self.emitted.lock() {
            v.push((method.to_string(), data.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingEmitSink::default();
        sink.emit("notify", &json!({"title": "Hi"}));
        let got = sink.take();
        assert_eq!(got, vec![("notify".to_string(), json!({"title": "Hi"}))]);
        assert!(sink.take().is_empty());
    }
}
