//! Action 注册表
//!
//! 每个 manifest 一张：函数名 -> ActionSpec。由 manifest 加载时构建，之后只读。

use std::collections::HashMap;

use serde_json::Value;

use crate::actions::ActionSpec;

#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, ActionSpec>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 manifest 的 `actions` 对象构建；任一条目解析失败时返回 (函数名, 错误)
    pub fn from_manifest_actions<'a, I>(entries: I) -> Result<Self, (String, serde_json::Error)>
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let mut registry = Self::new();
        for (name, raw) in entries {
            let spec = ActionSpec::from_value(raw).map_err(|e| (name.clone(), e))?;
            registry.register(name.clone(), spec);
        }
        Ok(registry)
    }

    pub fn register(&mut self, name: impl Into<String>, spec: ActionSpec) {
        self.actions.insert(name.into(), spec);
    }

    pub fn resolve(&self, function_name: &str) -> Option<&ActionSpec> {
        self.actions.get(function_name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_build_and_resolve() {
        let mut raw = BTreeMap::new();
        raw.insert("note".to_string(), json!({"type": "message_template", "message": "ok {x}"}));
        raw.insert("mystery".to_string(), json!({"comment": "no type"}));

        let registry = ActionRegistry::from_manifest_actions(&raw).unwrap();
        assert_eq!(registry.names(), vec!["mystery", "note"]);
        assert_eq!(registry.resolve("mystery"), Some(&ActionSpec::Noop));
        assert!(registry.resolve("absent").is_none());
    }

    #[test]
    fn test_invalid_entry_reports_name() {
        let mut raw = BTreeMap::new();
        raw.insert("broken".to_string(), json!({"type": "emit"}));
        let (name, _) = ActionRegistry::from_manifest_actions(&raw).unwrap_err();
        assert_eq!(name, "broken");
    }
}
