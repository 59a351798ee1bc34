//! 模型目录：按 key 查找模型名、上下文上限（max_tokens）与所需 API Key
//!
//! 默认目录可被配置 `[llm.models.<key>]` 覆盖或扩展。

use std::collections::BTreeMap;

use serde::Deserialize;

/// 单个模型条目
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LlmModel {
    /// 目录中的 key（如 gpt3、gpt4）；由目录填写
    #[serde(skip)]
    pub key: String,
    /// 后端引擎（当前仅 openai 兼容）
    #[serde(default = "default_engine")]
    pub engine: String,
    pub model_name: String,
    pub max_tokens: usize,
    /// 所需 API Key 的环境变量名
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_engine() -> String {
    "openai-gpt".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl LlmModel {
    pub fn new(key: &str, model_name: &str, max_tokens: usize) -> Self {
        Self {
            key: key.to_string(),
            engine: default_engine(),
            model_name: model_name.to_string(),
            max_tokens,
            api_key_env: default_api_key_env(),
        }
    }

    pub fn name(&self) -> &str {
        &self.model_name
    }

    /// 所需 API Key 是否已设置
    pub fn has_api_key(&self) -> bool {
        std::env::var(&self.api_key_env)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }
}

/// 模型目录
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: BTreeMap<String, LlmModel>,
    default_key: String,
}

impl ModelCatalog {
    pub fn new(default_key: impl Into<String>) -> Self {
        Self {
            models: BTreeMap::new(),
            default_key: default_key.into(),
        }
    }

    /// 内置的 OpenAI 模型
    pub fn builtin() -> Self {
        let mut catalog = Self::new("gpt3");
        catalog.insert(LlmModel::new("gpt3", "gpt-3.5-turbo-0613", 4096));
        catalog.insert(LlmModel::new("gpt31", "gpt-3.5-turbo-16k-0613", 16384));
        catalog.insert(LlmModel::new("gpt4", "gpt-4-0613", 8192));
        catalog.insert(LlmModel::new("gpt4o", "gpt-4o-mini", 128000));
        catalog
    }

    pub fn insert(&mut self, model: LlmModel) {
        self.models.insert(model.key.clone(), model);
    }

    /// 合并配置中的条目（同 key 覆盖）
    pub fn extend(&mut self, entries: &BTreeMap<String, LlmModel>) {
        for (key, model) in entries {
            let mut model = model.clone();
            model.key = key.clone();
            self.insert(model);
        }
    }

    pub fn set_default(&mut self, key: impl Into<String>) {
        self.default_key = key.into();
    }

    pub fn get(&self, key: &str) -> Option<&LlmModel> {
        self.models.get(key)
    }

    /// manifest 的 model 字段可以是目录 key 或模型全名；都找不到时回退默认模型
    pub fn resolve(&self, selector: Option<&str>) -> LlmModel {
        if let Some(sel) = selector {
            if let Some(m) = self.models.get(sel) {
                return m.clone();
            }
            if let Some(m) = self.models.values().find(|m| m.model_name == sel) {
                return m.clone();
            }
            tracing::warn!(model = %sel, "unknown model in manifest, using default");
        }
        self.default_model()
    }

    pub fn default_model(&self) -> LlmModel {
        self.models
            .get(&self.default_key)
            .or_else(|| self.models.values().next())
            .cloned()
            .unwrap_or_else(|| LlmModel::new("gpt3", "gpt-3.5-turbo-0613", 4096))
    }

    pub fn keys(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
