//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SLASH__*` 覆盖（双下划线表示嵌套，如 `SLASH__LLM__DEFAULT_MODEL=gpt4`）。
//! 配置对象显式构造并按引用传入各组件，没有全局单例。

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::{LlmModel, ModelCatalog};
use crate::manifest::ManifestSet;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub embeddings: EmbeddingsSection,
    pub actions: ActionsSection,
}

/// [app] 段：manifest 目录、默认 agent、模板根目录、日志目录、可切换的 manifest 组
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub manifests_dir: PathBuf,
    pub default_agent: String,
    /// 模板文件与 functions 文件的相对根目录
    pub base_dir: PathBuf,
    pub log_dir: PathBuf,
    pub verbose: bool,
    /// `[app.manifest_sets.<name>]`：`/switch <name>` 可切换的目录
    pub manifest_sets: BTreeMap<String, ManifestSet>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            manifests_dir: PathBuf::from("manifests/main"),
            default_agent: "dispatcher".to_string(),
            base_dir: PathBuf::from("."),
            log_dir: PathBuf::from("output"),
            verbose: false,
            manifest_sets: BTreeMap::from([(
                "main".to_string(),
                ManifestSet::new("manifests/main", "dispatcher"),
            )]),
        }
    }
}

/// [llm] 段：默认模型、端点、超时与模型目录扩展
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub default_model: String,
    pub base_url: Option<String>,
    pub request_timeout_secs: u64,
    /// `[llm.models.<key>]`：覆盖或扩展内置目录
    pub models: BTreeMap<String, LlmModel>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            default_model: "gpt3".to_string(),
            base_url: None,
            request_timeout_secs: 60,
            models: BTreeMap::new(),
        }
    }
}

impl LlmSection {
    /// 内置目录 + 配置条目，默认模型按配置设置
    pub fn catalog(&self) -> ModelCatalog {
        let mut catalog = ModelCatalog::builtin();
        catalog.extend(&self.models);
        catalog.set_default(self.default_model.clone());
        catalog
    }
}

/// [embeddings] 段：嵌入模型与本地向量索引目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingsSection {
    pub model: String,
    pub index_dir: PathBuf,
    pub top_k: usize,
}

impl Default for EmbeddingsSection {
    fn default() -> Self {
        Self {
            model: "text-embedding-ada-002".to_string(),
            index_dir: PathBuf::from("indexes"),
            top_k: crate::memory::augmenter::DEFAULT_TOP_K,
        }
    }
}

/// [actions] 段：HTTP 超时、密钥前缀、代码运行时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActionsSection {
    pub http_timeout_secs: u64,
    /// 密钥环境变量前缀：`<prefix><appkey>`
    pub secret_prefix: String,
    pub python: String,
    pub code_timeout_secs: u64,
}

impl Default for ActionsSection {
    fn default() -> Self {
        Self {
            http_timeout_secs: 30,
            secret_prefix: "SLASH_GPT_ENV_".to_string(),
            python: "python3".to_string(),
            code_timeout_secs: 60,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SLASH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SLASH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SLASH")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
