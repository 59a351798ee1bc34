//! Agent Manifest：单个 agent 的声明式配置
//!
//! 文件为 JSON 或 TOML，文件名（不含扩展名）即 agent key。加载后不可变。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::Value;

use crate::actions::ActionRegistry;
use crate::manifest::ManifestError;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// prompt 可以是单个字符串或按行书写的列表
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PromptText {
    Text(String),
    Lines(Vec<String>),
}

/// functions 可以内联，也可以是相对 base_dir 的 JSON 文件
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FunctionsSource {
    Inline(Vec<Value>),
    File(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmbeddingsSpec {
    /// 向量库表名
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    about: Option<String>,
    #[serde(default)]
    bot: Option<String>,
    #[serde(default)]
    you: Option<String>,
    #[serde(default)]
    prompt: Option<PromptText>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    functions: Option<FunctionsSource>,
    #[serde(default)]
    actions: BTreeMap<String, Value>,
    #[serde(default)]
    notebook: bool,
    #[serde(default)]
    form: Option<String>,
    #[serde(default)]
    result_form: Option<String>,
    #[serde(default)]
    intro: Vec<String>,
    #[serde(default)]
    embeddings: Option<EmbeddingsSpec>,
    #[serde(default)]
    skip_function_result: bool,
    #[serde(default)]
    agents: Option<Vec<String>>,
    /// sample / sample2 / ... 以及未识别字段
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

/// 解析后的 manifest
#[derive(Debug, Clone)]
pub struct AgentManifest {
    pub key: String,
    pub title: String,
    pub about: Option<String>,
    pub bot: String,
    pub you: String,
    /// 未渲染的 system prompt 模板（可含 `{now}`、`{agents}`、`{articles}`）
    pub prompt_template: String,
    pub model: Option<String>,
    pub temperature: f32,
    pub functions: Option<Vec<Value>>,
    pub actions: ActionRegistry,
    pub notebook: bool,
    pub form: Option<String>,
    pub result_form: Option<String>,
    pub intro: Vec<String>,
    pub embeddings: Option<EmbeddingsSpec>,
    pub skip_function_result: bool,
    pub agents: Option<Vec<String>>,
    /// (键名, 示例问题)，按键名排序
    pub samples: Vec<(String, String)>,
}

impl AgentManifest {
    /// 空 manifest（未知 key 的兜底与测试）
    pub fn empty(key: &str) -> Self {
        Self {
            key: key.to_string(),
            title: key.to_string(),
            about: None,
            bot: "GPT".to_string(),
            you: "You".to_string(),
            prompt_template: String::new(),
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            functions: None,
            actions: ActionRegistry::new(),
            notebook: false,
            form: None,
            result_form: None,
            intro: Vec::new(),
            embeddings: None,
            skip_function_result: false,
            agents: None,
            samples: Vec::new(),
        }
    }

    /// 从文件加载（.json / .toml），functions 文件相对 base_dir 解析
    pub fn load(path: &Path, base_dir: &Path) -> Result<Self, ManifestError> {
        let key = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ManifestError::Parse {
                path: path.to_path_buf(),
                message: "invalid file name".to_string(),
            })?
            .to_string();
        let text = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let value = parse_document(path, &text)?;
        Self::from_value(&key, value, base_dir).map_err(|e| match e {
            ManifestError::Parse { message, .. } => ManifestError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    pub fn from_value(key: &str, value: Value, base_dir: &Path) -> Result<Self, ManifestError> {
        let file: ManifestFile = serde_json::from_value(value).map_err(|e| ManifestError::Parse {
            path: PathBuf::from(key),
            message: e.to_string(),
        })?;

        let actions = ActionRegistry::from_manifest_actions(&file.actions).map_err(|(action, e)| {
            ManifestError::InvalidAction {
                agent: key.to_string(),
                action,
                message: e.to_string(),
            }
        })?;

        let functions = match file.functions {
            None => None,
            Some(FunctionsSource::Inline(list)) => Some(list),
            Some(FunctionsSource::File(rel)) => Some(load_functions_file(&base_dir.join(rel))?),
        };

        let mut samples: Vec<(String, String)> = file
            .extra
            .iter()
            .filter(|(k, _)| k.starts_with("sample"))
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();
        samples.sort();

        let prompt_template = match file.prompt {
            Some(PromptText::Text(s)) => s,
            Some(PromptText::Lines(lines)) => lines.join("\n"),
            None => String::new(),
        };

        Ok(Self {
            key: key.to_string(),
            title: file.title.unwrap_or_else(|| key.to_string()),
            about: file.about,
            bot: file.bot.unwrap_or_else(|| "GPT".to_string()),
            you: file.you.unwrap_or_else(|| "You".to_string()),
            prompt_template,
            model: file.model,
            temperature: file.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            functions,
            actions,
            notebook: file.notebook,
            form: file.form,
            result_form: file.result_form,
            intro: file.intro,
            embeddings: file.embeddings,
            skip_function_result: file.skip_function_result,
            agents: file.agents,
            samples,
        })
    }

    /// 渲染 system prompt：替换 `{now}` 与 `{agents}`，保留 `{articles}` 给上下文增强
    pub fn render_prompt(&self, agents_summary: &str, now: DateTime<Local>) -> String {
        self.prompt_template
            .replace("{now}", &now.format("%Y-%m-%d %H:%M:%S").to_string())
            .replace("{agents}", agents_summary)
    }

    /// 用 form 包装用户输入；以反引号开头的输入跳过 form
    pub fn format_question(&self, input: &str) -> String {
        if let Some(raw) = input.strip_prefix('`') {
            return raw.to_string();
        }
        match &self.form {
            Some(form) => form.replace("{question}", input),
            None => input.to_string(),
        }
    }

    /// 随机选一条开场白
    pub fn pick_intro(&self) -> Option<&str> {
        if self.intro.is_empty() {
            return None;
        }
        // v4 UUID 的 122 位随机数即可均匀取模，不为此单独引入 rand
        let i = (uuid::Uuid::new_v4().as_u128() % self.intro.len() as u128) as usize;
        self.intro.get(i).map(String::as_str)
    }

    /// 按键名取示例问题（`sample`、`sample2`…）
    pub fn sample(&self, key: &str) -> Option<&str> {
        self.samples
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, s)| s.as_str())
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions
            .iter()
            .flatten()
            .filter_map(|f| f.get("name").and_then(Value::as_str).map(String::from))
            .collect()
    }
}

fn parse_document(path: &Path, text: &str) -> Result<Value, ManifestError> {
    let parse_err = |message: String| ManifestError::Parse {
        path: path.to_path_buf(),
        message,
    };
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            let doc: toml::Value = toml::from_str(text).map_err(|e| parse_err(e.to_string()))?;
            serde_json::to_value(doc).map_err(|e| parse_err(e.to_string()))
        }
        _ => serde_json::from_str(text).map_err(|e| parse_err(e.to_string())),
    }
}

fn load_functions_file(path: &Path) -> Result<Vec<Value>, ManifestError> {
    let text = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| ManifestError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_from_value_defaults() {
        let m = AgentManifest::from_value("plain", json!({}), Path::new(".")).unwrap();
        assert_eq!(m.title, "plain");
        assert_eq!(m.temperature, DEFAULT_TEMPERATURE);
        assert!(m.actions.is_empty());
        assert!(!m.notebook);
    }

    #[test]
    fn test_prompt_lines_and_render() {
        let m = AgentManifest::from_value(
            "dispatcher",
            json!({
                "title": "Dispatcher",
                "prompt": ["Today is {now}.", "Agents:", "{agents}", "{articles}"],
                "sample": "hello",
                "sample2": "weather?"
            }),
            Path::new("."),
        )
        .unwrap();
        let now = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let rendered = m.render_prompt("cook: Cook", now);
        assert_eq!(
            rendered,
            "Today is 2024-01-02 03:04:05.\nAgents:\ncook: Cook\n{articles}"
        );
        assert_eq!(
            m.samples,
            vec![
                ("sample".to_string(), "hello".to_string()),
                ("sample2".to_string(), "weather?".to_string())
            ]
        );
        assert_eq!(m.sample("sample2"), Some("weather?"));
        assert_eq!(m.sample("sample3"), None);
    }

    #[test]
    fn test_form_and_backtick() {
        let mut m = AgentManifest::empty("x");
        m.form = Some("Translate: {question}".to_string());
        assert_eq!(m.format_question("bonjour"), "Translate: bonjour");
        assert_eq!(m.format_question("`raw text"), "raw text");
    }

    #[test]
    fn test_invalid_action_is_reported() {
        let err = AgentManifest::from_value(
            "bad",
            json!({"actions": {"f": {"type": "rest"}}}),
            Path::new("."),
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidAction { action, .. } if action == "f"));
    }

    #[test]
    fn test_load_toml_with_functions_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("functions.json"),
            r#"[{"name": "get_weather", "parameters": {"type": "object"}}]"#,
        )
        .unwrap();
        let path = dir.path().join("weather.toml");
        std::fs::write(
            &path,
            r#"
title = "Weather"
prompt = "You report weather."
functions = "functions.json"
intro = ["Hi!"]

[actions.get_weather]
type = "rest"
url = "https://api.example.com/w?city={city}"
"#,
        )
        .unwrap();
        let m = AgentManifest::load(&path, dir.path()).unwrap();
        assert_eq!(m.key, "weather");
        assert_eq!(m.function_names(), vec!["get_weather"]);
        assert!(m.actions.resolve("get_weather").is_some());
        assert_eq!(m.pick_intro(), Some("Hi!"));
    }
}
