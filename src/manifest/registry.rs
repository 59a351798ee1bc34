//! Manifest 注册表：agent key -> AgentManifest
//!
//! 扫描目录下的 *.json / *.toml；重新加载目录会替换全部内容。
//! 一组 manifest（ManifestSet）对应一个目录及其默认 agent，`/switch <set>` 在组之间切换。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::manifest::{AgentManifest, ManifestError};

/// 一组 manifest：目录与切换后启动的 agent
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestSet {
    pub manifests_dir: PathBuf,
    pub default_agent: String,
}

impl ManifestSet {
    pub fn new(manifests_dir: impl Into<PathBuf>, default_agent: impl Into<String>) -> Self {
        Self {
            manifests_dir: manifests_dir.into(),
            default_agent: default_agent.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManifestRegistry {
    manifests: BTreeMap<String, Arc<AgentManifest>>,
    /// 模板与 functions 文件的相对根目录，重新加载时沿用
    base_dir: PathBuf,
}

impl ManifestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从目录加载；目录不存在时返回 Io 错误
    pub fn load_dir(dir: impl AsRef<Path>, base_dir: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let mut registry = Self::new();
        registry.reload(dir, base_dir)?;
        Ok(registry)
    }

    /// 用另一个目录的内容替换当前注册表；失败时保持原样
    pub fn reload(&mut self, dir: impl AsRef<Path>, base_dir: impl AsRef<Path>) -> Result<usize, ManifestError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ManifestError::Io {
                path: dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "manifest directory not found"),
            });
        }

        let mut manifests = BTreeMap::new();
        for ext in ["json", "toml"] {
            let pattern = dir.join(format!("*.{ext}"));
            let pattern = pattern.to_string_lossy();
            let paths = glob::glob(&pattern).map_err(|e| ManifestError::Glob(e.to_string()))?;
            for path in paths.flatten() {
                let manifest = AgentManifest::load(&path, base_dir.as_ref())?;
                tracing::debug!(agent = %manifest.key, path = %path.display(), "manifest loaded");
                manifests.insert(manifest.key.clone(), Arc::new(manifest));
            }
        }

        tracing::info!(dir = %dir.display(), count = manifests.len(), "manifests loaded");
        let count = manifests.len();
        self.manifests = manifests;
        self.base_dir = base_dir.as_ref().to_path_buf();
        Ok(count)
    }

    pub fn insert(&mut self, manifest: AgentManifest) {
        self.manifests.insert(manifest.key.clone(), Arc::new(manifest));
    }

    pub fn get(&self, key: &str) -> Option<Arc<AgentManifest>> {
        self.manifests.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.manifests.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.manifests.keys().cloned().collect()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `/key         title` 形式的帮助列表
    pub fn help_list(&self) -> Vec<String> {
        self.manifests
            .iter()
            .map(|(key, m)| format!("/{:<12} {}", key, m.title))
            .collect()
    }

    /// 供 `{agents}` 使用的 `key: title` 列表；指定 keys 时只列出这些（忽略不存在的）
    pub fn agents_summary(&self, keys: Option<&[String]>) -> String {
        let lines: Vec<String> = match keys {
            Some(keys) => keys
                .iter()
                .filter_map(|k| self.manifests.get(k).map(|m| format!("{}: {}", k, m.title)))
                .collect(),
            None => self
                .manifests
                .iter()
                .map(|(k, m)| format!("{}: {}", k, m.title))
                .collect(),
        };
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_load_dir_json_and_toml() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "cook.json", r#"{"title": "Cook"}"#);
        write(dir.path(), "weather.toml", "title = \"Weather\"\n");
        write(dir.path(), "notes.txt", "ignored");

        let registry = ManifestRegistry::load_dir(dir.path(), dir.path()).unwrap();
        assert_eq!(registry.keys(), vec!["cook", "weather"]);
        assert!(registry.contains("cook"));
        assert_eq!(registry.get("weather").unwrap().title, "Weather");
        assert_eq!(registry.help_list()[0], "/cook         Cook");
        assert_eq!(registry.agents_summary(None), "cook: Cook\nweather: Weather");
        assert_eq!(
            registry.agents_summary(Some(&["weather".to_string(), "ghost".to_string()])),
            "weather: Weather"
        );
    }

    #[test]
    fn test_reload_replaces_contents() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write(a.path(), "one.json", "{}");
        write(b.path(), "two.json", "{}");

        let mut registry = ManifestRegistry::load_dir(a.path(), a.path()).unwrap();
        registry.reload(b.path(), b.path()).unwrap();
        assert_eq!(registry.keys(), vec!["two"]);
        assert_eq!(registry.base_dir(), b.path());
    }

    #[test]
    fn test_missing_dir_keeps_registry() {
        let a = tempfile::tempdir().unwrap();
        write(a.path(), "one.json", "{}");
        let mut registry = ManifestRegistry::load_dir(a.path(), a.path()).unwrap();
        assert!(registry.reload(a.path().join("nope"), a.path()).is_err());
        assert_eq!(registry.keys(), vec!["one"]);
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.json", "{not json");
        let err = ManifestRegistry::load_dir(dir.path(), dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { path, .. } if path.ends_with("broken.json")));
    }
}
