//! 向量库协作方
//!
//! VectorStore：给定查询向量返回按相关度排序的文本片段（top-K）。
//! InMemoryVectorIndex 是本地实现（余弦相似度），从 `<index_dir>/<name>.json` 加载；
//! 接 Pinecone 等远程库时只需另行实现 VectorStore。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 检索到的片段
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub text: String,
    pub score: f32,
    pub metadata: HashMap<String, String>,
}

impl Snippet {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score,
            metadata: HashMap::new(),
        }
    }
}

/// 向量库查询接口
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<Snippet>, String>;
}

/// 索引文件中的一条记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// 内存向量索引
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorIndex {
    entries: Vec<IndexEntry>,
}

impl InMemoryVectorIndex {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self { entries }
    }

    /// 从 JSON 数组文件加载
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let entries: Vec<IndexEntry> = serde_json::from_str(&data)?;
        Ok(Self { entries })
    }

    pub fn insert(&mut self, text: impl Into<String>, embedding: Vec<f32>) {
        self.entries.push(IndexEntry {
            text: text.into(),
            embedding,
            metadata: HashMap::new(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorIndex {
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<Snippet>, String> {
        if embedding.is_empty() {
            return Err("Empty query embedding".to_string());
        }
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(embedding, &e.embedding), e))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, e)| Snippet {
                text: e.text.clone(),
                score,
                metadata: e.metadata.clone(),
            })
            .collect())
    }
}

/// 余弦相似度
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// 按 manifest 中 embeddings.name 绑定向量库（每次新建会话都重新绑定）
pub trait VectorStoreFactory: Send + Sync {
    fn open(&self, table_name: &str) -> anyhow::Result<Arc<dyn VectorStore>>;
}

/// 从本地目录加载 `<name>.json` 索引
#[derive(Debug, Clone)]
pub struct LocalIndexFactory {
    dir: PathBuf,
}

impl LocalIndexFactory {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl VectorStoreFactory for LocalIndexFactory {
    fn open(&self, table_name: &str) -> anyhow::Result<Arc<dyn VectorStore>> {
        let path = self.dir.join(format!("{table_name}.json"));
        if !path.exists() {
            anyhow::bail!("No vector index named {table_name} ({})", path.display());
        }
        Ok(Arc::new(InMemoryVectorIndex::load(path)?))
    }
}
