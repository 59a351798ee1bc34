//! 上下文检索增强（RAG）
//!
//! 仅当 manifest 声明 embeddings 时启用：
//! 1. 所有 user 消息（最新在前）拼成查询
//! 2. 调用嵌入协作方得到查询向量
//! 3. 向量库取 top-K 候选
//! 4. 按排名贪心累积；一旦超出 `max_tokens - 500` 立即停止（first-fit，不回填后面更短的候选）
//! 5. 用累积结果替换 system 模板中的第一个 `{articles}`
//!
//! 嵌入或向量库出错时只记录日志，本轮不注入上下文。

use std::sync::Arc;

use crate::llm::{EmbeddingProvider, LlmModel};
use crate::memory::{MessageHistory, TokenCounter, VectorStore};

/// 为回答预留的 token 数
pub const RESPONSE_RESERVE_TOKENS: usize = 500;
/// 默认候选数
pub const DEFAULT_TOP_K: usize = 12;

pub const ARTICLES_PLACEHOLDER: &str = "{articles}";

/// 一次增强的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Augmentation {
    /// 被注入的片段数
    pub accepted: usize,
    /// 因预算被丢弃的候选数
    pub rejected: usize,
}

pub struct ContextAugmenter {
    embedder: Arc<dyn EmbeddingProvider>,
    counter: Arc<dyn TokenCounter>,
    top_k: usize,
}

impl ContextAugmenter {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            embedder,
            counter,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// 检索并改写 system 消息；失败时返回 None 且不改动历史
    ///
    /// `prompt_template` 是 manifest 渲染后的原始 system 提示（含 `{articles}`），
    /// 每次都从模板重新替换，因此同样的片段重复注入结果不变。
    pub async fn augment(
        &self,
        store: &dyn VectorStore,
        history: &mut MessageHistory,
        prompt_template: &str,
        model: &LlmModel,
    ) -> Option<Augmentation> {
        match self.try_augment(store, history, prompt_template, model).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(error = %e, "context augmentation skipped");
                None
            }
        }
    }

    async fn try_augment(
        &self,
        store: &dyn VectorStore,
        history: &mut MessageHistory,
        prompt_template: &str,
        model: &LlmModel,
    ) -> Result<Augmentation, String> {
        let query: String = history
            .user_contents_latest_first()
            .map(|c| format!("{c}\n"))
            .collect();

        let embedding = self.embedder.embed(&query).await?;
        let candidates = store.query(&embedding, self.top_k).await?;

        let budget = model.max_tokens.saturating_sub(RESPONSE_RESERVE_TOKENS);
        let base_tokens = self.counter.count_tokens(prompt_template, model.name())
            + self
                .counter
                .total_tokens(history.messages().get(1..).unwrap_or_default(), model.name());
        tracing::debug!(base_tokens, budget, candidates = candidates.len(), "augmenting context");

        let (articles, accepted) = self.pack(
            candidates.iter().map(|c| c.text.as_str()),
            &query,
            base_tokens,
            budget,
            model.name(),
        );
        let outcome = Augmentation {
            accepted,
            rejected: candidates.len() - accepted,
        };

        history
            .rewrite_system(prompt_template.replacen(ARTICLES_PLACEHOLDER, &articles, 1))
            .map_err(|e| e.to_string())?;

        tracing::info!(
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            tokens = self.counter.count_tokens(&format!("{articles}{query}"), model.name()),
            "context augmented"
        );
        Ok(outcome)
    }

    /// first-fit 打包：遇到第一个放不下的候选即停止
    fn pack<'a>(
        &self,
        candidates: impl Iterator<Item = &'a str>,
        query: &str,
        base_tokens: usize,
        budget: usize,
        model_name: &str,
    ) -> (String, usize) {
        let mut articles = String::new();
        let mut count = 0;
        for text in candidates {
            let section = format!("\n\nSection:\n\"\"\"\n{text}\n\"\"\"");
            let trial = format!("{articles}{section}{query}");
            if self.counter.count_tokens(&trial, model_name) + base_tokens > budget {
                break;
            }
            articles.push_str(&section);
            count += 1;
        }
        (articles, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryVectorIndex, Role, Snippet, TokenEstimator};
    use async_trait::async_trait;

    struct FixedEmbedder(Result<Vec<f32>, String>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, String> {
            self.0.clone()
        }
    }

    struct RankedStore(Vec<String>);

    #[async_trait]
    impl VectorStore for RankedStore {
        async fn query(&self, _embedding: &[f32], top_k: usize) -> Result<Vec<Snippet>, String> {
            Ok(self
                .0
                .iter()
                .take(top_k)
                .enumerate()
                .map(|(i, t)| Snippet::new(t.clone(), 1.0 - i as f32 * 0.1))
                .collect())
        }
    }

    fn augmenter(embedding: Result<Vec<f32>, String>) -> ContextAugmenter {
        ContextAugmenter::new(Arc::new(FixedEmbedder(embedding)), Arc::new(TokenEstimator))
    }

    fn history_with(prompt: &str, question: &str) -> MessageHistory {
        let mut h = MessageHistory::in_memory("docs");
        h.append(Role::System, prompt, None).unwrap();
        h.append(Role::User, question, None).unwrap();
        h
    }

    #[tokio::test]
    async fn test_injects_articles_into_placeholder() {
        let mut index = InMemoryVectorIndex::default();
        index.insert("Lyon is sunny", vec![1.0, 0.0]);
        let mut history = history_with("Use these:{articles}\nEnd.", "weather?");
        let model = LlmModel::new("gpt3", "gpt-3.5-turbo", 4096);

        let outcome = augmenter(Ok(vec![1.0, 0.0]))
            .augment(&index, &mut history, "Use these:{articles}\nEnd.", &model)
            .await
            .unwrap();

        assert_eq!(outcome.accepted, 1);
        let system = &history.get(0).unwrap().content;
        assert!(system.contains("Section:\n\"\"\"\nLyon is sunny\n\"\"\""));
        assert!(!system.contains("{articles}"));
        assert!(system.ends_with("\nEnd."));
    }

    #[tokio::test]
    async fn test_repeated_augmentation_is_idempotent() {
        let store = RankedStore(vec!["alpha".into(), "beta".into()]);
        let template = "Prompt {articles}";
        let mut history = history_with(template, "q");
        let model = LlmModel::new("gpt3", "gpt-3.5-turbo", 4096);
        let aug = augmenter(Ok(vec![1.0]));

        aug.augment(&store, &mut history, template, &model).await.unwrap();
        let first = history.get(0).unwrap().content.clone();
        aug.augment(&store, &mut history, template, &model).await.unwrap();
        assert_eq!(history.get(0).unwrap().content, first);
        assert_eq!(first.matches("alpha").count(), 1);
    }

    #[tokio::test]
    async fn test_first_fit_stops_without_backfill() {
        // 第二个候选很长，第三个很短；first-fit 在第二个处停止，不会回填第三个
        let store = RankedStore(vec!["short one".into(), "x".repeat(4000), "tiny".into()]);
        let template = "P {articles}";
        let mut history = history_with(template, "q");
        let model = LlmModel::new("small", "small-model", 1000);

        let outcome = augmenter(Ok(vec![1.0]))
            .augment(&store, &mut history, template, &model)
            .await
            .unwrap();

        assert_eq!(outcome, Augmentation { accepted: 1, rejected: 2 });
        let system = &history.get(0).unwrap().content;
        assert!(system.contains("short one"));
        assert!(!system.contains("tiny"));

        let counter = TokenEstimator;
        let total = counter.total_tokens(history.messages(), model.name());
        assert!(total <= model.max_tokens - RESPONSE_RESERVE_TOKENS);
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_history_untouched() {
        let store = RankedStore(vec!["alpha".into()]);
        let template = "Prompt {articles}";
        let mut history = history_with(template, "q");
        let model = LlmModel::new("gpt3", "gpt-3.5-turbo", 4096);

        let outcome = augmenter(Err("network down".to_string()))
            .augment(&store, &mut history, template, &model)
            .await;

        assert!(outcome.is_none());
        assert_eq!(history.get(0).unwrap().content, template);
    }
}
