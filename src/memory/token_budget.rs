//! Token 预算估算
//!
//! 按模型名估算文本 token 数；纯函数、无状态，可记忆化。
//! 只作为上下文检索打包（ContextAugmenter）的输入，从不修改会话状态。

use std::collections::HashMap;
use std::sync::Mutex;

use crate::memory::Message;

/// Token 计数器：给定文本与模型名返回 token 数
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str, model_name: &str) -> usize;

    /// 消息内容 token 数之和
    fn total_tokens(&self, messages: &[Message], model_name: &str) -> usize {
        messages
            .iter()
            .map(|m| self.count_tokens(&m.content, model_name))
            .sum()
    }
}

/// Token 估算器（简单的字符计数近似）
///
/// 英文约 4 字符/token，中文约 1.5 字符/token；非 gpt 系列模型统一按同一规则估算。
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量；空文本为 0
    pub fn estimate(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let mut ascii_chars = 0usize;
        let mut non_ascii_chars = 0usize;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars.div_ceil(4) + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }
}

impl TokenCounter for TokenEstimator {
    fn count_tokens(&self, text: &str, _model_name: &str) -> usize {
        Self::estimate(text)
    }
}

/// 记忆化包装：相同 (模型, 文本) 只计算一次
pub struct MemoizedTokenCounter<C> {
    inner: C,
    cache: Mutex<HashMap<(String, String), usize>>,
    max_entries: usize,
}

impl<C: TokenCounter> MemoizedTokenCounter<C> {
    pub fn new(inner: C, max_entries: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
            max_entries,
        }
    }
}

impl<C: TokenCounter> TokenCounter for MemoizedTokenCounter<C> {
    fn count_tokens(&self, text: &str, model_name: &str) -> usize {
        let key = (model_name.to_string(), text.to_string());
        if let Ok(cache) = self.cache.lock() {
            if let Some(n) = cache.get(&key) {
                return *n;
            }
        }
        let n = self.inner.count_tokens(text, model_name);
        if let Ok(mut cache) = self.cache.lock() {
            // 超过上限时整体清空，避免无界增长
            if cache.len() >= self.max_entries {
                cache.clear();
            }
            cache.insert(key, n);
        }
        n
    }
}
