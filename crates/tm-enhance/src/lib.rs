//! Enhancement Adapter: generates a `title` and `summary` for a memory or
//! task body behind one `Enhancer` trait, with a deterministic rule-based
//! implementation always available and an optional HTTP-backed one, the
//! latter behind a cargo feature so it's never linked in unless configured.
//! Bounded concurrency for the HTTP implementation's batch path uses a
//! `tokio::sync::Semaphore` permit per in-flight request.

use async_trait::async_trait;
use tm_core::{Classify, ErrorKind};

pub const MAX_TITLE_LEN: usize = 60;
pub const MAX_SUMMARY_LEN: usize = 150;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Enhancement {
    pub title: String,
    pub summary: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EnhanceError {
    #[error("enhancement input was empty")]
    EmptyInput,
    #[error("enhancement endpoint error: {0}")]
    Endpoint(String),
    #[error("enhancement request timed out")]
    Timeout,
}

impl Classify for EnhanceError {
    fn kind(&self) -> ErrorKind {
        match self {
            EnhanceError::EmptyInput => ErrorKind::InvalidInput,
            EnhanceError::Endpoint(_) => ErrorKind::External,
            EnhanceError::Timeout => ErrorKind::Timeout,
        }
    }
}

#[async_trait]
pub trait Enhancer: Send + Sync {
    async fn enhance(&self, content: &str) -> Result<Enhancement, EnhanceError>;
}

/// Deterministic rule-based extractor: the first heading/sentence becomes
/// the title, the opening sentence-bounded span becomes the summary. No
/// network calls, always available.
pub struct RuleBasedEnhancer;

#[async_trait]
impl Enhancer for RuleBasedEnhancer {
    async fn enhance(&self, content: &str) -> Result<Enhancement, EnhanceError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(EnhanceError::EmptyInput);
        }
        Ok(Enhancement { title: extract_title(trimmed), summary: extract_summary(trimmed) })
    }
}

fn extract_title(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or(content);
    let heading = first_line.trim_start_matches('#').trim();
    let candidate = if heading.is_empty() { first_sentence(content) } else { heading.to_string() };
    truncate_words(&candidate, MAX_TITLE_LEN)
}

fn extract_summary(content: &str) -> String {
    let body: String = content.lines().skip(1).collect::<Vec<_>>().join(" ");
    let source = if body.trim().is_empty() { content } else { body.as_str() };
    truncate_words(&first_sentence(source), MAX_SUMMARY_LEN)
}

fn first_sentence(text: &str) -> String {
    let normalized = text.replace('\n', " ");
    match normalized.find(['.', '!', '?']) {
        Some(idx) => normalized[..=idx].trim().to_string(),
        None => normalized.trim().to_string(),
    }
}

fn truncate_words(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return capitalize(text);
    }
    let mut out = String::new();
    for word in text.split_whitespace() {
        if out.len() + word.len() + 1 > max_len {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    capitalize(&out)
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(feature = "http")]
pub mod http {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    const DEFAULT_TIMEOUT_SECS: u64 = 120;
    const DEFAULT_CONCURRENCY: usize = 4;

    #[derive(serde::Serialize)]
    struct Request<'a> {
        model: &'a str,
        prompt: &'a str,
    }

    #[derive(serde::Deserialize)]
    struct Response {
        title: String,
        summary: String,
    }

    /// Calls a local inference endpoint with a fixed prompt template.
    /// Concurrency is bounded by a semaphore so a batch enhance never opens
    /// more than `concurrency` requests at once.
    pub struct HttpEnhancer {
        client: reqwest::Client,
        url: String,
        model: String,
        semaphore: Arc<Semaphore>,
    }

    impl HttpEnhancer {
        pub fn new(url: String, model: String) -> Self {
            Self::with_concurrency(url, model, DEFAULT_CONCURRENCY)
        }

        pub fn with_concurrency(url: String, model: String, concurrency: usize) -> Self {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                .build()
                .expect("reqwest client builds with static config");
            Self { client, url, model, semaphore: Arc::new(Semaphore::new(concurrency.max(1))) }
        }
    }

    #[async_trait]
    impl Enhancer for HttpEnhancer {
        async fn enhance(&self, content: &str) -> Result<Enhancement, EnhanceError> {
            if content.trim().is_empty() {
                return Err(EnhanceError::EmptyInput);
            }
            let _permit = self.semaphore.acquire().await.expect("semaphore never closed");

            let prompt = format!(
                "Produce a title (<= {MAX_TITLE_LEN} chars) and summary (<= {MAX_SUMMARY_LEN} chars) for:\n\n{content}"
            );
            let response = self
                .client
                .post(&self.url)
                .json(&Request { model: &self.model, prompt: &prompt })
                .send()
                .await
                .map_err(|e| if e.is_timeout() { EnhanceError::Timeout } else { EnhanceError::Endpoint(e.to_string()) })?;

            if !response.status().is_success() {
                return Err(EnhanceError::Endpoint(format!("endpoint returned {}", response.status())));
            }

            let parsed: Response = response.json().await.map_err(|e| EnhanceError::Endpoint(e.to_string()))?;
            Ok(Enhancement {
                title: truncate_words(&parsed.title, MAX_TITLE_LEN),
                summary: truncate_words(&parsed.summary, MAX_SUMMARY_LEN),
            })
        }
    }
}

/// Batch-enhances `items`, skipping any whose `has_tags` callback reports
/// both `title:` and `summary:` tags already present, unless `force_update`
/// is set. Reports per-item progress via `on_progress(done, total)`. Bails
/// out early (returning what was processed so far, plus the trip) if the
/// shared bulk-iteration circuit breaker cuts in.
pub async fn batch_enhance<T>(
    enhancer: &dyn Enhancer,
    items: Vec<T>,
    already_enhanced: impl Fn(&T) -> bool,
    content_of: impl Fn(&T) -> String,
    force_update: bool,
    mut on_progress: impl FnMut(usize, usize),
) -> (Vec<(T, Result<Enhancement, EnhanceError>)>, Option<tm_core::BreakerTrip>) {
    let total = items.len();
    let mut results = Vec::with_capacity(total);
    let mut breaker = tm_core::CircuitBreaker::new();
    for (idx, item) in items.into_iter().enumerate() {
        if !force_update && already_enhanced(&item) {
            on_progress(idx + 1, total);
            continue;
        }
        let content = content_of(&item);
        if let Some(trip) = breaker.check(content.len()) {
            return (results, Some(trip));
        }
        let outcome = enhancer.enhance(&content).await;
        on_progress(idx + 1, total);
        results.push((item, outcome));
        if idx % 50 == 0 {
            tokio::task::yield_now().await;
        }
    }
    (results, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rule_based_enhancer_extracts_title_and_summary() {
        let enhancer = RuleBasedEnhancer;
        let enhancement = enhancer.enhance("# Rate limiting notes\nUse exponential backoff on 429s. Retry up to 5 times.").await.unwrap();
        assert_eq!(enhancement.title, "Rate limiting notes");
        assert!(enhancement.summary.contains("exponential backoff"));
    }

    #[tokio::test]
    async fn rule_based_enhancer_rejects_empty_content() {
        let enhancer = RuleBasedEnhancer;
        let result = enhancer.enhance("   ").await;
        assert!(matches!(result, Err(EnhanceError::EmptyInput)));
    }

    #[test]
    fn truncate_words_respects_max_len() {
        let long = "word ".repeat(40);
        let truncated = truncate_words(&long, MAX_TITLE_LEN);
        assert!(truncated.len() <= MAX_TITLE_LEN);
    }

    #[tokio::test]
    async fn batch_enhance_skips_already_enhanced_unless_forced() {
        let enhancer = RuleBasedEnhancer;
        let items = vec!["first item content here".to_string(), "second item content here".to_string()];
        let mut progressed = 0;
        let (results, trip) = batch_enhance(
            &enhancer,
            items,
            |_| true,
            |s: &String| s.clone(),
            false,
            |done, _total| progressed = done,
        )
        .await;
        assert!(results.is_empty());
        assert_eq!(progressed, 2);
        assert!(trip.is_none());
    }

    #[tokio::test]
    async fn batch_enhance_runs_forced_items_through_the_enhancer() {
        let enhancer = RuleBasedEnhancer;
        let items = vec!["first item content here".to_string(), "second item content here".to_string()];
        let (results, trip) = batch_enhance(&enhancer, items, |_| true, |s: &String| s.clone(), true, |_, _| {}).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, outcome)| outcome.is_ok()));
        assert!(trip.is_none());
    }
}
