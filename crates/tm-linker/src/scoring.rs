//! Task-memory relevance scoring: a weighted sum of lexical and metadata
//! signals (no embedding index backs this store).

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use tm_store::{Memory, Task};

const W_TEXT: f64 = 0.45;
const W_TAGS: f64 = 0.25;
const W_CATEGORY: f64 = 0.10;
const W_PROJECT: f64 = 0.15;
const W_RECENCY: f64 = 0.05;

pub const DEFAULT_THRESHOLD: f64 = 0.2;
pub const DEFAULT_TOP_K: usize = 5;

/// Scores `memory` against `task`, returning the normalized relevance and
/// the token overlap that contributed most to the text component.
pub fn relevance(task: &Task, memory: &Memory) -> (f64, Vec<String>) {
    let task_tokens = tokenize(&format!("{} {}", task.title, task.description));
    let memory_tokens = tokenize(&memory.content);
    let overlap: Vec<String> = task_tokens.intersection(&memory_tokens).cloned().collect();

    let text_score = jaccard(&task_tokens, &memory_tokens);
    let tag_score = tag_overlap(&task.tags, &memory.tags);
    let category_score = if task.category.as_str() == memory.category.as_str() { 1.0 } else { 0.0 };
    let project_score = if task.project == memory.project { 1.0 } else { 0.0 };
    let recency = recency_bonus(memory.timestamp, Utc::now());

    let score = W_TEXT * text_score
        + W_TAGS * tag_score
        + W_CATEGORY * category_score
        + W_PROJECT * project_score
        + W_RECENCY * recency;

    (score.min(1.0), overlap)
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 { 0.0 } else { intersection / union }
}

fn tag_overlap(task_tags: &[String], memory_tags: &[String]) -> f64 {
    let denom = task_tags.len().max(memory_tags.len()).max(1) as f64;
    let task_set: HashSet<&str> = task_tags.iter().map(|s| s.as_str()).collect();
    let overlap = memory_tags.iter().filter(|t| task_set.contains(t.as_str())).count() as f64;
    overlap / denom
}

fn recency_bonus(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = now.signed_duration_since(timestamp).num_days();
    if days <= 7 {
        1.0
    } else if days <= 30 {
        0.5
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tm_store::{Category, ContentType, KnownCategory, MemoryMetadata, MemoryStatus, Priority, TaskStatus};

    fn sample_task() -> Task {
        Task {
            id: "task-1".into(),
            serial: "TASK-0001".into(),
            title: "Handle rate limiting in client".into(),
            description: "Add retry with exponential backoff".into(),
            project: "api".into(),
            category: Category::Known(KnownCategory::Code),
            priority: Priority::Medium,
            status: TaskStatus::Todo,
            parent_task: None,
            subtasks: vec![],
            tags: vec!["rate-limit".into()],
            memory_connections: vec![],
            created: Utc::now(),
            updated: Utc::now(),
            completed: None,
            status_history: vec![],
            extra: HashMap::new(),
        }
    }

    fn sample_memory(content: &str, project: &str, tags: Vec<String>) -> Memory {
        Memory {
            id: "mem-1".into(),
            content: content.into(),
            timestamp: Utc::now(),
            last_accessed: Utc::now(),
            access_count: 0,
            project: project.into(),
            category: Category::Known(KnownCategory::Code),
            priority: Priority::Medium,
            status: MemoryStatus::Active,
            tags,
            related_memories: vec![],
            complexity: 1,
            metadata: MemoryMetadata { content_type: ContentType::Text, language: None, size: content.len(), mermaid_diagram: false },
            task_connections: vec![],
            extra: HashMap::new(),
        }
    }

    #[test]
    fn related_memory_scores_above_threshold() {
        let task = sample_task();
        let memory = sample_memory("Use exponential backoff on 429 rate limit errors", "api", vec!["rate-limit".into()]);
        let (score, overlap) = relevance(&task, &memory);
        assert!(score >= DEFAULT_THRESHOLD, "expected score >= {DEFAULT_THRESHOLD}, got {score}");
        assert!(!overlap.is_empty());
    }

    #[test]
    fn unrelated_memory_scores_low() {
        let task = sample_task();
        let memory = sample_memory("My grandmother's lasagna recipe notes", "cooking", vec!["recipe".into()]);
        let (score, _) = relevance(&task, &memory);
        assert!(score < DEFAULT_THRESHOLD);
    }

    #[test]
    fn score_never_exceeds_one() {
        let task = sample_task();
        let memory = sample_memory("Handle rate limiting in client exponential backoff", "api", vec!["rate-limit".into()]);
        let (score, _) = relevance(&task, &memory);
        assert!(score <= 1.0);
    }
}
