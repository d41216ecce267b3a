//! Lexical relevance ranking for query results: a content/time-decay
//! product, since this store has no embedding index to draw a semantic
//! score from.

use chrono::{DateTime, Utc};

use crate::types::{Category, Memory, Priority};

/// Computes the deterministic rank of `memory` against `query`.
pub fn rank(memory: &Memory, query: &str, now: DateTime<Utc>) -> f64 {
    let content_score = content_score(memory, query);
    let decay = time_decay(memory.timestamp, now);
    (content_score * decay * 10.0).round() / 10.0
}

fn content_score(memory: &Memory, query: &str) -> f64 {
    let query_lower = query.to_lowercase();
    let content_lower = memory.content.to_lowercase();

    let mut score = 0.0;
    if !query_lower.is_empty() && content_lower.contains(&query_lower) {
        score += 10.0;
    }

    let words: Vec<&str> = query_lower.split_whitespace().collect();
    let matched_words = words.iter().filter(|w| content_lower.contains(**w)).count();
    score += 2.0 * matched_words as f64;

    if content_lower.contains("```") {
        score += 3.0;
    }
    if content_lower.contains('/') && content_lower.contains('.') {
        score += 2.0;
    }
    if looks_like_tool_reference(&content_lower) {
        score += 2.0;
    }
    if is_error_query(&query_lower) && contains_error_marker(&content_lower) {
        score += 4.0;
    }

    score += match memory.priority {
        Priority::High | Priority::Urgent => 3.0,
        Priority::Medium => 1.0,
        Priority::Low => 0.0,
    };

    if memory.category.as_str().eq_ignore_ascii_case(query.trim()) {
        score += 2.0;
    }

    let matched_tags = memory.tags.iter().filter(|tag| query_lower.contains(&tag.to_lowercase())).count();
    score += matched_tags as f64;

    score
}

fn looks_like_tool_reference(content_lower: &str) -> bool {
    ["cargo", "npm", "git", "docker", "kubectl"].iter().any(|tool| content_lower.contains(tool))
}

fn is_error_query(query_lower: &str) -> bool {
    ["error", "bug", "fail", "debug", "crash"].iter().any(|kw| query_lower.contains(kw))
}

fn contains_error_marker(content_lower: &str) -> bool {
    ["error", "exception", "panic", "traceback", "stack trace"].iter().any(|kw| content_lower.contains(kw))
}

/// Whether `content` reads as an open error report: it carries an error
/// marker but no accompanying resolution marker.
pub fn has_unresolved_error_marker(content: &str) -> bool {
    let lower = content.to_lowercase();
    if !contains_error_marker(&lower) {
        return false;
    }
    !["resolved", "fixed", "closed"].iter().any(|kw| lower.contains(kw))
}

fn time_decay(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age = now.signed_duration_since(timestamp);
    if age.num_days() <= 1 {
        5.0
    } else if age.num_days() <= 7 {
        3.0
    } else if age.num_days() <= 30 {
        2.0
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, ContentType, KnownCategory, MemoryMetadata, MemoryStatus};
    use std::collections::HashMap;

    fn sample_memory(content: &str, timestamp: DateTime<Utc>) -> Memory {
        Memory {
            id: "id-1".into(),
            content: content.into(),
            timestamp,
            last_accessed: timestamp,
            access_count: 0,
            project: "default".into(),
            category: Category::Known(KnownCategory::Code),
            priority: Priority::Medium,
            status: MemoryStatus::Active,
            tags: vec!["rate-limit".into()],
            related_memories: vec![],
            complexity: 1,
            metadata: MemoryMetadata { content_type: ContentType::Text, language: None, size: content.len(), mermaid_diagram: false },
            task_connections: vec![],
            extra: HashMap::new(),
        }
    }

    #[test]
    fn exact_substring_outranks_partial_match() {
        let now = Utc::now();
        let exact = sample_memory("exponential backoff on 429", now);
        let partial = sample_memory("something about backoff strategies", now);
        let exact_score = rank(&exact, "exponential backoff on 429", now);
        let partial_score = rank(&partial, "exponential backoff on 429", now);
        assert!(exact_score > partial_score);
    }

    #[test]
    fn unresolved_error_marker_is_detected() {
        assert!(has_unresolved_error_marker("got a panic: index out of bounds"));
        assert!(!has_unresolved_error_marker("saw a panic earlier but it's fixed now"));
        assert!(!has_unresolved_error_marker("no issues here"));
    }

    #[test]
    fn recent_memory_outranks_old_one_given_equal_content() {
        let now = Utc::now();
        let recent = sample_memory("backoff strategy", now);
        let old = sample_memory("backoff strategy", now - chrono::Duration::days(60));
        assert!(rank(&recent, "backoff", now) > rank(&old, "backoff", now));
    }
}
