//! Natural-language status-intent parser.
//!
//! Looks for completion/start/obstacle/reset phrases in free text (e.g. a
//! chat message or commit note) and maps them to a target [`TaskStatus`]
//! with a confidence score, so callers can offer a status update without
//! requiring an explicit enum value.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tm_store::TaskStatus;

#[derive(Debug, Clone, Serialize)]
pub struct IntentMatch {
    pub status: TaskStatus,
    pub confidence: f64,
    pub matched_phrase: String,
}

struct Phrase {
    pattern: &'static str,
    status: TaskStatus,
    confidence: f64,
}

static PHRASES: &[Phrase] = &[
    Phrase { pattern: r"(?i)\b(done|finished|completed|shipped|wrapped up)\b", status: TaskStatus::Done, confidence: 0.9 },
    Phrase { pattern: r"(?i)\ball (tests|checks) pass", status: TaskStatus::Done, confidence: 0.85 },
    Phrase { pattern: r"(?i)\b(started|working on|picking this up|began)\b", status: TaskStatus::InProgress, confidence: 0.8 },
    Phrase { pattern: r"(?i)\b(blocked|stuck|waiting on|can't proceed|cannot proceed)\b", status: TaskStatus::Blocked, confidence: 0.85 },
    Phrase { pattern: r"(?i)\b(back to (the )?backlog|reopen(ed)?|not started|reset)\b", status: TaskStatus::Todo, confidence: 0.7 },
    Phrase { pattern: r"(?i)\b(nearly there|almost there)\b", status: TaskStatus::Done, confidence: 0.35 },
];

static COMPILED: Lazy<Vec<(Regex, TaskStatus, f64)>> = Lazy::new(|| {
    PHRASES.iter().map(|p| (Regex::new(p.pattern).expect("static pattern"), p.status, p.confidence)).collect()
});

/// Scans `text` for the first recognizable status intent phrase. Returns
/// `None` when no phrase matches — callers should fall back to asking for
/// an explicit status rather than guessing.
pub fn parse_intent(text: &str) -> Option<IntentMatch> {
    let mut best: Option<IntentMatch> = None;
    for (re, status, confidence) in COMPILED.iter() {
        if let Some(m) = re.find(text) {
            let candidate = IntentMatch { status: *status, confidence: *confidence, matched_phrase: m.as_str().to_string() };
            if best.as_ref().map(|b| candidate.confidence > b.confidence).unwrap_or(true) {
                best = Some(candidate);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_completion_phrase() {
        let m = parse_intent("just finished the migration script").unwrap();
        assert_eq!(m.status, TaskStatus::Done);
    }

    #[test]
    fn recognizes_blocked_phrase() {
        let m = parse_intent("we're blocked waiting on the vendor API key").unwrap();
        assert_eq!(m.status, TaskStatus::Blocked);
    }

    #[test]
    fn recognizes_start_phrase() {
        let m = parse_intent("started working on the auth refactor today").unwrap();
        assert_eq!(m.status, TaskStatus::InProgress);
    }

    #[test]
    fn no_match_returns_none() {
        assert!(parse_intent("the weather is nice today").is_none());
    }

    #[test]
    fn picks_highest_confidence_when_multiple_match() {
        let m = parse_intent("started but now it's done").unwrap();
        assert_eq!(m.status, TaskStatus::Done);
    }

    #[test]
    fn hedged_phrase_matches_with_low_confidence() {
        let m = parse_intent("we're nearly there on this one").unwrap();
        assert_eq!(m.status, TaskStatus::Done);
        assert!(m.confidence < 0.4);
    }
}
