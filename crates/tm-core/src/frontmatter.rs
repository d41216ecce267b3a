//! Front-matter codec.
//!
//! Reads two historical envelope shapes: a fenced `---` YAML block (the
//! modern form, always written back out) and a legacy HTML-comment block
//! (`<!-- key: value -->` lines) kept for backward compatibility with
//! pre-migration records. Adapted from `obsidian-fs::frontmatter`, extended
//! with the legacy envelope and comma-separated list tolerance that the
//! original only needed for the fenced form.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

pub type FrontMatter = Map<String, Value>;

/// Front-matter keys that must always round-trip as JSON arrays, even when
/// the source envelope wrote them as a bare comma-separated string.
const LIST_KEYS: &[&str] = &["tags", "related_memories", "task_connections", "subtasks"];

pub struct ParsedRecord {
    pub front_matter: Option<FrontMatter>,
    pub body: String,
}

/// Parses `raw` trying the fenced envelope first, then the legacy
/// HTML-comment envelope, then falling back to "no front matter".
pub fn parse(raw: &str) -> ParsedRecord {
    if let Some((fm_src, body)) = split_fenced(raw) {
        let front_matter = parse_yaml_block(fm_src).map(|mut fm| {
            normalize_lists(&mut fm);
            fm
        });
        return ParsedRecord { front_matter, body: body.to_string() };
    }

    if let Some((fm_src, body)) = split_legacy_comment(raw) {
        let mut fm = parse_legacy_block(fm_src);
        normalize_lists(&mut fm);
        let front_matter = if fm.is_empty() { None } else { Some(fm) };
        return ParsedRecord { front_matter, body: body.to_string() };
    }

    ParsedRecord { front_matter: None, body: raw.to_string() }
}

/// Always emits the fenced form, sorting keys for a stable diff.
pub fn render(front_matter: &FrontMatter, body: &str) -> String {
    if front_matter.is_empty() {
        return body.to_string();
    }
    let ordered: BTreeMap<&String, &Value> = front_matter.iter().collect();
    let yaml_map: serde_yaml::Value = serde_yaml::to_value(
        ordered.into_iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Map<_, _>>(),
    )
    .unwrap_or(serde_yaml::Value::Null);
    let yaml_text = serde_yaml::to_string(&yaml_map).unwrap_or_default();
    format!("---\n{}---\n\n{}", yaml_text, body.trim_start_matches('\n'))
}

fn split_fenced(raw: &str) -> Option<(&str, &str)> {
    let after_open = raw.strip_prefix("---")?;
    let after_open = after_open.strip_prefix("\r\n").or_else(|| after_open.strip_prefix('\n'))?;

    let mut offset = 0usize;
    for line in after_open.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == "---" {
            let fm_src = &after_open[..offset];
            let body_start = offset + line.len();
            let body = after_open.get(body_start..).unwrap_or("");
            return Some((fm_src, body.trim_start_matches('\n')));
        }
        offset += line.len();
    }
    None
}

fn split_legacy_comment(raw: &str) -> Option<(&str, &str)> {
    let trimmed = raw.trim_start();
    let after_open = trimmed.strip_prefix("<!--")?;
    let close_idx = after_open.find("-->")?;
    let fm_src = &after_open[..close_idx];
    let body = &after_open[close_idx + 3..];
    Some((fm_src, body.trim_start_matches('\n')))
}

fn parse_yaml_block(fm_src: &str) -> Option<FrontMatter> {
    let value: serde_yaml::Value = serde_yaml::from_str(fm_src).ok()?;
    match yaml_to_json(value) {
        Value::Object(map) if !map.is_empty() => Some(map),
        _ => None,
    }
}

fn parse_legacy_block(fm_src: &str) -> FrontMatter {
    let mut map = Map::new();
    for line in fm_src.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else { continue };
        let key = key.trim().to_string();
        let value = value.trim();
        map.insert(key, legacy_scalar_to_json(value));
    }
    map
}

fn legacy_scalar_to_json(value: &str) -> Value {
    if let Ok(b) = value.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(n) = value.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = value.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(value.to_string())
}

/// Ensures list-typed keys always decode as arrays, tolerating a bare
/// comma-separated string left over from the legacy envelope.
fn normalize_lists(fm: &mut FrontMatter) {
    for key in LIST_KEYS {
        if let Some(value) = fm.get_mut(*key) {
            if let Value::String(s) = value {
                let items: Vec<Value> = s
                    .split(',')
                    .map(|item| item.trim())
                    .filter(|item| !item.is_empty())
                    .map(|item| Value::String(item.to_string()))
                    .collect();
                *value = Value::Array(items);
            }
        }
    }
}

fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
            } else {
                Value::Null
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => Value::Array(seq.into_iter().map(yaml_to_json).collect()),
        serde_yaml::Value::Mapping(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                if let serde_yaml::Value::String(key) = k {
                    out.insert(key, yaml_to_json(v));
                }
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}
