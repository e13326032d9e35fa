//! Structured-output support: schemas for typed model answers and tolerant
//! extraction of the JSON object a model actually returned.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::llm_client::LanguageModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    TextList,
}

#[derive(Debug)]
pub struct SchemaField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

/// Declared shape of a structured answer.
#[derive(Debug)]
pub struct OutputSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub fields: &'static [SchemaField],
}

impl OutputSchema {
    /// JSON Schema (object, all fields required, no extras).
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in self.fields {
            let property = match field.kind {
                FieldKind::Text => json!({
                    "type": "string",
                    "description": field.description,
                }),
                FieldKind::TextList => json!({
                    "type": "array",
                    "items": { "type": "string" },
                    "description": field.description,
                }),
            };
            properties.insert(field.name.to_string(), property);
        }

        json!({
            "title": self.name,
            "description": self.description,
            "type": "object",
            "properties": properties,
            "required": self.field_names(),
            "additionalProperties": false,
        })
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// System instruction that pins a free-form chat model to this schema.
    pub fn instruction(&self) -> String {
        let schema = serde_json::to_string_pretty(&self.to_json_schema())
            .unwrap_or_else(|_| self.to_json_schema().to_string());
        format!(
            "You produce structured data. Respond with ONLY a single JSON object that \
             conforms to this JSON Schema ({}). Include every required field. Lists are \
             JSON arrays of strings. No prose, no markdown.\n\n{}",
            self.name, schema
        )
    }
}

/// A type a model can be asked to produce directly.
pub trait StructuredOutput: DeserializeOwned {
    fn schema() -> &'static OutputSchema;
}

/// Ask `model` for a `T`. `Ok(None)` when the model answered but nothing usable
/// came back (no JSON object, or one that does not fit `T`); `Err` only for
/// provider failures.
pub async fn generate_typed<T: StructuredOutput>(
    model: &dyn LanguageModel,
    prompt: &str,
) -> Result<Option<T>> {
    let schema = T::schema();
    let Some(value) = model.generate_structured(prompt, schema).await? else {
        return Ok(None);
    };

    match serde_json::from_value::<T>(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(error) => {
            tracing::warn!(
                "Structured output did not match schema '{}': {}",
                schema.name,
                error
            );
            Ok(None)
        }
    }
}

/// Pull the JSON object out of a raw model answer, or `None`.
pub fn parse_object(raw: &str) -> Option<Map<String, Value>> {
    let candidate = extract_json(raw)?;
    match serde_json::from_str::<Value>(&candidate) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            tracing::warn!("Structured output was valid JSON but not an object");
            None
        }
        Err(_) => None,
    }
}

/// Find the JSON payload in a model answer, tolerating reasoning tags, markdown
/// fences, surrounding prose and common syntax slips.
pub fn extract_json(raw: &str) -> Option<String> {
    let text = strip_reasoning_tags(raw.trim());

    if let Some(block) = fenced_block(&text) {
        if is_json(&block) {
            return Some(block);
        }
        let repaired = repair_json(&block);
        if is_json(&repaired) {
            return Some(repaired);
        }
    }

    if is_json(&text) {
        return Some(text);
    }

    for open in ['{', '['] {
        if let Some(span) = balanced_span(&text, open) {
            if is_json(&span) {
                return Some(span);
            }
            let repaired = repair_json(&span);
            if is_json(&repaired) {
                return Some(repaired);
            }
        }
    }

    let repaired = repair_json(&text);
    if is_json(&repaired) {
        return Some(repaired);
    }

    if !text.contains('{') && !text.contains('[') {
        tracing::warn!("Model answer contains no JSON at all; it may have been truncated");
    } else {
        tracing::warn!("Could not extract valid JSON from model answer");
    }
    None
}

fn is_json(text: &str) -> bool {
    serde_json::from_str::<Value>(text).is_ok()
}

/// Remove `<think>`/`<thinking>` sections. An unclosed tag is dropped on its own.
fn strip_reasoning_tags(text: &str) -> String {
    let mut result = text.to_string();
    for (open, close) in [("<thinking>", "</thinking>"), ("<think>", "</think>")] {
        while let Some(start) = result.find(open) {
            let end = match result[start..].find(close) {
                Some(offset) => start + offset + close.len(),
                None => start + open.len(),
            };
            result.replace_range(start..end, "");
        }
    }
    result.trim().to_string()
}

/// Contents of the first ```json (or bare ```) fence.
fn fenced_block(text: &str) -> Option<String> {
    let (start, marker_len) = match text.find("```json") {
        Some(idx) => (idx, "```json".len()),
        None => (text.find("```")?, "```".len()),
    };
    let body = &text[start + marker_len..];
    let end = body.find("```")?;
    let block = body[..end].trim();
    (block.starts_with('{') || block.starts_with('[')).then(|| block.to_string())
}

/// First balanced `{...}` or `[...]` span, skipping delimiters inside strings.
fn balanced_span(text: &str, open: char) -> Option<String> {
    let close = if open == '{' { '}' } else { ']' };
    let start = text.find(open)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(text[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Fix what models commonly get wrong: comments, trailing commas, curly quotes.
fn repair_json(text: &str) -> String {
    let without_prefix = text
        .trim()
        .trim_start_matches("json")
        .trim_start_matches("JSON")
        .trim();
    let normalized_quotes = without_prefix
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    drop_trailing_commas(&strip_comments(&normalized_quotes))
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (ch, chars.peek().copied()) {
            ('"', _) => {
                in_string = true;
                out.push(ch);
            }
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

fn drop_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &ch) in chars.iter().enumerate() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(ch);
            continue;
        }
        if ch == '"' {
            in_string = true;
        }
        if ch == ',' {
            let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}
