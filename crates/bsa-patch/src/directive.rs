//! Directive patch format (v1)
//!
//! A line-oriented grammar, one directive per line:
//!
//! ```text
//! set <key> = <json>                # unconditional upsert
//! set <key> = <json> if <cond>     # guarded upsert
//! unset <key> [if <cond>]          # remove; the key must be present
//! merge <key> = <json-object>      # shallow merge into an object value
//! expect <cond>                    # pure precondition
//! ```
//!
//! where `<cond>` is `<key> == <json>`, `<key> present`, or `<key> absent`.
//! Values are JSON. Blank lines are ignored.
//!
//! All preconditions are evaluated against the base document before any
//! directive is applied.

use serde_json::Value;

use bsa_core::{BsaError, BsaResult, StateData};

use crate::PatchFormat;

/// Stable name of this encoding
pub const DIRECTIVE_FORMAT_V1: &str = "directive/v1";

/// A precondition on the base document
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Equals { key: String, value: Value },
    Present { key: String },
    Absent { key: String },
}

impl Condition {
    /// The key this condition constrains
    pub fn key(&self) -> &str {
        match self {
            Condition::Equals { key, .. } => key,
            Condition::Present { key } => key,
            Condition::Absent { key } => key,
        }
    }

    /// Evaluate against a document
    pub fn holds(&self, data: &StateData) -> bool {
        match self {
            Condition::Equals { key, value } => data.get(key) == Some(value),
            Condition::Present { key } => data.contains_key(key),
            Condition::Absent { key } => !data.contains_key(key),
        }
    }
}

/// A single parsed directive
#[derive(Clone, Debug, PartialEq)]
pub enum Directive {
    Set {
        key: String,
        value: Value,
        guard: Option<Condition>,
    },
    Unset {
        key: String,
        guard: Option<Condition>,
    },
    Merge {
        key: String,
        value: serde_json::Map<String, Value>,
    },
    Expect(Condition),
}

impl Directive {
    /// The path of the first precondition that does not hold, if any
    fn failed_precondition(&self, base: &StateData) -> Option<String> {
        match self {
            Directive::Set { guard, .. } => match guard {
                Some(cond) if !cond.holds(base) => Some(cond.key().to_string()),
                _ => None,
            },
            Directive::Unset { key, guard } => {
                if let Some(cond) = guard {
                    if !cond.holds(base) {
                        return Some(cond.key().to_string());
                    }
                }
                if !base.contains_key(key) {
                    return Some(key.clone());
                }
                None
            }
            Directive::Merge { key, .. } => match base.get(key) {
                Some(Value::Object(_)) | None => None,
                Some(_) => Some(key.clone()),
            },
            Directive::Expect(cond) => {
                if cond.holds(base) {
                    None
                } else {
                    Some(cond.key().to_string())
                }
            }
        }
    }

    /// Apply this directive; preconditions are assumed to hold
    fn apply_to(&self, data: &mut StateData) {
        match self {
            Directive::Set { key, value, .. } => {
                data.insert(key.clone(), value.clone());
            }
            Directive::Unset { key, .. } => {
                data.remove(key);
            }
            Directive::Merge { key, value } => match data.get_mut(key) {
                Some(Value::Object(existing)) => {
                    for (k, v) in value {
                        existing.insert(k.clone(), v.clone());
                    }
                }
                _ => {
                    data.insert(key.clone(), Value::Object(value.clone()));
                }
            },
            Directive::Expect(_) => {}
        }
    }
}

/// Parse a full patch into directives
pub fn parse(patch: &str) -> BsaResult<Vec<Directive>> {
    let mut directives = Vec::new();

    for (idx, line) in patch.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let directive = parse_line(line).map_err(|reason| BsaError::MalformedPatch {
            line: idx + 1,
            reason,
        })?;
        directives.push(directive);
    }

    if directives.is_empty() {
        return Err(BsaError::MalformedPatch {
            line: 1,
            reason: "empty patch".to_string(),
        });
    }

    Ok(directives)
}

fn parse_line(line: &str) -> Result<Directive, String> {
    let (word, rest) = split_word(line);
    match word {
        "set" => parse_set(rest),
        "unset" => parse_unset(rest),
        "merge" => parse_merge(rest),
        "expect" => parse_condition(rest).map(Directive::Expect),
        other => Err(format!("unknown directive: {}", other)),
    }
}

fn parse_set(rest: &str) -> Result<Directive, String> {
    let (key, rest) = split_key(rest)?;
    let rest = expect_token(rest, "=")?;
    let (value, rest) = parse_json_prefix(rest)?;
    let guard = parse_optional_guard(rest)?;
    Ok(Directive::Set { key, value, guard })
}

fn parse_unset(rest: &str) -> Result<Directive, String> {
    let (key, rest) = split_key(rest)?;
    let guard = parse_optional_guard(rest)?;
    Ok(Directive::Unset { key, guard })
}

fn parse_merge(rest: &str) -> Result<Directive, String> {
    let (key, rest) = split_key(rest)?;
    let rest = expect_token(rest, "=")?;
    let (value, rest) = parse_json_prefix(rest)?;
    if !rest.trim().is_empty() {
        return Err(format!("trailing input after value: {}", rest.trim()));
    }
    match value {
        Value::Object(map) => Ok(Directive::Merge { key, value: map }),
        _ => Err("merge value must be a JSON object".to_string()),
    }
}

fn parse_condition(input: &str) -> Result<Condition, String> {
    let (key, rest) = split_key(input)?;
    let rest = rest.trim_start();

    if let Some(rest) = rest.strip_prefix("==") {
        let (value, rest) = parse_json_prefix(rest)?;
        if !rest.trim().is_empty() {
            return Err(format!("trailing input after condition: {}", rest.trim()));
        }
        return Ok(Condition::Equals { key, value });
    }

    match rest.trim() {
        "present" => Ok(Condition::Present { key }),
        "absent" => Ok(Condition::Absent { key }),
        other => Err(format!("expected '==', 'present', or 'absent', got: {}", other)),
    }
}

fn parse_optional_guard(rest: &str) -> Result<Option<Condition>, String> {
    let rest = rest.trim_start();
    if rest.is_empty() {
        return Ok(None);
    }
    let (word, cond) = split_word(rest);
    if word != "if" {
        return Err(format!("expected 'if' or end of line, got: {}", word));
    }
    parse_condition(cond).map(Some)
}

/// Split the leading whitespace-delimited word
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, ""),
    }
}

/// Split a key token: ends at whitespace or '='
fn split_key(s: &str) -> Result<(String, &str), String> {
    let s = s.trim_start();
    let end = s
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(s.len());
    if end == 0 {
        return Err("missing key".to_string());
    }
    Ok((s[..end].to_string(), &s[end..]))
}

fn expect_token<'a>(s: &'a str, token: &str) -> Result<&'a str, String> {
    let s = s.trim_start();
    s.strip_prefix(token)
        .ok_or_else(|| format!("expected '{}'", token))
}

/// Greedily parse one JSON value off the front of the input
fn parse_json_prefix(s: &str) -> Result<(Value, &str), String> {
    let trimmed = s.trim_start();
    let mut stream = serde_json::Deserializer::from_str(trimmed).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => {
            let offset = stream.byte_offset();
            Ok((value, &trimmed[offset..]))
        }
        Some(Err(e)) => Err(format!("invalid JSON value: {}", e)),
        None => Err("missing value".to_string()),
    }
}

/// The default patch encoding
pub struct DirectivePatch;

impl PatchFormat for DirectivePatch {
    fn name(&self) -> &'static str {
        DIRECTIVE_FORMAT_V1
    }

    fn check(&self, patch: &str) -> BsaResult<()> {
        parse(patch).map(|_| ())
    }

    fn apply(&self, base: &StateData, patch: &str) -> BsaResult<StateData> {
        let directives = parse(patch)?;

        // Phase 1: every precondition must hold against the base
        let mut offending: Vec<String> = Vec::new();
        for directive in &directives {
            if let Some(path) = directive.failed_precondition(base) {
                if !offending.contains(&path) {
                    offending.push(path);
                }
            }
        }
        if !offending.is_empty() {
            return Err(BsaError::PatchConflict { paths: offending });
        }

        // Phase 2: apply in order
        let mut next = base.clone();
        for directive in &directives {
            directive.apply_to(&mut next);
        }
        Ok(next)
    }
}
