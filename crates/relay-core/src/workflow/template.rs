//! Template Engine: `{{ }}` / `{% if %}` parameter expansion.
//!
//! Built on `minijinja` rather than a hand-rolled scanner so the filter
//! pipeline (`default`, `replace`, `join`, ...) and `{% if %}...{% else %}`
//! blocks come from a real implementation instead of being reinvented here.
//! The pure logic for each required filter and for the `fromjson` loose
//! parser lives in plain functions so it can be unit-tested without going
//! through the Jinja environment.

use minijinja::value::Value as JinjaValue;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template syntax error: {0}")]
    Syntax(String),
    #[error("template evaluation error: {0}")]
    Eval(String),
    #[error("fromjson: could not parse input as JSON")]
    FromJsonFailed,
}

/// Expands parameter trees against a run context.
///
/// Stateless aside from the compiled `Environment`; safe to share across
/// concurrent runs (it never observes or mutates external state).
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        // Undefined names stringify to "" instead of erroring; the
        // single-expression path below special-cases true Undefined
        // before stringification ever happens.
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        register_filters(&mut env);
        Self { env }
    }

    /// Recursively expand a parameter tree: mappings and sequences recurse,
    /// strings expand, everything else passes through unchanged.
    pub fn render_value(&self, value: &Value, context: &Value) -> Result<Value, TemplateError> {
        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.render_value(v, context)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.render_value(item, context)?);
                }
                Ok(Value::Array(out))
            }
            Value::String(s) => self.render_string(s, context),
            other => Ok(other.clone()),
        }
    }

    /// Expand a single string. See `single_expression_source` for the
    /// typed-pass-through rule.
    fn render_string(&self, s: &str, context: &Value) -> Result<Value, TemplateError> {
        let ctx = JinjaValue::from_serialize(context);

        if let Some(expr_src) = single_expression_source(s) {
            let expr = self
                .env
                .compile_expression(expr_src)
                .map_err(|e| TemplateError::Syntax(e.to_string()))?;
            let result = expr
                .eval(ctx)
                .map_err(|e| TemplateError::Eval(e.to_string()))?;
            if result.is_undefined() {
                return Ok(Value::String("missing".to_string()));
            }
            let json = serde_json::to_value(&result)
                .map_err(|e| TemplateError::Eval(format!("could not convert result: {e}")))?;
            return Ok(json);
        }

        if !s.contains("{{") && !s.contains("{%") {
            return Ok(Value::String(s.to_string()));
        }

        let rendered = self
            .env
            .render_str(s, ctx)
            .map_err(|e| TemplateError::Eval(e.to_string()))?;
        Ok(Value::String(rendered))
    }
}

/// If `s` is exactly `{{ expr }}` with no leading/trailing text and no
/// block directives anywhere, returns the trimmed expression source.
fn single_expression_source(s: &str) -> Option<&str> {
    if !s.starts_with("{{") || !s.ends_with("}}") || s.len() < 4 {
        return None;
    }
    if s.contains("{%") || s.contains("%}") {
        return None;
    }
    let inner = &s[2..s.len() - 2];
    if inner.contains("{{") || inner.contains("}}") {
        // More than one interpolation, or an unbalanced fragment: treat
        // the whole string as the general (stringifying) case instead.
        return None;
    }
    Some(inner.trim())
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

fn register_filters(env: &mut Environment<'static>) {
    env.add_filter("default", |value: JinjaValue, fallback: JinjaValue| {
        if value.is_undefined() || value.is_none() {
            fallback
        } else if let Some(s) = value.as_str() {
            if s.is_empty() {
                fallback
            } else {
                value
            }
        } else {
            value
        }
    });

    env.add_filter("lower", |value: String| value.to_lowercase());
    env.add_filter("upper", |value: String| value.to_uppercase());
    env.add_filter("title", |value: String| title_case(&value));
    env.add_filter("trim", |value: String| value.trim().to_string());
    env.add_filter("replace", |value: String, a: String, b: String| {
        value.replace(&a, &b)
    });

    env.add_filter("length", |value: JinjaValue| -> Result<usize, minijinja::Error> {
        value.len().ok_or_else(|| {
            minijinja::Error::new(
                minijinja::ErrorKind::InvalidOperation,
                "value has no length",
            )
        })
    });
    env.add_filter("first", |value: JinjaValue| -> Option<JinjaValue> {
        value.try_iter().ok()?.next()
    });
    env.add_filter("last", |value: JinjaValue| -> Option<JinjaValue> {
        value.try_iter().ok()?.last()
    });
    env.add_filter("join", |value: JinjaValue, sep: Option<String>| -> String {
        let sep = sep.unwrap_or_default();
        match value.try_iter() {
            Ok(iter) => iter.map(|v| v.to_string()).collect::<Vec<_>>().join(&sep),
            Err(_) => value.to_string(),
        }
    });

    env.add_filter("int", |value: JinjaValue| -> Result<i64, minijinja::Error> {
        coerce_int(&value).ok_or_else(|| {
            minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, "not an int")
        })
    });
    env.add_filter("float", |value: JinjaValue| -> Result<f64, minijinja::Error> {
        coerce_float(&value).ok_or_else(|| {
            minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, "not a float")
        })
    });
    env.add_filter("string", |value: JinjaValue| -> String { value.to_string() });
    env.add_filter("round", |value: f64, precision: Option<i32>| -> f64 {
        let p = precision.unwrap_or(0);
        let factor = 10f64.powi(p);
        (value * factor).round() / factor
    });
    env.add_filter("abs", |value: f64| -> f64 { value.abs() });

    env.add_filter(
        "tojson_utf8",
        |value: JinjaValue, indent: Option<usize>| -> Result<String, minijinja::Error> {
            let json: Value = serde_json::to_value(&value).map_err(|e| {
                minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
            })?;
            Ok(tojson_utf8(&json, indent))
        },
    );
    env.add_filter(
        "fromjson",
        |value: String| -> Result<JinjaValue, minijinja::Error> {
            let parsed = fromjson_loose(&value).map_err(|e| {
                minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
            })?;
            Ok(JinjaValue::from_serialize(&parsed))
        },
    );
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

fn coerce_int(value: &JinjaValue) -> Option<i64> {
    if let Some(s) = value.as_str() {
        return s.trim().parse::<f64>().ok().map(|f| f as i64);
    }
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
}

fn coerce_float(value: &JinjaValue) -> Option<f64> {
    if let Some(s) = value.as_str() {
        return s.trim().parse::<f64>().ok();
    }
    value.as_f64().or_else(|| value.as_i64().map(|i| i as f64))
}

/// Serialize `value` as JSON with non-ASCII characters left verbatim
/// (`serde_json` never emits `\uXXXX` for them, unlike many other JSON
/// encoders' default mode).
pub fn tojson_utf8(value: &Value, indent: Option<usize>) -> String {
    match indent {
        Some(n) => {
            let indent_str = " ".repeat(n);
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent_str.as_bytes());
            let mut buf = Vec::new();
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
            value.serialize(&mut ser).expect("Value always serializes");
            String::from_utf8(buf).expect("serde_json output is valid UTF-8")
        }
        None => serde_json::to_string(value).expect("Value always serializes"),
    }
}

// ---------------------------------------------------------------------------
// fromjson: loose parser with four fallback tiers
// ---------------------------------------------------------------------------

/// Parses `input` into a JSON value, tolerating the shapes LLM output tends
/// to wrap payloads in:
/// 1. well-formed JSON as-is;
/// 2. a fenced code block (` ```json ... ``` ` or ` ``` ... ``` `);
/// 3. the first balanced `{...}`/`[...]` substring;
/// 4. a single-quoted, language-literal form restricted to
///    scalars/lists/maps-with-string-keys.
pub fn fromjson_loose(input: &str) -> Result<Value, TemplateError> {
    if let Ok(v) = serde_json::from_str(input) {
        return Ok(v);
    }
    if let Some(inner) = extract_fenced_block(input) {
        if let Ok(v) = serde_json::from_str(inner.trim()) {
            return Ok(v);
        }
    }
    if let Some(substring) = first_balanced_bracket_substring(input) {
        if let Ok(v) = serde_json::from_str(&substring) {
            return Ok(v);
        }
    }
    if let Some(v) = parse_single_quoted_literal(input) {
        return Ok(v);
    }
    Err(TemplateError::FromJsonFailed)
}

fn extract_fenced_block(input: &str) -> Option<&str> {
    let start_marker = input.find("```")?;
    let after_open = start_marker + 3;
    let rest = &input[after_open..];
    // Skip an optional language tag (e.g. "json") up to the first newline.
    let content_start = match rest.find('\n') {
        Some(nl) if rest[..nl].chars().all(|c| c.is_ascii_alphanumeric()) => nl + 1,
        _ => 0,
    };
    let content = &rest[content_start..];
    let end = content.find("```")?;
    Some(&content[..end])
}

/// Scans for the first balanced `{...}` or `[...]` span, tracking string
/// literals (double-quoted, with backslash escapes) so braces inside
/// strings don't confuse the bracket count.
fn first_balanced_bracket_substring(input: &str) -> Option<String> {
    let bytes: Vec<char> = input.chars().collect();
    let start = bytes.iter().position(|&c| c == '{' || c == '[')?;
    let open = bytes[start];
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(bytes[start..=i].iter().collect());
                }
            }
            _ => {}
        }
    }
    None
}

/// Tier (d): a Python/JS-style literal using single-quoted strings and
/// possibly `True`/`False`/`None`. Rewrites into JSON syntax and re-parses;
/// rejects anything beyond the literal subset by construction (the result
/// only ever contains what `serde_json` accepts: strings, numbers, bools,
/// null, arrays, and string-keyed objects).
fn parse_single_quoted_literal(input: &str) -> Option<Value> {
    let span = first_balanced_single_quote_substring(input)?;
    let rewritten = rewrite_single_quoted_to_json(&span)?;
    serde_json::from_str(&rewritten).ok()
}

fn first_balanced_single_quote_substring(input: &str) -> Option<String> {
    let bytes: Vec<char> = input.chars().collect();
    let start = bytes.iter().position(|&c| c == '{' || c == '[')?;
    let open = bytes[start];
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '\'' {
                in_string = false;
            }
            continue;
        }
        match c {
            '\'' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(bytes[start..=i].iter().collect());
                }
            }
            _ => {}
        }
    }
    None
}

fn rewrite_single_quoted_to_json(span: &str) -> Option<String> {
    let mut out = String::with_capacity(span.len());
    let mut chars = span.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\'' => {
                    in_string = false;
                    out.push('"');
                }
                '"' => out.push_str("\\\""),
                '\\' => {
                    if let Some(&next) = chars.peek() {
                        out.push('\\');
                        out.push(next);
                        chars.next();
                    } else {
                        out.push('\\');
                    }
                }
                other => out.push(other),
            }
            continue;
        }

        match c {
            '\'' => {
                in_string = true;
                out.push('"');
            }
            _ => out.push(c),
        }
    }

    let literal_fixed = out
        .replace("True", "true")
        .replace("False", "false")
        .replace("None", "null");
    Some(literal_fixed)
}
