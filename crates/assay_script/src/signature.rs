//! Entry Point Signatures
//!
//! Reads the formal parameter list out of a function's source text, as
//! returned by `Function.prototype.toString`. Supported forms:
//!
//! ```text
//! function run(data_path, threshold /*: float */ = 0.45, progress_callback) { ... }
//! (data_path, iterations = 10) => { ... }
//! data_path => { ... }
//! run(data_path, label = "mask") { ... }
//! ```
//!
//! A `/*: type */` comment next to a parameter declares its type. Defaults
//! must be literals (number, string, boolean, `null`/`undefined`).

use assay_types::{DeclaredType, FormalParameter, Signature, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignatureError {
    #[error("Entry point source has no parameter list")]
    NoParameterList,

    #[error("Unterminated parameter list")]
    Unterminated,

    #[error("Async and generator entry points are not supported")]
    Unsupported,

    #[error("Parameter #{0}: destructuring patterns are not supported")]
    Destructuring(usize),

    #[error("Parameter #{0}: rest parameters are not supported")]
    Rest(usize),

    #[error("Parameter #{index}: `{text}` is not an identifier")]
    InvalidName { index: usize, text: String },

    #[error("Parameter {name}: default must be a literal, found `{found}`")]
    NonLiteralDefault { name: String, found: String },
}

/// Parse the parameter list of a function's source text
pub fn parse_signature(source: &str) -> Result<Signature, SignatureError> {
    let text = source.trim_start();
    if keyword(text, "async").is_some() {
        return Err(SignatureError::Unsupported);
    }

    let mut signature = Signature::new();
    for (index, segment) in split_parameters(parameter_source(text)?)
        .into_iter()
        .enumerate()
    {
        signature = signature.param(parse_parameter(index, &segment)?);
    }
    Ok(signature)
}

/// Slice holding the raw parameter list, without the parentheses
fn parameter_source(text: &str) -> Result<&str, SignatureError> {
    let open = if let Some(rest) = keyword(text, "function") {
        if rest.trim_start().starts_with('*') {
            return Err(SignatureError::Unsupported);
        }
        text.find('(').ok_or(SignatureError::NoParameterList)?
    } else if text.starts_with('(') {
        0
    } else {
        // `ident => ...` or method shorthand `ident(...) { ... }`
        let ident_len = text
            .char_indices()
            .find(|(_, c)| !is_ident_char(*c))
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        if ident_len == 0 {
            return Err(SignatureError::NoParameterList);
        }
        let after = text[ident_len..].trim_start();
        if after.starts_with("=>") {
            return Ok(&text[..ident_len]);
        }
        if !after.starts_with('(') {
            return Err(SignatureError::NoParameterList);
        }
        text.len() - after.len()
    };

    let close = matching_paren(text, open)?;
    Ok(&text[open + 1..close])
}

/// `text` with a leading keyword removed, if it starts with one
fn keyword<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(word)?;
    match rest.chars().next() {
        Some(c) if is_ident_char(c) => None,
        _ => Some(rest),
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

// ─────────────────────────────────────────────────────────────────────────────
// Scanning
// ─────────────────────────────────────────────────────────────────────────────

/// If a string literal or comment starts at `i`, the index just past it.
///
/// Works on bytes: every delimiter is ASCII and UTF-8 continuation bytes
/// never collide with ASCII.
fn skip_opaque(bytes: &[u8], i: usize) -> Option<usize> {
    match bytes[i] {
        quote @ (b'\'' | b'"' | b'`') => {
            let mut j = i + 1;
            while j < bytes.len() {
                match bytes[j] {
                    b'\\' => j += 2,
                    b if b == quote => return Some(j + 1),
                    _ => j += 1,
                }
            }
            Some(bytes.len())
        }
        b'/' if bytes.get(i + 1) == Some(&b'/') => {
            let end = bytes[i..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| i + p + 1)
                .unwrap_or(bytes.len());
            Some(end)
        }
        b'/' if bytes.get(i + 1) == Some(&b'*') => {
            let end = bytes[i + 2..]
                .windows(2)
                .position(|w| w == b"*/")
                .map(|p| i + 2 + p + 2)
                .unwrap_or(bytes.len());
            Some(end)
        }
        _ => None,
    }
}

fn matching_paren(text: &str, open: usize) -> Result<usize, SignatureError> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        if let Some(next) = skip_opaque(bytes, i) {
            i = next;
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(SignatureError::Unterminated)
}

/// Split on top-level commas. A trailing empty segment is dropped.
fn split_parameters(list: &str) -> Vec<String> {
    let bytes = list.as_bytes();
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(next) = skip_opaque(bytes, i) {
            i = next;
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                segments.push(list[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    segments.push(list[start..].to_string());

    if segments
        .last()
        .is_some_and(|last| strip_comments(last).0.trim().is_empty())
    {
        segments.pop();
    }
    segments
}

/// Remove comments from a segment, collecting `/*: type */` annotations
fn strip_comments(segment: &str) -> (String, Vec<String>) {
    let bytes = segment.as_bytes();
    let mut clean = String::with_capacity(segment.len());
    let mut annotations = Vec::new();
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        let Some(next) = skip_opaque(bytes, i) else {
            i += 1;
            continue;
        };
        if bytes[i] == b'/' {
            clean.push_str(&segment[copied..i]);
            clean.push(' ');
            copied = next;
            let body = &segment[i + 2..next.max(i + 2)];
            let body = body.strip_suffix("*/").unwrap_or(body);
            if bytes[i + 1] == b'*' {
                if let Some(annotation) = body.trim().strip_prefix(':') {
                    annotations.push(annotation.trim().to_string());
                }
            }
        }
        i = next;
    }
    clean.push_str(&segment[copied..]);
    (clean, annotations)
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameters
// ─────────────────────────────────────────────────────────────────────────────

fn parse_parameter(index: usize, segment: &str) -> Result<FormalParameter, SignatureError> {
    let (clean, annotations) = strip_comments(segment);
    let clean = clean.trim();

    if clean.starts_with("...") {
        return Err(SignatureError::Rest(index));
    }
    if clean.starts_with('{') || clean.starts_with('[') {
        return Err(SignatureError::Destructuring(index));
    }

    let (name, default) = match clean.split_once('=') {
        Some((name, default)) => (name.trim(), Some(default.trim())),
        None => (clean, None),
    };

    let mut chars = name.chars();
    let valid = chars.next().is_some_and(is_ident_start) && chars.all(is_ident_char);
    if !valid {
        return Err(SignatureError::InvalidName {
            index,
            text: name.to_string(),
        });
    }

    let mut param = FormalParameter::new(name);
    if let Some(annotation) = annotations.first() {
        param = param.typed(declared_type(annotation));
    }
    if let Some(raw) = default {
        match parse_literal(raw) {
            Some(Literal::Value(value)) => param = param.with_default(value),
            Some(Literal::Absent) => {}
            None => {
                return Err(SignatureError::NonLiteralDefault {
                    name: name.to_string(),
                    found: raw.to_string(),
                });
            }
        }
    }
    Ok(param)
}

fn declared_type(annotation: &str) -> DeclaredType {
    match annotation.to_ascii_lowercase().as_str() {
        "int" | "integer" => DeclaredType::Integer,
        "float" | "number" | "double" => DeclaredType::Float,
        "bool" | "boolean" => DeclaredType::Boolean,
        "str" | "string" | "text" => DeclaredType::Text,
        _ => DeclaredType::Other(annotation.to_string()),
    }
}

enum Literal {
    Value(Value),
    /// `null` or `undefined`: behaves as no default
    Absent,
}

fn parse_literal(raw: &str) -> Option<Literal> {
    match raw {
        "true" => return Some(Literal::Value(Value::Boolean(true))),
        "false" => return Some(Literal::Value(Value::Boolean(false))),
        "null" | "undefined" => return Some(Literal::Absent),
        _ => {}
    }
    if let Some(text) = parse_string(raw) {
        return Some(Literal::Value(Value::Text(text)));
    }
    parse_number(raw).map(Literal::Value)
}

fn parse_string(raw: &str) -> Option<String> {
    let mut chars = raw.chars();
    let quote = chars.next().filter(|c| matches!(c, '\'' | '"' | '`'))?;

    let mut out = String::new();
    let mut closed = false;
    while let Some(c) = chars.next() {
        if closed {
            // text after the closing quote
            return None;
        }
        match c {
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                'x' => {
                    let hex: String = chars.by_ref().take(2).collect();
                    out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
                }
                'u' => {
                    let rest = chars.as_str();
                    let (hex, consumed) = match rest.strip_prefix('{') {
                        Some(braced) => {
                            let end = braced.find('}')?;
                            (&braced[..end], end + 2)
                        }
                        None => (rest.get(..4)?, 4),
                    };
                    out.push(char::from_u32(u32::from_str_radix(hex, 16).ok()?)?);
                    chars = rest[consumed..].chars();
                }
                '\n' => {}
                other => out.push(other),
            },
            '$' if quote == '`' && chars.as_str().starts_with('{') => return None,
            c if c == quote => closed = true,
            c => out.push(c),
        }
    }
    closed.then_some(out)
}

fn parse_number(raw: &str) -> Option<Value> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, raw.strip_prefix('+').unwrap_or(raw).trim_start()),
    };
    let digits = digits.replace('_', "");
    if digits.is_empty() {
        return None;
    }

    for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        let lower = digits.to_ascii_lowercase();
        if let Some(body) = lower.strip_prefix(prefix) {
            let value = i64::from_str_radix(body, radix).ok()?;
            return Some(Value::Integer(if negative { -value } else { value }));
        }
    }

    if !digits
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }

    let is_float = digits.contains(['.', 'e', 'E']);
    if !is_float {
        if let Ok(value) = digits.parse::<i64>() {
            return Some(Value::Integer(if negative { -value } else { value }));
        }
    }
    let value: f64 = digits.parse().ok()?;
    value
        .is_finite()
        .then(|| Value::Float(if negative { -value } else { value }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn names(signature: &Signature) -> Vec<&str> {
        signature.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_function_declaration() {
        let signature = parse_signature(
            "function run(data_path, threshold /*: float */ = 0.45, iterations = 10, use_gpu = false, progress_callback) {\n  return 1;\n}",
        )
        .unwrap();

        assert_eq!(
            names(&signature),
            vec!["data_path", "threshold", "iterations", "use_gpu", "progress_callback"]
        );
        let threshold = &signature.parameters[1];
        assert_eq!(threshold.declared, Some(DeclaredType::Float));
        assert_eq!(threshold.default, Some(Value::Float(0.45)));
        assert_eq!(signature.parameters[2].default, Some(Value::Integer(10)));
        assert_eq!(signature.parameters[3].default, Some(Value::Boolean(false)));
        assert_eq!(signature.parameters[4].default, None);
    }

    #[test]
    fn test_arrow_and_method_forms() {
        let arrow = parse_signature("(a, b = -2) => a + b").unwrap();
        assert_eq!(names(&arrow), vec!["a", "b"]);
        assert_eq!(arrow.parameters[1].default, Some(Value::Integer(-2)));

        let bare = parse_signature("data_path => data_path").unwrap();
        assert_eq!(names(&bare), vec!["data_path"]);

        let method = parse_signature("run(count /*: int */) { return count; }").unwrap();
        assert_eq!(method.parameters[0].declared, Some(DeclaredType::Integer));

        let empty = parse_signature("function run() {}").unwrap();
        assert!(empty.parameters.is_empty());
    }

    #[test]
    fn test_string_defaults_with_delimiters() {
        let signature = parse_signature(
            r#"function run(sep = ",", label = 'a (b)', path = "CSVs/out.csv", /* trailing */) {}"#,
        )
        .unwrap();
        assert_eq!(names(&signature), vec!["sep", "label", "path"]);
        assert_eq!(signature.parameters[0].default, Some(Value::Text(",".into())));
        assert_eq!(signature.parameters[1].default, Some(Value::Text("a (b)".into())));
    }

    #[test]
    fn test_string_escapes() {
        let signature =
            parse_signature(r#"function run(a = "tab\there", b = 'A\x42', c = `plain`) {}"#)
                .unwrap();
        assert_eq!(signature.parameters[0].default, Some(Value::Text("tab\there".into())));
        assert_eq!(signature.parameters[1].default, Some(Value::Text("AB".into())));
        assert_eq!(signature.parameters[2].default, Some(Value::Text("plain".into())));
    }

    #[test]
    fn test_annotations() {
        let signature = parse_signature(
            "function run(a /*: string */, b = 1 /*: float */, c /*:Mode*/, d // note\n) {}",
        )
        .unwrap();
        assert_eq!(signature.parameters[0].declared, Some(DeclaredType::Text));
        assert_eq!(signature.parameters[1].declared, Some(DeclaredType::Float));
        assert_eq!(signature.parameters[2].declared, Some(DeclaredType::Other("Mode".into())));
        assert_eq!(signature.parameters[3].declared, None);
    }

    #[test]
    fn test_numbers() {
        let signature =
            parse_signature("function run(a = 0x1F, b = 1_000, c = 2.5e3, d = 10.0, e = null) {}")
                .unwrap();
        assert_eq!(signature.parameters[0].default, Some(Value::Integer(31)));
        assert_eq!(signature.parameters[1].default, Some(Value::Integer(1000)));
        assert_eq!(signature.parameters[2].default, Some(Value::Float(2500.0)));
        assert_eq!(signature.parameters[3].default, Some(Value::Float(10.0)));
        assert_eq!(signature.parameters[4].default, None);
    }

    #[test]
    fn test_rejected_forms() {
        assert_eq!(
            parse_signature("function run({ a, b }) {}"),
            Err(SignatureError::Destructuring(0))
        );
        assert_eq!(
            parse_signature("function run(a, ...rest) {}"),
            Err(SignatureError::Rest(1))
        );
        assert_eq!(
            parse_signature("async function run(a) {}"),
            Err(SignatureError::Unsupported)
        );
        assert_eq!(
            parse_signature("function* run(a) {}"),
            Err(SignatureError::Unsupported)
        );
        assert!(matches!(
            parse_signature("function run(a = Math.PI) {}"),
            Err(SignatureError::NonLiteralDefault { name, .. }) if name == "a"
        ));
        assert!(matches!(
            parse_signature("function run(a = `${x}`) {}"),
            Err(SignatureError::NonLiteralDefault { .. })
        ));
        assert_eq!(
            parse_signature("function run(a, b"),
            Err(SignatureError::Unterminated)
        );
        assert_eq!(
            parse_signature("class Foo {}"),
            Err(SignatureError::NoParameterList)
        );
    }
}
