//! Key/value config files.
//!
//! Parses the block-style YAML subset that sorter configs are written in
//! into a [`serde_json::Value`] tree: nested mappings by indentation,
//! block sequences, flow lists (`[a, b]`), plain and quoted scalars, and
//! `#` comments. Anchors, multi-document streams and block scalars are
//! not supported.

use std::fs;
use std::path::Path;

use serde_json::{Map, Number, Value};

use crate::util::{Error, Result};

#[derive(Clone, Debug)]
struct Line {
    number: usize,
    indent: usize,
    text: String,
}

/// Load a config file into a value tree.
pub fn load_config(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })?;
    let value = parse_config(&text)
        .map_err(|e| Error::invalid(format!("{}: {}", path.display(), e)))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(value)
}

/// Parse config text into a value tree. Empty input yields `Null`.
pub fn parse_config(text: &str) -> Result<Value> {
    let mut lines = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let stripped = strip_comment(raw);
        let trimmed = stripped.trim_end();
        if trimmed.trim().is_empty() || trimmed == "---" {
            continue;
        }
        if trimmed.starts_with('\t') {
            return Err(Error::invalid(format!("line {}: tabs are not allowed for indentation", i + 1)));
        }
        let indent = trimmed.len() - trimmed.trim_start().len();
        lines.push(Line { number: i + 1, indent, text: trimmed.trim_start().to_string() });
    }
    if lines.is_empty() {
        return Ok(Value::Null);
    }
    let mut pos = 0;
    let indent = lines[0].indent;
    let value = parse_block(&mut lines, &mut pos, indent)?;
    if let Some(line) = lines.get(pos) {
        return Err(Error::invalid(format!("line {}: unexpected indentation", line.number)));
    }
    Ok(value)
}

/// Drop a trailing `# comment` that is not inside quotes.
fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    let mut prev = ' ';
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '#') if prev.is_whitespace() => return &line[..i],
            _ => {}
        }
        prev = c;
    }
    line
}

fn is_sequence_item(text: &str) -> bool {
    text == "-" || text.starts_with("- ")
}

fn parse_block(lines: &mut [Line], pos: &mut usize, indent: usize) -> Result<Value> {
    if is_sequence_item(&lines[*pos].text) {
        parse_sequence(lines, pos, indent)
    } else {
        parse_mapping(lines, pos, indent)
    }
}

fn parse_sequence(lines: &mut [Line], pos: &mut usize, indent: usize) -> Result<Value> {
    let mut items = Vec::new();
    while *pos < lines.len() && lines[*pos].indent == indent && is_sequence_item(&lines[*pos].text) {
        let rest = lines[*pos].text[1..].trim_start().to_string();
        if rest.is_empty() {
            *pos += 1;
            match lines.get(*pos) {
                Some(next) if next.indent > indent => {
                    let child = next.indent;
                    items.push(parse_block(lines, pos, child)?);
                }
                _ => items.push(Value::Null),
            }
        } else if split_key(&rest).is_some() {
            // "- key: value" opens a mapping aligned after the dash.
            let child = indent + (lines[*pos].text.len() - rest.len());
            lines[*pos].indent = child;
            lines[*pos].text = rest;
            items.push(parse_mapping(lines, pos, child)?);
        } else {
            items.push(parse_scalar(&rest));
            *pos += 1;
        }
    }
    Ok(Value::Array(items))
}

fn parse_mapping(lines: &mut [Line], pos: &mut usize, indent: usize) -> Result<Value> {
    let mut map = Map::new();
    while *pos < lines.len() && lines[*pos].indent == indent {
        let line = &lines[*pos];
        if is_sequence_item(&line.text) {
            break;
        }
        let (key, rest) = split_key(&line.text)
            .ok_or_else(|| Error::invalid(format!("line {}: expected `key: value`", line.number)))?;
        let (key, rest) = (key.to_string(), rest.to_string());
        *pos += 1;
        let value = if !rest.is_empty() {
            parse_scalar(&rest)
        } else {
            match lines.get(*pos) {
                Some(next) if next.indent > indent => {
                    let child = next.indent;
                    parse_block(lines, pos, child)?
                }
                // A sequence may sit at its key's own indentation.
                Some(next) if next.indent == indent && is_sequence_item(&next.text) => {
                    parse_sequence(lines, pos, indent)?
                }
                _ => Value::Null,
            }
        };
        map.insert(unquote(&key), value);
    }
    Ok(Value::Object(map))
}

/// Split `key: value` at the first colon followed by a space or line end.
fn split_key(text: &str) -> Option<(&str, &str)> {
    let mut quote = None;
    let bytes = text.as_bytes();
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') if i == 0 => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ':') if i + 1 == bytes.len() || bytes[i + 1] == b' ' => {
                return Some((text[..i].trim(), text[i + 1..].trim()));
            }
            _ => {}
        }
    }
    None
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 {
        if let Some(inner) = s.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
            return inner.replace("\\\"", "\"").replace("\\n", "\n");
        }
        if let Some(inner) = s.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
            return inner.replace("''", "'");
        }
    }
    s.to_string()
}

fn parse_scalar(raw: &str) -> Value {
    let s = raw.trim();
    if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        return Value::Array(split_flow(inner).into_iter().map(|item| parse_scalar(&item)).collect());
    }
    if s.starts_with('"') || s.starts_with('\'') {
        return Value::String(unquote(s));
    }
    match s {
        "" | "~" | "null" | "Null" | "NULL" => return Value::Null,
        "true" | "True" | "TRUE" => return Value::Bool(true),
        "false" | "False" | "FALSE" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(v) = s.parse::<i64>() {
        return Value::from(v);
    }
    if let Ok(v) = s.parse::<f64>() {
        if let Some(n) = Number::from_f64(v) {
            return Value::Number(n);
        }
    }
    Value::String(s.to_string())
}

/// Split the inside of a flow list at top-level commas.
fn split_flow(inner: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote = None;
    for c in inner.chars() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                items.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() || !items.is_empty() {
        items.push(current);
    }
    items.into_iter().map(|s| s.trim().to_string()).collect()
}

/// Look up a value by dotted path, e.g. `recordings.sampling_rate`.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, key| node.get(key))
}

/// Look up a required number by dotted path.
pub fn require_f64(root: &Value, path: &str) -> Result<f64> {
    lookup(root, path)
        .and_then(|v| match v {
            Value::String(s) => s.trim().parse().ok(),
            other => other.as_f64(),
        })
        .ok_or_else(|| Error::MissingConfigKey(path.to_string()))
}

/// Save a value tree as block-style YAML.
pub fn save_config(path: impl AsRef<Path>, root: &Value) -> Result<()> {
    let mut out = String::new();
    match root {
        Value::Object(map) => emit_mapping(&mut out, map, 0),
        other => {
            out.push_str(&emit_scalar(other));
            out.push('\n');
        }
    }
    fs::write(path.as_ref(), out)?;
    tracing::debug!(path = %path.as_ref().display(), "saved config");
    Ok(())
}

fn emit_mapping(out: &mut String, map: &Map<String, Value>, indent: usize) {
    for (key, value) in map {
        out.push_str(&" ".repeat(indent));
        out.push_str(key);
        out.push(':');
        match value {
            Value::Object(child) if !child.is_empty() => {
                out.push('\n');
                emit_mapping(out, child, indent + 2);
            }
            other => {
                out.push(' ');
                out.push_str(&emit_scalar(other));
                out.push('\n');
            }
        }
    }
}

fn emit_scalar(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            let plain = matches!(parse_scalar(s), Value::String(ref p) if p == s)
                && !s.contains([':', '#', '\'', '"', ',', '[', ']']);
            if plain {
                s.clone()
            } else {
                format!("'{}'", s.replace('\'', "''"))
            }
        }
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(emit_scalar).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Object(map) => serde_json::to_string(map).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# sorter configuration
data:
  root_folder: data/   # trailing comment
  recordings: 'rec.bin'

resources:
  multi_processing: 1
  n_processors: 4

recordings:
  dtype: int16
  sampling_rate: 30000
  n_channels: 49
  spatial_radius: 70.5
  order: [0, 1, 'x']
neuralnet:
  detect:
    filename:
      - detect.pt
      - triage.pt
";

    #[test]
    fn test_nested_mappings() -> Result<()> {
        let cfg = parse_config(SAMPLE)?;
        assert_eq!(lookup(&cfg, "recordings.sampling_rate"), Some(&json!(30000)));
        assert_eq!(lookup(&cfg, "recordings.spatial_radius"), Some(&json!(70.5)));
        assert_eq!(lookup(&cfg, "data.root_folder"), Some(&json!("data/")));
        assert_eq!(lookup(&cfg, "data.recordings"), Some(&json!("rec.bin")));
        assert_eq!(lookup(&cfg, "recordings.order"), Some(&json!([0, 1, "x"])));
        assert_eq!(
            lookup(&cfg, "neuralnet.detect.filename"),
            Some(&json!(["detect.pt", "triage.pt"]))
        );
        assert_eq!(lookup(&cfg, "recordings.missing"), None);
        Ok(())
    }

    #[test]
    fn test_require_f64() -> Result<()> {
        let cfg = parse_config(SAMPLE)?;
        assert_eq!(require_f64(&cfg, "recordings.sampling_rate")?, 30000.0);
        let err = require_f64(&cfg, "recordings.rate").unwrap_err();
        assert!(matches!(err, Error::MissingConfigKey(ref k) if k == "recordings.rate"));
        Ok(())
    }

    #[test]
    fn test_sequence_of_mappings() -> Result<()> {
        let cfg = parse_config("units:\n- id: 1\n  name: a\n- id: 2\n  name: b\n")?;
        assert_eq!(cfg, json!({"units": [{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]}));
        Ok(())
    }

    #[test]
    fn test_bad_indentation() {
        assert!(parse_config("a:\n    b: 1\n  c: 2\n").is_err());
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.yaml");
        let value = json!({"recordings": {"sampling_rate": 20000.0, "dtype": "int16"}, "name": "a: b"});
        save_config(&path, &value)?;
        assert_eq!(load_config(&path)?, value);
        Ok(())
    }
}
