use crate::error::{Result, StackError};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

/// Key/value pairs handed to every compose invocation on top of the inherited environment.
pub type EnvMap = BTreeMap<String, String>;

/// Read an env file into a map without touching the process environment.
/// Missing files yield an empty map; the caller decides whether that deserves a warning.
pub fn load_env_file(path: &Path) -> Result<EnvMap> {
    if !path.exists() {
        return Ok(EnvMap::new());
    }

    let content = std::fs::read_to_string(path).map_err(|source| StackError::EnvFile {
        path: path.display().to_string(),
        source,
    })?;
    let (mut vars, literal) = parse(&content);

    expand_all(&mut vars, &literal);
    tracing::debug!(path = %path.display(), keys = vars.len(), "loaded env file");
    Ok(vars)
}

/// Parse `KEY=value` lines, keeping `${...}` placeholders intact.
///
/// Supports `# comments`, an optional `export ` prefix, double-quoted values with
/// `\n`, `\"` and `\\` escapes, single-quoted values (returned in the second set so
/// they are never expanded) and trailing ` # comments` on unquoted values.
pub fn parse(content: &str) -> (EnvMap, BTreeSet<String>) {
    let mut vars = EnvMap::new();
    let mut literal = BTreeSet::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

        let Some((key, raw)) = line.split_once('=') else {
            tracing::warn!(line = idx + 1, "ignoring env line without '='");
            continue;
        };
        let key = key.trim();
        if !is_valid_key(key) {
            tracing::warn!(line = idx + 1, key, "ignoring invalid env key");
            continue;
        }

        let raw = raw.trim();
        let value = if let Some(inner) = quoted(raw, '\'') {
            literal.insert(key.to_string());
            inner.to_string()
        } else {
            literal.remove(key);
            match quoted(raw, '"') {
                Some(inner) => unescape(inner),
                None => strip_inline_comment(raw).to_string(),
            }
        };
        vars.insert(key.to_string(), value);
    }

    (vars, literal)
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn quoted(raw: &str, quote: char) -> Option<&str> {
    if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
        Some(&raw[1..raw.len() - 1])
    } else {
        None
    }
}

fn unescape(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn strip_inline_comment(raw: &str) -> &str {
    match raw.find(" #") {
        Some(pos) => raw[..pos].trim_end(),
        None => raw,
    }
}

/// A few passes of ${VAR} and ${VAR:-default} expansion, resolving against the map
/// first and the process environment second. Keys in `literal` are left untouched.
pub fn expand_all(vars: &mut EnvMap, literal: &BTreeSet<String>) {
    for _pass in 0..5 {
        let mut changes = 0;
        let keys: Vec<String> = vars.keys().cloned().collect();

        for key in keys.into_iter().filter(|k| !literal.contains(k)) {
            let val = vars[&key].clone();
            if !val.contains("${") {
                continue;
            }
            let new_val = expand_value(&key, &val, |name| lookup(vars, name));
            if new_val != val {
                vars.insert(key, new_val);
                changes += 1;
            }
        }
        if changes == 0 {
            break;
        }
    }
}

fn lookup(vars: &EnvMap, name: &str) -> Option<String> {
    vars.get(name)
        .cloned()
        .or_else(|| std::env::var(name).ok())
        .filter(|v| !v.is_empty())
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid placeholder regex")
    })
}

/// Replace occurrences of ${NAME} or ${NAME:-default}. A variable never expands to itself.
pub fn expand_value<F>(current_key: &str, input: &str, resolve: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    placeholder()
        .replace_all(input, |caps: &Captures| {
            let name = &caps[1];
            let resolved = if name == current_key { None } else { resolve(name) };
            resolved
                .or_else(|| caps.get(2).map(|d| d.as_str().to_string()))
                .unwrap_or_default()
        })
        .into_owned()
}

/// Resolve a key from the loaded map, then from the process environment.
pub fn get_value(vars: &EnvMap, key: &str) -> Option<String> {
    lookup(vars, key)
}
