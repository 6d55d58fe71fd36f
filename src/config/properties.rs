//! `.properties` File Loading
//!
//! UTF-8 `key=value` text, the on-disk format for file-backed property
//! sources. The parser follows the conventional rules: `#` and `!` start
//! comment lines, the first unescaped `=` or `:` separates key and value,
//! a trailing backslash continues the logical line, and the usual
//! single-character escapes are decoded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::ConfigError;
use super::source::{
    APPLICATION_PROPERTIES_ORDINAL, CONFIG_DIR_ORDINAL, InMemorySource,
    MICROPROFILE_PROPERTIES_ORDINAL,
};

/// Parse `.properties` text into a key/value map
///
/// Later occurrences of a key overwrite earlier ones, matching the layered
/// model where the last definition inside a single source wins.
pub fn parse_properties(input: &str) -> HashMap<String, String> {
    let mut properties = HashMap::new();
    let mut lines = input.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        // Join continuation lines: an odd number of trailing backslashes
        // continues the logical line on the next physical line.
        let mut logical = trimmed.to_string();
        while has_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some(next) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let (key, value) = split_key_value(&logical);
        if key.is_empty() {
            continue;
        }
        properties.insert(key, value);
    }

    properties
}

fn has_continuation(line: &str) -> bool {
    let trailing = line.chars().rev().take_while(|&c| c == '\\').count();
    trailing % 2 == 1
}

/// Split a logical line at the first unescaped `=` or `:`
///
/// A line with no separator defines the whole line as a key with an empty
/// value.
fn split_key_value(line: &str) -> (String, String) {
    let mut key = String::new();
    let mut chars = line.char_indices();

    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    key.push(decode_escape(escaped));
                }
            }
            '=' | ':' => {
                let raw_value = line.get(idx + 1..).unwrap_or("");
                return (
                    key.trim().to_string(),
                    decode_value(raw_value.trim_start()),
                );
            }
            _ => key.push(c),
        }
    }

    (key.trim().to_string(), String::new())
}

fn decode_value(raw: &str) -> String {
    let mut value = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                value.push(decode_escape(escaped));
            }
        } else {
            value.push(c);
        }
    }
    value
}

fn decode_escape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        other => other,
    }
}

/// Load and parse a properties file
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read.
pub fn load_properties_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let properties = parse_properties(&content);
    debug!(path = %path.display(), count = properties.len(), "[Config] Loaded properties file");
    Ok(properties)
}

/// Load the conventional property-file locations relative to `root`
///
/// Checked locations, highest precedence first:
/// - `config/application.properties` (ordinal 260)
/// - `application.properties` (ordinal 250)
/// - `META-INF/microprofile-config.properties` (ordinal 100)
///
/// Missing files are skipped; unreadable files are reported.
pub fn default_locations(root: &Path) -> Result<Vec<InMemorySource>, ConfigError> {
    let locations: [(&str, i32); 3] = [
        ("config/application.properties", CONFIG_DIR_ORDINAL),
        ("application.properties", APPLICATION_PROPERTIES_ORDINAL),
        (
            "META-INF/microprofile-config.properties",
            MICROPROFILE_PROPERTIES_ORDINAL,
        ),
    ];

    let mut sources = Vec::new();
    for (relative, ordinal) in locations {
        let path = root.join(relative);
        if !path.is_file() {
            continue;
        }
        let properties = load_properties_file(&path)?;
        info!(path = %path.display(), ordinal, "[Config] Registered property file");
        sources.push(InMemorySource::new(relative, ordinal, properties));
    }
    Ok(sources)
}

/// List `application.<ext>` siblings of an `application.properties` location
///
/// Only surfaced for "was this file used" diagnostics; files in other
/// formats are never parsed by this crate.
pub fn sibling_profile_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_stem()
                    .is_some_and(|stem| stem.to_string_lossy() == "application")
                && path
                    .extension()
                    .is_some_and(|ext| ext.to_string_lossy() != "properties")
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_separators_and_escapes() {
        let parsed = parse_properties(
            "# comment\n! also a comment\n\nkey=value\nspaced.key = value with spaces \ncolon:value\nescaped\\=key=x\ntab=a\\tb\n",
        );
        assert_eq!(parsed.get("key").map(String::as_str), Some("value"));
        assert_eq!(
            parsed.get("spaced.key").map(String::as_str),
            Some("value with spaces ")
        );
        assert_eq!(parsed.get("colon").map(String::as_str), Some("value"));
        assert_eq!(parsed.get("escaped=key").map(String::as_str), Some("x"));
        assert_eq!(parsed.get("tab").map(String::as_str), Some("a\tb"));
    }

    #[test]
    fn joins_continuation_lines() {
        let parsed = parse_properties("list=a,\\\n   b,\\\n   c\ndouble\\\\=not-continued");
        assert_eq!(parsed.get("list").map(String::as_str), Some("a,b,c"));
        assert_eq!(parsed.get("double\\").map(String::as_str), Some("not-continued"));
    }

    #[test]
    fn line_without_separator_is_key_with_empty_value() {
        let parsed = parse_properties("flag.only\n");
        assert_eq!(parsed.get("flag.only").map(String::as_str), Some(""));
    }
}
