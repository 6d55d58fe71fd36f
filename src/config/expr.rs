//! Expression Expansion
//!
//! Recursive substitution of `${key}` and `${key:default}` references in
//! resolved raw values. Each reference is resolved through the same layered
//! lookup as a plain string, so expansion always reflects current source
//! state. Parsed templates are cached by raw string; expanded *values* are
//! never cached.
//!
//! The recursion depth is threaded through the expansion calls as an
//! explicit argument and capped at [`MAX_EXPANSION_DEPTH`], so a cyclic
//! reference (`a=${b}`, `b=${a}`) fails fast instead of overflowing the
//! stack.

use std::sync::Arc;

use dashmap::DashMap;

use super::ConfigError;

/// Upper bound on nested expansion depth
pub const MAX_EXPANSION_DEPTH: usize = 32;

/// One piece of a parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `${key}` or `${key:default}`; the default is kept raw because it may
    /// itself contain nested expressions
    Expression {
        key: String,
        default: Option<String>,
        /// Original `${...}` text, produced verbatim when the key is absent
        /// and no default exists
        literal: String,
    },
}

/// A parsed expression template
#[derive(Debug, Clone, PartialEq, Eq)]
struct Expression {
    segments: Vec<Segment>,
    has_expressions: bool,
}

impl Expression {
    fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut has_expressions = false;
        let mut rest = raw;

        while let Some(dollar) = rest.find('$') {
            let (before, at_dollar) = rest.split_at(dollar);
            literal.push_str(before);

            if let Some(after) = at_dollar.strip_prefix("$$") {
                // `$$` escapes a single dollar: `$${key}` stays `${key}`
                literal.push('$');
                rest = after;
                continue;
            }

            let Some(body_start) = at_dollar.strip_prefix("${") else {
                // Lone `$` with no opening brace
                literal.push('$');
                rest = at_dollar.get(1..).unwrap_or("");
                continue;
            };

            let Some(body_len) = matching_brace(body_start) else {
                // Unterminated expression: keep the text verbatim
                literal.push_str(at_dollar);
                rest = "";
                break;
            };

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }

            let body = body_start.get(..body_len).unwrap_or("");
            let (key, default) = match top_level_colon(body) {
                Some(colon) => {
                    let key = body.get(..colon).unwrap_or("");
                    let default = body.get(colon + 1..).unwrap_or("");
                    (key.to_string(), Some(default.to_string()))
                }
                None => (body.to_string(), None),
            };
            segments.push(Segment::Expression {
                key,
                default,
                literal: format!("${{{body}}}"),
            });
            has_expressions = true;
            rest = body_start.get(body_len + 1..).unwrap_or("");
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            segments,
            has_expressions,
        }
    }
}

/// Length of the expression body up to the brace matching the opening `${`
fn matching_brace(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return Some(idx),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Position of the first `:` outside any nested `{...}`
fn top_level_colon(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Expands `${...}` references against a caller-supplied resolver
///
/// The expander is shared by a [`LayeredConfig`] and caches parsed
/// templates concurrently.
///
/// [`LayeredConfig`]: crate::config::LayeredConfig
pub struct ExpressionExpander {
    templates: DashMap<String, Arc<Expression>>,
}

impl ExpressionExpander {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
        }
    }

    /// Expand `raw`, resolving inner keys through `resolve`
    ///
    /// `depth` is the current nesting depth; callers start at `0` and the
    /// expander increments it for every nested re-expansion.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ExpressionRecursion`] once `depth` exceeds
    /// [`MAX_EXPANSION_DEPTH`], which is how cyclic references surface.
    pub fn expand(
        &self,
        raw: &str,
        resolve: &dyn Fn(&str) -> Option<String>,
        depth: usize,
    ) -> Result<String, ConfigError> {
        if depth > MAX_EXPANSION_DEPTH {
            return Err(ConfigError::ExpressionRecursion {
                expression: raw.to_string(),
                limit: MAX_EXPANSION_DEPTH,
            });
        }

        let template = self.template(raw);
        if !template.has_expressions {
            // Fast path: still honors `$$` unescaping done at parse time
            return Ok(template
                .segments
                .iter()
                .map(|segment| match segment {
                    Segment::Literal(text) => text.as_str(),
                    Segment::Expression { .. } => "",
                })
                .collect());
        }

        let mut expanded = String::new();
        for segment in &template.segments {
            match segment {
                Segment::Literal(text) => expanded.push_str(text),
                Segment::Expression {
                    key,
                    default,
                    literal,
                } => {
                    if let Some(value) = resolve(key) {
                        expanded.push_str(&self.expand(&value, resolve, depth + 1)?);
                    } else if let Some(default) = default {
                        expanded.push_str(&self.expand(default, resolve, depth + 1)?);
                    } else {
                        expanded.push_str(literal);
                    }
                }
            }
        }
        Ok(expanded)
    }

    /// Whether `raw` contains any expandable reference
    pub fn contains_expression(&self, raw: &str) -> bool {
        self.template(raw).has_expressions
    }

    fn template(&self, raw: &str) -> Arc<Expression> {
        if let Some(cached) = self.templates.get(raw) {
            return Arc::clone(&cached);
        }
        let parsed = Arc::new(Expression::parse(raw));
        self.templates
            .entry(raw.to_string())
            .or_insert(parsed)
            .clone()
    }
}

impl Default for ExpressionExpander {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolver(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn expand(raw: &str, map: &HashMap<String, String>) -> Result<String, ConfigError> {
        ExpressionExpander::new().expand(raw, &|key| map.get(key).cloned(), 0)
    }

    #[test]
    fn plain_reference_and_literal_tail() {
        let map = resolver(&[("host", "localhost")]);
        assert_eq!(
            expand("http://${host}:8080", &map).ok(),
            Some("http://localhost:8080".to_string())
        );
    }

    #[test]
    fn default_applies_when_key_absent() {
        let map = resolver(&[]);
        assert_eq!(expand("${missing:fallback}", &map).ok(), Some("fallback".to_string()));
    }

    #[test]
    fn nested_default_expression() {
        let map = resolver(&[("b", "from-b")]);
        assert_eq!(expand("${a:${b}}", &map).ok(), Some("from-b".to_string()));
    }

    #[test]
    fn absent_key_without_default_keeps_literal() {
        let map = resolver(&[]);
        assert_eq!(expand("${missing}", &map).ok(), Some("${missing}".to_string()));
    }

    #[test]
    fn dollar_dollar_escapes_expansion() {
        let map = resolver(&[("key", "value")]);
        assert_eq!(expand("$${key}", &map).ok(), Some("${key}".to_string()));
    }

    #[test]
    fn self_reference_fails_with_recursion_error() {
        let map = resolver(&[("a", "${a}")]);
        let err = expand("${a}", &map);
        assert!(matches!(
            err,
            Err(ConfigError::ExpressionRecursion { limit, .. }) if limit == MAX_EXPANSION_DEPTH
        ));
    }

    #[test]
    fn template_cache_does_not_cache_values() {
        let expander = ExpressionExpander::new();
        let mut map = resolver(&[("key", "one")]);
        assert_eq!(
            expander.expand("${key}", &|k| map.get(k).cloned(), 0).ok(),
            Some("one".to_string())
        );
        map.insert("key".to_string(), "two".to_string());
        assert_eq!(
            expander.expand("${key}", &|k| map.get(k).cloned(), 0).ok(),
            Some("two".to_string())
        );
    }
}
