//! Symbol name patterns
//!
//! Used by `excluded_symbol_names` and by ownership rule tables.
//!
//! Pattern forms:
//! - `Name`        exact simple name of a method or its containing type
//! - `Na*e`        `*` matches any run of characters
//! - `M:NS.T.Name` fully qualified method (optionally with `(signature)`)
//! - `T:NS.T`      fully qualified type
//! - `N:NS`        namespace, including nested namespaces

use regex::Regex;
use tracing::warn;

use super::error::{ConfigError, ConfigResult};
use crate::features::flow_graph::domain::QualifiedName;

/// Exact or wildcard matcher over a whole string
#[derive(Debug, Clone)]
pub enum NamePattern {
    Exact(String),
    Wildcard(Regex),
}

impl NamePattern {
    pub fn new(text: &str) -> ConfigResult<Self> {
        if !text.contains('*') {
            return Ok(NamePattern::Exact(text.to_string()));
        }
        let body = text
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        Regex::new(&format!("^{}$", body))
            .map(NamePattern::Wildcard)
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: text.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            NamePattern::Exact(exact) => exact == text,
            NamePattern::Wildcard(regex) => regex.is_match(text),
        }
    }
}

/// What a symbol pattern is compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternTarget {
    Simple,
    Method,
    Type,
    Namespace,
}

#[derive(Debug, Clone)]
pub struct SymbolPattern {
    target: PatternTarget,
    raw: String,
    pattern: NamePattern,
}

impl SymbolPattern {
    pub fn parse(text: &str) -> ConfigResult<Self> {
        let text = text.trim();
        let (target, raw) = [
            ("M:", PatternTarget::Method),
            ("T:", PatternTarget::Type),
            ("N:", PatternTarget::Namespace),
        ]
        .into_iter()
        .find_map(|(prefix, target)| text.strip_prefix(prefix).map(|rest| (target, rest)))
        .unwrap_or((PatternTarget::Simple, text));
        if raw.is_empty() {
            return Err(ConfigError::InvalidPattern {
                pattern: text.to_string(),
                reason: "empty symbol name".to_string(),
            });
        }
        Ok(Self {
            target,
            raw: raw.to_string(),
            pattern: NamePattern::new(raw)?,
        })
    }

    pub fn target(&self) -> PatternTarget {
        self.target
    }

    pub fn matches(&self, name: &QualifiedName) -> bool {
        match self.target {
            PatternTarget::Simple => {
                self.pattern.is_match(&name.name) || self.pattern.is_match(name.type_simple_name())
            }
            PatternTarget::Method => {
                if self.raw.contains('(') {
                    self.pattern.is_match(&name.method_path_with_signature())
                } else {
                    self.pattern.is_match(&name.method_path())
                }
            }
            PatternTarget::Type => self.pattern.is_match(&name.type_path()),
            PatternTarget::Namespace => {
                // N:Acme also covers Acme.IO
                let mut ns = name.namespace.as_str();
                loop {
                    if self.pattern.is_match(ns) {
                        return true;
                    }
                    match ns.rfind('.') {
                        Some(pos) => ns = &ns[..pos],
                        None => return false,
                    }
                }
            }
        }
    }
}

/// Parsed `excluded_symbol_names` option
#[derive(Debug, Clone, Default)]
pub struct SymbolExclusions {
    patterns: Vec<SymbolPattern>,
}

impl SymbolExclusions {
    /// Parse a `|`-separated list; invalid entries are skipped with a warning
    pub fn parse(value: &str) -> Self {
        let patterns = value
            .split('|')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .filter_map(|p| match SymbolPattern::parse(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Ignoring excluded symbol pattern: {}", e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_excluded(&self, name: &QualifiedName) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name() -> QualifiedName {
        QualifiedName::new("Acme.IO", "Reader", "OpenFile").with_signature("(System.String)")
    }

    #[test]
    fn test_simple_name_matches_method_or_type() {
        assert!(SymbolExclusions::parse("OpenFile").is_excluded(&name()));
        assert!(SymbolExclusions::parse("Reader").is_excluded(&name()));
        assert!(!SymbolExclusions::parse("Open").is_excluded(&name()));
    }

    #[test]
    fn test_wildcards() {
        assert!(SymbolExclusions::parse("Open*").is_excluded(&name()));
        assert!(SymbolExclusions::parse("*File").is_excluded(&name()));
        assert!(SymbolExclusions::parse("M:Acme.*.OpenFile").is_excluded(&name()));
        assert!(!SymbolExclusions::parse("Close*").is_excluded(&name()));
    }

    #[test]
    fn test_prefixed_patterns() {
        assert!(SymbolExclusions::parse("M:Acme.IO.Reader.OpenFile").is_excluded(&name()));
        assert!(SymbolExclusions::parse("M:Acme.IO.Reader.OpenFile(System.String)").is_excluded(&name()));
        assert!(!SymbolExclusions::parse("M:Acme.IO.Reader.OpenFile(System.Int32)").is_excluded(&name()));
        assert!(SymbolExclusions::parse("T:Acme.IO.Reader").is_excluded(&name()));
        assert!(SymbolExclusions::parse("N:Acme").is_excluded(&name()));
        assert!(SymbolExclusions::parse("N:Acme.IO").is_excluded(&name()));
        assert!(!SymbolExclusions::parse("N:Acm").is_excluded(&name()));
    }

    #[test]
    fn test_list_with_blanks() {
        let exclusions = SymbolExclusions::parse(" Foo | | M: |Bar ");
        // "M:" has an empty name and is skipped
        assert_eq!(exclusions.len(), 2);
    }

    #[test]
    fn test_wildcard_escapes_regex_metacharacters() {
        let pattern = NamePattern::new("Acme.Pool.Rent*").unwrap();
        assert!(pattern.is_match("Acme.Pool.Rent"));
        assert!(pattern.is_match("Acme.Pool.RentAsync"));
        assert!(!pattern.is_match("AcmeXPool.Rent"));
    }
}
