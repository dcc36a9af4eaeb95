//! Search query types.
//!
//! `SearchOptions` is what callers pass to the query façade; `StructuredQuery`
//! is the backend-neutral query the façade hands to an index backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How query terms are combined.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchOperator {
    /// Every term must match (logical AND). This is the default.
    #[default]
    All,
    /// Any term may match (logical OR).
    Any,
}

impl MatchOperator {
    pub fn from_match_any(match_any: bool) -> Self {
        if match_any {
            MatchOperator::Any
        } else {
            MatchOperator::All
        }
    }

    /// Operator keyword used by query-string syntaxes.
    pub fn as_keyword(&self) -> &'static str {
        match self {
            MatchOperator::All => "AND",
            MatchOperator::Any => "OR",
        }
    }
}

/// Options for a free-text search.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchOptions {
    /// Fields to search. Defaults to the entity kind's declared searchable set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,

    /// Maximum number of identifiers to return.
    /// Unset, zero or negative means no limit is imposed by the façade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    /// Relax matching from all terms to any term.
    #[serde(default)]
    pub match_any: bool,

    /// Backend-specific options merged into the structured query.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl SearchOptions {
    /// Default options: all declared fields, no limit, all terms must match.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn match_any(mut self) -> Self {
        self.match_any = true;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// The limit to pass to the backend, if any.
    pub fn effective_limit(&self) -> Option<usize> {
        match self.limit {
            Some(limit) if limit > 0 => usize::try_from(limit).ok(),
            _ => None,
        }
    }

    pub fn operator(&self) -> MatchOperator {
        MatchOperator::from_match_any(self.match_any)
    }
}

/// Backend-neutral query handed to an index backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredQuery {
    /// The raw query text.
    pub text: String,
    /// Fields the text is matched against.
    pub fields: Vec<String>,
    /// How terms are combined.
    pub operator: MatchOperator,
    /// Backend-specific options.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl StructuredQuery {
    pub fn new(text: impl Into<String>, fields: Vec<String>, operator: MatchOperator) -> Self {
        Self {
            text: text.into(),
            fields,
            operator,
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra = extra;
        self
    }

    /// Whether the query text has nothing to match.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effective_limit() {
        assert_eq!(SearchOptions::new().effective_limit(), None);
        assert_eq!(SearchOptions::new().with_limit(-1).effective_limit(), None);
        assert_eq!(SearchOptions::new().with_limit(0).effective_limit(), None);
        assert_eq!(SearchOptions::new().with_limit(5).effective_limit(), Some(5));
    }

    #[test]
    fn test_operator() {
        assert_eq!(SearchOptions::new().operator(), MatchOperator::All);
        assert_eq!(SearchOptions::new().match_any().operator(), MatchOperator::Any);
        assert_eq!(MatchOperator::All.as_keyword(), "AND");
        assert_eq!(MatchOperator::Any.as_keyword(), "OR");
    }

    #[test]
    fn test_options_builder() {
        let options = SearchOptions::new()
            .with_fields(["title"])
            .with_extra("analyze_wildcard", json!(true));

        assert_eq!(options.fields, Some(vec!["title".to_string()]));
        assert_eq!(options.extra["analyze_wildcard"], json!(true));
    }

    #[test]
    fn test_blank_query() {
        let query = StructuredQuery::new("   ", vec!["title".to_string()], MatchOperator::All);
        assert!(query.is_blank());
    }

    #[test]
    fn test_deserialize_defaults() {
        let options: SearchOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, SearchOptions::default());
    }
}
