//! Validated, immutable description of one search request.

use crate::content_type::ContentType;
use crate::error::ValidationError;
use crate::time_range::TimeRange;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const MAX_SIZE: usize = 500;
pub const DEFAULT_SIZE: usize = 25;
/// Deepest page an index will serve: `offset + size` may not exceed it
pub const MAX_RESULT_WINDOW: usize = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedUtc,
    Score,
    NumComments,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::CreatedUtc => "created_utc",
            SortField::Score => "score",
            SortField::NumComments => "num_comments",
        }
    }
}

impl FromStr for SortField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created_utc" => Ok(SortField::CreatedUtc),
            "score" => Ok(SortField::Score),
            "num_comments" => Ok(SortField::NumComments),
            _ => Err(ValidationError::new(
                "sort_type",
                format!("unrecognized sort_type '{s}' (expected created_utc, score or num_comments)"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl SortDir {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        }
    }
}

impl FromStr for SortDir {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDir::Asc),
            "desc" => Ok(SortDir::Desc),
            _ => Err(ValidationError::new(
                "sort",
                format!("unrecognized sort direction '{s}' (expected asc or desc)"),
            )),
        }
    }
}

/// Multi-value keyword filter: a record matches when the field equals any value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermFilter {
    pub field: String,
    pub values: Vec<String>,
}

/// `>N`, `<N` or `N` against a numeric field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Gt(i64),
    Lt(i64),
    Eq(i64),
}

impl FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |digits: &str| {
            digits
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("expected >N, <N or N, got '{s}'"))
        };
        if let Some(rest) = s.strip_prefix('>') {
            parse(rest).map(Comparison::Gt)
        } else if let Some(rest) = s.strip_prefix('<') {
            parse(rest).map(Comparison::Lt)
        } else {
            parse(s).map(Comparison::Eq)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericFilter {
    pub field: String,
    pub comparison: Comparison,
}

/// Full-text clause restricted to one field, or to the kind's text fields when `field` is `None`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextClause {
    pub field: Option<String>,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub content_type: ContentType,
    pub query: Option<String>,
    /// Field-scoped full-text queries (`title=...`)
    pub scoped_queries: Vec<TextClause>,
    /// Exclusions (`q:not=...`, `title:not=...`)
    pub exclusions: Vec<TextClause>,
    /// Keyword filters, in the content type's table order
    pub filters: Vec<TermFilter>,
    pub numeric_filters: Vec<NumericFilter>,
    /// Boolean flags, in the content type's table order
    pub flags: Vec<(String, bool)>,
    pub size: usize,
    pub offset: usize,
    pub sort_field: SortField,
    pub sort_dir: SortDir,
    pub time_range: TimeRange,
    pub fields: Option<Vec<String>>,
    pub aggregations: Vec<String>,
    pub min_doc_count: Option<u64>,
    /// Exact ids; when present the request is an exact-ID lookup
    pub ids: Option<Vec<u64>>,
}

impl QuerySpec {
    /// Empty spec with the defaults a request without parameters gets
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            query: None,
            scoped_queries: Vec::new(),
            exclusions: Vec::new(),
            filters: Vec::new(),
            numeric_filters: Vec::new(),
            flags: Vec::new(),
            size: DEFAULT_SIZE,
            offset: 0,
            sort_field: SortField::default(),
            sort_dir: SortDir::default(),
            time_range: TimeRange::default(),
            fields: None,
            aggregations: Vec::new(),
            min_doc_count: None,
            ids: None,
        }
    }

    pub fn with_filter(mut self, field: &str, values: &[&str]) -> Self {
        self.filters.push(TermFilter {
            field: field.to_string(),
            values: values.iter().map(|v| v.to_ascii_lowercase()).collect(),
        });
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size.min(MAX_SIZE);
        self
    }

    pub fn with_aggregations(mut self, names: &[&str]) -> Self {
        self.aggregations = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn is_exact_lookup(&self) -> bool {
        self.ids.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_parse() {
        assert_eq!("Score".parse::<SortField>().unwrap(), SortField::Score);
        let err = "karma".parse::<SortField>().unwrap_err();
        assert_eq!(err.field, "sort_type");
        assert!(err.reason.contains("'karma'"));
    }

    #[test]
    fn test_sort_dir_parse() {
        assert_eq!("ASC".parse::<SortDir>().unwrap(), SortDir::Asc);
        let err = "sideways".parse::<SortDir>().unwrap_err();
        assert_eq!(err.field, "sort");
        assert!(err.reason.contains("'sideways'"));
    }

    #[test]
    fn test_comparison_parse() {
        assert_eq!(">10".parse::<Comparison>().unwrap(), Comparison::Gt(10));
        assert_eq!("<-3".parse::<Comparison>().unwrap(), Comparison::Lt(-3));
        assert_eq!("42".parse::<Comparison>().unwrap(), Comparison::Eq(42));
        assert!(">=10".parse::<Comparison>().is_err());
        assert!("lots".parse::<Comparison>().is_err());
    }

    #[test]
    fn test_defaults() {
        let spec = QuerySpec::new(ContentType::Comment);
        assert_eq!(spec.size, DEFAULT_SIZE);
        assert_eq!(spec.sort_field, SortField::CreatedUtc);
        assert_eq!(spec.sort_dir, SortDir::Desc);
        assert!(!spec.is_exact_lookup());
        assert_eq!(spec.with_size(10_000).size, MAX_SIZE);
    }
}
