//! Raw request parameters → validated [`QuerySpec`].

use crate::content_type::ContentType;
use crate::error::ValidationError;
use crate::ids::parse_id;
use crate::query::spec::{
    Comparison, NumericFilter, QuerySpec, SortDir, TermFilter, TextClause, MAX_RESULT_WINDOW,
    MAX_SIZE,
};
use crate::time_range::TimeRange;
use tracing::warn;

/// Every keyword filter any content type accepts
const ALL_TERM_FILTERS: &[&str] = &["subreddit", "author", "domain"];

/// Every boolean flag any content type accepts
const ALL_FLAG_FILTERS: &[&str] = &[
    "over_18",
    "is_video",
    "stickied",
    "spoiler",
    "locked",
    "contest_mode",
];

const NUMERIC_FILTERS: &[&str] = &["score", "num_comments"];

/// Query-string parameters as received, names lowercased, order kept.
///
/// A name may appear more than once (`?author=a&author=b`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawParams {
    pairs: Vec<(String, String)>,
}

impl RawParams {
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into().to_ascii_lowercase(), v.into()))
                .collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == name)
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Last value given for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Value of the first alias present, in alias priority order
    pub fn first_of<'a>(&'a self, names: &[&'a str]) -> Option<(&'a str, &'a str)> {
        names
            .iter()
            .find_map(|name| self.get(name).map(|v| (*name, v)))
    }

    /// All values of `name`, comma-split, trimmed, lowercased and de-duplicated
    /// in first-seen order.
    pub fn list(&self, name: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for value in self.get_all(name) {
            for item in value.split(',') {
                let item = item.trim().to_lowercase();
                if !item.is_empty() && !out.contains(&item) {
                    out.push(item);
                }
            }
        }
        out
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Validate raw parameters for a search over `content_type`.
///
/// `now` anchors relative time tokens.
pub fn parse(
    content_type: ContentType,
    raw: &RawParams,
    now: i64,
) -> Result<QuerySpec, ValidationError> {
    let table = content_type.table();
    let mut spec = QuerySpec::new(content_type);

    spec.query = non_empty(raw.get("q"));
    for field in table.scoped_text_fields {
        if let Some(query) = non_empty(raw.get(field)) {
            spec.scoped_queries.push(TextClause {
                field: Some(field.to_string()),
                query,
            });
        }
    }
    if let Some(query) = non_empty(raw.get("q:not")) {
        spec.exclusions.push(TextClause { field: None, query });
    }
    for field in table.scoped_text_fields {
        if let Some(query) = non_empty(raw.get(&format!("{field}:not"))) {
            spec.exclusions.push(TextClause {
                field: Some(field.to_string()),
                query,
            });
        }
    }

    reject_foreign_filters(content_type, raw)?;

    for field in table.term_filters {
        let values = raw.list(field);
        if !values.is_empty() {
            spec.filters.push(TermFilter {
                field: field.to_string(),
                values,
            });
        }
    }

    for field in NUMERIC_FILTERS {
        if let Some(value) = raw.get(field) {
            let comparison = value
                .parse::<Comparison>()
                .map_err(|reason| ValidationError::new(*field, reason))?;
            spec.numeric_filters.push(NumericFilter {
                field: field.to_string(),
                comparison,
            });
        }
    }

    for flag in table.flag_filters {
        if let Some(value) = raw.get(flag) {
            match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => spec.flags.push((flag.to_string(), true)),
                "false" | "0" => spec.flags.push((flag.to_string(), false)),
                _ => warn!("Ignoring invalid boolean value for {}: {}", flag, value),
            }
        }
    }

    if let Some((name, value)) = raw.first_of(&["limit", "size"]) {
        spec.size = parse_size(value).map_err(|e| e.for_field(name))?;
    }
    if let Some((name, value)) = raw.first_of(&["offset", "from"]) {
        spec.offset = value.trim().parse::<usize>().map_err(|_| {
            ValidationError::new(name, format!("expected a non-negative integer, got '{value}'"))
        })?;
        if spec.offset.saturating_add(spec.size) > MAX_RESULT_WINDOW {
            return Err(ValidationError::new(
                "offset",
                format!(
                    "offset + size must not exceed {MAX_RESULT_WINDOW}, got {} + {}",
                    spec.offset, spec.size
                ),
            ));
        }
    }

    if let Some(value) = raw.get("sort_type") {
        spec.sort_field = value.parse()?;
    }
    if let Some((name, value)) = raw.first_of(&["order", "sort"]) {
        spec.sort_dir = value.parse::<SortDir>().map_err(|e| e.for_field(name))?;
    }

    spec.time_range = TimeRange::from_tokens(raw.get("after"), raw.get("before"), now)?;

    if raw.contains("fields") {
        spec.fields = Some(raw.list("fields"));
    }
    spec.aggregations = raw.list("aggs");
    if let Some(value) = raw.get("min_doc_count") {
        spec.min_doc_count = Some(value.trim().parse::<u64>().map_err(|_| {
            ValidationError::new(
                "min_doc_count",
                format!("expected a non-negative integer, got '{value}'"),
            )
        })?);
    }

    if raw.contains("ids") {
        let ids = raw
            .list("ids")
            .iter()
            .map(|id| parse_id(id, table.kind_prefix).map_err(|e| e.for_field("ids")))
            .collect::<Result<Vec<_>, _>>()?;
        if ids.is_empty() {
            return Err(ValidationError::new("ids", "no ids given"));
        }
        if ids.len() > MAX_SIZE {
            return Err(ValidationError::new(
                "ids",
                format!("at most {MAX_SIZE} ids per request, got {}", ids.len()),
            ));
        }
        spec.ids = Some(ids);
    }

    Ok(spec)
}

/// Sizes above [`MAX_SIZE`] clamp; negative or non-integer sizes are rejected.
pub fn parse_size(value: &str) -> Result<usize, ValidationError> {
    let v = value.trim();
    let (negative, digits) = match v.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, v.strip_prefix('+').unwrap_or(v)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::new(
            "size",
            format!("expected an integer, got '{value}'"),
        ));
    }
    if negative && digits.bytes().any(|b| b != b'0') {
        return Err(ValidationError::new(
            "size",
            format!("size must not be negative, got '{value}'"),
        ));
    }
    // All-digit strings only fail to parse on overflow, which clamps like any other large size.
    Ok(digits
        .parse::<u64>()
        .map_or(MAX_SIZE, |n| n.min(MAX_SIZE as u64) as usize))
}

fn reject_foreign_filters(content_type: ContentType, raw: &RawParams) -> Result<(), ValidationError> {
    let table = content_type.table();
    let foreign = ALL_TERM_FILTERS
        .iter()
        .filter(|f| !table.term_filters.contains(f))
        .chain(
            ALL_FLAG_FILTERS
                .iter()
                .filter(|f| !table.flag_filters.contains(f)),
        )
        .find(|f| raw.contains(f));

    match foreign {
        Some(field) => Err(ValidationError::new(
            *field,
            format!("filter not supported for {content_type}s"),
        )),
        None => Ok(()),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
