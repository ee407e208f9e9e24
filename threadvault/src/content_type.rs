//! The two archived record kinds and their static field tables.
//!
//! Every per-kind decision (which fields a hit may expose, which filters and
//! aggregations are accepted, where full-text queries look) is made by
//! dispatching once on [`ContentType`] and reading one of these tables.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Comment,
    Submission,
}

/// Static description of one content type
#[derive(Debug)]
pub struct ContentTable {
    /// Fields searched by an unscoped full-text query
    pub text_fields: &'static [&'static str],
    /// Fields a client may see in a hit
    pub field_whitelist: &'static [&'static str],
    /// Projection used when the client asked for none
    pub default_projection: &'static [&'static str],
    /// Multi-value keyword filters, in clause order
    pub term_filters: &'static [&'static str],
    /// Boolean flag filters, in clause order
    pub flag_filters: &'static [&'static str],
    /// Aggregation names this kind supports
    pub aggregations: &'static [&'static str],
    /// Fields accepting field-scoped full-text queries (`title=...`, `title:not=...`)
    pub scoped_text_fields: &'static [&'static str],
    /// Fullname prefix (`t1`, `t3`)
    pub kind_prefix: &'static str,
}

static COMMENT: ContentTable = ContentTable {
    text_fields: &["body"],
    field_whitelist: &[
        "author",
        "author_flair_css_class",
        "author_flair_text",
        "body",
        "controversiality",
        "created_utc",
        "distinguished",
        "edited",
        "gilded",
        "id",
        "is_submitter",
        "link_id",
        "parent_id",
        "permalink",
        "retrieved_on",
        "score",
        "stickied",
        "subreddit",
        "subreddit_id",
    ],
    default_projection: &[
        "id",
        "author",
        "body",
        "created_utc",
        "link_id",
        "parent_id",
        "score",
        "subreddit",
    ],
    term_filters: &["subreddit", "author"],
    flag_filters: &["stickied"],
    aggregations: &["subreddit", "author", "created_utc", "link_id"],
    scoped_text_fields: &[],
    kind_prefix: "t1",
};

static SUBMISSION: ContentTable = ContentTable {
    text_fields: &["title", "selftext"],
    field_whitelist: &[
        "author",
        "author_flair_css_class",
        "author_flair_text",
        "contest_mode",
        "created_utc",
        "domain",
        "full_link",
        "id",
        "is_self",
        "is_video",
        "link_flair_text",
        "locked",
        "num_comments",
        "over_18",
        "permalink",
        "retrieved_on",
        "score",
        "selftext",
        "spoiler",
        "stickied",
        "subreddit",
        "subreddit_id",
        "thumbnail",
        "title",
        "url",
    ],
    default_projection: &[
        "id",
        "author",
        "created_utc",
        "domain",
        "full_link",
        "num_comments",
        "score",
        "selftext",
        "subreddit",
        "title",
        "url",
    ],
    term_filters: &["subreddit", "author", "domain"],
    flag_filters: &[
        "over_18",
        "is_video",
        "stickied",
        "spoiler",
        "locked",
        "contest_mode",
    ],
    aggregations: &["subreddit", "author", "created_utc", "domain", "time_of_day"],
    scoped_text_fields: &["title", "selftext"],
    kind_prefix: "t3",
};

impl ContentType {
    pub fn table(self) -> &'static ContentTable {
        match self {
            ContentType::Comment => &COMMENT,
            ContentType::Submission => &SUBMISSION,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Comment => "comment",
            ContentType::Submission => "submission",
        }
    }

    pub fn allows_field(self, field: &str) -> bool {
        self.table().field_whitelist.contains(&field)
    }

    pub fn allows_aggregation(self, name: &str) -> bool {
        self.table().aggregations.contains(&name)
    }

    /// Effective hit projection: the requested fields that pass the
    /// whitelist (request order kept), or the default set.
    ///
    /// `id` is always part of a hit and never appears in the projection.
    pub fn project_fields(self, requested: Option<&[String]>) -> Vec<String> {
        match requested {
            Some(fields) => fields
                .iter()
                .filter(|f| f.as_str() != "id" && self.allows_field(f))
                .cloned()
                .collect(),
            None => self
                .table()
                .default_projection
                .iter()
                .filter(|f| **f != "id")
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "comment" | "comments" => Ok(ContentType::Comment),
            "submission" | "submissions" => Ok(ContentType::Submission),
            other => Err(ValidationError::new(
                "content_type",
                format!("unrecognized content type '{other}'"),
            )),
        }
    }
}
