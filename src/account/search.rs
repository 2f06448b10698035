//! Search query validation and rendering
//!
//! The search endpoint accepts free text decorated with `filter:value`
//! pairs and `tag:` markers, and only a fixed set of each is understood
//! remotely. Queries are validated in full at construction so a typo in
//! an automation fails before any network work.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Filter keys understood by the search endpoint
const ALLOWED_FILTERS: &[&str] = &["album", "artist", "track", "year", "upc", "isrc", "genre"];

/// Tags understood by the search endpoint
const ALLOWED_TAGS: &[&str] = &["hipster", "new"];

/// Search query validation error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("`{0}` is not a valid search item type")]
    InvalidItemType(String),

    #[error("`{0}` is not an allowed search filter")]
    InvalidFilter(String),

    #[error("`{0}` is not an allowed search tag")]
    InvalidTag(String),
}

/// Item types the search endpoint can return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchItemType {
    Album,
    Artist,
    Playlist,
    Track,
    Show,
    Episode,
    Audiobook,
}

impl SearchItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchItemType::Album => "album",
            SearchItemType::Artist => "artist",
            SearchItemType::Playlist => "playlist",
            SearchItemType::Track => "track",
            SearchItemType::Show => "show",
            SearchItemType::Episode => "episode",
            SearchItemType::Audiobook => "audiobook",
        }
    }

    /// Key of the pagination layer in a search response (`albums`, ...)
    pub fn result_layer(&self) -> String {
        format!("{}s", self.as_str())
    }
}

impl FromStr for SearchItemType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "album" => Ok(SearchItemType::Album),
            "artist" => Ok(SearchItemType::Artist),
            "playlist" => Ok(SearchItemType::Playlist),
            "track" => Ok(SearchItemType::Track),
            "show" => Ok(SearchItemType::Show),
            "episode" => Ok(SearchItemType::Episode),
            "audiobook" => Ok(SearchItemType::Audiobook),
            other => Err(QueryError::InvalidItemType(other.to_string())),
        }
    }
}

impl fmt::Display for SearchItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated, immutable search request
#[derive(Debug, Clone)]
pub struct SearchQuery {
    search: String,
    item_type: SearchItemType,
    filters: BTreeMap<String, String>,
    tags: Vec<String>,
}

impl SearchQuery {
    /// Build a query, validating item type, filter keys, and tags before
    /// anything touches the network.
    pub fn new(
        search: impl Into<String>,
        item_type: &str,
        filters: BTreeMap<String, String>,
        tags: Vec<String>,
    ) -> Result<Self, QueryError> {
        let item_type = item_type.parse()?;

        for key in filters.keys() {
            if !ALLOWED_FILTERS.contains(&key.as_str()) {
                return Err(QueryError::InvalidFilter(key.clone()));
            }
        }
        for tag in &tags {
            if !ALLOWED_TAGS.contains(&tag.as_str()) {
                return Err(QueryError::InvalidTag(tag.clone()));
            }
        }

        Ok(Self {
            search: search.into(),
            item_type,
            filters,
            tags,
        })
    }

    /// Plain-text query without filters or tags
    pub fn plain(search: impl Into<String>, item_type: &str) -> Result<Self, QueryError> {
        Self::new(search, item_type, BTreeMap::new(), Vec::new())
    }

    pub fn item_type(&self) -> SearchItemType {
        self.item_type
    }

    /// Query string ready for the search endpoint
    pub fn query_string(&self) -> String {
        let mut query = self.search.clone();

        if !self.filters.is_empty() {
            let filters: Vec<String> = self
                .filters
                .iter()
                .map(|(key, value)| format!("{}:{}", key, value))
                .collect();
            query.push(' ');
            query.push_str(&filters.join(" "));
        }

        if !self.tags.is_empty() {
            let tags: Vec<String> = self.tags.iter().map(|tag| format!("tag:{}", tag)).collect();
            query.push(' ');
            query.push_str(&tags.join(" "));
        }

        query
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.query_string(), self.item_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_query_string_with_filter_and_tag() {
        let query = SearchQuery::new(
            "dark side",
            "album",
            filters(&[("artist", "x")]),
            vec!["new".to_string()],
        )
        .unwrap();

        assert_eq!(query.query_string(), "dark side artist:x tag:new");
        assert_eq!(query.item_type().as_str(), "album");
        assert_eq!(query.item_type().result_layer(), "albums");
    }

    #[test]
    fn test_plain_query_is_untouched() {
        let query = SearchQuery::plain("hello world", "track").unwrap();
        assert_eq!(query.query_string(), "hello world");
    }

    #[test]
    fn test_multiple_filters_render_in_stable_order() {
        let query = SearchQuery::new(
            "q",
            "track",
            filters(&[("year", "1977"), ("artist", "abba")]),
            Vec::new(),
        )
        .unwrap();

        // BTreeMap keeps filter rendering deterministic
        assert_eq!(query.query_string(), "q artist:abba year:1977");
    }

    #[test]
    fn test_invalid_item_type_rejected() {
        let result = SearchQuery::plain("q", "podcast");
        assert_eq!(
            result.unwrap_err(),
            QueryError::InvalidItemType("podcast".to_string())
        );
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let result = SearchQuery::new("q", "album", filters(&[("label", "emi")]), Vec::new());
        assert_eq!(
            result.unwrap_err(),
            QueryError::InvalidFilter("label".to_string())
        );
    }

    #[test]
    fn test_invalid_tag_rejected() {
        let result = SearchQuery::new("q", "album", BTreeMap::new(), vec!["old".to_string()]);
        assert_eq!(result.unwrap_err(), QueryError::InvalidTag("old".to_string()));
    }

    #[test]
    fn test_all_item_types_parse() {
        for name in [
            "album",
            "artist",
            "playlist",
            "track",
            "show",
            "episode",
            "audiobook",
        ] {
            assert!(SearchQuery::plain("q", name).is_ok(), "{name} should parse");
        }
    }
}
