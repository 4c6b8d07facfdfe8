//! Query-string state of a list view
//!
//! Parsed once per request from `q`, `searchfield`, `searchtype`, `o`, `d`,
//! `p` and `format`. Every link the list view emits is derived from this
//! state with exactly one dimension changed.

use serde::Deserialize;
use std::fmt;

/// Raw list query parameters, as sent by the browser
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub q: Option<String>,
    pub searchfield: Option<String>,
    pub searchtype: Option<String>,
    pub o: Option<String>,
    pub d: Option<String>,
    pub p: Option<String>,
    pub format: Option<String>,
}

/// Comparison applied by the search box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchType {
    Equals,
    #[default]
    Contains,
    NotEquals,
    NotContains,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

impl SearchType {
    pub const ALL: [SearchType; 8] = [
        SearchType::Equals,
        SearchType::Contains,
        SearchType::NotEquals,
        SearchType::NotContains,
        SearchType::LessThan,
        SearchType::LessOrEqual,
        SearchType::GreaterThan,
        SearchType::GreaterOrEqual,
    ];

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|search_type| search_type.code() == code)
    }

    /// Short code used in the query string
    pub fn code(self) -> &'static str {
        match self {
            SearchType::Equals => "e",
            SearchType::Contains => "c",
            SearchType::NotEquals => "ne",
            SearchType::NotContains => "nc",
            SearchType::LessThan => "lt",
            SearchType::LessOrEqual => "lte",
            SearchType::GreaterThan => "gt",
            SearchType::GreaterOrEqual => "gte",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SearchType::Equals => "equals",
            SearchType::Contains => "contains",
            SearchType::NotEquals => "does not equal",
            SearchType::NotContains => "does not contain",
            SearchType::LessThan => "is less than",
            SearchType::LessOrEqual => "is less than or equal to",
            SearchType::GreaterThan => "is greater than",
            SearchType::GreaterOrEqual => "is greater than or equal to",
        }
    }

    /// SQL comparison operator
    pub fn operator(self) -> &'static str {
        match self {
            SearchType::Equals => "=",
            SearchType::Contains => "LIKE",
            SearchType::NotEquals => "!=",
            SearchType::NotContains => "NOT LIKE",
            SearchType::LessThan => "<",
            SearchType::LessOrEqual => "<=",
            SearchType::GreaterThan => ">",
            SearchType::GreaterOrEqual => ">=",
        }
    }

    pub fn is_pattern(self) -> bool {
        matches!(self, SearchType::Contains | SearchType::NotContains)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    /// Arrow shown next to the active sort header
    pub fn arrow(self) -> &'static str {
        match self {
            SortDirection::Asc => "\u{25B2}",
            SortDirection::Desc => "\u{25BC}",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed list-view state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestState {
    pub search_field: Option<String>,
    pub search_type: SearchType,
    /// Search text; `None` when the box is empty
    pub query_text: Option<String>,
    pub order_column: Option<String>,
    pub order_direction: SortDirection,
    pub page_number: u64,
    pub download_format: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

impl RequestState {
    pub fn from_params(params: ListParams) -> Self {
        Self {
            search_field: non_empty(params.searchfield),
            search_type: params
                .searchtype
                .as_deref()
                .and_then(SearchType::parse)
                .unwrap_or_default(),
            query_text: non_empty(params.q),
            order_column: non_empty(params.o),
            order_direction: params
                .d
                .as_deref()
                .map(SortDirection::parse)
                .unwrap_or_default(),
            // Garbage, negative and overflowing page numbers all mean the first page
            page_number: params
                .p
                .as_deref()
                .and_then(|page| page.trim().parse().ok())
                .unwrap_or(0),
            download_format: non_empty(params.format),
        }
    }

    /// State selecting exactly one record by key
    pub fn for_record(key_column: &str, id: &str) -> Self {
        Self {
            search_field: Some(key_column.to_string()),
            search_type: SearchType::Equals,
            query_text: Some(id.to_string()),
            ..Self::default()
        }
    }

    pub fn is_searching(&self) -> bool {
        self.query_text.is_some()
    }

    /// Query-string pairs describing this state
    ///
    /// Defaults are omitted, the download format is never carried over.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(query_text) = &self.query_text {
            pairs.push(("q", query_text.clone()));
            if let Some(search_field) = &self.search_field {
                pairs.push(("searchfield", search_field.clone()));
            }
            pairs.push(("searchtype", self.search_type.code().to_string()));
        }
        if let Some(order_column) = &self.order_column {
            pairs.push(("o", order_column.clone()));
            pairs.push(("d", self.order_direction.as_str().to_string()));
        }
        if self.page_number > 0 {
            pairs.push(("p", self.page_number.to_string()));
        }
        pairs
    }

    /// `prefix?query` for this state
    pub fn href(&self, prefix: &str) -> String {
        build_href(prefix, &self.query_pairs())
    }

    /// Link ordering by `column`, keeping search and page
    pub fn sort_href(&self, prefix: &str, column: &str, direction: SortDirection) -> String {
        let state = Self {
            order_column: Some(column.to_string()),
            order_direction: direction,
            ..self.clone()
        };
        state.href(prefix)
    }

    /// Link to another page, keeping search and ordering
    pub fn page_href(&self, prefix: &str, page_number: u64) -> String {
        let state = Self {
            page_number,
            ..self.clone()
        };
        state.href(prefix)
    }

    /// Link clearing the search; the page number belongs to the search and goes with it
    pub fn reset_search_href(&self, prefix: &str) -> String {
        let state = Self {
            search_field: None,
            search_type: SearchType::default(),
            query_text: None,
            page_number: 0,
            ..self.clone()
        };
        state.href(prefix)
    }

    /// Link downloading the current view in `format`
    pub fn download_href(&self, prefix: &str, format: &str) -> String {
        let mut pairs = self.query_pairs();
        pairs.push(("format", format.to_string()));
        build_href(prefix, &pairs)
    }
}

fn build_href(prefix: &str, pairs: &[(&'static str, String)]) -> String {
    if pairs.is_empty() {
        return prefix.to_string();
    }
    match serde_urlencoded::to_string(pairs) {
        Ok(query) => format!("{}?{}", prefix, query),
        Err(error) => {
            tracing::warn!(%error, "failed to encode list state");
            prefix.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let query = serde_urlencoded::to_string(pairs).unwrap();
        serde_urlencoded::from_str(&query).unwrap()
    }

    #[test]
    fn test_parse_full_state() {
        let state = RequestState::from_params(params(&[
            ("q", "bigpresh"),
            ("searchfield", "username"),
            ("searchtype", "nc"),
            ("o", "username"),
            ("d", "desc"),
            ("p", "3"),
            ("format", "csv"),
        ]));

        assert_eq!(state.query_text.as_deref(), Some("bigpresh"));
        assert_eq!(state.search_field.as_deref(), Some("username"));
        assert_eq!(state.search_type, SearchType::NotContains);
        assert_eq!(state.order_column.as_deref(), Some("username"));
        assert_eq!(state.order_direction, SortDirection::Desc);
        assert_eq!(state.page_number, 3);
        assert_eq!(state.download_format.as_deref(), Some("csv"));
    }

    #[test]
    fn test_garbage_input_uses_defaults() {
        let state = RequestState::from_params(params(&[
            ("q", ""),
            ("searchtype", "like"),
            ("d", "sideways"),
            ("p", "badger"),
        ]));
        assert_eq!(state, RequestState::default());

        for page in ["-1", "1.5", "99999999999999999999999"] {
            assert_eq!(RequestState::from_params(params(&[("p", page)])).page_number, 0);
        }
    }

    #[test]
    fn test_search_type_codes_round_trip() {
        for search_type in SearchType::ALL {
            assert_eq!(SearchType::parse(search_type.code()), Some(search_type));
        }
        assert_eq!(SearchType::parse("x"), None);
    }

    #[test]
    fn test_links_change_one_dimension() {
        let state = RequestState::from_params(params(&[
            ("q", "a b"),
            ("searchfield", "username"),
            ("searchtype", "c"),
            ("o", "id"),
            ("d", "asc"),
            ("p", "2"),
        ]));

        assert_eq!(
            state.sort_href("/users", "username", SortDirection::Desc),
            "/users?q=a+b&searchfield=username&searchtype=c&o=username&d=desc&p=2"
        );
        assert_eq!(
            state.page_href("/users", 3),
            "/users?q=a+b&searchfield=username&searchtype=c&o=id&d=asc&p=3"
        );
        assert_eq!(state.reset_search_href("/users"), "/users?o=id&d=asc");
        assert_eq!(
            state.download_href("/users", "json"),
            "/users?q=a+b&searchfield=username&searchtype=c&o=id&d=asc&p=2&format=json"
        );
    }

    #[test]
    fn test_default_state_links_to_bare_prefix() {
        let state = RequestState::default();
        assert_eq!(state.href("/users"), "/users");
        assert_eq!(state.page_href("/users", 1), "/users?p=1");
    }

    #[test]
    fn test_for_record() {
        let state = RequestState::for_record("id", "7");
        assert_eq!(state.search_type, SearchType::Equals);
        assert_eq!(state.search_field.as_deref(), Some("id"));
        assert_eq!(state.query_text.as_deref(), Some("7"));
    }
}
