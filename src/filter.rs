//! Call title filtering
//!
//! `"identity and demo"` keeps titles containing every keyword;
//! `"empi,demo"` or `"empi demo"` keeps titles containing any keyword.
//! Matching is a case-insensitive substring test.

use std::str::FromStr;

/// Keyword filter applied to call titles during listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleFilter {
    /// Every keyword must appear
    All(Vec<String>),
    /// At least one keyword must appear
    Any(Vec<String>),
}

impl TitleFilter {
    /// Parse a filter expression; `None` when it holds no keywords
    pub fn parse(expr: &str) -> Option<Self> {
        let expr = expr.trim().to_lowercase();
        let filter = if expr.contains(" and ") {
            Self::All(
                expr.split(" and ")
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from)
                    .collect(),
            )
        } else {
            Self::Any(
                expr.replace(',', " ")
                    .split_whitespace()
                    .map(String::from)
                    .collect(),
            )
        };
        if filter.keywords().is_empty() {
            None
        } else {
            Some(filter)
        }
    }

    /// Keywords in the filter
    pub fn keywords(&self) -> &[String] {
        match self {
            Self::All(k) | Self::Any(k) => k,
        }
    }

    /// Whether a title passes the filter
    pub fn matches(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        match self {
            Self::All(keywords) => keywords.iter().all(|k| title.contains(k.as_str())),
            Self::Any(keywords) => keywords.iter().any(|k| title.contains(k.as_str())),
        }
    }
}

impl FromStr for TitleFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("title filter '{s}' contains no keywords"))
    }
}
