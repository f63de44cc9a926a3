//! Error taxonomy for the crawl.
//!
//! Every dropped job or item is attributable to exactly one variant of
//! [`ScrapeError`]. Document-level variants ([`ScrapeError::Fetch`],
//! [`ScrapeError::Parse`], [`ScrapeError::AmbiguousStructure`]) abort the job
//! that raised them; item-level variants ([`ScrapeError::IncompleteBroadcast`],
//! [`ScrapeError::DateResolution`]) only drop the one record under construction.
//! An ambiguity confined to one table row or listing section is item-level too.

use thiserror::Error;

/// Errors raised while fetching, parsing or assembling broadcasts.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Network or transport failure.
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// The document could not be turned into a tree at all.
    #[error("cannot parse {what}: {message}")]
    Parse { what: String, message: String },

    /// A node assumed to be unique matched more than once.
    #[error("ambiguous structure: expected at most one {what}, found {count}")]
    AmbiguousStructure { what: String, count: usize },

    /// A required Broadcast field could not be extracted.
    #[error("incomplete broadcast {source_hint}: missing {field}")]
    IncompleteBroadcast {
        field: &'static str,
        source_hint: String,
    },

    /// A date or time expression could not be resolved.
    #[error("cannot resolve date '{input}': {message}")]
    DateResolution { input: String, message: String },

    /// No station with that identifier in the registry.
    #[error("unknown station '{0}'")]
    UnknownStation(String),

    /// Invalid configuration.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl ScrapeError {
    /// Stable, short name of the taxonomy entry, used as a counter key.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Fetch { .. } => "fetch",
            ScrapeError::Parse { .. } => "parse",
            ScrapeError::AmbiguousStructure { .. } => "ambiguous_structure",
            ScrapeError::IncompleteBroadcast { .. } => "incomplete_broadcast",
            ScrapeError::DateResolution { .. } => "date_resolution",
            ScrapeError::UnknownStation(_) => "unknown_station",
            ScrapeError::Config { .. } => "config",
        }
    }

    pub(crate) fn date(input: impl Into<String>, message: impl Into<String>) -> Self {
        ScrapeError::DateResolution {
            input: input.into(),
            message: message.into(),
        }
    }

    pub(crate) fn ambiguous(what: impl Into<String>, count: usize) -> Self {
        ScrapeError::AmbiguousStructure {
            what: what.into(),
            count,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        ScrapeError::Config {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(e: reqwest::Error) -> Self {
        ScrapeError::Fetch {
            url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            message: e.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ScrapeError {
    fn from(e: serde_yaml::Error) -> Self {
        ScrapeError::config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(ScrapeError::ambiguous("<h2>", 2).kind(), "ambiguous_structure");
        assert_eq!(ScrapeError::date("Übermorgen", "unknown token").kind(), "date_resolution");
        assert_eq!(ScrapeError::UnknownStation("x".into()).kind(), "unknown_station");
    }

    #[test]
    fn test_display() {
        let e = ScrapeError::ambiguous("<meta name='author'>", 2);
        assert_eq!(
            e.to_string(),
            "ambiguous structure: expected at most one <meta name='author'>, found 2"
        );
    }
}
