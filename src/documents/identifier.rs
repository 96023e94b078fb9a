//! CELEX identifier resolution
//!
//! A CELEX number is the sector (digit, `C` or `E`), a four-digit year, a
//! one- or two-letter document type and a sequence number, optionally
//! followed by a corrigendum suffix, e.g. `32019L0790` or `32003L0088R(01)`.

use crate::search::Record;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    static ref CELEX: Regex = Regex::new(
        r"(?i)(?:^|[^0-9A-Z]|%3A)([0-9CE][0-9]{4}[A-Z]{1,2}[0-9]{4,}(?:R?\([0-9]{1,2}\))?)(?:$|[^0-9A-Z])"
    )
    .expect("CELEX regex is valid");
}

/// Canonical EUR-Lex document number
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CelexId(String);

impl CelexId {
    /// Finds the first CELEX number inside `text`
    ///
    /// Matching is case-insensitive; the result is upper-cased.
    ///
    /// # Example
    ///
    /// ```
    /// use lex_harvest::documents::CelexId;
    ///
    /// let id = CelexId::find("CELEX:32019l0790").unwrap();
    /// assert_eq!(id.as_str(), "32019L0790");
    /// assert!(CelexId::find("Besluit 2019/790").is_none());
    /// ```
    pub fn find(text: &str) -> Option<Self> {
        CELEX
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| Self(m.as_str().to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CelexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derives the document identifier of a search record
///
/// Returns None for a missing or malformed reference; such records are
/// skipped for good.
pub fn resolve(record: &Record) -> Option<CelexId> {
    record.reference.as_deref().and_then(CelexId::find)
}
