// Validated Types
// Strongly-typed wrappers that enforce invariants at construction time.
// Identifiers, titles, search queries and share tokens cannot exist in an invalid state.

use anyhow::{ensure, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of random bytes behind every share token
pub const SHARE_TOKEN_BYTES: usize = 16;

/// A form ID that is guaranteed to be valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormId {
    inner: Uuid,
}

impl Default for FormId {
    fn default() -> Self {
        Self::new()
    }
}

impl FormId {
    /// Create a new form ID
    pub fn new() -> Self {
        Self {
            inner: Uuid::new_v4(),
        }
    }

    /// Create from existing UUID with validation
    pub fn from_uuid(id: Uuid) -> Result<Self> {
        ensure!(!id.is_nil(), "Form ID cannot be nil UUID");
        Ok(Self { inner: id })
    }

    /// Parse from string
    pub fn parse(s: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(s.trim())
            .map_err(|_| anyhow::anyhow!("Invalid form ID format: {s}"))?;
        Self::from_uuid(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.inner
    }
}

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// A question ID that is guaranteed to be valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId {
    inner: Uuid,
}

impl Default for QuestionId {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionId {
    pub fn new() -> Self {
        Self {
            inner: Uuid::new_v4(),
        }
    }

    pub fn from_uuid(id: Uuid) -> Result<Self> {
        ensure!(!id.is_nil(), "Question ID cannot be nil UUID");
        Ok(Self { inner: id })
    }

    pub fn parse(s: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(s.trim())
            .map_err(|_| anyhow::anyhow!("Invalid question ID format: {s}"))?;
        Self::from_uuid(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.inner
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// A response ID. Responses are only ever created server-side, so there is no parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId {
    inner: Uuid,
}

impl Default for ResponseId {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseId {
    pub fn new() -> Self {
        Self {
            inner: Uuid::new_v4(),
        }
    }

    pub fn from_uuid(id: Uuid) -> Result<Self> {
        ensure!(!id.is_nil(), "Response ID cannot be nil UUID");
        Ok(Self { inner: id })
    }

    pub fn as_uuid(&self) -> Uuid {
        self.inner
    }
}

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// A non-empty, trimmed text field (form title, description, question text)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatedText {
    inner: String,
}

impl ValidatedText {
    /// Create a new validated text value
    ///
    /// # Invariants
    /// - Non-empty after trimming
    pub fn new(field: &str, value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();

        ensure!(!trimmed.is_empty(), "{field} cannot be empty");

        Ok(Self {
            inner: trimmed.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn into_inner(self) -> String {
        self.inner
    }
}

impl fmt::Display for ValidatedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// A search query for case-insensitive substring matching over forms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSearchQuery {
    text: String,
    lowered: String,
}

impl ValidatedSearchQuery {
    /// Create a new validated search query
    ///
    /// # Invariants
    /// - Non-empty after trimming
    /// - Matched as given, surrounding whitespace included
    pub fn new(query: impl Into<String>) -> Result<Self> {
        let query = query.into();
        ensure!(!query.trim().is_empty(), "Search query is required");

        let lowered = query.to_lowercase();
        Ok(Self {
            text: query,
            lowered,
        })
    }

    /// Get the query text
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// True if `haystack` contains the query, ignoring case
    pub fn matches(&self, haystack: &str) -> bool {
        haystack.to_lowercase().contains(&self.lowered)
    }

    /// The query as a SQL `LIKE` pattern with `%`, `_` and `\` escaped
    pub fn like_pattern(&self) -> String {
        let mut escaped = String::with_capacity(self.text.len() + 2);
        escaped.push('%');
        for c in self.text.chars() {
            if matches!(c, '%' | '_' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped.push('%');
        escaped
    }
}

/// Opaque access token: 16 random bytes, lowercase hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareToken {
    inner: String,
}

impl ShareToken {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        let mut bytes = [0u8; SHARE_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            inner: hex::encode(bytes),
        }
    }

    /// Parse a token received from a client
    ///
    /// # Invariants
    /// - Exactly 32 hex characters
    /// - Stored lowercase
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        ensure!(
            s.len() == SHARE_TOKEN_BYTES * 2,
            "Token must be {} hex characters",
            SHARE_TOKEN_BYTES * 2
        );
        ensure!(
            s.chars().all(|c| c.is_ascii_hexdigit()),
            "Token must be hex encoded"
        );
        Ok(Self {
            inner: s.to_ascii_lowercase(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for ShareToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}
