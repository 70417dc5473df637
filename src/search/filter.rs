//! Tag predicate builder for scoping search requests.

/// Tag carrying the chat identifier every request is scoped to.
pub const CHAT_TAG: &str = "chatid";
/// Tag carrying the optional named-memory scope.
pub const MEMORY_TAG: &str = "memory";

/// Required tag predicates for one search request.
///
/// Semantics are logical AND: a candidate matches only when every pair is
/// present on it. Filters are pure value objects; equal tag sets are
/// interchangeable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pairs: Vec<(String, String)>,
}

impl SearchFilter {
    /// Create an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard request filter: always scoped to a chat, and to a
    /// named memory only when `memory_name` is non-blank.
    pub fn for_chat(chat_id: &str, memory_name: Option<&str>) -> Self {
        let mut filter = Self::new();
        filter.by_tag(CHAT_TAG, chat_id);
        if let Some(name) = memory_name {
            let trimmed = name.trim();
            if !trimmed.is_empty() {
                filter.by_tag(MEMORY_TAG, trimmed);
            }
        }
        filter
    }

    /// Add a required `tag = value` predicate. Duplicate pairs are collapsed.
    pub fn by_tag(&mut self, name: &str, value: &str) {
        let pair = (name.to_string(), value.to_string());
        if !self.pairs.contains(&pair) {
            self.pairs.push(pair);
        }
    }

    /// Required tag pairs in insertion order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// True when no predicate has been added.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
