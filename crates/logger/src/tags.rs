//! Immutable, ordered tag context inherited by child loggers

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// Ordered sequence of tags. Extending never mutates the receiver and
/// repeated tags are kept.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TagContext {
    tags: Arc<[String]>,
}

impl TagContext {
    /// Empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `self ++ tags`. An empty extension shares the existing
    /// allocation.
    #[must_use]
    pub fn extend<I, S>(&self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = tags.into_iter().map(Into::into).peekable();
        if added.peek().is_none() {
            return self.clone();
        }

        let tags: Vec<String> = self.tags.iter().cloned().chain(added).collect();
        Self { tags: tags.into() }
    }

    /// Tags in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.tags
    }

    /// Iterates tags in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Number of tags, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// True if there are no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// True if both contexts share the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tags, &other.tags)
    }

    /// JSON array form used by the persisted schema.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(&*self.tags).unwrap_or_else(|_| "[]".to_string())
    }
}

impl Default for TagContext {
    fn default() -> Self {
        Self {
            tags: Arc::from(Vec::new()),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for TagContext {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new().extend(iter)
    }
}

impl fmt::Debug for TagContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tags.iter()).finish()
    }
}

impl Serialize for TagContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.tags.as_ref().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_appends_without_mutating_parent() {
        let parent = TagContext::new().extend(["a"]);
        let child = parent.extend(["b", "c"]);

        assert_eq!(parent.as_slice(), ["a"]);
        assert_eq!(child.as_slice(), ["a", "b", "c"]);
    }

    #[test]
    fn duplicates_are_preserved() {
        let ctx = TagContext::new().extend(["x"]).extend(["x"]);
        assert_eq!(ctx.as_slice(), ["x", "x"]);
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn empty_extension_shares_allocation() {
        let ctx = TagContext::new().extend(["a", "b"]);
        let same = ctx.extend(Vec::<String>::new());
        assert!(ctx.ptr_eq(&same));
        assert_eq!(ctx, same);
    }

    #[test]
    fn serializes_as_ordered_json_array() {
        let ctx: TagContext = ["tag1", "tag2", "tag1"].into_iter().collect();
        assert_eq!(ctx.to_json(), r#"["tag1","tag2","tag1"]"#);
    }
}
