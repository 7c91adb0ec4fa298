use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

/// Weight used for tags that don't specify one.
pub const DEFAULT_TAG_WEIGHT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Stable identifier, e.g. `tag-money`. Tasks and aggregates reference tags by it.
    pub id: Arc<str>,
    pub name: Arc<str>,
    /// Opaque display token. Usually a css color.
    pub color: Arc<str>,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    DEFAULT_TAG_WEIGHT
}

impl Tag {
    pub fn new(id: &str, name: &str, color: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
            weight: DEFAULT_TAG_WEIGHT,
        }
    }

    pub fn with_weight(self, weight: u32) -> Self {
        Self { weight, ..self }
    }
}

/// Read-only catalog of tags. Cloning is cheap, the catalog itself is shared.
#[derive(Debug, Clone)]
pub struct TagRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    tags: Vec<Tag>,
    index: HashMap<Arc<str>, usize>,
}

impl TagRegistry {
    /// Builds a catalog keeping the given order. If an id repeats, the first definition wins.
    pub fn new(tags: impl IntoIterator<Item = Tag>) -> Self {
        let mut ordered = Vec::new();
        let mut index = HashMap::new();
        for tag in tags {
            if index.contains_key(&tag.id) {
                continue;
            }
            index.insert(tag.id.clone(), ordered.len());
            ordered.push(tag);
        }
        Self {
            inner: Arc::new(RegistryInner {
                tags: ordered,
                index,
            }),
        }
    }

    /// Every tag in a stable order.
    pub fn list(&self) -> &[Tag] {
        &self.inner.tags
    }

    /// Unknown ids resolve to `None`, callers are expected to filter them out.
    pub fn get(&self, id: &str) -> Option<&Tag> {
        self.inner.index.get(id).map(|&i| &self.inner.tags[i])
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new([
            Tag::new("tag-money", "money", "#22c55e"),
            Tag::new("tag-knowledge", "knowledge", "#3b82f6"),
            Tag::new("tag-branding", "branding", "#8b5cf6"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::{Tag, TagRegistry};

    #[test]
    fn default_catalog() {
        let registry = TagRegistry::default();
        let ids = registry
            .list()
            .iter()
            .map(|t| t.id.to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["tag-money", "tag-knowledge", "tag-branding"]);
        assert!(registry.list().iter().all(|t| t.weight == 1));
    }

    #[test]
    fn list_order_is_stable() {
        let registry = TagRegistry::default();
        assert_eq!(registry.list(), registry.list());
        assert_eq!(registry.clone().list(), registry.list());
    }

    #[test]
    fn unknown_tag_is_absent() {
        let registry = TagRegistry::default();
        assert!(registry.get("tag-money").is_some());
        assert!(registry.get("tag-unknown").is_none());
        assert!(registry.get("").is_none());
    }

    #[test]
    fn first_definition_wins() {
        let registry = TagRegistry::new([
            Tag::new("a", "first", "red").with_weight(3),
            Tag::new("b", "other", "blue"),
            Tag::new("a", "second", "green"),
        ]);
        assert_eq!(registry.list().len(), 2);
        let a = registry.get("a").unwrap();
        assert_eq!(&*a.name, "first");
        assert_eq!(a.weight, 3);
    }

    #[test]
    fn weight_defaults_when_missing() {
        let tag: Tag =
            serde_json::from_str(r#"{"id":"x","name":"x","color":"black"}"#).unwrap();
        assert_eq!(tag.weight, 1);
    }
}
