use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of a metadata field on a media record.
///
/// Keys are interned: the well-known system keys are associated constants,
/// additional keys can be minted through [`KeyRegistry::register`].
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MetadataKey(u16);

impl MetadataKey {
    /// Unique identifier of the media within its source.
    pub const ID: Self = Self(0);
    /// Human-readable title.
    pub const TITLE: Self = Self(1);
    /// Location of the media resource.
    pub const URL: Self = Self(2);
    /// MIME type of the resource.
    pub const MIME: Self = Self(3);
    /// Main performer.
    pub const ARTIST: Self = Self(4);
    /// Album the media belongs to.
    pub const ALBUM: Self = Self(5);
    /// Genre label.
    pub const GENRE: Self = Self(6);
    /// Playback duration in seconds.
    pub const DURATION: Self = Self(7);
    /// Location of a thumbnail image.
    pub const THUMBNAIL: Self = Self(8);
    /// Free-form description.
    pub const DESCRIPTION: Self = Self(9);
    /// User rating, 0.0 to 5.0.
    pub const RATING: Self = Self(10);
    /// Number of children of a container.
    pub const CHILD_COUNT: Self = Self(11);

    pub(crate) const SYSTEM_KEY_COUNT: u16 = 12;

    /// The raw interned index of this key.
    pub const fn index(self) -> u16 {
        self.0
    }
}

/// An ordered set of metadata keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeySet(BTreeSet<MetadataKey>);

impl KeySet {
    /// Creates an empty key set.
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Creates a set from a slice of keys.
    pub fn of(keys: &[MetadataKey]) -> Self {
        Self(keys.iter().copied().collect())
    }

    /// Adds a key, returning true if it was not present.
    pub fn insert(&mut self, key: MetadataKey) -> bool {
        self.0.insert(key)
    }

    /// Removes a key, returning true if it was present.
    pub fn remove(&mut self, key: MetadataKey) -> bool {
        self.0.remove(&key)
    }

    /// True if the set contains `key`.
    pub fn contains(&self, key: MetadataKey) -> bool {
        self.0.contains(&key)
    }

    /// Number of keys in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the keys in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = MetadataKey> + '_ {
        self.0.iter().copied()
    }

    /// The keys of `self` that are not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        Self(self.0.difference(&other.0).copied().collect())
    }

    /// The union of `self` and `other`.
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    /// True if `self` and `other` share at least one key.
    pub fn intersects(&self, other: &Self) -> bool {
        self.0.intersection(&other.0).next().is_some()
    }
}

impl FromIterator<MetadataKey> for KeySet {
    fn from_iter<I: IntoIterator<Item = MetadataKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

struct KeyDef {
    name: String,
    slow: bool,
    dependencies: Vec<MetadataKey>,
}

/// Registry of metadata-key definitions.
///
/// Holds, for every known key, its name, whether resolving it is considered
/// slow by default, and the keys it depends on. The dependency lists drive
/// [`KeyRegistry::expand`], which closes a requested key set over everything
/// needed to resolve it (used by full-resolution operations).
pub struct KeyRegistry {
    defs: Vec<KeyDef>,
}

impl std::fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRegistry").field("keys", &self.defs.len()).finish()
    }
}

impl KeyRegistry {
    /// Creates a registry pre-populated with the system keys.
    pub fn system() -> Self {
        let mut registry = Self { defs: Vec::new() };
        registry.define("id", false, &[]);
        registry.define("title", false, &[]);
        registry.define("url", false, &[]);
        registry.define("mime", false, &[MetadataKey::URL]);
        registry.define("artist", false, &[]);
        registry.define("album", false, &[MetadataKey::ARTIST]);
        registry.define("genre", false, &[]);
        registry.define("duration", false, &[]);
        registry.define("thumbnail", true, &[MetadataKey::URL]);
        registry.define("description", true, &[MetadataKey::TITLE]);
        registry.define("rating", true, &[]);
        registry.define("child-count", false, &[]);
        debug_assert_eq!(registry.defs.len(), MetadataKey::SYSTEM_KEY_COUNT as usize);
        registry
    }

    fn define(&mut self, name: &str, slow: bool, dependencies: &[MetadataKey]) -> MetadataKey {
        let key = MetadataKey(self.defs.len() as u16);
        self.defs.push(KeyDef {
            name: name.to_owned(),
            slow,
            dependencies: dependencies.to_vec(),
        });
        key
    }

    /// Registers a new key and returns its identifier.
    pub fn register(
        &mut self,
        name: &str,
        slow: bool,
        dependencies: &[MetadataKey],
    ) -> MetadataKey {
        self.define(name, slow, dependencies)
    }

    /// The name of `key`, if registered.
    pub fn name(&self, key: MetadataKey) -> Option<&str> {
        self.defs.get(key.0 as usize).map(|d| d.name.as_str())
    }

    /// Looks a key up by name.
    pub fn by_name(&self, name: &str) -> Option<MetadataKey> {
        self.defs.iter().position(|d| d.name == name).map(|i| MetadataKey(i as u16))
    }

    /// True if resolving `key` is considered slow by default.
    pub fn is_slow(&self, key: MetadataKey) -> bool {
        self.defs.get(key.0 as usize).is_some_and(|d| d.slow)
    }

    /// The keys `key` depends on.
    pub fn dependencies(&self, key: MetadataKey) -> &[MetadataKey] {
        self.defs.get(key.0 as usize).map(|d| d.dependencies.as_slice()).unwrap_or(&[])
    }

    /// Drops the keys that are slow to resolve.
    pub fn filter_fast(&self, keys: &KeySet) -> KeySet {
        keys.iter().filter(|k| !self.is_slow(*k)).collect()
    }

    /// Closes `keys` over the dependency relation.
    ///
    /// The result contains every requested key plus, transitively, the keys
    /// needed to resolve them.
    pub fn expand(&self, keys: &KeySet) -> KeySet {
        let mut expanded = keys.clone();
        let mut frontier: Vec<MetadataKey> = keys.iter().collect();
        while let Some(key) = frontier.pop() {
            for dep in self.dependencies(key) {
                if expanded.insert(*dep) {
                    frontier.push(*dep);
                }
            }
        }
        expanded
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_keys_resolve_by_name() {
        let registry = KeyRegistry::system();
        assert_eq!(registry.by_name("title"), Some(MetadataKey::TITLE));
        assert_eq!(registry.name(MetadataKey::THUMBNAIL), Some("thumbnail"));
        assert_eq!(registry.by_name("no-such-key"), None);
    }

    #[test]
    fn registered_keys_extend_the_system_set() {
        let mut registry = KeyRegistry::system();
        let lyrics = registry.register("lyrics", true, &[MetadataKey::TITLE]);
        assert_eq!(registry.name(lyrics), Some("lyrics"));
        assert!(registry.is_slow(lyrics));
        assert_eq!(registry.dependencies(lyrics), &[MetadataKey::TITLE]);
    }

    #[test]
    fn expand_closes_over_dependencies() {
        let registry = KeyRegistry::system();
        let keys = KeySet::of(&[MetadataKey::THUMBNAIL]);
        let expanded = registry.expand(&keys);
        assert!(expanded.contains(MetadataKey::THUMBNAIL));
        assert!(expanded.contains(MetadataKey::URL));
    }

    #[test]
    fn expand_follows_chains() {
        let mut registry = KeyRegistry::system();
        let a = registry.register("a", false, &[MetadataKey::ALBUM]);
        let keys = registry.expand(&KeySet::of(&[a]));
        // album depends on artist, so the closure pulls both in
        assert!(keys.contains(MetadataKey::ALBUM));
        assert!(keys.contains(MetadataKey::ARTIST));
    }

    #[test]
    fn filter_fast_drops_slow_keys() {
        let registry = KeyRegistry::system();
        let keys = KeySet::of(&[MetadataKey::TITLE, MetadataKey::THUMBNAIL]);
        let fast = registry.filter_fast(&keys);
        assert!(fast.contains(MetadataKey::TITLE));
        assert!(!fast.contains(MetadataKey::THUMBNAIL));
    }

    #[test]
    fn key_set_operations() {
        let a = KeySet::of(&[MetadataKey::TITLE, MetadataKey::URL]);
        let b = KeySet::of(&[MetadataKey::URL, MetadataKey::ARTIST]);
        assert!(a.intersects(&b));
        assert_eq!(a.difference(&b), KeySet::of(&[MetadataKey::TITLE]));
        assert_eq!(a.union(&b).len(), 3);
    }
}
