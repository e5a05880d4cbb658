use crate::{KeySet, MetadataKey, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The broad class of a media record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// A container of other media (a directory, a feed, a playlist).
    Container,
    /// An audio item.
    Audio,
    /// A video item.
    Video,
    /// An image item.
    Image,
    /// Anything else.
    Generic,
}

/// A media data-transfer record.
///
/// Media records are produced by sources and flow through the result
/// pipeline to the user. Apart from its kind, its identifier and the source
/// stamp, a record is a bag of [`MetadataKey`] → [`Value`] pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    kind: MediaKind,
    id: Option<String>,
    source: Option<String>,
    values: BTreeMap<MetadataKey, Value>,
}

impl Media {
    /// Creates an empty record of the given kind.
    pub const fn new(kind: MediaKind) -> Self {
        Self { kind, id: None, source: None, values: BTreeMap::new() }
    }

    /// Creates an empty container record.
    pub const fn container() -> Self {
        Self::new(MediaKind::Container)
    }

    /// Creates an empty audio record.
    pub const fn audio() -> Self {
        Self::new(MediaKind::Audio)
    }

    /// Creates an empty video record.
    pub const fn video() -> Self {
        Self::new(MediaKind::Video)
    }

    /// Creates an empty image record.
    pub const fn image() -> Self {
        Self::new(MediaKind::Image)
    }

    /// Sets the source-local identifier, builder style.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The kind of this record.
    pub const fn kind(&self) -> MediaKind {
        self.kind
    }

    /// True if this record is a container.
    pub const fn is_container(&self) -> bool {
        matches!(self.kind, MediaKind::Container)
    }

    /// The source-local identifier.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Sets the source-local identifier.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// The id of the source this record came from.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Stamps the record with the id of the emitting source.
    ///
    /// Stamping is idempotent: a record that already carries a source keeps
    /// it, so re-stamping along the pipeline is a no-op.
    pub fn stamp_source(&mut self, source_id: &str) {
        if self.source.is_none() {
            self.source = Some(source_id.to_owned());
        }
    }

    /// Sets a metadata value.
    pub fn set(&mut self, key: MetadataKey, value: impl Into<Value>) {
        self.values.insert(key, value.into());
    }

    /// Sets a metadata value only when the key is still missing.
    ///
    /// Returns true if the value was taken. Enrichment stages use this so a
    /// late auxiliary answer never overwrites what the origin provided.
    pub fn set_if_missing(&mut self, key: MetadataKey, value: impl Into<Value>) -> bool {
        if self.values.contains_key(&key) {
            return false;
        }
        self.values.insert(key, value.into());
        true
    }

    /// The value stored under `key`.
    pub fn get(&self, key: MetadataKey) -> Option<&Value> {
        self.values.get(&key)
    }

    /// True if the record holds a value for `key`.
    pub fn has(&self, key: MetadataKey) -> bool {
        self.values.contains_key(&key)
    }

    /// The set of keys with a value on this record.
    pub fn keys(&self) -> KeySet {
        self.values.keys().copied().collect()
    }

    /// Of `requested`, the keys this record has no value for.
    pub fn missing(&self, requested: &KeySet) -> KeySet {
        requested.iter().filter(|k| !self.has(*k)).collect()
    }

    /// The title, if set.
    pub fn title(&self) -> Option<&str> {
        self.get(MetadataKey::TITLE).and_then(Value::as_str)
    }

    /// Sets the title.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.set(MetadataKey::TITLE, title.into());
    }

    /// Sets the title, builder style.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.set_title(title);
        self
    }

    /// The resource URL, if set.
    pub fn url(&self) -> Option<&str> {
        self.get(MetadataKey::URL).and_then(Value::as_str)
    }

    /// Sets the resource URL.
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.set(MetadataKey::URL, url.into());
    }

    /// Sets the resource URL, builder style.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.set_url(url);
        self
    }
}
