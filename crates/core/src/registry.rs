use crate::source::{Caps, MediaHandle, Source};
use medley_types::KeySet;
use std::rc::Rc;
use tracing::debug;

/// The set of registered sources.
///
/// Owned by the framework handle; there is no global registry. Sources keep
/// their registration order, which is the unranked enumeration order.
#[derive(Default)]
pub(crate) struct SourceRegistry {
    sources: Vec<Rc<dyn Source>>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.sources.iter().map(|s| s.id()).collect();
        f.debug_struct("SourceRegistry").field("sources", &ids).finish()
    }
}

impl SourceRegistry {
    /// Registers a source, replacing any previous source with the same id.
    pub(crate) fn register(&mut self, source: Rc<dyn Source>) {
        debug!(source = source.id(), "registering source");
        match self.sources.iter().position(|s| s.id() == source.id()) {
            Some(index) => self.sources[index] = source,
            None => self.sources.push(source),
        }
    }

    /// Removes and returns the source with the given id.
    pub(crate) fn unregister(&mut self, id: &str) -> Option<Rc<dyn Source>> {
        let index = self.sources.iter().position(|s| s.id() == id)?;
        debug!(source = id, "unregistering source");
        Some(self.sources.remove(index))
    }

    /// The source with the given id.
    pub(crate) fn get(&self, id: &str) -> Option<Rc<dyn Source>> {
        self.sources.iter().find(|s| s.id() == id).cloned()
    }

    /// All sources advertising every capability in `caps`.
    ///
    /// With `ranked` the result is ordered by descending rank, otherwise by
    /// registration order.
    pub(crate) fn by_capability(&self, caps: Caps, ranked: bool) -> Vec<Rc<dyn Source>> {
        let mut matching: Vec<Rc<dyn Source>> =
            self.sources.iter().filter(|s| s.caps().contains(caps)).cloned().collect();
        if ranked {
            matching.sort_by_key(|s| std::cmp::Reverse(s.rank()));
        }
        matching
    }

    /// The resolve-capable sources that can fill keys still missing on
    /// `media`, best ranked first. The originating source is excluded; so
    /// are sources whose supported keys don't overlap the gaps.
    pub(crate) fn additional_sources_for(
        &self,
        origin_id: &str,
        media: &MediaHandle,
        keys: &KeySet,
    ) -> Vec<Rc<dyn Source>> {
        let missing = media.borrow().missing(keys);
        if missing.is_empty() {
            return Vec::new();
        }
        self.by_capability(Caps::RESOLVE, true)
            .into_iter()
            .filter(|s| s.id() != origin_id)
            .filter(|s| s.supported_keys().intersects(&missing))
            .collect()
    }
}
