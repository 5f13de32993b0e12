//! Instrument registry.
//!
//! The registry is the single owner of the mapping from layer to the backend
//! resource that plays it. Voices look the resource up by layer on every note
//! rather than caching it, so a hot-swap takes effect on the next note.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::{AudioBackend, ResourceId};
use crate::error::{Error, Result};
use crate::music::{Layer, LayerMap};
use crate::state::UNSET_INSTRUMENT;

/// Built-in instrument catalog used when the configuration does not list one.
pub const DEFAULT_CATALOG: &[&str] = &[
    "piano",
    "electric_piano",
    "vibraphone",
    "marimba",
    "celesta",
    "harp",
    "strings",
    "choir",
    "pad_warm",
    "pad_glass",
    "flute",
    "clarinet",
    "synth_bass",
    "cello",
    "bells",
];

#[derive(Clone, Debug, PartialEq)]
struct Binding {
    instrument_id: String,
    resource: ResourceId,
}

/// Binds at most one backend resource to each layer.
pub struct InstrumentRegistry {
    catalog: Vec<String>,
    backend: Arc<dyn AudioBackend>,
    bindings: Mutex<LayerMap<Option<Binding>>>,
}

impl InstrumentRegistry {
    pub fn new(catalog: Vec<String>, backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            catalog,
            backend,
            bindings: Mutex::new(LayerMap::from_fn(|_| None)),
        }
    }

    /// Known instrument ids, in rotation order.
    pub fn catalog(&self) -> &[String] {
        &self.catalog
    }

    pub fn is_known(&self, instrument_id: &str) -> bool {
        instrument_id == UNSET_INSTRUMENT || self.catalog.iter().any(|id| id == instrument_id)
    }

    /// Bind `instrument_id` to `layer`.
    ///
    /// No-op when the id is already bound. Otherwise the previous resource is
    /// released before the new one is loaded, so a layer never holds two.
    /// Binding [`UNSET_INSTRUMENT`] only releases. Returns whether anything
    /// changed.
    pub fn bind(&self, layer: Layer, instrument_id: &str) -> Result<bool> {
        if !self.is_known(instrument_id) {
            return Err(Error::UnknownInstrument {
                layer,
                instrument: instrument_id.to_string(),
            });
        }

        let mut bindings = self.lock();
        let current = bindings[layer]
            .as_ref()
            .map(|b| b.instrument_id.as_str())
            .unwrap_or(UNSET_INSTRUMENT);
        if current == instrument_id {
            return Ok(false);
        }

        if let Some(old) = bindings[layer].take() {
            if let Err(e) = self.backend.release_instrument(old.resource) {
                log::warn!(
                    "[INSTRUMENTS] Releasing '{}' on {} failed: {}",
                    old.instrument_id,
                    layer,
                    e
                );
            }
        }

        if instrument_id != UNSET_INSTRUMENT {
            let resource = self.backend.load_instrument(layer, instrument_id)?;
            bindings[layer] = Some(Binding {
                instrument_id: instrument_id.to_string(),
                resource,
            });
        }
        log::info!("[INSTRUMENTS] {} -> '{}'", layer, instrument_id);
        Ok(true)
    }

    /// Resource currently bound to `layer`.
    pub fn resource(&self, layer: Layer) -> Option<ResourceId> {
        self.lock()[layer].as_ref().map(|b| b.resource)
    }

    /// Instrument id currently bound to `layer`, or [`UNSET_INSTRUMENT`].
    pub fn bound(&self, layer: Layer) -> String {
        self.lock()[layer]
            .as_ref()
            .map(|b| b.instrument_id.clone())
            .unwrap_or_else(|| UNSET_INSTRUMENT.to_string())
    }

    /// Release every bound resource.
    pub fn release_all(&self) {
        for layer in Layer::ALL {
            if let Err(e) = self.bind(layer, UNSET_INSTRUMENT) {
                log::warn!("[INSTRUMENTS] Releasing {} failed: {}", layer, e);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, LayerMap<Option<Binding>>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for InstrumentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentRegistry")
            .field("catalog", &self.catalog.len())
            .field("bindings", &*self.lock())
            .finish_non_exhaustive()
    }
}

/// The built-in catalog as owned strings.
pub fn default_catalog() -> Vec<String> {
    DEFAULT_CATALOG.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, RecordingBackend};

    fn registry() -> (InstrumentRegistry, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::new());
        (
            InstrumentRegistry::new(default_catalog(), backend.clone()),
            backend,
        )
    }

    #[test]
    fn test_bind_same_id_is_noop() {
        let (registry, backend) = registry();
        assert!(registry.bind(Layer::Melody, "piano").unwrap());
        assert!(!registry.bind(Layer::Melody, "piano").unwrap());
        assert_eq!(backend.calls().len(), 1);
    }

    #[test]
    fn test_swap_releases_before_loading() {
        let (registry, backend) = registry();
        registry.bind(Layer::Harmony, "strings").unwrap();
        let first = registry.resource(Layer::Harmony).unwrap();
        registry.bind(Layer::Harmony, "choir").unwrap();

        let calls = backend.calls();
        assert_eq!(calls[1], BackendCall::Release(first));
        assert!(matches!(calls[2], BackendCall::Load { .. }));
        assert_eq!(registry.bound(Layer::Harmony), "choir");
    }

    #[test]
    fn test_at_most_one_resource_per_layer() {
        let (registry, backend) = registry();
        for id in ["piano", "harp", "piano", "flute", UNSET_INSTRUMENT, "bells", "bells"] {
            registry.bind(Layer::Melody, id).unwrap();
            assert!(backend.live_resources(Layer::Melody) <= 1);
        }
        assert_eq!(backend.live_resources(Layer::Melody), 1);
        registry.release_all();
        assert_eq!(backend.live_resources(Layer::Melody), 0);
        assert_eq!(registry.resource(Layer::Melody), None);
    }

    #[test]
    fn test_unknown_instrument_keeps_previous() {
        let (registry, _backend) = registry();
        registry.bind(Layer::Background, "cello").unwrap();
        let err = registry.bind(Layer::Background, "kazoo").unwrap_err();
        assert!(matches!(err, Error::UnknownInstrument { .. }));
        assert_eq!(registry.bound(Layer::Background), "cello");
    }
}
