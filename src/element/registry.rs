// SPDX-License-Identifier: GPL-3.0-only

//! Element factory
//!
//! Maps stable keys such as `"VideoEncoder/rav1e"` to constructors. Hosts
//! and composite elements create their children through the registry, so a
//! test can register a replacement under the same key.

use super::Element;
use crate::errors::{PipelineError, PipelineResult};
use crate::media::encoders::{
    AAC_ENCODER_KEY, AV1_ENCODER_KEY, AacEncoder, Av1Encoder, OPUS_ENCODER_KEY, OpusEncoder,
};
use crate::media::filters::{FILL_AUDIO_GAPS_KEY, FPS_CONTROL_KEY, FillAudioGaps, FpsControl};
use crate::media::muxers::{WEBM_MUXER_KEY, WebmMuxer};
use crate::media::sync::{PACKET_SYNC_KEY, PacketSync};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Builds a fresh element
pub type ElementConstructor = fn() -> Arc<dyn Element>;

/// Key to constructor map
#[derive(Default)]
pub struct ElementRegistry {
    constructors: BTreeMap<String, ElementConstructor>,
}

impl ElementRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in element
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, ElementConstructor); 7] = [
            (PACKET_SYNC_KEY, packet_sync),
            (FILL_AUDIO_GAPS_KEY, fill_audio_gaps),
            (FPS_CONTROL_KEY, fps_control),
            (AAC_ENCODER_KEY, aac_encoder),
            (OPUS_ENCODER_KEY, opus_encoder),
            (AV1_ENCODER_KEY, av1_encoder),
            (WEBM_MUXER_KEY, webm_muxer),
        ];

        for (key, constructor) in builtins {
            if let Err(e) = registry.register(key, constructor) {
                warn!(key, error = %e, "Skipping built-in element");
            }
        }

        registry
    }

    /// Add a constructor. Keys are unique.
    pub fn register(&mut self, key: &str, constructor: ElementConstructor) -> PipelineResult<()> {
        if self.constructors.contains_key(key) {
            return Err(PipelineError::Registry(format!(
                "Element already registered: {}",
                key
            )));
        }

        debug!(key, "Registered element");
        self.constructors.insert(key.to_string(), constructor);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.constructors.contains_key(key)
    }

    /// Construct the element registered under `key`
    pub fn create(&self, key: &str) -> Option<Arc<dyn Element>> {
        match self.constructors.get(key) {
            Some(constructor) => Some(constructor()),
            None => {
                warn!(key, "No element registered under key");
                None
            }
        }
    }

    /// Construct and downcast to a concrete element type
    pub fn create_as<T: Element + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let element = self.create(key)?;

        match element.into_any().downcast::<T>() {
            Ok(element) => Some(element),
            Err(_) => {
                warn!(key, "Registered element has an unexpected type");
                None
            }
        }
    }

    /// Registered keys in sorted order
    pub fn keys(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}

fn packet_sync() -> Arc<dyn Element> {
    Arc::new(PacketSync::new())
}

fn fill_audio_gaps() -> Arc<dyn Element> {
    Arc::new(FillAudioGaps::new())
}

fn fps_control() -> Arc<dyn Element> {
    Arc::new(FpsControl::new())
}

fn aac_encoder() -> Arc<dyn Element> {
    AacEncoder::with_default_library()
}

fn opus_encoder() -> Arc<dyn Element> {
    OpusEncoder::with_default_library()
}

fn av1_encoder() -> Arc<dyn Element> {
    Av1Encoder::with_default_library()
}

fn webm_muxer() -> Arc<dyn Element> {
    WebmMuxer::new()
}

/// The process-wide registry with the built-in elements
pub fn global() -> &'static ElementRegistry {
    static REGISTRY: OnceLock<ElementRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ElementRegistry::with_defaults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementState;

    #[test]
    fn test_defaults_are_sorted() {
        let registry = ElementRegistry::with_defaults();
        let keys = registry.keys();

        assert_eq!(keys.len(), 7);
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(registry.contains("Utils/PacketSync"));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ElementRegistry::new();
        registry.register("Utils/PacketSync", packet_sync).unwrap();
        let err = registry
            .register("Utils/PacketSync", packet_sync)
            .unwrap_err();

        assert!(matches!(err, PipelineError::Registry(_)));
    }

    #[test]
    fn test_create_as_downcasts() {
        let registry = ElementRegistry::with_defaults();

        let control = registry.create_as::<FpsControl>(FPS_CONTROL_KEY).unwrap();
        assert_eq!(control.state(), ElementState::Null);
        assert!(registry.create_as::<PacketSync>(FPS_CONTROL_KEY).is_none());
        assert!(registry.create("Nope/Missing").is_none());
    }
}
