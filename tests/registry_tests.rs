// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the element registry

use camera_pipeline::element::registry::{self, ElementRegistry};
use camera_pipeline::media::encoders::{
    AAC_ENCODER_KEY, AV1_ENCODER_KEY, AacEncoder, Av1Encoder, OPUS_ENCODER_KEY, OpusEncoder,
};
use camera_pipeline::media::muxers::{VideoMuxer, WEBM_MUXER_KEY, WebmMuxer};
use camera_pipeline::media::sync::{PACKET_SYNC_KEY, PacketSync};
use camera_pipeline::{Element, ElementState};

#[test]
fn test_builtins_are_registered() {
    let registry = ElementRegistry::with_defaults();

    for key in [
        PACKET_SYNC_KEY,
        AAC_ENCODER_KEY,
        OPUS_ENCODER_KEY,
        AV1_ENCODER_KEY,
        WEBM_MUXER_KEY,
    ] {
        assert!(registry.contains(key), "{} missing", key);
    }
    assert_eq!(registry.keys().len(), 7);
}

#[test]
fn test_typed_creation() {
    let registry = registry::global();

    assert!(registry.create_as::<AacEncoder>(AAC_ENCODER_KEY).is_some());
    assert!(registry.create_as::<OpusEncoder>(OPUS_ENCODER_KEY).is_some());
    assert!(registry.create_as::<Av1Encoder>(AV1_ENCODER_KEY).is_some());
    assert!(registry.create_as::<PacketSync>(PACKET_SYNC_KEY).is_some());

    // Wrong type for the key
    assert!(registry.create_as::<OpusEncoder>(AAC_ENCODER_KEY).is_none());
    assert!(registry.create("Unknown/Element").is_none());
}

#[test]
fn test_instances_are_independent() {
    let registry = registry::global();
    let first = registry.create_as::<WebmMuxer>(WEBM_MUXER_KEY).unwrap();
    let second = registry.create_as::<WebmMuxer>(WEBM_MUXER_KEY).unwrap();

    first.set_location("/tmp/first.webm");
    assert_eq!(second.location(), "");
    assert_eq!(first.state(), ElementState::Null);
}
