// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use camera_pipeline::media::options::OptionValue;
use camera_pipeline::{Config, PipelineError};

#[test]
fn test_config_default() {
    // Test that default config can be created
    let config = Config::default();

    // Check sensible defaults
    assert_eq!(config.video_format, "webm");
    assert_eq!(config.video_codec, "av1");
    assert_eq!(config.audio_codec, "opus");
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from(&dir.path().join("missing.json")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.video_directory = dir.path().join("videos");
    config.record_audio = false;
    config.video_gop = 2000;
    config
        .muxer_options
        .insert("cuesBeforeClusters".to_string(), OptionValue::Boolean(true));

    config.save_to(&path).unwrap();
    let loaded = Config::load_from(&path).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "audio_codec": "aac" }"#).unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.audio_codec, "aac");
    assert_eq!(config.video_codec, "av1");
}

#[test]
fn test_corrupt_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        Config::load_from(&path),
        Err(PipelineError::Config(_))
    ));
}

#[test]
fn test_invalid_values_rejected_on_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let mut config = Config::default();
    config.audio_bitrate = 0;

    assert!(config.save_to(&path).is_err());
    assert!(!path.exists());
}
