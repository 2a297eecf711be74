// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the PipeWire device registry, driven by events

use camera_pipeline::backends::audio::monitor::{RegistryEvent, RegistrySource};
use camera_pipeline::backends::audio::{AudioDev, AudioDevEvent, Direction, PipeWireAudioDev};
use camera_pipeline::errors::DeviceError;
use camera_pipeline::media::caps::{AudioCaps, SampleFormat};
use tokio::sync::broadcast::error::TryRecvError;

fn added(id: u32, name: &str, class: &str, formats: Vec<AudioCaps>) -> RegistryEvent {
    RegistryEvent::DeviceAdded {
        id,
        node_name: name.to_string(),
        description: format!("{} description", name),
        media_class: class.to_string(),
        formats,
    }
}

#[test]
fn test_first_sink_becomes_default_once() {
    let dev = PipeWireAudioDev::new();
    let mut events = dev.subscribe();

    dev.apply(added(40, "speakers", "Audio/Sink", Vec::new()));

    assert_eq!(
        events.try_recv().unwrap(),
        AudioDevEvent::OutputsChanged(vec!["speakers".to_string()])
    );
    assert_eq!(
        events.try_recv().unwrap(),
        AudioDevEvent::DefaultOutputChanged("speakers".to_string())
    );
    assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
    assert_eq!(dev.default_output(), "speakers");

    // A second sink does not replace the default
    dev.apply(added(41, "headphones", "Audio/Sink", Vec::new()));
    assert_eq!(
        events.try_recv().unwrap(),
        AudioDevEvent::OutputsChanged(vec!["speakers".to_string(), "headphones".to_string()])
    );
    assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
    assert_eq!(dev.default_output(), "speakers");
}

#[test]
fn test_default_follows_metadata_and_removal() {
    let dev = PipeWireAudioDev::new();
    dev.apply(added(1, "mic", "Audio/Source", Vec::new()));
    dev.apply(added(2, "webcam-mic", "Audio/Source", Vec::new()));
    let mut events = dev.subscribe();

    dev.apply(RegistryEvent::DefaultChanged {
        direction: Direction::Input,
        node_name: "webcam-mic".to_string(),
    });
    assert_eq!(
        events.try_recv().unwrap(),
        AudioDevEvent::DefaultInputChanged("webcam-mic".to_string())
    );

    // Unknown devices are ignored
    dev.apply(RegistryEvent::DefaultChanged {
        direction: Direction::Input,
        node_name: "nothing".to_string(),
    });
    assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);

    dev.apply(RegistryEvent::DeviceRemoved { id: 2 });
    assert_eq!(
        events.try_recv().unwrap(),
        AudioDevEvent::InputsChanged(vec!["mic".to_string()])
    );
    assert_eq!(
        events.try_recv().unwrap(),
        AudioDevEvent::DefaultInputChanged("mic".to_string())
    );
    assert_eq!(dev.default_input(), "mic");
    assert_eq!(dev.description("webcam-mic"), "");
}

#[test]
fn test_preferred_format() {
    let dev = PipeWireAudioDev::new();
    let f32_only = vec![AudioCaps::interleaved(SampleFormat::F32, 2, 44100)];
    dev.apply(added(7, "mic", "Audio/Source", f32_only));
    dev.apply(added(8, "speakers", "Audio/Sink", Vec::new()));

    let mic = dev.preferred_format("mic");
    assert_eq!(mic.format, SampleFormat::F32);

    let speakers = dev.preferred_format("speakers");
    assert_eq!(speakers.format, SampleFormat::S16);
    assert_eq!(speakers.channels(), 2);
    assert_eq!(speakers.rate, 48000);

    assert!(dev.supported_sample_rates("speakers").contains(&48000));
}

#[test]
fn test_init_rejects_unknown_device() {
    let dev = PipeWireAudioDev::new();
    let caps = AudioCaps::interleaved(SampleFormat::S16, 1, 16000);

    assert_eq!(
        dev.init("missing", &caps).unwrap_err(),
        DeviceError::UnknownDevice("missing".to_string())
    );

    // Closing with nothing open is a no-op
    dev.uninit();
    assert!(dev.read().is_empty());
}

#[test]
fn test_monitor_output_feeds_registry() {
    let dump = r#"[
        {
            "id": 33,
            "type": "PipeWire:Interface:Node",
            "info": {
                "props": {
                    "node.name": "alsa_input.usb",
                    "node.description": "USB Microphone",
                    "media.class": "Audio/Source"
                },
                "params": {}
            }
        }
    ]"#;

    let dev = PipeWireAudioDev::new();
    let mut source = RegistrySource::new(dump.as_bytes());

    while let Some(events) = source.next_events() {
        for event in events.unwrap() {
            dev.apply(event);
        }
    }

    assert_eq!(dev.inputs(), vec!["alsa_input.usb".to_string()]);
    assert_eq!(dev.description("alsa_input.usb"), "USB Microphone");
    assert_eq!(dev.default_input(), "alsa_input.usb");
}
