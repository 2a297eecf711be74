// SPDX-License-Identifier: GPL-3.0-only

//! PipeWire audio device
//!
//! Devices are keyed by node name. The registry is filled from
//! [`RegistryEvent`]s, either by the `pw-dump` monitor thread or directly
//! through [`PipeWireAudioDev::apply`].

use super::monitor::{RegistryEvent, RegistrySource, spawn_pw_dump};
use super::stream::AudioStream;
use super::{AudioDev, AudioDevEvent, COMMON_SAMPLE_RATES, DEFAULT_LATENCY_MS, Direction, EVENT_CAPACITY};
use crate::element::lock;
use crate::element::worker::{LoopAction, Worker};
use crate::errors::DeviceError;
use crate::media::caps::{AudioCaps, ChannelLayout, SampleFormat};
use crate::media::packet::Packet;
use std::collections::BTreeMap;
use std::process::Child;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const SUPPORTED_CLASSES: &[&str] = &[
    "Stream/Output/Audio",
    "Stream/Input/Audio/Internal",
    "Audio/Source",
    "Audio/Sink",
];

const SINK_CLASS: &str = "Audio/Sink";
const SOURCE_CLASS: &str = "Audio/Source";

#[derive(Debug, Default)]
struct DeviceMap {
    /// Node id to node name, in id order
    sinks: BTreeMap<u32, String>,
    sources: BTreeMap<u32, String>,
    descriptions: BTreeMap<String, String>,
    formats: BTreeMap<String, Vec<AudioCaps>>,
    default_sink: String,
    default_source: String,
}

impl DeviceMap {
    fn is_sink(&self, device: &str) -> bool {
        self.sinks.values().any(|name| name == device)
    }

    fn is_source(&self, device: &str) -> bool {
        self.sources.values().any(|name| name == device)
    }

    fn first(map: &BTreeMap<u32, String>) -> String {
        map.values().next().cloned().unwrap_or_default()
    }
}

/// Device state shared with the monitor thread
struct DeviceRegistry {
    devices: Mutex<DeviceMap>,
    events: broadcast::Sender<AudioDevEvent>,
}

impl DeviceRegistry {
    fn notify(&self, event: AudioDevEvent) {
        // No receivers is not an error
        let _ = self.events.send(event);
    }

    fn apply(&self, event: RegistryEvent) {
        match event {
            RegistryEvent::DeviceAdded {
                id,
                node_name,
                description,
                media_class,
                formats,
            } => self.device_added(id, &node_name, &description, &media_class, formats),
            RegistryEvent::DeviceRemoved { id } => self.device_removed(id),
            RegistryEvent::FormatsChanged { id, formats } => {
                let mut devices = lock(&self.devices);
                let name = devices
                    .sinks
                    .get(&id)
                    .or_else(|| devices.sources.get(&id))
                    .cloned();

                if let Some(name) = name {
                    devices.formats.insert(name, formats);
                }
            }
            RegistryEvent::DefaultChanged {
                direction,
                node_name,
            } => self.default_changed(direction, &node_name),
        }
    }

    fn device_added(
        &self,
        id: u32,
        node_name: &str,
        description: &str,
        media_class: &str,
        formats: Vec<AudioCaps>,
    ) {
        if !SUPPORTED_CLASSES.contains(&media_class) {
            return;
        }

        let mut pending = Vec::new();

        {
            let mut devices = lock(&self.devices);
            let is_sink = media_class == SINK_CLASS;

            if is_sink {
                devices.sinks.insert(id, node_name.to_string());
                pending.push(AudioDevEvent::OutputsChanged(devices.sinks.values().cloned().collect()));
            } else {
                devices.sources.insert(id, node_name.to_string());
                pending.push(AudioDevEvent::InputsChanged(devices.sources.values().cloned().collect()));
            }

            devices
                .descriptions
                .insert(node_name.to_string(), description.to_string());
            devices.formats.insert(node_name.to_string(), formats);

            if devices.default_source.is_empty() && media_class == SOURCE_CLASS {
                devices.default_source = node_name.to_string();
                pending.push(AudioDevEvent::DefaultInputChanged(node_name.to_string()));
            }

            if devices.default_sink.is_empty() && is_sink {
                devices.default_sink = node_name.to_string();
                pending.push(AudioDevEvent::DefaultOutputChanged(node_name.to_string()));
            }
        }

        debug!(id, node_name, media_class, "Audio device added");

        for event in pending {
            self.notify(event);
        }
    }

    fn device_removed(&self, id: u32) {
        let mut pending = Vec::new();

        {
            let mut devices = lock(&self.devices);

            let (name, is_sink) = if let Some(name) = devices.sinks.remove(&id) {
                (name, true)
            } else if let Some(name) = devices.sources.remove(&id) {
                (name, false)
            } else {
                return;
            };

            devices.descriptions.remove(&name);
            devices.formats.remove(&name);

            if is_sink {
                pending.push(AudioDevEvent::OutputsChanged(devices.sinks.values().cloned().collect()));
            } else {
                pending.push(AudioDevEvent::InputsChanged(devices.sources.values().cloned().collect()));
            }

            if devices.default_source == name {
                devices.default_source = DeviceMap::first(&devices.sources);
                pending.push(AudioDevEvent::DefaultInputChanged(devices.default_source.clone()));
            }

            if devices.default_sink == name {
                devices.default_sink = DeviceMap::first(&devices.sinks);
                pending.push(AudioDevEvent::DefaultOutputChanged(devices.default_sink.clone()));
            }

            debug!(id, node_name = %name, "Audio device removed");
        }

        for event in pending {
            self.notify(event);
        }
    }

    fn default_changed(&self, direction: Direction, node_name: &str) {
        let event = {
            let mut devices = lock(&self.devices);

            match direction {
                Direction::Input => {
                    if !devices.is_source(node_name) || devices.default_source == node_name {
                        return;
                    }

                    devices.default_source = node_name.to_string();
                    AudioDevEvent::DefaultInputChanged(node_name.to_string())
                }
                Direction::Output => {
                    if !devices.is_sink(node_name) || devices.default_sink == node_name {
                        return;
                    }

                    devices.default_sink = node_name.to_string();
                    AudioDevEvent::DefaultOutputChanged(node_name.to_string())
                }
            }
        };

        debug!(direction = %direction, node_name, "Default audio device changed");
        self.notify(event);
    }
}

struct Monitor {
    child: Child,
    worker: Worker,
}

/// Audio device family backed by PipeWire
pub struct PipeWireAudioDev {
    registry: Arc<DeviceRegistry>,
    latency: AtomicU32,
    stream: Mutex<Option<AudioStream>>,
    monitor: Mutex<Option<Monitor>>,
}

impl Default for PipeWireAudioDev {
    fn default() -> Self {
        Self::new()
    }
}

impl PipeWireAudioDev {
    /// An empty device registry; call [`Self::start_monitor`] to fill it
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            registry: Arc::new(DeviceRegistry {
                devices: Mutex::new(DeviceMap::default()),
                events,
            }),
            latency: AtomicU32::new(DEFAULT_LATENCY_MS),
            stream: Mutex::new(None),
            monitor: Mutex::new(None),
        }
    }

    /// Apply one registry change
    pub fn apply(&self, event: RegistryEvent) {
        self.registry.apply(event);
    }

    /// Follow the PipeWire registry on a background thread
    pub fn start_monitor(&self) -> Result<(), DeviceError> {
        let mut monitor = lock(&self.monitor);

        if monitor.is_some() {
            return Ok(());
        }

        let (child, stdout) = spawn_pw_dump()?;
        let registry = Arc::clone(&self.registry);

        let worker = Worker::start_with_init(
            "pipewire-audio-monitor",
            move || Ok(RegistrySource::new(stdout)),
            move |source| match source.next_events() {
                Some(Ok(events)) => {
                    for event in events {
                        registry.apply(event);
                    }

                    LoopAction::Continue
                }
                Some(Err(e)) => {
                    error!(error = %e, "PipeWire monitor stopped");
                    LoopAction::Stop
                }
                None => {
                    debug!("PipeWire monitor output ended");
                    LoopAction::Stop
                }
            },
        );

        info!("PipeWire audio monitor started");
        *monitor = Some(Monitor { child, worker });

        Ok(())
    }

    /// Kill `pw-dump` and join the monitor thread
    pub fn stop_monitor(&self) {
        let Some(mut monitor) = lock(&self.monitor).take() else {
            return;
        };

        monitor.worker.request_stop();

        // The worker is blocked on the pipe; closing it ends the read
        if let Err(e) = monitor.child.kill() {
            warn!(error = %e, "Failed to stop pw-dump");
        }

        let _ = monitor.child.wait();
        monitor.worker.join();
        debug!("PipeWire audio monitor stopped");
    }

    fn device_formats(&self, device: &str) -> Vec<AudioCaps> {
        lock(&self.registry.devices)
            .formats
            .get(device)
            .cloned()
            .unwrap_or_default()
    }
}

impl AudioDev for PipeWireAudioDev {
    fn name(&self) -> &str {
        "pipewire"
    }

    fn default_input(&self) -> String {
        let devices = lock(&self.registry.devices);

        if devices.default_source.is_empty() {
            DeviceMap::first(&devices.sources)
        } else {
            devices.default_source.clone()
        }
    }

    fn default_output(&self) -> String {
        let devices = lock(&self.registry.devices);

        if devices.default_sink.is_empty() {
            DeviceMap::first(&devices.sinks)
        } else {
            devices.default_sink.clone()
        }
    }

    fn inputs(&self) -> Vec<String> {
        lock(&self.registry.devices).sources.values().cloned().collect()
    }

    fn outputs(&self) -> Vec<String> {
        lock(&self.registry.devices).sinks.values().cloned().collect()
    }

    fn description(&self, device: &str) -> String {
        lock(&self.registry.devices)
            .descriptions
            .get(device)
            .cloned()
            .unwrap_or_default()
    }

    fn preferred_format(&self, device: &str) -> AudioCaps {
        let formats = self.supported_formats(device);
        let layouts = self.supported_layouts(device);

        let format = if formats.is_empty() || formats.contains(&SampleFormat::S16) {
            SampleFormat::S16
        } else {
            formats[0]
        };

        let pick = |wanted: ChannelLayout| {
            if layouts.is_empty() || layouts.contains(&wanted) {
                wanted
            } else {
                layouts[0]
            }
        };

        let devices = lock(&self.registry.devices);

        if devices.is_sink(device) {
            AudioCaps::new(format, pick(ChannelLayout::Stereo), false, 48000)
        } else if devices.is_source(device) {
            AudioCaps::new(format, pick(ChannelLayout::Mono), false, 8000)
        } else {
            AudioCaps::default()
        }
    }

    fn supported_formats(&self, device: &str) -> Vec<SampleFormat> {
        let mut formats = Vec::new();

        for caps in self.device_formats(device) {
            if !formats.contains(&caps.format) {
                formats.push(caps.format);
            }
        }

        formats
    }

    fn supported_layouts(&self, device: &str) -> Vec<ChannelLayout> {
        let mut layouts = Vec::new();

        for caps in self.device_formats(device) {
            if !layouts.contains(&caps.layout) {
                layouts.push(caps.layout);
            }
        }

        layouts
    }

    fn supported_sample_rates(&self, _device: &str) -> Vec<u32> {
        COMMON_SAMPLE_RATES.to_vec()
    }

    fn latency(&self) -> u32 {
        self.latency.load(Ordering::SeqCst)
    }

    fn set_latency(&self, latency: u32) {
        self.latency.store(latency.max(1), Ordering::SeqCst);
    }

    fn init(&self, device: &str, caps: &AudioCaps) -> Result<(), DeviceError> {
        self.uninit();

        if !caps.is_valid() {
            return Err(DeviceError::StreamFailed(format!("Invalid format {}", caps)));
        }

        let direction = {
            let devices = lock(&self.registry.devices);

            if devices.is_source(device) {
                Direction::Input
            } else if devices.is_sink(device) {
                Direction::Output
            } else {
                return Err(DeviceError::UnknownDevice(device.to_string()));
            }
        };

        let stream = AudioStream::open(device, direction, *caps, self.latency())
            .inspect_err(|e| error!(device, error = %e, "Failed to open audio stream"))?;
        *lock(&self.stream) = Some(stream);

        Ok(())
    }

    fn read(&self) -> Packet {
        match lock(&self.stream).as_ref() {
            Some(stream) if stream.direction() == Direction::Input => stream.read(),
            _ => Packet::default(),
        }
    }

    fn write(&self, packet: &Packet) -> Result<(), DeviceError> {
        if packet.is_empty() {
            return Err(DeviceError::EmptyPacket);
        }

        match lock(&self.stream).as_ref() {
            Some(stream) if stream.direction() == Direction::Output => stream.write(packet),
            _ => Err(DeviceError::NotInitialized),
        }
    }

    fn uninit(&self) {
        let stream = lock(&self.stream).take();

        if let Some(mut stream) = stream {
            stream.close();
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AudioDevEvent> {
        self.registry.events.subscribe()
    }
}

impl Drop for PipeWireAudioDev {
    fn drop(&mut self) {
        self.uninit();
        self.stop_monitor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn added(id: u32, name: &str, class: &str) -> RegistryEvent {
        RegistryEvent::DeviceAdded {
            id,
            node_name: name.to_string(),
            description: format!("{} device", name),
            media_class: class.to_string(),
            formats: Vec::new(),
        }
    }

    #[test]
    fn test_first_source_becomes_default() {
        let dev = PipeWireAudioDev::new();
        let mut events = dev.subscribe();

        dev.apply(added(5, "mic", "Audio/Source"));

        assert_eq!(events.try_recv().unwrap(), AudioDevEvent::InputsChanged(vec!["mic".into()]));
        assert_eq!(events.try_recv().unwrap(), AudioDevEvent::DefaultInputChanged("mic".into()));
        assert_eq!(dev.default_input(), "mic");
        assert_eq!(dev.description("mic"), "mic device");
    }

    #[test]
    fn test_stream_class_is_input_without_default() {
        let dev = PipeWireAudioDev::new();
        dev.apply(added(9, "monitor", "Stream/Output/Audio"));
        dev.apply(added(10, "Video", "Video/Source"));

        assert_eq!(dev.inputs(), vec!["monitor".to_string()]);
        assert!(dev.outputs().is_empty());
        // Falls back to the first input
        assert_eq!(dev.default_input(), "monitor");
    }

    #[test]
    fn test_read_without_stream_is_empty() {
        let dev = PipeWireAudioDev::new();
        assert!(dev.read().is_empty());
        assert_eq!(
            dev.write(&Packet::default()).unwrap_err(),
            DeviceError::EmptyPacket
        );
    }
}
