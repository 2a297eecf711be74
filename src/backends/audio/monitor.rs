// SPDX-License-Identifier: GPL-3.0-only

//! PipeWire registry monitor
//!
//! `pw-dump --monitor` prints the registry as a JSON array and then one more
//! array per change. [`RegistryParser`] turns those arrays into
//! [`RegistryEvent`]s; [`RegistrySource`] reads them from any byte stream.
//!
//! Objects of interest:
//! - `PipeWire:Interface:Node` with an audio `media.class`
//! - the `default` metadata object carrying `default.audio.sink` and
//!   `default.audio.source`
//! - any object printed with `"info": null`, which marks a removal

use super::Direction;
use crate::errors::DeviceError;
use crate::media::caps::{AudioCaps, ChannelLayout, SampleFormat};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufReader, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

const NODE_TYPE: &str = "PipeWire:Interface:Node";
const METADATA_TYPE: &str = "PipeWire:Interface:Metadata";

/// A change in the PipeWire registry
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    DeviceAdded {
        id: u32,
        node_name: String,
        description: String,
        media_class: String,
        formats: Vec<AudioCaps>,
    },
    DeviceRemoved {
        id: u32,
    },
    /// The node's format list was updated after it was added
    FormatsChanged {
        id: u32,
        formats: Vec<AudioCaps>,
    },
    DefaultChanged {
        direction: Direction,
        node_name: String,
    },
}

/// Map a PipeWire sample format name such as `S16LE` or `F32P`
pub fn parse_sample_format(name: &str) -> Option<(SampleFormat, bool)> {
    let upper = name.to_uppercase();
    let (base, planar) = match upper.strip_suffix('P') {
        Some(base) => (base.to_string(), true),
        None => (upper, false),
    };

    let format = match base.as_str() {
        "S16" => SampleFormat::S16,
        "S32" => SampleFormat::S32,
        "F32" => SampleFormat::F32,
        other => SampleFormat::from_gst_name(other),
    };

    (format != SampleFormat::None).then_some((format, planar))
}

/// Values of a field that may be a plain value or a `{default, alternatives}`
/// choice object
fn choices(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Object(choice)) => {
            let mut values: Vec<&Value> = choice.get("default").into_iter().collect();

            if let Some(Value::Array(alternatives)) = choice.get("alternatives") {
                values.extend(alternatives.iter());
            }

            values
        }
        Some(Value::Array(values)) => values.iter().collect(),
        Some(value) => vec![value],
        None => Vec::new(),
    }
}

/// Formats listed in a node's `EnumFormat` params
pub fn parse_formats(info: &Value) -> Vec<AudioCaps> {
    let Some(params) = info
        .pointer("/params/EnumFormat")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let mut formats = Vec::new();

    for param in params {
        if param.get("mediaType").and_then(Value::as_str) != Some("audio") {
            continue;
        }

        let channels = choices(param.get("channels"))
            .first()
            .and_then(|value| value.as_u64())
            .unwrap_or(2) as u32;
        let rate = choices(param.get("rate"))
            .first()
            .and_then(|value| value.as_u64())
            .unwrap_or(48000) as u32;

        for name in choices(param.get("format")).into_iter().filter_map(Value::as_str) {
            if let Some((format, planar)) = parse_sample_format(name) {
                let caps = AudioCaps::new(format, ChannelLayout::default_for(channels), planar, rate);

                if !formats.contains(&caps) {
                    formats.push(caps);
                }
            }
        }
    }

    formats
}

/// Turns `pw-dump` object arrays into registry events
#[derive(Debug, Default)]
pub struct RegistryParser {
    /// Audio node ids already reported
    nodes: BTreeSet<u32>,
    formats: BTreeMap<u32, Vec<AudioCaps>>,
    default_sink: Option<String>,
    default_source: Option<String>,
}

impl RegistryParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&mut self, objects: &[Value]) -> Vec<RegistryEvent> {
        let mut events = Vec::new();

        for object in objects {
            let Some(id) = object
                .get("id")
                .and_then(Value::as_u64)
                .and_then(|id| u32::try_from(id).ok())
            else {
                continue;
            };

            let info = object.get("info");

            if matches!(info, Some(Value::Null)) {
                if self.nodes.remove(&id) {
                    self.formats.remove(&id);
                    events.push(RegistryEvent::DeviceRemoved { id });
                }

                continue;
            }

            match object.get("type").and_then(Value::as_str) {
                Some(NODE_TYPE) => {
                    if let Some(info) = info {
                        self.parse_node(id, info, &mut events);
                    }
                }
                Some(METADATA_TYPE) => self.parse_metadata(object, &mut events),
                _ => {}
            }
        }

        events
    }

    fn parse_node(&mut self, id: u32, info: &Value, events: &mut Vec<RegistryEvent>) {
        let Some(props) = info.get("props") else {
            return;
        };

        let prop = |key: &str| props.get(key).and_then(Value::as_str).unwrap_or_default();
        let media_class = prop("media.class");

        if !media_class.contains("Audio") {
            return;
        }

        let formats = parse_formats(info);

        if self.nodes.insert(id) {
            let node_name = prop("node.name").to_string();
            let description = match prop("node.description") {
                "" => match prop("node.nick") {
                    "" => node_name.clone(),
                    nick => nick.to_string(),
                },
                description => description.to_string(),
            };

            self.formats.insert(id, formats.clone());
            events.push(RegistryEvent::DeviceAdded {
                id,
                node_name,
                description,
                media_class: media_class.to_string(),
                formats,
            });
        } else if !formats.is_empty() && self.formats.get(&id) != Some(&formats) {
            self.formats.insert(id, formats.clone());
            events.push(RegistryEvent::FormatsChanged { id, formats });
        }
    }

    fn parse_metadata(&mut self, object: &Value, events: &mut Vec<RegistryEvent>) {
        if object.pointer("/props/metadata.name").and_then(Value::as_str) != Some("default") {
            return;
        }

        let Some(entries) = object.get("metadata").and_then(Value::as_array) else {
            return;
        };

        for entry in entries {
            let direction = match entry.get("key").and_then(Value::as_str) {
                Some("default.audio.sink") => Direction::Output,
                Some("default.audio.source") => Direction::Input,
                _ => continue,
            };

            let Some(name) = entry.pointer("/value/name").and_then(Value::as_str) else {
                continue;
            };

            let last = match direction {
                Direction::Output => &mut self.default_sink,
                Direction::Input => &mut self.default_source,
            };

            if last.as_deref() != Some(name) {
                *last = Some(name.to_string());
                events.push(RegistryEvent::DefaultChanged {
                    direction,
                    node_name: name.to_string(),
                });
            }
        }
    }
}

/// Streams registry events from `pw-dump --monitor` output
pub struct RegistrySource<R: Read> {
    stream: serde_json::StreamDeserializer<'static, serde_json::de::IoRead<BufReader<R>>, Vec<Value>>,
    parser: RegistryParser,
}

impl<R: Read> RegistrySource<R> {
    pub fn new(input: R) -> Self {
        Self {
            stream: serde_json::Deserializer::from_reader(BufReader::new(input)).into_iter(),
            parser: RegistryParser::new(),
        }
    }

    /// Events of the next printed array; `None` once the stream ends
    pub fn next_events(&mut self) -> Option<Result<Vec<RegistryEvent>, DeviceError>> {
        let objects = match self.stream.next()? {
            Ok(objects) => objects,
            Err(e) => return Some(Err(DeviceError::Monitor(e.to_string()))),
        };

        let events = self.parser.parse(&objects);
        debug!(objects = objects.len(), events = events.len(), "Registry update");

        Some(Ok(events))
    }
}

/// Start `pw-dump --monitor` and hand back the child and its output
pub fn spawn_pw_dump() -> Result<(Child, ChildStdout), DeviceError> {
    let mut child = Command::new("pw-dump")
        .arg("--monitor")
        .arg("--no-colors")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| DeviceError::Monitor(format!("Failed to run pw-dump: {}", e)))?;

    match child.stdout.take() {
        Some(stdout) => Ok((child, stdout)),
        None => {
            if let Err(e) = child.kill() {
                warn!(error = %e, "Failed to stop pw-dump");
            }

            Err(DeviceError::Monitor("pw-dump has no output pipe".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sink(id: u32, name: &str) -> Value {
        json!({
            "id": id,
            "type": NODE_TYPE,
            "info": {
                "props": {
                    "media.class": "Audio/Sink",
                    "node.name": name,
                    "node.description": "Speakers"
                },
                "params": {
                    "EnumFormat": [{
                        "mediaType": "audio",
                        "mediaSubtype": "raw",
                        "format": { "default": "S16LE", "alternatives": ["S16LE", "F32P"] },
                        "rate": 48000,
                        "channels": 2
                    }]
                }
            }
        })
    }

    #[test]
    fn test_sample_format_names() {
        assert_eq!(parse_sample_format("S16LE"), Some((SampleFormat::S16Le, false)));
        assert_eq!(parse_sample_format("F32P"), Some((SampleFormat::F32, true)));
        assert_eq!(parse_sample_format("S24_32LE"), None);
    }

    #[test]
    fn test_node_add_and_remove() {
        let mut parser = RegistryParser::new();
        let events = parser.parse(&[sink(42, "alsa_output.pci")]);

        match &events[..] {
            [RegistryEvent::DeviceAdded { id, node_name, description, formats, .. }] => {
                assert_eq!(*id, 42);
                assert_eq!(node_name, "alsa_output.pci");
                assert_eq!(description, "Speakers");
                assert_eq!(formats.len(), 2);
                assert!(formats[1].planar);
            }
            other => panic!("unexpected events: {:?}", other),
        }

        // Repeated info without changes is silent
        assert!(parser.parse(&[sink(42, "alsa_output.pci")]).is_empty());

        let events = parser.parse(&[json!({ "id": 42, "info": null })]);
        assert_eq!(events, vec![RegistryEvent::DeviceRemoved { id: 42 }]);
        assert!(parser.parse(&[json!({ "id": 42, "info": null })]).is_empty());
    }

    #[test]
    fn test_non_audio_nodes_ignored() {
        let mut parser = RegistryParser::new();
        let camera = json!({
            "id": 7,
            "type": NODE_TYPE,
            "info": { "props": { "media.class": "Video/Source", "node.name": "cam" } }
        });

        assert!(parser.parse(&[camera]).is_empty());
    }

    #[test]
    fn test_default_metadata() {
        let mut parser = RegistryParser::new();
        let metadata = json!({
            "id": 30,
            "type": METADATA_TYPE,
            "props": { "metadata.name": "default" },
            "metadata": [
                { "subject": 0, "key": "default.audio.sink", "value": { "name": "speakers" } },
                { "subject": 0, "key": "default.audio.source", "value": { "name": "mic" } },
                { "subject": 0, "key": "default.video.source", "value": { "name": "cam" } }
            ]
        });

        let events = parser.parse(std::slice::from_ref(&metadata));
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            RegistryEvent::DefaultChanged {
                direction: Direction::Input,
                node_name: "mic".to_string()
            }
        );

        assert!(parser.parse(&[metadata]).is_empty());
    }

    #[test]
    fn test_source_reads_concatenated_arrays() {
        let text = format!("[{}]\n[{{\"id\": 42, \"info\": null}}]\n", sink(42, "out"));
        let mut source = RegistrySource::new(text.as_bytes());

        let first = source.next_events().unwrap().unwrap();
        assert_eq!(first.len(), 1);

        let second = source.next_events().unwrap().unwrap();
        assert_eq!(second, vec![RegistryEvent::DeviceRemoved { id: 42 }]);

        assert!(source.next_events().is_none());
    }
}
