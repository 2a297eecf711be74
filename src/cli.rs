// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing and watching audio devices
//! - Recording a synthetic test pattern through the full pipeline
//! - Inspecting WebM files
//! - Printing AAC configuration records

use camera_pipeline::backends::audio::{AudioDev, AudioDevEvent, PipeWireAudioDev};
use camera_pipeline::constants::{BitratePreset, format_bitrate, timeouts};
use camera_pipeline::media::caps::{AudioCaps, PixelFormat, SampleFormat, VideoCaps};
use camera_pipeline::media::encoders::AudioSpecificConfig;
use camera_pipeline::media::muxers::probe_file;
use camera_pipeline::media::{Fraction, Packet};
use camera_pipeline::{Config, Element, ElementState, Recording};
use std::f64::consts::TAU;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::TryRecvError;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Frequency of the test tone
const TONE_HZ: f64 = 440.0;

/// Rate of the test tone
const TONE_RATE: u32 = 48000;

fn stop_on_ctrlc() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);

    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    Ok(stop_flag)
}

fn print_device(dev: &PipeWireAudioDev, device: &str, default: &str) {
    let marker = if device == default { "*" } else { " " };
    println!("  {} {}", marker, device);

    let description = dev.description(device);
    if !description.is_empty() {
        println!("      {}", description);
    }

    println!("      preferred: {}", dev.preferred_format(device));

    let formats: Vec<String> = dev
        .supported_formats(device)
        .iter()
        .map(|format| format.to_string())
        .collect();
    if !formats.is_empty() {
        println!("      formats:   {}", formats.join(", "));
    }
}

/// List audio devices, optionally printing changes until Ctrl+C
pub fn list_devices(monitor: bool) -> CliResult {
    gstreamer::init()?;

    let dev = PipeWireAudioDev::new();
    let mut events = dev.subscribe();
    dev.start_monitor()?;

    // Let the monitor deliver the initial registry dump
    std::thread::sleep(Duration::from_millis(timeouts::DEVICE_WAIT_MS));

    let inputs = dev.inputs();
    let outputs = dev.outputs();

    if inputs.is_empty() && outputs.is_empty() {
        println!("No audio devices found.");
    }

    if !inputs.is_empty() {
        println!("Inputs:");
        let default = dev.default_input();
        for device in &inputs {
            print_device(&dev, device, &default);
        }
        println!();
    }

    if !outputs.is_empty() {
        println!("Outputs:");
        let default = dev.default_output();
        for device in &outputs {
            print_device(&dev, device, &default);
        }
        println!();
    }

    if !monitor {
        dev.stop_monitor();
        return Ok(());
    }

    println!("Watching for changes... (press Ctrl+C to stop)");
    let stop_flag = stop_on_ctrlc()?;

    while !stop_flag.load(Ordering::SeqCst) {
        match events.try_recv() {
            Ok(AudioDevEvent::InputsChanged(inputs)) => {
                println!("Inputs changed: {}", inputs.join(", "));
            }
            Ok(AudioDevEvent::OutputsChanged(outputs)) => {
                println!("Outputs changed: {}", outputs.join(", "));
            }
            Ok(AudioDevEvent::DefaultInputChanged(device)) => {
                println!("Default input: {}", device);
            }
            Ok(AudioDevEvent::DefaultOutputChanged(device)) => {
                println!("Default output: {}", device);
            }
            Err(TryRecvError::Lagged(missed)) => {
                println!("Missed {} events", missed);
            }
            Err(TryRecvError::Empty) => std::thread::sleep(Duration::from_millis(100)),
            Err(TryRecvError::Closed) => break,
        }
    }

    dev.stop_monitor();

    Ok(())
}

/// Options of the `record` command
#[derive(Debug, Clone)]
pub struct RecordOptions {
    pub output: Option<PathBuf>,
    pub duration: u64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub audio: bool,
    pub quality: Option<BitratePreset>,
}

/// Moving vertical bars in the luma plane, flat chroma
fn test_pattern(caps: &VideoCaps, frame: i64) -> Vec<u8> {
    let width = caps.width as usize;
    let height = caps.height as usize;
    let mut data = vec![128u8; caps.frame_size()];
    let shift = (frame as usize * 4) % width.max(1);

    for (y, row) in data[..width * height].chunks_mut(width).enumerate() {
        for (x, luma) in row.iter_mut().enumerate() {
            let bar = ((x + shift) * 8 / width.max(1)) as u8;
            *luma = 16 + bar * 27 + (y * 16 / height.max(1)) as u8;
        }
    }

    data
}

/// Interleaved s16 sine samples starting at sample `start`
fn test_tone(caps: &AudioCaps, start: i64, samples: usize) -> Vec<i16> {
    let channels = caps.channels() as usize;
    let rate = f64::from(caps.rate);
    let mut data = Vec::with_capacity(samples * channels);

    for n in 0..samples {
        let t = (start + n as i64) as f64 / rate;
        let value = ((TAU * TONE_HZ * t).sin() * 0.25 * f64::from(i16::MAX)) as i16;
        data.extend(std::iter::repeat_n(value, channels));
    }

    data
}

/// Record a synthetic pattern and tone for `duration` seconds
pub fn record(options: RecordOptions) -> CliResult {
    gstreamer::init()?;

    let mut config = Config::load()?;
    if let Some(dir) = &options.output {
        config.video_directory = dir.clone();
    }
    config.record_audio = options.audio;
    if let Some(preset) = options.quality {
        config.apply_preset(preset, options.width);
        println!("Quality: {}", preset.display_name());
    }
    config.validate()?;

    let fps = Fraction::new(i64::from(options.fps.max(1)), 1);
    let video_caps = VideoCaps::new(PixelFormat::Yuv420p, options.width, options.height, fps);
    let audio_caps = AudioCaps::interleaved(SampleFormat::S16, 2, TONE_RATE);

    println!(
        "Recording format: {}x{} @ {}fps",
        options.width, options.height, options.fps
    );
    println!("Video: {} {}", config.video_codec, format_bitrate(config.video_bitrate));
    if options.audio {
        println!("Audio: {} {}", config.audio_codec, format_bitrate(config.audio_bitrate));
    }
    println!("Duration: {} seconds", options.duration);

    let recording = Recording::from_config(&config, video_caps, audio_caps)?;

    println!();
    println!("Recording... (press Ctrl+C to stop early)");
    recording.set_state(ElementState::Playing)?;

    let stop_flag = stop_on_ctrlc()?;
    let frame_interval = Duration::from_secs_f64(1.0 / fps.value());
    let samples_per_frame = (f64::from(TONE_RATE) / fps.value()).round() as usize;
    let start = Instant::now();
    let target_duration = Duration::from_secs(options.duration);
    let mut frame: i64 = 0;
    let mut audio_pts: i64 = 0;

    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }

        let mut video = Packet::new(test_pattern(&video_caps, frame), video_caps);
        video.pts = frame;
        video.dts = frame;
        video.duration = 1;
        video.time_base = fps.invert();
        video.id = frame;
        recording.push(&video);

        if options.audio {
            let tone = test_tone(&audio_caps, audio_pts, samples_per_frame);
            let mut audio = Packet::new(bytemuck::cast_slice::<i16, u8>(&tone).to_vec(), audio_caps);
            audio.pts = audio_pts;
            audio.dts = audio_pts;
            audio.duration = samples_per_frame as i64;
            audio.time_base = Fraction::new(1, i64::from(TONE_RATE));
            audio.id = frame;
            recording.push(&audio);
            audio_pts += samples_per_frame as i64;
        }

        frame += 1;

        let elapsed = start.elapsed().as_secs();
        print!("\rRecording: {:02}:{:02}", elapsed / 60, elapsed % 60);
        std::io::Write::flush(&mut std::io::stdout())?;

        let next = frame_interval * frame as u32;
        if let Some(wait) = next.checked_sub(start.elapsed()) {
            std::thread::sleep(wait);
        }
    }
    println!();

    let location = recording.location();
    recording.set_state(ElementState::Null)?;

    match location {
        Some(path) => println!("Video saved: {}", path.display()),
        None => println!("Nothing was recorded"),
    }

    Ok(())
}

/// Print the layout of a WebM file
pub fn inspect(path: &Path) -> CliResult {
    let info = probe_file(path)?;

    println!("File: {}", path.display());
    println!("Doc type: {}", info.doc_type);
    println!("Muxing app: {}", info.muxing_app);
    println!("Writing app: {}", info.writing_app);
    println!("Duration: {:.3} s", info.duration_seconds());
    println!();

    println!("Tracks:");
    for track in &info.tracks {
        if track.is_video() {
            println!(
                "  [{}] video {} {}x{}",
                track.number, track.codec_id, track.width, track.height
            );
        } else if track.is_audio() {
            println!(
                "  [{}] audio {} {} Hz, {} channels",
                track.number, track.codec_id, track.sample_rate, track.channels
            );
        } else {
            println!("  [{}] {}", track.number, track.codec_id);
        }

        let blocks = info.track_blocks(track.number).count();
        let keys = info.track_blocks(track.number).filter(|b| b.key).count();
        println!("      {} blocks, {} key frames", blocks, keys);
        if !track.codec_private.is_empty() {
            println!("      codec private: {}", hex(&track.codec_private));
        }
    }
    println!();

    println!("Clusters: {}", info.clusters.len());
    println!("Cue points: {}", info.cues.len());
    match info.cues_position {
        Some(position) => println!("Cues at: {}", position),
        None => println!("Cues at: none"),
    }
    println!("Cues before clusters: {}", info.cues_before_clusters());
    println!("Cue positions resolve: {}", info.cue_positions_resolve());

    Ok(())
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|byte| format!("{:02x}", byte)).collect()
}

/// Print the AAC-LC AudioSpecificConfig for a stream
pub fn aac_config(rate: u32, channels: u32) -> CliResult {
    if channels == 0 {
        return Err("channel count must be at least 1".into());
    }

    let config = AudioSpecificConfig::new(rate, channels);

    println!("AudioSpecificConfig: {}", hex(&config.to_bytes()));
    println!("  object type:       {}", config.object_type);
    println!("  sample rate index: {}", config.sample_rate_index);
    println!("  sample rate:       {}", config.rate());
    println!("  channels:          {}", config.channels);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_size() {
        let caps = VideoCaps::new(PixelFormat::Yuv420p, 64, 48, Fraction::new(30, 1));
        assert_eq!(test_pattern(&caps, 3).len(), 64 * 48 * 3 / 2);
    }

    #[test]
    fn test_tone_interleaved() {
        let caps = AudioCaps::interleaved(SampleFormat::S16, 2, TONE_RATE);
        let tone = test_tone(&caps, 0, 480);
        assert_eq!(tone.len(), 960);
        assert_eq!(tone[0], 0);
        assert_eq!(tone[2], tone[3]);
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x12, 0x10, 0x56, 0xe5]), "121056e5");
    }
}
