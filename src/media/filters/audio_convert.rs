// SPDX-License-Identifier: GPL-3.0-only

//! Raw audio format conversion
//!
//! Converts interleaved PCM between the integer and float sample formats
//! encoders accept, remaps mono/stereo/N-channel audio and resamples with
//! linear interpolation. Conversion goes through an f32 intermediate.

use crate::media::caps::{AudioCaps, SampleFormat};
use crate::media::fraction::Fraction;
use crate::media::packet::Packet;
use tracing::warn;

/// Converts raw audio packets to a fixed output format
#[derive(Debug, Clone, Default)]
pub struct AudioConverter {
    output_caps: AudioCaps,
}

impl AudioConverter {
    pub fn new(output_caps: AudioCaps) -> Self {
        Self { output_caps }
    }

    pub fn output_caps(&self) -> AudioCaps {
        self.output_caps
    }

    pub fn set_output_caps(&mut self, caps: AudioCaps) {
        self.output_caps = caps;
    }

    /// Convert `packet` to the output caps
    ///
    /// With invalid output caps the packet passes through unchanged. Returns
    /// `None` when the input is not raw audio or uses an unsupported layout.
    pub fn convert(&self, packet: &Packet) -> Option<Packet> {
        let in_caps = *packet.audio_caps()?;

        if !in_caps.is_valid() || packet.is_empty() {
            return None;
        }

        if !self.output_caps.is_valid() || in_caps == self.output_caps {
            return Some(packet.clone());
        }

        if (in_caps.planar && in_caps.channels() > 1) || self.output_caps.planar {
            warn!(caps = %in_caps, "Planar audio conversion is not supported");
            return None;
        }

        let samples = decode(packet.data(), in_caps.format)?;
        let samples = remap_channels(&samples, in_caps.channels(), self.output_caps.channels())?;
        let samples = resample(
            &samples,
            self.output_caps.channels(),
            in_caps.rate,
            self.output_caps.rate,
        );
        let data = encode(&samples, self.output_caps.format)?;

        let mut out = Packet::new(data, self.output_caps);
        out.copy_metadata(packet);

        if in_caps.rate != self.output_caps.rate {
            let rate = i64::from(self.output_caps.rate);
            out.pts = (packet.pts_seconds() * rate as f64).round() as i64;
            out.dts = out.pts;
            out.duration = out.samples() as i64;
            out.time_base = Fraction::new(1, rate);
        }

        Some(out)
    }
}

fn decode(data: &[u8], format: SampleFormat) -> Option<Vec<f32>> {
    const I16_SCALE: f32 = 32768.0;
    const I32_SCALE: f32 = 2_147_483_648.0;

    let samples = match format {
        SampleFormat::U8 => data.iter().map(|&s| (f32::from(s) - 128.0) / 128.0).collect(),
        SampleFormat::S8 => data.iter().map(|&s| f32::from(s as i8) / 128.0).collect(),
        SampleFormat::S16Le => data
            .chunks_exact(2)
            .map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])) / I16_SCALE)
            .collect(),
        SampleFormat::S16Be => data
            .chunks_exact(2)
            .map(|c| f32::from(i16::from_be_bytes([c[0], c[1]])) / I16_SCALE)
            .collect(),
        SampleFormat::S32Le => data
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32 / I32_SCALE)
            .collect(),
        SampleFormat::S32Be => data
            .chunks_exact(4)
            .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f32 / I32_SCALE)
            .collect(),
        SampleFormat::F32Le => data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        SampleFormat::F32Be => data
            .chunks_exact(4)
            .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        other => {
            warn!(format = %other, "Unsupported input sample format");
            return None;
        }
    };

    Some(samples)
}

fn encode(samples: &[f32], format: SampleFormat) -> Option<Vec<u8>> {
    let clamp = |s: f32| s.clamp(-1.0, 1.0);

    let data = match format {
        SampleFormat::U8 => samples
            .iter()
            .map(|&s| (clamp(s) * 127.0 + 128.0).round() as u8)
            .collect(),
        SampleFormat::S16Le | SampleFormat::S16Be => {
            let big = format == SampleFormat::S16Be;
            let words: Vec<i16> = samples
                .iter()
                .map(|&s| {
                    let v = (clamp(s) * 32767.0).round() as i16;
                    if big { v.to_be() } else { v.to_le() }
                })
                .collect();
            bytemuck::cast_slice(&words).to_vec()
        }
        SampleFormat::S32Le | SampleFormat::S32Be => {
            let big = format == SampleFormat::S32Be;
            let words: Vec<i32> = samples
                .iter()
                .map(|&s| {
                    let v = (f64::from(clamp(s)) * 2_147_483_647.0).round() as i32;
                    if big { v.to_be() } else { v.to_le() }
                })
                .collect();
            bytemuck::cast_slice(&words).to_vec()
        }
        SampleFormat::F32Le | SampleFormat::F32Be => {
            let big = format == SampleFormat::F32Be;
            let words: Vec<u32> = samples
                .iter()
                .map(|&s| {
                    let bits = s.to_bits();
                    if big { bits.to_be() } else { bits.to_le() }
                })
                .collect();
            bytemuck::cast_slice(&words).to_vec()
        }
        other => {
            warn!(format = %other, "Unsupported output sample format");
            return None;
        }
    };

    Some(data)
}

/// Map interleaved frames from `from` to `to` channels
fn remap_channels(samples: &[f32], from: u32, to: u32) -> Option<Vec<f32>> {
    let from = from as usize;
    let to = to as usize;

    if from == to {
        return Some(samples.to_vec());
    }

    let frames = samples.chunks_exact(from);

    let out = if to == 1 {
        frames
            .map(|frame| frame.iter().sum::<f32>() / from as f32)
            .collect()
    } else if from == 1 {
        frames
            .flat_map(|frame| std::iter::repeat_n(frame[0], to))
            .collect()
    } else if to < from {
        frames.flat_map(|frame| frame[..to].to_vec()).collect()
    } else {
        warn!(from, to, "Unsupported channel mapping");
        return None;
    };

    Some(out)
}

/// Linear interpolation resampler over interleaved frames
fn resample(samples: &[f32], channels: u32, from_rate: u32, to_rate: u32) -> Vec<f32> {
    let channels = channels as usize;

    if from_rate == to_rate || channels == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let in_frames = samples.len() / channels;

    if in_frames == 0 {
        return Vec::new();
    }

    let out_frames = (in_frames as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    let step = f64::from(from_rate) / f64::from(to_rate);
    let mut out = Vec::with_capacity(out_frames * channels);

    for i in 0..out_frames {
        let pos = i as f64 * step;
        let left = (pos.floor() as usize).min(in_frames - 1);
        let right = (left + 1).min(in_frames - 1);
        let frac = (pos - left as f64) as f32;

        for c in 0..channels {
            let a = samples[left * channels + c];
            let b = samples[right * channels + c];
            out.push(a + (b - a) * frac);
        }
    }

    out
}
