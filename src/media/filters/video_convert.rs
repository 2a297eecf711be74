// SPDX-License-Identifier: GPL-3.0-only

//! Raw video format conversion
//!
//! Converts 8-bit packed, semi-planar and RGB frames to planar 4:2:0 and
//! rescales planar frames with nearest-neighbor sampling. Colors use BT.601
//! full-range coefficients.

use crate::media::caps::{ChromaSampling, PixelFormat, VideoCaps};
use crate::media::packet::Packet;
use tracing::warn;

/// Converts raw video packets to a fixed output format and size
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoConverter {
    output_caps: VideoCaps,
}

impl VideoConverter {
    pub fn new(output_caps: VideoCaps) -> Self {
        Self { output_caps }
    }

    pub fn output_caps(&self) -> VideoCaps {
        self.output_caps
    }

    pub fn set_output_caps(&mut self, caps: VideoCaps) {
        self.output_caps = caps;
    }

    /// Whether frames in `format` can be converted to `output`
    pub fn can_convert(format: PixelFormat, output: PixelFormat) -> bool {
        if format == output {
            return output.chroma_sampling().is_some();
        }

        output == PixelFormat::Yuv420p
            && matches!(
                format,
                PixelFormat::Y8
                    | PixelFormat::Yuv422p
                    | PixelFormat::Yuv444p
                    | PixelFormat::Nv12
                    | PixelFormat::Yuyv422
                    | PixelFormat::Rgb24
                    | PixelFormat::Rgba
            )
    }

    /// Convert `packet` to the output caps
    ///
    /// With invalid output caps the packet passes through unchanged. Returns
    /// `None` for non-video packets, short frames and formats with no
    /// conversion path.
    pub fn convert(&self, packet: &Packet) -> Option<Packet> {
        let in_caps = *packet.caps.as_video()?;
        let out_caps = self.output_caps;

        if !in_caps.is_valid() || packet.is_empty() {
            return None;
        }

        if packet.size() < in_caps.frame_size() {
            warn!(size = packet.size(), expected = in_caps.frame_size(), "Short video frame");
            return None;
        }

        if !out_caps.is_valid() {
            return Some(packet.clone());
        }

        let same_size = in_caps.width == out_caps.width && in_caps.height == out_caps.height;

        if in_caps.format == out_caps.format && same_size {
            let mut out = packet.clone();
            out.caps = out_caps.into();
            return Some(out);
        }

        if !Self::can_convert(in_caps.format, out_caps.format) {
            warn!(from = %in_caps, to = %out_caps, "Unsupported frame conversion");
            return None;
        }

        let frame = &packet.data()[..in_caps.frame_size()];
        let data = if in_caps.format == out_caps.format {
            frame.to_vec()
        } else {
            to_yuv420p(frame, in_caps.format, in_caps.width as usize, in_caps.height as usize)?
        };

        let data = if same_size {
            data
        } else {
            let Some(scaled) = scale(&data, out_caps.format, &in_caps, &out_caps) else {
                warn!(format = %out_caps.format, "Cannot rescale packed frames");
                return None;
            };
            scaled
        };

        let mut out = Packet::new(data, out_caps);
        out.copy_metadata(packet);
        out.flags = packet.flags;

        Some(out)
    }
}

/// Width and height of each plane of a planar format
fn plane_sizes(format: PixelFormat, width: usize, height: usize) -> Option<Vec<(usize, usize)>> {
    let chroma_w = width.div_ceil(2);
    let chroma_h = height.div_ceil(2);

    let sizes = match format.chroma_sampling()? {
        ChromaSampling::Cs400 => vec![(width, height)],
        ChromaSampling::Cs420 => vec![(width, height), (chroma_w, chroma_h), (chroma_w, chroma_h)],
        ChromaSampling::Cs422 => vec![(width, height), (chroma_w, height), (chroma_w, height)],
        ChromaSampling::Cs444 => vec![(width, height); 3],
    };

    Some(sizes)
}

fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));

    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.169 * r - 0.331 * g + 0.5 * b + 128.0;
    let v = 0.5 * r - 0.419 * g - 0.081 * b + 128.0;

    (
        y.round().clamp(0.0, 255.0) as u8,
        u.round().clamp(0.0, 255.0) as u8,
        v.round().clamp(0.0, 255.0) as u8,
    )
}

/// Convert an 8-bit frame to planar 4:2:0
///
/// Expands to full-resolution Y, U and V first, then averages each 2x2
/// chroma block.
fn to_yuv420p(data: &[u8], format: PixelFormat, width: usize, height: usize) -> Option<Vec<u8>> {
    let pixels = width * height;
    let chroma_w = width.div_ceil(2);
    let chroma_h = height.div_ceil(2);

    let mut luma = vec![0u8; pixels];
    let mut u = vec![128u8; pixels];
    let mut v = vec![128u8; pixels];

    match format {
        PixelFormat::Y8 => luma.copy_from_slice(&data[..pixels]),
        PixelFormat::Yuv422p | PixelFormat::Yuv444p => {
            let plane_w = if format == PixelFormat::Yuv422p { chroma_w } else { width };
            let (u_plane, v_plane) = data[pixels..].split_at(plane_w * height);
            luma.copy_from_slice(&data[..pixels]);

            for y in 0..height {
                for x in 0..width {
                    let cx = if format == PixelFormat::Yuv422p { x / 2 } else { x };
                    u[y * width + x] = u_plane[y * plane_w + cx];
                    v[y * width + x] = v_plane[y * plane_w + cx];
                }
            }
        }
        PixelFormat::Nv12 => {
            let uv = &data[pixels..];
            luma.copy_from_slice(&data[..pixels]);

            for y in 0..height {
                for x in 0..width {
                    let pair = 2 * ((y / 2) * chroma_w + x / 2);
                    u[y * width + x] = uv[pair];
                    v[y * width + x] = uv[pair + 1];
                }
            }
        }
        PixelFormat::Yuyv422 => {
            // Y0 U Y1 V, one group per pixel pair
            let stride = 4 * chroma_w;

            for y in 0..height {
                let row = &data[y * stride..(y + 1) * stride];

                for x in 0..width {
                    let group = 4 * (x / 2);
                    luma[y * width + x] = row[group + 2 * (x % 2)];
                    u[y * width + x] = row[group + 1];
                    v[y * width + x] = row[group + 3];
                }
            }
        }
        PixelFormat::Rgb24 | PixelFormat::Rgba => {
            let bpp = if format == PixelFormat::Rgb24 { 3 } else { 4 };

            for (i, pixel) in data.chunks_exact(bpp).take(pixels).enumerate() {
                let (y_value, u_value, v_value) = rgb_to_yuv(pixel[0], pixel[1], pixel[2]);
                luma[i] = y_value;
                u[i] = u_value;
                v[i] = v_value;
            }
        }
        _ => return None,
    }

    let mut out = luma;
    out.reserve(2 * chroma_w * chroma_h);
    out.extend(subsample(&u, width, height));
    out.extend(subsample(&v, width, height));

    Some(out)
}

/// Average 2x2 blocks of a full-resolution chroma plane
fn subsample(plane: &[u8], width: usize, height: usize) -> Vec<u8> {
    let chroma_w = width.div_ceil(2);
    let chroma_h = height.div_ceil(2);
    let mut out = Vec::with_capacity(chroma_w * chroma_h);

    for cy in 0..chroma_h {
        let y0 = 2 * cy;
        let y1 = (y0 + 1).min(height - 1);

        for cx in 0..chroma_w {
            let x0 = 2 * cx;
            let x1 = (x0 + 1).min(width - 1);

            let sum = u32::from(plane[y0 * width + x0])
                + u32::from(plane[y0 * width + x1])
                + u32::from(plane[y1 * width + x0])
                + u32::from(plane[y1 * width + x1]);
            out.push(((sum + 2) / 4) as u8);
        }
    }

    out
}

/// Nearest-neighbor rescale of every plane of a planar frame
fn scale(data: &[u8], format: PixelFormat, from: &VideoCaps, to: &VideoCaps) -> Option<Vec<u8>> {
    let sample = if format.depth() > 8 { 2 } else { 1 };
    let src_planes = plane_sizes(format, from.width as usize, from.height as usize)?;
    let dst_planes = plane_sizes(format, to.width as usize, to.height as usize)?;

    let mut out = Vec::with_capacity(format.frame_size(to.width, to.height));
    let mut offset = 0;

    for (&(src_w, src_h), &(dst_w, dst_h)) in src_planes.iter().zip(&dst_planes) {
        let plane = &data[offset..offset + src_w * src_h * sample];
        offset += src_w * src_h * sample;

        for dy in 0..dst_h {
            let sy = dy * src_h / dst_h;

            for dx in 0..dst_w {
                let sx = dx * src_w / dst_w;
                let at = (sy * src_w + sx) * sample;
                out.extend_from_slice(&plane[at..at + sample]);
            }
        }
    }

    Some(out)
}
