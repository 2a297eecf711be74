// SPDX-License-Identifier: GPL-3.0-only

//! Raw video format description

use crate::media::fraction::Fraction;
use std::fmt;

/// Uncompressed pixel layouts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    #[default]
    None,

    // ===== Grayscale =====
    Y8,
    Y10,
    Y12,

    // ===== Planar YUV =====
    Yuv420p,
    Yuv420p10,
    Yuv420p12,
    Yuv422p,
    Yuv422p10,
    Yuv422p12,
    Yuv444p,
    Yuv444p10,
    Yuv444p12,

    // ===== Semi-planar / packed =====
    /// Y plane + interleaved UV, 4:2:0
    Nv12,
    /// Packed Y0 U Y1 V, 4:2:2
    Yuyv422,
    Rgb24,
    Rgba,
}

/// Chroma subsampling class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChromaSampling {
    /// Luma only
    Cs400,
    Cs420,
    Cs422,
    Cs444,
}

impl PixelFormat {
    /// Bits per component
    pub fn depth(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Y10 | Self::Yuv420p10 | Self::Yuv422p10 | Self::Yuv444p10 => 10,
            Self::Y12 | Self::Yuv420p12 | Self::Yuv422p12 | Self::Yuv444p12 => 12,
            _ => 8,
        }
    }

    pub fn planes(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Y8 | Self::Y10 | Self::Y12 => 1,
            Self::Nv12 => 2,
            Self::Yuyv422 | Self::Rgb24 | Self::Rgba => 1,
            _ => 3,
        }
    }

    /// Subsampling of planar YUV and grayscale formats
    pub fn chroma_sampling(&self) -> Option<ChromaSampling> {
        match self {
            Self::Y8 | Self::Y10 | Self::Y12 => Some(ChromaSampling::Cs400),
            Self::Yuv420p | Self::Yuv420p10 | Self::Yuv420p12 => Some(ChromaSampling::Cs420),
            Self::Yuv422p | Self::Yuv422p10 | Self::Yuv422p12 => Some(ChromaSampling::Cs422),
            Self::Yuv444p | Self::Yuv444p10 | Self::Yuv444p12 => Some(ChromaSampling::Cs444),
            _ => None,
        }
    }

    /// Bytes needed for one `width`×`height` frame
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let w = width as usize;
        let h = height as usize;
        let luma = w * h;
        let chroma_w = w.div_ceil(2);
        let chroma_h = h.div_ceil(2);
        let sample = if self.depth() > 8 { 2 } else { 1 };

        let samples = match self {
            Self::None => 0,
            Self::Y8 | Self::Y10 | Self::Y12 => luma,
            Self::Yuv420p | Self::Yuv420p10 | Self::Yuv420p12 | Self::Nv12 => {
                luma + 2 * chroma_w * chroma_h
            }
            Self::Yuv422p | Self::Yuv422p10 | Self::Yuv422p12 => luma + 2 * chroma_w * h,
            Self::Yuyv422 => 2 * chroma_w * 2 * h,
            Self::Yuv444p | Self::Yuv444p10 | Self::Yuv444p12 => 3 * luma,
            Self::Rgb24 => 3 * luma,
            Self::Rgba => 4 * luma,
        };

        samples * sample
    }

    /// GStreamer `format` field value
    pub fn gst_name(&self) -> Option<&'static str> {
        let name = match self {
            Self::None => return None,
            Self::Y8 => "GRAY8",
            Self::Y10 => "GRAY10_LE16",
            Self::Y12 => "GRAY12_LE",
            Self::Yuv420p => "I420",
            Self::Yuv420p10 => "I420_10LE",
            Self::Yuv420p12 => "I420_12LE",
            Self::Yuv422p => "Y42B",
            Self::Yuv422p10 => "I422_10LE",
            Self::Yuv422p12 => "I422_12LE",
            Self::Yuv444p => "Y444",
            Self::Yuv444p10 => "Y444_10LE",
            Self::Yuv444p12 => "Y444_12LE",
            Self::Nv12 => "NV12",
            Self::Yuyv422 => "YUY2",
            Self::Rgb24 => "RGB",
            Self::Rgba => "RGBA",
        };
        Some(name)
    }

    pub fn from_gst_name(name: &str) -> Self {
        match name.to_uppercase().as_str() {
            "GRAY8" => Self::Y8,
            "GRAY10_LE16" => Self::Y10,
            "GRAY12_LE" => Self::Y12,
            "I420" | "IYUV" => Self::Yuv420p,
            "I420_10LE" => Self::Yuv420p10,
            "I420_12LE" => Self::Yuv420p12,
            "Y42B" => Self::Yuv422p,
            "I422_10LE" => Self::Yuv422p10,
            "I422_12LE" => Self::Yuv422p12,
            "Y444" => Self::Yuv444p,
            "Y444_10LE" => Self::Yuv444p10,
            "Y444_12LE" => Self::Yuv444p12,
            "NV12" => Self::Nv12,
            "YUY2" | "YUYV" => Self::Yuyv422,
            "RGB" => Self::Rgb24,
            "RGBA" => Self::Rgba,
            _ => Self::None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Y8 => "y8",
            Self::Y10 => "y10",
            Self::Y12 => "y12",
            Self::Yuv420p => "yuv420p",
            Self::Yuv420p10 => "yuv420p10",
            Self::Yuv420p12 => "yuv420p12",
            Self::Yuv422p => "yuv422p",
            Self::Yuv422p10 => "yuv422p10",
            Self::Yuv422p12 => "yuv422p12",
            Self::Yuv444p => "yuv444p",
            Self::Yuv444p10 => "yuv444p10",
            Self::Yuv444p12 => "yuv444p12",
            Self::Nv12 => "nv12",
            Self::Yuyv422 => "yuyv422",
            Self::Rgb24 => "rgb24",
            Self::Rgba => "rgba",
        };
        write!(f, "{}", name)
    }
}

/// Raw video caps
#[derive(Debug, Clone, Copy, Default, Eq, Hash)]
pub struct VideoCaps {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Frames per second; zero means unknown
    pub fps: Fraction,
}

impl VideoCaps {
    pub fn new(format: PixelFormat, width: u32, height: u32, fps: Fraction) -> Self {
        Self {
            format,
            width,
            height,
            fps,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.format != PixelFormat::None && self.width > 0 && self.height > 0
    }

    pub fn frame_size(&self) -> usize {
        self.format.frame_size(self.width, self.height)
    }

    /// GStreamer caps string for this format
    pub fn to_gst_caps_string(&self) -> String {
        let mut caps = format!(
            "video/x-raw,format={},width={},height={}",
            self.format.gst_name().unwrap_or("I420"),
            self.width,
            self.height
        );

        if self.fps.is_valid() && !self.fps.is_zero() {
            caps.push_str(&format!(",framerate={}", self.fps.as_gst_fraction()));
        }

        caps
    }
}

impl PartialEq for VideoCaps {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_valid(), other.is_valid()) {
            (false, false) => true,
            (true, true) => {
                self.format == other.format
                    && self.width == other.width
                    && self.height == other.height
                    && self.fps == other.fps
            }
            _ => false,
        }
    }
}

impl fmt::Display for VideoCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "video/x-raw (invalid)");
        }

        write!(
            f,
            "{} {}x{} @ {}fps",
            self.format, self.width, self.height, self.fps
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes() {
        assert_eq!(PixelFormat::Yuv420p.frame_size(4, 4), 24);
        assert_eq!(PixelFormat::Nv12.frame_size(4, 4), 24);
        assert_eq!(PixelFormat::Yuv420p10.frame_size(4, 4), 48);
        assert_eq!(PixelFormat::Yuyv422.frame_size(4, 2), 16);
        assert_eq!(PixelFormat::Rgba.frame_size(2, 2), 16);
    }

    #[test]
    fn test_zero_fps_is_still_valid() {
        let caps = VideoCaps::new(PixelFormat::Yuv420p, 640, 480, Fraction::new(0, 1));
        assert!(caps.is_valid());
        assert!(!caps.to_gst_caps_string().contains("framerate"));
    }

    #[test]
    fn test_invalid_equals_default() {
        let caps = VideoCaps::new(PixelFormat::Yuv420p, 0, 480, Fraction::from_int(30));
        assert_eq!(caps, VideoCaps::default());
    }

    #[test]
    fn test_chroma_sampling() {
        assert_eq!(PixelFormat::Y10.chroma_sampling(), Some(ChromaSampling::Cs400));
        assert_eq!(PixelFormat::Yuv422p12.chroma_sampling(), Some(ChromaSampling::Cs422));
        assert_eq!(PixelFormat::Nv12.chroma_sampling(), None);
    }
}
