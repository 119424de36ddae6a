use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Conversion options and option enums.
/// Key notes:
///   - `device` selects the target geometry; every emitted page has exactly
///     those dimensions
///   - `two_bit` switches the whole chain to XTH chunks in an XTCH container
///   - `streamed` emits header and index before any page data
///     Target reader devices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// 480x800 portrait panel.
    X4,
    /// 528x792 portrait panel.
    X3,
}

impl Device {
    /// Panel dimensions as (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Device::X4 => (480, 800),
            Device::X3 => (528, 792),
        }
    }
}

impl FromStr for Device {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x4" => Ok(Self::X4),
            "x3" => Ok(Self::X3),
            _ => Err(()),
        }
    }
}

/// What kind of source produced the frames. Decoding is the caller's job;
/// the pipeline only uses this to pick defaults and the single-image path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Cbz,
    Pdf,
    Image,
    Video,
}

impl SourceType {
    /// Comics read sideways by default; single images and video frames don't.
    pub fn default_orientation(&self) -> Orientation {
        match self {
            SourceType::Cbz | SourceType::Pdf => Orientation::Landscape,
            SourceType::Image | SourceType::Video => Orientation::Portrait,
        }
    }
}

impl FromStr for SourceType {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cbz" => Ok(Self::Cbz),
            "pdf" => Ok(Self::Pdf),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            _ => Err(()),
        }
    }
}

/// Dithering algorithms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DitherAlgorithm {
    FloydSteinberg,
    Atkinson,
    Stucki,
    ZhouFang,
    Ostromoukhov,
    SierraLite,
    /// Ordered Bayer 4x4.
    Ordered,
    /// Hilbert-curve serpentine diffusion.
    Stochastic,
    /// Plain threshold, no diffusion.
    None,
}

impl FromStr for DitherAlgorithm {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "floyd" | "floydsteinberg" => Ok(Self::FloydSteinberg),
            "atkinson" => Ok(Self::Atkinson),
            "stucki" => Ok(Self::Stucki),
            "zhoufang" => Ok(Self::ZhouFang),
            "ostromoukhov" => Ok(Self::Ostromoukhov),
            "sierra-lite" | "sierralite" => Ok(Self::SierraLite),
            "ordered" => Ok(Self::Ordered),
            "stochastic" => Ok(Self::Stochastic),
            "none" => Ok(Self::None),
            _ => Err(()),
        }
    }
}

/// Page orientation on the device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl FromStr for Orientation {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "portrait" => Ok(Self::Portrait),
            "landscape" => Ok(Self::Landscape),
            _ => Err(()),
        }
    }
}

/// How landscape pages that exceed one rotated screenful are handled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Overlapping segments so no panel is cut at a boundary.
    Overlap,
    /// Hard halves.
    Split,
    /// One page, scaled down to fit.
    NoSplit,
}

impl FromStr for SplitMode {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overlap" => Ok(Self::Overlap),
            "split" => Ok(Self::Split),
            "nosplit" => Ok(Self::NoSplit),
            _ => Err(()),
        }
    }
}

/// Scaling modes for single-image sources.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageMode {
    /// Fill the panel, crop the overflow.
    Cover,
    /// Fit inside the panel, pad the remainder.
    Letterbox,
    /// Stretch to exact panel dimensions.
    Fill,
    /// No scaling; centre and pad or crop.
    Crop,
}

impl FromStr for ImageMode {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cover" => Ok(Self::Cover),
            "letterbox" => Ok(Self::Letterbox),
            "fill" => Ok(Self::Fill),
            "crop" => Ok(Self::Crop),
            _ => Err(()),
        }
    }
}

/// Immutable per-conversion options. Validate before use; `gamma` and the
/// margin percentages are clamped by the stages that consume them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Target device geometry.
    pub device: Device,
    /// Kind of source that produced the frames.
    pub source_type: SourceType,
    /// Produce 2-bit XTH chunks in an XTCH container.
    pub two_bit: bool,
    /// Dithering algorithm applied at device resolution.
    pub dither: DitherAlgorithm,
    /// Histogram-stretch intensity; one of 0, 2, 4, 6, 8.
    pub contrast: u8,
    /// Gamma correction; clamped to [0.1, 3.0].
    pub gamma: f32,
    /// Invert channels before grayscale conversion.
    pub invert: bool,
    /// Pad with black (0) instead of white (255).
    pub pad_black: bool,
    /// Page orientation on the device.
    pub orientation: Orientation,
    /// Landscape split behaviour.
    pub split_mode: SplitMode,
    /// Emit a letterboxed overview page per frame.
    pub include_overviews: bool,
    /// Emit a rotated overview page per frame.
    pub sideways_overviews: bool,
    /// Treat the source as an infinite vertical strip.
    pub manhwa: bool,
    /// Overlap between successive manhwa slices; one of 30, 50, 75.
    pub manhwa_overlap_percent: u8,
    /// Single-image scaling mode.
    pub image_mode: ImageMode,
    /// Sampling rate for video sources (frames per second).
    pub video_fps: f32,
    /// Horizontal crop margin in percent of source width; clamped to [0, 20].
    pub horizontal_margin_percent: u8,
    /// Vertical crop margin in percent of source height; clamped to [0, 20].
    pub vertical_margin_percent: u8,
    /// Emit header and index before page data.
    #[serde(default)]
    pub streamed: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            device: Device::X4,
            source_type: SourceType::Cbz,
            two_bit: false,
            dither: DitherAlgorithm::Stucki,
            contrast: 0,
            gamma: 1.0,
            invert: false,
            pad_black: false,
            orientation: Orientation::Landscape,
            split_mode: SplitMode::Overlap,
            include_overviews: false,
            sideways_overviews: false,
            manhwa: false,
            manhwa_overlap_percent: 50,
            image_mode: ImageMode::Letterbox,
            video_fps: 1.0,
            horizontal_margin_percent: 0,
            vertical_margin_percent: 0,
            streamed: false,
        }
    }
}

impl ConversionOptions {
    /// Validates the enumerated option values.
    ///
    /// Returns `InvalidOption` if:
    /// - `contrast` is not one of 0, 2, 4, 6, 8
    /// - `manhwa_overlap_percent` is not one of 30, 50, 75
    /// - `video_fps` is not a positive finite number
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::XtcError;

        if !matches!(self.contrast, 0 | 2 | 4 | 6 | 8) {
            return Err(XtcError::InvalidOption(format!(
                "contrast must be one of 0, 2, 4, 6, 8 (got {})",
                self.contrast
            )));
        }
        if !matches!(self.manhwa_overlap_percent, 30 | 50 | 75) {
            return Err(XtcError::InvalidOption(format!(
                "manhwa overlap must be one of 30, 50, 75 (got {})",
                self.manhwa_overlap_percent
            )));
        }
        if !self.video_fps.is_finite() || self.video_fps <= 0.0 {
            return Err(XtcError::InvalidOption(format!(
                "video fps must be positive (got {})",
                self.video_fps
            )));
        }
        Ok(())
    }

    /// Gamma with the documented [0.1, 3.0] clamp applied.
    pub fn clamped_gamma(&self) -> f32 {
        self.gamma.clamp(0.1, 3.0)
    }

    /// Pad colour derived from `pad_black`.
    pub fn pad_color(&self) -> u8 {
        if self.pad_black {
            0
        } else {
            255
        }
    }

    /// Create a fluent builder for `ConversionOptions`.
    pub fn builder() -> ConversionOptionsBuilder {
        ConversionOptionsBuilder::new()
    }
}

/// Builder for `ConversionOptions` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct ConversionOptionsBuilder {
    opts: ConversionOptions,
}

impl ConversionOptionsBuilder {
    pub fn new() -> Self {
        Self {
            opts: ConversionOptions::default(),
        }
    }
    pub fn device(mut self, v: Device) -> Self {
        self.opts.device = v;
        self
    }
    /// Sets the source type and the orientation default that follows it.
    pub fn source_type(mut self, v: SourceType) -> Self {
        self.opts.source_type = v;
        self.opts.orientation = v.default_orientation();
        self
    }
    pub fn two_bit(mut self, v: bool) -> Self {
        self.opts.two_bit = v;
        self
    }
    pub fn dither(mut self, v: DitherAlgorithm) -> Self {
        self.opts.dither = v;
        self
    }
    pub fn contrast(mut self, v: u8) -> Self {
        self.opts.contrast = v;
        self
    }
    pub fn gamma(mut self, v: f32) -> Self {
        self.opts.gamma = v;
        self
    }
    pub fn invert(mut self, v: bool) -> Self {
        self.opts.invert = v;
        self
    }
    pub fn pad_black(mut self, v: bool) -> Self {
        self.opts.pad_black = v;
        self
    }
    pub fn orientation(mut self, v: Orientation) -> Self {
        self.opts.orientation = v;
        self
    }
    pub fn split_mode(mut self, v: SplitMode) -> Self {
        self.opts.split_mode = v;
        self
    }
    pub fn include_overviews(mut self, v: bool) -> Self {
        self.opts.include_overviews = v;
        self
    }
    pub fn sideways_overviews(mut self, v: bool) -> Self {
        self.opts.sideways_overviews = v;
        self
    }
    pub fn manhwa(mut self, v: bool) -> Self {
        self.opts.manhwa = v;
        self
    }
    pub fn manhwa_overlap_percent(mut self, v: u8) -> Self {
        self.opts.manhwa_overlap_percent = v;
        self
    }
    pub fn image_mode(mut self, v: ImageMode) -> Self {
        self.opts.image_mode = v;
        self
    }
    pub fn video_fps(mut self, v: f32) -> Self {
        self.opts.video_fps = v;
        self
    }
    pub fn margins(mut self, horizontal: u8, vertical: u8) -> Self {
        self.opts.horizontal_margin_percent = horizontal;
        self.opts.vertical_margin_percent = vertical;
        self
    }
    pub fn streamed(mut self, v: bool) -> Self {
        self.opts.streamed = v;
        self
    }
    pub fn build(self) -> ConversionOptions {
        self.opts
    }
}
