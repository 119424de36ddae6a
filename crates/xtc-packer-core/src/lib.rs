//! Core library for converting paginated images into XTC/XTCH containers.
//!
//! - Pipeline: crop, fused grayscale filter, fan-out (overviews / splits /
//!   manhwa slices), dithering, bit-packing
//! - Codec: XTG/XTH page chunks inside an XTC (1-bit) or XTCH (2-bit)
//!   container with index, optional book metadata and TOC
//! - Targets fixed portrait e-ink panels: 480x800 (X4) and 528x792 (X3)
//!
//! Quick example:
//! ```ignore
//! use xtc_packer_core::{convert_frames, CancelToken, ConversionOptions};
//! # fn main() -> anyhow::Result<()> {
//! let frame = image::open("page.png")?.to_rgba8();
//! let opts = ConversionOptions::default();
//! let out = convert_frames(&[frame], &opts, None, &CancelToken::new())?;
//! std::fs::write("book.xtc", &out.bytes)?;
//! # Ok(()) }
//! ```

pub mod config;
pub mod container;
pub mod dither;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod metadata;
pub mod pack;
pub mod pipeline;
pub mod pool;
pub mod raster;
pub mod reader;
pub mod stitcher;

pub use config::*;
pub use container::*;
pub use error::*;
pub use metadata::*;
pub use pipeline::*;
pub use reader::*;

/// Convenience prelude for common types and functions.
/// Importing `xtc_packer_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::config::{
        ConversionOptions, ConversionOptionsBuilder, Device, DitherAlgorithm, ImageMode,
        Orientation, SourceType, SplitMode,
    };
    pub use crate::container::{assemble_container, IndexEntry, StreamWriter};
    pub use crate::error::{Result, XtcError};
    pub use crate::metadata::{BookMetadata, PageMapping, TocEntry};
    pub use crate::pipeline::{
        calculate_output_page_count, convert_frames, convert_frames_streamed, process_frame,
        CancelToken, ConvertOutput, FrameOutput, StreamSummary,
    };
    pub use crate::reader::{parse_container, Container};
}
