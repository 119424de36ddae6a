use crate::config::{ConversionOptions, ImageMode, Orientation, SourceType, SplitMode};
use crate::container::{assemble_container, StreamWriter};
use crate::dither::dither_with_scratch;
use crate::error::{Result, XtcError};
use crate::filter::grayscale_filter;
use crate::geometry::{
    axis_crop_rect, needs_landscape_split, orientation_angle, overlap_segments, CropRect,
};
use crate::metadata::{BookMetadata, PageMapping};
use crate::pack::pack_page;
use crate::pool::ScratchPool;
use crate::raster::{
    extract_region, resize_cover, resize_crop, resize_fill, resize_letterbox, rotate,
};
use crate::stitcher::ManhwaStitcher;
use image::imageops;
use image::{GrayImage, RgbaImage};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Cooperative cancellation handle. Cloneable; checked between frames and
/// between fan-out pages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(XtcError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Packed pages produced from one source frame, in fan-out order.
pub struct FrameOutput {
    pub chunks: Vec<Vec<u8>>,
    /// First dithered page, for callers that surface previews. The codec
    /// never requires it.
    pub preview: Option<GrayImage>,
}

/// Result of a buffered conversion.
pub struct ConvertOutput {
    /// Complete container bytes.
    pub bytes: Vec<u8>,
    pub page_count: u16,
    pub mapping: PageMapping,
}

/// Result of a streamed conversion (the bytes already went to the writer).
pub struct StreamSummary {
    pub page_count: u16,
    pub mapping: PageMapping,
}

/// Pages this frame fans out into, computed from the cropped dimensions
/// alone. Manhwa mode is content-dependent and not covered here.
pub fn calculate_output_page_count(crop_w: u32, crop_h: u32, opts: &ConversionOptions) -> u32 {
    let (dev_w, dev_h) = opts.device.dimensions();
    let mut count = 0u32;
    if opts.sideways_overviews && !opts.manhwa {
        count += 1;
    }
    if opts.include_overviews && !opts.manhwa {
        count += 1;
    }
    if single_image_mode(opts) {
        count += 1;
    } else if opts.manhwa {
        // slices counted as they are emitted
    } else if opts.orientation == Orientation::Portrait {
        count += 1;
    } else if opts.split_mode != SplitMode::NoSplit
        && needs_landscape_split(crop_w, crop_h, dev_w, dev_h)
    {
        count += match opts.split_mode {
            SplitMode::Overlap => overlap_segments(crop_w, crop_h, dev_w, dev_h).len() as u32,
            SplitMode::Split => 2,
            SplitMode::NoSplit => unreachable!(),
        };
    } else {
        count += 1;
    }
    count
}

/// Process one source frame: crop, fused filter, fan-out, dither, pack.
pub fn process_frame(
    index: usize,
    frame: &RgbaImage,
    opts: &ConversionOptions,
    pool: &ScratchPool,
    cancel: &CancelToken,
) -> Result<FrameOutput> {
    let gray = cropped_gray(index, frame, opts)?;
    let pages = fan_out(&gray, opts);

    let mut chunks = Vec::with_capacity(pages.len());
    let mut preview = None;
    for mut page in pages {
        cancel.check()?;
        finish_page(&mut page, opts, pool)?;
        if preview.is_none() {
            preview = Some(page.clone());
        }
        chunks.push(pack_page(&page, opts.two_bit));
    }
    Ok(FrameOutput { chunks, preview })
}

/// Convert decoded frames into a complete container buffer.
#[instrument(skip_all)]
pub fn convert_frames(
    frames: &[RgbaImage],
    opts: &ConversionOptions,
    metadata: Option<&BookMetadata>,
    cancel: &CancelToken,
) -> Result<ConvertOutput> {
    opts.validate()?;
    let (dev_w, dev_h) = opts.device.dimensions();
    let pool = ScratchPool::default();
    info!(frames = frames.len(), two_bit = opts.two_bit, "converting");

    let (chunks, mapping) = if opts.manhwa {
        let (slices, mapping) = stitch_frames(frames, opts, cancel)?;
        let mut chunks = Vec::with_capacity(slices.len());
        for mut slice in slices {
            cancel.check()?;
            finish_page(&mut slice, opts, &pool)?;
            chunks.push(pack_page(&slice, opts.two_bit));
        }
        (chunks, mapping)
    } else {
        process_batch(frames, opts, &pool, cancel)?
    };

    let page_count = checked_page_count(chunks.len())?;
    let remapped = remapped_metadata(metadata, &mapping)?;
    let bytes = assemble_container(&chunks, opts.two_bit, dev_w, dev_h, remapped.as_ref())?;
    info!(pages = page_count, bytes = bytes.len(), "container assembled");
    Ok(ConvertOutput {
        bytes,
        page_count,
        mapping,
    })
}

/// Convert decoded frames, emitting header, metadata and index before any
/// page data. Output bytes are identical to the buffered mode.
#[instrument(skip_all)]
pub fn convert_frames_streamed<W: Write>(
    frames: &[RgbaImage],
    opts: &ConversionOptions,
    metadata: Option<&BookMetadata>,
    cancel: &CancelToken,
    writer: W,
) -> Result<(StreamSummary, W)> {
    opts.validate()?;
    let (dev_w, dev_h) = opts.device.dimensions();
    let pool = ScratchPool::default();

    if opts.manhwa {
        // Slice counts depend on pixel content, so the stitch stages run
        // first; dither and pack stream out afterwards.
        let (slices, mapping) = stitch_frames(frames, opts, cancel)?;
        let page_count = checked_page_count(slices.len())?;
        let remapped = remapped_metadata(metadata, &mapping)?;
        let mut stream = StreamWriter::new(
            writer,
            opts.two_bit,
            page_count,
            dev_w,
            dev_h,
            remapped.as_ref(),
        )?;
        for mut slice in slices {
            cancel.check()?;
            finish_page(&mut slice, opts, &pool)?;
            stream.write_page(&pack_page(&slice, opts.two_bit))?;
        }
        let writer = stream.finish()?;
        return Ok((
            StreamSummary {
                page_count,
                mapping,
            },
            writer,
        ));
    }

    // Dimensions-only pre-pass: every emitted page is device-sized, so
    // the index needs nothing but the fan-out counts.
    let mut mapping = PageMapping::new();
    for (index, frame) in frames.iter().enumerate() {
        let (w, h) = frame.dimensions();
        if w == 0 || h == 0 {
            skip_or_fail(index, frames.len())?;
            mapping.push(0);
            continue;
        }
        let crop = frame_crop(frame, opts);
        mapping.push(calculate_output_page_count(crop.w, crop.h, opts));
    }

    let page_count = checked_page_count(mapping.total_pages() as usize)?;
    let remapped = remapped_metadata(metadata, &mapping)?;
    let mut stream = StreamWriter::new(
        writer,
        opts.two_bit,
        page_count,
        dev_w,
        dev_h,
        remapped.as_ref(),
    )?;

    for (index, frame) in frames.iter().enumerate() {
        cancel.check()?;
        let (w, h) = frame.dimensions();
        if w == 0 || h == 0 {
            continue;
        }
        let output = process_frame(index, frame, opts, &pool, cancel)?;
        debug!(frame = index, pages = output.chunks.len(), "frame streamed");
        for chunk in &output.chunks {
            stream.write_page(chunk)?;
        }
    }

    let writer = stream.finish()?;
    Ok((
        StreamSummary {
            page_count,
            mapping,
        },
        writer,
    ))
}

// ---------- per-frame stages ----------

fn frame_crop(frame: &RgbaImage, opts: &ConversionOptions) -> CropRect {
    let (w, h) = frame.dimensions();
    axis_crop_rect(
        w,
        h,
        opts.horizontal_margin_percent,
        opts.vertical_margin_percent,
        opts.manhwa,
    )
}

fn cropped_gray(index: usize, frame: &RgbaImage, opts: &ConversionOptions) -> Result<GrayImage> {
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return Err(XtcError::FrameDecodeFailure {
            index,
            reason: format!("empty frame ({w}x{h})"),
        });
    }
    let crop = frame_crop(frame, opts);
    let cropped = imageops::crop_imm(frame, crop.x, crop.y, crop.w, crop.h).to_image();
    Ok(grayscale_filter(
        &cropped,
        opts.contrast,
        opts.clamped_gamma(),
        opts.invert,
    ))
}

fn single_image_mode(opts: &ConversionOptions) -> bool {
    opts.source_type == SourceType::Image && opts.split_mode == SplitMode::NoSplit && !opts.manhwa
}

/// Fixed fan-out order: sideways overview, overview, then exactly one of
/// the layout paths. Manhwa frames produce nothing here; the stitcher owns
/// their pages.
fn fan_out(gray: &GrayImage, opts: &ConversionOptions) -> Vec<GrayImage> {
    let (dev_w, dev_h) = opts.device.dimensions();
    let sharp = !opts.two_bit;
    let pad = opts.pad_color();
    let mut pages = Vec::new();

    if opts.sideways_overviews && !opts.manhwa {
        pages.push(resize_letterbox(&rotate(gray, 90), dev_w, dev_h, pad, sharp));
    }
    if opts.include_overviews && !opts.manhwa {
        pages.push(resize_letterbox(gray, dev_w, dev_h, pad, sharp));
    }

    if single_image_mode(opts) {
        let oriented = rotate(gray, orientation_angle(opts.orientation));
        pages.push(match opts.image_mode {
            ImageMode::Cover => resize_cover(&oriented, dev_w, dev_h, sharp),
            ImageMode::Letterbox => resize_letterbox(&oriented, dev_w, dev_h, pad, sharp),
            ImageMode::Fill => resize_fill(&oriented, dev_w, dev_h, sharp),
            ImageMode::Crop => resize_crop(&oriented, dev_w, dev_h, pad),
        });
    } else if opts.manhwa {
        // stitcher path
    } else if opts.orientation == Orientation::Portrait {
        pages.push(resize_letterbox(gray, dev_w, dev_h, pad, sharp));
    } else {
        let (w, h) = gray.dimensions();
        if opts.split_mode != SplitMode::NoSplit && needs_landscape_split(w, h, dev_w, dev_h) {
            match opts.split_mode {
                SplitMode::Overlap => {
                    for seg in overlap_segments(w, h, dev_w, dev_h) {
                        let region = extract_region(gray, &CropRect::new(0, seg.y, w, seg.h));
                        pages.push(resize_letterbox(
                            &rotate(&region, 90),
                            dev_w,
                            dev_h,
                            pad,
                            sharp,
                        ));
                    }
                }
                SplitMode::Split => {
                    let half = h / 2;
                    for (y, seg_h) in [(0, half), (half, h - half)] {
                        let region = extract_region(gray, &CropRect::new(0, y, w, seg_h));
                        pages.push(resize_letterbox(
                            &rotate(&region, 90),
                            dev_w,
                            dev_h,
                            pad,
                            sharp,
                        ));
                    }
                }
                SplitMode::NoSplit => unreachable!(),
            }
        } else {
            pages.push(resize_letterbox(&rotate(gray, 90), dev_w, dev_h, pad, sharp));
        }
    }
    pages
}

/// Dither a device-resolution page in place using pooled scratch.
fn finish_page(page: &mut GrayImage, opts: &ConversionOptions, pool: &ScratchPool) -> Result<()> {
    let (dev_w, dev_h) = opts.device.dimensions();
    let mut scratch = pool.acquire((dev_w * dev_h) as usize)?;
    dither_with_scratch(page, opts.dither, opts.two_bit, &mut scratch);
    pool.release(scratch);
    Ok(())
}

// ---------- batch processing ----------

/// Frames are independent; workers may process them in parallel. The
/// ordered collect restores source order before results are folded.
#[cfg(feature = "parallel")]
fn process_batch(
    frames: &[RgbaImage],
    opts: &ConversionOptions,
    pool: &ScratchPool,
    cancel: &CancelToken,
) -> Result<(Vec<Vec<u8>>, PageMapping)> {
    let results: Vec<Result<FrameOutput>> = frames
        .par_iter()
        .enumerate()
        .map(|(index, frame)| {
            cancel.check()?;
            process_frame(index, frame, opts, pool, cancel)
        })
        .collect();
    fold_outputs(results, frames.len())
}

#[cfg(not(feature = "parallel"))]
fn process_batch(
    frames: &[RgbaImage],
    opts: &ConversionOptions,
    pool: &ScratchPool,
    cancel: &CancelToken,
) -> Result<(Vec<Vec<u8>>, PageMapping)> {
    let mut results = Vec::with_capacity(frames.len());
    for (index, frame) in frames.iter().enumerate() {
        cancel.check()?;
        results.push(process_frame(index, frame, opts, pool, cancel));
    }
    fold_outputs(results, frames.len())
}

/// Merge per-frame results in source order, applying the decode-failure
/// policy: skip in a batch, fatal for single-frame conversions.
fn fold_outputs(
    results: Vec<Result<FrameOutput>>,
    total: usize,
) -> Result<(Vec<Vec<u8>>, PageMapping)> {
    let mut chunks = Vec::new();
    let mut mapping = PageMapping::new();
    for result in results {
        match result {
            Ok(output) => {
                mapping.push(output.chunks.len() as u32);
                chunks.extend(output.chunks);
            }
            Err(XtcError::FrameDecodeFailure { index, reason }) => {
                skip_or_fail_with(index, reason, total)?;
                mapping.push(0);
            }
            Err(other) => return Err(other),
        }
    }
    Ok((chunks, mapping))
}

fn skip_or_fail(index: usize, total: usize) -> Result<()> {
    skip_or_fail_with(index, "empty frame".into(), total)
}

fn skip_or_fail_with(index: usize, reason: String, total: usize) -> Result<()> {
    if total > 1 {
        warn!(frame = index, %reason, "skipping undecodable frame");
        Ok(())
    } else {
        Err(XtcError::FrameDecodeFailure { index, reason })
    }
}

// ---------- manhwa ----------

/// Run crop, filter and stitch over all frames, attributing emitted
/// slices to the frame whose append completed them (the padded tail goes
/// to the last frame).
fn stitch_frames(
    frames: &[RgbaImage],
    opts: &ConversionOptions,
    cancel: &CancelToken,
) -> Result<(Vec<GrayImage>, PageMapping)> {
    let (dev_w, dev_h) = opts.device.dimensions();
    let mut stitcher = ManhwaStitcher::new(
        dev_w,
        dev_h,
        opts.manhwa_overlap_percent,
        opts.pad_color(),
        !opts.two_bit,
    );
    let mut slices = Vec::new();
    let mut mapping = PageMapping::new();

    for (index, frame) in frames.iter().enumerate() {
        cancel.check()?;
        let gray = match cropped_gray(index, frame, opts) {
            Ok(gray) => gray,
            Err(XtcError::FrameDecodeFailure { index, reason }) => {
                skip_or_fail_with(index, reason, frames.len())?;
                mapping.push(0);
                continue;
            }
            Err(other) => return Err(other),
        };
        let mut emitted = stitcher.append(&gray);
        mapping.push(emitted.len() as u32);
        slices.append(&mut emitted);
    }
    if let Some(tail) = stitcher.finish() {
        slices.push(tail);
        mapping.extend_last(1);
    }
    debug!(slices = slices.len(), "strip sliced");
    Ok((slices, mapping))
}

// ---------- shared ----------

fn checked_page_count(pages: usize) -> Result<u16> {
    u16::try_from(pages).map_err(|_| {
        XtcError::InternalInvariant(format!("{pages} pages exceed the container's u16 page count"))
    })
}

fn remapped_metadata(
    metadata: Option<&BookMetadata>,
    mapping: &PageMapping,
) -> Result<Option<BookMetadata>> {
    match metadata {
        None => Ok(None),
        Some(meta) => {
            let toc = mapping.remap_toc(&meta.toc)?;
            Ok(Some(BookMetadata {
                toc,
                ..meta.clone()
            }))
        }
    }
}
