use image::{Rgba, RgbaImage};
use xtc_packer_core::config::{ConversionOptions, DitherAlgorithm, Orientation};
use xtc_packer_core::metadata::{BookMetadata, TocEntry};
use xtc_packer_core::pipeline::{convert_frames, convert_frames_streamed, CancelToken};
use xtc_packer_core::reader::parse_container;

fn gradient(w: u32, h: u32, seed: u8) -> RgbaImage {
    let mut img = RgbaImage::new(w, h);
    for (i, px) in img.pixels_mut().enumerate() {
        let v = ((i + seed as usize) * 11 % 256) as u8;
        *px = Rgba([v, v, v, 255]);
    }
    img
}

fn sample_metadata() -> BookMetadata {
    BookMetadata {
        title: "Stream Test".into(),
        author: "Writer".into(),
        create_time: 0,
        toc: vec![
            TocEntry {
                title: "A".into(),
                start_page: 1,
                end_page: 1,
            },
            TocEntry {
                title: "B".into(),
                start_page: 2,
                end_page: 2,
            },
        ],
        ..BookMetadata::default()
    }
}

/// Buffered and streamed output are byte-identical for the same input
/// and options.
#[test]
fn streamed_output_matches_buffered() {
    let frames = vec![gradient(600, 900, 3), gradient(900, 700, 42)];
    for two_bit in [false, true] {
        let opts = ConversionOptions {
            two_bit,
            dither: DitherAlgorithm::Stucki,
            contrast: 2,
            ..ConversionOptions::default()
        };
        let meta = sample_metadata();

        let buffered = convert_frames(&frames, &opts, Some(&meta), &CancelToken::new()).unwrap();
        let (summary, streamed) = convert_frames_streamed(
            &frames,
            &opts,
            Some(&meta),
            &CancelToken::new(),
            Vec::new(),
        )
        .unwrap();

        assert_eq!(summary.page_count, buffered.page_count);
        assert_eq!(streamed, buffered.bytes, "two_bit={two_bit}");
    }
}

#[test]
fn streamed_manhwa_matches_buffered() {
    let mut strip = RgbaImage::new(480, 2000);
    for y in 0..2000 {
        let v = if y % 3 == 0 { 30 } else { 210 };
        for x in 0..480 {
            strip.put_pixel(x, y, Rgba([v, v, v, 255]));
        }
    }
    let opts = ConversionOptions {
        manhwa: true,
        manhwa_overlap_percent: 30,
        dither: DitherAlgorithm::None,
        ..ConversionOptions::default()
    };
    let buffered = convert_frames(&[strip.clone()], &opts, None, &CancelToken::new()).unwrap();
    let (summary, streamed) =
        convert_frames_streamed(&[strip], &opts, None, &CancelToken::new(), Vec::new()).unwrap();
    assert_eq!(summary.page_count, buffered.page_count);
    assert_eq!(streamed, buffered.bytes);
}

/// The streaming writer emits header and index before data: the index of
/// the streamed file is complete and correct when parsed.
#[test]
fn streamed_index_is_self_consistent() {
    let frames = vec![gradient(700, 1100, 9)];
    let opts = ConversionOptions {
        dither: DitherAlgorithm::None,
        ..ConversionOptions::default()
    };
    let (summary, bytes) =
        convert_frames_streamed(&frames, &opts, None, &CancelToken::new(), Vec::new()).unwrap();
    let container = parse_container(&bytes).unwrap();
    assert_eq!(container.page_count, summary.page_count);
    for pair in container.index.windows(2) {
        assert_eq!(pair[0].offset + pair[0].size as u64, pair[1].offset);
    }
    let last = container.index.last().unwrap();
    assert_eq!(last.offset + last.size as u64, bytes.len() as u64);
}
