use image::{Rgba, RgbaImage};
use xtc_packer_core::config::{ConversionOptions, DitherAlgorithm, Orientation};
use xtc_packer_core::metadata::{validate_toc, BookMetadata, PageMapping, TocEntry};
use xtc_packer_core::pipeline::{convert_frames, CancelToken};
use xtc_packer_core::reader::parse_container;
use xtc_packer_core::XtcError;

fn toc(entries: &[(&str, u16, u16)]) -> Vec<TocEntry> {
    entries
        .iter()
        .map(|&(title, start_page, end_page)| TocEntry {
            title: title.into(),
            start_page,
            end_page,
        })
        .collect()
}

/// Fan-out counts (2, 1, 3, 1) push chapter A(1..=2) to 1..=3 and
/// B(3..=4) to 4..=7.
#[test]
fn remap_follows_fanout() {
    let mut mapping = PageMapping::new();
    for count in [2, 1, 3, 1] {
        mapping.push(count);
    }
    assert_eq!(mapping.total_pages(), 7);

    let remapped = mapping
        .remap_toc(&toc(&[("A", 1, 2), ("B", 3, 4)]))
        .unwrap();
    assert_eq!(remapped, toc(&[("A", 1, 3), ("B", 4, 7)]));
    validate_toc(&remapped, 7).unwrap();
}

#[test]
fn remap_rejects_out_of_range_source_pages() {
    let mut mapping = PageMapping::new();
    mapping.push(1);
    match mapping.remap_toc(&toc(&[("A", 1, 2)])) {
        Err(XtcError::InternalInvariant(_)) => {}
        other => panic!("expected InternalInvariant, got {other:?}"),
    }
    assert!(mapping.remap_toc(&toc(&[("A", 0, 1)])).is_err());
}

#[test]
fn validate_toc_rejects_overlap_and_overrun() {
    validate_toc(&toc(&[("A", 1, 2), ("B", 3, 4)]), 4).unwrap();
    assert!(validate_toc(&toc(&[("A", 1, 3), ("B", 3, 4)]), 4).is_err());
    assert!(validate_toc(&toc(&[("A", 2, 1)]), 4).is_err());
    assert!(validate_toc(&toc(&[("A", 1, 5)]), 4).is_err());
}

/// End-to-end: overview fan-out doubles every frame, and the stored TOC
/// tracks the emitted pages.
#[test]
fn container_toc_is_remapped_through_fanout() {
    let opts = ConversionOptions {
        orientation: Orientation::Portrait,
        include_overviews: true,
        dither: DitherAlgorithm::None,
        ..ConversionOptions::default()
    };
    let frames = vec![
        RgbaImage::from_pixel(400, 700, Rgba([255, 255, 255, 255])),
        RgbaImage::from_pixel(400, 700, Rgba([0, 0, 0, 255])),
    ];
    let metadata = BookMetadata {
        title: "Mapped".into(),
        toc: toc(&[("A", 1, 1), ("B", 2, 2)]),
        ..BookMetadata::default()
    };

    let out = convert_frames(&frames, &opts, Some(&metadata), &CancelToken::new()).unwrap();
    assert_eq!(out.page_count, 4);

    let container = parse_container(&out.bytes).unwrap();
    let parsed = container.metadata.expect("metadata stored");
    assert_eq!(parsed.toc, toc(&[("A", 1, 2), ("B", 3, 4)]));
    // last chapter ends at the total emitted page count
    assert_eq!(parsed.toc.last().unwrap().end_page, out.page_count);
}

/// A TOC that references pages the conversion never emitted is caught
/// before the container is written.
#[test]
fn stale_toc_fails_conversion() {
    let opts = ConversionOptions {
        orientation: Orientation::Portrait,
        dither: DitherAlgorithm::None,
        ..ConversionOptions::default()
    };
    let frames = vec![RgbaImage::from_pixel(100, 100, Rgba([9, 9, 9, 255]))];
    let metadata = BookMetadata {
        title: "Stale".into(),
        toc: toc(&[("A", 1, 3)]),
        ..BookMetadata::default()
    };
    match convert_frames(&frames, &opts, Some(&metadata), &CancelToken::new()) {
        Err(XtcError::InternalInvariant(_)) => {}
        other => panic!(
            "expected InternalInvariant, got {:?}",
            other.map(|o| o.page_count)
        ),
    }
}
