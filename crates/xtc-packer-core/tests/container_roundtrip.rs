use image::{GrayImage, Luma};
use xtc_packer_core::container::{
    assemble_container, StreamWriter, FLAGS_HIGH_METADATA, FLAGS_LOW_METADATA,
};
use xtc_packer_core::metadata::{BookMetadata, TocEntry};
use xtc_packer_core::pack::{pack_page, packed_page_size};
use xtc_packer_core::reader::parse_container;
use xtc_packer_core::XtcError;

fn device_page(seed: u8) -> GrayImage {
    let mut img = GrayImage::new(480, 800);
    for (i, px) in img.pixels_mut().enumerate() {
        *px = Luma([if (i + seed as usize) % 5 == 0 { 255 } else { 0 }]);
    }
    img
}

fn chunks(n: usize, two_bit: bool) -> Vec<Vec<u8>> {
    (0..n)
        .map(|i| pack_page(&device_page(i as u8), two_bit))
        .collect()
}

fn sample_metadata() -> BookMetadata {
    BookMetadata {
        title: "Sample Book".into(),
        author: "A. Author".into(),
        publisher: "Pub".into(),
        language: "en".into(),
        create_time: 0,
        cover_page: Some(1),
        toc: vec![
            TocEntry {
                title: "One".into(),
                start_page: 1,
                end_page: 2,
            },
            TocEntry {
                title: "Two".into(),
                start_page: 3,
                end_page: 3,
            },
        ],
    }
}

#[test]
fn header_layout_without_metadata() {
    let bytes = assemble_container(&chunks(2, false), false, 480, 800, None).unwrap();
    assert_eq!(&bytes[0..4], b"XTC\0");
    assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 1); // version
    assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), 2); // pages
    assert_eq!(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 0);
    // metadataOffset 0, index at 48, data at 48 + 2*16
    assert_eq!(u64::from_le_bytes(bytes[16..24].try_into().unwrap()), 0);
    assert_eq!(u64::from_le_bytes(bytes[24..32].try_into().unwrap()), 48);
    assert_eq!(u64::from_le_bytes(bytes[32..40].try_into().unwrap()), 80);
    assert_eq!(u64::from_le_bytes(bytes[40..48].try_into().unwrap()), 0);
    assert_eq!(bytes.len(), 80 + 2 * packed_page_size(480, 800, false));
}

#[test]
fn two_bit_container_magic() {
    let bytes = assemble_container(&chunks(1, true), true, 480, 800, None).unwrap();
    assert_eq!(&bytes[0..4], b"XTCH");
    let container = parse_container(&bytes).unwrap();
    assert!(container.two_bit);
}

#[test]
fn index_entries_are_adjacent() {
    let bytes = assemble_container(&chunks(4, false), false, 480, 800, None).unwrap();
    let container = parse_container(&bytes).unwrap();
    assert_eq!(container.index.len(), 4);
    for pair in container.index.windows(2) {
        assert_eq!(pair[0].offset + pair[0].size as u64, pair[1].offset);
    }
    let last = container.index.last().unwrap();
    assert!(last.offset + last.size as u64 <= bytes.len() as u64);
    for entry in &container.index {
        assert_eq!(entry.width, 480);
        assert_eq!(entry.height, 800);
        assert_eq!(entry.size as usize, packed_page_size(480, 800, false));
    }
}

#[test]
fn container_roundtrips_chunks_bytewise() {
    let original = chunks(3, false);
    let bytes = assemble_container(&original, false, 480, 800, None).unwrap();
    let container = parse_container(&bytes).unwrap();
    for (i, chunk) in original.iter().enumerate() {
        assert_eq!(container.page_chunk(&bytes, i).unwrap(), &chunk[..]);
        let decoded = container.decode_page(&bytes, i).unwrap();
        assert_eq!(decoded.as_raw(), device_page(i as u8).as_raw());
    }
}

#[test]
fn metadata_block_roundtrip() {
    let meta = sample_metadata();
    let bytes = assemble_container(&chunks(3, false), false, 480, 800, Some(&meta)).unwrap();

    assert_eq!(
        u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        FLAGS_LOW_METADATA
    );
    assert_eq!(
        u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
        FLAGS_HIGH_METADATA
    );
    // metadata starts right after the extended header; title cell is there
    assert_eq!(u64::from_le_bytes(bytes[16..24].try_into().unwrap()), 56);
    assert_eq!(&bytes[56..56 + 11], b"Sample Book");
    assert_eq!(bytes[56 + 11], 0);
    // tocEntriesOffset = 56 + 240 + 16
    assert_eq!(u64::from_le_bytes(bytes[48..56].try_into().unwrap()), 312);

    let container = parse_container(&bytes).unwrap();
    let parsed = container.metadata.expect("metadata present");
    assert_eq!(parsed, meta);
}

#[test]
fn long_title_is_truncated_to_cell() {
    let mut meta = sample_metadata();
    meta.toc.clear();
    meta.title = "x".repeat(300);
    let bytes = assemble_container(&chunks(1, false), false, 480, 800, Some(&meta)).unwrap();
    let container = parse_container(&bytes).unwrap();
    assert_eq!(container.metadata.unwrap().title.len(), 127);
}

#[test]
fn cover_page_none_is_sentinel() {
    let mut meta = sample_metadata();
    meta.toc.clear();
    meta.cover_page = None;
    let bytes = assemble_container(&chunks(1, false), false, 480, 800, Some(&meta)).unwrap();
    // TOC header sits after the four text cells
    let toc_header = 56 + 240;
    assert_eq!(
        u16::from_le_bytes([bytes[toc_header + 4], bytes[toc_header + 5]]),
        0xFFFF
    );
    let container = parse_container(&bytes).unwrap();
    assert_eq!(container.metadata.unwrap().cover_page, None);
}

#[test]
fn unknown_flag_bits_are_preserved() {
    let mut bytes = assemble_container(&chunks(1, false), false, 480, 800, None).unwrap();
    bytes[11] |= 0x80; // reserved bit in flagsLow
    let container = parse_container(&bytes).unwrap();
    assert_eq!(container.flags_low, 0x8000_0000);
    assert!(container.metadata.is_none());
}

#[test]
fn bad_magic_is_malformed() {
    let mut bytes = assemble_container(&chunks(1, false), false, 480, 800, None).unwrap();
    bytes[3] = b'X';
    match parse_container(&bytes) {
        Err(XtcError::MalformedContainer(_)) => {}
        other => panic!("expected MalformedContainer, got {:?}", other.map(|c| c.page_count)),
    }
}

#[test]
fn truncated_file_is_malformed() {
    let bytes = assemble_container(&chunks(2, false), false, 480, 800, None).unwrap();
    match parse_container(&bytes[..bytes.len() - 10]) {
        Err(XtcError::MalformedContainer(_)) => {}
        other => panic!("expected MalformedContainer, got {:?}", other.map(|c| c.page_count)),
    }
    match parse_container(&bytes[..20]) {
        Err(XtcError::MalformedContainer(_)) => {}
        other => panic!("expected MalformedContainer, got {:?}", other.map(|c| c.page_count)),
    }
}

#[test]
fn index_entry_outside_data_region_is_malformed() {
    let mut bytes = assemble_container(&chunks(2, false), false, 480, 800, None).unwrap();
    // first index entry offset -> past end of file
    let huge = (bytes.len() as u64 + 1).to_le_bytes();
    bytes[48..56].copy_from_slice(&huge);
    match parse_container(&bytes) {
        Err(XtcError::MalformedContainer(_)) => {}
        other => panic!("expected MalformedContainer, got {:?}", other.map(|c| c.page_count)),
    }
}

#[test]
fn stream_writer_enforces_page_accounting() {
    let page = pack_page(&device_page(0), false);

    // too few pages at finish
    let writer = StreamWriter::new(Vec::new(), false, 2, 480, 800, None).unwrap();
    match writer.finish() {
        Err(XtcError::InternalInvariant(_)) => {}
        other => panic!("expected InternalInvariant, got {:?}", other.map(|b| b.len())),
    }

    // too many pages
    let mut writer = StreamWriter::new(Vec::new(), false, 1, 480, 800, None).unwrap();
    writer.write_page(&page).unwrap();
    match writer.write_page(&page) {
        Err(XtcError::InternalInvariant(_)) => {}
        other => panic!("expected InternalInvariant, got {other:?}"),
    }

    // wrong chunk size
    let mut writer = StreamWriter::new(Vec::new(), false, 1, 480, 800, None).unwrap();
    match writer.write_page(&page[..page.len() - 1]) {
        Err(XtcError::InternalInvariant(_)) => {}
        other => panic!("expected InternalInvariant, got {other:?}"),
    }
}

#[test]
fn toc_invariants_are_enforced_before_writing() {
    let mut meta = sample_metadata();
    meta.toc = vec![
        TocEntry {
            title: "A".into(),
            start_page: 1,
            end_page: 3,
        },
        TocEntry {
            title: "B".into(),
            start_page: 2,
            end_page: 4,
        },
    ];
    match StreamWriter::new(Vec::new(), false, 4, 480, 800, Some(&meta)) {
        Err(XtcError::InternalInvariant(_)) => {}
        other => panic!(
            "expected InternalInvariant, got {:?}",
            other.map(|_| "writer")
        ),
    }

    meta.toc = vec![TocEntry {
        title: "A".into(),
        start_page: 3,
        end_page: 2,
    }];
    assert!(StreamWriter::new(Vec::new(), false, 4, 480, 800, Some(&meta)).is_err());

    meta.toc = vec![TocEntry {
        title: "A".into(),
        start_page: 1,
        end_page: 9,
    }];
    assert!(StreamWriter::new(Vec::new(), false, 4, 480, 800, Some(&meta)).is_err());
}
