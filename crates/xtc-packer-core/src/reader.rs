use crate::container::{
    IndexEntry, COVER_PAGE_NONE, FLAGS_HIGH_METADATA, HEADER_LEN, HEADER_LEN_WITH_METADATA,
    INDEX_ENTRY_LEN, TOC_ENTRY_LEN,
};
use crate::error::{Result, XtcError};
use crate::metadata::{BookMetadata, TocEntry};
use crate::pack::unpack_page;
use image::GrayImage;

/// Parsed container structure. Holds the header, metadata and index;
/// page payloads are sliced out of the backing bytes on demand.
#[derive(Debug, Clone)]
pub struct Container {
    pub two_bit: bool,
    pub version: u16,
    pub page_count: u16,
    /// Raw flag words. Unknown bits are preserved, never interpreted.
    pub flags_low: u32,
    pub flags_high: u32,
    pub metadata: Option<BookMetadata>,
    pub index: Vec<IndexEntry>,
    pub data_offset: u64,
}

/// Parse and validate a container file.
pub fn parse_container(bytes: &[u8]) -> Result<Container> {
    if bytes.len() < HEADER_LEN as usize {
        return Err(XtcError::MalformedContainer(format!(
            "file too short for header ({} bytes)",
            bytes.len()
        )));
    }

    let two_bit = match &bytes[0..4] {
        [b'X', b'T', b'C', 0x00] => false,
        [b'X', b'T', b'C', 0x48] => true,
        magic => {
            return Err(XtcError::MalformedContainer(format!(
                "bad magic {magic:02x?}"
            )))
        }
    };

    let version = read_u16(bytes, 4);
    let page_count = read_u16(bytes, 6);
    let flags_low = read_u32(bytes, 8);
    let flags_high = read_u32(bytes, 12);
    let metadata_offset = read_u64(bytes, 16);
    let index_offset = read_u64(bytes, 24);
    let data_offset = read_u64(bytes, 32);

    let file_len = bytes.len() as u64;
    let has_metadata = flags_high & FLAGS_HIGH_METADATA != 0;
    if has_metadata && file_len < HEADER_LEN_WITH_METADATA {
        return Err(XtcError::MalformedContainer(
            "metadata flagged but header is truncated".into(),
        ));
    }

    let index_end = index_offset
        .checked_add(INDEX_ENTRY_LEN * page_count as u64)
        .filter(|&end| end <= file_len)
        .ok_or_else(|| {
            XtcError::MalformedContainer(format!(
                "index table for {page_count} pages exceeds file size {file_len}"
            ))
        })?;
    if data_offset < index_end || data_offset > file_len {
        return Err(XtcError::MalformedContainer(format!(
            "data offset {data_offset} outside [{index_end}, {file_len}]"
        )));
    }

    let metadata = if has_metadata {
        Some(parse_metadata(bytes, metadata_offset, read_u64(bytes, 48))?)
    } else {
        None
    };

    let mut index = Vec::with_capacity(page_count as usize);
    for i in 0..page_count as u64 {
        let at = (index_offset + i * INDEX_ENTRY_LEN) as usize;
        let entry = IndexEntry {
            offset: read_u64(bytes, at),
            size: read_u32(bytes, at + 8),
            width: read_u16(bytes, at + 12),
            height: read_u16(bytes, at + 14),
        };
        let end = entry.offset.checked_add(entry.size as u64);
        if entry.offset < data_offset || !end.is_some_and(|e| e <= file_len) {
            return Err(XtcError::MalformedContainer(format!(
                "index entry {i} points outside the data region"
            )));
        }
        index.push(entry);
    }

    Ok(Container {
        two_bit,
        version,
        page_count,
        flags_low,
        flags_high,
        metadata,
        index,
        data_offset,
    })
}

impl Container {
    /// Raw chunk bytes for a page, header included.
    pub fn page_chunk<'a>(&self, bytes: &'a [u8], page: usize) -> Result<&'a [u8]> {
        let entry = self.index.get(page).ok_or_else(|| {
            XtcError::MalformedContainer(format!(
                "page {page} out of range ({} pages)",
                self.index.len()
            ))
        })?;
        Ok(&bytes[entry.offset as usize..(entry.offset + entry.size as u64) as usize])
    }

    /// Decode a page back to the quantized grayscale raster.
    pub fn decode_page(&self, bytes: &[u8], page: usize) -> Result<GrayImage> {
        let chunk = self.page_chunk(bytes, page)?;
        let img = unpack_page(chunk)?;
        Ok(img)
    }
}

fn parse_metadata(bytes: &[u8], metadata_offset: u64, toc_entries_offset: u64) -> Result<BookMetadata> {
    let at = metadata_offset as usize;
    let text_end = at
        .checked_add(240 + 16)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            XtcError::MalformedContainer("metadata block exceeds file size".into())
        })?;

    let title = read_text_cell(&bytes[at..at + 128]);
    let author = read_text_cell(&bytes[at + 128..at + 192]);
    let publisher = read_text_cell(&bytes[at + 192..at + 224]);
    let language = read_text_cell(&bytes[at + 224..at + 240]);

    let toc_header = at + 240;
    let create_time = read_u32(bytes, toc_header);
    let cover = read_u16(bytes, toc_header + 4);
    let chapter_count = read_u16(bytes, toc_header + 6);

    let entries_at = if toc_entries_offset != 0 {
        toc_entries_offset as usize
    } else {
        text_end
    };
    let entries_end = entries_at
        .checked_add(TOC_ENTRY_LEN as usize * chapter_count as usize)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            XtcError::MalformedContainer(format!(
                "TOC with {chapter_count} chapters exceeds file size"
            ))
        })?;

    let mut toc = Vec::with_capacity(chapter_count as usize);
    let mut at = entries_at;
    while at < entries_end {
        toc.push(TocEntry {
            title: read_text_cell(&bytes[at..at + 80]),
            start_page: read_u16(bytes, at + 80),
            end_page: read_u16(bytes, at + 82),
        });
        at += TOC_ENTRY_LEN as usize;
    }

    Ok(BookMetadata {
        title,
        author,
        publisher,
        language,
        create_time,
        cover_page: if cover == COVER_PAGE_NONE {
            None
        } else {
            Some(cover)
        },
        toc,
    })
}

fn read_text_cell(cell: &[u8]) -> String {
    let end = cell.iter().position(|&b| b == 0).unwrap_or(cell.len());
    String::from_utf8_lossy(&cell[..end]).into_owned()
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}
