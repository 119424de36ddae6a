use crate::error::{Result, XtcError};
use crate::metadata::{validate_toc, BookMetadata};
use crate::pack::packed_page_size;
use std::io::Write;

/// Container magics. The final byte distinguishes bit depth.
pub const XTC_MAGIC: [u8; 4] = *b"XTC\0";
pub const XTCH_MAGIC: [u8; 4] = *b"XTCH";

pub const CONTAINER_VERSION: u16 = 1;

/// Header length without / with the trailing TOC-entries offset.
pub const HEADER_LEN: u64 = 48;
pub const HEADER_LEN_WITH_METADATA: u64 = 56;

/// Flag words announcing the metadata block.
pub const FLAGS_LOW_METADATA: u32 = 0x0100_0100;
pub const FLAGS_HIGH_METADATA: u32 = 0x0000_0001;

pub const INDEX_ENTRY_LEN: u64 = 16;

/// `coverPage` sentinel for "no cover".
pub const COVER_PAGE_NONE: u16 = 0xFFFF;

const TITLE_CELL: usize = 128;
const AUTHOR_CELL: usize = 64;
const PUBLISHER_CELL: usize = 32;
const LANGUAGE_CELL: usize = 16;
const TOC_HEADER_LEN: u64 = 16;
pub const TOC_ENTRY_LEN: u64 = 96;
const TOC_TITLE_CELL: usize = 80;

/// Fixed text cells before the TOC header.
const TEXT_CELLS_LEN: u64 = (TITLE_CELL + AUTHOR_CELL + PUBLISHER_CELL + LANGUAGE_CELL) as u64;

/// One 16-byte index table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Absolute byte offset of the chunk within the file.
    pub offset: u64,
    /// Full chunk length including its 22-byte header.
    pub size: u32,
    pub width: u16,
    pub height: u16,
}

fn metadata_block_len(meta: &BookMetadata) -> u64 {
    TEXT_CELLS_LEN + TOC_HEADER_LEN + TOC_ENTRY_LEN * meta.toc.len() as u64
}

/// Streaming container writer.
///
/// The layout is a linear state machine: header and metadata, then the
/// index table, then data chunks in page order. Page count and per-page
/// dimensions are fixed at construction, which is what lets the index be
/// written before any page is packed.
pub struct StreamWriter<W: Write> {
    writer: W,
    chunk_len: usize,
    page_count: u16,
    pages_written: u16,
}

impl<W: Write> StreamWriter<W> {
    /// Write header, optional metadata block and the full index table.
    ///
    /// The TOC inside `metadata` must already be remapped to emitted
    /// pages; it is validated against `page_count` before anything is
    /// written.
    pub fn new(
        mut writer: W,
        two_bit: bool,
        page_count: u16,
        page_w: u32,
        page_h: u32,
        metadata: Option<&BookMetadata>,
    ) -> Result<Self> {
        if let Some(meta) = metadata {
            validate_toc(&meta.toc, page_count)?;
        }

        let header_len = if metadata.is_some() {
            HEADER_LEN_WITH_METADATA
        } else {
            HEADER_LEN
        };
        let meta_len = metadata.map(metadata_block_len).unwrap_or(0);
        let metadata_offset = if metadata.is_some() { header_len } else { 0 };
        let index_offset = header_len + meta_len;
        let data_offset = index_offset + INDEX_ENTRY_LEN * page_count as u64;
        let chunk_len = packed_page_size(page_w, page_h, two_bit);

        writer.write_all(if two_bit { &XTCH_MAGIC } else { &XTC_MAGIC })?;
        writer.write_all(&CONTAINER_VERSION.to_le_bytes())?;
        writer.write_all(&page_count.to_le_bytes())?;
        let (flags_low, flags_high) = if metadata.is_some() {
            (FLAGS_LOW_METADATA, FLAGS_HIGH_METADATA)
        } else {
            (0, 0)
        };
        writer.write_all(&flags_low.to_le_bytes())?;
        writer.write_all(&flags_high.to_le_bytes())?;
        writer.write_all(&metadata_offset.to_le_bytes())?;
        writer.write_all(&index_offset.to_le_bytes())?;
        writer.write_all(&data_offset.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?; // reserved
        if metadata.is_some() {
            let toc_entries_offset = metadata_offset + TEXT_CELLS_LEN + TOC_HEADER_LEN;
            writer.write_all(&toc_entries_offset.to_le_bytes())?;
        }

        if let Some(meta) = metadata {
            write_text_cell(&mut writer, &meta.title, TITLE_CELL)?;
            write_text_cell(&mut writer, &meta.author, AUTHOR_CELL)?;
            write_text_cell(&mut writer, &meta.publisher, PUBLISHER_CELL)?;
            write_text_cell(&mut writer, &meta.language, LANGUAGE_CELL)?;

            writer.write_all(&meta.create_time.to_le_bytes())?;
            writer.write_all(&meta.cover_page.unwrap_or(COVER_PAGE_NONE).to_le_bytes())?;
            writer.write_all(&(meta.toc.len() as u16).to_le_bytes())?;
            writer.write_all(&[0u8; 8])?;

            for entry in &meta.toc {
                write_text_cell(&mut writer, &entry.title, TOC_TITLE_CELL)?;
                writer.write_all(&entry.start_page.to_le_bytes())?;
                writer.write_all(&entry.end_page.to_le_bytes())?;
                writer.write_all(&[0u8; 12])?;
            }
        }

        for i in 0..page_count as u64 {
            let entry = IndexEntry {
                offset: data_offset + i * chunk_len as u64,
                size: chunk_len as u32,
                width: page_w as u16,
                height: page_h as u16,
            };
            write_index_entry(&mut writer, &entry)?;
        }

        Ok(Self {
            writer,
            chunk_len,
            page_count,
            pages_written: 0,
        })
    }

    /// Append the next page chunk. Its length must match the size the
    /// index already promised.
    pub fn write_page(&mut self, chunk: &[u8]) -> Result<()> {
        if self.pages_written >= self.page_count {
            return Err(XtcError::InternalInvariant(format!(
                "page {} written to a {}-page container",
                self.pages_written + 1,
                self.page_count
            )));
        }
        if chunk.len() != self.chunk_len {
            return Err(XtcError::InternalInvariant(format!(
                "chunk length {} does not match indexed size {}",
                chunk.len(),
                self.chunk_len
            )));
        }
        self.writer.write_all(chunk)?;
        self.pages_written += 1;
        Ok(())
    }

    pub fn pages_written(&self) -> u16 {
        self.pages_written
    }

    /// Close the container, verifying every indexed page arrived.
    pub fn finish(mut self) -> Result<W> {
        if self.pages_written != self.page_count {
            return Err(XtcError::InternalInvariant(format!(
                "container closed after {} of {} pages",
                self.pages_written, self.page_count
            )));
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Assemble a complete container in memory from packed chunks.
///
/// Buffered and streamed output are byte-identical; this is the streaming
/// writer draining into a `Vec`.
pub fn assemble_container(
    chunks: &[Vec<u8>],
    two_bit: bool,
    page_w: u32,
    page_h: u32,
    metadata: Option<&BookMetadata>,
) -> Result<Vec<u8>> {
    if chunks.len() > u16::MAX as usize {
        return Err(XtcError::InternalInvariant(format!(
            "{} pages exceed the container's u16 page count",
            chunks.len()
        )));
    }
    let mut writer = StreamWriter::new(
        Vec::new(),
        two_bit,
        chunks.len() as u16,
        page_w,
        page_h,
        metadata,
    )?;
    for chunk in chunks {
        writer.write_page(chunk)?;
    }
    writer.finish()
}

fn write_index_entry<W: Write>(writer: &mut W, entry: &IndexEntry) -> std::io::Result<()> {
    writer.write_all(&entry.offset.to_le_bytes())?;
    writer.write_all(&entry.size.to_le_bytes())?;
    writer.write_all(&entry.width.to_le_bytes())?;
    writer.write_all(&entry.height.to_le_bytes())
}

/// UTF-8 into a fixed cell, truncated at a character boundary to leave
/// room for the terminating NUL, zero-padded to the cell size.
fn write_text_cell<W: Write>(writer: &mut W, text: &str, cell: usize) -> std::io::Result<()> {
    let mut end = text.len().min(cell - 1);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    writer.write_all(&text.as_bytes()[..end])?;
    writer.write_all(&vec![0u8; cell - end])
}
