use crate::error::{Result, XtcError};
use serde::{Deserialize, Serialize};

/// Optional book metadata stored in the container.
///
/// Text fields are stored in fixed-size NUL-terminated cells and truncated
/// on write (title 127 bytes, author 63, publisher 31, language 15, TOC
/// titles 79).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub language: String,
    /// Caller-provided creation timestamp; zero in deterministic output.
    #[serde(default)]
    pub create_time: u32,
    /// Cover page number, if any.
    #[serde(default)]
    pub cover_page: Option<u16>,
    /// Ordered chapter list. Page ranges refer to source pages until
    /// remapped through a [`PageMapping`].
    #[serde(default)]
    pub toc: Vec<TocEntry>,
}

/// One table-of-contents entry with a 1-indexed inclusive page range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TocEntry {
    pub title: String,
    pub start_page: u16,
    pub end_page: u16,
}

/// Records the 1-to-N fan-out from source pages to emitted pages.
///
/// Write-only during emission, read-only during TOC adjustment.
#[derive(Debug, Clone, Default)]
pub struct PageMapping {
    /// Per source page: (first emitted page, emitted count), 1-indexed.
    entries: Vec<(u32, u32)>,
    total: u32,
}

impl PageMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the next source page's fan-out count.
    pub fn push(&mut self, emitted_count: u32) {
        self.entries.push((self.total + 1, emitted_count));
        self.total += emitted_count;
    }

    /// Attribute additional emitted pages to the most recent source page
    /// (the stitcher's padded tail lands here).
    pub fn extend_last(&mut self, extra: u32) {
        if let Some((_, count)) = self.entries.last_mut() {
            *count += extra;
            self.total += extra;
        }
    }

    /// Total emitted pages so far.
    pub fn total_pages(&self) -> u32 {
        self.total
    }

    pub fn source_pages(&self) -> usize {
        self.entries.len()
    }

    /// First emitted page and fan-out count for a 0-indexed source page.
    pub fn lookup(&self, source_index: usize) -> Option<(u32, u32)> {
        self.entries.get(source_index).copied()
    }

    /// Rewrite TOC page ranges from source pages to emitted pages.
    ///
    /// `start_page` maps to the first page emitted for that source page,
    /// `end_page` to the last page emitted for its source page. Entries
    /// pointing outside the mapping are an invariant violation.
    pub fn remap_toc(&self, toc: &[TocEntry]) -> Result<Vec<TocEntry>> {
        toc.iter()
            .map(|entry| {
                let start = self.map_start(entry.start_page)?;
                let end = self.map_end(entry.end_page)?;
                Ok(TocEntry {
                    title: entry.title.clone(),
                    start_page: start,
                    end_page: end,
                })
            })
            .collect()
    }

    fn map_start(&self, source_page: u16) -> Result<u16> {
        let (start, _) = self.entry_for(source_page)?;
        Ok(start as u16)
    }

    fn map_end(&self, source_page: u16) -> Result<u16> {
        let (start, count) = self.entry_for(source_page)?;
        Ok((start + count.saturating_sub(1)) as u16)
    }

    fn entry_for(&self, source_page: u16) -> Result<(u32, u32)> {
        if source_page == 0 {
            return Err(XtcError::InternalInvariant(
                "TOC pages are 1-indexed".into(),
            ));
        }
        self.entries
            .get(source_page as usize - 1)
            .copied()
            .ok_or_else(|| {
                XtcError::InternalInvariant(format!(
                    "TOC references source page {source_page} of {}",
                    self.entries.len()
                ))
            })
    }
}

/// Validate a remapped TOC against the final page count: ordered,
/// non-overlapping ranges that never exceed the emitted pages.
pub fn validate_toc(toc: &[TocEntry], page_count: u16) -> Result<()> {
    let mut previous_end = 0u16;
    for entry in toc {
        if entry.start_page == 0 || entry.start_page > entry.end_page {
            return Err(XtcError::InternalInvariant(format!(
                "TOC entry '{}' has invalid range {}..={}",
                entry.title, entry.start_page, entry.end_page
            )));
        }
        if entry.start_page <= previous_end {
            return Err(XtcError::InternalInvariant(format!(
                "TOC entry '{}' overlaps the previous chapter",
                entry.title
            )));
        }
        if entry.end_page > page_count {
            return Err(XtcError::InternalInvariant(format!(
                "TOC entry '{}' ends past page {page_count}",
                entry.title
            )));
        }
        previous_end = entry.end_page;
    }
    Ok(())
}
