use crate::raster::scale_exact;
use image::GrayImage;

/// Luminance standard deviation below which a slice counts as blank
/// (solid filler between strip panels).
const BLANK_STDDEV: f64 = 5.0;

/// Reassembles an infinite vertical strip (manhwa) into device-sized
/// slices with configurable overlap.
///
/// Appended frames are scaled to the device width and concatenated into a
/// rolling row buffer; full slices are emitted as soon as the buffer holds
/// one. Successive slices share `dev_h - step` rows, except across blank
/// regions where the window advances a full screen.
pub struct ManhwaStitcher {
    dev_w: u32,
    dev_h: u32,
    overlap_percent: u8,
    pad: u8,
    sharp: bool,
    /// Row-major grayscale rows at width `dev_w`.
    rows: Vec<u8>,
}

impl ManhwaStitcher {
    pub fn new(dev_w: u32, dev_h: u32, overlap_percent: u8, pad: u8, sharp: bool) -> Self {
        Self {
            dev_w,
            dev_h,
            overlap_percent,
            pad,
            sharp,
            rows: Vec::new(),
        }
    }

    fn buffered_rows(&self) -> u32 {
        (self.rows.len() / self.dev_w as usize) as u32
    }

    /// Append a source frame and collect every full slice it completes.
    pub fn append(&mut self, frame: &GrayImage) -> Vec<GrayImage> {
        let (src_w, src_h) = frame.dimensions();
        let scaled_h = ((src_h as u64 * self.dev_w as u64) / src_w as u64).max(1) as u32;
        let scaled = scale_exact(frame, self.dev_w, scaled_h, self.sharp);
        self.rows.extend_from_slice(scaled.as_raw());
        self.drain_full_slices()
    }

    fn drain_full_slices(&mut self) -> Vec<GrayImage> {
        let mut slices = Vec::new();
        let stride = self.dev_w as usize;
        while self.buffered_rows() >= self.dev_h {
            let take = self.dev_h as usize * stride;
            let slice = GrayImage::from_raw(self.dev_w, self.dev_h, self.rows[..take].to_vec())
                .expect("buffer sized to dimensions");

            // Filler regions get no overlap; there is nothing to re-read.
            let step = if luminance_stddev(slice.as_raw()) < BLANK_STDDEV {
                self.dev_h
            } else {
                self.dev_h - self.dev_h * self.overlap_percent as u32 / 100
            };
            slices.push(slice);
            self.rows.drain(..step as usize * stride);
        }
        slices
    }

    /// Flush the residual rows as a final top-aligned, padded page.
    /// Returns `None` when the buffer is empty.
    pub fn finish(&mut self) -> Option<GrayImage> {
        let remaining = self.buffered_rows();
        if remaining == 0 {
            return None;
        }
        let mut data = vec![self.pad; (self.dev_w * self.dev_h) as usize];
        let take = remaining.min(self.dev_h) as usize * self.dev_w as usize;
        data[..take].copy_from_slice(&self.rows[..take]);
        self.rows.clear();
        Some(GrayImage::from_raw(self.dev_w, self.dev_h, data).expect("buffer sized to dimensions"))
    }
}

fn luminance_stddev(pixels: &[u8]) -> f64 {
    if pixels.is_empty() {
        return 0.0;
    }
    let n = pixels.len() as f64;
    let mean = pixels.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = pixels
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}
